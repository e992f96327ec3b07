//! Prayer-time lookup.
//!
//! The primary API (Aladhan) is geocoded by city name. When it fails for any
//! reason the resolver asks MyQuran, which needs a numeric city id.

use std::time::Duration;

use chrono::{Datelike, Local, NaiveDate};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::config::PrayerConfig;

/// MyQuran id used for any city not in [`CITY_IDS`] (Jakarta).
pub const DEFAULT_CITY_ID: &str = "1301";

const CITY_IDS: &[(&str, &str)] = &[
    ("jakarta", "1301"),
    ("bandung", "3273"),
    ("surabaya", "3578"),
    ("medan", "1275"),
    ("semarang", "3374"),
];

/// MyQuran city id for a city name, case-insensitive.
pub fn fallback_city_id(city: &str) -> &'static str {
    let city = city.trim().to_lowercase();
    CITY_IDS
        .iter()
        .find(|(name, _)| *name == city)
        .map(|(_, id)| *id)
        .unwrap_or(DEFAULT_CITY_ID)
}

#[derive(Debug, Error)]
pub enum PrayerError {
    #[error("prayer API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("prayer API returned status {0}")]
    Status(u16),

    #[error("unexpected prayer API response: {0}")]
    Shape(String),

    #[error("invalid prayer API url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("both prayer APIs failed (primary: {primary}; fallback: {fallback})")]
    Unavailable { primary: String, fallback: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrayerSource {
    Aladhan,
    MyQuran,
}

impl PrayerSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PrayerSource::Aladhan => "aladhan",
            PrayerSource::MyQuran => "myquran",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timings {
    pub subuh: String,
    pub dzuhur: String,
    pub ashar: String,
    pub maghrib: String,
    pub isya: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrayerTimes {
    pub city: String,
    pub date: String,
    pub source: PrayerSource,
    pub timings: Timings,
}

// --- Aladhan wire types ---

#[derive(Deserialize)]
struct AladhanResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    data: Option<AladhanData>,
}

#[derive(Deserialize)]
struct AladhanData {
    #[serde(default)]
    timings: Option<AladhanTimings>,
    #[serde(default)]
    date: Option<AladhanDate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AladhanTimings {
    fajr: String,
    dhuhr: String,
    asr: String,
    maghrib: String,
    isha: String,
}

#[derive(Deserialize)]
struct AladhanDate {
    readable: String,
}

// --- MyQuran wire types ---

#[derive(Deserialize)]
struct MyQuranResponse {
    #[serde(default)]
    status: bool,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Clone)]
pub struct PrayerResolver {
    http: Client,
    primary_base_url: String,
    fallback_base_url: String,
    default_city: String,
}

impl PrayerResolver {
    pub fn new(config: &PrayerConfig) -> Result<Self, PrayerError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            primary_base_url: config.primary_base_url.trim_end_matches('/').to_string(),
            fallback_base_url: config.fallback_base_url.trim_end_matches('/').to_string(),
            default_city: config.default_city.clone(),
        })
    }

    pub fn default_city(&self) -> &str {
        &self.default_city
    }

    /// Today's timings for `city` (the default city when blank).
    pub async fn resolve(&self, city: &str) -> Result<PrayerTimes, PrayerError> {
        self.resolve_on(city, Local::now().date_naive()).await
    }

    /// Timings for `city`; `date` is only used by the fallback API.
    pub async fn resolve_on(&self, city: &str, date: NaiveDate) -> Result<PrayerTimes, PrayerError> {
        let city = match city.trim() {
            "" => self.default_city.as_str(),
            c => c,
        };

        let primary = match self.from_aladhan(city).await {
            Ok(times) => return Ok(times),
            Err(e) => e,
        };
        warn!(city, error = %primary, "Primary prayer API failed, trying fallback");

        match self.from_myquran(city, date).await {
            Ok(times) => Ok(times),
            Err(fallback) => Err(PrayerError::Unavailable {
                primary: primary.to_string(),
                fallback: fallback.to_string(),
            }),
        }
    }

    async fn from_aladhan(&self, city: &str) -> Result<PrayerTimes, PrayerError> {
        let url = Url::parse_with_params(
            &format!("{}/timingsByCity", self.primary_base_url),
            &[("city", city), ("country", "ID"), ("method", "2")],
        )?;
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(PrayerError::Status(response.status().as_u16()));
        }

        let body: AladhanResponse = response
            .json()
            .await
            .map_err(|e| PrayerError::Shape(e.to_string()))?;
        if body.code != 200 {
            return Err(PrayerError::Shape(format!("code {}", body.code)));
        }
        let data = body
            .data
            .ok_or_else(|| PrayerError::Shape("missing data".to_string()))?;
        let timings = data
            .timings
            .ok_or_else(|| PrayerError::Shape("missing timings".to_string()))?;

        info!(city, source = "aladhan", "Prayer times resolved");
        Ok(PrayerTimes {
            city: city.to_string(),
            date: data.date.map(|d| d.readable).unwrap_or_default(),
            source: PrayerSource::Aladhan,
            timings: Timings {
                subuh: timings.fajr,
                dzuhur: timings.dhuhr,
                ashar: timings.asr,
                maghrib: timings.maghrib,
                isya: timings.isha,
            },
        })
    }

    async fn from_myquran(&self, city: &str, date: NaiveDate) -> Result<PrayerTimes, PrayerError> {
        let city_id = fallback_city_id(city);
        let (year, month, day) = (date.year(), date.month(), date.day());
        let url = Url::parse(&format!(
            "{}/sholat/jadwal/{city_id}/{year}/{month}/{day}",
            self.fallback_base_url
        ))?;

        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(PrayerError::Status(response.status().as_u16()));
        }

        let body: MyQuranResponse = response
            .json()
            .await
            .map_err(|e| PrayerError::Shape(e.to_string()))?;
        let data = match body.data {
            Some(data) if body.status => data,
            _ => return Err(PrayerError::Shape("status false or missing data".to_string())),
        };
        let schedule = data.get("jadwal").cloned().unwrap_or(data);
        let timings: Timings =
            serde_json::from_value(schedule).map_err(|e| PrayerError::Shape(e.to_string()))?;

        info!(city, city_id, source = "myquran", "Prayer times resolved");
        Ok(PrayerTimes {
            city: city.to_string(),
            date: format!("{day}/{month}/{year}"),
            source: PrayerSource::MyQuran,
            timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver(base: &str) -> PrayerResolver {
        PrayerResolver::new(&PrayerConfig {
            primary_base_url: base.to_string(),
            fallback_base_url: base.to_string(),
            default_city: "Jakarta".to_string(),
            timeout_seconds: 5,
        })
        .unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn myquran_body() -> serde_json::Value {
        json!({
            "status": true,
            "data": {
                "id": "1301",
                "lokasi": "KOTA JAKARTA",
                "jadwal": {
                    "tanggal": "Minggu, 01/03/2026",
                    "subuh": "04:40",
                    "dzuhur": "12:05",
                    "ashar": "15:15",
                    "maghrib": "18:10",
                    "isya": "19:20"
                }
            }
        })
    }

    async fn primary_down(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/timingsByCity"))
            .respond_with(ResponseTemplate::new(500))
            .mount(server)
            .await;
    }

    #[test]
    fn city_ids_are_case_insensitive_with_default() {
        assert_eq!(fallback_city_id("jakarta"), "1301");
        assert_eq!(fallback_city_id(" Bandung "), "3273");
        assert_eq!(fallback_city_id("SURABAYA"), "3578");
        assert_eq!(fallback_city_id("Makassar"), DEFAULT_CITY_ID);
    }

    #[tokio::test]
    async fn primary_timings_are_normalized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/timingsByCity"))
            .and(query_param("city", "Bandung"))
            .and(query_param("country", "ID"))
            .and(query_param("method", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": {
                    "timings": {
                        "Fajr": "04:35", "Sunrise": "05:50", "Dhuhr": "12:00",
                        "Asr": "15:10", "Maghrib": "18:05", "Isha": "19:15"
                    },
                    "date": { "readable": "01 Mar 2026" }
                }
            })))
            .mount(&server)
            .await;

        let times = resolver(&server.uri()).resolve_on("Bandung", date()).await.unwrap();
        assert_eq!(times.source, PrayerSource::Aladhan);
        assert_eq!(times.date, "01 Mar 2026");
        assert_eq!(times.timings.subuh, "04:35");
        assert_eq!(times.timings.isya, "19:15");
    }

    #[tokio::test]
    async fn fallback_uses_mapped_city_id() {
        let server = MockServer::start().await;
        primary_down(&server).await;
        Mock::given(method("GET"))
            .and(path("/sholat/jadwal/1301/2026/3/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(myquran_body()))
            .expect(1)
            .mount(&server)
            .await;

        let times = resolver(&server.uri()).resolve_on("jakarta", date()).await.unwrap();
        assert_eq!(times.source, PrayerSource::MyQuran);
        assert_eq!(times.date, "1/3/2026");
        assert_eq!(times.timings.maghrib, "18:10");
    }

    #[tokio::test]
    async fn fallback_uses_default_id_for_unknown_city() {
        let server = MockServer::start().await;
        primary_down(&server).await;
        Mock::given(method("GET"))
            .and(path("/sholat/jadwal/1301/2026/3/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(myquran_body()))
            .expect(1)
            .mount(&server)
            .await;

        let times = resolver(&server.uri()).resolve_on("Depok", date()).await.unwrap();
        assert_eq!(times.city, "Depok");
        assert_eq!(times.source, PrayerSource::MyQuran);
    }

    #[tokio::test]
    async fn primary_without_timings_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/timingsByCity"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 200, "data": {} })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sholat/jadwal/3578/2026/3/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "data": {
                    "subuh": "04:20", "dzuhur": "11:45", "ashar": "15:00",
                    "maghrib": "17:55", "isya": "19:05"
                }
            })))
            .mount(&server)
            .await;

        let times = resolver(&server.uri()).resolve_on("Surabaya", date()).await.unwrap();
        assert_eq!(times.timings.dzuhur, "11:45");
    }

    #[tokio::test]
    async fn both_failures_surface_one_error() {
        let server = MockServer::start().await;
        primary_down(&server).await;
        Mock::given(method("GET"))
            .and(path("/sholat/jadwal/1301/2026/3/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": false })))
            .mount(&server)
            .await;

        let err = resolver(&server.uri()).resolve_on("", date()).await.unwrap_err();
        assert!(matches!(err, PrayerError::Unavailable { .. }));
        assert!(err.to_string().contains("500"));
    }
}
