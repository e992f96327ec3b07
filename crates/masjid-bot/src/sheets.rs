//! Spreadsheet-backed interaction log and FAQ store.
//!
//! Uses the Google Sheets values API with an API key. Log tables are
//! append-only; the FAQ table is read-only and its row order matters.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

use chrono::{NaiveDate, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::SheetsConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("spreadsheet store is not configured")]
    NotConfigured,

    #[error("spreadsheet request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("spreadsheet API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid spreadsheet url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

// ============================================================================
// Tables and rows
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    MessageLog,
    PrayerLog,
    AdminLog,
    Faq,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::MessageLog => "MessageLog",
            Table::PrayerLog => "PrayerLog",
            Table::AdminLog => "AdminLog",
            Table::Faq => "FAQ",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessageLogEntry {
    pub number: String,
    pub text: String,
    pub message_type: String,
    pub reply: String,
    pub is_admin: bool,
    /// Defaults to `whatsapp` when empty.
    pub source: String,
}

impl MessageLogEntry {
    fn row(&self, timestamp: String) -> Vec<String> {
        let source = if self.source.is_empty() {
            "whatsapp"
        } else {
            &self.source
        };
        vec![
            timestamp,
            self.number.clone(),
            self.text.clone(),
            self.message_type.clone(),
            self.reply.clone(),
            yes_no(self.is_admin).to_string(),
            source.to_string(),
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct PrayerLogEntry {
    pub number: String,
    pub city: String,
    pub source: String,
    pub success: bool,
    pub error: Option<String>,
}

impl PrayerLogEntry {
    fn row(&self, timestamp: String) -> Vec<String> {
        vec![
            timestamp,
            self.number.clone(),
            self.city.clone(),
            self.source.clone(),
            success_failed(self.success).to_string(),
            self.error.clone().unwrap_or_default(),
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdminLogEntry {
    pub admin_number: String,
    pub action: String,
    pub details: String,
    pub success: bool,
    pub error: Option<String>,
}

impl AdminLogEntry {
    fn row(&self, timestamp: String) -> Vec<String> {
        vec![
            timestamp,
            self.admin_number.clone(),
            self.action.clone(),
            self.details.clone(),
            success_failed(self.success).to_string(),
            self.error.clone().unwrap_or_default(),
        ]
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

fn success_failed(flag: bool) -> &'static str {
    if flag { "Success" } else { "Failed" }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// FAQ
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaqEntry {
    /// Row index in the sheet (header is row 0).
    pub id: usize,
    pub question: String,
    pub answer: String,
    pub category: String,
    pub keywords: Vec<String>,
    pub active: bool,
}

/// Turn raw FAQ rows into entries, preserving sheet order.
pub fn parse_faq_rows(rows: &[Vec<String>]) -> Vec<FaqEntry> {
    rows.iter()
        .enumerate()
        .skip(1)
        .filter(|(_, row)| row.len() >= 3)
        .map(|(id, row)| {
            let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");
            let category = match cell(2) {
                "" => "general",
                c => c,
            };
            FaqEntry {
                id,
                question: cell(0).to_string(),
                answer: cell(1).to_string(),
                category: category.to_string(),
                keywords: cell(3)
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from)
                    .collect(),
                active: cell(4) != "false",
            }
        })
        .collect()
}

/// First active entry whose keyword occurs in the query; otherwise the first
/// active entry whose question and the query contain one another.
pub fn find_faq<'a>(entries: &'a [FaqEntry], query: &str) -> Option<&'a FaqEntry> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return None;
    }
    let active = || entries.iter().filter(|e| e.active);

    active()
        .find(|e| {
            e.keywords
                .iter()
                .any(|k| query.contains(&k.to_lowercase()))
        })
        .or_else(|| {
            active().find(|e| {
                let question = e.question.trim().to_lowercase();
                !question.is_empty() && (question.contains(&query) || query.contains(&question))
            })
        })
}

// ============================================================================
// Usage statistics
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_messages: usize,
    pub today_messages: usize,
    pub unique_users: usize,
    pub message_types: BTreeMap<String, usize>,
}

/// Statistics over `MessageLog` rows (first row is the header).
pub fn compute_stats(rows: &[Vec<String>], today: NaiveDate) -> UsageStats {
    let today = today.format("%Y-%m-%d").to_string();
    let mut stats = UsageStats {
        total_messages: rows.len().saturating_sub(1),
        ..UsageStats::default()
    };
    let mut users = HashSet::new();

    for row in rows.iter().skip(1).filter(|r| r.len() >= 4) {
        if row[0].starts_with(&today) {
            stats.today_messages += 1;
        }
        if !row[1].is_empty() {
            users.insert(row[1].as_str());
        }
        if !row[3].is_empty() {
            *stats.message_types.entry(row[3].clone()).or_default() += 1;
        }
    }

    stats.unique_users = users.len();
    stats
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Clone)]
pub struct SheetsClient {
    http: Client,
    base_url: String,
    spreadsheet_id: Option<String>,
    api_key: Option<String>,
}

impl SheetsClient {
    pub fn new(config: &SheetsConfig) -> Result<Self, SheetsError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.spreadsheet_id.is_some() && self.api_key.is_some()
    }

    pub async fn log_message(&self, entry: &MessageLogEntry) -> Result<Value, SheetsError> {
        self.append(Table::MessageLog, entry.row(now_timestamp()))
            .await
    }

    pub async fn log_prayer(&self, entry: &PrayerLogEntry) -> Result<Value, SheetsError> {
        self.append(Table::PrayerLog, entry.row(now_timestamp()))
            .await
    }

    pub async fn log_admin(&self, entry: &AdminLogEntry) -> Result<Value, SheetsError> {
        self.append(Table::AdminLog, entry.row(now_timestamp()))
            .await
    }

    /// Append one row to `table`.
    pub async fn append(&self, table: Table, row: Vec<String>) -> Result<Value, SheetsError> {
        let url = self.values_url(&format!("{table}:append"), &[("valueInputOption", "RAW")])?;
        let body = json!({ "values": [row], "majorDimension": "ROWS" });

        let response = self.http.post(url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SheetsError::Api { status, message });
        }

        debug!(table = %table, "Row appended");
        Ok(response.json().await?)
    }

    pub async fn read(&self, table: Table) -> Result<Vec<Vec<String>>, SheetsError> {
        let url = self.values_url(table.name(), &[])?;
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SheetsError::Api { status, message });
        }
        let range: ValueRange = response.json().await?;
        Ok(range.values)
    }

    pub async fn faqs(&self) -> Result<Vec<FaqEntry>, SheetsError> {
        let rows = self.read(Table::Faq).await?;
        let entries = parse_faq_rows(&rows);
        info!(count = entries.len(), "Loaded FAQ entries");
        Ok(entries)
    }

    pub async fn search_faq(&self, query: &str) -> Result<Option<FaqEntry>, SheetsError> {
        let entries = self.faqs().await?;
        Ok(find_faq(&entries, query).cloned())
    }

    pub async fn usage_stats(&self) -> Result<UsageStats, SheetsError> {
        let rows = self.read(Table::MessageLog).await?;
        Ok(compute_stats(&rows, Utc::now().date_naive()))
    }

    fn values_url(&self, range: &str, extra: &[(&str, &str)]) -> Result<Url, SheetsError> {
        let (Some(id), Some(key)) = (&self.spreadsheet_id, &self.api_key) else {
            return Err(SheetsError::NotConfigured);
        };
        let raw = format!("{}/{}/values/{}", self.base_url, id, range);
        let params = extra
            .iter()
            .copied()
            .chain(std::iter::once(("key", key.as_str())));
        Ok(Url::parse_with_params(&raw, params)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn faq_rows() -> Vec<Vec<String>> {
        rows(&[
            &["Question", "Answer", "Category", "Keywords", "Active"],
            &["Jam buka masjid?", "24 jam", "umum", "buka, jam"],
            &["Kapan sholat maghrib?", "Lihat jadwal harian", "sholat", "maghrib, sholat"],
            &["Waktu maghrib hari ini", "18:05", "sholat", "maghrib"],
            &["Kajian rutin", "Setiap Ahad", "", "kajian", "false"],
            &["pendek"],
        ])
    }

    fn client(base_url: String) -> SheetsClient {
        SheetsClient::new(&SheetsConfig {
            api_key: Some("k".to_string()),
            spreadsheet_id: Some("sheet".to_string()),
            base_url,
        })
        .unwrap()
    }

    #[test]
    fn faq_rows_are_parsed_in_order() {
        let entries = parse_faq_rows(&faq_rows());
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].id, 1);
        assert_eq!(entries[0].keywords, ["buka", "jam"]);
        assert!(entries[0].active);
        assert_eq!(entries[3].category, "general");
        assert!(!entries[3].active);
    }

    #[test]
    fn keyword_match_returns_first_listed_entry() {
        let entries = parse_faq_rows(&faq_rows());
        let hit = find_faq(&entries, "Jam berapa MAGHRIB hari ini?").unwrap();
        // "buka, jam" also matches "jam" and comes first.
        assert_eq!(hit.question, "Jam buka masjid?");

        let hit = find_faq(&entries, "waktu maghrib hari ini").unwrap();
        assert_eq!(hit.question, "Kapan sholat maghrib?");
    }

    #[test]
    fn question_overlap_is_the_fallback() {
        let entries = rows(&[
            &["q", "a", "c", "k"],
            &["Infaq online", "Transfer ke rekening", "donasi", "transfer"],
        ]);
        let entries = parse_faq_rows(&entries);
        assert_eq!(find_faq(&entries, "infaq").unwrap().answer, "Transfer ke rekening");
        assert_eq!(
            find_faq(&entries, "bagaimana infaq online?").unwrap().category,
            "donasi"
        );
    }

    #[test]
    fn inactive_entries_never_match() {
        let entries = parse_faq_rows(&faq_rows());
        assert!(find_faq(&entries, "kajian").is_none());
        assert!(find_faq(&entries, "   ").is_none());
    }

    #[test]
    fn usage_stats_count_today_users_and_types() {
        let data = rows(&[
            &["Timestamp", "Number", "Text", "Type", "Reply", "Admin", "Source"],
            &["2026-03-01T10:00:00.000Z", "628111", "hi", "chat", "", "No", "whatsapp"],
            &["2026-03-01T11:00:00.000Z", "628222", "hi", "chat", "", "No", "whatsapp"],
            &["2026-02-28T11:00:00.000Z", "628111", "", "image", "", "No", "whatsapp"],
            &["2026-03-01T12:00:00.000Z"],
        ]);
        let stats = compute_stats(&data, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(stats.total_messages, 4);
        assert_eq!(stats.today_messages, 2);
        assert_eq!(stats.unique_users, 2);
        assert_eq!(stats.message_types.get("chat"), Some(&2));
        assert_eq!(stats.message_types.get("image"), Some(&1));
    }

    #[test]
    fn message_row_layout() {
        let row = MessageLogEntry {
            number: "628111".into(),
            text: "assalamualaikum".into(),
            message_type: "chat".into(),
            reply: "waalaikumsalam".into(),
            is_admin: true,
            source: String::new(),
        }
        .row("ts".into());
        assert_eq!(
            row,
            ["ts", "628111", "assalamualaikum", "chat", "waalaikumsalam", "Yes", "whatsapp"]
        );
    }

    #[tokio::test]
    async fn append_posts_row_with_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sheet/values/AdminLog:append"))
            .and(query_param("key", "k"))
            .and(query_param("valueInputOption", "RAW"))
            .and(body_json(json!({
                "values": [["ts", "628111", "broadcast", "", "Success", ""]],
                "majorDimension": "ROWS",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "updates": {} })))
            .expect(1)
            .mount(&server)
            .await;

        let entry = AdminLogEntry {
            admin_number: "628111".into(),
            action: "broadcast".into(),
            success: true,
            ..AdminLogEntry::default()
        };
        client(server.uri())
            .append(Table::AdminLog, entry.row("ts".into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn faqs_are_read_from_sheet() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sheet/values/FAQ"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "FAQ!A1:E3",
                "values": [
                    ["Question", "Answer", "Category"],
                    ["Parkir?", "Tersedia", "fasilitas", "parkir"],
                ],
            })))
            .mount(&server)
            .await;

        let hit = client(server.uri()).search_faq("ada parkir?").await.unwrap();
        assert_eq!(hit.unwrap().answer, "Tersedia");
    }

    #[tokio::test]
    async fn missing_credentials_are_not_configured() {
        let sheets = SheetsClient::new(&SheetsConfig::default()).unwrap();
        assert!(!sheets.is_configured());
        assert!(matches!(
            sheets.faqs().await,
            Err(SheetsError::NotConfigured)
        ));
    }
}
