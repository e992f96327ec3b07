//! `/api/*` handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{required, timestamp};
use crate::llm::LLMError;
use crate::response::{bad_gateway, bad_request, error, not_found, service_unavailable};
use crate::server::AppState;
use crate::sheets::{MessageLogEntry, PrayerLogEntry};

const API_NUMBER: &str = "api_test";
const SHEETS_MISSING: &str = "GOOGLE_SHEETS_API_KEY or GOOGLE_SHEETS_ID missing";

/// `None`/blank path segment means the configured session.
fn session_param(name: &str) -> Option<&str> {
    Some(name.trim()).filter(|n| !n.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct SimulateRequest {
    pub number: Option<String>,
    pub text: Option<String>,
}

/// POST /api/message
pub async fn simulate_message(
    State(state): State<AppState>,
    Json(req): Json<SimulateRequest>,
) -> Response {
    let (Some(number), Some(text)) = (required(&req.number), required(&req.text)) else {
        return bad_request("Missing required fields: number and text").into_response();
    };
    info!(number, "Simulated message received");

    let exchange = state.bot.simulate(number, text).await;
    Json(json!({
        "success": true,
        "message": "Message processed successfully",
        "data": exchange,
        "timestamp": timestamp(),
    }))
    .into_response()
}

/// GET /api/session/status/{session_name}
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_name): Path<String>,
) -> Response {
    match state.channel.session_status(session_param(&session_name)).await {
        Ok(info) => Json(json!({ "success": true, "data": info })).into_response(),
        Err(e) => {
            warn!(session = %session_name, error = %e, "Session status failed");
            bad_gateway(format!("Failed to get session status: {e}")).into_response()
        }
    }
}

/// GET /api/screenshot/{session_name}
pub async fn screenshot(
    State(state): State<AppState>,
    Path(session_name): Path<String>,
) -> Response {
    match state.channel.screenshot(session_param(&session_name)).await {
        Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Err(e) => {
            warn!(session = %session_name, error = %e, "Screenshot failed");
            bad_gateway(format!("Failed to get screenshot: {e}")).into_response()
        }
    }
}

/// GET /api/prayer/{city}
pub async fn prayer_times(State(state): State<AppState>, Path(city): Path<String>) -> Response {
    let result = state.prayer.resolve(&city).await;

    if state.sheets.is_configured() {
        let entry = match &result {
            Ok(times) => PrayerLogEntry {
                number: API_NUMBER.to_string(),
                city: times.city.clone(),
                source: times.source.as_str().to_string(),
                success: true,
                error: None,
            },
            Err(e) => PrayerLogEntry {
                number: API_NUMBER.to_string(),
                city: city.clone(),
                source: "api_error".to_string(),
                success: false,
                error: Some(e.to_string()),
            },
        };
        if let Err(e) = state.sheets.log_prayer(&entry).await {
            warn!(error = %e, "Failed to log prayer request");
        }
    }

    match result {
        Ok(times) => Json(json!({ "success": true, "data": times })).into_response(),
        Err(e) => {
            warn!(city = %city, error = %e, "Prayer times unavailable");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to get prayer times",
                e.to_string(),
            )
            .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AiChatRequest {
    pub message: Option<String>,
}

/// POST /api/ai-chat
pub async fn ai_chat(State(state): State<AppState>, Json(req): Json<AiChatRequest>) -> Response {
    let Some(question) = required(&req.message) else {
        return bad_request("Missing required field: message").into_response();
    };
    if !state.assistant.is_configured() {
        return service_unavailable("OpenRouter API not configured").into_response();
    }

    let answer = match state.assistant.ask(question).await {
        Ok(answer) => answer,
        Err(LLMError::NotConfigured) => {
            return service_unavailable("OpenRouter API not configured").into_response();
        }
        Err(e) => {
            warn!(error = %e, "AI chat failed");
            return bad_gateway(format!("AI Chat failed: {e}")).into_response();
        }
    };

    if state.sheets.is_configured() {
        let entry = MessageLogEntry {
            number: API_NUMBER.to_string(),
            text: question.to_string(),
            message_type: "ai_chat".to_string(),
            reply: answer.clone(),
            is_admin: false,
            source: "api_direct".to_string(),
        };
        if let Err(e) = state.sheets.log_message(&entry).await {
            warn!(error = %e, "Failed to log AI chat");
        }
    }

    Json(json!({
        "success": true,
        "data": {
            "question": question,
            "answer": answer,
            "model": state.assistant.model(),
            "timestamp": timestamp(),
        },
    }))
    .into_response()
}

/// GET /api/faq
pub async fn list_faq(State(state): State<AppState>) -> Response {
    if !state.sheets.is_configured() {
        return service_unavailable(SHEETS_MISSING).into_response();
    }
    match state.sheets.faqs().await {
        Ok(entries) => Json(json!({
            "success": true,
            "count": entries.len(),
            "data": entries,
            "timestamp": timestamp(),
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "FAQ read failed");
            bad_gateway(format!("Failed to get FAQ data: {e}")).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FaqQuery {
    pub q: Option<String>,
}

/// GET /api/faq/search?q=
pub async fn search_faq(State(state): State<AppState>, Query(query): Query<FaqQuery>) -> Response {
    let Some(q) = required(&query.q) else {
        return bad_request("Missing query parameter: q").into_response();
    };
    if !state.sheets.is_configured() {
        return service_unavailable(SHEETS_MISSING).into_response();
    }
    match state.sheets.search_faq(q).await {
        Ok(Some(entry)) => Json(json!({ "success": true, "data": entry })).into_response(),
        Ok(None) => not_found(format!("No FAQ entry matches {q:?}")).into_response(),
        Err(e) => {
            warn!(error = %e, "FAQ search failed");
            bad_gateway(format!("Failed to search FAQ: {e}")).into_response()
        }
    }
}

/// GET /api/sheets/test
pub async fn sheets_test(State(state): State<AppState>) -> Response {
    if !state.sheets.is_configured() {
        return service_unavailable(SHEETS_MISSING).into_response();
    }
    let entry = MessageLogEntry {
        number: API_NUMBER.to_string(),
        text: "Test message from API endpoint".to_string(),
        message_type: "api_test".to_string(),
        reply: "Test successful".to_string(),
        is_admin: false,
        source: "api_endpoint".to_string(),
    };
    match state.sheets.log_message(&entry).await {
        Ok(data) => Json(json!({
            "success": true,
            "message": "Google Sheets connection working!",
            "data": data,
            "timestamp": timestamp(),
        }))
        .into_response(),
        Err(e) => bad_gateway(format!("Google Sheets test failed: {e}")).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::testing::TestHarness;

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn faq_endpoints_need_sheets() {
        let h = TestHarness::new(&[]);
        let (status, body) = call(h.router(), get("/api/faq")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Not configured");

        let (status, _) = call(h.router(), get("/api/sheets/test")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = call(h.router(), get("/api/faq/search")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn faq_search_returns_first_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sheet-1/values/FAQ"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [
                    ["Question", "Answer", "Category", "Keywords", "Active"],
                    ["Kapan kajian?", "Setiap Kamis", "kajian", "kajian", "true"],
                    ["Jadwal maghrib?", "Lihat jadwal", "sholat", "maghrib", "true"]
                ]
            })))
            .mount(&server)
            .await;

        let h = TestHarness::with_config(&[], |config| {
            config.sheets.base_url = server.uri();
            config.sheets.spreadsheet_id = Some("sheet-1".into());
            config.sheets.api_key = Some("key".into());
        });

        let (status, body) = call(h.router(), get("/api/faq/search?q=maghrib")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["answer"], "Lihat jadwal");

        let (status, _) = call(h.router(), get("/api/faq/search?q=zakat")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = call(h.router(), get("/api/faq")).await;
        assert_eq!(body["count"], 2);
    }

    #[tokio::test]
    async fn ai_chat_validation() {
        let h = TestHarness::new(&[]);
        let (status, _) = call(h.router(), post("/api/ai-chat", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(h.router(), post("/api/ai-chat", json!({ "message": "Apa itu zakat?" }))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn ai_chat_answers_through_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "gen-1",
                "model": "test-model",
                "choices": [{
                    "index": 0,
                    "message": { "role": "assistant", "content": "Zakat adalah rukun Islam ketiga." },
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let h = TestHarness::with_config(&[], |config| {
            config.ai.base_url = server.uri();
            config.ai.api_key = Some("sk-test".into());
        });

        let (status, body) = call(h.router(), post("/api/ai-chat", json!({ "message": "Apa itu zakat?" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["answer"], "Zakat adalah rukun Islam ketiga.");
    }

    #[tokio::test]
    async fn prayer_times_fail_with_500_when_both_sources_fail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(".*"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let h = TestHarness::with_config(&[], |config| {
            config.prayer.primary_base_url = server.uri();
            config.prayer.fallback_base_url = server.uri();
        });

        let (status, body) = call(h.router(), get("/api/prayer/Bandung")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Failed to get prayer times");
    }

    #[tokio::test]
    async fn simulate_message_requires_fields() {
        let h = TestHarness::new(&[]);
        let (status, _) = call(h.router(), post("/api/message", json!({ "number": "628111" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            h.router(),
            post("/api/message", json!({ "number": "628111", "text": "jadwal" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["sheets_logged"], false);
    }

    #[tokio::test]
    async fn screenshot_is_png() {
        let h = TestHarness::new(&[]);
        let response = h
            .router()
            .oneshot(get("/api/screenshot/default"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"\x89PNG");
    }

    #[tokio::test]
    async fn session_status_uses_path_session() {
        let h = TestHarness::new(&[]);
        let (status, body) = call(h.router(), get("/api/session/status/masjid")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "masjid");
        assert_eq!(body["data"]["status"], "WORKING");
    }
}
