use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::timestamp;
use crate::server::AppState;

const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("GET", "/", "Service information"),
    ("GET", "/health", "Liveness check"),
    ("GET", "/api/status", "Health, uptime, configuration and queue state"),
    ("POST", "/webhook/send-message", "Queue a text message"),
    ("POST", "/webhook/send-image", "Queue an image message"),
    ("POST", "/webhook/send", "Queue any message type, optionally at sendAt"),
    ("POST", "/webhook/send-bulk", "Queue several messages with per-message results"),
    ("POST", "/webhook/broadcast", "Queue a message for every private chat"),
    ("POST", "/webhook/admin", "Admin commands: broadcast, status, stats, screenshot"),
    ("POST", "/webhook/waha", "Gateway event intake"),
    ("POST", "/webhook/n8n", "Automation callbacks"),
    ("POST", "/webhook/prayer-notification", "Broadcast a prayer reminder"),
    ("POST", "/api/message", "Simulate an inbound message"),
    ("GET", "/api/session/status/{sessionName}", "Gateway session status"),
    ("GET", "/api/screenshot/{sessionName}", "Gateway screenshot (PNG)"),
    ("GET", "/api/prayer/{city}", "Prayer times for a city"),
    ("POST", "/api/ai-chat", "Ask the AI assistant"),
    ("GET", "/api/faq", "All FAQ entries"),
    ("GET", "/api/faq/search?q=", "First matching FAQ entry"),
    ("GET", "/api/sheets/test", "Write a test row to the message log"),
];

fn endpoint_list() -> Vec<String> {
    ENDPOINTS
        .iter()
        .map(|(method, path, _)| format!("{method} {path}"))
        .collect()
}

/// GET /
pub async fn index(State(state): State<AppState>) -> Response {
    let endpoints: Vec<_> = ENDPOINTS
        .iter()
        .map(|(method, path, description)| {
            json!({ "method": method, "path": path, "description": description })
        })
        .collect();

    Json(json!({
        "message": "🕌 Masjid WhatsApp Bot",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "timestamp": timestamp(),
        "endpoints": endpoints,
        "configuration": {
            "session": state.info.session,
            "openrouter_model": state.assistant.model(),
            "prayer_api": state.info.prayer_api,
            "google_sheets_configured": state.sheets.is_configured(),
            "n8n_configured": state.info.automation_configured,
        },
    }))
    .into_response()
}

/// GET /health
pub async fn health() -> Response {
    Json(json!({ "status": "ok", "timestamp": timestamp() })).into_response()
}

/// GET /api/status
pub async fn status(State(state): State<AppState>) -> Response {
    let chats = state.bot.chat_stats(None).await;
    Json(json!({
        "status": "healthy",
        "timestamp": timestamp(),
        "uptime_seconds": state.uptime().as_secs(),
        "environment": {
            "session": state.info.session,
            "gateway_url": state.info.gateway_url,
            "openrouter_configured": state.assistant.is_configured(),
            "google_sheets_configured": state.sheets.is_configured(),
            "n8n_configured": state.info.automation_configured,
            "prayer_api": state.info.prayer_api,
            "admins": state.admins.len(),
        },
        "queue": state.queue.snapshot(),
        "chats": chats,
    }))
    .into_response()
}

/// Fallback for unknown routes.
pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": "Endpoint not found",
            "available_endpoints": endpoint_list(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::testing::test_app;

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let (app, _) = test_app(&[]);
        get_json_from(app, uri).await
    }

    async fn get_json_from(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = get_json("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn status_reports_queue_and_features() {
        let (status, body) = get_json("/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["queue"]["pending"], 0);
        assert_eq!(body["queue"]["draining"], false);
        assert_eq!(body["environment"]["google_sheets_configured"], false);
        assert_eq!(body["environment"]["openrouter_configured"], false);
    }

    #[tokio::test]
    async fn status_counts_chats_and_contacts() {
        let (app, h) = test_app(&[]);
        h.channel
            .set_chats(&["628111@c.us", "1203@g.us", "1204@g.us"]);
        h.channel.set_contacts(4);

        let (_, body) = get_json_from(app, "/api/status").await;
        assert_eq!(body["chats"]["totalChats"], 3);
        assert_eq!(body["chats"]["privateChats"], 1);
        assert_eq!(body["chats"]["groupChats"], 2);
        assert_eq!(body["chats"]["totalContacts"], 4);
    }

    #[tokio::test]
    async fn index_lists_endpoints() {
        let (_, body) = get_json("/").await;
        assert_eq!(body["status"], "running");
        assert_eq!(body["endpoints"].as_array().unwrap().len(), ENDPOINTS.len());
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let (status, body) = get_json("/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Endpoint not found");
        assert!(
            body["available_endpoints"]
                .as_array()
                .unwrap()
                .iter()
                .any(|e| e == "GET /health")
        );
    }
}
