//! Client for the external workflow-automation webhook (n8n).
//!
//! Inbound chat messages are posted to the webhook; a JSON body with a
//! `reply` field is the answer to send back.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::AutomationConfig;

const USER_AGENT: &str = "Masjid-WhatsApp-Bot/2.0-WAHA";

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("automation webhook is not configured")]
    NotConfigured,

    #[error("automation webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("automation webhook error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// Body posted to the webhook for every inbound message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRequest {
    pub number: String,
    pub text: String,
    pub timestamp: String,
    pub message_id: String,
    pub is_admin: bool,
    pub message_type: String,
    /// Untouched gateway payload.
    pub waha_message: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyFields {
    #[serde(default)]
    reply: Option<String>,
    #[serde(default)]
    message_type: Option<String>,
}

/// What the webhook answered. `raw` is the full body (or null).
#[derive(Debug, Clone)]
pub struct AutomationResponse {
    pub reply: Option<String>,
    pub message_type: Option<String>,
    pub raw: Value,
}

#[derive(Clone)]
pub struct AutomationClient {
    http: Client,
    webhook_url: Option<String>,
}

impl AutomationClient {
    pub fn new(config: &AutomationConfig) -> Result<Self, AutomationError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            webhook_url: config.webhook_url.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    pub async fn forward(
        &self,
        request: &AutomationRequest,
    ) -> Result<AutomationResponse, AutomationError> {
        let url = self
            .webhook_url
            .as_deref()
            .ok_or(AutomationError::NotConfigured)?;

        let response = self.http.post(url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AutomationError::Api { status, message });
        }

        let text = response.text().await?;
        // Non-JSON bodies are kept as a string; they just carry no reply.
        let raw = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        let fields: ReplyFields = serde_json::from_value(raw.clone()).unwrap_or_default();
        debug!(has_reply = fields.reply.is_some(), "Automation webhook answered");

        Ok(AutomationResponse {
            reply: fields.reply.filter(|r| !r.trim().is_empty()),
            message_type: fields.message_type,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> AutomationRequest {
        AutomationRequest {
            number: "628123".to_string(),
            text: "jadwal sholat".to_string(),
            timestamp: "2026-01-01T00:00:00.000Z".to_string(),
            message_id: "msg-1".to_string(),
            is_admin: false,
            message_type: "chat".to_string(),
            waha_message: json!({ "id": "msg-1" }),
        }
    }

    fn client(url: Option<String>) -> AutomationClient {
        AutomationClient::new(&AutomationConfig {
            webhook_url: url,
            timeout_seconds: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn forwards_camel_case_payload_and_reads_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook/bot"))
            .and(header("user-agent", USER_AGENT))
            .and(body_partial_json(json!({
                "number": "628123",
                "messageId": "msg-1",
                "isAdmin": false,
                "messageType": "chat",
                "wahaMessage": { "id": "msg-1" },
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "reply": "Subuh 04:35", "messageType": "prayer" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let response = client(Some(format!("{}/webhook/bot", server.uri())))
            .forward(&request())
            .await
            .unwrap();
        assert_eq!(response.reply.as_deref(), Some("Subuh 04:35"));
        assert_eq!(response.message_type.as_deref(), Some("prayer"));
    }

    #[tokio::test]
    async fn non_json_body_has_no_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Workflow was started"))
            .mount(&server)
            .await;

        let response = client(Some(server.uri())).forward(&request()).await.unwrap();
        assert!(response.reply.is_none());
        assert_eq!(response.raw, json!("Workflow was started"));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no workflow"))
            .mount(&server)
            .await;

        let err = client(Some(server.uri()))
            .forward(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn unconfigured_webhook_is_an_error() {
        let automation = client(None);
        assert!(!automation.is_configured());
        assert!(matches!(
            automation.forward(&request()).await,
            Err(AutomationError::NotConfigured)
        ));
    }
}
