//! Inbound gateway events and session bookkeeping.
//!
//! The gateway delivers the same envelope over its webhook and its WebSocket:
//!
//! ```json
//! { "event": "message", "session": "default", "payload": { "from": "628123@c.us", "body": "..." } }
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event names used by the gateway.
pub mod event_names {
    pub const MESSAGE: &str = "message";
    pub const SESSION_STATUS: &str = "session.status";
    pub const MESSAGE_REACTION: &str = "message.reaction";
    pub const MESSAGE_REVOKED: &str = "message.revoked";
}

/// Raw event as received, before the payload is interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: String,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// An interpreted gateway event.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// A chat message arrived. `raw` keeps the untouched payload for
    /// downstream consumers that want fields we do not model.
    Message {
        session: Option<String>,
        message: InboundMessage,
        raw: Value,
    },
    /// The gateway session changed state.
    SessionStatus {
        session: Option<String>,
        status: SessionState,
    },
    /// Any other event; acknowledged and ignored.
    Unsupported { event: String },
}

impl EventEnvelope {
    /// Interpret the payload according to the event name.
    pub fn into_event(self) -> Result<GatewayEvent, serde_json::Error> {
        match self.event.as_str() {
            event_names::MESSAGE => {
                let message: InboundMessage = serde_json::from_value(self.payload.clone())?;
                Ok(GatewayEvent::Message {
                    session: self.session,
                    message,
                    raw: self.payload,
                })
            }
            event_names::SESSION_STATUS => {
                let data: SessionStatusData = serde_json::from_value(self.payload)?;
                Ok(GatewayEvent::SessionStatus {
                    session: self.session,
                    status: data.status,
                })
            }
            _ => Ok(GatewayEvent::Unsupported { event: self.event }),
        }
    }
}

/// A chat message as reported by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, rename = "type")]
    pub message_type: Option<String>,
    #[serde(default)]
    pub has_media: bool,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl InboundMessage {
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }

    /// Message type, defaulting to `text` when the gateway omits it.
    pub fn kind(&self) -> &str {
        self.message_type.as_deref().unwrap_or("text")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatusData {
    pub status: SessionState,
}

/// Gateway session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionState {
    Starting,
    ScanQrCode,
    Working,
    Failed,
    Stopped,
    Conflict,
    Unpaired,
    Other(String),
}

impl SessionState {
    pub fn as_str(&self) -> &str {
        match self {
            SessionState::Starting => "STARTING",
            SessionState::ScanQrCode => "SCAN_QR_CODE",
            SessionState::Working => "WORKING",
            SessionState::Failed => "FAILED",
            SessionState::Stopped => "STOPPED",
            SessionState::Conflict => "CONFLICT",
            SessionState::Unpaired => "UNPAIRED",
            SessionState::Other(s) => s,
        }
    }

    pub fn is_working(&self) -> bool {
        matches!(self, SessionState::Working)
    }
}

impl From<String> for SessionState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "STARTING" => SessionState::Starting,
            "SCAN_QR_CODE" => SessionState::ScanQrCode,
            "WORKING" => SessionState::Working,
            "FAILED" => SessionState::Failed,
            "STOPPED" => SessionState::Stopped,
            "CONFLICT" => SessionState::Conflict,
            "UNPAIRED" => SessionState::Unpaired,
            _ => SessionState::Other(s),
        }
    }
}

impl From<SessionState> for String {
    fn from(state: SessionState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session record from `GET /api/sessions/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub name: String,
    pub status: SessionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub me: Option<Value>,
}

/// A chat entry from `GET /api/chats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_envelope_is_interpreted() {
        let json = r#"{
            "event": "message",
            "session": "default",
            "payload": {
                "id": "false_628123@c.us_ABC",
                "from": "628123@c.us",
                "fromMe": false,
                "body": "jadwal sholat",
                "type": "chat",
                "timestamp": 1700000000
            }
        }"#;

        let envelope: EventEnvelope = serde_json::from_str(json).unwrap();
        let GatewayEvent::Message {
            session,
            message,
            raw,
        } = envelope.into_event().unwrap()
        else {
            panic!("expected message event");
        };

        assert_eq!(session.as_deref(), Some("default"));
        assert_eq!(message.from.as_deref(), Some("628123@c.us"));
        assert!(!message.from_me);
        assert_eq!(message.kind(), "chat");
        assert!(message.received_at().is_some());
        assert_eq!(raw["body"], "jadwal sholat");
    }

    #[test]
    fn session_status_envelope_is_interpreted() {
        let json = r#"{"event":"session.status","session":"default","payload":{"status":"SCAN_QR_CODE"}}"#;
        let envelope: EventEnvelope = serde_json::from_str(json).unwrap();

        match envelope.into_event().unwrap() {
            GatewayEvent::SessionStatus { status, .. } => {
                assert_eq!(status, SessionState::ScanQrCode)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_events_are_unsupported() {
        let json = r#"{"event":"message.reaction","payload":{}}"#;
        let envelope: EventEnvelope = serde_json::from_str(json).unwrap();
        assert!(matches!(
            envelope.into_event().unwrap(),
            GatewayEvent::Unsupported { event } if event == "message.reaction"
        ));
    }

    #[test]
    fn unknown_session_state_is_preserved() {
        let state: SessionState = serde_json::from_str("\"PAUSED\"").unwrap();
        assert_eq!(state, SessionState::Other("PAUSED".to_string()));
        assert_eq!(serde_json::to_string(&state).unwrap(), "\"PAUSED\"");
        assert_eq!(
            serde_json::to_string(&SessionState::Working).unwrap(),
            "\"WORKING\""
        );
    }

    #[test]
    fn message_defaults_to_text_kind() {
        let message: InboundMessage = serde_json::from_str(r#"{"from":"1@c.us"}"#).unwrap();
        assert_eq!(message.kind(), "text");
        assert!(message.body.is_none());
    }
}
