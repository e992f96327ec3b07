//! Outbound channel abstraction.
//!
//! The queue and handlers only see [`OutboundChannel`]; the gateway client is
//! one implementation of it.

mod waha;

use async_trait::async_trait;
use bytes::Bytes;
use masjid_bot_protocol::{ChatIdError, ChatSummary, SessionInfo};
use masjid_bot_waha::WahaError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// Messages
// ============================================================================

/// A send request as held by the queue.
///
/// `chat_id` stays raw until dispatch so that a malformed destination fails
/// the send, not the enqueue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub chat_id: String,
    pub content: MessageContent,
}

impl OutboundMessage {
    pub fn text(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session: None,
            chat_id: chat_id.into(),
            content: MessageContent::Text { text: text.into() },
        }
    }

    pub fn with_session(mut self, session: Option<String>) -> Self {
        self.session = session;
        self
    }
}

/// Payload of a send, one variant per gateway send operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Image {
        url: String,
        #[serde(default)]
        caption: String,
    },
    Voice {
        url: String,
    },
    Document {
        url: String,
        filename: String,
        #[serde(default)]
        caption: String,
    },
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        name: String,
        #[serde(default)]
        address: String,
    },
    Contact {
        contact: Value,
    },
}

impl MessageContent {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageContent::Text { .. } => "text",
            MessageContent::Image { .. } => "image",
            MessageContent::Voice { .. } => "voice",
            MessageContent::Document { .. } => "document",
            MessageContent::Location { .. } => "location",
            MessageContent::Contact { .. } => "contact",
        }
    }
}

// ============================================================================
// Channel trait
// ============================================================================

/// A remote messaging gateway. Implementations do not retry.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError>;

    /// Known chats for a session (`None` = default session).
    async fn chats(&self, session: Option<&str>) -> Result<Vec<ChatSummary>, ChannelError>;

    /// Raw contact records; only counted, never interpreted.
    async fn contacts(&self, session: Option<&str>) -> Result<Vec<Value>, ChannelError>;

    async fn session_status(&self, session: Option<&str>) -> Result<SessionInfo, ChannelError>;

    async fn screenshot(&self, session: Option<&str>) -> Result<Bytes, ChannelError>;

    async fn version(&self) -> Result<Value, ChannelError>;
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid destination: {0}")]
    InvalidChatId(#[from] ChatIdError),

    #[error(transparent)]
    Gateway(#[from] WahaError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_is_tagged_by_type() {
        let content: MessageContent = serde_json::from_value(json!({
            "type": "image",
            "url": "http://img/1.png",
        }))
        .unwrap();
        assert_eq!(
            content,
            MessageContent::Image {
                url: "http://img/1.png".to_string(),
                caption: String::new(),
            }
        );
        assert_eq!(content.kind(), "image");
    }

    #[test]
    fn unknown_content_type_is_rejected() {
        let result: Result<MessageContent, _> =
            serde_json::from_value(json!({ "type": "sticker", "url": "x" }));
        assert!(result.is_err());
    }

    #[test]
    fn text_builder_keeps_raw_chat_id() {
        let message = OutboundMessage::text("not a number", "hi").with_session(Some("s2".into()));
        assert_eq!(message.chat_id, "not a number");
        assert_eq!(message.session.as_deref(), Some("s2"));
        assert_eq!(message.content.kind(), "text");
    }
}
