use async_trait::async_trait;
use bytes::Bytes;
use masjid_bot_protocol::{ChatId, ChatSummary, SessionInfo};
use masjid_bot_waha::WahaClient;
use serde_json::Value;

use super::{ChannelError, MessageContent, OutboundChannel, OutboundMessage};

#[async_trait]
impl OutboundChannel for WahaClient {
    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        let chat_id = ChatId::parse(&message.chat_id)?;
        let client = self.for_session(message.session.as_deref());

        match &message.content {
            MessageContent::Text { text } => {
                client.send_text(&chat_id, text).await?;
            }
            MessageContent::Image { url, caption } => {
                client.send_image(&chat_id, url, caption).await?;
            }
            MessageContent::Voice { url } => {
                client.send_voice(&chat_id, url).await?;
            }
            MessageContent::Document {
                url,
                filename,
                caption,
            } => {
                client.send_file(&chat_id, url, filename, caption).await?;
            }
            MessageContent::Location {
                latitude,
                longitude,
                name,
                address,
            } => {
                client
                    .send_location(&chat_id, *latitude, *longitude, name, address)
                    .await?;
            }
            MessageContent::Contact { contact } => {
                client.send_contact(&chat_id, contact).await?;
            }
        }
        Ok(())
    }

    async fn chats(&self, session: Option<&str>) -> Result<Vec<ChatSummary>, ChannelError> {
        Ok(self.for_session(session).chats().await?)
    }

    async fn contacts(&self, session: Option<&str>) -> Result<Vec<Value>, ChannelError> {
        Ok(self.for_session(session).contacts().await?)
    }

    async fn session_status(&self, session: Option<&str>) -> Result<SessionInfo, ChannelError> {
        Ok(self.for_session(session).session_info().await?)
    }

    async fn screenshot(&self, session: Option<&str>) -> Result<Bytes, ChannelError> {
        Ok(self.for_session(session).screenshot().await?)
    }

    async fn version(&self) -> Result<Value, ChannelError> {
        Ok(WahaClient::version(self).await?)
    }
}
