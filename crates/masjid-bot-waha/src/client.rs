//! HTTP client for the WAHA REST API.

use std::time::Duration;

use bytes::Bytes;
use masjid_bot_protocol::{ChatId, ChatSummary, SessionInfo, event_names};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;

use crate::error::WahaError;

const API_KEY_HEADER: &str = "X-Api-Key";

/// Connection settings for a WAHA instance.
#[derive(Debug, Clone)]
pub struct WahaConfig {
    pub base_url: String,
    pub api_key: String,
    pub session: String,
    pub timeout: Duration,
}

impl Default for WahaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            api_key: "admin".to_string(),
            session: "default".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Presence values accepted by `POST /api/presence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Available,
    Unavailable,
    Composing,
    Recording,
}

/// Client bound to one gateway session.
///
/// Cloning is cheap; [`WahaClient::for_session`] derives a client for another
/// session that shares the same connection pool.
#[derive(Debug, Clone)]
pub struct WahaClient {
    http: Client,
    base_url: String,
    api_key: String,
    session: String,
}

impl WahaClient {
    pub fn new(config: WahaConfig) -> Result<Self, WahaError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            session: config.session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// Same client, different session. `None` keeps the current one.
    pub fn for_session(&self, session: Option<&str>) -> Self {
        match session {
            Some(name) if !name.trim().is_empty() && name != self.session => Self {
                session: name.trim().to_string(),
                ..self.clone()
            },
            _ => self.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Health & sessions
    // ------------------------------------------------------------------------

    /// `GET /api/version`
    pub async fn version(&self) -> Result<Value, WahaError> {
        self.get("/api/version", &[]).await
    }

    /// `GET /api/sessions`
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, WahaError> {
        let value = self.get("/api/sessions", &[]).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `GET /api/sessions/{session}`
    pub async fn session_info(&self) -> Result<SessionInfo, WahaError> {
        let value = self
            .get(&format!("/api/sessions/{}", self.session), &[])
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Start the session unless it is already working.
    ///
    /// A 409 from the gateway means the session exists; its record is returned.
    pub async fn start_session(&self, webhook_url: Option<&str>) -> Result<SessionInfo, WahaError> {
        let sessions = self.list_sessions().await?;
        if let Some(existing) = sessions.into_iter().find(|s| s.name == self.session)
            && existing.status.is_working()
        {
            info!(session = %self.session, "Session already running");
            return Ok(existing);
        }

        let webhooks = match webhook_url {
            Some(url) => json!([{
                "url": url,
                "events": [event_names::MESSAGE, event_names::SESSION_STATUS],
            }]),
            None => json!([]),
        };
        let body = json!({
            "name": self.session,
            "config": { "proxy": null, "webhooks": webhooks },
        });

        match self.post("/api/sessions", &body).await {
            Ok(value) => {
                info!(session = %self.session, "Session started");
                Ok(serde_json::from_value(value)?)
            }
            Err(e) if e.status() == Some(409) => {
                info!(session = %self.session, "Session already exists");
                self.session_info().await
            }
            Err(e) => Err(e),
        }
    }

    /// `DELETE /api/sessions/{session}`
    pub async fn stop_session(&self) -> Result<Value, WahaError> {
        let path = format!("/api/sessions/{}", self.session);
        self.send(self.request(Method::DELETE, self.url(&path, &[])?))
            .await
    }

    /// Register a webhook for message and session events.
    pub async fn register_webhook(&self, url: &str) -> Result<Value, WahaError> {
        let body = json!({
            "url": url,
            "events": [
                event_names::MESSAGE,
                event_names::SESSION_STATUS,
                event_names::MESSAGE_REACTION,
                event_names::MESSAGE_REVOKED,
            ],
        });
        self.post(&format!("/api/sessions/{}/webhooks", self.session), &body)
            .await
    }

    /// QR code image for pairing.
    pub async fn qr_code(&self) -> Result<Bytes, WahaError> {
        self.get_bytes(&format!("/api/sessions/{}/qr", self.session), &[])
            .await
    }

    /// Screenshot of the gateway's WhatsApp Web page (PNG).
    pub async fn screenshot(&self) -> Result<Bytes, WahaError> {
        self.get_bytes("/api/screenshot", &[("session", self.session.as_str())])
            .await
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    pub async fn send_text(&self, chat_id: &ChatId, text: &str) -> Result<Value, WahaError> {
        let body = json!({ "session": self.session, "chatId": chat_id.as_str(), "text": text });
        let value = self.post("/api/sendText", &body).await?;
        debug!(chat_id = %chat_id, "Text sent");
        Ok(value)
    }

    pub async fn send_image(
        &self,
        chat_id: &ChatId,
        image_url: &str,
        caption: &str,
    ) -> Result<Value, WahaError> {
        let body = json!({
            "session": self.session,
            "chatId": chat_id.as_str(),
            "url": image_url,
            "caption": caption,
        });
        self.post("/api/sendImage", &body).await
    }

    /// Send a document by URL.
    pub async fn send_file(
        &self,
        chat_id: &ChatId,
        file_url: &str,
        filename: &str,
        caption: &str,
    ) -> Result<Value, WahaError> {
        let body = json!({
            "session": self.session,
            "chatId": chat_id.as_str(),
            "url": file_url,
            "filename": filename,
            "caption": caption,
        });
        self.post("/api/sendFile", &body).await
    }

    pub async fn send_voice(&self, chat_id: &ChatId, audio_url: &str) -> Result<Value, WahaError> {
        let body = json!({ "session": self.session, "chatId": chat_id.as_str(), "url": audio_url });
        self.post("/api/sendVoice", &body).await
    }

    pub async fn send_location(
        &self,
        chat_id: &ChatId,
        latitude: f64,
        longitude: f64,
        name: &str,
        address: &str,
    ) -> Result<Value, WahaError> {
        let body = json!({
            "session": self.session,
            "chatId": chat_id.as_str(),
            "latitude": latitude,
            "longitude": longitude,
            "name": name,
            "address": address,
        });
        self.post("/api/sendLocation", &body).await
    }

    /// Send a contact card. `contact` is passed through as the gateway expects it.
    pub async fn send_contact(&self, chat_id: &ChatId, contact: &Value) -> Result<Value, WahaError> {
        let body = json!({ "session": self.session, "chatId": chat_id.as_str(), "contact": contact });
        self.post("/api/sendContact", &body).await
    }

    pub async fn reply(
        &self,
        chat_id: &ChatId,
        text: &str,
        reply_to: &str,
    ) -> Result<Value, WahaError> {
        let body = json!({
            "session": self.session,
            "chatId": chat_id.as_str(),
            "text": text,
            "reply_to": reply_to,
        });
        self.post("/api/reply", &body).await
    }

    pub async fn react(
        &self,
        chat_id: &ChatId,
        message_id: &str,
        emoji: &str,
    ) -> Result<Value, WahaError> {
        let body = json!({
            "session": self.session,
            "chatId": chat_id.as_str(),
            "messageId": message_id,
            "reaction": emoji,
        });
        self.post("/api/reaction", &body).await
    }

    // ------------------------------------------------------------------------
    // Presence & chat state
    // ------------------------------------------------------------------------

    pub async fn mark_as_read(&self, chat_id: &ChatId, message_id: &str) -> Result<Value, WahaError> {
        let body = json!({
            "session": self.session,
            "chatId": chat_id.as_str(),
            "messageId": message_id,
        });
        self.post("/api/markAsRead", &body).await
    }

    pub async fn start_typing(&self, chat_id: &ChatId) -> Result<Value, WahaError> {
        self.post("/api/startTyping", &self.chat_body(chat_id)).await
    }

    pub async fn stop_typing(&self, chat_id: &ChatId) -> Result<Value, WahaError> {
        self.post("/api/stopTyping", &self.chat_body(chat_id)).await
    }

    pub async fn set_presence(&self, presence: Presence) -> Result<Value, WahaError> {
        let body = json!({ "session": self.session, "presence": presence });
        self.post("/api/presence", &body).await
    }

    pub async fn mute_chat(&self, chat_id: &ChatId) -> Result<Value, WahaError> {
        self.post("/api/chats/mute", &self.chat_body(chat_id)).await
    }

    pub async fn unmute_chat(&self, chat_id: &ChatId) -> Result<Value, WahaError> {
        self.post("/api/chats/unmute", &self.chat_body(chat_id)).await
    }

    pub async fn clear_chat(&self, chat_id: &ChatId) -> Result<Value, WahaError> {
        self.post("/api/chats/clear", &self.chat_body(chat_id)).await
    }

    pub async fn delete_chat(&self, chat_id: &ChatId) -> Result<Value, WahaError> {
        let url = self.url(&format!("/api/chats/{}", chat_id), &[])?;
        let body = json!({ "session": self.session });
        self.send(self.request(Method::DELETE, url).json(&body))
            .await
    }

    // ------------------------------------------------------------------------
    // Contacts & chats
    // ------------------------------------------------------------------------

    pub async fn chats(&self) -> Result<Vec<ChatSummary>, WahaError> {
        let value = self
            .get("/api/chats", &[("session", self.session.as_str())])
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn contacts(&self) -> Result<Vec<Value>, WahaError> {
        let value = self
            .get("/api/contacts", &[("session", self.session.as_str())])
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn contact(&self, contact_id: &str) -> Result<Value, WahaError> {
        self.get(
            &format!("/api/contacts/{contact_id}"),
            &[("session", self.session.as_str())],
        )
        .await
    }

    pub async fn profile_picture(&self, contact_id: &str) -> Result<Value, WahaError> {
        self.get(
            &format!("/api/contacts/{contact_id}/picture"),
            &[("session", self.session.as_str())],
        )
        .await
    }

    pub async fn block_contact(&self, contact_id: &str) -> Result<Value, WahaError> {
        let body = json!({ "session": self.session, "contactId": contact_id });
        self.post("/api/contacts/block", &body).await
    }

    pub async fn unblock_contact(&self, contact_id: &str) -> Result<Value, WahaError> {
        let body = json!({ "session": self.session, "contactId": contact_id });
        self.post("/api/contacts/unblock", &body).await
    }

    // ------------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------------

    pub async fn create_group(&self, name: &str, participants: &[ChatId]) -> Result<Value, WahaError> {
        let participants: Vec<&str> = participants.iter().map(ChatId::as_str).collect();
        let body = json!({ "session": self.session, "name": name, "participants": participants });
        let value = self.post("/api/groups", &body).await?;
        info!(group = name, "Group created");
        Ok(value)
    }

    pub async fn add_participant(&self, group_id: &ChatId, participant: &ChatId) -> Result<Value, WahaError> {
        self.post(
            &format!("/api/groups/{group_id}/participants"),
            &self.participants_body(participant),
        )
        .await
    }

    pub async fn remove_participant(
        &self,
        group_id: &ChatId,
        participant: &ChatId,
    ) -> Result<Value, WahaError> {
        let url = self.url(&format!("/api/groups/{group_id}/participants"), &[])?;
        self.send(
            self.request(Method::DELETE, url)
                .json(&self.participants_body(participant)),
        )
        .await
    }

    pub async fn promote_participant(
        &self,
        group_id: &ChatId,
        participant: &ChatId,
    ) -> Result<Value, WahaError> {
        self.post(
            &format!("/api/groups/{group_id}/admin/promote"),
            &self.participants_body(participant),
        )
        .await
    }

    pub async fn demote_participant(
        &self,
        group_id: &ChatId,
        participant: &ChatId,
    ) -> Result<Value, WahaError> {
        self.post(
            &format!("/api/groups/{group_id}/admin/demote"),
            &self.participants_body(participant),
        )
        .await
    }

    pub async fn set_group_description(
        &self,
        group_id: &ChatId,
        description: &str,
    ) -> Result<Value, WahaError> {
        let body = json!({ "session": self.session, "description": description });
        self.put(&format!("/api/groups/{group_id}/description"), &body)
            .await
    }

    pub async fn set_group_subject(&self, group_id: &ChatId, subject: &str) -> Result<Value, WahaError> {
        let body = json!({ "session": self.session, "subject": subject });
        self.put(&format!("/api/groups/{group_id}/subject"), &body)
            .await
    }

    // ------------------------------------------------------------------------
    // Media
    // ------------------------------------------------------------------------

    pub async fn download_media(&self, message_id: &str) -> Result<Bytes, WahaError> {
        self.get_bytes(
            &format!("/api/files/{message_id}"),
            &[("session", self.session.as_str())],
        )
        .await
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, WahaError> {
        let raw = format!("{}{}", self.base_url, path);
        if query.is_empty() {
            Ok(Url::parse(&raw)?)
        } else {
            Ok(Url::parse_with_params(&raw, query)?)
        }
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(API_KEY_HEADER, &self.api_key)
    }

    fn chat_body(&self, chat_id: &ChatId) -> Value {
        json!({ "session": self.session, "chatId": chat_id.as_str() })
    }

    fn participants_body(&self, participant: &ChatId) -> Value {
        json!({ "session": self.session, "participants": [participant.as_str()] })
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, WahaError> {
        let url = self.url(path, query)?;
        self.send(self.request(Method::GET, url)).await
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, WahaError> {
        let url = self.url(path, &[])?;
        self.send(self.request(Method::POST, url).json(body)).await
    }

    async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, WahaError> {
        let url = self.url(path, &[])?;
        self.send(self.request(Method::PUT, url).json(body)).await
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, WahaError> {
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(WahaError::Api {
                status: status.as_u16(),
                message: text.chars().take(500).collect(),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn get_bytes(&self, path: &str, query: &[(&str, &str)]) -> Result<Bytes, WahaError> {
        let url = self.url(path, query)?;
        let response = self.request(Method::GET, url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(WahaError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.bytes().await?)
    }
}
