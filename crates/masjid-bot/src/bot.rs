//! Inbound message handling, admin notifications and broadcasts.
//!
//! Everything the bot says goes through the [`MessageQueue`]: replies at high
//! priority, admin notices at normal, broadcasts at low.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use masjid_bot_protocol::{
    ChatSummary, GROUP_SUFFIX, GatewayEvent, InboundMessage, STATUS_BROADCAST, SessionState,
    USER_SUFFIX, normalize_number,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::automation::{AutomationClient, AutomationRequest};
use crate::channel::{ChannelError, OutboundChannel, OutboundMessage};
use crate::config::AdminList;
use crate::queue::{MessageId, MessageQueue, Priority};
use crate::sheets::{MessageLogEntry, SheetsClient};

pub const MAINTENANCE_REPLY: &str = "🔧 Bot sedang dalam maintenance. Silakan coba lagi nanti.";
pub const BUSY_REPLY: &str = "🙏 Maaf, sistem sedang sibuk. Silakan coba lagi dalam beberapa menit.";
pub const ADMIN_NOTIFICATION_HEADER: &str = "🔔 ADMIN NOTIFICATION";

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    FromMe,
    NoSender,
    Group,
    StatusBroadcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Automation,
    Faq,
    Maintenance,
    Apology,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    Ignored(IgnoreReason),
    /// The automation answered without a reply.
    NoReply,
    Replied {
        message_id: MessageId,
        source: ReplySource,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastSummary {
    pub recipients: usize,
    pub excluded: usize,
    pub message_ids: Vec<MessageId>,
}

/// Chat and contact counts for a session. A listing the gateway cannot
/// serve counts as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStats {
    pub total_chats: usize,
    pub private_chats: usize,
    pub group_chats: usize,
    pub total_contacts: usize,
}

/// Result of a simulated inbound message (`POST /api/message`).
#[derive(Debug, Clone, Serialize)]
pub struct SimulatedExchange {
    pub original_message: Value,
    pub n8n_response: Value,
    pub sheets_logged: bool,
}

// ============================================================================
// Broadcast targeting
// ============================================================================

/// One-to-one chats not excluded. Exclusions match bare or suffixed ids.
pub fn broadcast_targets(chats: &[ChatSummary], exclude: &[String]) -> (Vec<String>, usize) {
    let excluded_numbers: HashSet<String> = exclude
        .iter()
        .map(|e| normalize_number(e))
        .filter(|e| !e.is_empty())
        .collect();

    let candidates = chats
        .iter()
        .filter(|c| !c.id.ends_with(GROUP_SUFFIX) && c.id != STATUS_BROADCAST);

    let mut targets = Vec::new();
    let mut excluded = 0;
    for chat in candidates {
        if excluded_numbers.contains(&normalize_number(&chat.id)) {
            excluded += 1;
        } else {
            targets.push(chat.id.clone());
        }
    }
    (targets, excluded)
}

/// Admin notice for a session state, if that state is worth one.
pub fn session_notice(state: &SessionState) -> Option<&'static str> {
    match state {
        SessionState::Conflict | SessionState::Unpaired => {
            Some("⚠️ Bot mengalami konflik session. Perlu restart dan autentikasi ulang.")
        }
        SessionState::Working => Some("✅ Bot berhasil terhubung dan siap beroperasi!"),
        SessionState::ScanQrCode => {
            Some("📱 Bot memerlukan scan QR code. Silakan buka dashboard WAHA.")
        }
        _ => None,
    }
}

pub fn prayer_reminder_text(prayer: &str, time: &str, city: &str) -> String {
    format!(
        "🕌 *Waktu Sholat {prayer}*\n\n⏰ Waktu: {time}\n📍 Lokasi: {city}\n\n🤲 Mari bersiap untuk menunaikan sholat {prayer}"
    )
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// Bot
// ============================================================================

#[derive(Clone)]
pub struct Bot {
    queue: MessageQueue,
    channel: Arc<dyn OutboundChannel>,
    admins: Arc<AdminList>,
    automation: AutomationClient,
    sheets: SheetsClient,
}

impl Bot {
    pub fn new(
        queue: MessageQueue,
        channel: Arc<dyn OutboundChannel>,
        admins: Arc<AdminList>,
        automation: AutomationClient,
        sheets: SheetsClient,
    ) -> Self {
        Self {
            queue,
            channel,
            admins,
            automation,
            sheets,
        }
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    pub fn admins(&self) -> &AdminList {
        &self.admins
    }

    pub async fn handle_event(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Message {
                session,
                message,
                raw,
            } => {
                self.handle_message(session, &message, raw).await;
            }
            GatewayEvent::SessionStatus { session, status } => {
                info!(session = ?session, status = %status, "Gateway session status changed");
                self.handle_session_status(&status);
            }
            GatewayEvent::Unsupported { event } => {
                debug!(event = %event, "Ignoring gateway event");
            }
        }
    }

    pub async fn handle_message(
        &self,
        session: Option<String>,
        message: &InboundMessage,
        raw: Value,
    ) -> InboundOutcome {
        let from = match message.from.as_deref() {
            _ if message.from_me => return InboundOutcome::Ignored(IgnoreReason::FromMe),
            None | Some("") => return InboundOutcome::Ignored(IgnoreReason::NoSender),
            Some(f) if f.ends_with(GROUP_SUFFIX) => {
                return InboundOutcome::Ignored(IgnoreReason::Group);
            }
            Some(STATUS_BROADCAST) => {
                return InboundOutcome::Ignored(IgnoreReason::StatusBroadcast);
            }
            Some(f) => f,
        };

        let number = normalize_number(from);
        let is_admin = self.admins.contains(&number);
        let text = message.body.clone().unwrap_or_default();
        info!(from = %number, is_admin, kind = message.kind(), "Message received");

        let (reply, source, message_type) = if self.automation.is_configured() {
            let request = AutomationRequest {
                number: number.clone(),
                text: text.clone(),
                timestamp: now_iso(),
                message_id: message.id.clone(),
                is_admin,
                message_type: message.kind().to_string(),
                waha_message: raw,
            };
            match self.automation.forward(&request).await {
                Ok(response) => match response.reply {
                    Some(reply) => (
                        reply,
                        ReplySource::Automation,
                        response.message_type.unwrap_or_else(|| message.kind().to_string()),
                    ),
                    None => return InboundOutcome::NoReply,
                },
                Err(e) => {
                    warn!(from = %number, error = %e, "Automation webhook failed");
                    (BUSY_REPLY.to_string(), ReplySource::Apology, "error".to_string())
                }
            }
        } else {
            match self.faq_answer(&text).await {
                Some(answer) => (answer, ReplySource::Faq, "faq".to_string()),
                None => (
                    MAINTENANCE_REPLY.to_string(),
                    ReplySource::Maintenance,
                    message.kind().to_string(),
                ),
            }
        };

        let outbound = OutboundMessage::text(from, reply.clone()).with_session(session);
        let message_id = self.queue.enqueue(outbound, Priority::High);

        if self.sheets.is_configured() {
            let entry = MessageLogEntry {
                number,
                text,
                message_type,
                reply,
                is_admin,
                source: String::new(),
            };
            if let Err(e) = self.sheets.log_message(&entry).await {
                warn!(error = %e, "Failed to log message");
            }
        }

        InboundOutcome::Replied { message_id, source }
    }

    async fn faq_answer(&self, text: &str) -> Option<String> {
        if !self.sheets.is_configured() || text.trim().is_empty() {
            return None;
        }
        match self.sheets.search_faq(text).await {
            Ok(hit) => hit.map(|faq| faq.answer),
            Err(e) => {
                warn!(error = %e, "FAQ lookup failed");
                None
            }
        }
    }

    /// Notify admins about a session state change. Returns notices queued.
    pub fn handle_session_status(&self, state: &SessionState) -> usize {
        match session_notice(state) {
            Some(notice) => self.notify_admins(notice).len(),
            None => 0,
        }
    }

    pub fn notify_admins(&self, text: &str) -> Vec<MessageId> {
        if self.admins.is_empty() {
            warn!("No admin numbers configured, notification dropped");
            return Vec::new();
        }
        let body = format!("{ADMIN_NOTIFICATION_HEADER}\n\n{text}");
        self.admins
            .iter()
            .map(|admin| {
                let chat_id = format!("{admin}{USER_SUFFIX}");
                self.queue
                    .enqueue(OutboundMessage::text(chat_id, body.clone()), Priority::Normal)
            })
            .collect()
    }

    /// Queue `text` for every one-to-one chat not in `exclude`.
    pub async fn broadcast(
        &self,
        text: &str,
        exclude: &[String],
        session: Option<String>,
    ) -> Result<BroadcastSummary, ChannelError> {
        let chats = self.channel.chats(session.as_deref()).await?;
        let (targets, excluded) = broadcast_targets(&chats, exclude);

        let message_ids: Vec<MessageId> = targets
            .into_iter()
            .map(|chat_id| {
                let message = OutboundMessage::text(chat_id, text).with_session(session.clone());
                self.queue.enqueue(message, Priority::Low)
            })
            .collect();

        info!(
            recipients = message_ids.len(),
            excluded, "Broadcast queued"
        );
        Ok(BroadcastSummary {
            recipients: message_ids.len(),
            excluded,
            message_ids,
        })
    }

    pub async fn chat_stats(&self, session: Option<&str>) -> ChatStats {
        let (chats, contacts) =
            tokio::join!(self.channel.chats(session), self.channel.contacts(session));
        let chats = chats.unwrap_or_else(|e| {
            warn!(error = %e, "Could not list chats for status");
            Vec::new()
        });
        let total_contacts = contacts.map(|c| c.len()).unwrap_or_else(|e| {
            warn!(error = %e, "Could not list contacts for status");
            0
        });

        let group_chats = chats.iter().filter(|c| c.id.ends_with(GROUP_SUFFIX)).count();
        ChatStats {
            total_chats: chats.len(),
            private_chats: chats.len() - group_chats,
            group_chats,
            total_contacts,
        }
    }

    /// Run a message through the automation webhook without a real sender.
    pub async fn simulate(&self, number: &str, text: &str) -> SimulatedExchange {
        let request = AutomationRequest {
            number: number.to_string(),
            text: text.to_string(),
            timestamp: now_iso(),
            message_id: format!("test_{}", Utc::now().timestamp_millis()),
            is_admin: false,
            message_type: "text".to_string(),
            waha_message: Value::Null,
        };

        let (n8n_response, reply) = if self.automation.is_configured() {
            match self.automation.forward(&request).await {
                Ok(response) => (response.raw, response.reply),
                Err(e) => {
                    warn!(error = %e, "Automation webhook failed");
                    (serde_json::json!({ "error": "N8N webhook not available" }), None)
                }
            }
        } else {
            (Value::Null, None)
        };

        let sheets_logged = if self.sheets.is_configured() {
            let entry = MessageLogEntry {
                number: number.to_string(),
                text: text.to_string(),
                message_type: "api_test".to_string(),
                reply: reply.unwrap_or_else(|| "No reply from n8n".to_string()),
                is_admin: false,
                source: "api_test".to_string(),
            };
            match self.sheets.log_message(&entry).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, "Failed to log simulated message");
                    false
                }
            }
        } else {
            false
        };

        SimulatedExchange {
            original_message: serde_json::to_value(&request).unwrap_or(Value::Null),
            n8n_response,
            sheets_logged,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
