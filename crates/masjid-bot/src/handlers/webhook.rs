//! `/webhook/*` handlers: send requests, broadcasts, admin commands and
//! gateway/automation callbacks.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use masjid_bot_protocol::{EventEnvelope, USER_SUFFIX, normalize_number};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{required, timestamp};
use crate::bot::prayer_reminder_text;
use crate::channel::{MessageContent, OutboundMessage};
use crate::queue::{MessageId, Priority};
use crate::response::{bad_gateway, bad_request, forbidden};
use crate::server::AppState;
use crate::sheets::AdminLogEntry;

const ADMIN_COMMANDS: [&str; 4] = ["broadcast", "status", "stats", "screenshot"];
const AUTOMATION_EVENTS: [&str; 3] = ["message_reply", "broadcast", "prayer_reminder"];

fn parse_priority(raw: Option<&str>) -> Result<Priority, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Priority::default()),
        Some(p) => match p.to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            _ => Err(format!("Unknown priority: {p}")),
        },
    }
}

/// Epoch milliseconds (number or numeric string) or an RFC 3339 timestamp.
fn parse_send_at(raw: &Value) -> Result<Option<DateTime<Utc>>, String> {
    let at = match raw {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(millis) => DateTime::<Utc>::from_timestamp_millis(millis),
            Err(_) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        },
        _ => None,
    };
    at.map(Some).ok_or_else(|| format!("Invalid sendAt: {raw}"))
}

/// Bare numbers get the one-to-one suffix; anything with `@` is kept.
fn chat_id_for(number: &str) -> String {
    if number.contains('@') {
        number.to_string()
    } else {
        format!("{}{USER_SUFFIX}", normalize_number(number))
    }
}

/// A validated send, ready for the queue.
struct PreparedSend {
    message: OutboundMessage,
    priority: Priority,
    send_at: Option<DateTime<Utc>>,
}

impl PreparedSend {
    fn now(message: OutboundMessage, priority: Priority) -> Self {
        Self {
            message,
            priority,
            send_at: None,
        }
    }

    /// Queue the message. Returns its id and the instant it is held until,
    /// if that is still in the future.
    fn enqueue(self, state: &AppState) -> (MessageId, Option<DateTime<Utc>>) {
        let kind = self.message.content.kind();
        let chat_id = self.message.chat_id.clone();
        let now = Utc::now();
        let send_at = self.send_at.filter(|at| *at > now);

        let id = match send_at {
            Some(at) => {
                let delay = (at - now).to_std().unwrap_or_default();
                state
                    .queue
                    .enqueue_at(self.message, self.priority, Instant::now() + delay)
            }
            None => state.queue.enqueue(self.message, self.priority),
        };
        debug!(
            message_id = %id,
            chat_id = %chat_id,
            kind,
            scheduled = send_at.is_some(),
            "Send request queued"
        );
        (id, send_at)
    }
}

fn queued(state: &AppState, prepared: PreparedSend) -> Response {
    let (id, send_at) = prepared.enqueue(state);
    let mut body = json!({
        "success": true,
        "messageId": id,
        "status": "queued",
        "timestamp": timestamp(),
    });
    if let Some(at) = send_at {
        body["status"] = json!("scheduled");
        body["sendAt"] = json!(at.to_rfc3339_opts(SecondsFormat::Millis, true));
    }
    Json(body).into_response()
}

// ============================================================================
// Send
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub chat_id: Option<String>,
    pub text: Option<String>,
    pub session_name: Option<String>,
    pub priority: Option<String>,
}

/// POST /webhook/send-message
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    let (Some(chat_id), Some(text)) = (required(&req.chat_id), required(&req.text)) else {
        return bad_request("Missing required fields: chatId and text").into_response();
    };
    let priority = match parse_priority(req.priority.as_deref()) {
        Ok(p) => p,
        Err(e) => return bad_request(e).into_response(),
    };

    let message = OutboundMessage::text(chat_id, text).with_session(req.session_name);
    queued(&state, PreparedSend::now(message, priority))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendImageRequest {
    pub chat_id: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub caption: String,
    pub session_name: Option<String>,
    pub priority: Option<String>,
}

/// POST /webhook/send-image
pub async fn send_image(
    State(state): State<AppState>,
    Json(req): Json<SendImageRequest>,
) -> Response {
    let (Some(chat_id), Some(url)) = (required(&req.chat_id), required(&req.image_url)) else {
        return bad_request("Missing required fields: chatId and imageUrl").into_response();
    };
    let priority = match parse_priority(req.priority.as_deref()) {
        Ok(p) => p,
        Err(e) => return bad_request(e).into_response(),
    };

    let message = OutboundMessage {
        session: req.session_name,
        chat_id: chat_id.to_string(),
        content: MessageContent::Image {
            url: url.to_string(),
            caption: req.caption,
        },
    };
    queued(&state, PreparedSend::now(message, priority))
}

/// Generic send: `{chatId, sessionName?, priority?, sendAt?, type, ...}`
/// where the remaining fields are the payload of `type`. A payload with
/// `text` and no `type` is a text message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub chat_id: Option<String>,
    pub session_name: Option<String>,
    pub priority: Option<String>,
    #[serde(default, alias = "scheduleTime")]
    pub send_at: Value,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

impl SendRequest {
    fn prepare(self) -> Result<PreparedSend, String> {
        let chat_id = required(&self.chat_id)
            .ok_or_else(|| "Missing required field: chatId".to_string())?
            .to_string();

        let mut content = self.content;
        if !content.contains_key("type") && content.contains_key("text") {
            content.insert("type".to_string(), json!("text"));
        }
        let content: MessageContent = serde_json::from_value(Value::Object(content))
            .map_err(|e| format!("Invalid message content: {e}"))?;
        let priority = parse_priority(self.priority.as_deref())?;
        let send_at = parse_send_at(&self.send_at)?;

        Ok(PreparedSend {
            message: OutboundMessage {
                session: self.session_name,
                chat_id,
                content,
            },
            priority,
            send_at,
        })
    }
}

/// POST /webhook/send
pub async fn send(State(state): State<AppState>, Json(req): Json<SendRequest>) -> Response {
    match req.prepare() {
        Ok(prepared) => queued(&state, prepared),
        Err(e) => bad_request(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SendBulkRequest {
    #[serde(default)]
    pub messages: Vec<SendRequest>,
}

/// POST /webhook/send-bulk
///
/// Each entry is validated and queued on its own; one bad entry does not
/// reject the others.
pub async fn send_bulk(
    State(state): State<AppState>,
    Json(req): Json<SendBulkRequest>,
) -> Response {
    if req.messages.is_empty() {
        return bad_request("Missing required field: messages").into_response();
    }

    let total = req.messages.len();
    let mut results = Vec::with_capacity(total);
    let mut failed = 0;
    for item in req.messages {
        let chat_id = item.chat_id.clone();
        match item.prepare() {
            Ok(prepared) => {
                let (id, _) = prepared.enqueue(&state);
                results.push(json!({ "success": true, "messageId": id, "chatId": chat_id }));
            }
            Err(error) => {
                failed += 1;
                results.push(json!({ "success": false, "error": error, "chatId": chat_id }));
            }
        }
    }

    info!(total, failed, "Bulk send queued");
    Json(json!({
        "success": true,
        "total": total,
        "queued": total - failed,
        "failed": failed,
        "results": results,
        "timestamp": timestamp(),
    }))
    .into_response()
}

// ============================================================================
// Broadcast
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    pub message: Option<String>,
    #[serde(default)]
    pub exclude_numbers: Vec<String>,
    pub session_name: Option<String>,
}

/// POST /webhook/broadcast
pub async fn broadcast(
    State(state): State<AppState>,
    Json(req): Json<BroadcastRequest>,
) -> Response {
    let Some(message) = required(&req.message) else {
        return bad_request("Missing required field: message").into_response();
    };

    match state
        .bot
        .broadcast(message, &req.exclude_numbers, req.session_name)
        .await
    {
        Ok(summary) => Json(json!({
            "success": true,
            "message": "Broadcast queued",
            "recipients": summary.recipients,
            "excluded": summary.excluded,
            "messageIds": summary.message_ids,
            "timestamp": timestamp(),
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Broadcast failed: chats unavailable");
            bad_gateway(format!("Failed to list chats: {e}")).into_response()
        }
    }
}

// ============================================================================
// Admin
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRequest {
    pub command: Option<String>,
    pub admin_number: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// A command that ran and failed; carries the response to send.
struct CommandFailure {
    response: Response,
    error: String,
}

/// POST /webhook/admin
pub async fn admin(State(state): State<AppState>, Json(req): Json<AdminRequest>) -> Response {
    let admin_number = match required(&req.admin_number) {
        Some(number) if state.admins.contains(number) => normalize_number(number),
        _ => {
            warn!(admin_number = ?req.admin_number, "Rejected admin command from non-admin");
            return forbidden("Unauthorized: Not an admin number").into_response();
        }
    };

    let command = required(&req.command).unwrap_or_default().to_string();
    if !ADMIN_COMMANDS.contains(&command.as_str()) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": "Unknown admin command",
                "availableCommands": ADMIN_COMMANDS,
            })),
        )
            .into_response();
    }

    info!(admin = %admin_number, command = %command, "Admin command received");
    let outcome = match command.as_str() {
        "broadcast" => admin_broadcast(&state, &req.data).await,
        "status" => Ok(admin_status(&state).await),
        "stats" => Ok(admin_stats(&state).await),
        _ => admin_screenshot(&state).await,
    };

    let (success, error) = match &outcome {
        Ok(_) => (true, None),
        Err(failure) => (false, Some(failure.error.clone())),
    };
    if state.sheets.is_configured() {
        let entry = AdminLogEntry {
            admin_number,
            action: command.clone(),
            details: req.data.to_string(),
            success,
            error,
        };
        if let Err(e) = state.sheets.log_admin(&entry).await {
            warn!(error = %e, "Failed to log admin command");
        }
    }

    match outcome {
        Ok(result) => Json(json!({
            "success": true,
            "command": command,
            "result": result,
            "timestamp": timestamp(),
        }))
        .into_response(),
        Err(failure) => failure.response,
    }
}

async fn admin_broadcast(state: &AppState, data: &Value) -> Result<Value, CommandFailure> {
    let Some(message) = data
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
    else {
        let error = "Missing required field: data.message";
        return Err(CommandFailure {
            response: bad_request(error).into_response(),
            error: error.to_string(),
        });
    };
    let exclude: Vec<String> = data
        .get("excludeNumbers")
        .and_then(Value::as_array)
        .map(|numbers| {
            numbers
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    match state.bot.broadcast(message, &exclude, None).await {
        Ok(summary) => Ok(json!({
            "action": "admin_broadcast",
            "status": "queued",
            "recipients": summary.recipients,
            "excluded": summary.excluded,
        })),
        Err(e) => Err(CommandFailure {
            response: bad_gateway(format!("Failed to list chats: {e}")).into_response(),
            error: e.to_string(),
        }),
    }
}

async fn admin_status(state: &AppState) -> Value {
    let session = match state.channel.session_status(None).await {
        Ok(info) => json!(info),
        Err(e) => json!({ "error": e.to_string() }),
    };
    let chats = state.bot.chat_stats(None).await;
    json!({
        "action": "status_check",
        "status": "online",
        "uptimeSeconds": state.uptime().as_secs(),
        "session": session,
        "totalChats": chats.total_chats,
        "privateChats": chats.private_chats,
        "groupChats": chats.group_chats,
        "totalContacts": chats.total_contacts,
        "queue": state.queue.snapshot(),
    })
}

async fn admin_stats(state: &AppState) -> Value {
    let usage = if state.sheets.is_configured() {
        match state.sheets.usage_stats().await {
            Ok(stats) => json!(stats),
            Err(e) => {
                warn!(error = %e, "Failed to read usage statistics");
                json!({ "error": e.to_string() })
            }
        }
    } else {
        Value::Null
    };
    json!({
        "action": "stats",
        "uptimeSeconds": state.uptime().as_secs(),
        "queue": state.queue.snapshot(),
        "usage": usage,
    })
}

async fn admin_screenshot(state: &AppState) -> Result<Value, CommandFailure> {
    match state.channel.screenshot(None).await {
        Ok(png) => Ok(json!({
            "action": "screenshot",
            "mimeType": "image/png",
            "data": STANDARD.encode(&png),
        })),
        Err(e) => Err(CommandFailure {
            response: bad_gateway(format!("Screenshot failed: {e}")).into_response(),
            error: e.to_string(),
        }),
    }
}

// ============================================================================
// Gateway events
// ============================================================================

/// POST /webhook/waha
///
/// Acknowledges immediately; the event is handled in the background so the
/// gateway never waits on the automation webhook.
pub async fn waha_event(
    State(state): State<AppState>,
    Json(envelope): Json<EventEnvelope>,
) -> Response {
    let name = envelope.event.clone();
    let event = match envelope.into_event() {
        Ok(event) => event,
        Err(e) => {
            return bad_request(format!("Invalid {name} payload: {e}")).into_response();
        }
    };

    let bot = state.bot.clone();
    tokio::spawn(async move { bot.handle_event(event).await });

    Json(json!({ "success": true, "event": name })).into_response()
}

// ============================================================================
// Automation callbacks
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AutomationEvent {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyPayload {
    number: Option<String>,
    message: Option<String>,
    session_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrayerReminder {
    pub prayer_name: Option<String>,
    pub time: Option<String>,
    pub city: Option<String>,
}

/// POST /webhook/n8n
pub async fn automation_event(
    State(state): State<AppState>,
    Json(event): Json<AutomationEvent>,
) -> Response {
    let kind = event.kind.unwrap_or_default();
    debug!(kind = %kind, "Automation callback received");

    match kind.as_str() {
        "message_reply" => {
            let Ok(payload) = serde_json::from_value::<ReplyPayload>(event.payload) else {
                return bad_request("Invalid message_reply payload").into_response();
            };
            let (Some(number), Some(message)) =
                (required(&payload.number), required(&payload.message))
            else {
                return bad_request("Missing required fields: payload.number and payload.message")
                    .into_response();
            };
            let outbound =
                OutboundMessage::text(chat_id_for(number), message).with_session(payload.session_name);
            let id = state.queue.enqueue(outbound, Priority::High);
            Json(json!({
                "success": true,
                "action": "message_queued",
                "messageId": id,
            }))
            .into_response()
        }
        "broadcast" => {
            let Ok(payload) = serde_json::from_value::<BroadcastRequest>(event.payload) else {
                return bad_request("Invalid broadcast payload").into_response();
            };
            let Some(message) = required(&payload.message) else {
                return bad_request("Missing required field: payload.message").into_response();
            };
            match state
                .bot
                .broadcast(message, &payload.exclude_numbers, payload.session_name)
                .await
            {
                Ok(summary) => Json(json!({
                    "success": true,
                    "action": "broadcast_queued",
                    "recipients": summary.recipients,
                    "excluded": summary.excluded,
                }))
                .into_response(),
                Err(e) => bad_gateway(format!("Failed to list chats: {e}")).into_response(),
            }
        }
        "prayer_reminder" => {
            let reminder = serde_json::from_value(event.payload).unwrap_or_default();
            match send_prayer_reminder(&state, reminder).await {
                Ok(mut body) => {
                    body["action"] = json!("prayer_reminder_queued");
                    Json(body).into_response()
                }
                Err(response) => response,
            }
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": "Unknown webhook type",
                "type": kind,
                "availableTypes": AUTOMATION_EVENTS,
            })),
        )
            .into_response(),
    }
}

/// POST /webhook/prayer-notification
pub async fn prayer_notification(
    State(state): State<AppState>,
    Json(reminder): Json<PrayerReminder>,
) -> Response {
    match send_prayer_reminder(&state, reminder).await {
        Ok(mut body) => {
            body["message"] = json!("Prayer notification queued");
            Json(body).into_response()
        }
        Err(response) => response,
    }
}

async fn send_prayer_reminder(state: &AppState, reminder: PrayerReminder) -> Result<Value, Response> {
    let (Some(prayer), Some(time)) = (required(&reminder.prayer_name), required(&reminder.time))
    else {
        return Err(bad_request("Prayer name and time are required").into_response());
    };
    let city = required(&reminder.city).unwrap_or(state.prayer.default_city());

    info!(prayer, time, city, "Prayer reminder");
    let text = prayer_reminder_text(prayer, time, city);
    let summary = state
        .bot
        .broadcast(&text, &[], None)
        .await
        .map_err(|e| bad_gateway(format!("Failed to list chats: {e}")).into_response())?;

    Ok(json!({
        "success": true,
        "prayerName": prayer,
        "time": time,
        "city": city,
        "recipients": summary.recipients,
        "timestamp": timestamp(),
    }))
}
