//! HTTP request handlers.

mod api;
mod health;
mod webhook;

pub use api::{
    ai_chat, list_faq, prayer_times, screenshot, search_faq, session_status, sheets_test,
    simulate_message,
};
pub use health::{health, index, not_found, status};
pub use webhook::{
    admin, automation_event, broadcast, prayer_notification, send, send_bulk, send_image,
    send_message, waha_event,
};

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Trimmed non-empty string field.
fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
