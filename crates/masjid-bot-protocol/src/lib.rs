//! Gateway protocol types for masjid-bot.
//!
//! These types describe what travels between the bot service and the hosted
//! WhatsApp gateway, independent of the transport (HTTP webhook or WebSocket):
//!
//! - [`ChatId`]: a validated WhatsApp chat identifier (`628123@c.us`, `1203@g.us`)
//! - [`normalize_number`]: the one place where identifier suffixes are stripped
//! - [`EventEnvelope`] / [`GatewayEvent`]: inbound events (`message`, `session.status`)
//! - [`SessionState`] / [`SessionInfo`]: gateway session bookkeeping

mod chat_id;
mod events;

pub use chat_id::{
    ChatId, ChatIdError, GROUP_SUFFIX, STATUS_BROADCAST, USER_SUFFIX, normalize_number,
};
pub use events::{
    ChatSummary, EventEnvelope, GatewayEvent, InboundMessage, SessionInfo, SessionState,
    SessionStatusData, event_names,
};
