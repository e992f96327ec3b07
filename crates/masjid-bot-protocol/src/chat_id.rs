//! WhatsApp chat identifiers.

use std::fmt;

use thiserror::Error;

/// Suffix of a one-to-one chat identifier.
pub const USER_SUFFIX: &str = "@c.us";

/// Suffix of a group chat identifier.
pub const GROUP_SUFFIX: &str = "@g.us";

/// Pseudo-chat used by WhatsApp for status updates.
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// Servers a destination may name after `@`.
const KNOWN_SERVERS: [&str; 6] = [
    "c.us",
    "g.us",
    "broadcast",
    "s.whatsapp.net",
    "lid",
    "newsletter",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatIdError {
    #[error("chat id is empty")]
    Empty,

    #[error("malformed chat id: {0}")]
    Malformed(String),
}

/// Strip a phone identifier down to its bare number.
///
/// `" 628123@c.us "` and `"+628123"` both become `"628123"`. Used for admin
/// allow-list entries, inbound senders and broadcast exclusions alike.
pub fn normalize_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let bare = trimmed.strip_suffix(USER_SUFFIX).unwrap_or(trimmed);
    bare.trim_start_matches('+').to_string()
}

/// A validated chat identifier in `user@server` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatId(String);

impl ChatId {
    /// Parse a destination identifier.
    ///
    /// Accepts full identifiers (`628123@c.us`, `1203634@g.us`) and bare phone
    /// numbers, which are completed with [`USER_SUFFIX`]. A full identifier
    /// must name a WhatsApp server; `abc@xyz` is rejected here rather than
    /// by the gateway.
    pub fn parse(raw: &str) -> Result<Self, ChatIdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ChatIdError::Empty);
        }

        if let Some((user, server)) = trimmed.split_once('@') {
            let valid = !user.is_empty()
                && !server.is_empty()
                && KNOWN_SERVERS.contains(&server)
                && !trimmed.chars().any(char::is_whitespace);
            if !valid {
                return Err(ChatIdError::Malformed(trimmed.to_string()));
            }
            return Ok(Self(trimmed.to_string()));
        }

        let number = normalize_number(trimmed);
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(ChatIdError::Malformed(trimmed.to_string()));
        }
        Ok(Self(format!("{number}{USER_SUFFIX}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before `@` (the phone number for one-to-one chats).
    pub fn user(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }

    pub fn is_group(&self) -> bool {
        self.0.ends_with(GROUP_SUFFIX)
    }

    pub fn is_status_broadcast(&self) -> bool {
        self.0 == STATUS_BROADCAST
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ChatId> for String {
    fn from(id: ChatId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_suffix_and_whitespace() {
        assert_eq!(normalize_number("628123456789@c.us"), "628123456789");
        assert_eq!(normalize_number(" 628123456789 "), "628123456789");
        assert_eq!(normalize_number("+628123456789"), "628123456789");
        assert_eq!(normalize_number("628123456789"), "628123456789");
    }

    #[test]
    fn parse_bare_number_adds_user_suffix() {
        let id = ChatId::parse("628123456789").unwrap();
        assert_eq!(id.as_str(), "628123456789@c.us");
        assert_eq!(id.user(), "628123456789");
        assert!(!id.is_group());
    }

    #[test]
    fn parse_keeps_full_identifiers() {
        let user = ChatId::parse("628123456789@c.us").unwrap();
        assert_eq!(user.as_str(), "628123456789@c.us");

        let group = ChatId::parse("120363025246125486@g.us").unwrap();
        assert!(group.is_group());

        let status = ChatId::parse("status@broadcast").unwrap();
        assert!(status.is_status_broadcast());
    }

    #[test]
    fn parse_rejects_malformed() {
        assert_eq!(ChatId::parse("   "), Err(ChatIdError::Empty));
        assert!(matches!(
            ChatId::parse("not a number"),
            Err(ChatIdError::Malformed(_))
        ));
        assert!(matches!(
            ChatId::parse("@c.us"),
            Err(ChatIdError::Malformed(_))
        ));
        assert!(matches!(
            ChatId::parse("628@c.us@x"),
            Err(ChatIdError::Malformed(_))
        ));
        assert!(matches!(
            ChatId::parse("628 123@c.us"),
            Err(ChatIdError::Malformed(_))
        ));
    }

    #[test]
    fn parse_rejects_unknown_server() {
        assert!(matches!(
            ChatId::parse("abc@xyz"),
            Err(ChatIdError::Malformed(_))
        ));
        assert!(matches!(
            ChatId::parse("628123@c.us.evil"),
            Err(ChatIdError::Malformed(_))
        ));
        assert!(ChatId::parse("628123@s.whatsapp.net").is_ok());
        assert!(ChatId::parse("120363@newsletter").is_ok());
    }
}
