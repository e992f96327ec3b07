//! WAHA gateway client.
//!
//! WAHA holds the WhatsApp session and exposes it over HTTP. This crate wraps
//! that API ([`WahaClient`]) and its event WebSocket ([`EventListener`]). It
//! performs no retries of its own; callers decide what a failure means.

mod client;
mod error;
mod events;

pub use client::{Presence, WahaClient, WahaConfig};
pub use error::WahaError;
pub use events::{EventListener, parse_frame};
