//! Masjid Bot - WhatsApp assistant for mosque communities, driven through a
//! WAHA gateway.

// ============================================================================
// Collaborators
// ============================================================================

pub mod automation;
pub mod channel;
pub mod config;
pub mod llm;
pub mod prayer;
pub mod sheets;

// ============================================================================
// Core
// ============================================================================

pub mod bot;
pub mod queue;

// ============================================================================
// HTTP surface
// ============================================================================

pub mod handlers;
pub mod response;
pub mod server;

#[cfg(test)]
mod testing;
