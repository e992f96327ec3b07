//! In-memory channel and router harness used by unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use masjid_bot_protocol::{ChatId, ChatSummary, SessionInfo, SessionState};
use masjid_bot_waha::WahaError;
use serde_json::{Value, json};
use tokio::time::Instant;

use crate::channel::{ChannelError, MessageContent, OutboundChannel, OutboundMessage};
use crate::config::Config;
use crate::server::{AppState, build_app};

/// Records every send attempt; failures are scripted per message text.
#[derive(Default)]
pub struct RecordingChannel {
    latency: Duration,
    calls: Mutex<Vec<(OutboundMessage, Instant)>>,
    failures: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    chats: Mutex<Vec<ChatSummary>>,
    chats_unavailable: AtomicBool,
    contacts: Mutex<Vec<Value>>,
}

impl RecordingChannel {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Fail the next `times` sends whose text is `text`.
    pub fn fail_times(&self, text: &str, times: u32) {
        self.failures
            .lock()
            .unwrap()
            .insert(text.to_string(), times);
    }

    pub fn set_chats(&self, ids: &[&str]) {
        *self.chats.lock().unwrap() = ids
            .iter()
            .map(|id| ChatSummary {
                id: id.to_string(),
                name: None,
            })
            .collect();
    }

    pub fn set_contacts(&self, count: usize) {
        *self.contacts.lock().unwrap() = (0..count)
            .map(|i| json!({ "id": format!("62800{i}@c.us") }))
            .collect();
    }

    pub fn fail_chats(&self) {
        self.chats_unavailable.store(true, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }

    /// Text (or content kind) of every attempt, in dispatch order.
    pub fn texts(&self) -> Vec<String> {
        self.messages().iter().map(label).collect()
    }

    pub fn attempt_times(&self, text: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| label(m) == text)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn label(message: &OutboundMessage) -> String {
    match &message.content {
        MessageContent::Text { text } => text.clone(),
        other => other.kind().to_string(),
    }
}

fn unavailable(message: &str) -> ChannelError {
    ChannelError::Gateway(WahaError::Api {
        status: 500,
        message: message.to_string(),
    })
}

#[async_trait]
impl OutboundChannel for RecordingChannel {
    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .push((message.clone(), Instant::now()));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        ChatId::parse(&message.chat_id)?;

        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&label(message))
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(unavailable("scripted failure"));
        }
        Ok(())
    }

    async fn chats(&self, _session: Option<&str>) -> Result<Vec<ChatSummary>, ChannelError> {
        if self.chats_unavailable.load(Ordering::SeqCst) {
            return Err(unavailable("chats unavailable"));
        }
        Ok(self.chats.lock().unwrap().clone())
    }

    async fn contacts(&self, _session: Option<&str>) -> Result<Vec<Value>, ChannelError> {
        if self.chats_unavailable.load(Ordering::SeqCst) {
            return Err(unavailable("contacts unavailable"));
        }
        Ok(self.contacts.lock().unwrap().clone())
    }

    async fn session_status(&self, session: Option<&str>) -> Result<SessionInfo, ChannelError> {
        Ok(SessionInfo {
            name: session.unwrap_or("default").to_string(),
            status: SessionState::Working,
            me: None,
        })
    }

    async fn screenshot(&self, _session: Option<&str>) -> Result<Bytes, ChannelError> {
        Ok(Bytes::from_static(b"\x89PNG"))
    }

    async fn version(&self) -> Result<Value, ChannelError> {
        Ok(json!({ "version": "test" }))
    }
}

/// App state over a [`RecordingChannel`].
pub struct TestHarness {
    pub state: AppState,
    pub channel: Arc<RecordingChannel>,
}

impl TestHarness {
    pub fn new(admins: &[&str]) -> Self {
        Self::with_config(admins, |_| {})
    }

    pub fn with_config(admins: &[&str], configure: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config::default();
        config.admin_numbers = admins.iter().map(|a| a.to_string()).collect();
        config.queue.send_delay_ms = 0;
        configure(&mut config);

        let channel = Arc::new(RecordingChannel::default());
        let state = AppState::from_config(&config, channel.clone()).unwrap();
        Self { state, channel }
    }

    pub fn router(&self) -> Router {
        build_app(self.state.clone(), 30)
    }
}

pub fn test_app(admins: &[&str]) -> (Router, TestHarness) {
    let harness = TestHarness::new(admins);
    (harness.router(), harness)
}
