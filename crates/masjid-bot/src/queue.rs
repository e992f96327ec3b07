//! Paced, prioritized outbound message queue.
//!
//! Every send goes through [`MessageQueue::enqueue`], which returns at once.
//! A single drain task dispatches pending messages one at a time:
//!
//! - highest priority first, insertion order within a priority
//! - a fixed delay after every dispatch attempt so the gateway never sees bursts
//! - failed sends are rescheduled `attempts × backoff_unit` later and are not
//!   eligible before that instant; after `max_attempts` they are dropped
//! - [`MessageQueue::enqueue_at`] holds a message back until a given instant
//!
//! Callers never learn the outcome. [`MessageQueue::subscribe`] exposes a
//! delivery feed for statistics and tests.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, broadcast};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use crate::channel::{OutboundChannel, OutboundMessage};

const DELIVERY_FEED_CAPACITY: usize = 256;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    fn rank(self) -> u8 {
        match self {
            Priority::High => 2,
            Priority::Normal => 1,
            Priority::Low => 0,
        }
    }
}

/// Opaque id handed back by [`MessageQueue::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    fn generate() -> Self {
        Self(format!("msg_{}", Ulid::new()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Pause after each dispatch attempt.
    pub send_delay: Duration,
    /// Dispatch attempts before a message is dropped.
    pub max_attempts: u32,
    /// Retry `n` waits `n × backoff_unit`.
    pub backoff_unit: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            send_delay: Duration::from_secs(1),
            max_attempts: 3,
            backoff_unit: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Dropped { error: String },
}

/// Terminal outcome of one queued message.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: MessageId,
    pub chat_id: String,
    pub attempts: u32,
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub draining: bool,
    pub sent: u64,
    pub dropped: u64,
    pub retried: u64,
}

struct QueuedMessage {
    id: MessageId,
    message: OutboundMessage,
    priority: Priority,
    seq: u64,
    enqueued_at: Instant,
    not_before: Instant,
    attempts: u32,
}

#[derive(Default)]
struct State {
    pending: Vec<QueuedMessage>,
    draining: bool,
    next_seq: u64,
    sent: u64,
    dropped: u64,
    retried: u64,
}

impl State {
    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

enum Next {
    Dispatch(QueuedMessage),
    WaitUntil(Instant),
    Done,
}

// ============================================================================
// MessageQueue
// ============================================================================

/// Cloneable handle to the queue.
#[derive(Clone)]
pub struct MessageQueue {
    inner: Arc<Inner>,
}

struct Inner {
    config: QueueConfig,
    channel: Arc<dyn OutboundChannel>,
    state: Mutex<State>,
    wake: Notify,
    deliveries: broadcast::Sender<Delivery>,
}

impl MessageQueue {
    pub fn new(channel: Arc<dyn OutboundChannel>, config: QueueConfig) -> Self {
        let (deliveries, _) = broadcast::channel(DELIVERY_FEED_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                channel,
                state: Mutex::new(State::default()),
                wake: Notify::new(),
                deliveries,
            }),
        }
    }

    /// Queue a message and return its id. Starts the drain task when idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, message: OutboundMessage, priority: Priority) -> MessageId {
        self.enqueue_at(message, priority, Instant::now())
    }

    /// Queue a message that is not eligible for dispatch before `at`.
    ///
    /// An instant in the past behaves like [`MessageQueue::enqueue`]. Once
    /// due, the message competes on priority like any other.
    pub fn enqueue_at(
        &self,
        message: OutboundMessage,
        priority: Priority,
        at: Instant,
    ) -> MessageId {
        let id = MessageId::generate();
        let now = Instant::now();

        let start_drain = {
            let mut state = self.inner.lock();
            let seq = state.take_seq();
            debug!(
                id = %id,
                chat_id = %message.chat_id,
                kind = message.content.kind(),
                ?priority,
                delay_ms = at.saturating_duration_since(now).as_millis() as u64,
                "Message queued"
            );
            state.pending.push(QueuedMessage {
                id: id.clone(),
                message,
                priority,
                seq,
                enqueued_at: now,
                not_before: at.max(now),
                attempts: 0,
            });
            !std::mem::replace(&mut state.draining, true)
        };

        if start_drain {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(inner.drain());
        } else {
            self.inner.wake.notify_one();
        }

        id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Delivery> {
        self.inner.deliveries.subscribe()
    }

    pub fn snapshot(&self) -> QueueStatus {
        let state = self.inner.lock();
        QueueStatus {
            pending: state.pending.len(),
            draining: state.draining,
            sent: state.sent,
            dropped: state.dropped,
            retried: state.retried,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pick the next eligible message, or clear the draining flag when empty.
    fn next(&self) -> Next {
        let mut state = self.lock();
        if state.pending.is_empty() {
            state.draining = false;
            return Next::Done;
        }

        state.pending.sort_by(|a, b| {
            b.priority
                .rank()
                .cmp(&a.priority.rank())
                .then(a.seq.cmp(&b.seq))
        });

        let now = Instant::now();
        match state.pending.iter().position(|m| m.not_before <= now) {
            Some(index) => Next::Dispatch(state.pending.remove(index)),
            None => {
                let earliest = state
                    .pending
                    .iter()
                    .map(|m| m.not_before)
                    .min()
                    .unwrap_or(now);
                Next::WaitUntil(earliest)
            }
        }
    }

    async fn drain(self: Arc<Self>) {
        debug!("Queue drain started");
        loop {
            let mut item = match self.next() {
                Next::Dispatch(item) => item,
                Next::WaitUntil(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {}
                        _ = self.wake.notified() => {}
                    }
                    continue;
                }
                Next::Done => break,
            };

            item.attempts += 1;
            let result = self.channel.send(&item.message).await;
            self.settle(item, result);

            tokio::time::sleep(self.config.send_delay).await;
        }
        debug!("Queue drained");
    }

    fn settle(&self, mut item: QueuedMessage, result: Result<(), crate::channel::ChannelError>) {
        let outcome = match result {
            Ok(()) => {
                self.lock().sent += 1;
                info!(
                    id = %item.id,
                    chat_id = %item.message.chat_id,
                    attempts = item.attempts,
                    waited_ms = item.enqueued_at.elapsed().as_millis() as u64,
                    "Message sent"
                );
                DeliveryOutcome::Sent
            }
            Err(e) if item.attempts < self.config.max_attempts => {
                let backoff = self.config.backoff_unit * item.attempts;
                warn!(
                    id = %item.id,
                    chat_id = %item.message.chat_id,
                    attempt = item.attempts,
                    retry_in_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Send failed, will retry"
                );
                let mut state = self.lock();
                item.not_before = Instant::now() + backoff;
                item.seq = state.take_seq();
                state.retried += 1;
                state.pending.push(item);
                return;
            }
            Err(e) => {
                self.lock().dropped += 1;
                error!(
                    id = %item.id,
                    chat_id = %item.message.chat_id,
                    attempts = item.attempts,
                    error = %e,
                    "Giving up on message"
                );
                DeliveryOutcome::Dropped {
                    error: e.to_string(),
                }
            }
        };

        // No subscribers is fine.
        let _ = self.deliveries.send(Delivery {
            id: item.id,
            chat_id: item.message.chat_id,
            attempts: item.attempts,
            outcome,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
