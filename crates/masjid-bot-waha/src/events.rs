//! Gateway event WebSocket.
//!
//! The gateway pushes the same envelopes it posts to webhooks over
//! `ws://<base>/ws`. [`EventListener`] keeps that connection alive and
//! forwards interpreted events into an mpsc channel.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use masjid_bot_protocol::{EventEnvelope, GatewayEvent, event_names};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, error, info, warn};

use crate::client::WahaConfig;
use crate::error::WahaError;

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Parse one text frame into an event.
///
/// Frames that are not event envelopes (acks, pings) and payloads that do not
/// decode return `None`.
pub fn parse_frame(text: &str) -> Option<GatewayEvent> {
    let envelope: EventEnvelope = serde_json::from_str(text).ok()?;
    match envelope.into_event() {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(error = %e, "Ignoring undecodable event payload");
            None
        }
    }
}

/// Long-running WebSocket subscription for one session.
pub struct EventListener {
    ws_url: String,
    api_key: String,
    session: String,
    max_attempts: u32,
    reconnect_delay: Duration,
}

impl EventListener {
    pub fn new(config: &WahaConfig) -> Self {
        let base = config.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };

        Self {
            ws_url: format!("{ws_base}/ws"),
            api_key: config.api_key.clone(),
            session: config.session.clone(),
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Run the listener until the receiver is dropped or reconnects run out.
    pub fn spawn(self, tx: mpsc::Sender<GatewayEvent>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(tx).await })
    }

    async fn run(self, tx: mpsc::Sender<GatewayEvent>) {
        let mut failures = 0u32;

        loop {
            match self.connect_and_forward(&tx, &mut failures).await {
                Ok(()) => {
                    info!("Event receiver closed, stopping WebSocket listener");
                    return;
                }
                Err(e) => {
                    failures += 1;
                    if failures > self.max_attempts {
                        error!(
                            error = %e,
                            attempts = self.max_attempts,
                            "Giving up on gateway WebSocket"
                        );
                        return;
                    }
                    warn!(
                        error = %e,
                        attempt = failures,
                        max = self.max_attempts,
                        "Gateway WebSocket disconnected, reconnecting"
                    );
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }

    /// Returns `Ok` only when the event receiver has gone away.
    async fn connect_and_forward(
        &self,
        tx: &mpsc::Sender<GatewayEvent>,
        failures: &mut u32,
    ) -> Result<(), WahaError> {
        let mut request = self
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| WahaError::WebSocket(e.to_string()))?;
        let key =
            HeaderValue::from_str(&self.api_key).map_err(|e| WahaError::WebSocket(e.to_string()))?;
        request.headers_mut().insert("X-Api-Key", key);

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| WahaError::WebSocket(e.to_string()))?;
        info!(url = %self.ws_url, "Connected to gateway WebSocket");
        *failures = 0;

        let (mut ws_tx, mut ws_rx) = stream.split();

        let subscribe = json!({
            "type": "subscribe",
            "session": self.session,
            "events": [event_names::MESSAGE, event_names::SESSION_STATUS],
        });
        ws_tx
            .send(WsMessage::Text(subscribe.to_string().into()))
            .await
            .map_err(|e| WahaError::WebSocket(e.to_string()))?;

        while let Some(frame) = ws_rx.next().await {
            match frame.map_err(|e| WahaError::WebSocket(e.to_string()))? {
                WsMessage::Text(text) => {
                    let Some(event) = parse_frame(text.as_str()) else {
                        continue;
                    };
                    if tx.send(event).await.is_err() {
                        return Ok(());
                    }
                }
                WsMessage::Ping(data) => {
                    let _ = ws_tx.send(WsMessage::Pong(data)).await;
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }

        Err(WahaError::WebSocket("connection closed".to_string()))
    }
}
