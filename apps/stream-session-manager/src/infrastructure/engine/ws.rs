//! WebSocket Engine Adapter
//!
//! Drives the normalized upstream feed over WebSocket. One connection
//! per handle: `create_handle` connects, sends the subscribe message for
//! the spec's channel, and spawns a reader task that pumps Text frames
//! into a bounded, order-preserving per-handle channel. The adapter
//! never parses exchange protocols — the upstream feed has already
//! normalized them — and never reconnects; reconnect policy belongs to
//! the feed side of the boundary.
//!
//! # Protocol
//!
//! Subscribe: `{"event":"subscribe","channel":"coinbase.spot.ticker.BTC-USD"}`
//! Delivery: one JSON text frame per market event.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::application::ports::engine::{
    EngineError, HandleId, Received, StreamHandle, StreamingEngine,
};
use crate::domain::event::MarketEvent;
use crate::domain::subscription::SubscriptionSpec;

/// Default upstream feed endpoint.
pub const DEFAULT_ENGINE_URL: &str = "ws://localhost:5050/ws";

/// Default per-handle delivery channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the WebSocket engine.
#[derive(Debug, Clone)]
pub struct WsEngineConfig {
    /// Upstream feed WebSocket URL.
    pub url: String,
    /// Capacity of each handle's delivery channel. A full channel
    /// applies backpressure to the reader, never drops events.
    pub channel_capacity: usize,
}

impl Default for WsEngineConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENGINE_URL.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

struct HandleSlot {
    rx: tokio::sync::Mutex<mpsc::Receiver<MarketEvent>>,
    reader: tokio::task::JoinHandle<()>,
}

/// WebSocket-backed `StreamingEngine`.
pub struct WsEngine {
    config: WsEngineConfig,
    next_id: AtomicU64,
    slots: Mutex<HashMap<HandleId, Arc<HandleSlot>>>,
}

impl WsEngine {
    /// Create an engine for the given upstream feed.
    #[must_use]
    pub fn new(config: WsEngineConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(0),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Number of handles created and not yet destroyed.
    #[must_use]
    pub fn open_handle_count(&self) -> usize {
        self.slots.lock().len()
    }
}

impl std::fmt::Debug for WsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsEngine")
            .field("url", &self.config.url)
            .field("open_handles", &self.open_handle_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StreamingEngine for WsEngine {
    async fn create_handle(&self, spec: &SubscriptionSpec) -> Result<StreamHandle, EngineError> {
        let (ws, _response) = connect_async(&self.config.url)
            .await
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let subscribe = serde_json::json!({
            "event": "subscribe",
            "channel": spec.channel(),
        });
        sink.send(Message::text(subscribe.to_string()))
            .await
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let channel = spec.channel();
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        let event = MarketEvent::from_text(text.as_str());
                        // Bounded send: a slow consumer backpressures the
                        // reader instead of dropping or reordering.
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(channel = %channel, error = %e, "upstream read failed");
                        break;
                    }
                }
            }
            // Reader done: dropping tx ends the stream for the receiver,
            // dropping sink closes the upstream connection.
            drop(sink);
        });

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().insert(
            id,
            Arc::new(HandleSlot {
                rx: tokio::sync::Mutex::new(rx),
                reader,
            }),
        );

        tracing::info!(channel = %spec.channel(), handle = id, "upstream stream opened");
        Ok(StreamHandle::new(id))
    }

    async fn receive(
        &self,
        handle: &StreamHandle,
        timeout: Duration,
    ) -> Result<Received, EngineError> {
        let slot = self
            .slots
            .lock()
            .get(&handle.id())
            .cloned()
            .ok_or(EngineError::UnknownHandle(handle.id()))?;

        let mut rx = slot.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(event)) => Ok(Received::Event(event)),
            Ok(None) => Ok(Received::Closed),
            Err(_elapsed) => Ok(Received::Timeout),
        }
    }

    async fn destroy_handle(&self, handle: StreamHandle) {
        let id = handle.id();
        let Some(slot) = self.slots.lock().remove(&id) else {
            tracing::warn!(handle = id, "destroy for unknown handle ignored");
            return;
        };
        slot.reader.abort();
        tracing::info!(handle = id, "upstream stream destroyed");
    }
}

// =============================================================================
// Tests
// =============================================================================
