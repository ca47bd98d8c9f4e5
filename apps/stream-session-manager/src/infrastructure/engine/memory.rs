//! In-Memory Streaming Engine
//!
//! Deterministic stand-in for the live engine: deliveries are scripted
//! per channel before `create_handle`, then replayed in order through
//! the same handle protocol the WebSocket adapter implements. Used by
//! the session tests and for offline runs.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::ports::engine::{
    EngineError, HandleId, Received, StreamHandle, StreamingEngine,
};
use crate::domain::event::MarketEvent;
use crate::domain::subscription::SubscriptionSpec;

// =============================================================================
// Script Steps
// =============================================================================

/// One scripted engine action for a channel.
#[derive(Debug)]
enum ScriptStep {
    /// Deliver an event.
    Event(MarketEvent),
    /// Report a transient receive fault.
    Fault(String),
    /// End the stream.
    Close,
}

#[derive(Debug, Default)]
struct SlotState {
    queue: VecDeque<ScriptStep>,
    closed: bool,
}

// =============================================================================
// Engine
// =============================================================================

/// Scripted in-memory `StreamingEngine`.
///
/// Steps scripted for a channel are handed to the next handle created
/// for that channel; a channel with no script delivers nothing and
/// times out every receive. Once the script is exhausted the stream is
/// silent (or closed, if the last step was a close).
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    next_id: AtomicU64,
    scripts: Mutex<HashMap<String, VecDeque<ScriptStep>>>,
    slots: Mutex<HashMap<HandleId, Arc<tokio::sync::Mutex<SlotState>>>>,
    unavailable: Mutex<Option<String>>,
}

impl InMemoryEngine {
    /// Create an engine with no scripted channels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script one event delivery for a channel.
    pub fn script_event(&self, channel: &str, event: impl Into<MarketEvent>) {
        self.push_step(channel, ScriptStep::Event(event.into()));
    }

    /// Script a sequence of event deliveries for a channel.
    pub fn script_events<E: Into<MarketEvent>>(
        &self,
        channel: &str,
        events: impl IntoIterator<Item = E>,
    ) {
        for event in events {
            self.script_event(channel, event);
        }
    }

    /// Script a transient receive fault for a channel.
    pub fn script_fault(&self, channel: &str, reason: &str) {
        self.push_step(channel, ScriptStep::Fault(reason.to_string()));
    }

    /// Script end-of-stream for a channel.
    pub fn script_close(&self, channel: &str) {
        self.push_step(channel, ScriptStep::Close);
    }

    /// Make every subsequent `create_handle` fail with the given reason.
    pub fn set_unavailable(&self, reason: &str) {
        *self.unavailable.lock() = Some(reason.to_string());
    }

    /// Number of handles created and not yet destroyed. Lets tests
    /// assert the exactly-once teardown invariant.
    #[must_use]
    pub fn open_handle_count(&self) -> usize {
        self.slots.lock().len()
    }

    fn push_step(&self, channel: &str, step: ScriptStep) {
        self.scripts
            .lock()
            .entry(channel.to_string())
            .or_default()
            .push_back(step);
    }
}

#[async_trait]
impl StreamingEngine for InMemoryEngine {
    async fn create_handle(&self, spec: &SubscriptionSpec) -> Result<StreamHandle, EngineError> {
        if let Some(reason) = self.unavailable.lock().clone() {
            return Err(EngineError::Unavailable(reason));
        }

        let queue = self
            .scripts
            .lock()
            .remove(&spec.channel())
            .unwrap_or_default();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(tokio::sync::Mutex::new(SlotState {
            queue,
            closed: false,
        }));
        self.slots.lock().insert(id, slot);

        tracing::debug!(channel = %spec.channel(), handle = id, "in-memory handle created");
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

        let mut state = slot.lock().await;
        if let Some(step) = state.queue.pop_front() {
            return match step {
                ScriptStep::Event(event) => Ok(Received::Event(event)),
                ScriptStep::Fault(reason) => Err(EngineError::Receive(reason)),
                ScriptStep::Close => {
                    state.closed = true;
                    Ok(Received::Closed)
                }
            };
        }
        if state.closed {
            return Ok(Received::Closed);
        }
        drop(state);

        // Nothing scripted: behave like a silent live stream.
        tokio::time::sleep(timeout).await;
        Ok(Received::Timeout)
    }

    async fn destroy_handle(&self, handle: StreamHandle) {
        let id = handle.id();
        if self.slots.lock().remove(&id).is_none() {
            tracing::warn!(handle = id, "destroy for unknown in-memory handle ignored");
            return;
        }
        tracing::debug!(handle = id, "in-memory handle destroyed");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::subscription::{AssetClass, DataType, Exchange};

    fn spec() -> SubscriptionSpec {
        SubscriptionSpec::new(
            Exchange::Kraken,
            AssetClass::Spot,
            DataType::Trade,
            "ETH-USD",
        )
    }

    #[tokio::test]
    async fn replays_script_in_order_then_closes() {
        let engine = InMemoryEngine::new();
        let channel = spec().channel();
        engine.script_events(&channel, [json!({"seq": 1}), json!({"seq": 2})]);
        engine.script_close(&channel);

        let handle = engine.create_handle(&spec()).await.unwrap();
        let timeout = Duration::from_millis(10);

        for expected in 1..=2 {
            match engine.receive(&handle, timeout).await.unwrap() {
                Received::Event(event) => {
                    assert_eq!(event.as_json()["seq"], json!(expected));
                }
                other => panic!("expected event, got {other:?}"),
            }
        }
        assert!(matches!(
            engine.receive(&handle, timeout).await.unwrap(),
            Received::Closed
        ));
        // End-of-stream is sticky.
        assert!(matches!(
            engine.receive(&handle, timeout).await.unwrap(),
            Received::Closed
        ));
    }

    #[tokio::test]
    async fn unscripted_channel_times_out() {
        let engine = InMemoryEngine::new();
        let handle = engine.create_handle(&spec()).await.unwrap();

        assert!(matches!(
            engine
                .receive(&handle, Duration::from_millis(5))
                .await
                .unwrap(),
            Received::Timeout
        ));
    }

    #[tokio::test]
    async fn scripted_fault_is_transient() {
        let engine = InMemoryEngine::new();
        let channel = spec().channel();
        engine.script_fault(&channel, "stall");
        engine.script_event(&channel, json!({"seq": 1}));

        let handle = engine.create_handle(&spec()).await.unwrap();
        let timeout = Duration::from_millis(10);

        assert!(matches!(
            engine.receive(&handle, timeout).await,
            Err(EngineError::Receive(_))
        ));
        // The stream survives the fault.
        assert!(matches!(
            engine.receive(&handle, timeout).await.unwrap(),
            Received::Event(_)
        ));
    }

    #[tokio::test]
    async fn destroy_frees_the_slot_and_stale_ids_fail_fast() {
        let engine = InMemoryEngine::new();
        let handle = engine.create_handle(&spec()).await.unwrap();
        let stale_id = handle.id();
        assert_eq!(engine.open_handle_count(), 1);

        engine.destroy_handle(handle).await;
        assert_eq!(engine.open_handle_count(), 0);

        let stale = StreamHandle::new(stale_id);
        assert!(matches!(
            engine.receive(&stale, Duration::from_millis(5)).await,
            Err(EngineError::UnknownHandle(_))
        ));
        // Must not crash on a second teardown of the same id.
        engine.destroy_handle(StreamHandle::new(stale_id)).await;
    }

    #[tokio::test]
    async fn unavailable_engine_refuses_handles() {
        let engine = InMemoryEngine::new();
        engine.set_unavailable("maintenance window");

        assert!(matches!(
            engine.create_handle(&spec()).await,
            Err(EngineError::Unavailable(_))
        ));
    }
}
