//! Streaming Engine Port (Driven Port)
//!
//! Interface to the external component that opens exchange connections
//! and delivers normalized events through an opaque per-subscription
//! channel. The session manager never parses exchange protocols and
//! never retries engine-level connection failures.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::event::MarketEvent;
use crate::domain::subscription::SubscriptionSpec;

// =============================================================================
// Stream Handle
// =============================================================================

/// Numeric identity of a stream handle, unique per engine instance.
pub type HandleId = u64;

/// Opaque owned token for one open engine-side delivery channel.
///
/// Deliberately neither `Clone` nor `Copy`: `destroy_handle` consumes
/// the token by value, so a torn-down handle can never reach `receive`
/// or a second teardown from safe code. Exactly one registry entry owns
/// each handle for its whole lifetime.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    id: HandleId,
}

impl StreamHandle {
    /// Mint a handle for a freshly opened delivery channel.
    ///
    /// Only engine adapters create handles; the rest of the crate treats
    /// them as opaque.
    pub(crate) const fn new(id: HandleId) -> Self {
        Self { id }
    }

    /// The engine-side identity of this handle.
    #[must_use]
    pub const fn id(&self) -> HandleId {
        self.id
    }
}

// =============================================================================
// Receive Outcome
// =============================================================================

/// Outcome of one bounded receive attempt.
#[derive(Debug)]
pub enum Received {
    /// An event arrived, in delivery order.
    Event(MarketEvent),
    /// Nothing arrived within the timeout; the stream is still live.
    Timeout,
    /// The engine ended the stream for this handle.
    Closed,
}

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by a streaming engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine could not produce a handle (connection refused,
    /// upstream down, subscribe rejected).
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// A transient fault while receiving on a live stream. Retry policy
    /// is the caller's responsibility.
    #[error("receive failed: {0}")]
    Receive(String),

    /// The handle id is not, or is no longer, known to the engine.
    /// Reaching this from registry-managed handles is a programming
    /// error; it fails fast instead of silently reconnecting.
    #[error("unknown stream handle: {0}")]
    UnknownHandle(HandleId),
}

// =============================================================================
// Port
// =============================================================================

/// Capability interface over the streaming engine's handle protocol.
///
/// Implementations: the WebSocket adapter for the live normalized feed,
/// and a deterministic in-memory engine so session tests run without any
/// exchange connection.
#[async_trait]
pub trait StreamingEngine: Send + Sync {
    /// Open a delivery channel for one subscription.
    ///
    /// # Errors
    ///
    /// `EngineError::Unavailable` when the engine cannot produce a
    /// handle.
    async fn create_handle(&self, spec: &SubscriptionSpec) -> Result<StreamHandle, EngineError>;

    /// Receive the next event, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// `EngineError::Receive` on a transient fault,
    /// `EngineError::UnknownHandle` for a stale id.
    async fn receive(
        &self,
        handle: &StreamHandle,
        timeout: Duration,
    ) -> Result<Received, EngineError>;

    /// Tear down a delivery channel, consuming the handle.
    ///
    /// Idempotent at the engine: an unknown id is logged and ignored,
    /// never a crash. Engine-side teardown faults are the engine's to
    /// log; from the caller's view teardown always completes.
    async fn destroy_handle(&self, handle: StreamHandle);
}
