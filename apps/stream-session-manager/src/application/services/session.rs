//! Session Lifecycle and Registry
//!
//! Owns the descriptor → session table, the per-session state machine,
//! and the bounded receive loop. Guarantees:
//!
//! - at most one live handle per open descriptor,
//! - every opened handle is torn down exactly once,
//! - events land in the buffer in exactly the order the engine
//!   delivered them,
//! - `drain` never blocks past its collection window, and a concurrent
//!   `close` is observed within one receive attempt.
//!
//! # State machine
//!
//! `Open → Draining → Open` for each collection window;
//! `Open | Draining → Closed` (terminal) only via registry `close`.
//! Any operation on a closed session fails with `SessionClosed`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::application::ports::engine::{EngineError, Received, StreamHandle, StreamingEngine};
use crate::domain::event::MarketEvent;
use crate::domain::subscription::SubscriptionSpec;

/// Granularity of a single receive attempt inside a drain window.
///
/// Keeps the handle slot lock short so a concurrent `close` is observed
/// within one attempt rather than after the whole window.
const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(250);

// =============================================================================
// Errors
// =============================================================================

/// Errors reported by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session already exists for an equal descriptor.
    #[error("already subscribed: {0}")]
    AlreadySubscribed(SubscriptionSpec),

    /// No session exists for the descriptor.
    #[error("not subscribed: {0}")]
    NotSubscribed(SubscriptionSpec),

    /// The engine could not produce a handle. Caller-retryable.
    #[error("engine unavailable: {0}")]
    EngineUnavailable(#[source] EngineError),

    /// A drain is already in flight for this session.
    #[error("drain already in progress: {0}")]
    DrainInProgress(SubscriptionSpec),

    /// The session was closed; the operation can never succeed.
    #[error("session closed: {0}")]
    SessionClosed(SubscriptionSpec),
}

// =============================================================================
// Session
// =============================================================================

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handle live, buffer mutable.
    Open,
    /// A drain call is in progress; re-entrant drains are rejected.
    Draining,
    /// Terminal. The handle has been taken for teardown.
    Closed,
}

/// One open subscription: descriptor, engine handle, and the event
/// buffer accumulated across collection windows.
///
/// Created by [`SessionRegistry::open`], destroyed by
/// [`SessionRegistry::close`].
#[derive(Debug)]
pub struct Session {
    spec: SubscriptionSpec,
    state: Mutex<SessionState>,
    /// Handle slot. `tokio::sync::Mutex` because receive attempts hold
    /// it across `.await`; taken (exactly once) on close.
    handle: tokio::sync::Mutex<Option<StreamHandle>>,
    buffer: Mutex<Vec<MarketEvent>>,
}

impl Session {
    fn new(spec: SubscriptionSpec, handle: StreamHandle) -> Self {
        Self {
            spec,
            state: Mutex::new(SessionState::Open),
            handle: tokio::sync::Mutex::new(Some(handle)),
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// The descriptor this session was opened for.
    #[must_use]
    pub const fn spec(&self) -> &SubscriptionSpec {
        &self.spec
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Whether the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Number of buffered events.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Snapshot of the buffered events, in arrival order.
    #[must_use]
    pub fn buffered(&self) -> Vec<MarketEvent> {
        self.buffer.lock().clone()
    }

    /// Run `f` against the event buffer under its lock.
    ///
    /// This is the export pipeline's hook: serialize inside `f` and
    /// clear the buffer only on success, and concurrent callers observe
    /// either the pre-export or post-export buffer, never a partially
    /// drained one.
    ///
    /// # Errors
    ///
    /// `SessionError::SessionClosed` once the session is closed.
    pub fn with_buffer<R>(
        &self,
        f: impl FnOnce(&mut Vec<MarketEvent>) -> R,
    ) -> Result<R, SessionError> {
        let mut buffer = self.buffer.lock();
        if self.is_closed() {
            return Err(SessionError::SessionClosed(self.spec.clone()));
        }
        Ok(f(&mut buffer))
    }

    fn append(&self, event: MarketEvent) {
        self.buffer.lock().push(event);
    }

    /// `Open → Draining`, rejecting re-entry and closed sessions.
    fn begin_drain(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        match *state {
            SessionState::Open => {
                *state = SessionState::Draining;
                Ok(())
            }
            SessionState::Draining => Err(SessionError::DrainInProgress(self.spec.clone())),
            SessionState::Closed => Err(SessionError::SessionClosed(self.spec.clone())),
        }
    }

    /// `Draining → Open`, unless a concurrent close already advanced the
    /// session to its terminal state.
    fn end_drain(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Draining {
            *state = SessionState::Open;
        }
    }

    fn mark_closed(&self) {
        *self.state.lock() = SessionState::Closed;
    }

    async fn take_handle(&self) -> Option<StreamHandle> {
        self.handle.lock().await.take()
    }
}

/// Restores `Draining → Open` on every drain exit path, including early
/// returns and cancellation.
struct DrainGuard<'a> {
    session: &'a Session,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.session.end_drain();
    }
}

// =============================================================================
// Drain Report
// =============================================================================

/// Why a drain call stopped collecting.
#[derive(Debug)]
pub enum DrainStop {
    /// The collection window elapsed; the stream is still live.
    WindowElapsed,
    /// The engine ended the stream. The caller must `close` and may
    /// re-`open`.
    StreamClosed,
    /// The session was closed while the drain was in flight.
    SessionClosed,
    /// A transient receive fault. The loop does not retry; retry policy
    /// is the caller's responsibility.
    ReceiveError(EngineError),
}

impl DrainStop {
    /// Whether the stream is still usable for another drain. Transient
    /// receive faults do not end the stream; end-of-stream and session
    /// closure do.
    #[must_use]
    pub const fn stream_live(&self) -> bool {
        matches!(self, Self::WindowElapsed | Self::ReceiveError(_))
    }
}

/// Result of one drain call: the events collected during the window (in
/// delivery order, already appended to the session buffer) together with
/// the reason collection stopped. A fault never discards events received
/// before it.
#[derive(Debug)]
pub struct DrainReport {
    /// Events collected by this call, in delivery order.
    pub events: Vec<MarketEvent>,
    /// Why the loop stopped.
    pub stopped: DrainStop,
}

// =============================================================================
// Session Registry
// =============================================================================

/// Descriptor → session table over a streaming engine.
///
/// The table is the only resource shared between callers: lookups run
/// concurrently, `open`/`close` are mutually exclusive. Its key set is
/// always exactly the set of descriptors with a live handle.
pub struct SessionRegistry {
    engine: Arc<dyn StreamingEngine>,
    sessions: RwLock<HashMap<SubscriptionSpec, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create a registry over the given engine.
    #[must_use]
    pub fn new(engine: Arc<dyn StreamingEngine>) -> Self {
        Self {
            engine,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Open a subscription.
    ///
    /// # Errors
    ///
    /// `AlreadySubscribed` if a session exists for an equal descriptor;
    /// `EngineUnavailable` if the engine cannot produce a handle.
    pub async fn open(&self, spec: SubscriptionSpec) -> Result<Arc<Session>, SessionError> {
        if self.sessions.read().contains_key(&spec) {
            return Err(SessionError::AlreadySubscribed(spec));
        }

        let handle = self
            .engine
            .create_handle(&spec)
            .await
            .map_err(SessionError::EngineUnavailable)?;
        let handle_id = handle.id();
        let session = Arc::new(Session::new(spec.clone(), handle));

        let raced = {
            let mut table = self.sessions.write();
            if table.contains_key(&spec) {
                true
            } else {
                table.insert(spec.clone(), Arc::clone(&session));
                false
            }
        };

        if raced {
            // Lost an open/open race: give the fresh handle back before
            // reporting, keeping at most one handle per descriptor.
            if let Some(handle) = session.take_handle().await {
                self.engine.destroy_handle(handle).await;
            }
            return Err(SessionError::AlreadySubscribed(spec));
        }

        tracing::info!(channel = %spec.channel(), handle = handle_id, "subscription opened");
        Ok(session)
    }

    /// Close a subscription: mark the session terminal, remove it from
    /// the table, and tear down its handle exactly once. Engine teardown
    /// faults are the engine's to log; the session is gone regardless.
    ///
    /// # Errors
    ///
    /// `NotSubscribed` if no session exists for the descriptor.
    pub async fn close(&self, spec: &SubscriptionSpec) -> Result<(), SessionError> {
        let session = self
            .sessions
            .write()
            .remove(spec)
            .ok_or_else(|| SessionError::NotSubscribed(spec.clone()))?;

        session.mark_closed();
        if let Some(handle) = session.take_handle().await {
            self.engine.destroy_handle(handle).await;
        }

        tracing::info!(channel = %spec.channel(), "subscription closed");
        Ok(())
    }

    /// Look up the live session for a descriptor.
    #[must_use]
    pub fn session(&self, spec: &SubscriptionSpec) -> Option<Arc<Session>> {
        self.sessions.read().get(spec).cloned()
    }

    /// Whether a session is currently open for the descriptor.
    #[must_use]
    pub fn is_subscribed(&self, spec: &SubscriptionSpec) -> bool {
        self.sessions.read().contains_key(spec)
    }

    /// Number of open subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Drain the session for `spec` for one collection window.
    ///
    /// # Errors
    ///
    /// `NotSubscribed` if no session exists; otherwise as
    /// [`Self::drain_session`].
    pub async fn drain(
        &self,
        spec: &SubscriptionSpec,
        window: Duration,
    ) -> Result<DrainReport, SessionError> {
        let session = self
            .session(spec)
            .ok_or_else(|| SessionError::NotSubscribed(spec.clone()))?;
        self.drain_session(&session, window).await
    }

    /// Drain one session for a bounded collection window.
    ///
    /// Repeatedly issues bounded receives until the window elapses, the
    /// engine ends the stream, a transient fault occurs, or the session
    /// is closed out from under the call. Every event is appended to the
    /// session buffer the moment it arrives, so partial results survive
    /// any later fault.
    ///
    /// # Errors
    ///
    /// `DrainInProgress` if another drain is in flight for this session;
    /// `SessionClosed` if the session is already closed. Faults *during*
    /// the window are not errors: they are reported in
    /// [`DrainReport::stopped`] alongside the events collected so far.
    pub async fn drain_session(
        &self,
        session: &Session,
        window: Duration,
    ) -> Result<DrainReport, SessionError> {
        session.begin_drain()?;
        let _guard = DrainGuard { session };

        let deadline = Instant::now() + window;
        let mut events = Vec::new();

        let stopped = loop {
            if session.is_closed() {
                break DrainStop::SessionClosed;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break DrainStop::WindowElapsed;
            }
            let attempt = remaining.min(RECEIVE_POLL_INTERVAL);

            // Hold the handle slot only for one bounded attempt so a
            // concurrent close is never blocked past `attempt`.
            let slot = session.handle.lock().await;
            let Some(handle) = slot.as_ref() else {
                break DrainStop::SessionClosed;
            };

            match self.engine.receive(handle, attempt).await {
                Ok(Received::Event(event)) => {
                    drop(slot);
                    session.append(event.clone());
                    events.push(event);
                }
                Ok(Received::Timeout) => {}
                Ok(Received::Closed) => break DrainStop::StreamClosed,
                Err(err) => break DrainStop::ReceiveError(err),
            }
        };

        tracing::debug!(
            channel = %session.spec().channel(),
            collected = events.len(),
            stopped = ?stopped,
            "drain window finished"
        );

        Ok(DrainReport { events, stopped })
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
