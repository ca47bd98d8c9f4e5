#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Stream Session Manager - Market Data Session Layer
//!
//! Owns logical subscriptions to normalized exchange streams (exchange,
//! asset class, data type, symbol), drives a bounded receive loop per
//! session, and periodically materializes collected events into CSV
//! artifacts. Connection handling, authentication, and exchange wire
//! formats live behind the `StreamingEngine` port; the session layer
//! only drives the engine's handle protocol and guarantees a
//! deterministic, leak-free resource lifecycle.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Subscription descriptors and opaque market events
//!   - `subscription`: closed exchange/asset-class/data-type catalogs
//!   - `event`: order-preserving opaque JSON records
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: the `StreamingEngine` capability interface
//!   - `services`: session registry, state machine, receive loop
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `engine`: WebSocket adapter + deterministic in-memory engine
//!   - `export`: CSV export pipeline
//!   - `config`: environment-driven settings
//!   - `telemetry`: tracing initialization
//!
//! # Data Flow
//!
//! ```text
//! Upstream feed ──► StreamHandle ──► Receive Loop ──► Event Buffer ──► CSV Artifact
//!                   (per session)    (bounded window)                  (per export)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core session types with no I/O dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::event::MarketEvent;
pub use domain::subscription::{AssetClass, DataType, Exchange, SpecParseError, SubscriptionSpec};

// Engine port
pub use application::ports::engine::{
    EngineError, HandleId, Received, StreamHandle, StreamingEngine,
};

// Session services
pub use application::services::session::{
    DrainReport, DrainStop, Session, SessionError, SessionRegistry, SessionState,
};

// Engine adapters
pub use infrastructure::engine::memory::InMemoryEngine;
pub use infrastructure::engine::ws::{WsEngine, WsEngineConfig};

// Export pipeline
pub use infrastructure::export::{ArtifactLocation, CsvExporter, ExportError};

// Configuration
pub use infrastructure::config::{ConfigError, ManagerConfig};
