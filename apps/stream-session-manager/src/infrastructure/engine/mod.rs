//! Streaming Engine Adapters
//!
//! Implementations of the `StreamingEngine` port:
//!
//! - `ws`: WebSocket client for the normalized upstream feed.
//! - `memory`: deterministic in-memory engine with scripted deliveries,
//!   so session tests run without any live exchange connection.

/// Deterministic in-memory engine.
pub mod memory;

/// WebSocket engine adapter.
pub mod ws;

pub use memory::InMemoryEngine;
pub use ws::{WsEngine, WsEngineConfig};
