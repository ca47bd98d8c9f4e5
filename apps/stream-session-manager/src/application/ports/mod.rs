//! Port Interfaces
//!
//! Contracts for external systems following the Hexagonal Architecture
//! pattern; infrastructure adapters implement these.
//!
//! ## Driven Ports (Outbound)
//!
//! - `StreamingEngine`: the component that owns sockets, authenticates,
//!   and decodes exchange wire formats into normalized events. The
//!   session manager only drives its handle protocol.

/// The streaming engine port and its handle/outcome types.
pub mod engine;

pub use engine::{EngineError, HandleId, Received, StreamHandle, StreamingEngine};
