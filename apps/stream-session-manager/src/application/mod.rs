//! Application Layer
//!
//! Use cases and port definitions for the session manager.

/// Port definitions for external collaborators.
pub mod ports;

/// Session lifecycle services.
pub mod services;
