//! Configuration
//!
//! Session manager settings, loaded from environment variables.

/// Settings types and env parsing.
pub mod settings;

pub use settings::{ConfigError, ManagerConfig};
