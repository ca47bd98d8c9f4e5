//! Market Events
//!
//! Opaque, order-preserving records delivered by the streaming engine.
//! The session layer never validates or interprets the payload; whatever
//! the engine hands over is buffered and exported as-is.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One normalized market event, conceptually a JSON object.
///
/// Object key order is preserved so downstream tabular export can honor
/// first-seen column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketEvent(Value);

impl MarketEvent {
    /// Wrap an already-parsed JSON value.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Build an event from a raw text frame.
    ///
    /// Frames that are not valid JSON are passed through opaquely as a
    /// JSON string; malformed payloads are the consumer's problem, not
    /// the session layer's.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(value) => Self(value),
            Err(_) => Self(Value::String(text.to_string())),
        }
    }

    /// Borrow the underlying JSON value.
    #[must_use]
    pub const fn as_json(&self) -> &Value {
        &self.0
    }

    /// Consume the event, yielding the underlying JSON value.
    #[must_use]
    pub fn into_json(self) -> Value {
        self.0
    }
}

impl From<Value> for MarketEvent {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

// =============================================================================
// Tests
// =============================================================================
