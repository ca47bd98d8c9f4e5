//! Session Manager Settings
//!
//! Configuration for the service binary, loaded from environment
//! variables. Defaults are documented on each field; the only required
//! variable is `SESSION_CHANNELS`.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::subscription::{SpecParseError, SubscriptionSpec};
use crate::infrastructure::engine::ws::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_ENGINE_URL};

/// Default collection window per drain cycle.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Default directory for CSV artifacts.
pub const DEFAULT_EXPORT_DIR: &str = "exports";

/// Complete session manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Upstream feed WebSocket URL (`SESSION_ENGINE_URL`, default
    /// `ws://localhost:5050/ws`).
    pub engine_url: String,
    /// Directory CSV artifacts are written to (`SESSION_EXPORT_DIR`,
    /// default `exports`).
    pub export_dir: PathBuf,
    /// Collection window per drain cycle (`SESSION_WINDOW_SECS`,
    /// default 5 seconds).
    pub window: Duration,
    /// Subscriptions to open, parsed from the comma-separated channel
    /// list in `SESSION_CHANNELS` (required), e.g.
    /// `coinbase.spot.ticker.BTC-USD,kraken.spot.trade.ETH-USD`.
    pub channels: Vec<SubscriptionSpec>,
    /// Per-handle delivery channel capacity
    /// (`SESSION_CHANNEL_CAPACITY`, default 1024).
    pub channel_capacity: usize,
}

impl ManagerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `SESSION_CHANNELS` is missing, empty, or
    /// contains a channel that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_channels = std::env::var("SESSION_CHANNELS")
            .map_err(|_| ConfigError::MissingEnvVar("SESSION_CHANNELS".to_string()))?;
        let channels = parse_channels(&raw_channels)?;

        let engine_url = std::env::var("SESSION_ENGINE_URL")
            .unwrap_or_else(|_| DEFAULT_ENGINE_URL.to_string());

        let export_dir = std::env::var("SESSION_EXPORT_DIR")
            .map_or_else(|_| PathBuf::from(DEFAULT_EXPORT_DIR), PathBuf::from);

        let window = parse_env_duration_secs("SESSION_WINDOW_SECS", DEFAULT_WINDOW);

        let channel_capacity =
            parse_env_usize("SESSION_CHANNEL_CAPACITY", DEFAULT_CHANNEL_CAPACITY);

        Ok(Self {
            engine_url,
            export_dir,
            window,
            channels,
            channel_capacity,
        })
    }
}

/// Parse a comma-separated channel list; surrounding whitespace per
/// entry is ignored, empty entries are rejected.
pub fn parse_channels(raw: &str) -> Result<Vec<SubscriptionSpec>, ConfigError> {
    let entries: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect();

    if entries.is_empty() {
        return Err(ConfigError::EmptyValue("SESSION_CHANNELS".to_string()));
    }

    entries
        .into_iter()
        .map(|entry| {
            entry.parse().map_err(|source| ConfigError::InvalidChannel {
                value: entry.to_string(),
                source,
            })
        })
        .collect()
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// A channel entry does not parse as a subscription.
    #[error("invalid channel {value:?}: {source}")]
    InvalidChannel {
        /// The offending entry.
        value: String,
        /// Why it does not parse.
        source: SpecParseError,
    },
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use crate::domain::subscription::{DataType, Exchange};

    use super::*;

    #[test]
    fn channel_list_parses() {
        let channels =
            parse_channels("coinbase.spot.ticker.BTC-USD, kraken.spot.trade.ETH-USD").unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].exchange, Exchange::Coinbase);
        assert_eq!(channels[1].exchange, Exchange::Kraken);
        assert_eq!(channels[1].data_type, DataType::Trade);
    }

    #[test]
    fn trailing_commas_are_tolerated() {
        let channels = parse_channels("binance.spot.book.BTCUSDT,").unwrap();
        assert_eq!(channels.len(), 1);
    }

    #[test]
    fn empty_channel_list_is_rejected() {
        assert!(matches!(
            parse_channels("  ,  "),
            Err(ConfigError::EmptyValue(_))
        ));
    }

    #[test]
    fn bad_channel_entry_is_rejected() {
        let err = parse_channels("coinbase.spot.ticker.BTC-USD,nyse.spot.ticker.AAPL").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidChannel { value, .. } if value == "nyse.spot.ticker.AAPL"));
    }

    #[test]
    fn defaults_are_documented_values() {
        assert_eq!(DEFAULT_WINDOW, Duration::from_secs(5));
        assert_eq!(DEFAULT_EXPORT_DIR, "exports");
    }
}
