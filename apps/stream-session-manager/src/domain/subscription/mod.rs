//! Subscription Descriptors
//!
//! Identifies one logical market-data stream: exchange, asset class,
//! data type, and symbol. A descriptor is immutable once constructed;
//! two descriptors are equal iff all four fields match.
//!
//! The engine-facing channel form is
//! `{exchange}.{asset_class}.{data_type}.{symbol}`, all catalog names
//! lower-case, e.g. `coinbase.spot.ticker.BTC-USD`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// Catalogs
// =============================================================================

/// Supported exchanges.
///
/// Adding a member is a deliberate compatibility-breaking change, not
/// runtime data; the catalog is matched exhaustively throughout the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    /// Coinbase spot exchange.
    Coinbase,
    /// Kraken spot exchange.
    Kraken,
    /// Bitfinex spot exchange.
    Bitfinex,
    /// Binance spot exchange.
    Binance,
}

impl Exchange {
    /// Get the wire name used in channel strings.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Coinbase => "coinbase",
            Self::Kraken => "kraken",
            Self::Bitfinex => "bitfinex",
            Self::Binance => "binance",
        }
    }
}

impl FromStr for Exchange {
    type Err = SpecParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "coinbase" => Ok(Self::Coinbase),
            "kraken" => Ok(Self::Kraken),
            "bitfinex" => Ok(Self::Bitfinex),
            "binance" => Ok(Self::Binance),
            _ => Err(SpecParseError::UnknownExchange(s.to_string())),
        }
    }
}

/// Supported asset classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    /// Spot markets.
    Spot,
}

impl AssetClass {
    /// Get the wire name used in channel strings.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Spot => "spot",
        }
    }
}

impl FromStr for AssetClass {
    type Err = SpecParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spot" => Ok(Self::Spot),
            _ => Err(SpecParseError::UnknownAssetClass(s.to_string())),
        }
    }
}

/// Supported stream data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Top-of-book ticker updates.
    Ticker,
    /// Order book updates.
    Book,
    /// Individual trades.
    Trade,
}

impl DataType {
    /// Get the wire name used in channel strings.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Book => "book",
            Self::Trade => "trade",
        }
    }
}

impl FromStr for DataType {
    type Err = SpecParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ticker" => Ok(Self::Ticker),
            "book" => Ok(Self::Book),
            "trade" => Ok(Self::Trade),
            _ => Err(SpecParseError::UnknownDataType(s.to_string())),
        }
    }
}

// =============================================================================
// Subscription Descriptor
// =============================================================================

/// Immutable identifier for one logical stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    /// Source exchange.
    pub exchange: Exchange,
    /// Asset class of the stream.
    pub asset_class: AssetClass,
    /// Kind of market data delivered.
    pub data_type: DataType,
    /// Exchange-native symbol, e.g. `BTC-USD`.
    pub symbol: String,
}

impl SubscriptionSpec {
    /// Create a new descriptor.
    #[must_use]
    pub fn new(
        exchange: Exchange,
        asset_class: AssetClass,
        data_type: DataType,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            exchange,
            asset_class,
            data_type,
            symbol: symbol.into(),
        }
    }

    /// Render the engine channel string,
    /// `{exchange}.{asset_class}.{data_type}.{symbol}`.
    #[must_use]
    pub fn channel(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.exchange.as_str(),
            self.asset_class.as_str(),
            self.data_type.as_str(),
            self.symbol
        )
    }
}

impl fmt::Display for SubscriptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.channel())
    }
}

impl FromStr for SubscriptionSpec {
    type Err = SpecParseError;

    /// Parse a channel string of the form
    /// `exchange.asset_class.data_type.symbol`. The symbol is taken
    /// verbatim and may itself contain anything but the separator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(4, '.');
        let (Some(exchange), Some(asset_class), Some(data_type), Some(symbol)) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(SpecParseError::MalformedChannel(s.to_string()));
        };

        if symbol.is_empty() {
            return Err(SpecParseError::MalformedChannel(s.to_string()));
        }

        Ok(Self {
            exchange: exchange.parse()?,
            asset_class: asset_class.parse()?,
            data_type: data_type.parse()?,
            symbol: symbol.to_string(),
        })
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Error parsing a catalog name or channel string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecParseError {
    /// The exchange name is not in the catalog.
    #[error("unknown exchange: {0}")]
    UnknownExchange(String),
    /// The asset class name is not in the catalog.
    #[error("unknown asset class: {0}")]
    UnknownAssetClass(String),
    /// The data type name is not in the catalog.
    #[error("unknown data type: {0}")]
    UnknownDataType(String),
    /// The channel string does not have four `.`-separated parts.
    #[error("malformed channel (want exchange.asset_class.data_type.symbol): {0}")]
    MalformedChannel(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn btc_ticker() -> SubscriptionSpec {
        SubscriptionSpec::new(
            Exchange::Coinbase,
            AssetClass::Spot,
            DataType::Ticker,
            "BTC-USD",
        )
    }

    #[test_case("coinbase", Exchange::Coinbase)]
    #[test_case("KRAKEN", Exchange::Kraken)]
    #[test_case("Bitfinex", Exchange::Bitfinex)]
    #[test_case("binance", Exchange::Binance)]
    fn exchange_parses_case_insensitive(input: &str, expected: Exchange) {
        assert_eq!(input.parse::<Exchange>().unwrap(), expected);
    }

    #[test]
    fn unknown_exchange_is_rejected() {
        let err = "nasdaq".parse::<Exchange>().unwrap_err();
        assert_eq!(err, SpecParseError::UnknownExchange("nasdaq".to_string()));
    }

    #[test_case("ticker", DataType::Ticker)]
    #[test_case("book", DataType::Book)]
    #[test_case("TRADE", DataType::Trade)]
    fn data_type_parses_case_insensitive(input: &str, expected: DataType) {
        assert_eq!(input.parse::<DataType>().unwrap(), expected);
    }

    #[test]
    fn asset_class_round_trips() {
        assert_eq!("spot".parse::<AssetClass>().unwrap(), AssetClass::Spot);
        assert_eq!(AssetClass::Spot.as_str(), "spot");
        assert!("futures".parse::<AssetClass>().is_err());
    }

    #[test]
    fn channel_renders_lower_case_catalog_names() {
        assert_eq!(btc_ticker().channel(), "coinbase.spot.ticker.BTC-USD");
    }

    #[test]
    fn channel_string_round_trips() {
        let spec: SubscriptionSpec = "coinbase.spot.ticker.BTC-USD".parse().unwrap();
        assert_eq!(spec, btc_ticker());
        assert_eq!(spec.to_string(), "coinbase.spot.ticker.BTC-USD");
    }

    #[test]
    fn specs_equal_iff_all_fields_match() {
        let a = btc_ticker();
        let mut b = btc_ticker();
        assert_eq!(a, b);

        b.symbol = "ETH-USD".to_string();
        assert_ne!(a, b);

        let c = SubscriptionSpec::new(
            Exchange::Kraken,
            AssetClass::Spot,
            DataType::Ticker,
            "BTC-USD",
        );
        assert_ne!(a, c);
    }

    #[test_case(""; "empty")]
    #[test_case("coinbase.spot.ticker"; "missing symbol")]
    #[test_case("coinbase.spot.ticker."; "empty symbol")]
    #[test_case("coinbase spot ticker BTC-USD"; "wrong separator")]
    fn malformed_channels_are_rejected(input: &str) {
        assert!(matches!(
            input.parse::<SubscriptionSpec>(),
            Err(SpecParseError::MalformedChannel(_) | SpecParseError::UnknownExchange(_))
        ));
    }

    #[test]
    fn catalog_errors_surface_from_channel_parse() {
        let err = "nyse.spot.ticker.AAPL".parse::<SubscriptionSpec>().unwrap_err();
        assert_eq!(err, SpecParseError::UnknownExchange("nyse".to_string()));

        let err = "kraken.margin.ticker.BTC-USD"
            .parse::<SubscriptionSpec>()
            .unwrap_err();
        assert_eq!(err, SpecParseError::UnknownAssetClass("margin".to_string()));
    }
}
