//! Quote Domain Types
//!
//! Canonical symbol identifiers, the subscription a run is built around,
//! and the price events extracted from the quote stream.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Field name of the last traded price.
pub const FIELD_LAST_PRICE: &str = "lp";

// =============================================================================
// Category
// =============================================================================

/// Instrument category used to narrow a symbol search.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lower")]
pub enum Category {
    /// Equities.
    Stock,
    /// Currency pairs.
    Forex,
    /// Crypto assets.
    #[default]
    Crypto,
    /// Futures contracts.
    Futures,
    /// Contracts for difference.
    Cfd,
    /// Indices.
    Index,
    /// Economic indicators.
    Economic,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Stock,
        Self::Forex,
        Self::Crypto,
        Self::Futures,
        Self::Cfd,
        Self::Index,
        Self::Economic,
    ];

    /// Wire name used by the symbol search.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Forex => "forex",
            Self::Crypto => "crypto",
            Self::Futures => "futures",
            Self::Cfd => "cfd",
            Self::Index => "index",
            Self::Economic => "economic",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == lowered)
            .ok_or_else(|| SymbolError::UnknownCategory(s.to_string()))
    }
}

// =============================================================================
// Symbol Identifier
// =============================================================================

/// Errors raised while building symbol identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// Exchange or ticker was empty.
    #[error("symbol id requires a non-empty exchange and ticker, got {0:?}")]
    Empty(String),
    /// Text did not have the `EXCHANGE:TICKER` shape.
    #[error("malformed symbol id: {0:?}")]
    Malformed(String),
    /// Category name is not recognised.
    #[error("unknown category: {0:?}")]
    UnknownCategory(String),
}

/// Canonical `EXCHANGE:TICKER` identifier, always upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SymbolId {
    exchange: String,
    ticker: String,
}

impl SymbolId {
    /// Build an identifier from its two halves.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolError::Empty`] if either half is blank.
    pub fn new(exchange: &str, ticker: &str) -> Result<Self, SymbolError> {
        let exchange = exchange.trim().to_uppercase();
        let ticker = ticker.trim().to_uppercase();
        if exchange.is_empty() || ticker.is_empty() {
            return Err(SymbolError::Empty(format!("{exchange}:{ticker}")));
        }
        Ok(Self { exchange, ticker })
    }

    /// Exchange prefix.
    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Ticker suffix.
    #[must_use]
    pub fn ticker(&self) -> &str {
        &self.ticker
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.ticker)
    }
}

impl FromStr for SymbolId {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (exchange, ticker) = s
            .split_once(':')
            .ok_or_else(|| SymbolError::Malformed(s.to_string()))?;
        Self::new(exchange, ticker)
    }
}

impl TryFrom<String> for SymbolId {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SymbolId> for String {
    fn from(value: SymbolId) -> Self {
        value.to_string()
    }
}

/// Result of a symbol search: exchange and ticker as reported upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSymbol {
    /// Exchange name (any case).
    pub exchange: String,
    /// Ticker (any case).
    pub symbol: String,
}

impl ResolvedSymbol {
    /// Create a resolved symbol.
    #[must_use]
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
        }
    }

    /// Convert to the canonical identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if either half is blank.
    pub fn to_symbol_id(&self) -> Result<SymbolId, SymbolError> {
        SymbolId::new(&self.exchange, &self.symbol)
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// What a run subscribes to. Built once from the resolver output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    symbol_id: SymbolId,
    category: Category,
    fields: Vec<String>,
}

impl SubscriptionRequest {
    /// Create a request for the given fields.
    ///
    /// Field names are trimmed, blanks dropped and duplicates removed while
    /// keeping first-seen order. An empty list falls back to last price.
    #[must_use]
    pub fn new<I, S>(symbol_id: SymbolId, category: Category, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for field in fields {
            let field = field.as_ref().trim();
            if !field.is_empty() && !unique.iter().any(|f| f == field) {
                unique.push(field.to_string());
            }
        }
        if unique.is_empty() {
            unique.push(FIELD_LAST_PRICE.to_string());
        }

        Self {
            symbol_id,
            category,
            fields: unique,
        }
    }

    /// Request only the last price.
    #[must_use]
    pub fn last_price(symbol_id: SymbolId, category: Category) -> Self {
        Self::new(symbol_id, category, [FIELD_LAST_PRICE])
    }

    /// Subscribed symbol.
    #[must_use]
    pub const fn symbol_id(&self) -> &SymbolId {
        &self.symbol_id
    }

    /// Category used to resolve the symbol.
    #[must_use]
    pub const fn category(&self) -> Category {
        self.category
    }

    /// Requested field names.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

// =============================================================================
// Price Event
// =============================================================================

/// A last-price update extracted from the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceEvent {
    /// Symbol as reported by the server.
    pub symbol: String,
    /// Last price, unmodified.
    pub price: Decimal,
    /// Local receive time.
    pub observed_at: DateTime<Utc>,
}
