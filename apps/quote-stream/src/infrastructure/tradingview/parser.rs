//! Quote Event Parser
//!
//! Picks last-price updates out of decoded envelopes. The protocol sends a
//! lot of housekeeping traffic, and anything that is not a well-formed `qsd`
//! with a numeric `lp` is skipped without complaint.
//!
//! Prices are carried as [`Decimal`]. A number whose magnitude exceeds
//! `Decimal::MAX` has no exact representation and yields no event.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Number, Value};

use super::messages::{Envelope, QUOTE_SESSION_DATA};
use crate::domain::quote::{FIELD_LAST_PRICE, PriceEvent};

/// Stateless `qsd` interpreter.
#[derive(Debug, Default, Clone)]
pub struct QuoteEventParser;

impl QuoteEventParser {
    /// Create a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Extract a price event stamped with the current time.
    #[must_use]
    pub fn interpret(&self, envelope: &Envelope) -> Option<PriceEvent> {
        self.interpret_at(envelope, Utc::now())
    }

    /// Extract a price event stamped with `observed_at`.
    #[must_use]
    pub fn interpret_at(
        &self,
        envelope: &Envelope,
        observed_at: DateTime<Utc>,
    ) -> Option<PriceEvent> {
        if !envelope.is_method(QUOTE_SESSION_DATA) {
            return None;
        }

        // p = [session_id, {"n": symbol, "v": {"lp": price, ...}}]
        let data = envelope.params.get(1)?;
        let symbol = data.get("n")?.as_str()?;
        let price = match data.get("v")?.get(FIELD_LAST_PRICE)? {
            Value::Number(n) => number_to_decimal(n)?,
            _ => return None,
        };

        Some(PriceEvent {
            symbol: symbol.to_string(),
            price,
            observed_at,
        })
    }
}

/// Convert without going through `f64` arithmetic.
fn number_to_decimal(n: &Number) -> Option<Decimal> {
    let text = n.to_string();
    match Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text)) {
        Ok(price) => Some(price),
        Err(e) => {
            tracing::debug!(price = %text, error = %e, "Price not representable as decimal");
            None
        }
    }
}
