//! Quote Session
//!
//! A quote session is a server-side subscription context named by a
//! client-generated token. Tokens are only valid for the connection they were
//! created on, so every connection attempt gets a new one.

use std::fmt;

use rand::Rng;
use serde_json::Value;

use super::messages::{
    ControlMessage, QUOTE_ADD_SYMBOLS, QUOTE_CREATE_SESSION, QUOTE_REMOVE_SYMBOLS,
    QUOTE_SET_FIELDS,
};
use crate::domain::quote::SubscriptionRequest;

/// Session token prefix.
pub const SESSION_PREFIX: &str = "qs_";

/// Number of random letters after the prefix.
pub const SESSION_ID_LEN: usize = 12;

/// Quote session scoped to one connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Session {
    id: String,
}

impl Session {
    /// Generate a session with a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let suffix: String = (0..SESSION_ID_LEN)
            .map(|_| char::from(rng.random_range(b'a'..=b'z')))
            .collect();

        Self {
            id: format!("{SESSION_PREFIX}{suffix}"),
        }
    }

    /// Session token.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Messages that create the session and subscribe it, in send order.
    ///
    /// The server rejects field and symbol declarations for a session it has
    /// not seen created, so the order is fixed.
    #[must_use]
    pub fn setup_sequence(&self, subscription: &SubscriptionRequest) -> Vec<ControlMessage> {
        let mut fields = Vec::with_capacity(subscription.fields().len() + 1);
        fields.push(self.id_value());
        fields.extend(subscription.fields().iter().cloned().map(Value::String));

        vec![
            ControlMessage::new(QUOTE_CREATE_SESSION, vec![self.id_value()]),
            ControlMessage::new(QUOTE_SET_FIELDS, fields),
            ControlMessage::new(
                QUOTE_ADD_SYMBOLS,
                vec![
                    self.id_value(),
                    Value::String(subscription.symbol_id().to_string()),
                ],
            ),
        ]
    }

    /// Message that drops the subscribed symbol from the session.
    #[must_use]
    pub fn remove_symbols(&self, subscription: &SubscriptionRequest) -> ControlMessage {
        ControlMessage::new(
            QUOTE_REMOVE_SYMBOLS,
            vec![
                self.id_value(),
                Value::String(subscription.symbol_id().to_string()),
            ],
        )
    }

    fn id_value(&self) -> Value {
        Value::String(self.id.clone())
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
