//! Quote Protocol Message Types
//!
//! Inbound envelopes and outbound control messages exchanged inside
//! `~m~` frames.
//!
//! # Envelope Shape
//!
//! ```json
//! {"m":"qsd","p":["qs_abcdefghijkl",{"n":"BINANCE:BTCUSDT","v":{"lp":67123.5}}]}
//! ```
//!
//! Only `qsd` carries prices. The rest of the vocabulary (`quote_completed`,
//! `critical_error`, `protocol_error`, ...) is undocumented and is passed
//! through as-is.

use serde::Serialize;
use serde_json::Value;

/// Creates a quote session.
pub const QUOTE_CREATE_SESSION: &str = "quote_create_session";
/// Declares the fields a session wants.
pub const QUOTE_SET_FIELDS: &str = "quote_set_fields";
/// Adds symbols to a session.
pub const QUOTE_ADD_SYMBOLS: &str = "quote_add_symbols";
/// Removes symbols from a session.
pub const QUOTE_REMOVE_SYMBOLS: &str = "quote_remove_symbols";
/// Inbound quote data.
pub const QUOTE_SESSION_DATA: &str = "qsd";

/// Decoded JSON envelope.
///
/// Both fields are optional on the wire. A missing method stays `None` and a
/// missing or non-array `p` becomes an empty list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    /// Method name (`m`).
    pub method: Option<String>,
    /// Parameters (`p`).
    pub params: Vec<Value>,
}

impl Envelope {
    /// Build an envelope with a method.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: Some(method.into()),
            params,
        }
    }

    /// Read an envelope out of an arbitrary JSON value.
    ///
    /// Returns `None` if the value is not an object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut object) = value else {
            return None;
        };

        let method = match object.remove("m") {
            Some(Value::String(m)) => Some(m),
            _ => None,
        };
        let params = match object.remove("p") {
            Some(Value::Array(p)) => p,
            _ => Vec::new(),
        };

        Some(Self { method, params })
    }

    /// Method name, if present.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// Check the method name.
    #[must_use]
    pub fn is_method(&self, method: &str) -> bool {
        self.method() == Some(method)
    }
}

/// Outbound control message, serialized as `{"m":..,"p":[..]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlMessage {
    /// Method name.
    #[serde(rename = "m")]
    pub method: String,
    /// Ordered parameters.
    #[serde(rename = "p")]
    pub params: Vec<Value>,
}

impl ControlMessage {
    /// Create a control message.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn envelope_from_full_object() {
        let env = Envelope::from_value(json!({"m": "qsd", "p": ["qs_x", {"n": "A:B"}]})).unwrap();
        assert_eq!(env.method(), Some("qsd"));
        assert_eq!(env.params.len(), 2);
        assert!(env.is_method(QUOTE_SESSION_DATA));
    }

    #[test]
    fn envelope_tolerates_missing_fields() {
        let env = Envelope::from_value(json!({"session_id": "abc"})).unwrap();
        assert_eq!(env.method(), None);
        assert!(env.params.is_empty());
    }

    #[test]
    fn envelope_tolerates_wrong_types() {
        let env = Envelope::from_value(json!({"m": 7, "p": "nope"})).unwrap();
        assert_eq!(env.method(), None);
        assert!(env.params.is_empty());
    }

    #[test]
    fn envelope_rejects_non_objects() {
        assert!(Envelope::from_value(json!([1, 2])).is_none());
        assert!(Envelope::from_value(json!("qsd")).is_none());
    }

    #[test]
    fn control_message_serializes_method_first() {
        let msg = ControlMessage::new(QUOTE_CREATE_SESSION, vec![json!("qs_abc")]);
        let text = serde_json::to_string(&msg).unwrap();
        assert_eq!(text, r#"{"m":"quote_create_session","p":["qs_abc"]}"#);
    }
}
