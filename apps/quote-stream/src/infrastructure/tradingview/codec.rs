//! Frame Codec
//!
//! Encodes and decodes the length-prefixed framing used by the quote socket.
//!
//! # Wire Format
//!
//! ```text
//! ~m~<len>~m~<payload>
//! ```
//!
//! `<len>` is the decimal byte length of `<payload>`. A single WebSocket
//! message may carry several frames back to back. Payloads are either a JSON
//! envelope (starts with `{`) or a keep-alive token (`42`, or `~h~42` as the
//! live service sends it), which must be echoed back unchanged.
//!
//! Decoding never fails as a whole. A segment whose header or declared length
//! does not line up is dropped and the scan resumes at the next well-formed
//! header, so one corrupt frame does not cost the rest of the batch.

use serde_json::Value;

use super::messages::{ControlMessage, Envelope};

/// Frame delimiter.
pub const DELIMITER: &str = "~m~";

/// Prefix of server heartbeat tokens.
pub const HEARTBEAT_PREFIX: &str = "~h~";

/// Outbound encoding errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-segment decoding errors. These are discarded, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Expected `~m~` at this offset.
    #[error("missing frame delimiter at byte {offset}")]
    MissingDelimiter {
        /// Byte offset into the transport message.
        offset: usize,
    },

    /// Length field is empty, not decimal, zero-padded or overflows.
    #[error("invalid frame length field: {0:?}")]
    InvalidLength(String),

    /// Declared length does not match the payload that follows.
    #[error("declared frame length {declared} does not match payload ({available} bytes remain)")]
    LengthMismatch {
        /// Length from the header.
        declared: usize,
        /// Bytes left in the message after the header.
        available: usize,
    },

    /// Payload looked like JSON but did not parse as an object.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    /// Payload is neither JSON nor a keep-alive token.
    #[error("unrecognized payload: {0:?}")]
    UnrecognizedPayload(String),
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Liveness token to echo verbatim.
    KeepAlive(String),
    /// JSON envelope.
    Envelope(Envelope),
}

/// Length-prefixed frame codec.
#[derive(Debug, Default, Clone)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new frame codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode a method call as a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, method: &str, params: &[Value]) -> Result<String, CodecError> {
        #[derive(serde::Serialize)]
        struct Outbound<'a> {
            m: &'a str,
            p: &'a [Value],
        }

        let payload = serde_json::to_string(&Outbound { m: method, p: params })?;
        Ok(Self::wrap(&payload))
    }

    /// Encode a control message as a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_message(&self, message: &ControlMessage) -> Result<String, CodecError> {
        self.encode(&message.method, &message.params)
    }

    /// Wrap a keep-alive token in a fresh frame.
    #[must_use]
    pub fn encode_keep_alive(&self, token: &str) -> String {
        Self::wrap(token)
    }

    /// Prefix a payload with its length header.
    #[must_use]
    pub fn wrap(payload: &str) -> String {
        format!("{DELIMITER}{}{DELIMITER}{payload}", payload.len())
    }

    /// Decode one transport message into its valid frames.
    ///
    /// Invalid segments are logged at debug level and skipped.
    #[must_use]
    pub fn decode(&self, raw: &str) -> Vec<Frame> {
        self.decode_all(raw)
            .into_iter()
            .filter_map(|result| match result {
                Ok(frame) => Some(frame),
                Err(e) => {
                    tracing::debug!(error = %e, "Discarding frame");
                    None
                }
            })
            .collect()
    }

    /// Decode one transport message, keeping per-segment errors.
    #[must_use]
    pub fn decode_all(&self, raw: &str) -> Vec<Result<Frame, FrameError>> {
        let bytes = raw.as_bytes();
        let mut results = Vec::new();
        let mut pos = 0;

        while pos < bytes.len() {
            let (declared, payload_start) = match read_header(raw, pos) {
                Ok(header) => header,
                Err(e) => {
                    results.push(Err(e));
                    pos = resync(raw, pos + 1);
                    continue;
                }
            };

            let available = bytes.len() - payload_start;
            let payload = payload_start
                .checked_add(declared)
                .filter(|&end| end == bytes.len() || starts_with_delimiter(bytes, end))
                .and_then(|end| raw.get(payload_start..end).map(|p| (p, end)));

            match payload {
                Some((payload, end)) => {
                    results.push(classify(payload));
                    pos = end;
                }
                None => {
                    results.push(Err(FrameError::LengthMismatch {
                        declared,
                        available,
                    }));
                    pos = resync(raw, payload_start);
                }
            }
        }

        results
    }
}

/// Parse `~m~<digits>~m~` at `pos`, returning the declared length and the
/// payload offset.
fn read_header(raw: &str, pos: usize) -> Result<(usize, usize), FrameError> {
    let bytes = raw.as_bytes();
    let delim = DELIMITER.as_bytes();

    if !starts_with_delimiter(bytes, pos) {
        return Err(FrameError::MissingDelimiter { offset: pos });
    }

    let digits_start = pos + delim.len();
    let digits_len = bytes[digits_start..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    let digits_end = digits_start + digits_len;

    if !bytes[digits_end..].starts_with(delim) {
        let field: String = raw[digits_start..].chars().take(12).collect();
        return Err(FrameError::InvalidLength(field));
    }

    // ASCII digits only, so the slice sits on char boundaries.
    let digits = &raw[digits_start..digits_end];
    if digits.is_empty() || (digits.len() > 1 && digits.starts_with('0')) {
        return Err(FrameError::InvalidLength(digits.to_string()));
    }
    let declared = digits
        .parse::<usize>()
        .map_err(|_| FrameError::InvalidLength(digits.to_string()))?;

    Ok((declared, digits_end + delim.len()))
}

/// Offset of the next well-formed header at or after `from`.
fn resync(raw: &str, from: usize) -> usize {
    let bytes = raw.as_bytes();
    (from..bytes.len())
        .find(|&p| starts_with_delimiter(bytes, p) && read_header(raw, p).is_ok())
        .unwrap_or(bytes.len())
}

fn starts_with_delimiter(bytes: &[u8], pos: usize) -> bool {
    bytes
        .get(pos..)
        .is_some_and(|rest| rest.starts_with(DELIMITER.as_bytes()))
}

fn classify(payload: &str) -> Result<Frame, FrameError> {
    if is_keep_alive(payload) {
        return Ok(Frame::KeepAlive(payload.to_string()));
    }

    if payload.starts_with('{') {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
        return Envelope::from_value(value)
            .map(Frame::Envelope)
            .ok_or_else(|| FrameError::InvalidJson("not an object".to_string()));
    }

    Err(FrameError::UnrecognizedPayload(
        payload.chars().take(50).collect(),
    ))
}

/// Digits only, optionally behind the `~h~` heartbeat prefix.
#[must_use]
pub fn is_keep_alive(payload: &str) -> bool {
    let token = payload.strip_prefix(HEARTBEAT_PREFIX).unwrap_or(payload);
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}
