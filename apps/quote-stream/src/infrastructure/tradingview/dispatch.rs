//! Inbound Dispatch
//!
//! Turns one transport message into the ordered actions the connection loop
//! must perform: echo keep-alives and deliver price events.

use super::codec::{Frame, FrameCodec};
use super::parser::QuoteEventParser;
use crate::domain::quote::PriceEvent;
use crate::infrastructure::metrics;

/// An action produced by an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Frame to send back (a wrapped keep-alive).
    Echo(String),
    /// Price update for the caller.
    Price(PriceEvent),
}

/// Codec plus parser for the receive path.
#[derive(Debug, Default, Clone)]
pub struct FrameDispatcher {
    codec: FrameCodec,
    parser: QuoteEventParser,
}

impl FrameDispatcher {
    /// Create a new dispatcher.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            codec: FrameCodec::new(),
            parser: QuoteEventParser::new(),
        }
    }

    /// Process one inbound transport message.
    ///
    /// Actions come back in frame order. Envelopes that are not price
    /// updates produce nothing.
    #[must_use]
    pub fn dispatch(&self, raw: &str) -> Vec<Dispatch> {
        let mut actions = Vec::new();

        for result in self.codec.decode_all(raw) {
            let frame = match result {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!(error = %e, "Discarding frame");
                    metrics::record_frame_discarded();
                    continue;
                }
            };
            metrics::record_frame_decoded();

            match frame {
                Frame::KeepAlive(token) => {
                    tracing::trace!(token = %token, "Keep-alive received");
                    actions.push(Dispatch::Echo(self.codec.encode_keep_alive(&token)));
                }
                Frame::Envelope(envelope) => {
                    if let Some(event) = self.parser.interpret(&envelope) {
                        actions.push(Dispatch::Price(event));
                    } else {
                        tracing::trace!(method = ?envelope.method(), "Ignoring envelope");
                    }
                }
            }
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    const QSD_PAYLOAD: &str =
        r#"{"m":"qsd","p":["qs_x",{"n":"BINANCE:BTCUSDT","v":{"lp":67123.5}}]}"#;

    #[test]
    fn qsd_frame_produces_one_price() {
        let dispatcher = FrameDispatcher::new();
        let actions = dispatcher.dispatch(&FrameCodec::wrap(QSD_PAYLOAD));

        assert_eq!(actions.len(), 1);
        match &actions[0] {
            Dispatch::Price(event) => {
                assert_eq!(event.symbol, "BINANCE:BTCUSDT");
                assert_eq!(event.price, Decimal::new(671_235, 1));
            }
            Dispatch::Echo(_) => panic!("expected price"),
        }
    }

    #[test]
    fn unknown_method_produces_nothing() {
        let dispatcher = FrameDispatcher::new();
        let raw = FrameCodec::wrap(r#"{"m":"quote_completed","p":["qs_x","BINANCE:BTCUSDT"]}"#);
        assert!(dispatcher.dispatch(&raw).is_empty());
    }

    #[test]
    fn keep_alive_is_echoed_verbatim() {
        let dispatcher = FrameDispatcher::new();
        assert_eq!(
            dispatcher.dispatch("~m~2~m~42"),
            vec![Dispatch::Echo("~m~2~m~42".to_string())]
        );
        assert_eq!(
            dispatcher.dispatch("~m~4~m~~h~9"),
            vec![Dispatch::Echo("~m~4~m~~h~9".to_string())]
        );
    }

    #[test]
    fn mixed_batch_keeps_order() {
        let dispatcher = FrameDispatcher::new();
        let raw = format!(
            "{}~m~2~m~42{}",
            FrameCodec::wrap(QSD_PAYLOAD),
            FrameCodec::wrap(QSD_PAYLOAD)
        );

        let actions = dispatcher.dispatch(&raw);
        assert_eq!(actions.len(), 3);
        assert!(matches!(actions[0], Dispatch::Price(_)));
        assert_eq!(actions[1], Dispatch::Echo("~m~2~m~42".to_string()));
        assert!(matches!(actions[2], Dispatch::Price(_)));
    }

    #[test]
    fn corrupt_frames_are_skipped() {
        let dispatcher = FrameDispatcher::new();
        let raw = format!("~m~7~m~{{broken~m~3~m~abc{}", FrameCodec::wrap(QSD_PAYLOAD));
        let actions = dispatcher.dispatch(&raw);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], Dispatch::Price(_)));
    }
}
