//! TradingView Quote Protocol
//!
//! Client side of the `socket.io/websocket` quote feed.
//!
//! # Wire Format
//!
//! Every message is framed as `~m~<byte length>~m~<payload>` and one
//! transport message may carry several frames. Payloads are JSON envelopes
//! `{"m": method, "p": [params]}` or bare keep-alive tokens that must be
//! echoed back.
//!
//! # Components
//!
//! - `codec`: Frame encoding and decoding
//! - `messages`: Envelope and control message types
//! - `session`: Session tokens and setup sequences
//! - `parser`: `qsd` price extraction
//! - `dispatch`: Per-message receive pipeline
//! - `reconnect`: Backoff policy
//! - `heartbeat`: Transport ping/pong liveness
//! - `client`: Connection supervisor

pub mod client;
pub mod codec;
pub mod dispatch;
pub mod heartbeat;
pub mod messages;
pub mod parser;
pub mod reconnect;
pub mod session;

pub use client::{
    ClientConfig, ConnectionState, QuoteStreamClient, StreamClientError, StreamEvent,
};
pub use codec::{CodecError, Frame, FrameCodec, FrameError};
pub use dispatch::{Dispatch, FrameDispatcher};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
pub use messages::{ControlMessage, Envelope};
pub use parser::QuoteEventParser;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use session::Session;
