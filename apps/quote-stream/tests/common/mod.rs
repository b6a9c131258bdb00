//! Shared helpers for quote stream integration tests.
//!
//! `MockQuoteServer` accepts WebSocket upgrades on a loopback port and hands
//! each connection to the test, which then scripts the server side.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use quote_stream::infrastructure::tradingview::{Envelope, Frame};
use quote_stream::{
    ClientConfig, QuoteStreamClient, ResolvedSymbol, StaticSymbolResolver, StreamEvent,
    Category, FrameCodec,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use tokio_util::sync::CancellationToken;

/// Upper bound on any single wait in these tests.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Origin the tests configure on the client.
pub const TEST_ORIGIN: &str = "https://data.tradingview.com";

/// Loopback WebSocket server.
pub struct MockQuoteServer {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<ServerConnection>,
    cancel: CancellationToken,
}

impl MockQuoteServer {
    /// Bind and start accepting.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, connections) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let accept_cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = accept_cancel.cancelled() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            if let Some(conn) = ServerConnection::handshake(stream).await {
                                let _ = tx.send(conn);
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            connections,
            cancel,
        }
    }

    /// WebSocket URL for this server.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/socket.io/websocket", self.addr)
    }

    /// Wait for the next client connection.
    pub async fn accept(&mut self) -> ServerConnection {
        timeout(STEP_TIMEOUT, self.connections.recv())
            .await
            .expect("client should connect")
            .expect("accept loop running")
    }
}

impl Drop for MockQuoteServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Server side of one accepted connection.
pub struct ServerConnection {
    pub origin: Option<String>,
    ws: WebSocketStream<TcpStream>,
    codec: FrameCodec,
}

impl ServerConnection {
    async fn handshake(stream: TcpStream) -> Option<Self> {
        let (origin_tx, origin_rx) = oneshot::channel();
        let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let origin = req
                .headers()
                .get("origin")
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string);
            let _ = origin_tx.send(origin);
            Ok(resp)
        };

        let ws = accept_hdr_async(stream, callback).await.ok()?;
        let origin = origin_rx.await.ok().flatten();

        Some(Self {
            origin,
            ws,
            codec: FrameCodec::new(),
        })
    }

    /// Next text message from the client, skipping control frames.
    /// `None` once the client closes.
    pub async fn recv_text(&mut self) -> Option<String> {
        loop {
            let msg = timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .expect("client should send")?;
            match msg {
                Ok(Message::Text(text)) => return Some(text.to_string()),
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Ok(Message::Binary(_)) => panic!("client sent binary"),
                Ok(Message::Close(_)) | Err(_) => return None,
            }
        }
    }

    /// Wait for a transport ping from the client, answering nothing.
    pub async fn recv_ping(&mut self) {
        loop {
            let msg = timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .expect("client should ping")
                .expect("connection open");
            match msg {
                Ok(Message::Ping(_)) => return,
                Ok(Message::Close(_)) | Err(_) => panic!("connection closed before ping"),
                Ok(_) => {}
            }
        }
    }

    /// Next text message decoded as a single envelope.
    pub async fn recv_envelope(&mut self) -> Envelope {
        let text = self.recv_text().await.expect("client should send a frame");
        let mut frames = self.codec.decode(&text);
        assert_eq!(frames.len(), 1, "expected one frame in {text:?}");
        match frames.remove(0) {
            Frame::Envelope(envelope) => envelope,
            Frame::KeepAlive(token) => panic!("unexpected keep-alive {token:?}"),
        }
    }

    /// Read the three setup messages and return the session id they share.
    pub async fn recv_setup(&mut self, symbol: &str) -> String {
        let create = self.recv_envelope().await;
        assert_eq!(create.method(), Some("quote_create_session"));
        let session_id = create.params[0].as_str().unwrap().to_string();

        let fields = self.recv_envelope().await;
        assert_eq!(fields.method(), Some("quote_set_fields"));
        assert_eq!(fields.params[0], session_id.as_str());
        assert_eq!(fields.params[1], "lp");

        let add = self.recv_envelope().await;
        assert_eq!(add.method(), Some("quote_add_symbols"));
        assert_eq!(add.params[0], session_id.as_str());
        assert_eq!(add.params[1], symbol);

        session_id
    }

    /// Send one raw transport message.
    pub async fn send_raw(&mut self, raw: impl Into<String>) {
        self.ws.send(Message::Text(raw.into().into())).await.unwrap();
    }

    /// Send a `qsd` last-price update.
    pub async fn send_price(&mut self, session_id: &str, symbol: &str, price: &str) {
        self.send_raw(qsd_frame(session_id, symbol, price)).await;
    }

    /// Close the connection from the server side.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Wrapped `qsd` frame with a literal numeric price.
pub fn qsd_frame(session_id: &str, symbol: &str, price: &str) -> String {
    FrameCodec::wrap(&format!(
        r#"{{"m":"qsd","p":["{session_id}",{{"n":"{symbol}","v":{{"lp":{price}}}}}]}}"#
    ))
}

/// Client handles for one test.
pub struct Harness {
    pub client: Arc<QuoteStreamClient>,
    pub events: mpsc::Receiver<StreamEvent>,
    pub cancel: CancellationToken,
}

impl Harness {
    /// Client for `BINANCE:BTCUSDT` against `server` with fast backoff.
    pub fn new(server: &MockQuoteServer) -> Self {
        Self::with_config(server, |_| {})
    }

    /// As [`Harness::new`], with `adjust` applied to the client config.
    pub fn with_config(server: &MockQuoteServer, adjust: impl FnOnce(&mut ClientConfig)) -> Self {
        let mut config = ClientConfig::new(server.ws_url(), TEST_ORIGIN);
        config.connect_timeout = Duration::from_secs(2);
        config.reconnect.initial_delay = Duration::from_millis(20);
        config.reconnect.max_delay = Duration::from_millis(200);
        adjust(&mut config);

        let resolver = StaticSymbolResolver::new()
            .with_entry("btcusdt", ResolvedSymbol::new("binance", "btcusdt"));
        let (tx, events) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let client = Arc::new(QuoteStreamClient::new(
            config,
            "btcusdt",
            Category::Crypto,
            Arc::new(resolver),
            tx,
            cancel.clone(),
        ));

        Self {
            client,
            events,
            cancel,
        }
    }

    /// Next emitted event.
    pub async fn next_event(&mut self) -> StreamEvent {
        timeout(STEP_TIMEOUT, self.events.recv())
            .await
            .expect("event expected")
            .expect("event channel open")
    }
}
