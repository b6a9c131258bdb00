//! Quote Stream Client
//!
//! Supervises one subscription against the TradingView quote socket.
//!
//! # Lifecycle
//!
//! ```text
//! resolve (once) ─► Connecting ─► Active ─► Disconnected ─► backoff ─┐
//!                       ▲                                            │
//!                       └────────────── fresh session ◄──────────────┘
//! ```
//!
//! Every connection attempt gets a new [`Session`] and replays the full setup
//! sequence. Cancellation moves the client to `ShuttingDown` from any state
//! and `run()` returns `Ok(())`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, Stream, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::{OnceCell, mpsc};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, FrameCodec};
use super::dispatch::{Dispatch, FrameDispatcher};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::session::Session;
use crate::application::ports::{ResolveError, SymbolResolver};
use crate::domain::quote::{Category, FIELD_LAST_PRICE, PriceEvent, SubscriptionRequest};
use crate::infrastructure::config::{DEFAULT_ORIGIN, DEFAULT_WS_URL, StreamConfig};
use crate::infrastructure::metrics;

type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the quote stream client.
///
/// Only `Resolve`, `InvalidRequest` and `MaxReconnectAttemptsExceeded`
/// escape [`QuoteStreamClient::run`]; the rest end a single connection and
/// trigger a reconnect.
#[derive(Debug, thiserror::Error)]
pub enum StreamClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The upgrade request could not be built.
    #[error("invalid connection request: {0}")]
    InvalidRequest(String),

    /// Symbol resolution failed.
    #[error("symbol resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The handshake did not finish in time.
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// A transport ping went unanswered.
    #[error("heartbeat timeout")]
    HeartbeatTimeout,

    /// Connection closed by the server or the stream ended.
    #[error("connection closed")]
    ConnectionClosed,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxReconnectAttemptsExceeded(u32),
}

// =============================================================================
// Events and State
// =============================================================================

/// Events emitted by the quote stream client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Setup sequence sent on a fresh connection.
    Connected {
        /// Session token for this connection.
        session_id: String,
    },
    /// The connection was lost.
    Disconnected,
    /// Waiting before the next connection attempt.
    Reconnecting {
        /// Attempt number since the last reset.
        attempt: u32,
        /// Backoff delay before the attempt.
        delay: Duration,
    },
    /// Price update.
    Price(PriceEvent),
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport open.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Transport open and session set up.
    Active,
    /// Cancelled; terminal.
    ShuttingDown,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for the quote stream client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// `Origin` header value.
    pub origin: String,
    /// Quote fields to request.
    pub fields: Vec<String>,
    /// Handshake timeout.
    pub connect_timeout: Duration,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
    /// Active period after which the backoff starts over.
    pub backoff_reset_after: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WS_URL, DEFAULT_ORIGIN)
    }
}

impl ClientConfig {
    /// Create a new configuration with default timings.
    #[must_use]
    pub fn new(url: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            origin: origin.into(),
            fields: vec![FIELD_LAST_PRICE.to_string()],
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            backoff_reset_after: None,
        }
    }

    /// Create configuration from a loaded [`StreamConfig`].
    #[must_use]
    pub fn from_stream_config(config: &StreamConfig) -> Self {
        Self {
            url: config.endpoints.ws_url.clone(),
            origin: config.endpoints.origin.clone(),
            fields: config.fields.clone(),
            connect_timeout: config.connection.connect_timeout,
            reconnect: ReconnectConfig::from_connection_settings(&config.connection),
            heartbeat: HeartbeatConfig::from_connection_settings(&config.connection),
            backoff_reset_after: config.connection.backoff_reset(),
        }
    }
}

// =============================================================================
// Quote Stream Client
// =============================================================================

/// Quote stream client.
///
/// Manages the connection lifecycle including:
/// - One-time symbol resolution
/// - Session setup on every connection
/// - Keep-alive echo and heartbeat monitoring
/// - Automatic reconnection with exponential backoff
pub struct QuoteStreamClient {
    config: ClientConfig,
    query: String,
    category: Category,
    resolver: Arc<dyn SymbolResolver>,
    subscription: OnceCell<SubscriptionRequest>,
    codec: FrameCodec,
    dispatcher: FrameDispatcher,
    event_tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    state: RwLock<ConnectionState>,
}

impl QuoteStreamClient {
    /// Create a new client for `query` in `category`.
    #[must_use]
    pub fn new(
        config: ClientConfig,
        query: impl Into<String>,
        category: Category,
        resolver: Arc<dyn SymbolResolver>,
        event_tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            query: query.into(),
            category,
            resolver,
            subscription: OnceCell::new(),
            codec: FrameCodec::new(),
            dispatcher: FrameDispatcher::new(),
            event_tx,
            cancel,
            state: RwLock::new(ConnectionState::Disconnected),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Resolve the subscription, once per client.
    ///
    /// # Errors
    ///
    /// Returns `Resolve` if the lookup fails or returns an unusable symbol.
    pub async fn subscription(&self) -> Result<&SubscriptionRequest, StreamClientError> {
        self.subscription
            .get_or_try_init(|| async {
                let resolved = self.resolver.resolve(&self.query, self.category).await?;
                let symbol_id = resolved
                    .to_symbol_id()
                    .map_err(|e| ResolveError::InvalidResponse(e.to_string()))?;

                tracing::info!(
                    query = %self.query,
                    category = %self.category,
                    symbol = %symbol_id,
                    "Resolved symbol"
                );

                Ok::<_, StreamClientError>(SubscriptionRequest::new(
                    symbol_id,
                    self.category,
                    &self.config.fields,
                ))
            })
            .await
    }

    /// Run the connection loop until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution fails, the configured URL cannot form
    /// a request, or a finite reconnect limit is exhausted.
    pub async fn run(self: Arc<Self>) -> Result<(), StreamClientError> {
        let subscription = self.subscription().await?.clone();
        self.build_request()?;

        let mut reconnect_policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Quote stream client cancelled");
                self.set_state(ConnectionState::ShuttingDown);
                return Ok(());
            }

            let session = Session::generate();
            let mut active_since = None;

            match self
                .connect_and_run(&session, &subscription, &mut active_since)
                .await
            {
                Ok(()) => {
                    tracing::info!(session_id = %session, "Quote stream closed");
                    self.set_state(ConnectionState::ShuttingDown);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(session_id = %session, error = %e, "Quote stream connection error");
                    self.set_state(ConnectionState::Disconnected);
                    self.emit(StreamEvent::Disconnected).await;

                    if let (Some(threshold), Some(since)) =
                        (self.config.backoff_reset_after, active_since)
                        && since.elapsed() >= threshold
                    {
                        tracing::debug!("Resetting backoff after sustained connection");
                        reconnect_policy.reset();
                    }

                    let Some(delay) = reconnect_policy.next_delay() else {
                        return Err(StreamClientError::MaxReconnectAttemptsExceeded(
                            reconnect_policy.max_attempts(),
                        ));
                    };
                    let attempt = reconnect_policy.attempt_count();

                    tracing::info!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Reconnecting to quote stream"
                    );
                    metrics::record_reconnect();
                    self.emit(StreamEvent::Reconnecting { attempt, delay }).await;

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::info!("Quote stream client cancelled during reconnect delay");
                            self.set_state(ConnectionState::ShuttingDown);
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Connect, set up `session`, and pump messages until error or
    /// cancellation. `Ok(())` means cancelled.
    async fn connect_and_run(
        &self,
        session: &Session,
        subscription: &SubscriptionRequest,
        active_since: &mut Option<Instant>,
    ) -> Result<(), StreamClientError> {
        self.set_state(ConnectionState::Connecting);
        tracing::info!(url = %self.config.url, session_id = %session, "Connecting to quote stream");

        let request = self.build_request()?;
        let connect = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(request),
        );

        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = connect => result
                .map_err(|_| StreamClientError::ConnectTimeout(self.config.connect_timeout))??,
        };

        let (mut write, mut read) = ws_stream.split();
        self.set_state(ConnectionState::Active);

        for message in session.setup_sequence(subscription) {
            if self.cancel.is_cancelled() {
                self.shutdown(&mut write, None).await;
                return Ok(());
            }
            let frame = self.codec.encode_message(&message)?;
            write.send(Message::Text(frame.into())).await?;
        }

        *active_since = Some(Instant::now());
        metrics::set_connection_active(true);
        tracing::info!(
            session_id = %session,
            symbol = %subscription.symbol_id(),
            fields = ?subscription.fields(),
            "Quote session established"
        );
        self.emit(StreamEvent::Connected {
            session_id: session.id().to_string(),
        })
        .await;

        let result = self
            .pump(&mut write, &mut read, session, subscription)
            .await;
        metrics::set_connection_active(false);
        result
    }

    async fn pump<R>(
        &self,
        write: &mut WsWrite,
        read: &mut R,
        session: &Session,
        subscription: &SubscriptionRequest,
    ) -> Result<(), StreamClientError>
    where
        R: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
        let heartbeat_cancel = self.cancel.child_token();
        let _heartbeat_guard = heartbeat_cancel.clone().drop_guard();

        tokio::spawn(
            HeartbeatManager::new(
                self.config.heartbeat.clone(),
                heartbeat_state.clone(),
                heartbeat_tx,
                heartbeat_cancel,
            )
            .run(),
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let remove = session.remove_symbols(subscription);
                    self.shutdown(write, self.codec.encode_message(&remove).ok()).await;
                    return Ok(());
                }
                heartbeat_event = heartbeat_rx.recv() => {
                    if let Some(ping) = ping_for(heartbeat_event).inspect_err(|_| {
                        tracing::warn!(session_id = %session, "Heartbeat lost");
                    })? {
                        heartbeat_state.mark_ping_sent();
                        write.send(ping).await?;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            heartbeat_state.record_pong();
                            self.handle_text(text.as_str(), write).await?;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            heartbeat_state.record_pong();
                            if let Ok(text) = std::str::from_utf8(&data) {
                                self.handle_text(text, write).await?;
                            } else {
                                tracing::debug!(len = data.len(), "Discarding non-UTF-8 binary message");
                                metrics::record_frame_discarded();
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            heartbeat_state.record_pong();
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(session_id = %session, frame = ?frame, "Server sent close frame");
                            return Err(StreamClientError::ConnectionClosed);
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!(session_id = %session, "WebSocket stream ended");
                            return Err(StreamClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Echo keep-alives and deliver prices, in frame order.
    async fn handle_text(&self, text: &str, write: &mut WsWrite) -> Result<(), StreamClientError> {
        for action in self.dispatcher.dispatch(text) {
            match action {
                Dispatch::Echo(frame) => {
                    write.send(Message::Text(frame.into())).await?;
                    metrics::record_keep_alive_echoed();
                }
                Dispatch::Price(event) => {
                    tracing::debug!(symbol = %event.symbol, price = %event.price, "Price update");
                    metrics::record_price_event(&event.symbol);
                    self.emit(StreamEvent::Price(event)).await;
                }
            }
        }
        Ok(())
    }

    /// Best-effort unsubscribe and close.
    async fn shutdown(&self, write: &mut WsWrite, unsubscribe: Option<String>) {
        self.set_state(ConnectionState::ShuttingDown);

        if let Some(frame) = unsubscribe
            && let Err(e) = write.send(Message::Text(frame.into())).await
        {
            tracing::debug!(error = %e, "Failed to send unsubscribe");
        }
        if let Err(e) = write.send(Message::Close(None)).await {
            tracing::debug!(error = %e, "Failed to send close frame");
        }
    }

    /// Deliver an event unless cancelled first. A dropped receiver is not an
    /// error.
    async fn emit(&self, event: StreamEvent) {
        tokio::select! {
            () = self.cancel.cancelled() => {}
            result = self.event_tx.send(event) => {
                if result.is_err() {
                    tracing::trace!("Stream event receiver dropped");
                }
            }
        }
    }

    fn build_request(&self) -> Result<Request, StreamClientError> {
        let mut request = self.config.url.as_str().into_client_request()?;
        let origin = HeaderValue::from_str(&self.config.origin)
            .map_err(|e| StreamClientError::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert(ORIGIN, origin);
        Ok(request)
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.write();
        if *current != ConnectionState::ShuttingDown {
            *current = state;
        }
    }
}

/// Ping to send for a heartbeat event. A timeout or a stopped heartbeat
/// task both end the connection.
fn ping_for(event: Option<HeartbeatEvent>) -> Result<Option<Message>, StreamClientError> {
    match event {
        Some(HeartbeatEvent::SendPing) => Ok(Some(Message::Ping(Vec::new().into()))),
        Some(HeartbeatEvent::Timeout) | None => Err(StreamClientError::HeartbeatTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockSymbolResolver;
    use crate::domain::quote::ResolvedSymbol;

    fn client_with(
        config: ClientConfig,
        resolver: MockSymbolResolver,
    ) -> (Arc<QuoteStreamClient>, mpsc::Receiver<StreamEvent>, CancellationToken) {
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let client = QuoteStreamClient::new(
            config,
            "btcusdt",
            Category::Crypto,
            Arc::new(resolver),
            tx,
            cancel.clone(),
        );
        (Arc::new(client), rx, cancel)
    }

    fn resolving_once() -> MockSymbolResolver {
        let mut resolver = MockSymbolResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|_, _| Ok(ResolvedSymbol::new("binance", "btcusdt")));
        resolver
    }

    fn unreachable_config() -> ClientConfig {
        let mut config = ClientConfig::new("ws://127.0.0.1:1/socket", DEFAULT_ORIGIN);
        config.connect_timeout = Duration::from_millis(500);
        config.reconnect = ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            multiplier: 2.0,
            max_attempts: 2,
        };
        config
    }

    #[test]
    fn client_config_from_stream_config() {
        let stream = StreamConfig::default();
        let config = ClientConfig::from_stream_config(&stream);
        assert_eq!(config.url, DEFAULT_WS_URL);
        assert_eq!(config.origin, DEFAULT_ORIGIN);
        assert_eq!(config.fields, vec!["lp".to_string()]);
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(300));
        assert_eq!(config.heartbeat.pong_timeout, Duration::from_secs(10));
        assert!(config.backoff_reset_after.is_none());
    }

    #[test]
    fn request_carries_origin() {
        let (client, _rx, _cancel) = client_with(ClientConfig::default(), MockSymbolResolver::new());
        let request = client.build_request().unwrap();
        assert_eq!(
            request.headers().get(ORIGIN).unwrap(),
            "https://data.tradingview.com"
        );
    }

    #[tokio::test]
    async fn resolves_exactly_once() {
        let (client, _rx, _cancel) = client_with(ClientConfig::default(), resolving_once());

        let first = client.subscription().await.unwrap().clone();
        let second = client.subscription().await.unwrap();

        assert_eq!(&first, second);
        assert_eq!(first.symbol_id().to_string(), "BINANCE:BTCUSDT");
        assert_eq!(first.category(), Category::Crypto);
    }

    #[tokio::test]
    async fn resolution_failure_aborts_before_connecting() {
        let mut resolver = MockSymbolResolver::new();
        resolver.expect_resolve().times(1).returning(|query, category| {
            Err(ResolveError::NotFound {
                query: query.to_string(),
                category,
            })
        });
        let (client, mut rx, _cancel) = client_with(unreachable_config(), resolver);

        let result = client.clone().run().await;

        assert!(matches!(
            result,
            Err(StreamClientError::Resolve(ResolveError::NotFound { .. }))
        ));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn blank_resolution_is_invalid_response() {
        let mut resolver = MockSymbolResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|_, _| Ok(ResolvedSymbol::new("", "BTCUSDT")));
        let (client, _rx, _cancel) = client_with(ClientConfig::default(), resolver);

        assert!(matches!(
            client.subscription().await,
            Err(StreamClientError::Resolve(ResolveError::InvalidResponse(_)))
        ));
    }

    #[tokio::test]
    async fn failed_connections_back_off_then_give_up() {
        let (client, mut rx, _cancel) = client_with(unreachable_config(), resolving_once());

        let result = tokio::time::timeout(Duration::from_secs(5), client.clone().run())
            .await
            .expect("run should finish");
        assert!(matches!(
            result,
            Err(StreamClientError::MaxReconnectAttemptsExceeded(2))
        ));

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                StreamEvent::Disconnected,
                StreamEvent::Reconnecting {
                    attempt: 1,
                    delay: Duration::from_millis(10)
                },
                StreamEvent::Disconnected,
                StreamEvent::Reconnecting {
                    attempt: 2,
                    delay: Duration::from_millis(20)
                },
                StreamEvent::Disconnected,
            ]
        );
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn cancel_during_backoff_returns_ok() {
        let mut config = unreachable_config();
        config.reconnect.initial_delay = Duration::from_secs(60);
        config.reconnect.max_delay = Duration::from_secs(60);
        let (client, mut rx, cancel) = client_with(config, resolving_once());

        let handle = tokio::spawn(client.clone().run());

        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("event expected")
                .expect("channel open");
            if matches!(event, StreamEvent::Reconnecting { .. }) {
                break;
            }
        }
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("run should stop promptly")
            .expect("task should not panic");
        assert!(result.is_ok());
        assert_eq!(client.state(), ConnectionState::ShuttingDown);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_connects() {
        let (client, mut rx, cancel) = client_with(unreachable_config(), resolving_once());
        cancel.cancel();

        assert!(client.clone().run().await.is_ok());
        assert_eq!(client.state(), ConnectionState::ShuttingDown);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn heartbeat_events_map_to_pings_or_errors() {
        assert!(matches!(
            ping_for(Some(HeartbeatEvent::SendPing)),
            Ok(Some(Message::Ping(_)))
        ));
        assert!(matches!(
            ping_for(Some(HeartbeatEvent::Timeout)),
            Err(StreamClientError::HeartbeatTimeout)
        ));
    }

    #[test]
    fn stopped_heartbeat_ends_the_connection() {
        assert!(matches!(
            ping_for(None),
            Err(StreamClientError::HeartbeatTimeout)
        ));
    }

    #[test]
    fn shutting_down_is_terminal() {
        let (client, _rx, _cancel) = client_with(ClientConfig::default(), MockSymbolResolver::new());
        client.set_state(ConnectionState::ShuttingDown);
        client.set_state(ConnectionState::Connecting);
        assert_eq!(client.state(), ConnectionState::ShuttingDown);
    }
}
