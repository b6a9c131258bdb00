//! Stream Client Configuration Settings
//!
//! Configuration types for the quote stream client, loaded from environment
//! variables. Every value has a default that targets the public TradingView
//! endpoints, so an empty environment yields a working configuration.

use std::time::Duration;

use url::Url;

use crate::domain::quote::FIELD_LAST_PRICE;

/// Default quote WebSocket endpoint.
pub const DEFAULT_WS_URL: &str = "wss://data.tradingview.com/socket.io/websocket";

/// Default `Origin` header value. The server refuses upgrades without it.
pub const DEFAULT_ORIGIN: &str = "https://data.tradingview.com";

/// Default symbol search endpoint.
pub const DEFAULT_SEARCH_URL: &str = "https://symbol-search.tradingview.com/symbol_search/";

/// Remote endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    /// Quote WebSocket URL (`ws` or `wss`).
    pub ws_url: String,
    /// `Origin` header sent on the WebSocket upgrade and search requests.
    pub origin: String,
    /// Symbol search URL (`http` or `https`).
    pub search_url: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
        }
    }
}

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Upper bound on the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Transport ping interval.
    pub ping_interval: Duration,
    /// Time allowed for a pong before the connection is considered dead.
    pub ping_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Active period after which backoff starts over (zero = never).
    pub backoff_reset_after: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(10),
            reconnect_delay_initial: Duration::from_millis(1000),
            reconnect_delay_max: Duration::from_secs(300),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
            backoff_reset_after: Duration::ZERO,
        }
    }
}

impl ConnectionSettings {
    /// Backoff reset threshold, if enabled.
    #[must_use]
    pub const fn backoff_reset(&self) -> Option<Duration> {
        if self.backoff_reset_after.is_zero() {
            None
        } else {
            Some(self.backoff_reset_after)
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Remote endpoints.
    pub endpoints: EndpointSettings,
    /// WebSocket connection settings.
    pub connection: ConnectionSettings,
    /// Symbol search request timeout.
    pub search_timeout: Duration,
    /// Quote fields requested for the subscription.
    pub fields: Vec<String>,
    /// Capacity of the stream event channel.
    pub event_capacity: usize,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoints: EndpointSettings::default(),
            connection: ConnectionSettings::default(),
            search_timeout: Duration::from_secs(5),
            fields: vec![FIELD_LAST_PRICE.to_string()],
            event_capacity: 1024,
            metrics_port: 0,
        }
    }
}

impl StreamConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL is malformed or has the wrong scheme, if the
    /// field list is empty, or if a ping period, the initial reconnect delay
    /// or the backoff multiplier would stop the timers from advancing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`StreamConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let env = Env(lookup);

        let endpoints = EndpointSettings {
            ws_url: env.string("QUOTE_STREAM_WS_URL", &defaults.endpoints.ws_url),
            origin: env.string("QUOTE_STREAM_ORIGIN", &defaults.endpoints.origin),
            search_url: env.string("QUOTE_STREAM_SEARCH_URL", &defaults.endpoints.search_url),
        };
        validate_url("QUOTE_STREAM_WS_URL", &endpoints.ws_url, &["ws", "wss"])?;
        validate_url("QUOTE_STREAM_ORIGIN", &endpoints.origin, &["http", "https"])?;
        validate_url(
            "QUOTE_STREAM_SEARCH_URL",
            &endpoints.search_url,
            &["http", "https"],
        )?;

        let conn = &defaults.connection;
        let connection = ConnectionSettings {
            connect_timeout: env.duration_secs(
                "QUOTE_STREAM_CONNECT_TIMEOUT_SECS",
                conn.connect_timeout,
            ),
            ping_interval: env.duration_secs("QUOTE_STREAM_PING_INTERVAL_SECS", conn.ping_interval),
            ping_timeout: env.duration_secs("QUOTE_STREAM_PING_TIMEOUT_SECS", conn.ping_timeout),
            reconnect_delay_initial: env.duration_millis(
                "QUOTE_STREAM_RECONNECT_DELAY_INITIAL_MS",
                conn.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_secs(
                "QUOTE_STREAM_RECONNECT_DELAY_MAX_SECS",
                conn.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.parse(
                "QUOTE_STREAM_RECONNECT_DELAY_MULTIPLIER",
                conn.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: env.parse(
                "QUOTE_STREAM_MAX_RECONNECT_ATTEMPTS",
                conn.max_reconnect_attempts,
            ),
            backoff_reset_after: env.duration_secs(
                "QUOTE_STREAM_BACKOFF_RESET_SECS",
                conn.backoff_reset_after,
            ),
        };

        require_nonzero("QUOTE_STREAM_PING_INTERVAL_SECS", connection.ping_interval)?;
        require_nonzero("QUOTE_STREAM_PING_TIMEOUT_SECS", connection.ping_timeout)?;
        require_nonzero(
            "QUOTE_STREAM_RECONNECT_DELAY_INITIAL_MS",
            connection.reconnect_delay_initial,
        )?;
        let multiplier = connection.reconnect_delay_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "QUOTE_STREAM_RECONNECT_DELAY_MULTIPLIER".to_string(),
                reason: format!("must be a finite number >= 1, got {multiplier}"),
            });
        }

        let fields = match env.get("QUOTE_STREAM_FIELDS") {
            Some(raw) => parse_fields(&raw)?,
            None => defaults.fields,
        };

        Ok(Self {
            endpoints,
            connection,
            search_timeout: env.duration_secs(
                "QUOTE_STREAM_SEARCH_TIMEOUT_SECS",
                defaults.search_timeout,
            ),
            fields,
            event_capacity: env
                .parse("QUOTE_STREAM_EVENT_CAPACITY", defaults.event_capacity)
                .max(1),
            metrics_port: env.parse("QUOTE_STREAM_METRICS_PORT", defaults.metrics_port),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A URL could not be parsed.
    #[error("{key} is not a valid URL: {reason}")]
    InvalidUrl {
        /// Environment variable name.
        key: String,
        /// Parser message.
        reason: String,
    },
    /// A URL parsed but uses a scheme the client cannot speak.
    #[error("{key} must use one of {expected:?}, got {scheme}")]
    UnsupportedScheme {
        /// Environment variable name.
        key: String,
        /// Scheme found.
        scheme: String,
        /// Schemes accepted.
        expected: Vec<String>,
    },
    /// The field list contained no names.
    #[error("QUOTE_STREAM_FIELDS must name at least one field")]
    EmptyFields,
    /// A numeric setting is outside its usable range.
    #[error("{key} {reason}")]
    InvalidValue {
        /// Environment variable name.
        key: String,
        /// What the value must satisfy.
        reason: String,
    },
}

fn require_nonzero(key: &str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "must be greater than zero".to_string(),
        })
    } else {
        Ok(())
    }
}

fn validate_url(key: &str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        key: key.to_string(),
        reason: e.to_string(),
    })?;

    if schemes.contains(&url.scheme()) {
        Ok(())
    } else {
        Err(ConfigError::UnsupportedScheme {
            key: key.to_string(),
            scheme: url.scheme().to_string(),
            expected: schemes.iter().map(ToString::to_string).collect(),
        })
    }
}

fn parse_fields(raw: &str) -> Result<Vec<String>, ConfigError> {
    let fields: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(ToString::to_string)
        .collect();

    if fields.is_empty() {
        Err(ConfigError::EmptyFields)
    } else {
        Ok(fields)
    }
}

/// Typed accessors over a key lookup. Unparsable values fall back to the
/// default.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
