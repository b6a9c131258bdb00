#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Quote Stream - Live Last-Price Client
//!
//! Keeps a quote session open against TradingView's WebSocket feed,
//! subscribes to one resolved symbol and emits last-price updates.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Symbols, categories, subscriptions and price events
//!   - `quote`: Value types with no I/O
//!
//! - **Application**: Port definitions
//!   - `ports`: `SymbolResolver`
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `tradingview`: Frame codec, sessions, parser and connection supervisor
//!   - `search`: HTTP symbol search
//!   - `config`: Environment configuration
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//! query ──► SymbolResolver ──► SubscriptionRequest
//!                                     │
//!                                     ▼
//! TradingView WS ◄──── setup ──── QuoteStreamClient ──► StreamEvent channel
//!        │                            ▲
//!        └──► FrameCodec ──► QuoteEventParser
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Quote types with no external dependencies.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::quote::{
    Category, PriceEvent, ResolvedSymbol, SubscriptionRequest, SymbolError, SymbolId,
};

// Ports
pub use application::ports::{ResolveError, StaticSymbolResolver, SymbolResolver};

// Quote protocol client
pub use infrastructure::tradingview::{
    ClientConfig, ConnectionState, FrameCodec, QuoteEventParser, QuoteStreamClient, Session,
    StreamClientError, StreamEvent,
};

// Symbol search
pub use infrastructure::search::HttpSymbolResolver;

// Infrastructure config
pub use infrastructure::config::{ConfigError, ConnectionSettings, EndpointSettings, StreamConfig};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
