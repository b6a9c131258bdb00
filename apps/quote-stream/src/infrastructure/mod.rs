//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the quote protocol client.

/// TradingView quote protocol: framing, sessions, connection supervisor.
pub mod tradingview;

/// HTTP symbol search adapter.
pub mod search;

/// Configuration loaded from the environment.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
