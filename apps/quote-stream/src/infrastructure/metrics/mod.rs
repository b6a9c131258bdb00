//! Prometheus Metrics Module
//!
//! Exposes stream client metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Frames**: Decoded and discarded wire frames
//! - **Liveness**: Keep-alive echoes
//! - **Quotes**: Price events delivered to the caller
//! - **Connections**: Connection state and reconnection attempts
//!
//! # Integration
//!
//! When enabled, metrics are served at `/metrics` on the configured port.
//! Recording functions are no-ops until a recorder is installed.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// =============================================================================
// Exporter Installation
// =============================================================================

static EXPORTER_ADDR: OnceLock<SocketAddr> = OnceLock::new();

/// Metrics setup errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The Prometheus exporter could not be installed.
    #[error("failed to install Prometheus exporter: {0}")]
    Install(#[from] BuildError),
}

/// Install the Prometheus exporter with an HTTP listener on `port`.
///
/// A port of 0 leaves metrics disabled. Calling this again after a
/// successful install is a no-op and returns the original address.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns an error if the recorder or listener cannot be installed.
pub fn init_metrics(port: u16) -> Result<Option<SocketAddr>, MetricsError> {
    if port == 0 {
        return Ok(None);
    }
    if let Some(addr) = EXPORTER_ADDR.get() {
        return Ok(Some(*addr));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metrics();

    Ok(Some(*EXPORTER_ADDR.get_or_init(|| addr)))
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "quote_stream_frames_decoded_total",
        "Total wire frames decoded"
    );
    describe_counter!(
        "quote_stream_frames_discarded_total",
        "Total wire frames discarded as malformed"
    );
    describe_counter!(
        "quote_stream_keepalives_echoed_total",
        "Total keep-alive frames echoed to the server"
    );
    describe_counter!(
        "quote_stream_price_events_total",
        "Total price events delivered"
    );
    describe_counter!(
        "quote_stream_reconnects_total",
        "Total WebSocket reconnection attempts"
    );
    describe_gauge!(
        "quote_stream_connection_active",
        "1 while a quote session is active, 0 otherwise"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a successfully decoded frame.
pub fn record_frame_decoded() {
    counter!("quote_stream_frames_decoded_total").increment(1);
}

/// Record a discarded frame.
pub fn record_frame_discarded() {
    counter!("quote_stream_frames_discarded_total").increment(1);
}

/// Record a keep-alive echo.
pub fn record_keep_alive_echoed() {
    counter!("quote_stream_keepalives_echoed_total").increment(1);
}

/// Record a delivered price event.
pub fn record_price_event(symbol: &str) {
    counter!(
        "quote_stream_price_events_total",
        "symbol" => symbol.to_string()
    )
    .increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("quote_stream_reconnects_total").increment(1);
}

/// Update the active-connection gauge.
pub fn set_connection_active(active: bool) {
    gauge!("quote_stream_connection_active").set(if active { 1.0 } else { 0.0 });
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_when_port_is_zero() {
        assert!(init_metrics(0).unwrap().is_none());
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame_decoded();
        record_frame_discarded();
        record_keep_alive_echoed();
        record_price_event("BINANCE:BTCUSDT");
        record_reconnect();
        set_connection_active(true);
    }
}
