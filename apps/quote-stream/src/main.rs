//! Quote Stream Binary
//!
//! Resolves a symbol and prints its live last price until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p quote-stream -- BTCUSDT --category crypto
//! ```
//!
//! # Environment Variables
//!
//! - `QUOTE_STREAM_WS_URL`: Quote WebSocket URL
//! - `QUOTE_STREAM_ORIGIN`: `Origin` header (default: <https://data.tradingview.com>)
//! - `QUOTE_STREAM_SEARCH_URL`: Symbol search URL
//! - `QUOTE_STREAM_FIELDS`: Comma-separated quote fields (default: lp)
//! - `QUOTE_STREAM_METRICS_PORT`: Prometheus metrics port (default: 0, disabled)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `RUST_LOG`: Log level (default: info)
//!
//! See `StreamConfig` for the full list.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use quote_stream::infrastructure::telemetry;
use quote_stream::{
    Category, ClientConfig, HttpSymbolResolver, QuoteStreamClient, StreamConfig, StreamEvent,
    init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Stream live last prices for a symbol.
#[derive(Debug, Parser)]
#[command(name = "quote-stream", version, about)]
struct Cli {
    /// Free-text symbol query, e.g. `BTCUSDT` or `AAPL`.
    query: String,

    /// Instrument category used for the symbol search.
    #[arg(short, long, value_enum, default_value_t = Category::Crypto)]
    category: Category,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!(query = %cli.query, category = %cli.category, "Starting quote stream");

    let config = StreamConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    if let Some(addr) = init_metrics(config.metrics_port)? {
        tracing::info!(%addr, "Prometheus metrics listening");
    }

    let shutdown_token = CancellationToken::new();
    let resolver = Arc::new(HttpSymbolResolver::from_stream_config(&config)?);
    let (event_tx, event_rx) = mpsc::channel::<StreamEvent>(config.event_capacity);

    let client = Arc::new(QuoteStreamClient::new(
        ClientConfig::from_stream_config(&config),
        cli.query,
        cli.category,
        resolver,
        event_tx,
        shutdown_token.clone(),
    ));

    let printer = tokio::spawn(print_events(event_rx));
    let mut client_handle = tokio::spawn(Arc::clone(&client).run());

    let finished = tokio::select! {
        () = await_shutdown() => None,
        joined = &mut client_handle => Some(joined),
    };
    let joined = match finished {
        Some(joined) => joined,
        None => {
            shutdown_token.cancel();
            client_handle.await
        }
    };

    let outcome = joined.context("quote stream task panicked")?;
    tracing::info!(state = client.state().as_str(), "Quote stream stopped");

    // Last sender goes with the client; the printer drains and exits.
    drop(client);
    let _ = printer.await;

    outcome.map_err(Into::into)
}

/// Print prices to stdout and log lifecycle events.
async fn print_events(mut rx: mpsc::Receiver<StreamEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Price(price) => {
                println!("{}: {}", price.symbol, price.price);
            }
            StreamEvent::Connected { session_id } => {
                tracing::info!(%session_id, "Subscribed");
            }
            StreamEvent::Disconnected => {
                tracing::warn!("Disconnected");
            }
            StreamEvent::Reconnecting { attempt, delay } => {
                tracing::info!(attempt, delay_secs = delay.as_secs_f64(), "Reconnecting");
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &StreamConfig) {
    tracing::info!(
        ws_url = %config.endpoints.ws_url,
        search_url = %config.endpoints.search_url,
        fields = ?config.fields,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        connect_timeout_secs = config.connection.connect_timeout.as_secs(),
        ping_interval_secs = config.connection.ping_interval.as_secs(),
        reconnect_max_secs = config.connection.reconnect_delay_max.as_secs(),
        max_reconnect_attempts = config.connection.max_reconnect_attempts,
        "Connection settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
