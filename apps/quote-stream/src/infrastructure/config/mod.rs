//! Configuration Module
//!
//! Environment-driven configuration for the quote stream client.

mod settings;

pub use settings::{
    ConfigError, ConnectionSettings, DEFAULT_ORIGIN, DEFAULT_SEARCH_URL, DEFAULT_WS_URL,
    EndpointSettings, StreamConfig,
};
