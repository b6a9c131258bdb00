//! Symbol Search Adapter
//!
//! HTTP implementation of the [`SymbolResolver`] port against TradingView's
//! symbol search endpoint.
//!
//! # Endpoint
//!
//! `GET <search_url>?text=<query>&type=<category>`
//!
//! The service has answered both with a bare JSON array of results and with
//! an object wrapping them in `symbols`. Tickers may carry `<em>` highlight
//! markup around the matched part of the query.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ORIGIN;
use serde::Deserialize;

use crate::application::ports::{ResolveError, SymbolResolver};
use crate::domain::quote::{Category, ResolvedSymbol};
use crate::infrastructure::config::StreamConfig;

/// One search hit. Extra fields are ignored.
#[derive(Debug, Deserialize)]
struct SearchHit {
    symbol: String,
    exchange: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    List(Vec<SearchHit>),
    Wrapped { symbols: Vec<SearchHit> },
}

impl SearchResponse {
    fn into_hits(self) -> Vec<SearchHit> {
        match self {
            Self::List(hits) | Self::Wrapped { symbols: hits } => hits,
        }
    }
}

/// Symbol resolver backed by the HTTP search endpoint.
#[derive(Debug, Clone)]
pub struct HttpSymbolResolver {
    client: Client,
    search_url: String,
    origin: String,
}

impl HttpSymbolResolver {
    /// Create a resolver for `search_url`.
    ///
    /// # Errors
    ///
    /// Returns `Network` if the HTTP client cannot be built.
    pub fn new(
        search_url: impl Into<String>,
        origin: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResolveError::Network(e.to_string()))?;

        Ok(Self {
            client,
            search_url: search_url.into(),
            origin: origin.into(),
        })
    }

    /// Create a resolver from a loaded [`StreamConfig`].
    ///
    /// # Errors
    ///
    /// Returns `Network` if the HTTP client cannot be built.
    pub fn from_stream_config(config: &StreamConfig) -> Result<Self, ResolveError> {
        Self::new(
            config.endpoints.search_url.clone(),
            config.endpoints.origin.clone(),
            config.search_timeout,
        )
    }
}

#[async_trait]
impl SymbolResolver for HttpSymbolResolver {
    async fn resolve(
        &self,
        query: &str,
        category: Category,
    ) -> Result<ResolvedSymbol, ResolveError> {
        tracing::debug!(query, category = %category, url = %self.search_url, "Searching symbol");

        let response = self
            .client
            .get(&self.search_url)
            .query(&[("text", query), ("type", category.as_str())])
            .header(ORIGIN, &self.origin)
            .send()
            .await
            .map_err(|e| ResolveError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Network(format!(
                "symbol search returned HTTP {status}"
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::InvalidResponse(e.to_string()))?;

        let hit = body
            .into_hits()
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::NotFound {
                query: query.to_string(),
                category,
            })?;

        let resolved = ResolvedSymbol::new(
            strip_highlight(&hit.exchange).to_uppercase(),
            strip_highlight(&hit.symbol).to_uppercase(),
        );
        tracing::debug!(exchange = %resolved.exchange, symbol = %resolved.symbol, "Search hit");
        Ok(resolved)
    }
}

/// Remove `<em>`/`</em>` highlight markup.
fn strip_highlight(text: &str) -> String {
    text.replace("<em>", "").replace("</em>", "").trim().to_string()
}
