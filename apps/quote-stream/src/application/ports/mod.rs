//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `SymbolResolver`: Turns a free-text query into an `EXCHANGE:TICKER` id

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::quote::{Category, ResolvedSymbol};

/// Errors from symbol resolution. All of them are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The search returned no results.
    #[error("no symbol found for {query:?} in category {category}")]
    NotFound {
        /// Query text.
        query: String,
        /// Category searched.
        category: Category,
    },

    /// The lookup itself failed at the transport level.
    #[error("symbol search network error: {0}")]
    Network(String),

    /// The search answered with something we could not read.
    #[error("invalid symbol search response: {0}")]
    InvalidResponse(String),
}

/// Port for symbol lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SymbolResolver: Send + Sync {
    /// Resolve a query to the first matching exchange and ticker.
    async fn resolve(&self, query: &str, category: Category)
    -> Result<ResolvedSymbol, ResolveError>;
}

/// In-memory resolver keyed by upper-cased query text.
#[derive(Debug, Default, Clone)]
pub struct StaticSymbolResolver {
    entries: HashMap<String, ResolvedSymbol>,
}

impl StaticSymbolResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a result for a query.
    #[must_use]
    pub fn with_entry(mut self, query: &str, resolved: ResolvedSymbol) -> Self {
        self.entries.insert(query.to_uppercase(), resolved);
        self
    }
}

#[async_trait]
impl SymbolResolver for StaticSymbolResolver {
    async fn resolve(
        &self,
        query: &str,
        category: Category,
    ) -> Result<ResolvedSymbol, ResolveError> {
        self.entries
            .get(&query.to_uppercase())
            .cloned()
            .ok_or_else(|| ResolveError::NotFound {
                query: query.to_string(),
                category,
            })
    }
}
