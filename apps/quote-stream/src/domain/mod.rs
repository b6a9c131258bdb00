//! Domain Layer - Core quote types and business rules.
//!
//! This layer contains symbol identifiers, subscriptions and price events.
//! Nothing here talks to the network.

/// Symbols, categories, subscriptions and price events.
pub mod quote;
