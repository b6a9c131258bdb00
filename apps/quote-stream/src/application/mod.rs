//! Application Layer - Port definitions.
//!
//! This layer contains the port interfaces that define how the stream
//! client interacts with collaborators it does not own.

/// Port interfaces for external systems (symbol search).
pub mod ports;
