//! Rusty Relay - A connection-bounded TCP message relay implemented in Rust
//!
//! This library provides the core functionality for a relay server:
//! bounded client admission, per-client rate limiting, broadcast to
//! every other client, and cooperative operator-driven shutdown.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;

// Re-export main components
pub use config::*;
pub use constants::*;
