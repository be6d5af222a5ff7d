//! Legator daemon library.
//!
//! Hosts everything the binary wires together: configuration loading, the
//! periodic monitor loop, the HTTP API, and the built-in sweep / payout /
//! notification providers. Kept as a library so integration tests can drive
//! the same components the binary runs.

pub mod config;
pub mod http;
pub mod monitor;
pub mod providers;
