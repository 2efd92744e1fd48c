//! # FleetOps Redis Connection Provider
//!
//! Shared Redis connection plumbing for FleetOps services.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     FleetOps Services                        │
//! │             (API handlers, workers, schedulers)              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ get_client()
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ConnectionProvider                        │
//! │        (lazy construction, single memoized handle)           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ConnectionHandle                         │
//! │       (reconnect policy + lifecycle notifications)           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                         Redis server
//! ```
//!
//! One [`ConnectionProvider`] is constructed by the host's composition root
//! and shared by reference with every consumer. The connection is established
//! eagerly on the first [`get_client`](ConnectionProvider::get_client) call,
//! re-used for the life of the process, and released exactly once when the
//! host invokes [`shutdown`](ConnectionProvider::shutdown) during graceful
//! teardown.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod policy;
pub mod provider;

// Re-export commonly used types
pub use client::ConnectionHandle;
pub use config::ConnectionSettings;
pub use error::{ClientError, Result};
pub use events::{ConnectionEvent, ConnectionObserver, TracingObserver};
pub use policy::ReconnectPolicy;
pub use provider::{ConnectionFactory, ConnectionProvider, RedisFactory, RedisProvider};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
