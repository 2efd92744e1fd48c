//! # Connection Lifecycle Events
//!
//! State-change notifications for the shared Redis connection. The handle
//! reports every transition through [`ConnectionObserver`]; the default
//! [`TracingObserver`] forwards each event to the tracing subscriber at the
//! severity matching the transition.

use tracing::Level;

/// Lifecycle transitions of the shared Redis connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The client reported a connection-level error
    Error { message: String },
    /// The underlying connection was established
    Connected,
    /// The ready check passed, the connection accepts commands
    Ready,
    /// The connection is being replaced after a loss or failover
    Reconnecting,
    /// The connection was released for good
    Closed,
}

impl ConnectionEvent {
    /// Log severity for this transition.
    pub fn level(&self) -> Level {
        match self {
            Self::Error { .. } => Level::ERROR,
            Self::Connected | Self::Ready => Level::INFO,
            Self::Reconnecting | Self::Closed => Level::WARN,
        }
    }
}

/// Observer notified on every lifecycle transition.
pub trait ConnectionObserver: Send + Sync {
    fn on_event(&self, event: &ConnectionEvent);
}

/// Observer forwarding lifecycle events to the tracing subscriber.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl ConnectionObserver for TracingObserver {
    fn on_event(&self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Error { message } => {
                tracing::error!(%message, "Redis client error");
            }
            ConnectionEvent::Connected => tracing::info!("Redis client connected"),
            ConnectionEvent::Ready => tracing::info!("Redis client ready"),
            ConnectionEvent::Reconnecting => tracing::warn!("Redis client reconnecting"),
            ConnectionEvent::Closed => tracing::warn!("Redis client connection closed"),
        }
    }
}
