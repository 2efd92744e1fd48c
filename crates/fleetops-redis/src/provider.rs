//! # Connection Provider
//!
//! Owns the process-wide Redis connection handle: constructs it lazily on
//! first use, hands the same handle to every caller, and releases it once on
//! shutdown.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::client::ConnectionHandle;
use crate::config::ConnectionSettings;
use crate::error::Result;
use crate::events::{ConnectionEvent, ConnectionObserver, TracingObserver};
use crate::policy::ReconnectPolicy;

/// Builds connection handles for the provider.
///
/// The seam exists so tests can substitute an in-memory factory; production
/// code goes through [`RedisFactory`].
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    type Handle: Clone + Send + Sync + 'static;

    /// Establish a new connection eagerly.
    async fn connect(
        &self,
        settings: &ConnectionSettings,
        policy: &ReconnectPolicy,
        observers: &[Arc<dyn ConnectionObserver>],
    ) -> Result<Self::Handle>;
}

/// Factory producing live Redis connections.
#[derive(Debug, Default)]
pub struct RedisFactory;

#[async_trait]
impl ConnectionFactory for RedisFactory {
    type Handle = ConnectionHandle;

    async fn connect(
        &self,
        settings: &ConnectionSettings,
        policy: &ReconnectPolicy,
        observers: &[Arc<dyn ConnectionObserver>],
    ) -> Result<ConnectionHandle> {
        ConnectionHandle::connect(settings.clone(), policy.clone(), observers.to_vec()).await
    }
}

/// Provider for the process-wide Redis connection.
///
/// Constructed once by the composition root and shared by reference with
/// every consumer; consumers must not build their own connections. The
/// handle slot is guarded by an async lock, so at most one connection is
/// ever constructed even under concurrent first access.
pub struct ConnectionProvider<F: ConnectionFactory> {
    factory: F,
    settings: ConnectionSettings,
    policy: ReconnectPolicy,
    observers: Vec<Arc<dyn ConnectionObserver>>,
    handle: Mutex<Option<F::Handle>>,
}

/// Provider wired to real Redis connections.
pub type RedisProvider = ConnectionProvider<RedisFactory>;

impl RedisProvider {
    /// Provider reading its settings from the environment.
    pub fn from_env() -> Self {
        Self::new(RedisFactory, ConnectionSettings::from_env())
    }
}

impl<F: ConnectionFactory> ConnectionProvider<F> {
    /// Create a provider. The connection itself is not established until
    /// [`get_client`](Self::get_client) is first called.
    pub fn new(factory: F, settings: ConnectionSettings) -> Self {
        Self {
            factory,
            settings,
            policy: ReconnectPolicy::default(),
            observers: vec![Arc::new(TracingObserver)],
            handle: Mutex::new(None),
        }
    }

    /// Override the reconnect policy.
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register an additional lifecycle observer.
    pub fn with_observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// The shared connection handle, constructed on first use.
    ///
    /// Fails with a configuration error, constructing nothing, when no
    /// connection URL is set. Every call observes the same handle until
    /// [`shutdown`](Self::shutdown) clears it.
    pub async fn get_client(&self) -> Result<F::Handle> {
        let mut slot = self.handle.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        self.settings.require_url()?;
        let handle = self
            .factory
            .connect(&self.settings, &self.policy, &self.observers)
            .await?;
        *slot = Some(handle.clone());

        Ok(handle)
    }

    /// Release the connection if one exists.
    ///
    /// Idempotent; calling without a live connection is a no-op. In-flight
    /// commands hold their own clones of the underlying connection and run
    /// to completion; the connection terminates once the last clone drops.
    /// A later [`get_client`](Self::get_client) constructs a fresh handle.
    pub async fn shutdown(&self) {
        let mut slot = self.handle.lock().await;
        if slot.take().is_some() {
            self.notify(&ConnectionEvent::Closed);
        }
    }

    fn notify(&self, event: &ConnectionEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use std::sync::Mutex as StdMutex;
    use tokio_test::assert_ok;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct StubHandle {
        id: u32,
    }

    #[derive(Default)]
    struct StubFactory {
        connects: AtomicU32,
    }

    #[async_trait]
    impl ConnectionFactory for StubFactory {
        type Handle = StubHandle;

        async fn connect(
            &self,
            _settings: &ConnectionSettings,
            _policy: &ReconnectPolicy,
            observers: &[Arc<dyn ConnectionObserver>],
        ) -> Result<StubHandle> {
            let id = self.connects.fetch_add(1, Ordering::SeqCst);
            for observer in observers {
                observer.on_event(&ConnectionEvent::Connected);
                observer.on_event(&ConnectionEvent::Ready);
            }
            Ok(StubHandle { id })
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: StdMutex<Vec<ConnectionEvent>>,
    }

    impl ConnectionObserver for RecordingObserver {
        fn on_event(&self, event: &ConnectionEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn provider() -> ConnectionProvider<StubFactory> {
        ConnectionProvider::new(
            StubFactory::default(),
            ConnectionSettings::with_url("redis://127.0.0.1:6379"),
        )
    }

    #[tokio::test]
    async fn returns_the_same_handle_across_calls() {
        let provider = provider();

        let first = assert_ok!(provider.get_client().await);
        let second = assert_ok!(provider.get_client().await);

        assert_eq!(first, second);
        assert_eq!(provider.factory.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_url_is_a_configuration_error() {
        let provider =
            ConnectionProvider::new(StubFactory::default(), ConnectionSettings::default());

        let err = provider.get_client().await.unwrap_err();

        assert!(matches!(err, ClientError::Configuration(_)));
        assert_eq!(provider.factory.connects.load(Ordering::SeqCst), 0); // No handle constructed
    }

    #[tokio::test]
    async fn blank_url_is_a_configuration_error() {
        let provider =
            ConnectionProvider::new(StubFactory::default(), ConnectionSettings::with_url("  "));

        let err = provider.get_client().await.unwrap_err();

        assert!(matches!(err, ClientError::Configuration(_)));
        assert_eq!(provider.factory.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shutdown_clears_the_cached_handle() {
        let provider = provider();

        let first = provider.get_client().await.unwrap();
        provider.shutdown().await;
        let second = provider.get_client().await.unwrap();

        assert_ne!(first, second); // Fresh handle after shutdown
        assert_eq!(provider.factory.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_without_a_handle_is_a_noop() {
        let provider = provider();

        provider.shutdown().await;
        provider.shutdown().await;

        assert_eq!(provider.factory.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_first_calls_construct_one_handle() {
        let provider = Arc::new(provider());

        let a = Arc::clone(&provider);
        let b = Arc::clone(&provider);
        let (first, second) = tokio::join!(
            tokio::spawn(async move { a.get_client().await }),
            tokio::spawn(async move { b.get_client().await }),
        );

        let first = first.unwrap().unwrap();
        let second = second.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.factory.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lifecycle_events_reach_registered_observers() {
        let observer = Arc::new(RecordingObserver::default());
        let provider =
            provider().with_observer(Arc::clone(&observer) as Arc<dyn ConnectionObserver>);

        provider.get_client().await.unwrap();
        provider.shutdown().await;
        provider.shutdown().await; // Must not emit a second close

        let events = observer.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                ConnectionEvent::Connected,
                ConnectionEvent::Ready,
                ConnectionEvent::Closed,
            ]
        );
    }
}
