//! # Redis Connection Handle
//!
//! Wrapper around the multiplexed Redis connection with failover-aware
//! command execution and lifecycle notifications.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{Client, Cmd, FromRedisValue};
use tokio::sync::RwLock;

use crate::config::ConnectionSettings;
use crate::error::Result;
use crate::events::{ConnectionEvent, ConnectionObserver};
use crate::policy::ReconnectPolicy;

/// Live handle to the shared Redis connection.
///
/// Cheap to clone; every clone observes the same underlying multiplexed
/// connection. Releasing the last clone terminates the connection, so
/// in-flight commands holding their own clone always run to completion.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    client: Client,
    manager: RwLock<ConnectionManager>,
    settings: ConnectionSettings,
    policy: ReconnectPolicy,
    observers: Vec<Arc<dyn ConnectionObserver>>,
}

impl ConnectionHandle {
    /// Establish the connection eagerly and verify it is ready.
    pub(crate) async fn connect(
        settings: ConnectionSettings,
        policy: ReconnectPolicy,
        observers: Vec<Arc<dyn ConnectionObserver>>,
    ) -> Result<Self> {
        let url = settings.require_url()?;
        let client = Client::open(url)?;

        let manager = match Self::open_manager(&client, &settings, &policy).await {
            Ok(manager) => manager,
            Err(err) => {
                notify_all(
                    &observers,
                    &ConnectionEvent::Error {
                        message: err.to_string(),
                    },
                );
                return Err(err);
            }
        };

        let handle = Self {
            inner: Arc::new(HandleInner {
                client,
                manager: RwLock::new(manager),
                settings,
                policy,
                observers,
            }),
        };

        handle.notify(&ConnectionEvent::Connected);
        if let Err(err) = handle.ready_check().await {
            handle.notify(&ConnectionEvent::Error {
                message: err.to_string(),
            });
            return Err(err);
        }

        Ok(handle)
    }

    /// Run a command on the shared connection.
    ///
    /// A read-only-replica error forces a fresh connection and retries the
    /// command once against the promoted primary. Connection-level failures
    /// are reported to the lifecycle observers; every other error is surfaced
    /// to the caller untouched.
    pub async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T> {
        let mut conn = self.connection().await;
        match cmd.query_async(&mut conn).await {
            Ok(value) => Ok(value),
            Err(err) if self.inner.policy.should_reconnect(&err) => {
                self.reconnect().await?;
                let mut conn = self.connection().await;
                Ok(cmd.query_async(&mut conn).await?)
            }
            Err(err) => {
                if is_connection_error(&err) {
                    self.notify(&ConnectionEvent::Error {
                        message: err.to_string(),
                    });
                }
                Err(err.into())
            }
        }
    }

    /// Round-trip a `PING` to verify the connection is usable.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Raw connection manager for callers issuing commands directly.
    pub async fn manager(&self) -> ConnectionManager {
        self.connection().await
    }

    /// Whether two handles share the same underlying connection.
    pub fn same_connection(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    async fn connection(&self) -> ConnectionManager {
        self.inner.manager.read().await.clone()
    }

    /// Ready check: the connection is handed to callers only after the
    /// server answered a command.
    async fn ready_check(&self) -> Result<()> {
        self.ping().await?;
        self.notify(&ConnectionEvent::Ready);
        Ok(())
    }

    /// Replace the underlying connection, retrying until a new one is up.
    ///
    /// Attempts are spaced by the policy's retry delay and continue until
    /// success; only shutdown ends the caller's wait.
    async fn reconnect(&self) -> Result<()> {
        let mut guard = self.inner.manager.write().await;
        self.notify(&ConnectionEvent::Reconnecting);

        let mut attempt: u32 = 0;
        let manager = loop {
            attempt += 1;
            match Self::open_manager(&self.inner.client, &self.inner.settings, &self.inner.policy)
                .await
            {
                Ok(manager) => break manager,
                Err(err) => {
                    let delay = self.inner.policy.retry_delay(attempt);
                    tracing::warn!(
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Redis connection lost, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        *guard = manager;
        drop(guard);

        self.notify(&ConnectionEvent::Connected);
        self.ready_check().await
    }

    async fn open_manager(
        client: &Client,
        settings: &ConnectionSettings,
        policy: &ReconnectPolicy,
    ) -> Result<ConnectionManager> {
        let mut config = policy.manager_config();
        if let Some(timeout) = settings.connect_timeout {
            config = config.set_connection_timeout(timeout);
        }
        if let Some(timeout) = settings.response_timeout {
            config = config.set_response_timeout(timeout);
        }

        Ok(ConnectionManager::new_with_config(client.clone(), config).await?)
    }

    fn notify(&self, event: &ConnectionEvent) {
        notify_all(&self.inner.observers, event);
    }
}

fn notify_all(observers: &[Arc<dyn ConnectionObserver>], event: &ConnectionEvent) {
    for observer in observers {
        observer.on_event(event);
    }
}

fn is_connection_error(err: &redis::RedisError) -> bool {
    err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TracingObserver;

    // These tests require a running Redis instance.

    fn observers() -> Vec<Arc<dyn ConnectionObserver>> {
        vec![Arc::new(TracingObserver)]
    }

    #[tokio::test]
    #[ignore]
    async fn connects_and_answers_ping() {
        let settings = ConnectionSettings::with_url("redis://127.0.0.1:6379");
        let handle = ConnectionHandle::connect(settings, ReconnectPolicy::default(), observers())
            .await
            .unwrap();

        handle.ping().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn clones_share_the_connection() {
        let settings = ConnectionSettings::with_url("redis://127.0.0.1:6379");
        let handle = ConnectionHandle::connect(settings, ReconnectPolicy::default(), observers())
            .await
            .unwrap();

        let clone = handle.clone();
        assert!(handle.same_connection(&clone));
    }

    #[tokio::test]
    #[ignore]
    async fn commands_roundtrip() {
        let settings = ConnectionSettings::with_url("redis://127.0.0.1:6379");
        let handle = ConnectionHandle::connect(settings, ReconnectPolicy::default(), observers())
            .await
            .unwrap();

        let _: () = handle
            .query(redis::cmd("SET").arg("fleetops:test:key").arg("value"))
            .await
            .unwrap();
        let value: String = handle
            .query(redis::cmd("GET").arg("fleetops:test:key"))
            .await
            .unwrap();
        assert_eq!(value, "value");

        let _: () = handle
            .query(redis::cmd("DEL").arg("fleetops:test:key"))
            .await
            .unwrap();
    }
}
