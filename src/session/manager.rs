//! Owner of the single live client handle.
//!
//! `SessionManager` keeps at most one open handle. Replacing the handle
//! always closes the previous one first. Every handle gets an observer at
//! creation time that forwards transport drops into a queue tagged with the
//! handle's generation; the queue is drained before any read of the handle,
//! and events from superseded generations are discarded.

use crate::error::{BrowserError, Result};
use crate::session::client::{ClientHandle, ClientState, Connector};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Default upper bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of the session as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No host has ever been requested.
    Unbound,
    /// A connect attempt is in flight.
    Connecting,
    /// A live handle is installed.
    Connected,
    /// A host is remembered but no handle is open.
    Disconnected,
}

impl SessionState {
    /// Upper-case label shown in status bars, e.g. `CONNECTED`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unbound => "UNBOUND",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// State change forwarded from a handle's observer.
#[derive(Debug, Clone, Copy)]
struct SessionEvent {
    generation: u64,
    state: ClientState,
}

struct SessionInner {
    target_host: Option<String>,
    client: Option<ClientHandle>,
    state: SessionState,
    /// Bumped on every replace or close; identifies the current handle.
    generation: u64,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionInner {
    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
        }
    }

    fn apply(&mut self, event: SessionEvent) {
        if event.state != ClientState::Disconnected {
            return;
        }
        if event.generation != self.generation {
            tracing::debug!(
                "Ignoring disconnect from superseded handle (generation {}, current {})",
                event.generation,
                self.generation
            );
            return;
        }
        if self.client.take().is_some() {
            self.state = SessionState::Disconnected;
            tracing::warn!(
                "Lost connection to {}",
                self.target_host.as_deref().unwrap_or("<unknown>")
            );
        }
    }
}

/// Manages the process-wide session with the coordination service.
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    inner: Mutex<SessionInner>,
    /// Serializes reconnects so one transport drop costs one attempt.
    reconnect: Mutex<()>,
}

impl SessionManager {
    /// Create an unbound manager using [`DEFAULT_CONNECT_TIMEOUT`].
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_timeout(connector, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create an unbound manager.
    ///
    /// # Arguments
    /// * `connector` - Opens new handles to the service
    /// * `connect_timeout` - Upper bound on a single connect attempt
    pub fn with_timeout(connector: Arc<dyn Connector>, connect_timeout: Duration) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        Self {
            connector,
            connect_timeout,
            events_tx,
            inner: Mutex::new(SessionInner {
                target_host: None,
                client: None,
                state: SessionState::Unbound,
                generation: 0,
                events,
            }),
            reconnect: Mutex::new(()),
        }
    }

    /// Replace the current handle with a fresh connection to `host`.
    ///
    /// Resolves once the new handle is connected. On failure no handle is
    /// left open, but `host` stays remembered.
    pub async fn new_client(&self, host: &str) -> Result<()> {
        let generation = {
            let mut inner = self.inner.lock().await;
            inner.drain_events();
            inner.generation += 1;
            inner.target_host = Some(host.to_string());
            inner.state = SessionState::Connecting;
            if let Some(old) = inner.client.take() {
                if let Err(e) = old.close().await {
                    tracing::debug!("Ignoring error while closing replaced handle: {}", e);
                }
            }
            inner.generation
        };

        tracing::info!("Connecting to {}", host);
        let client = match tokio::time::timeout(self.connect_timeout, self.connector.connect(host))
            .await
        {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => return Err(self.connect_failed(generation, host, e.to_string()).await),
            Err(_) => {
                let reason = format!("timed out after {:?}", self.connect_timeout);
                return Err(self.connect_failed(generation, host, reason).await);
            }
        };

        let events_tx = self.events_tx.clone();
        client.on_state_change(Box::new(move |state| {
            if state == ClientState::Disconnected {
                let _ = events_tx.send(SessionEvent { generation, state });
            }
        }));

        let mut inner = self.inner.lock().await;
        inner.drain_events();

        if inner.generation != generation {
            drop(inner);
            tracing::debug!("Connection to {} superseded before it completed", host);
            let _ = client.close().await;
            return Err(BrowserError::Connection {
                host: host.to_string(),
                reason: "superseded by a newer connection request".to_string(),
            });
        }

        if client.state() != ClientState::Connected {
            inner.state = SessionState::Disconnected;
            drop(inner);
            let _ = client.close().await;
            return Err(BrowserError::Connection {
                host: host.to_string(),
                reason: "connection dropped during handshake".to_string(),
            });
        }

        inner.client = Some(client);
        inner.state = SessionState::Connected;
        tracing::info!("Connected to {}", host);
        Ok(())
    }

    async fn connect_failed(&self, generation: u64, host: &str, reason: String) -> BrowserError {
        let mut inner = self.inner.lock().await;
        if inner.generation == generation {
            inner.client = None;
            inner.state = SessionState::Disconnected;
        }
        tracing::warn!("Failed to connect to {}: {}", host, reason);
        BrowserError::Connection {
            host: host.to_string(),
            reason,
        }
    }

    /// The live handle, reconnecting once to the remembered host if needed.
    ///
    /// Returns `None` when no host was ever requested. Concurrent callers
    /// that find the handle missing share a single reconnect.
    pub async fn get_client(&self) -> Result<Option<ClientHandle>> {
        if let Some(found) = self.current_client().await {
            return Ok(found);
        }

        let _reconnecting = self.reconnect.lock().await;
        // Another caller may have reconnected while we waited.
        let host = match self.current_client().await {
            Some(found) => return Ok(found),
            None => match self.inner.lock().await.target_host.clone() {
                Some(host) => host,
                None => return Ok(None),
            },
        };

        tracing::info!("No live handle, reconnecting to {}", host);
        self.new_client(&host).await?;

        let mut inner = self.inner.lock().await;
        inner.drain_events();
        match &inner.client {
            Some(client) => Ok(Some(Arc::clone(client))),
            None => Err(BrowserError::Connection {
                host,
                reason: "connection lost right after reconnecting".to_string(),
            }),
        }
    }

    /// `Some(Some(handle))` when live, `Some(None)` when unbound, `None`
    /// when a host is remembered but no handle is open.
    async fn current_client(&self) -> Option<Option<ClientHandle>> {
        let mut inner = self.inner.lock().await;
        inner.drain_events();
        match (&inner.target_host, &inner.client) {
            (None, _) => Some(None),
            (Some(_), Some(client)) => Some(Some(Arc::clone(client))),
            (Some(_), None) => None,
        }
    }

    /// Like [`SessionManager::get_client`], but a missing host is an error.
    pub async fn require_client(&self) -> Result<ClientHandle> {
        self.get_client().await?.ok_or(BrowserError::NotConnected)
    }

    /// Close the current handle, keeping the host for a later reconnect.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.drain_events();
        inner.generation += 1;
        if let Some(client) = inner.client.take() {
            if let Err(e) = client.close().await {
                tracing::warn!("Error while closing session: {}", e);
            }
        }
        inner.state = if inner.target_host.is_some() {
            SessionState::Disconnected
        } else {
            SessionState::Unbound
        };
    }

    /// Current session state, after applying pending transport events.
    pub async fn state(&self) -> SessionState {
        let mut inner = self.inner.lock().await;
        inner.drain_events();
        inner.state
    }

    /// The most recently requested host, if any.
    pub async fn target_host(&self) -> Option<String> {
        self.inner.lock().await.target_host.clone()
    }

    /// Whether a handle is currently held, without reconnecting.
    pub async fn has_client(&self) -> bool {
        let mut inner = self.inner.lock().await;
        inner.drain_events();
        inner.client.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::memory::{MemoryConnector, MemoryService};
    use crate::session::client::CoordinationClient;

    fn manager() -> (Arc<MemoryConnector>, SessionManager) {
        let connector = Arc::new(MemoryConnector::new(MemoryService::new()));
        let manager = SessionManager::new(connector.clone());
        (connector, manager)
    }

    #[tokio::test]
    async fn test_get_client_without_host_does_not_connect() {
        let (connector, manager) = manager();

        assert!(manager.get_client().await.unwrap().is_none());
        assert_eq!(connector.attempts(), 0);
        assert_eq!(manager.state().await, SessionState::Unbound);
        assert!(matches!(
            manager.require_client().await,
            Err(BrowserError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_new_client_replaces_and_closes_previous() {
        let (connector, manager) = manager();

        manager.new_client("127.0.0.1:2181").await.unwrap();
        manager.new_client("127.0.0.1:2181").await.unwrap();

        assert_eq!(connector.attempts(), 2);
        assert_eq!(connector.client(0).unwrap().state(), ClientState::Closed);
        assert_eq!(connector.client(1).unwrap().state(), ClientState::Connected);
        assert_eq!(manager.state().await, SessionState::Connected);
    }

    #[tokio::test]
    async fn test_get_client_reuses_live_handle() {
        let (connector, manager) = manager();
        manager.new_client("host-a").await.unwrap();

        manager.get_client().await.unwrap().unwrap();
        manager.get_client().await.unwrap().unwrap();

        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_triggers_single_reconnect() {
        let (connector, manager) = manager();
        manager.new_client("host-a").await.unwrap();

        connector.client(0).unwrap().simulate_disconnect();
        assert_eq!(manager.state().await, SessionState::Disconnected);
        assert!(!manager.has_client().await);

        let client = manager.get_client().await.unwrap().unwrap();
        assert_eq!(client.state(), ClientState::Connected);
        assert_eq!(connector.attempts(), 2);
        assert_eq!(connector.client(1).unwrap().host(), "host-a");
    }

    #[tokio::test]
    async fn test_reconnect_failure_propagates() {
        let (connector, manager) = manager();
        manager.new_client("host-a").await.unwrap();
        connector.client(0).unwrap().simulate_disconnect();
        connector.refuse("host-a");

        let err = manager.get_client().await.err().unwrap();
        assert!(err.is_connection());
        assert_eq!(connector.attempts(), 2);

        // The next call tries again rather than looping inside one call.
        assert!(manager.get_client().await.is_err());
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test]
    async fn test_stale_disconnect_is_ignored() {
        let (connector, manager) = manager();
        manager.new_client("host-a").await.unwrap();
        manager.new_client("host-b").await.unwrap();

        // The first handle reports a drop after it was replaced.
        connector.client(0).unwrap().simulate_disconnect();

        assert!(manager.has_client().await);
        assert_eq!(manager.state().await, SessionState::Connected);
        manager.get_client().await.unwrap().unwrap();
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_no_handle() {
        let (connector, manager) = manager();
        manager.new_client("good").await.unwrap();
        connector.refuse("bad");

        let err = manager.new_client("bad").await.unwrap_err();

        assert!(matches!(err, BrowserError::Connection { ref host, .. } if host == "bad"));
        assert!(!manager.has_client().await);
        assert_eq!(manager.target_host().await.as_deref(), Some("bad"));
        assert_eq!(connector.client(0).unwrap().state(), ClientState::Closed);
    }

    #[tokio::test]
    async fn test_close_keeps_host() {
        let (connector, manager) = manager();
        manager.new_client("host-a").await.unwrap();

        manager.close().await;

        assert_eq!(manager.state().await, SessionState::Disconnected);
        assert_eq!(manager.target_host().await.as_deref(), Some("host-a"));
        assert_eq!(connector.client(0).unwrap().state(), ClientState::Closed);

        manager.get_client().await.unwrap().unwrap();
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let connector = Arc::new(
            MemoryConnector::new(MemoryService::new())
                .with_connect_delay(Duration::from_millis(200)),
        );
        let manager = SessionManager::with_timeout(connector.clone(), Duration::from_millis(20));

        let err = manager.new_client("slow").await.unwrap_err();

        assert!(err.to_string().contains("timed out"));
        assert!(!manager.has_client().await);
    }

    #[tokio::test]
    async fn test_concurrent_get_client_shares_one_reconnect() {
        let connector = Arc::new(
            MemoryConnector::new(MemoryService::new())
                .with_connect_delay(Duration::from_millis(20)),
        );
        let manager = SessionManager::new(connector.clone());
        manager.new_client("h:1").await.unwrap();
        connector.client(0).unwrap().simulate_disconnect();

        let (a, b) = tokio::join!(manager.get_client(), manager.get_client());

        let a = a.unwrap().unwrap();
        let b = b.unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.state(), ClientState::Connected);
        assert_eq!(connector.attempts(), 2);
        assert_eq!(manager.state().await, SessionState::Connected);
    }

    #[tokio::test]
    async fn test_superseded_connect_does_not_install() {
        let connector = Arc::new(
            MemoryConnector::new(MemoryService::new())
                .with_connect_delay(Duration::from_millis(30)),
        );
        let manager = Arc::new(SessionManager::new(connector.clone()));

        let slow = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.new_client("first").await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        manager.new_client("second").await.unwrap();

        let first = slow.await.unwrap();
        assert!(first.is_err());
        assert_eq!(manager.target_host().await.as_deref(), Some("second"));
        assert!(manager.has_client().await);
    }
}
