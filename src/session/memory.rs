//! In-process coordination service.
//!
//! `MemoryService` keeps a namespace in memory and hands out
//! [`MemoryClient`] handles through [`MemoryConnector`]. It implements the
//! full client capability set, so the browser can run (and be tested)
//! without a server. Handles can be told to drop their transport to exercise
//! reconnect paths.

use crate::error::RemoteError;
use crate::namespace::path::{self, ROOT};
use crate::namespace::stat::{RawStat, Stat};
use crate::session::client::{
    ClientHandle, ClientState, Connector, CoordinationClient, StateObserver,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct StoredNode {
    data: Vec<u8>,
    czxid: i64,
    mzxid: i64,
    pzxid: i64,
    ctime: i64,
    mtime: i64,
    version: i32,
    cversion: i32,
    ephemeral_owner: i64,
}

struct ServiceState {
    nodes: BTreeMap<String, StoredNode>,
    zxid: i64,
    next_session: i64,
}

impl ServiceState {
    fn next_zxid(&mut self) -> i64 {
        self.zxid += 1;
        self.zxid
    }

    fn child_names(&self, parent: &str) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|k| k.as_str() != ROOT && path::parent(k) == parent)
            .map(|k| path::title(k).to_string())
            .collect()
    }

    fn stat(&self, key: &str) -> Option<Stat> {
        let node = self.nodes.get(key)?;
        Some(Stat {
            czxid: node.czxid,
            mzxid: node.mzxid,
            created_at_millis: node.ctime,
            modified_at_millis: node.mtime,
            version: node.version,
            child_version: node.cversion,
            acl_version: 0,
            ephemeral_owner_id: node.ephemeral_owner,
            data_length: node.data.len() as i32,
            num_children: self.child_names(key).len() as i32,
            pzxid: node.pzxid,
        })
    }

    fn insert(&mut self, key: &str, data: &[u8], ephemeral_owner: i64) -> Result<(), RemoteError> {
        if self.nodes.contains_key(key) {
            return Err(RemoteError::NodeExists(key.to_string()));
        }
        let parent_key = path::parent(key);
        if !self.nodes.contains_key(&parent_key) {
            return Err(RemoteError::NoNode(parent_key));
        }

        let zxid = self.next_zxid();
        let now = Utc::now().timestamp_millis();
        self.nodes.insert(
            key.to_string(),
            StoredNode {
                data: data.to_vec(),
                czxid: zxid,
                mzxid: zxid,
                pzxid: zxid,
                ctime: now,
                mtime: now,
                version: 0,
                cversion: 0,
                ephemeral_owner,
            },
        );
        self.touch_children(&parent_key, zxid);
        Ok(())
    }

    fn touch_children(&mut self, key: &str, zxid: i64) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.cversion += 1;
            node.pzxid = zxid;
        }
    }
}

/// A namespace held entirely in memory.
#[derive(Clone)]
pub struct MemoryService {
    state: Arc<Mutex<ServiceState>>,
}

impl MemoryService {
    /// An empty namespace holding only the root.
    pub fn new() -> Self {
        let now = Utc::now().timestamp_millis();
        let mut nodes = BTreeMap::new();
        nodes.insert(
            ROOT.to_string(),
            StoredNode {
                data: Vec::new(),
                czxid: 0,
                mzxid: 0,
                pzxid: 0,
                ctime: now,
                mtime: now,
                version: 0,
                cversion: 0,
                ephemeral_owner: 0,
            },
        );
        Self {
            state: Arc::new(Mutex::new(ServiceState {
                nodes,
                zxid: 0,
                next_session: 0x1000,
            })),
        }
    }

    /// Create `path` with `data`, creating missing ancestors empty.
    ///
    /// Existing nodes along the way are left alone; an existing target gets
    /// its data replaced.
    pub fn put(&self, raw_path: &str, data: &str) {
        let key = path::normalize(raw_path);
        let mut state = lock(&self.state);
        let mut current = String::new();
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            current = format!("{current}/{segment}");
            if !state.nodes.contains_key(&current) {
                if let Err(e) = state.insert(&current, b"", 0) {
                    tracing::warn!("Failed to create {} while seeding: {}", current, e);
                }
            }
        }
        let zxid = state.next_zxid();
        if let Some(node) = state.nodes.get_mut(&key) {
            node.data = data.as_bytes().to_vec();
            node.mzxid = zxid;
        }
    }

    /// Create an ephemeral node owned by `session_id`.
    pub fn put_ephemeral(&self, raw_path: &str, data: &str, session_id: i64) -> Result<(), RemoteError> {
        let key = path::normalize(raw_path);
        lock(&self.state).insert(&key, data.as_bytes(), session_id)
    }

    /// Whether a node exists at `raw_path`.
    pub fn contains(&self, raw_path: &str) -> bool {
        lock(&self.state).nodes.contains_key(&path::normalize(raw_path))
    }

    /// Stored payload of a node, as text.
    pub fn data(&self, raw_path: &str) -> Option<String> {
        lock(&self.state)
            .nodes
            .get(&path::normalize(raw_path))
            .map(|n| String::from_utf8_lossy(&n.data).into_owned())
    }

    /// Number of nodes, root included.
    pub fn node_count(&self) -> usize {
        lock(&self.state).nodes.len()
    }

    fn open_session(&self) -> i64 {
        let mut state = lock(&self.state);
        state.next_session += 1;
        state.next_session
    }
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

/// A client handle onto a [`MemoryService`].
pub struct MemoryClient {
    service: MemoryService,
    host: String,
    session_id: i64,
    state: Mutex<ClientState>,
    observers: Mutex<Vec<StateObserver>>,
}

impl MemoryClient {
    fn new(service: MemoryService, host: &str) -> Self {
        let session_id = service.open_session();
        Self {
            service,
            host: host.to_string(),
            session_id,
            state: Mutex::new(ClientState::Connected),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Host this handle was opened for.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Session id, used as the owner of ephemeral nodes.
    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    /// Drop the transport as if the server went away.
    pub fn simulate_disconnect(&self) {
        self.transition(ClientState::Disconnected);
    }

    fn transition(&self, next: ClientState) {
        {
            let mut state = lock(&self.state);
            if *state == next {
                return;
            }
            *state = next;
        }
        for observer in lock(&self.observers).iter() {
            observer(next);
        }
    }

    fn ensure_connected(&self) -> Result<(), RemoteError> {
        match *lock(&self.state) {
            ClientState::Connected => Ok(()),
            _ => Err(RemoteError::ConnectionLoss),
        }
    }

    fn existing(&self, raw_path: &str) -> Result<String, RemoteError> {
        self.ensure_connected()?;
        let key = path::normalize(raw_path);
        if lock(&self.service.state).nodes.contains_key(&key) {
            Ok(key)
        } else {
            Err(RemoteError::NoNode(key))
        }
    }
}

#[async_trait]
impl CoordinationClient for MemoryClient {
    async fn get_children(&self, path: &str) -> Result<Vec<String>, RemoteError> {
        let key = self.existing(path)?;
        Ok(lock(&self.service.state).child_names(&key))
    }

    async fn exists(&self, path: &str) -> Result<Option<RawStat>, RemoteError> {
        self.ensure_connected()?;
        let key = path::normalize(path);
        Ok(lock(&self.service.state).stat(&key).map(|s| s.encode()))
    }

    async fn get_data(&self, path: &str) -> Result<(Vec<u8>, Option<RawStat>), RemoteError> {
        let key = self.existing(path)?;
        let state = lock(&self.service.state);
        let data = state
            .nodes
            .get(&key)
            .map(|n| n.data.clone())
            .unwrap_or_default();
        Ok((data, state.stat(&key).map(|s| s.encode())))
    }

    async fn set_data(&self, path: &str, data: &[u8]) -> Result<(), RemoteError> {
        let key = self.existing(path)?;
        let mut state = lock(&self.service.state);
        let zxid = state.next_zxid();
        if let Some(node) = state.nodes.get_mut(&key) {
            node.data = data.to_vec();
            node.version += 1;
            node.mzxid = zxid;
            node.mtime = Utc::now().timestamp_millis();
        }
        Ok(())
    }

    async fn create(&self, path: &str, data: &[u8]) -> Result<String, RemoteError> {
        self.ensure_connected()?;
        let key = path::normalize(path);
        if key == ROOT {
            return Err(RemoteError::NodeExists(key));
        }
        lock(&self.service.state).insert(&key, data, 0)?;
        Ok(key)
    }

    async fn remove(&self, path: &str) -> Result<(), RemoteError> {
        let key = self.existing(path)?;
        let mut state = lock(&self.service.state);
        if !state.child_names(&key).is_empty() {
            return Err(RemoteError::NotEmpty(key));
        }
        state.nodes.remove(&key);
        let zxid = state.next_zxid();
        state.touch_children(&path::parent(&key), zxid);
        Ok(())
    }

    async fn remove_recursive(&self, path: &str) -> Result<(), RemoteError> {
        let key = self.existing(path)?;
        let mut state = lock(&self.service.state);
        if key == ROOT {
            let doomed: Vec<String> = state.nodes.keys().filter(|k| *k != ROOT).cloned().collect();
            for k in doomed {
                state.nodes.remove(&k);
            }
        } else {
            state.nodes.retain(|k, _| !path::is_within(k, &key));
        }
        let zxid = state.next_zxid();
        state.touch_children(&path::parent(&key), zxid);
        Ok(())
    }

    fn state(&self) -> ClientState {
        *lock(&self.state)
    }

    async fn close(&self) -> Result<(), RemoteError> {
        let session_id = self.session_id;
        lock(&self.service.state)
            .nodes
            .retain(|_, n| n.ephemeral_owner != session_id);
        self.transition(ClientState::Closed);
        Ok(())
    }

    fn on_state_change(&self, observer: StateObserver) {
        lock(&self.observers).push(observer);
    }
}

/// Hands out [`MemoryClient`] handles and records them.
pub struct MemoryConnector {
    service: MemoryService,
    refused: Mutex<HashSet<String>>,
    issued: Mutex<Vec<Arc<MemoryClient>>>,
    attempts: AtomicUsize,
    connect_delay: Option<Duration>,
}

impl MemoryConnector {
    /// A connector over `service` that accepts every host immediately.
    pub fn new(service: MemoryService) -> Self {
        Self {
            service,
            refused: Mutex::new(HashSet::new()),
            issued: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            connect_delay: None,
        }
    }

    /// Delay every connect by `delay` before it resolves.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Make connects to `host` fail until [`MemoryConnector::accept`] is called.
    pub fn refuse(&self, host: &str) {
        lock(&self.refused).insert(host.to_string());
    }

    /// Let connects to `host` succeed again.
    pub fn accept(&self, host: &str) {
        lock(&self.refused).remove(host);
    }

    /// Number of connect attempts seen, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The `index`-th handle handed out.
    pub fn client(&self, index: usize) -> Option<Arc<MemoryClient>> {
        lock(&self.issued).get(index).cloned()
    }

    /// The most recent handle handed out.
    pub fn last_client(&self) -> Option<Arc<MemoryClient>> {
        lock(&self.issued).last().cloned()
    }

    /// The shared namespace behind every handle.
    pub fn service(&self) -> &MemoryService {
        &self.service
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, host: &str) -> Result<ClientHandle, RemoteError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if lock(&self.refused).contains(host) {
            return Err(RemoteError::Other(format!("connection refused by {host}")));
        }

        let client = Arc::new(MemoryClient::new(self.service.clone(), host));
        lock(&self.issued).push(Arc::clone(&client));
        tracing::debug!("memory service accepted session {:#x} for {}", client.session_id, host);
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_list_children() {
        let service = MemoryService::new();
        let connector = MemoryConnector::new(service.clone());
        let client = connector.connect("local").await.unwrap();

        client.create("/a", b"").await.unwrap();
        client.create("/a/b", b"x").await.unwrap();

        assert_eq!(client.get_children("/").await.unwrap(), vec!["a"]);
        let stat = Stat::decode(client.exists("/a").await.unwrap().as_ref()).unwrap();
        assert_eq!(stat.num_children, 1);
        assert_eq!(stat.child_version, 1);
    }

    #[tokio::test]
    async fn test_create_requires_parent_and_uniqueness() {
        let service = MemoryService::new();
        let client = MemoryConnector::new(service).connect("local").await.unwrap();

        assert_eq!(
            client.create("/missing/child", b"").await,
            Err(RemoteError::NoNode("/missing".to_string()))
        );
        client.create("/a", b"").await.unwrap();
        assert_eq!(
            client.create("/a", b"").await,
            Err(RemoteError::NodeExists("/a".to_string()))
        );
    }

    #[test]
    fn test_put_creates_missing_ancestors() {
        let service = MemoryService::new();
        service.put("/app", "keep");

        service.put("/app/config/db", "url");

        assert_eq!(service.node_count(), 4);
        assert_eq!(service.data("/app").as_deref(), Some("keep"));
        assert_eq!(service.data("/app/config").as_deref(), Some(""));
        assert_eq!(service.data("/app/config/db").as_deref(), Some("url"));

        service.put("/app/config/db", "other");
        assert_eq!(service.node_count(), 4);
        assert_eq!(service.data("/app/config/db").as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn test_remove_refuses_non_empty() {
        let service = MemoryService::new();
        service.put("/a/b/c", "leaf");
        let client = MemoryConnector::new(service.clone()).connect("local").await.unwrap();

        assert_eq!(
            client.remove("/a").await,
            Err(RemoteError::NotEmpty("/a".to_string()))
        );
        client.remove_recursive("/a").await.unwrap();
        assert!(!service.contains("/a/b/c"));
        assert_eq!(service.node_count(), 1);
    }

    #[tokio::test]
    async fn test_set_data_bumps_version() {
        let service = MemoryService::new();
        service.put("/cfg", "v1");
        let client = MemoryConnector::new(service.clone()).connect("local").await.unwrap();

        client.set_data("/cfg", b"v2").await.unwrap();

        let (data, raw) = client.get_data("/cfg").await.unwrap();
        let stat = Stat::decode(raw.as_ref()).unwrap();
        assert_eq!(data, b"v2");
        assert_eq!(stat.version, 1);
        assert_eq!(stat.data_length, 2);
    }

    #[tokio::test]
    async fn test_disconnected_client_fails_calls_and_notifies() {
        let service = MemoryService::new();
        let connector = MemoryConnector::new(service);
        connector.connect("local").await.unwrap();
        let client = connector.last_client().unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.on_state_change(Box::new(move |state| lock(&sink).push(state)));

        client.simulate_disconnect();

        assert_eq!(client.get_children("/").await, Err(RemoteError::ConnectionLoss));
        assert_eq!(*lock(&seen), vec![ClientState::Disconnected]);
    }

    #[tokio::test]
    async fn test_close_drops_ephemeral_nodes() {
        let service = MemoryService::new();
        let connector = MemoryConnector::new(service.clone());
        let client = connector.connect("local").await.unwrap();
        let session = connector.last_client().unwrap().session_id();
        service.put_ephemeral("/lock", "", session).unwrap();

        let stat = Stat::decode(client.exists("/lock").await.unwrap().as_ref()).unwrap();
        assert!(stat.is_ephemeral());

        client.close().await.unwrap();
        assert!(!service.contains("/lock"));
    }

    #[tokio::test]
    async fn test_refused_host() {
        let connector = MemoryConnector::new(MemoryService::new());
        connector.refuse("bad:2181");
        assert!(connector.connect("bad:2181").await.is_err());
        assert_eq!(connector.attempts(), 1);
        assert!(connector.last_client().is_none());
    }
}
