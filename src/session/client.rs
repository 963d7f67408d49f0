//! Capability boundary to the coordination service client library.
//!
//! The browser never speaks the wire protocol itself. It consumes a client
//! handle through [`CoordinationClient`] and obtains handles through a
//! [`Connector`].

use crate::error::RemoteError;
use crate::namespace::stat::RawStat;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Connection state reported by a client handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// Handshake in progress.
    Connecting,
    /// Session established.
    Connected,
    /// The transport dropped. The handle will not recover by itself.
    Disconnected,
    /// The handle was closed by its owner.
    Closed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
            Self::Closed => "CLOSED",
        };
        f.write_str(label)
    }
}

/// Callback invoked on every state change of a client handle.
pub type StateObserver = Box<dyn Fn(ClientState) + Send + Sync>;

/// Shared handle to a live client.
pub type ClientHandle = Arc<dyn CoordinationClient>;

/// Node operations offered by a connected client.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Names of the immediate children of `path`, in service order.
    async fn get_children(&self, path: &str) -> Result<Vec<String>, RemoteError>;

    /// Metadata of `path`, or `None` if it does not exist.
    async fn exists(&self, path: &str) -> Result<Option<RawStat>, RemoteError>;

    /// Payload and metadata of `path`.
    async fn get_data(&self, path: &str) -> Result<(Vec<u8>, Option<RawStat>), RemoteError>;

    /// Replace the payload of `path`.
    async fn set_data(&self, path: &str, data: &[u8]) -> Result<(), RemoteError>;

    /// Create a persistent node. Returns the created path.
    async fn create(&self, path: &str, data: &[u8]) -> Result<String, RemoteError>;

    /// Delete a node that has no children.
    async fn remove(&self, path: &str) -> Result<(), RemoteError>;

    /// Delete a node and all of its descendants.
    async fn remove_recursive(&self, path: &str) -> Result<(), RemoteError>;

    /// Current connection state of this handle.
    fn state(&self) -> ClientState;

    /// Close the handle. Later calls fail.
    async fn close(&self) -> Result<(), RemoteError>;

    /// Register a callback for state changes of this handle.
    fn on_state_change(&self, observer: StateObserver);
}

/// Factory for client handles.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `host`, resolving once it is connected.
    async fn connect(&self, host: &str) -> Result<ClientHandle, RemoteError>;
}
