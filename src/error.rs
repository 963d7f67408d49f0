//! Error types shared across the browser.

use thiserror::Error;

/// Failure reported by the coordination service client itself.
///
/// These pass through the browser verbatim; nothing in the crate tries to
/// recover from them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The addressed node does not exist.
    #[error("node does not exist: {0}")]
    NoNode(String),

    /// A node already exists at the create path.
    #[error("node already exists: {0}")]
    NodeExists(String),

    /// A plain delete targeted a node that still has children.
    #[error("node has children: {0}")]
    NotEmpty(String),

    /// The handle's transport is gone.
    #[error("connection to the service was lost")]
    ConnectionLoss,

    /// Any other service-side failure.
    #[error("{0}")]
    Other(String),
}

/// Raw node metadata could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No metadata was returned at all.
    #[error("node metadata is missing")]
    Missing,

    #[error("node metadata truncated: expected {expected} bytes, got {actual}")]
    /// Fewer bytes than the fixed layout requires.
    Truncated {
        /// Bytes required by the layout.
        expected: usize,
        /// Bytes actually received.
        actual: usize,
    },
}

/// Errors surfaced by browser operations.
#[derive(Error, Debug)]
pub enum BrowserError {
    /// Opening a session failed or was superseded.
    #[error("failed to connect to {host}: {reason}")]
    Connection {
        /// Host that was being connected to.
        host: String,
        /// Human-readable cause.
        reason: String,
    },

    /// An operation ran before any host was requested.
    #[error("not connected: no host has been requested")]
    NotConnected,

    /// The path normalizes to nothing usable.
    #[error("invalid node path {0:?}")]
    InvalidPath(String),

    /// The operation is refused locally, e.g. deleting the root.
    #[error("operation not permitted: {0}")]
    Forbidden(String),

    /// Node metadata could not be decoded.
    #[error("failed to decode node metadata: {0}")]
    Decode(#[from] DecodeError),

    /// Passed through from the service client.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl BrowserError {
    /// True for every error in the connection family.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::NotConnected)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = BrowserError> = std::result::Result<T, E>;
