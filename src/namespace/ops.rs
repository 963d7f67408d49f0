//! Node operations: validation and normalization in front of the client.
//!
//! Reads are exposed as free functions over a borrowed client so the tree
//! synchronizer can share them; writes go through [`NodeOperations`], which
//! also keeps the local tree in step after a successful remote change.

use crate::error::{BrowserError, Result};
use crate::namespace::model::NamespaceModel;
use crate::namespace::path::{self, ROOT};
use crate::namespace::stat::Stat;
use crate::namespace::tree_store::ChildSummary;
use crate::session::{CoordinationClient, SessionManager};
use std::sync::Arc;

/// Payload and metadata of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeData {
    /// Payload decoded as UTF-8, lossily.
    pub raw_value: String,
    /// Decoded metadata; `None` when the service returned none.
    pub stat: Option<Stat>,
}

/// The currently selected node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDetail {
    /// Normalized path of the node.
    pub path: String,
    /// Payload, possibly edited locally.
    pub raw_value: String,
    /// Metadata as of the last fetch.
    pub stat: Option<Stat>,
    /// Set when `raw_value` was edited locally and not yet saved.
    pub dirty: bool,
}

impl NodeDetail {
    /// A clean selection of `path` holding freshly fetched `data`.
    pub fn new(path: String, data: NodeData) -> Self {
        Self {
            path,
            raw_value: data.raw_value,
            stat: data.stat,
            dirty: false,
        }
    }
}

/// Canonical form of a user-typed path for node creation.
pub fn creatable_path(raw: &str) -> Result<String> {
    let key = path::normalize(raw);
    if key == ROOT {
        return Err(BrowserError::InvalidPath(raw.to_string()));
    }
    Ok(key)
}

/// Canonical form of a path about to be deleted. The root is never deletable.
pub fn deletable_path(raw: &str) -> Result<String> {
    let key = path::normalize(raw);
    if key == ROOT {
        return Err(BrowserError::Forbidden("cannot delete root node".to_string()));
    }
    Ok(key)
}

/// Immediate children of `path` with their child counts.
///
/// A child that disappears between the listing and its lookup is reported
/// with zero children.
pub async fn fetch_children(
    client: &dyn CoordinationClient,
    path: &str,
) -> Result<Vec<ChildSummary>> {
    let names = client.get_children(path).await?;
    let mut children = Vec::with_capacity(names.len());

    for name in names {
        let raw = client.exists(&path::join(path, &name)).await?;
        let num_children = match raw {
            Some(raw) => Stat::decode(Some(&raw))?.num_children,
            None => 0,
        };
        children.push(ChildSummary { name, num_children });
    }

    tracing::debug!("Fetched {} children of {}", children.len(), path);
    Ok(children)
}

/// Payload (as lossy UTF-8) and decoded metadata of `path`.
pub async fn fetch_node(client: &dyn CoordinationClient, path: &str) -> Result<NodeData> {
    let (data, raw) = client.get_data(path).await?;
    let stat = match raw {
        Some(raw) => Some(Stat::decode(Some(&raw))?),
        None => None,
    };
    Ok(NodeData {
        raw_value: String::from_utf8_lossy(&data).into_owned(),
        stat,
    })
}

/// Create/read/update/delete entry point used by the boundary layer.
pub struct NodeOperations {
    session: Arc<SessionManager>,
    model: Arc<NamespaceModel>,
}

impl NodeOperations {
    /// Creates the operations over a shared session and model.
    ///
    /// # Arguments
    /// * `session` - Supplies the client handle for every call
    /// * `model` - Local tree kept in step after creates and deletes
    pub fn new(session: Arc<SessionManager>, model: Arc<NamespaceModel>) -> Self {
        Self { session, model }
    }

    /// Children of `raw_path` with their child counts, in service order.
    pub async fn list_children(&self, raw_path: &str) -> Result<Vec<ChildSummary>> {
        let client = self.session.require_client().await?;
        fetch_children(client.as_ref(), &path::normalize(raw_path)).await
    }

    /// Payload and decoded metadata of `raw_path`.
    pub async fn get_node(&self, raw_path: &str) -> Result<NodeData> {
        let client = self.session.require_client().await?;
        fetch_node(client.as_ref(), &path::normalize(raw_path)).await
    }

    /// Write `value` as the node's payload. `None` writes an empty payload.
    pub async fn set_data(&self, raw_path: &str, value: Option<&str>) -> Result<()> {
        let key = path::normalize(raw_path);
        let client = self.session.require_client().await?;
        client
            .set_data(&key, value.unwrap_or_default().as_bytes())
            .await?;
        tracing::debug!("Updated data of {}", key);
        Ok(())
    }

    /// Create an empty node and refresh its parent so it becomes visible.
    ///
    /// Returns the canonical path of the new node.
    pub async fn create_node(&self, raw_path: &str) -> Result<String> {
        let key = creatable_path(raw_path)?;
        let client = self.session.require_client().await?;
        client.create(&key, b"").await?;
        tracing::info!("Created node {}", key);

        self.model.expand(&path::parent(&key)).await?;
        Ok(key)
    }

    /// Delete a node remotely, then prune it from the local tree.
    pub async fn delete_node(&self, raw_path: &str, recursive: bool) -> Result<()> {
        let key = deletable_path(raw_path)?;
        let client = self.session.require_client().await?;
        if recursive {
            client.remove_recursive(&key).await?;
        } else {
            client.remove(&key).await?;
        }
        tracing::info!("Deleted node {} (recursive: {})", key, recursive);

        self.model.remove(&key).await;
        Ok(())
    }
}
