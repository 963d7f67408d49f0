//! Tree synchronizer: keeps the local namespace tree in step with the service.
//!
//! This module provides the `NamespaceModel`, which fetches children on
//! demand, merges them into the shared [`NamespaceTree`], tracks the selected
//! node, and notifies listeners of every structural change via a broadcast
//! channel.

use crate::error::Result;
use crate::namespace::ops::{self, NodeDetail};
use crate::namespace::path::{self, ROOT};
use crate::namespace::tree_store::NamespaceTree;
use crate::session::SessionManager;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Kind of structural change applied to the local tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeChangeKind {
    /// The tree was rebuilt from a bare root.
    Reset,
    /// Children of a node were (re)loaded.
    Loaded,
    /// A subtree was pruned.
    Removed,
}

/// Update notification sent to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeUpdate {
    /// The node whose children changed, or the removed node.
    pub key: String,
    /// Keys affected by the change.
    pub keys: Vec<String>,
    /// What happened.
    pub kind: TreeChangeKind,
}

/// Lazily synchronized view of the remote namespace.
pub struct NamespaceModel {
    session: Arc<SessionManager>,
    /// The tree state, shared with readers such as renderers.
    tree: Arc<RwLock<NamespaceTree>>,
    selection: RwLock<Option<NodeDetail>>,
    ui_notifier: broadcast::Sender<TreeUpdate>,
}

impl NamespaceModel {
    /// Creates a new model over `session`.
    ///
    /// # Arguments
    /// * `session` - Session used for every fetch
    /// * `buffer_size` - Capacity of the update channel, at least 1
    ///
    /// # Returns
    /// A tuple of (model, receiver) where receiver gets tree updates.
    pub fn new(
        session: Arc<SessionManager>,
        buffer_size: usize,
    ) -> (Self, broadcast::Receiver<TreeUpdate>) {
        let (ui_notifier, ui_receiver) = broadcast::channel(buffer_size.max(1));
        (
            Self {
                session,
                tree: Arc::new(RwLock::new(NamespaceTree::new())),
                selection: RwLock::new(None),
                ui_notifier,
            },
            ui_receiver,
        )
    }

    /// Shared handle to the local tree.
    pub fn tree(&self) -> Arc<RwLock<NamespaceTree>> {
        Arc::clone(&self.tree)
    }

    /// An additional receiver for tree updates.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeUpdate> {
        self.ui_notifier.subscribe()
    }

    /// Fetch the children of `path` and merge them into the tree.
    ///
    /// Expanding the root rebuilds the whole tree and clears the selection.
    /// Returns the merged child keys; empty if `path` is not known locally.
    pub async fn expand(&self, raw_path: &str) -> Result<Vec<String>> {
        let key = path::normalize(raw_path);
        let client = self.session.require_client().await?;
        let children = ops::fetch_children(client.as_ref(), &key).await?;

        let merged = {
            let mut tree = self.tree.write().await;
            if key == ROOT {
                tree.reset();
            }
            let merged = tree.merge_children(&key, &children);
            if merged.is_some() && key != ROOT {
                tree.mark_loaded(&key);
            }
            merged
        };

        if key == ROOT {
            *self.selection.write().await = None;
        }

        match merged {
            Some(keys) => {
                let kind = if key == ROOT {
                    TreeChangeKind::Reset
                } else {
                    TreeChangeKind::Loaded
                };
                self.notify(TreeUpdate {
                    key,
                    keys: keys.clone(),
                    kind,
                });
                Ok(keys)
            }
            None => {
                tracing::debug!("Skipping merge for {}: not in local tree", key);
                Ok(Vec::new())
            }
        }
    }

    /// Expand `path`, fetching only if its children are not loaded yet.
    pub async fn open(&self, raw_path: &str) -> Result<()> {
        let key = path::normalize(raw_path);
        {
            let mut tree = self.tree.write().await;
            let fetched = tree.get(&key).is_some_and(|n| n.is_loaded());
            if tree.is_loaded(&key) && fetched {
                tree.expand(&key);
                return Ok(());
            }
        }
        self.expand(&key).await.map(|_| ())
    }

    /// Collapse `path`. Its children will be re-fetched on the next open.
    pub async fn collapse(&self, raw_path: &str) {
        let key = path::normalize(raw_path);
        self.tree.write().await.collapse(&key);
    }

    /// Replace the whole expanded set, as reported by a tree widget.
    pub async fn set_expanded(&self, keys: Vec<String>) {
        let keys = keys.iter().map(|k| path::normalize(k));
        self.tree.write().await.set_expanded(keys);
    }

    /// Prune `path` and its subtree from the local tree.
    ///
    /// Clears the selection if it pointed inside the pruned subtree.
    pub async fn remove(&self, raw_path: &str) -> Vec<String> {
        let key = path::normalize(raw_path);
        let removed = self.tree.write().await.remove(&key);

        {
            let mut selection = self.selection.write().await;
            if selection
                .as_ref()
                .is_some_and(|d| path::is_within(&d.path, &key))
            {
                *selection = None;
            }
        }

        if !removed.is_empty() {
            self.notify(TreeUpdate {
                key,
                keys: removed.clone(),
                kind: TreeChangeKind::Removed,
            });
        }
        removed
    }

    /// Select `path`, loading its data and metadata.
    ///
    /// Selecting the already selected path returns the current detail,
    /// including unsaved edits. On failure the selection is left as it was.
    pub async fn select(&self, raw_path: &str) -> Result<NodeDetail> {
        let key = path::normalize(raw_path);
        if let Some(current) = self.selection.read().await.as_ref() {
            if current.path == key {
                return Ok(current.clone());
            }
        }

        let client = self.session.require_client().await?;
        let data = ops::fetch_node(client.as_ref(), &key).await?;
        let detail = NodeDetail::new(key, data);
        *self.selection.write().await = Some(detail.clone());
        Ok(detail)
    }

    /// Snapshot of the selected node, if any.
    pub async fn selection(&self) -> Option<NodeDetail> {
        self.selection.read().await.clone()
    }

    /// Replace the selected node's value locally and mark it dirty.
    ///
    /// Returns `None` when nothing is selected.
    pub async fn edit_selected(&self, value: &str) -> Option<NodeDetail> {
        let mut selection = self.selection.write().await;
        let detail = selection.as_mut()?;
        detail.raw_value = value.to_string();
        detail.dirty = true;
        Some(detail.clone())
    }

    /// Clear the dirty flag after a successful save of `path`.
    pub async fn mark_saved(&self, raw_path: &str) {
        let key = path::normalize(raw_path);
        if let Some(detail) = self.selection.write().await.as_mut() {
            if detail.path == key {
                detail.dirty = false;
            }
        }
    }

    /// Drop the selection, discarding unsaved edits.
    pub async fn clear_selection(&self) {
        *self.selection.write().await = None;
    }

    fn notify(&self, update: TreeUpdate) {
        if let Err(e) = self.ui_notifier.send(update) {
            tracing::debug!("No listeners for tree update: {}", e);
        }
    }
}
