//! Boundary operations offered to a presentation layer.
//!
//! `Browser` bundles the session, the synchronized tree and the node
//! operations behind one request/response surface. Every call either
//! completes or surfaces exactly one error.

use crate::config::{QuickLink, Settings};
use crate::error::Result;
use crate::namespace::{
    ChildSummary, NamespaceModel, NodeData, NodeDetail, NodeOperations, TreeUpdate,
};
use crate::session::{Connector, SessionManager, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// The browser core.
pub struct Browser {
    session: Arc<SessionManager>,
    model: Arc<NamespaceModel>,
    ops: NodeOperations,
    settings: Settings,
}

impl Browser {
    /// Create a browser with default settings.
    pub fn new(connector: Arc<dyn Connector>) -> (Self, broadcast::Receiver<TreeUpdate>) {
        BrowserBuilder::new(connector).build()
    }

    /// Connect to `host` and load the root level of the namespace.
    ///
    /// A blank host falls back to the configured default host.
    pub async fn connect(&self, host: &str) -> Result<()> {
        let host = match host.trim() {
            "" => self.settings.default_host.as_str(),
            trimmed => trimmed,
        };
        self.session.new_client(host).await?;
        self.model.expand("/").await?;
        Ok(())
    }

    /// Close the session, keeping the host for a later reconnect.
    pub async fn disconnect(&self) {
        self.session.close().await;
        self.model.clear_selection().await;
    }

    /// Current session state.
    pub async fn connection_state(&self) -> SessionState {
        self.session.state().await
    }

    /// Children of `path` with their child counts.
    pub async fn list_children(&self, path: &str) -> Result<Vec<ChildSummary>> {
        self.ops.list_children(path).await
    }

    /// Payload and metadata of `path`.
    pub async fn get_node(&self, path: &str) -> Result<NodeData> {
        self.ops.get_node(path).await
    }

    /// Write `value` as the payload of `path`.
    pub async fn set_node(&self, path: &str, value: &str) -> Result<()> {
        self.ops.set_data(path, Some(value)).await
    }

    /// Create an empty node and refresh its parent in the tree.
    pub async fn create_node(&self, raw_path: &str) -> Result<()> {
        self.ops.create_node(raw_path).await.map(|_| ())
    }

    /// Delete a childless node. The root cannot be deleted.
    pub async fn delete_node(&self, path: &str) -> Result<()> {
        self.ops.delete_node(path, false).await
    }

    /// Delete a node and its whole subtree. The root cannot be deleted.
    pub async fn delete_node_recursive(&self, path: &str) -> Result<()> {
        self.ops.delete_node(path, true).await
    }

    /// Configured quick links, possibly empty.
    pub fn quick_links(&self) -> &[QuickLink] {
        &self.settings.quick_links
    }

    /// Persist the selected node's edited value and clear its dirty flag.
    ///
    /// Returns `false` when there is nothing to save.
    pub async fn save_selected(&self) -> Result<bool> {
        let Some(detail) = self.model.selection().await.filter(|d| d.dirty) else {
            return Ok(false);
        };
        self.ops
            .set_data(&detail.path, Some(detail.raw_value.as_str()))
            .await?;
        self.model.mark_saved(&detail.path).await;
        Ok(true)
    }

    /// Fetch `path` and make it the selection.
    pub async fn select(&self, path: &str) -> Result<NodeDetail> {
        self.model.select(path).await
    }

    /// The tree synchronizer.
    pub fn model(&self) -> &Arc<NamespaceModel> {
        &self.model
    }

    /// The session manager.
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Settings in effect.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// Builder for Browser with sensible defaults.
pub struct BrowserBuilder {
    connector: Arc<dyn Connector>,
    settings: Settings,
}

impl BrowserBuilder {
    /// Start from default settings.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            settings: Settings::default(),
        }
    }

    /// Use `settings` instead of the defaults.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Override the connect timeout, saturating at `u64::MAX` milliseconds.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Override the capacity of the tree update channel.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.settings.update_buffer_size = size;
        self
    }

    /// Build the browser.
    ///
    /// # Returns
    /// A tuple of (browser, receiver) where receiver gets tree updates.
    pub fn build(self) -> (Browser, broadcast::Receiver<TreeUpdate>) {
        let session = Arc::new(SessionManager::with_timeout(
            self.connector,
            self.settings.connect_timeout(),
        ));
        let (model, rx) = NamespaceModel::new(Arc::clone(&session), self.settings.update_buffer_size);
        let model = Arc::new(model);
        let ops = NodeOperations::new(Arc::clone(&session), Arc::clone(&model));

        (
            Browser {
                session,
                model,
                ops,
                settings: self.settings,
            },
            rx,
        )
    }
}
