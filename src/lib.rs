//! ZooKeeper-style namespace browser core.
//!
//! This crate holds the parts of a coordination-service browser that are not
//! presentation: a session manager owning the one live client handle, and a
//! local tree that lazily mirrors the remote namespace.
//!
//! ## Solution Overview
//!
//! ```text
//! Browser (connect / listChildren / getNode / createNode / deleteNode ...)
//!        ↓
//! NodeOperations (path normalization, root guard, delete dispatch)
//!        ↓
//! SessionManager.get_client() [reconnects once if the handle dropped]
//!        ↓
//! CoordinationClient (get_children / exists / get_data / ...)
//!        ↓
//! NamespaceModel.expand() → NamespaceTree.merge_children() [in place]
//!        ↓
//! broadcast::send(TreeUpdate)
//! ```
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zk_browser::{
//!     browser::BrowserBuilder,
//!     config::Settings,
//!     session::{MemoryConnector, MemoryService},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = MemoryService::new();
//!     service.put("/app/config", "{}");
//!
//!     let (browser, _updates) = BrowserBuilder::new(Arc::new(MemoryConnector::new(service)))
//!         .settings(Settings::load_default())
//!         .build();
//!
//!     browser.connect("127.0.0.1:2181").await?;
//!     browser.model().open("/app").await?;
//!     let detail = browser.select("/app/config").await?;
//!     println!("{} = {}", detail.path, detail.raw_value);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - [`session`]: client capability traits, session manager, in-memory service
//! - [`namespace`]: path helpers, stat codec, local tree, synchronizer, node operations
//! - [`browser`]: the boundary surface driven by a presentation layer
//! - [`config`]: `appsettings.json` loading

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod browser;
pub mod config;
pub mod error;
pub mod namespace;
pub mod session;

/// Re-exports for convenience.
pub mod prelude {
    pub use crate::browser::{Browser, BrowserBuilder};
    pub use crate::config::{QuickLink, Settings};
    pub use crate::error::{BrowserError, DecodeError, RemoteError};
    pub use crate::namespace::{
        ChildSummary, NamespaceModel, NamespaceTree, NodeData, NodeDetail, NodeOperations, Stat,
        TreeChangeKind, TreeNode, TreeUpdate,
    };
    pub use crate::session::{
        ClientHandle, ClientState, Connector, CoordinationClient, MemoryConnector, MemoryService,
        SessionManager, SessionState,
    };
}
