//! Namespace mirroring module.
//!
//! This module provides:
//! - `path`: path normalization helpers
//! - `stat`: node metadata codec
//! - `tree_store`: key-indexed local tree with expand/load bookkeeping
//! - `model`: tree synchronizer fetching children on demand
//! - `ops`: validated node create/read/update/delete

pub mod model;
pub mod ops;
pub mod path;
pub mod stat;
pub mod tree_store;

pub use model::{NamespaceModel, TreeChangeKind, TreeUpdate};
pub use ops::{NodeData, NodeDetail, NodeOperations};
pub use stat::{RawStat, Stat};
pub use tree_store::{ChildSummary, NamespaceTree, TreeNode, TreeStats};
