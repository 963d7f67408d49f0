//! Local mirror of the remote namespace.
//!
//! This module provides `NamespaceTree`, a key-indexed arena holding the
//! subset of the namespace fetched so far, plus the expanded/loaded key
//! bookkeeping the tree view relies on. All edits happen in place; nothing
//! here touches the network.

use crate::namespace::path::{self, ROOT};
use std::collections::{HashMap, HashSet};

/// One namespace entry as known locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    /// Normalized absolute path.
    pub key: String,
    /// Last path segment, `/` for the root.
    pub title: String,
    /// Whether the node had no children when last fetched.
    pub is_leaf: bool,
    /// Child keys in display order. `None` until the node is first fetched.
    children: Option<Vec<String>>,
}

impl TreeNode {
    fn new(key: String, is_leaf: bool) -> Self {
        Self {
            title: path::title(&key).to_string(),
            key,
            is_leaf,
            children: None,
        }
    }

    /// Child keys, or `None` if this node was never fetched.
    pub fn child_keys(&self) -> Option<&[String]> {
        self.children.as_deref()
    }

    /// Whether this node's children have been fetched at least once.
    pub fn is_loaded(&self) -> bool {
        self.children.is_some()
    }
}

/// A child reported by the service during a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSummary {
    /// The child's own name (one segment).
    pub name: String,
    /// Child count at fetch time.
    pub num_children: i32,
}

impl ChildSummary {
    /// Whether the child should be drawn expandable.
    pub fn has_children(&self) -> bool {
        self.num_children > 0
    }
}

/// Bookkeeping counters for debugging.
#[derive(Debug, Default, Clone)]
pub struct TreeStats {
    /// Successful merges of fetched children.
    pub total_merges: u64,
    /// Merges skipped because the target was not in the tree.
    pub total_missed_merges: u64,
    /// Nodes dropped by removals or merges.
    pub total_removes: u64,
    /// Full resets to a bare root.
    pub total_resets: u64,
}

/// The locally known namespace tree.
///
/// Invariants:
/// - exactly one root, keyed `/`
/// - every key appears once, and every non-root node is listed in its
///   parent's child keys
/// - child key lists are sorted case-insensitively
pub struct NamespaceTree {
    nodes: HashMap<String, TreeNode>,
    /// Keys currently shown expanded.
    expanded_keys: HashSet<String>,
    /// Keys whose children were fetched since they were last collapsed.
    loaded_keys: HashSet<String>,
    stats: TreeStats,
}

impl NamespaceTree {
    /// A tree holding only an unfetched root.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT.to_string(), TreeNode::new(ROOT.to_string(), false));
        Self {
            nodes,
            expanded_keys: HashSet::new(),
            loaded_keys: HashSet::new(),
            stats: TreeStats::default(),
        }
    }

    /// Drop everything but a bare root and mark the root expanded and loaded.
    pub fn reset(&mut self) {
        let dropped = self.nodes.len().saturating_sub(1);
        self.nodes.clear();
        self.nodes
            .insert(ROOT.to_string(), TreeNode::new(ROOT.to_string(), false));
        self.expanded_keys = HashSet::from([ROOT.to_string()]);
        self.loaded_keys = HashSet::from([ROOT.to_string()]);
        self.stats.total_removes += dropped as u64;
        self.stats.total_resets += 1;
    }

    /// Number of nodes known locally, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// The tree always holds its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Look up a node by normalized key.
    pub fn get(&self, key: &str) -> Option<&TreeNode> {
        self.nodes.get(key)
    }

    /// Whether `key` is known locally.
    pub fn contains(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    /// The root node.
    pub fn root(&self) -> &TreeNode {
        &self.nodes[ROOT]
    }

    /// Counters for debugging.
    pub fn stats(&self) -> &TreeStats {
        &self.stats
    }

    /// Children of `key` in display order, or `None` if not fetched.
    pub fn children(&self, key: &str) -> Option<Vec<&TreeNode>> {
        let node = self.nodes.get(key)?;
        let keys = node.children.as_ref()?;
        Some(keys.iter().filter_map(|k| self.nodes.get(k)).collect())
    }

    /// Attach freshly fetched children under `parent_key`.
    ///
    /// The new list replaces the old one. Children that were already known
    /// keep their own loaded subtree; children the service no longer reports
    /// are dropped with their descendants. Returns the merged child keys, or
    /// `None` if `parent_key` is not in the tree.
    pub fn merge_children(
        &mut self,
        parent_key: &str,
        fetched: &[ChildSummary],
    ) -> Option<Vec<String>> {
        if !self.nodes.contains_key(parent_key) {
            self.stats.total_missed_merges += 1;
            return None;
        }

        let mut incoming: Vec<(String, bool)> = fetched
            .iter()
            .map(|c| (path::join(parent_key, &c.name), !c.has_children()))
            .collect();
        incoming.sort_by_cached_key(|(key, _)| path::sort_key(key));
        incoming.dedup_by(|a, b| a.0 == b.0);

        let keep: HashSet<&str> = incoming.iter().map(|(k, _)| k.as_str()).collect();
        let stale: Vec<String> = self.nodes[parent_key]
            .children
            .iter()
            .flatten()
            .filter(|k| !keep.contains(k.as_str()))
            .cloned()
            .collect();
        for key in &stale {
            self.drop_subtree(key);
        }

        for (key, is_leaf) in &incoming {
            self.nodes
                .entry(key.clone())
                .and_modify(|node| node.is_leaf = *is_leaf)
                .or_insert_with(|| TreeNode::new(key.clone(), *is_leaf));
        }

        let keys: Vec<String> = incoming.into_iter().map(|(k, _)| k).collect();
        if let Some(parent) = self.nodes.get_mut(parent_key) {
            parent.is_leaf = keys.is_empty();
            parent.children = Some(keys.clone());
        }
        self.stats.total_merges += 1;
        Some(keys)
    }

    /// Remove `key` and its whole subtree. The root cannot be removed.
    ///
    /// Returns the removed keys.
    pub fn remove(&mut self, key: &str) -> Vec<String> {
        if key == ROOT || !self.nodes.contains_key(key) {
            return Vec::new();
        }

        let parent_key = path::parent(key);
        if let Some(siblings) = self
            .nodes
            .get_mut(&parent_key)
            .and_then(|p| p.children.as_mut())
        {
            siblings.retain(|k| k != key);
        }
        self.drop_subtree(key)
    }

    fn drop_subtree(&mut self, key: &str) -> Vec<String> {
        let doomed: Vec<String> = self
            .nodes
            .keys()
            .filter(|k| path::is_within(k, key))
            .cloned()
            .collect();
        for k in &doomed {
            self.nodes.remove(k);
            self.expanded_keys.remove(k);
            self.loaded_keys.remove(k);
        }
        self.stats.total_removes += doomed.len() as u64;
        doomed
    }

    /// Mark a node expanded and its children loaded.
    pub fn mark_loaded(&mut self, key: &str) {
        self.expanded_keys.insert(key.to_string());
        self.loaded_keys.insert(key.to_string());
    }

    /// Mark a node expanded without touching its loaded state.
    pub fn expand(&mut self, key: &str) {
        self.expanded_keys.insert(key.to_string());
    }

    /// Replace the expanded set with `keys`.
    ///
    /// When the set shrinks, loaded keys no longer expanded are forgotten so
    /// that expanding them again re-fetches.
    pub fn set_expanded<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = String>,
    {
        let keys: HashSet<String> = keys.into_iter().collect();
        if keys.len() < self.expanded_keys.len() {
            self.loaded_keys.retain(|k| keys.contains(k));
        }
        self.expanded_keys = keys;
    }

    /// Collapse a single node.
    pub fn collapse(&mut self, key: &str) {
        let remaining: Vec<String> = self
            .expanded_keys
            .iter()
            .filter(|k| k.as_str() != key)
            .cloned()
            .collect();
        self.set_expanded(remaining);
    }

    /// Whether `key` is shown expanded.
    pub fn is_expanded(&self, key: &str) -> bool {
        self.expanded_keys.contains(key)
    }

    /// Whether `key`'s children were fetched since it was last collapsed.
    pub fn is_loaded(&self, key: &str) -> bool {
        self.loaded_keys.contains(key)
    }

    /// All keys currently shown expanded.
    pub fn expanded_keys(&self) -> &HashSet<String> {
        &self.expanded_keys
    }

    /// All keys whose children are loaded.
    pub fn loaded_keys(&self) -> &HashSet<String> {
        &self.loaded_keys
    }

    /// Depth-first rows of the visible tree, starting at the root.
    ///
    /// A node's children are visible only while it is expanded.
    pub fn visible_rows(&self) -> Vec<(usize, &TreeNode)> {
        let mut rows = Vec::new();
        let mut stack = vec![(0usize, ROOT)];

        while let Some((depth, key)) = stack.pop() {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            rows.push((depth, node));
            if !self.expanded_keys.contains(key) {
                continue;
            }
            if let Some(children) = &node.children {
                for child in children.iter().rev() {
                    stack.push((depth + 1, child.as_str()));
                }
            }
        }

        rows
    }

    /// Get a summary of the tree for debugging.
    pub fn debug_summary(&self) -> String {
        format!(
            "NamespaceTree: {} nodes, {} expanded, {} loaded, stats: {:?}",
            self.nodes.len(),
            self.expanded_keys.len(),
            self.loaded_keys.len(),
            self.stats
        )
    }
}

impl Default for NamespaceTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(name: &str, num_children: i32) -> ChildSummary {
        ChildSummary {
            name: name.to_string(),
            num_children,
        }
    }

    fn keys_of(tree: &NamespaceTree, key: &str) -> Vec<String> {
        tree.children(key)
            .unwrap()
            .into_iter()
            .map(|n| n.key.clone())
            .collect()
    }

    #[test]
    fn test_merge_sorts_case_insensitively() {
        let mut tree = NamespaceTree::new();
        tree.merge_children("/", &[child("x", 3)]);
        tree.merge_children("/x", &[child("B", 0), child("a", 0), child("C", 1)]);

        assert_eq!(keys_of(&tree, "/x"), vec!["/x/a", "/x/B", "/x/C"]);
        assert!(tree.get("/x/a").unwrap().is_leaf);
        assert!(!tree.get("/x/C").unwrap().is_leaf);
        assert_eq!(tree.get("/x/B").unwrap().title, "B");
    }

    #[test]
    fn test_merge_keeps_loaded_sibling_subtrees() {
        let mut tree = NamespaceTree::new();
        tree.merge_children("/", &[child("a", 1), child("b", 1)]);
        tree.merge_children("/a", &[child("deep", 0)]);

        // Re-fetching the root keeps /a's loaded children.
        tree.merge_children("/", &[child("a", 1), child("b", 1), child("c", 0)]);

        assert_eq!(keys_of(&tree, "/"), vec!["/a", "/b", "/c"]);
        assert_eq!(keys_of(&tree, "/a"), vec!["/a/deep"]);
    }

    #[test]
    fn test_merge_drops_vanished_children() {
        let mut tree = NamespaceTree::new();
        tree.merge_children("/", &[child("a", 1), child("b", 0)]);
        tree.merge_children("/a", &[child("deep", 0)]);
        tree.mark_loaded("/a");

        tree.merge_children("/", &[child("b", 0)]);

        assert!(!tree.contains("/a"));
        assert!(!tree.contains("/a/deep"));
        assert!(!tree.is_loaded("/a"));
        assert_eq!(keys_of(&tree, "/"), vec!["/b"]);
    }

    #[test]
    fn test_merge_into_unknown_node_is_ignored() {
        let mut tree = NamespaceTree::new();
        assert!(tree.merge_children("/nowhere", &[child("a", 0)]).is_none());
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.stats().total_missed_merges, 1);
    }

    #[test]
    fn test_merge_only_touches_target() {
        let mut tree = NamespaceTree::new();
        tree.merge_children("/", &[child("a", 1), child("b", 1)]);
        tree.merge_children("/a", &[child("one", 0)]);
        tree.merge_children("/b", &[child("two", 0)]);

        assert_eq!(keys_of(&tree, "/a"), vec!["/a/one"]);
        assert_eq!(keys_of(&tree, "/b"), vec!["/b/two"]);
    }

    #[test]
    fn test_empty_fetch_marks_loaded_leaf() {
        let mut tree = NamespaceTree::new();
        tree.merge_children("/", &[child("a", 2)]);
        tree.merge_children("/a", &[]);

        let node = tree.get("/a").unwrap();
        assert!(node.is_loaded());
        assert!(node.is_leaf);
        assert_eq!(node.child_keys().unwrap().len(), 0);
    }

    #[test]
    fn test_remove_drops_subtree() {
        let mut tree = NamespaceTree::new();
        tree.merge_children("/", &[child("a", 1), child("ab", 0)]);
        tree.merge_children("/a", &[child("b", 1)]);
        tree.merge_children("/a/b", &[child("c", 0)]);
        tree.mark_loaded("/a");
        tree.mark_loaded("/a/b");

        let removed = tree.remove("/a");

        assert_eq!(removed.len(), 3);
        assert!(tree.nodes.keys().all(|k| !path::is_within(k, "/a")));
        assert!(tree.contains("/ab"));
        assert_eq!(keys_of(&tree, "/"), vec!["/ab"]);
        assert!(!tree.is_expanded("/a/b"));
    }

    #[test]
    fn test_remove_root_is_noop() {
        let mut tree = NamespaceTree::new();
        tree.merge_children("/", &[child("a", 0)]);
        assert!(tree.remove("/").is_empty());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_collapse_prunes_loaded_keys() {
        let mut tree = NamespaceTree::new();
        tree.reset();
        tree.merge_children("/", &[child("a", 1), child("b", 1)]);
        tree.mark_loaded("/a");
        tree.mark_loaded("/b");

        tree.collapse("/a");

        assert!(!tree.is_expanded("/a"));
        assert!(!tree.is_loaded("/a"));
        assert!(tree.is_loaded("/b"));
        assert!(tree.is_loaded("/"));
    }

    #[test]
    fn test_growing_expanded_set_keeps_loaded_keys() {
        let mut tree = NamespaceTree::new();
        tree.reset();
        tree.mark_loaded("/a");
        tree.set_expanded(vec!["/".to_string(), "/a".to_string(), "/b".to_string()]);

        assert!(tree.is_loaded("/a"));
        assert!(tree.is_expanded("/b"));
    }

    #[test]
    fn test_reset() {
        let mut tree = NamespaceTree::new();
        tree.merge_children("/", &[child("a", 0)]);
        tree.reset();

        assert_eq!(tree.len(), 1);
        assert!(!tree.root().is_loaded());
        assert!(tree.is_expanded("/"));
        assert!(tree.is_loaded("/"));
    }

    #[test]
    fn test_visible_rows_follow_expansion() {
        let mut tree = NamespaceTree::new();
        tree.reset();
        tree.merge_children("/", &[child("b", 1), child("a", 1)]);
        tree.merge_children("/a", &[child("x", 0)]);
        tree.merge_children("/b", &[child("y", 0)]);
        tree.mark_loaded("/a");

        let rows: Vec<(usize, &str)> = tree
            .visible_rows()
            .into_iter()
            .map(|(depth, node)| (depth, node.key.as_str()))
            .collect();

        assert_eq!(rows, vec![(0, "/"), (1, "/a"), (2, "/a/x"), (1, "/b")]);
    }
}
