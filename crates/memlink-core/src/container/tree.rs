//! Tree containers: a forest of items with parent/child bookkeeping,
//! cached depths, traversal, and re-parenting.
//!
//! Depth propagation uses an explicit worklist rather than recursion so
//! deep trees cannot overflow the stack. There is no cycle detection;
//! behavior over a cyclic child graph is unspecified.

use serde_json::Value;

use std::collections::VecDeque;

use memlink_types::error::MemoryError;
use memlink_types::snapshot::{ContainerKind, ContainerSnapshot};
use memlink_types::tree::TreeItem;

use super::base::MemoryCore;

/// Visit order for [`TreeMemory::traverse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraverseOrder {
    /// Node before its children, children left-to-right.
    Pre,
    /// Node after its children.
    Post,
    /// Breadth-first, one group per depth level.
    Level,
}

/// Traversal output: a flat sequence for pre/post order, one sub-sequence
/// per depth level for level order.
#[derive(Debug, Clone, PartialEq)]
pub enum Traversal {
    Sequence(Vec<Value>),
    Levels(Vec<Vec<Value>>),
}

/// Work items for the iterative depth-first walk.
enum Frame {
    Enter(String),
    Emit(String),
}

/// A forest-structured container.
///
/// Invariant: every reachable node's cached depth equals its parent's
/// depth plus one (zero for roots); every add/delete/re-parent operation
/// refreshes the cached depths of the whole affected subtree.
#[derive(Debug)]
pub struct TreeMemory {
    core: MemoryCore<TreeItem>,
    roots: Vec<String>,
}

impl TreeMemory {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            core: MemoryCore::new(id),
            roots: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.core.id()
    }

    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.core.contains(key)
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Peek at a node without read side effects.
    pub fn node(&self, id: &str) -> Option<&TreeItem> {
        self.core.item(id)
    }

    /// Direct children of a node, in child-list order.
    pub fn children(&self, id: &str) -> Option<Vec<&TreeItem>> {
        let node = self.core.item(id)?;
        Some(
            node.children
                .iter()
                .filter_map(|c| self.core.item(c))
                .collect(),
        )
    }

    /// The parent node, or `None` for roots and unknown ids.
    pub fn parent(&self, id: &str) -> Option<&TreeItem> {
        let node = self.core.item(id)?;
        node.parent_id.as_deref().and_then(|p| self.core.item(p))
    }

    /// Add an item to the forest.
    ///
    /// Without a parent the item becomes a new root. A detached subtree
    /// (an item that already carries children present in this container)
    /// is re-attached with its cached depths refreshed. With a parent, the
    /// parent must already exist.
    pub fn add(
        &mut self,
        item: impl Into<TreeItem>,
        parent: Option<&str>,
    ) -> Result<String, MemoryError> {
        let mut node: TreeItem = item.into();
        node.parent_id = parent.map(str::to_string);

        match parent {
            None => {
                node.depth = 0;
                let id = self.core.insert(node)?;
                self.roots.push(id.clone());
                self.propagate_depths(&id);
                Ok(id)
            }
            Some(parent_id) => {
                if !self.core.owns(parent_id) {
                    return Err(MemoryError::item_not_found(parent_id, self.core.id()));
                }
                let id = self.core.insert(node)?;
                self.attach(parent_id, &id);
                Ok(id)
            }
        }
    }

    /// Detach a node from its parent and promote it to a root.
    ///
    /// With `recursive`, cached depths are refreshed through the whole
    /// subtree; otherwise descendants keep their stale depths.
    pub fn become_root(&mut self, id: &str, recursive: bool) -> Result<(), MemoryError> {
        let Some(node) = self.core.item(id) else {
            return Err(MemoryError::item_not_found(id, self.core.id()));
        };
        let old_parent = node.parent_id.clone();

        if let Some(parent_id) = old_parent {
            if let Some(parent) = self.core.item_mut(&parent_id) {
                parent.remove_child(id);
            }
        }
        if let Some(node) = self.core.item_mut(id) {
            node.parent_id = None;
            node.depth = 0;
        }
        if !self.roots.iter().any(|r| r == id) {
            self.roots.push(id.to_string());
        }
        if recursive {
            self.propagate_depths(id);
        }
        Ok(())
    }

    /// Traverse the subtree under `start` in the given order.
    ///
    /// An unknown start id yields an empty traversal. The result carries
    /// node contents; use [`TreeMemory::traverse_with`] to observe full
    /// nodes.
    pub fn traverse(&self, start: &str, order: TraverseOrder) -> Traversal {
        self.traverse_with(start, order, |_, _| {})
    }

    /// Traverse with a visitor invoked exactly once per visited node with
    /// `(current, parent)`.
    pub fn traverse_with<F>(&self, start: &str, order: TraverseOrder, mut visitor: F) -> Traversal
    where
        F: FnMut(&TreeItem, Option<&TreeItem>),
    {
        match order {
            TraverseOrder::Level => Traversal::Levels(self.level_walk(start, &mut visitor)),
            TraverseOrder::Pre | TraverseOrder::Post => {
                Traversal::Sequence(self.depth_walk(start, order, &mut visitor))
            }
        }
    }

    fn depth_walk<F>(&self, start: &str, order: TraverseOrder, visitor: &mut F) -> Vec<Value>
    where
        F: FnMut(&TreeItem, Option<&TreeItem>),
    {
        let mut out = Vec::new();
        let mut stack = vec![Frame::Enter(start.to_string())];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(id) => {
                    let Some(node) = self.core.item(&id) else {
                        continue;
                    };
                    visitor(node, self.parent(&id));
                    if order == TraverseOrder::Pre {
                        out.push(node.item.content.clone());
                    } else {
                        stack.push(Frame::Emit(id.clone()));
                    }
                    for child in node.children.iter().rev() {
                        stack.push(Frame::Enter(child.clone()));
                    }
                }
                Frame::Emit(id) => {
                    if let Some(node) = self.core.item(&id) {
                        out.push(node.item.content.clone());
                    }
                }
            }
        }
        out
    }

    fn level_walk<F>(&self, start: &str, visitor: &mut F) -> Vec<Vec<Value>>
    where
        F: FnMut(&TreeItem, Option<&TreeItem>),
    {
        let mut levels = Vec::new();
        if !self.core.owns(start) {
            return levels;
        }
        let mut queue = VecDeque::from([start.to_string()]);

        while !queue.is_empty() {
            let width = queue.len();
            let mut level = Vec::new();
            for _ in 0..width {
                let Some(id) = queue.pop_front() else {
                    break;
                };
                let Some(node) = self.core.item(&id) else {
                    continue;
                };
                visitor(node, self.parent(&id));
                level.push(node.item.content.clone());
                queue.extend(node.children.iter().cloned());
            }
            if !level.is_empty() {
                levels.push(level);
            }
        }
        levels
    }

    pub fn save(&self) -> Result<ContainerSnapshot, MemoryError> {
        let mut snapshot = self.core.snapshot(ContainerKind::Tree)?;
        snapshot.roots = Some(self.roots.clone());
        Ok(snapshot)
    }

    pub(crate) fn from_snapshot(snapshot: ContainerSnapshot) -> Result<Self, MemoryError> {
        if snapshot.kind != ContainerKind::Tree {
            return Err(MemoryError::Snapshot(format!(
                "expected a tree snapshot, got '{}'",
                snapshot.kind
            )));
        }
        let roots = snapshot
            .roots
            .ok_or_else(|| MemoryError::Snapshot("tree snapshot missing 'roots'".to_string()))?;
        Ok(Self {
            core: MemoryCore::from_snapshot_parts(snapshot.id, snapshot.items, snapshot.links)?,
            roots,
        })
    }

    /// Wire `child_id` under `parent_id` and refresh the subtree's cached
    /// depths.
    fn attach(&mut self, parent_id: &str, child_id: &str) {
        self.attach_at(parent_id, child_id, None);
    }

    /// Like `attach`, placing the child at a position in the parent's
    /// child list (appended when absent or past the end).
    fn attach_at(&mut self, parent_id: &str, child_id: &str, index: Option<usize>) {
        let Some(parent) = self.core.item_mut(parent_id) else {
            return;
        };
        if !parent.children.iter().any(|c| c == child_id) {
            match index {
                Some(index) => {
                    let index = index.min(parent.children.len());
                    parent.children.insert(index, child_id.to_string());
                }
                None => parent.children.push(child_id.to_string()),
            }
        }
        let parent_depth = parent.depth;
        if let Some(child) = self.core.item_mut(child_id) {
            child.parent_id = Some(parent_id.to_string());
            child.depth = parent_depth + 1;
        }
        self.propagate_depths(child_id);
    }

    /// Refresh cached depths (and parent pointers) below `start` with an
    /// explicit worklist.
    fn propagate_depths(&mut self, start: &str) {
        let mut worklist = vec![start.to_string()];
        while let Some(id) = worklist.pop() {
            let Some(node) = self.core.item(&id) else {
                continue;
            };
            let depth = node.depth;
            let children = node.children.clone();
            for child_id in children {
                if let Some(child) = self.core.item_mut(&child_id) {
                    child.parent_id = Some(id.clone());
                    child.depth = depth + 1;
                    worklist.push(child_id);
                }
            }
        }
    }

    /// Post-order walk returning `(id, children-at-collection-time)`
    /// pairs, children before parents. Used by subtree deletion.
    pub(crate) fn postorder_ids(&self, start: &str) -> Vec<(String, Vec<String>)> {
        let mut out = Vec::new();
        let mut stack = vec![Frame::Enter(start.to_string())];
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(id) => {
                    let Some(node) = self.core.item(&id) else {
                        continue;
                    };
                    stack.push(Frame::Emit(id.clone()));
                    for child in node.children.iter().rev() {
                        stack.push(Frame::Enter(child.clone()));
                    }
                }
                Frame::Emit(id) => {
                    if let Some(node) = self.core.item(&id) {
                        out.push((id, node.children.clone()));
                    }
                }
            }
        }
        out
    }

    /// Remove one node without touching its children's parent pointers;
    /// detaches the node from its parent's child list or the root set.
    /// Used by subtree deletion, where the children go first.
    pub(crate) fn remove_plain(&mut self, id: &str) -> bool {
        let Some(node) = self.core.item(id) else {
            return false;
        };
        let parent_id = node.parent_id.clone();
        if self.core.remove_item(id).is_none() {
            return false;
        }
        match parent_id {
            Some(parent_id) => {
                if let Some(parent) = self.core.item_mut(&parent_id) {
                    parent.remove_child(id);
                }
            }
            None => self.roots.retain(|r| r != id),
        }
        true
    }

    /// Remove a node with lift semantics: its children re-parent onto the
    /// node's own parent, or become roots if the node was a root. Depths
    /// are recomputed for each promoted subtree. Bookkeeping mutates only
    /// after the item removal succeeds.
    pub(crate) fn remove_lift(&mut self, id: &str) -> bool {
        let Some(node) = self.core.item(id) else {
            return false;
        };
        let parent_id = node.parent_id.clone();
        let children = node.children.clone();
        if self.core.remove_item(id).is_none() {
            return false;
        }

        let live_parent = parent_id.filter(|p| self.core.owns(p));
        match live_parent {
            Some(parent_id) => {
                // Lifted children take the deleted node's position in the
                // parent's child list, preserving sibling order.
                let mut slot = None;
                if let Some(parent) = self.core.item_mut(&parent_id) {
                    slot = parent.children.iter().position(|c| c == id);
                    parent.remove_child(id);
                }
                for (offset, child) in children.iter().enumerate() {
                    self.attach_at(&parent_id, child, slot.map(|s| s + offset));
                }
            }
            None => {
                self.roots.retain(|r| r != id);
                for child in &children {
                    if let Some(node) = self.core.item_mut(child) {
                        node.parent_id = None;
                        node.depth = 0;
                    } else {
                        continue;
                    }
                    if !self.roots.iter().any(|r| r == child) {
                        self.roots.push(child.clone());
                    }
                    self.propagate_depths(child);
                }
            }
        }
        true
    }

    pub(crate) fn core(&self) -> &MemoryCore<TreeItem> {
        &self.core
    }

    pub(crate) fn core_mut(&mut self) -> &mut MemoryCore<TreeItem> {
        &mut self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memlink_types::item::MemoryItem;
    use serde_json::json;

    fn item(content: &str, id: &str) -> MemoryItem {
        MemoryItem::new(content, "test").with_id(id)
    }

    /// Root `r` with children `a`, `b`; `a` has child `c`.
    fn sample_tree() -> TreeMemory {
        let mut tree = TreeMemory::new("t");
        tree.add(item("R", "r"), None).unwrap();
        tree.add(item("A", "a"), Some("r")).unwrap();
        tree.add(item("B", "b"), Some("r")).unwrap();
        tree.add(item("C", "c"), Some("a")).unwrap();
        tree
    }

    #[test]
    fn test_add_root_and_child_depths() {
        let tree = sample_tree();
        assert_eq!(tree.roots(), &["r".to_string()]);
        assert_eq!(tree.node("r").unwrap().depth, 0);
        assert_eq!(tree.node("a").unwrap().depth, 1);
        assert_eq!(tree.node("c").unwrap().depth, 2);
        assert_eq!(
            tree.node("r").unwrap().children,
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_add_with_missing_parent_fails() {
        let mut tree = TreeMemory::new("t");
        let err = tree.add(item("X", "x"), Some("ghost")).unwrap_err();
        assert!(matches!(err, MemoryError::ItemNotFound { .. }));
        assert!(!tree.contains("x"));
    }

    #[test]
    fn test_traverse_orders() {
        let tree = sample_tree();
        assert_eq!(
            tree.traverse("r", TraverseOrder::Pre),
            Traversal::Sequence(vec![json!("R"), json!("A"), json!("C"), json!("B")])
        );
        assert_eq!(
            tree.traverse("r", TraverseOrder::Post),
            Traversal::Sequence(vec![json!("C"), json!("A"), json!("B"), json!("R")])
        );
        assert_eq!(
            tree.traverse("r", TraverseOrder::Level),
            Traversal::Levels(vec![
                vec![json!("R")],
                vec![json!("A"), json!("B")],
                vec![json!("C")],
            ])
        );
    }

    #[test]
    fn test_traverse_unknown_start_is_empty() {
        let tree = sample_tree();
        assert_eq!(
            tree.traverse("ghost", TraverseOrder::Pre),
            Traversal::Sequence(vec![])
        );
        assert_eq!(
            tree.traverse("ghost", TraverseOrder::Level),
            Traversal::Levels(vec![])
        );
    }

    #[test]
    fn test_visitor_sees_each_node_once_with_parent() {
        let tree = sample_tree();
        let mut seen = Vec::new();
        tree.traverse_with("r", TraverseOrder::Pre, |node, parent| {
            seen.push((
                node.item.id.clone(),
                parent.map(|p| p.item.id.clone()),
            ));
        });
        assert_eq!(
            seen,
            vec![
                ("r".to_string(), None),
                ("a".to_string(), Some("r".to_string())),
                ("c".to_string(), Some("a".to_string())),
                ("b".to_string(), Some("r".to_string())),
            ]
        );
    }

    #[test]
    fn test_become_root_detaches_and_refreshes_depths() {
        let mut tree = sample_tree();
        tree.become_root("a", true).unwrap();
        assert!(tree.node("a").unwrap().is_root());
        assert_eq!(tree.node("a").unwrap().depth, 0);
        assert_eq!(tree.node("c").unwrap().depth, 1);
        assert_eq!(tree.node("r").unwrap().children, vec!["b".to_string()]);
        assert!(tree.roots().contains(&"a".to_string()));
    }

    #[test]
    fn test_remove_lift_reparents_children() {
        let mut tree = sample_tree();
        assert!(tree.remove_lift("a"));
        // C takes A's position among R's children.
        let r = tree.node("r").unwrap();
        assert_eq!(r.children, vec!["c".to_string(), "b".to_string()]);
        let c = tree.node("c").unwrap();
        assert_eq!(c.parent_id.as_deref(), Some("r"));
        assert_eq!(c.depth, 1);
    }

    #[test]
    fn test_remove_lift_of_root_promotes_children() {
        let mut tree = sample_tree();
        assert!(tree.remove_lift("r"));
        let mut roots = tree.roots().to_vec();
        roots.sort();
        assert_eq!(roots, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(tree.node("a").unwrap().depth, 0);
        assert_eq!(tree.node("c").unwrap().depth, 1);
    }

    #[test]
    fn test_reattach_detached_subtree_as_root() {
        let mut tree = sample_tree();
        // Detach `a` (keeping its child list) and re-add it as a root.
        let mut detached = tree.node("a").unwrap().clone();
        assert!(tree.remove_plain("a"));
        detached.item.state = memlink_types::item::ItemState::Normal;
        tree.add(detached, None).unwrap();
        assert_eq!(tree.node("a").unwrap().depth, 0);
        assert_eq!(tree.node("c").unwrap().depth, 1);
        assert_eq!(tree.node("c").unwrap().parent_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_save_load_roundtrip_preserves_structure() {
        let tree = sample_tree();
        let snapshot = tree.save().unwrap();
        let restored = TreeMemory::from_snapshot(snapshot).unwrap();
        assert_eq!(restored.roots(), &["r".to_string()]);
        assert_eq!(
            restored.node("r").unwrap().children,
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(restored.node("c").unwrap().depth, 2);
        assert_eq!(restored.node("c").unwrap().item.content, json!("C"));
    }
}
