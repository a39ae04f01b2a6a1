//! Tree-structured memory items: a `MemoryItem` plus parent/child
//! bookkeeping and a cached depth.

use serde::{Deserialize, Serialize};

use crate::item::MemoryItem;

/// A memory item participating in a forest.
///
/// Invariant: `depth` equals the parent's depth plus one, or zero for a
/// root. The owning tree container refreshes cached depths on every
/// re-parenting operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeItem {
    #[serde(flatten)]
    pub item: MemoryItem,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub depth: u32,
}

impl TreeItem {
    pub fn new(item: MemoryItem) -> Self {
        Self {
            item,
            parent_id: None,
            children: Vec::new(),
            depth: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Drop `child_id` from the child list if present.
    pub fn remove_child(&mut self, child_id: &str) {
        self.children.retain(|c| c != child_id);
    }
}

impl From<MemoryItem> for TreeItem {
    fn from(item: MemoryItem) -> Self {
        TreeItem::new(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_and_leaf_flags() {
        let mut node = TreeItem::new(MemoryItem::new("root", "test"));
        assert!(node.is_root());
        assert!(node.is_leaf());
        node.children.push("c1".to_string());
        node.parent_id = Some("p".to_string());
        assert!(!node.is_root());
        assert!(!node.is_leaf());
    }

    #[test]
    fn test_remove_child() {
        let mut node = TreeItem::new(MemoryItem::new("root", "test"));
        node.children = vec!["a".to_string(), "b".to_string()];
        node.remove_child("a");
        assert_eq!(node.children, vec!["b".to_string()]);
        // Removing an absent child is a no-op.
        node.remove_child("zzz");
        assert_eq!(node.children, vec!["b".to_string()]);
    }

    #[test]
    fn test_serde_flattens_base_item() {
        let node = TreeItem {
            item: MemoryItem::new(json!("x"), "test").with_id("n1"),
            parent_id: Some("p1".to_string()),
            children: vec!["c1".to_string()],
            depth: 2,
        };
        let value = serde_json::to_value(&node).unwrap();
        // Base item fields sit at the top level next to the tree fields.
        assert_eq!(value["id"], json!("n1"));
        assert_eq!(value["parent_id"], json!("p1"));
        assert_eq!(value["depth"], json!(2));
        let back: TreeItem = serde_json::from_value(value).unwrap();
        assert_eq!(back, node);
    }
}
