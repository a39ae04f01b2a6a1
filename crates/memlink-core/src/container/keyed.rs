//! Keyed (dict-like) containers: lookups by caller-chosen semantic key.

use memlink_types::error::MemoryError;
use memlink_types::item::MemoryItem;
use memlink_types::snapshot::{ContainerKind, ContainerSnapshot};

use super::base::MemoryCore;

/// A container addressed by semantic keys.
///
/// `add_with_key` rewrites the item id to the caller's key before
/// insertion, so later lookups use the key rather than a generated id.
#[derive(Debug)]
pub struct KeyedMemory {
    core: MemoryCore<MemoryItem>,
}

impl KeyedMemory {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            core: MemoryCore::new(id),
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

    /// Add an item under its own id.
    pub fn add(&mut self, item: MemoryItem) -> Result<String, MemoryError> {
        self.core.insert(item)
    }

    /// Add an item under an explicit key; the key becomes the item id.
    pub fn add_with_key(
        &mut self,
        key: impl Into<String>,
        item: MemoryItem,
    ) -> Result<String, MemoryError> {
        self.core.insert(item.with_id(key))
    }

    /// Peek at an owned item without read side effects.
    pub fn get(&self, key: &str) -> Option<&MemoryItem> {
        self.core.item(key)
    }

    pub fn save(&self) -> Result<ContainerSnapshot, MemoryError> {
        self.core.snapshot(ContainerKind::Keyed)
    }

    pub(crate) fn from_snapshot(snapshot: ContainerSnapshot) -> Result<Self, MemoryError> {
        if snapshot.kind != ContainerKind::Keyed {
            return Err(MemoryError::Snapshot(format!(
                "expected a keyed snapshot, got '{}'",
                snapshot.kind
            )));
        }
        Ok(Self {
            core: MemoryCore::from_snapshot_parts(snapshot.id, snapshot.items, snapshot.links)?,
        })
    }

    pub(crate) fn core(&self) -> &MemoryCore<MemoryItem> {
        &self.core
    }

    pub(crate) fn core_mut(&mut self) -> &mut MemoryCore<MemoryItem> {
        &mut self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_with_key_rewrites_id() {
        let mut mem = KeyedMemory::new("notes");
        let id = mem
            .add_with_key("pinned", MemoryItem::new("x", "test"))
            .unwrap();
        assert_eq!(id, "pinned");
        assert_eq!(mem.get("pinned").unwrap().content, json!("x"));
    }

    #[test]
    fn test_add_with_duplicate_key_fails() {
        let mut mem = KeyedMemory::new("notes");
        mem.add_with_key("k", MemoryItem::new("a", "test")).unwrap();
        let err = mem
            .add_with_key("k", MemoryItem::new("b", "test"))
            .unwrap_err();
        assert!(matches!(err, MemoryError::DuplicateItem { .. }));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut mem = KeyedMemory::new("notes");
        mem.add_with_key("k", MemoryItem::new(json!({"n": 1}), "test"))
            .unwrap();
        let snapshot = mem.save().unwrap();
        let restored = KeyedMemory::from_snapshot(snapshot).unwrap();
        assert_eq!(restored.id(), "notes");
        assert_eq!(restored.get("k").unwrap().content, json!({"n": 1}));
    }
}
