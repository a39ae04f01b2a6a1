//! Ordered (list-like) containers: an explicit key sequence kept in sync
//! with the base maps.

use memlink_types::error::MemoryError;
use memlink_types::item::MemoryItem;
use memlink_types::snapshot::{ContainerKind, ContainerSnapshot, LinkTarget};

use super::base::MemoryCore;

/// A container maintaining an explicit order over its local keys.
///
/// Both owned items and links participate in the order. An order entry is
/// removed only after the corresponding base-level delete succeeds.
#[derive(Debug)]
pub struct OrderedMemory {
    core: MemoryCore<MemoryItem>,
    order: Vec<String>,
}

impl OrderedMemory {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            core: MemoryCore::new(id),
            order: Vec::new(),
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

    /// Append an item.
    pub fn push(&mut self, item: MemoryItem) -> Result<String, MemoryError> {
        let id = self.core.insert(item)?;
        self.order.push(id.clone());
        Ok(id)
    }

    /// Insert an item at a position; positions past the end append.
    pub fn insert(&mut self, index: usize, item: MemoryItem) -> Result<String, MemoryError> {
        let id = self.core.insert(item)?;
        let index = index.min(self.order.len());
        self.order.insert(index, id.clone());
        Ok(id)
    }

    /// The local key at a position.
    pub fn key_at(&self, index: usize) -> Option<&str> {
        self.order.get(index).map(String::as_str)
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.order.iter().position(|k| k == key)
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Peek at an owned item without read side effects.
    pub fn get(&self, key: &str) -> Option<&MemoryItem> {
        self.core.item(key)
    }

    pub fn save(&self) -> Result<ContainerSnapshot, MemoryError> {
        let mut snapshot = self.core.snapshot(ContainerKind::Ordered)?;
        snapshot.order = Some(self.order.clone());
        Ok(snapshot)
    }

    pub(crate) fn from_snapshot(snapshot: ContainerSnapshot) -> Result<Self, MemoryError> {
        if snapshot.kind != ContainerKind::Ordered {
            return Err(MemoryError::Snapshot(format!(
                "expected an ordered snapshot, got '{}'",
                snapshot.kind
            )));
        }
        let order = snapshot
            .order
            .ok_or_else(|| MemoryError::Snapshot("ordered snapshot missing 'order'".to_string()))?;
        Ok(Self {
            core: MemoryCore::from_snapshot_parts(snapshot.id, snapshot.items, snapshot.links)?,
            order,
        })
    }

    /// Remove an owned item and, on success, its order entry.
    pub(crate) fn remove_owned(&mut self, id: &str) -> bool {
        if self.core.remove_item(id).is_none() {
            return false;
        }
        self.order.retain(|k| k != id);
        true
    }

    /// Record a forward link and place its key in the order.
    pub(crate) fn record_link(&mut self, key: String, target: LinkTarget, index: Option<usize>) {
        self.core.insert_link(key.clone(), target);
        match index {
            Some(index) => {
                let index = index.min(self.order.len());
                self.order.insert(index, key);
            }
            None => self.order.push(key),
        }
    }

    /// Remove a forward link and its order entry.
    pub(crate) fn remove_link_entry(&mut self, key: &str) -> Option<LinkTarget> {
        let target = self.core.remove_link(key)?;
        self.order.retain(|k| k != key);
        Some(target)
    }

    pub(crate) fn core(&self) -> &MemoryCore<MemoryItem> {
        &self.core
    }

    pub(crate) fn core_mut(&mut self) -> &mut MemoryCore<MemoryItem> {
        &mut self.core
    }
}
