//! The generic container core shared by every specialization: exclusive
//! item ownership, the forward link table, and the reverse link index.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use std::collections::BTreeMap;

use memlink_types::error::MemoryError;
use memlink_types::item::{HistoryAction, ItemRead, ItemState, ItemWrite, MemoryItem, ModifyProtocol};
use memlink_types::snapshot::{ContainerKind, ContainerSnapshot, LinkTarget};
use memlink_types::tree::TreeItem;

use super::{ReadOutcome, WriteOutcome};

/// Seam between the generic core and its item type.
///
/// The tree specialization stores `TreeItem` records; everything else
/// stores plain `MemoryItem`s. Link resolution and protocol handling only
/// ever touch the base item view.
pub(crate) trait Record: Clone + Serialize + DeserializeOwned {
    fn item(&self) -> &MemoryItem;
    fn item_mut(&mut self) -> &mut MemoryItem;
}

impl Record for MemoryItem {
    fn item(&self) -> &MemoryItem {
        self
    }

    fn item_mut(&mut self) -> &mut MemoryItem {
        self
    }
}

impl Record for TreeItem {
    fn item(&self) -> &MemoryItem {
        &self.item
    }

    fn item_mut(&mut self) -> &mut MemoryItem {
        &mut self.item
    }
}

/// One reverse-index entry on an owning container: a remote container
/// holds a link under `remote_key` pointing (possibly through hops) at
/// the local item `item_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReverseEntry {
    pub remote_key: String,
    pub item_id: String,
}

/// Invariants: a local key is present in at most one of `items`/`links`;
/// every forward link entry has exactly one matching reverse entry on the
/// resolved owner, maintained in the same registry operation.
#[derive(Debug)]
pub(crate) struct MemoryCore<T> {
    id: String,
    items: BTreeMap<String, T>,
    links: BTreeMap<String, LinkTarget>,
    reverse_links: BTreeMap<String, Vec<ReverseEntry>>,
}

impl<T: Record> MemoryCore<T> {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            items: BTreeMap::new(),
            links: BTreeMap::new(),
            reverse_links: BTreeMap::new(),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    /// Locally visible entries: owned items plus links.
    pub(crate) fn len(&self) -> usize {
        self.items.len() + self.links.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty() && self.links.is_empty()
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key) || self.links.contains_key(key)
    }

    pub(crate) fn owns(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub(crate) fn link_target(&self, key: &str) -> Option<&LinkTarget> {
        self.links.get(key)
    }

    pub(crate) fn item(&self, id: &str) -> Option<&T> {
        self.items.get(id)
    }

    pub(crate) fn item_mut(&mut self, id: &str) -> Option<&mut T> {
        self.items.get_mut(id)
    }

    pub(crate) fn item_ids(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }

    pub(crate) fn link_keys(&self) -> Vec<String> {
        self.links.keys().cloned().collect()
    }

    pub(crate) fn forward_links(&self) -> Vec<(String, LinkTarget)> {
        self.links
            .iter()
            .map(|(k, t)| (k.clone(), t.clone()))
            .collect()
    }

    /// Take ownership of a record, transitioning it writing -> normal and
    /// recording an `added` history entry.
    pub(crate) fn insert(&mut self, mut record: T) -> Result<String, MemoryError> {
        let id = record.item().id.clone();
        if self.contains(&id) {
            return Err(MemoryError::duplicate_item(&id, &self.id));
        }
        record.item_mut().state = ItemState::Writing;
        self.items.insert(id.clone(), record);
        if let Some(stored) = self.items.get_mut(&id) {
            let item = stored.item_mut();
            item.state = ItemState::Normal;
            item.record_history(HistoryAction::Added, None, None);
        }
        Ok(id)
    }

    /// Remove an owned item, marking it expired and logging the deletion
    /// before it leaves the container.
    pub(crate) fn remove_item(&mut self, id: &str) -> Option<T> {
        let mut record = self.items.remove(id)?;
        let item = record.item_mut();
        item.state = ItemState::Expired;
        item.record_history(HistoryAction::Deleted, None, None);
        Some(record)
    }

    pub(crate) fn insert_link(&mut self, key: String, target: LinkTarget) {
        self.links.insert(key, target);
    }

    pub(crate) fn remove_link(&mut self, key: &str) -> Option<LinkTarget> {
        self.links.remove(key)
    }

    pub(crate) fn add_reverse(&mut self, remote: &str, entry: ReverseEntry) {
        self.reverse_links
            .entry(remote.to_string())
            .or_default()
            .push(entry);
    }

    pub(crate) fn remove_reverse(&mut self, remote: &str, remote_key: &str) {
        if let Some(entries) = self.reverse_links.get_mut(remote) {
            entries.retain(|e| e.remote_key != remote_key);
            if entries.is_empty() {
                self.reverse_links.remove(remote);
            }
        }
    }

    /// Drain every reverse entry recorded for `item_id`, returning
    /// `(remote container, remote key)` pairs for cascading invalidation.
    pub(crate) fn take_reverse_for(&mut self, item_id: &str) -> Vec<(String, String)> {
        let mut taken = Vec::new();
        self.reverse_links.retain(|remote, entries| {
            entries.retain(|e| {
                if e.item_id == item_id {
                    taken.push((remote.clone(), e.remote_key.clone()));
                    false
                } else {
                    true
                }
            });
            !entries.is_empty()
        });
        taken
    }

    pub(crate) fn clear_reverse(&mut self) {
        self.reverse_links.clear();
    }

    /// Read an owned item, honoring its protocols. `None` means the id is
    /// not owned here.
    pub(crate) fn read_owned(
        &mut self,
        id: &str,
        reader: Option<&str>,
        with_meta: bool,
        accessed_via: Option<&str>,
    ) -> Option<ReadOutcome> {
        let record = self.items.get_mut(id)?;
        match record.item_mut().read(reader, accessed_via) {
            ItemRead::Denied(state) => Some(ReadOutcome::Denied(state)),
            ItemRead::Content(content) => {
                if with_meta {
                    Some(ReadOutcome::Item(Box::new(record.item().clone())))
                } else {
                    Some(ReadOutcome::Content(content))
                }
            }
        }
    }

    /// Modify an owned item, honoring its protocols.
    pub(crate) fn modify_owned(
        &mut self,
        id: &str,
        new_content: Value,
        modifier: Option<&str>,
        protocol: Option<ModifyProtocol>,
        accessed_via: Option<&str>,
    ) -> Result<WriteOutcome, MemoryError> {
        let Some(record) = self.items.get_mut(id) else {
            return Err(MemoryError::item_not_found(id, &self.id));
        };
        match record
            .item_mut()
            .modify(new_content, modifier, protocol, accessed_via)?
        {
            ItemWrite::Applied => Ok(WriteOutcome::Applied),
            ItemWrite::Denied(state) => Ok(WriteOutcome::Denied(state)),
        }
    }

    /// Structural snapshot: items and forward links, never the reverse
    /// index.
    pub(crate) fn snapshot(&self, kind: ContainerKind) -> Result<ContainerSnapshot, MemoryError> {
        let mut items = BTreeMap::new();
        for (id, record) in &self.items {
            let value =
                serde_json::to_value(record).map_err(|e| MemoryError::Snapshot(e.to_string()))?;
            items.insert(id.clone(), value);
        }
        Ok(ContainerSnapshot {
            id: self.id.clone(),
            kind,
            items,
            links: self.links.clone(),
            order: None,
            roots: None,
        })
    }

    /// Rebuild a core from snapshot parts. The reverse index starts empty;
    /// `MemoryRegistry::rebuild_reverse_links` restores it after a bulk
    /// load.
    pub(crate) fn from_snapshot_parts(
        id: String,
        items: BTreeMap<String, Value>,
        links: BTreeMap<String, LinkTarget>,
    ) -> Result<Self, MemoryError> {
        let mut restored = BTreeMap::new();
        for (key, value) in items {
            let record: T = serde_json::from_value(value)
                .map_err(|e| MemoryError::Snapshot(format!("item '{key}': {e}")))?;
            restored.insert(key, record);
        }
        Ok(Self {
            id,
            items: restored,
            links,
            reverse_links: BTreeMap::new(),
        })
    }
}
