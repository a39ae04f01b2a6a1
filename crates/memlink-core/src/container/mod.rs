//! Containers: addressable collections owning items plus link tables into
//! other containers.
//!
//! Three specializations share one generic core (`MemoryCore`): keyed
//! (dict-like), ordered (list-like), and tree (forest with parent/child
//! bookkeeping). The [`Container`] enum is the closed set the registry
//! dispatches over.

mod base;
mod keyed;
mod ordered;
mod tree;

pub use keyed::KeyedMemory;
pub use ordered::OrderedMemory;
pub use tree::{TraverseOrder, Traversal, TreeMemory};

pub(crate) use base::ReverseEntry;

use serde_json::Value;

use memlink_types::error::MemoryError;
use memlink_types::item::{ItemState, MemoryItem, ModifyProtocol};
use memlink_types::snapshot::{ContainerKind, ContainerSnapshot, LinkTarget};

/// Result of a resolved read.
///
/// Misses surface as `Err(MemoryError::ItemNotFound)` on the registry;
/// state violations surface here as `Denied` so probing callers can tell
/// "gone" from "present but unreadable".
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Content(Value),
    /// Full item metadata, for meta reads. Always the base item view;
    /// tree bookkeeping (parent, children, depth) is available through
    /// [`TreeMemory::node`] instead.
    Item(Box<MemoryItem>),
    Denied(ItemState),
}

impl ReadOutcome {
    /// The readable content, if the read succeeded.
    pub fn into_content(self) -> Option<Value> {
        match self {
            ReadOutcome::Content(value) => Some(value),
            ReadOutcome::Item(item) => Some(item.content),
            ReadOutcome::Denied(_) => None,
        }
    }
}

/// Result of a resolved modify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The item exists but its state forbids writes.
    Denied(ItemState),
    /// The identifier names a link and the call did not request
    /// forwarding to the owner.
    Linked,
}

impl WriteOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied)
    }
}

/// The closed set of container specializations.
#[derive(Debug)]
pub enum Container {
    Keyed(KeyedMemory),
    Ordered(OrderedMemory),
    Tree(TreeMemory),
}

impl Container {
    pub fn id(&self) -> &str {
        match self {
            Container::Keyed(c) => c.id(),
            Container::Ordered(c) => c.id(),
            Container::Tree(c) => c.id(),
        }
    }

    pub fn kind(&self) -> ContainerKind {
        match self {
            Container::Keyed(_) => ContainerKind::Keyed,
            Container::Ordered(_) => ContainerKind::Ordered,
            Container::Tree(_) => ContainerKind::Tree,
        }
    }

    /// Count of locally visible entries (owned + linked).
    pub fn len(&self) -> usize {
        match self {
            Container::Keyed(c) => c.len(),
            Container::Ordered(c) => c.len(),
            Container::Tree(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        match self {
            Container::Keyed(c) => c.contains(key),
            Container::Ordered(c) => c.contains(key),
            Container::Tree(c) => c.contains(key),
        }
    }

    pub(crate) fn owns(&self, id: &str) -> bool {
        match self {
            Container::Keyed(c) => c.core().owns(id),
            Container::Ordered(c) => c.core().owns(id),
            Container::Tree(c) => c.core().owns(id),
        }
    }

    pub(crate) fn link_target(&self, key: &str) -> Option<LinkTarget> {
        match self {
            Container::Keyed(c) => c.core().link_target(key).cloned(),
            Container::Ordered(c) => c.core().link_target(key).cloned(),
            Container::Tree(c) => c.core().link_target(key).cloned(),
        }
    }

    /// Local keys in retrieval order: owned items then links, except
    /// ordered containers, which use their explicit order list.
    pub(crate) fn visible_keys(&self) -> Vec<String> {
        match self {
            Container::Ordered(c) => c.order().to_vec(),
            Container::Keyed(c) => {
                let mut keys = c.core().item_ids();
                keys.extend(c.core().link_keys());
                keys
            }
            Container::Tree(c) => {
                let mut keys = c.core().item_ids();
                keys.extend(c.core().link_keys());
                keys
            }
        }
    }

    /// Record a forward link entry. Ordered containers also place the key
    /// in their order list, at `index` when given.
    pub(crate) fn record_link(&mut self, key: String, target: LinkTarget, index: Option<usize>) {
        match self {
            Container::Keyed(c) => c.core_mut().insert_link(key, target),
            Container::Tree(c) => c.core_mut().insert_link(key, target),
            Container::Ordered(c) => c.record_link(key, target, index),
        }
    }

    /// Remove a forward link entry and any order bookkeeping for it.
    pub(crate) fn remove_link_entry(&mut self, key: &str) -> Option<LinkTarget> {
        match self {
            Container::Keyed(c) => c.core_mut().remove_link(key),
            Container::Tree(c) => c.core_mut().remove_link(key),
            Container::Ordered(c) => c.remove_link_entry(key),
        }
    }

    pub(crate) fn add_reverse(&mut self, remote: &str, entry: ReverseEntry) {
        match self {
            Container::Keyed(c) => c.core_mut().add_reverse(remote, entry),
            Container::Ordered(c) => c.core_mut().add_reverse(remote, entry),
            Container::Tree(c) => c.core_mut().add_reverse(remote, entry),
        }
    }

    pub(crate) fn remove_reverse(&mut self, remote: &str, remote_key: &str) {
        match self {
            Container::Keyed(c) => c.core_mut().remove_reverse(remote, remote_key),
            Container::Ordered(c) => c.core_mut().remove_reverse(remote, remote_key),
            Container::Tree(c) => c.core_mut().remove_reverse(remote, remote_key),
        }
    }

    pub(crate) fn take_reverse_for(&mut self, item_id: &str) -> Vec<(String, String)> {
        match self {
            Container::Keyed(c) => c.core_mut().take_reverse_for(item_id),
            Container::Ordered(c) => c.core_mut().take_reverse_for(item_id),
            Container::Tree(c) => c.core_mut().take_reverse_for(item_id),
        }
    }

    pub(crate) fn clear_reverse(&mut self) {
        match self {
            Container::Keyed(c) => c.core_mut().clear_reverse(),
            Container::Ordered(c) => c.core_mut().clear_reverse(),
            Container::Tree(c) => c.core_mut().clear_reverse(),
        }
    }

    pub(crate) fn forward_links(&self) -> Vec<(String, LinkTarget)> {
        match self {
            Container::Keyed(c) => c.core().forward_links(),
            Container::Ordered(c) => c.core().forward_links(),
            Container::Tree(c) => c.core().forward_links(),
        }
    }

    pub(crate) fn link_keys(&self) -> Vec<String> {
        match self {
            Container::Keyed(c) => c.core().link_keys(),
            Container::Ordered(c) => c.core().link_keys(),
            Container::Tree(c) => c.core().link_keys(),
        }
    }

    pub(crate) fn item_ids(&self) -> Vec<String> {
        match self {
            Container::Keyed(c) => c.core().item_ids(),
            Container::Ordered(c) => c.core().item_ids(),
            Container::Tree(c) => c.core().item_ids(),
        }
    }

    pub(crate) fn read_owned(
        &mut self,
        id: &str,
        reader: Option<&str>,
        with_meta: bool,
        accessed_via: Option<&str>,
    ) -> Option<ReadOutcome> {
        match self {
            Container::Keyed(c) => c.core_mut().read_owned(id, reader, with_meta, accessed_via),
            Container::Ordered(c) => c.core_mut().read_owned(id, reader, with_meta, accessed_via),
            Container::Tree(c) => c.core_mut().read_owned(id, reader, with_meta, accessed_via),
        }
    }

    pub(crate) fn modify_owned(
        &mut self,
        id: &str,
        new_content: Value,
        modifier: Option<&str>,
        protocol: Option<ModifyProtocol>,
        accessed_via: Option<&str>,
    ) -> Result<WriteOutcome, MemoryError> {
        match self {
            Container::Keyed(c) => {
                c.core_mut()
                    .modify_owned(id, new_content, modifier, protocol, accessed_via)
            }
            Container::Ordered(c) => {
                c.core_mut()
                    .modify_owned(id, new_content, modifier, protocol, accessed_via)
            }
            Container::Tree(c) => {
                c.core_mut()
                    .modify_owned(id, new_content, modifier, protocol, accessed_via)
            }
        }
    }

    /// Remove an owned item with kind-specific bookkeeping: ordered
    /// containers drop the order entry, tree containers lift children onto
    /// the deleted node's parent. Cascading invalidation is the registry's
    /// job and happens before this call.
    pub(crate) fn remove_owned(&mut self, id: &str) -> bool {
        match self {
            Container::Keyed(c) => c.core_mut().remove_item(id).is_some(),
            Container::Ordered(c) => c.remove_owned(id),
            Container::Tree(c) => c.remove_lift(id),
        }
    }

    /// Structural snapshot of this container.
    pub fn save(&self) -> Result<ContainerSnapshot, MemoryError> {
        match self {
            Container::Keyed(c) => c.save(),
            Container::Ordered(c) => c.save(),
            Container::Tree(c) => c.save(),
        }
    }

    /// Reconstruct a container from a snapshot. The reverse index is not
    /// persisted; call `MemoryRegistry::rebuild_reverse_links` after a
    /// bulk load.
    pub fn from_snapshot(snapshot: ContainerSnapshot) -> Result<Self, MemoryError> {
        match snapshot.kind {
            ContainerKind::Keyed => KeyedMemory::from_snapshot(snapshot).map(Container::Keyed),
            ContainerKind::Ordered => {
                OrderedMemory::from_snapshot(snapshot).map(Container::Ordered)
            }
            ContainerKind::Tree => TreeMemory::from_snapshot(snapshot).map(Container::Tree),
        }
    }
}
