//! The registry: exclusive owner of every container and the only place
//! cross-container state (link resolution, the reverse index, cascading
//! invalidation) is touched.
//!
//! All bookkeeping for one operation completes before the call returns,
//! so forward links and reverse entries never disagree between calls.

use serde_json::Value;
use tracing::{debug, warn};

use std::collections::{BTreeMap, HashSet};

use memlink_types::error::MemoryError;
use memlink_types::item::ModifyProtocol;
use memlink_types::snapshot::{ContainerKind, ContainerSnapshot, LinkTarget};

use crate::container::{
    Container, KeyedMemory, OrderedMemory, ReadOutcome, ReverseEntry, TreeMemory, WriteOutcome,
};

/// Options for a registry read.
#[derive(Debug, Clone, Default)]
pub struct ReadRequest {
    /// Recorded as the item's last reader.
    pub reader: Option<String>,
    /// Return the full item instead of just its content.
    pub with_meta: bool,
}

/// Options for a registry modify.
#[derive(Debug, Clone, Default)]
pub struct ModifyRequest {
    /// Recorded as the item's last modifier; defaults to the calling
    /// container's id.
    pub modifier: Option<String>,
    /// Follow links to the owning item. Without this, modifying a link
    /// key is refused with [`WriteOutcome::Linked`].
    pub recursive: bool,
    /// Override the item's own modify protocol for this call.
    pub protocol: Option<ModifyProtocol>,
}

/// Options for a registry delete.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteRequest {
    /// Follow links and delete the owning item. Without this, deleting a
    /// link key only revokes the link.
    pub recursive: bool,
    /// For tree containers: delete the whole subtree instead of lifting
    /// children onto the deleted node's parent.
    pub with_children: bool,
}

/// Owner and access point for a set of named containers.
///
/// Container ids are unique; every cross-container operation routes
/// through the registry so it can resolve link chains and keep the
/// reverse index consistent with the forward link tables.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    containers: BTreeMap<String, Container>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a container. Re-registering an id is an error;
    /// `unregister` first to replace.
    pub fn register(&mut self, container: Container) -> Result<(), MemoryError> {
        let id = container.id().to_string();
        if self.containers.contains_key(&id) {
            return Err(MemoryError::DuplicateContainer(id));
        }
        self.containers.insert(id, container);
        Ok(())
    }

    /// Remove a container, returning it. Links elsewhere that point into
    /// the removed container go stale; resolution reports them as missing.
    pub fn unregister(&mut self, id: &str) -> Option<Container> {
        self.containers.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Container> {
        self.containers.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.containers.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.containers.keys().cloned().collect()
    }

    /// Register a fresh keyed container and hand back direct access.
    pub fn create_keyed(&mut self, id: impl Into<String>) -> Result<&mut KeyedMemory, MemoryError> {
        let id = id.into();
        self.register(Container::Keyed(KeyedMemory::new(id.clone())))?;
        self.keyed_mut(&id)
    }

    pub fn create_ordered(
        &mut self,
        id: impl Into<String>,
    ) -> Result<&mut OrderedMemory, MemoryError> {
        let id = id.into();
        self.register(Container::Ordered(OrderedMemory::new(id.clone())))?;
        self.ordered_mut(&id)
    }

    pub fn create_tree(&mut self, id: impl Into<String>) -> Result<&mut TreeMemory, MemoryError> {
        let id = id.into();
        self.register(Container::Tree(TreeMemory::new(id.clone())))?;
        self.tree_mut(&id)
    }

    pub fn keyed(&self, id: &str) -> Result<&KeyedMemory, MemoryError> {
        match self.containers.get(id) {
            Some(Container::Keyed(c)) => Ok(c),
            Some(_) => Err(kind_mismatch(id, ContainerKind::Keyed)),
            None => Err(MemoryError::ContainerNotFound(id.to_string())),
        }
    }

    pub fn keyed_mut(&mut self, id: &str) -> Result<&mut KeyedMemory, MemoryError> {
        match self.containers.get_mut(id) {
            Some(Container::Keyed(c)) => Ok(c),
            Some(_) => Err(kind_mismatch(id, ContainerKind::Keyed)),
            None => Err(MemoryError::ContainerNotFound(id.to_string())),
        }
    }

    pub fn ordered(&self, id: &str) -> Result<&OrderedMemory, MemoryError> {
        match self.containers.get(id) {
            Some(Container::Ordered(c)) => Ok(c),
            Some(_) => Err(kind_mismatch(id, ContainerKind::Ordered)),
            None => Err(MemoryError::ContainerNotFound(id.to_string())),
        }
    }

    pub fn ordered_mut(&mut self, id: &str) -> Result<&mut OrderedMemory, MemoryError> {
        match self.containers.get_mut(id) {
            Some(Container::Ordered(c)) => Ok(c),
            Some(_) => Err(kind_mismatch(id, ContainerKind::Ordered)),
            None => Err(MemoryError::ContainerNotFound(id.to_string())),
        }
    }

    pub fn tree(&self, id: &str) -> Result<&TreeMemory, MemoryError> {
        match self.containers.get(id) {
            Some(Container::Tree(c)) => Ok(c),
            Some(_) => Err(kind_mismatch(id, ContainerKind::Tree)),
            None => Err(MemoryError::ContainerNotFound(id.to_string())),
        }
    }

    pub fn tree_mut(&mut self, id: &str) -> Result<&mut TreeMemory, MemoryError> {
        match self.containers.get_mut(id) {
            Some(Container::Tree(c)) => Ok(c),
            Some(_) => Err(kind_mismatch(id, ContainerKind::Tree)),
            None => Err(MemoryError::ContainerNotFound(id.to_string())),
        }
    }

    /// Follow the link chain from `(mem, identifier)` to the owning
    /// container, returning `(owner, item_id, accessed_via)`.
    ///
    /// `accessed_via` records the entry hop only (`"mem->identifier"`),
    /// set whenever at least one link was traversed. A dead end reports
    /// the location where the chain broke; a link cycle reports the first
    /// revisited hop as missing.
    fn resolve(
        &self,
        mem: &str,
        identifier: &str,
    ) -> Result<(String, String, Option<String>), MemoryError> {
        let mut container_id = mem.to_string();
        let mut key = identifier.to_string();
        let mut via = None;
        let mut visited = HashSet::new();

        loop {
            let Some(container) = self.containers.get(&container_id) else {
                return Err(MemoryError::ContainerNotFound(container_id));
            };
            if container.owns(&key) {
                return Ok((container_id, key, via));
            }
            let Some(target) = container.link_target(&key) else {
                return Err(MemoryError::item_not_found(&key, &container_id));
            };
            if via.is_none() {
                via = Some(format!("{mem}->{identifier}"));
            }
            if !visited.insert((container_id.clone(), key.clone())) {
                warn!(container = %container_id, key = %key, "link cycle detected");
                return Err(MemoryError::item_not_found(&key, &container_id));
            }
            container_id = target.container_id;
            key = target.item_id;
        }
    }

    /// Read through `(mem, identifier)`, resolving links to the owning
    /// item. Read side effects (count, burn, history) land on the owner.
    pub fn read(
        &mut self,
        mem: &str,
        identifier: &str,
        request: &ReadRequest,
    ) -> Result<ReadOutcome, MemoryError> {
        let (owner, item_id, via) = self.resolve(mem, identifier)?;
        let container = self
            .containers
            .get_mut(&owner)
            .ok_or_else(|| MemoryError::ContainerNotFound(owner.clone()))?;
        container
            .read_owned(
                &item_id,
                request.reader.as_deref(),
                request.with_meta,
                via.as_deref(),
            )
            .ok_or_else(|| MemoryError::item_not_found(&item_id, &owner))
    }

    /// Probing read: the resolved content, or `None` for anything short
    /// of a successful read (missing, denied, broken chain).
    pub fn read_content(&mut self, mem: &str, identifier: &str) -> Option<Value> {
        self.read(mem, identifier, &ReadRequest::default())
            .ok()
            .and_then(ReadOutcome::into_content)
    }

    /// Read the item at a position in an ordered container.
    pub fn read_at(
        &mut self,
        mem: &str,
        index: usize,
        request: &ReadRequest,
    ) -> Result<ReadOutcome, MemoryError> {
        let ordered = self.ordered(mem)?;
        let Some(key) = ordered.key_at(index) else {
            return Err(MemoryError::IndexOutOfBounds {
                container: mem.to_string(),
                index,
                len: ordered.order().len(),
            });
        };
        let key = key.to_string();
        self.read(mem, &key, request)
    }

    /// Modify through `(mem, identifier)`.
    ///
    /// When the identifier names a link, the write is forwarded to the
    /// owning item only if the request is recursive; otherwise the call
    /// returns [`WriteOutcome::Linked`] and changes nothing.
    pub fn modify(
        &mut self,
        mem: &str,
        identifier: &str,
        new_content: Value,
        request: &ModifyRequest,
    ) -> Result<WriteOutcome, MemoryError> {
        let container = self
            .containers
            .get(mem)
            .ok_or_else(|| MemoryError::ContainerNotFound(mem.to_string()))?;
        if container.link_target(identifier).is_some() && !request.recursive {
            return Ok(WriteOutcome::Linked);
        }

        let (owner, item_id, via) = self.resolve(mem, identifier)?;
        let modifier = request.modifier.as_deref().unwrap_or(mem);
        let container = self
            .containers
            .get_mut(&owner)
            .ok_or_else(|| MemoryError::ContainerNotFound(owner.clone()))?;
        container.modify_owned(
            &item_id,
            new_content,
            Some(modifier),
            request.protocol,
            via.as_deref(),
        )
    }

    /// Delete through `(mem, identifier)`.
    ///
    /// A link key is revoked (or, recursively, resolved and the owning
    /// item deleted). Deleting an owned item first invalidates every
    /// remote link to it via the reverse index. An unknown identifier is
    /// an idempotent `Ok(false)`.
    pub fn delete(
        &mut self,
        mem: &str,
        identifier: &str,
        request: DeleteRequest,
    ) -> Result<bool, MemoryError> {
        let container = self
            .containers
            .get(mem)
            .ok_or_else(|| MemoryError::ContainerNotFound(mem.to_string()))?;

        if container.link_target(identifier).is_some() {
            if request.recursive {
                let (owner, item_id, _) = self.resolve(mem, identifier)?;
                return self.delete_owned(&owner, &item_id, request);
            }
            return self.revoke_link(mem, identifier);
        }
        if container.owns(identifier) {
            return self.delete_owned(mem, identifier, request);
        }
        Ok(false)
    }

    /// Delete the entry at a position in an ordered container. Positions
    /// past the end are an idempotent `Ok(false)`.
    pub fn delete_at(
        &mut self,
        mem: &str,
        index: usize,
        request: DeleteRequest,
    ) -> Result<bool, MemoryError> {
        let Some(key) = self.ordered(mem)?.key_at(index) else {
            return Ok(false);
        };
        let key = key.to_string();
        self.delete(mem, &key, request)
    }

    fn delete_owned(
        &mut self,
        owner: &str,
        item_id: &str,
        request: DeleteRequest,
    ) -> Result<bool, MemoryError> {
        let is_tree = matches!(self.containers.get(owner), Some(Container::Tree(_)));
        if is_tree && request.with_children {
            return self.delete_subtree(owner, item_id);
        }
        self.cascade_invalidate(owner, item_id);
        let container = self
            .containers
            .get_mut(owner)
            .ok_or_else(|| MemoryError::ContainerNotFound(owner.to_string()))?;
        Ok(container.remove_owned(item_id))
    }

    /// Delete a tree node together with its descendants, children before
    /// parents so every node's remote links are invalidated while the
    /// node is still resolvable.
    fn delete_subtree(&mut self, owner: &str, top: &str) -> Result<bool, MemoryError> {
        let nodes = self.tree(owner)?.postorder_ids(top);
        let mut removed = HashSet::new();
        for (id, children) in nodes {
            if !children.iter().all(|c| removed.contains(c)) {
                continue;
            }
            self.cascade_invalidate(owner, &id);
            let Ok(tree) = self.tree_mut(owner) else {
                continue;
            };
            if tree.remove_plain(&id) {
                removed.insert(id);
            }
        }
        Ok(removed.contains(top))
    }

    /// Create a link in `mem` to an item in (or reachable through)
    /// another container.
    ///
    /// The link is stored exactly as requested; the reverse entry is
    /// recorded on the chain-resolved owner. The local key defaults to
    /// the target item id and must not collide with any existing local
    /// key. Linking a container to itself is a no-op returning the key.
    pub fn request_link(
        &mut self,
        mem: &str,
        target_mem: &str,
        target_item: &str,
        local_key: Option<&str>,
    ) -> Result<String, MemoryError> {
        self.request_link_inner(mem, target_mem, target_item, local_key, None)
    }

    /// Like [`MemoryRegistry::request_link`], but places the link at a
    /// position in an ordered container.
    pub fn request_link_at(
        &mut self,
        mem: &str,
        index: usize,
        target_mem: &str,
        target_item: &str,
        local_key: Option<&str>,
    ) -> Result<String, MemoryError> {
        self.ordered(mem)?;
        self.request_link_inner(mem, target_mem, target_item, local_key, Some(index))
    }

    fn request_link_inner(
        &mut self,
        mem: &str,
        target_mem: &str,
        target_item: &str,
        local_key: Option<&str>,
        index: Option<usize>,
    ) -> Result<String, MemoryError> {
        let key = local_key.unwrap_or(target_item).to_string();
        let requester = self
            .containers
            .get(mem)
            .ok_or_else(|| MemoryError::ContainerNotFound(mem.to_string()))?;
        if mem == target_mem {
            return Ok(key);
        }
        if requester.contains(&key) {
            return Err(MemoryError::duplicate_item(&key, mem));
        }

        let (owner, owner_item, _) = self.resolve(target_mem, target_item)?;

        if let Some(requester) = self.containers.get_mut(mem) {
            requester.record_link(
                key.clone(),
                LinkTarget::new(target_mem, target_item),
                index,
            );
        }
        if let Some(owner) = self.containers.get_mut(&owner) {
            owner.add_reverse(
                mem,
                ReverseEntry {
                    remote_key: key.clone(),
                    item_id: owner_item,
                },
            );
        }
        Ok(key)
    }

    /// Remove a link without touching the owning item. `Ok(false)` when
    /// the key names no link here.
    pub fn revoke_link(&mut self, mem: &str, key: &str) -> Result<bool, MemoryError> {
        let container = self
            .containers
            .get_mut(mem)
            .ok_or_else(|| MemoryError::ContainerNotFound(mem.to_string()))?;
        let Some(target) = container.remove_link_entry(key) else {
            return Ok(false);
        };

        match self.resolve(&target.container_id, &target.item_id) {
            Ok((owner, _, _)) => {
                if let Some(owner) = self.containers.get_mut(&owner) {
                    owner.remove_reverse(mem, key);
                }
            }
            Err(_) => {
                // The chain already broke; the owner-side entry (if any)
                // was cleaned up when the chain was severed.
                warn!(container = %mem, key = %key, "revoked link with unresolvable target");
            }
        }
        Ok(true)
    }

    /// Read every visible entry of a container in its natural order,
    /// returning `(local key, content)` pairs. These are real reads:
    /// protocols apply, and denied or unresolvable entries are skipped.
    pub fn retrieve(
        &mut self,
        mem: &str,
        reader: Option<&str>,
    ) -> Result<Vec<(String, Value)>, MemoryError> {
        let keys = self
            .containers
            .get(mem)
            .ok_or_else(|| MemoryError::ContainerNotFound(mem.to_string()))?
            .visible_keys();

        let request = ReadRequest {
            reader: reader.map(str::to_string),
            with_meta: false,
        };
        let mut out = Vec::new();
        for key in keys {
            if let Ok(outcome) = self.read(mem, &key, &request)
                && let Some(content) = outcome.into_content()
            {
                out.push((key, content));
            }
        }
        Ok(out)
    }

    /// Empty a container: delete every owned item (invalidating remote
    /// links to each) and revoke every outgoing link.
    pub fn reset(&mut self, mem: &str) -> Result<(), MemoryError> {
        let container = self
            .containers
            .get(mem)
            .ok_or_else(|| MemoryError::ContainerNotFound(mem.to_string()))?;
        let items = container.item_ids();
        let links = container.link_keys();

        for id in items {
            // Cascades from earlier deletions may have removed entries
            // already.
            if self.containers.get(mem).is_some_and(|c| c.owns(&id)) {
                self.delete(mem, &id, DeleteRequest::default())?;
            }
        }
        for key in links {
            self.revoke_link(mem, &key)?;
        }
        debug_assert!(self.containers.get(mem).is_none_or(Container::is_empty));
        Ok(())
    }

    /// Structural snapshot of one container.
    pub fn save(&self, mem: &str) -> Result<ContainerSnapshot, MemoryError> {
        self.containers
            .get(mem)
            .ok_or_else(|| MemoryError::ContainerNotFound(mem.to_string()))?
            .save()
    }

    /// Structural snapshots of every container, in id order.
    pub fn save_all(&self) -> Result<Vec<ContainerSnapshot>, MemoryError> {
        self.containers.values().map(Container::save).collect()
    }

    /// Restore a container from a snapshot and register it.
    ///
    /// Snapshots carry forward links but never the reverse index; after
    /// loading a set of related containers, call
    /// [`MemoryRegistry::rebuild_reverse_links`] once.
    pub fn load(&mut self, snapshot: ContainerSnapshot) -> Result<(), MemoryError> {
        self.register(Container::from_snapshot(snapshot)?)
    }

    /// Rebuild the reverse index from scratch by replaying every forward
    /// link through chain resolution. Unresolvable links are left in
    /// place (their chains may be restored by a later load) but get no
    /// reverse entry.
    pub fn rebuild_reverse_links(&mut self) {
        for container in self.containers.values_mut() {
            container.clear_reverse();
        }

        let mut forwards = Vec::new();
        for (id, container) in &self.containers {
            for (key, target) in container.forward_links() {
                forwards.push((id.clone(), key, target));
            }
        }
        for (requester, key, target) in forwards {
            match self.resolve(&target.container_id, &target.item_id) {
                Ok((owner, owner_item, _)) => {
                    if let Some(owner) = self.containers.get_mut(&owner) {
                        owner.add_reverse(
                            &requester,
                            ReverseEntry {
                                remote_key: key,
                                item_id: owner_item,
                            },
                        );
                    }
                }
                Err(_) => {
                    warn!(
                        container = %requester,
                        key = %key,
                        "unresolvable link during reverse index rebuild"
                    );
                }
            }
        }
    }

    /// Remove every remote link that resolves to `(owner, item_id)`.
    ///
    /// The reverse index holds one entry per remote link, including links
    /// that reach the item through other links, so one pass invalidates
    /// the whole dependency fan-in.
    fn cascade_invalidate(&mut self, owner: &str, item_id: &str) {
        let Some(container) = self.containers.get_mut(owner) else {
            return;
        };
        let dependents = container.take_reverse_for(item_id);
        for (remote, remote_key) in dependents {
            if let Some(remote_container) = self.containers.get_mut(&remote)
                && remote_container.remove_link_entry(&remote_key).is_some()
            {
                debug!(
                    container = %remote,
                    key = %remote_key,
                    owner = %owner,
                    item = %item_id,
                    "invalidated link to deleted item"
                );
            }
        }
    }
}

fn kind_mismatch(container: &str, expected: ContainerKind) -> MemoryError {
    MemoryError::KindMismatch {
        container: container.to_string(),
        expected,
    }
}
