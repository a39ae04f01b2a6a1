//! Linkable, expirable memory containers.
//!
//! A [`MemoryRegistry`] owns a set of addressable containers. Each
//! container owns its items exclusively and may hold non-owning links
//! into other containers' items. Every read, write, and delete routes
//! through link resolution, so callers observe resolved content
//! regardless of hop count; deleting an owned item walks the owning
//! container's reverse index to invalidate every remote link to it.
//!
//! The subsystem is synchronous and single-caller by design: cross
//! container bookkeeping (forward links and the reverse index) is
//! updated atomically within one registry operation.

pub mod container;
pub mod registry;

pub use container::{
    Container, KeyedMemory, OrderedMemory, ReadOutcome, TraverseOrder, Traversal, TreeMemory,
    WriteOutcome,
};
pub use registry::{DeleteRequest, MemoryRegistry, ModifyRequest, ReadRequest};
