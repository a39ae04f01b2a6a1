//! Shared domain types for memlink.
//!
//! This crate contains the core domain types used across the memlink
//! containers: MemoryItem, TreeItem, protocol/state enums, snapshot types,
//! and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror
//! and tracing.

pub mod duration;
pub mod error;
pub mod item;
pub mod snapshot;
pub mod tree;
