use thiserror::Error;

use crate::snapshot::ContainerKind;

/// Errors raised by the memory subsystem.
///
/// Hard failures are reserved for structural inconsistencies (duplicate
/// ids, dangling container references, malformed snapshots). State and
/// protocol violations (expired, writing, link without forwarding) surface
/// as outcome variants on the read/write paths instead.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("container '{0}' is already registered")]
    DuplicateContainer(String),

    #[error("item '{item}' already exists in container '{container}'")]
    DuplicateItem { item: String, container: String },

    #[error("container '{0}' is not registered")]
    ContainerNotFound(String),

    #[error("item '{item}' not found in container '{container}'")]
    ItemNotFound { item: String, container: String },

    #[error("content of item '{0}' does not support append; use the overwrite protocol")]
    Unappendable(String),

    #[error("invalid duration '{0}', expected a format like '1d2h30m15s'")]
    InvalidDuration(String),

    #[error("invalid end time '{0}', expected 'YYYY/MM/DD HH:MM' or RFC 3339")]
    InvalidEndTime(String),

    #[error("container '{container}' is not a {expected} container")]
    KindMismatch {
        container: String,
        expected: ContainerKind,
    },

    #[error("index {index} out of bounds for container '{container}' of length {len}")]
    IndexOutOfBounds {
        container: String,
        index: usize,
        len: usize,
    },

    #[error("malformed snapshot: {0}")]
    Snapshot(String),
}

impl MemoryError {
    /// Shorthand for the most common lookup failure.
    pub fn item_not_found(item: impl Into<String>, container: impl Into<String>) -> Self {
        MemoryError::ItemNotFound {
            item: item.into(),
            container: container.into(),
        }
    }

    pub fn duplicate_item(item: impl Into<String>, container: impl Into<String>) -> Self {
        MemoryError::DuplicateItem {
            item: item.into(),
            container: container.into(),
        }
    }
}
