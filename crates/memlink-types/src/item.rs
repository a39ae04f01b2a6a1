//! Memory items: atomic content units with access protocols, lazy
//! expiration, and an append-only history log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::duration::parse_duration;
use crate::error::MemoryError;

/// Lifecycle state of a memory item.
///
/// Transitions are monotonic toward `Expired`, except the initial
/// `Writing` -> `Normal` step during insertion into a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Normal,
    Writing,
    Expired,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemState::Normal => write!(f, "normal"),
            ItemState::Writing => write!(f, "writing"),
            ItemState::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for ItemState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(ItemState::Normal),
            "writing" => Ok(ItemState::Writing),
            "expired" => Ok(ItemState::Expired),
            other => Err(format!("invalid item state: '{other}'")),
        }
    }
}

/// Read side-effect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadProtocol {
    /// The item stays readable after a read (default).
    Keep,
    /// The item expires after its first successful read.
    BurnAfterRead,
}

impl Default for ReadProtocol {
    fn default() -> Self {
        ReadProtocol::Keep
    }
}

impl fmt::Display for ReadProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadProtocol::Keep => write!(f, "keep"),
            ReadProtocol::BurnAfterRead => write!(f, "burn_after_read"),
        }
    }
}

impl FromStr for ReadProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep" => Ok(ReadProtocol::Keep),
            "burn_after_read" => Ok(ReadProtocol::BurnAfterRead),
            other => Err(format!("invalid read protocol: '{other}'")),
        }
    }
}

/// Write side-effect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifyProtocol {
    /// Replace the content wholesale (default).
    Overwrite,
    /// Push onto a JSON array; any other content shape is unappendable.
    Append,
}

impl Default for ModifyProtocol {
    fn default() -> Self {
        ModifyProtocol::Overwrite
    }
}

impl fmt::Display for ModifyProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModifyProtocol::Overwrite => write!(f, "overwrite"),
            ModifyProtocol::Append => write!(f, "append"),
        }
    }
}

impl FromStr for ModifyProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "overwrite" => Ok(ModifyProtocol::Overwrite),
            "append" => Ok(ModifyProtocol::Append),
            other => Err(format!("invalid modify protocol: '{other}'")),
        }
    }
}

/// Action recorded in an item's history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Init,
    Added,
    Read,
    Modify,
    Deleted,
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryAction::Init => write!(f, "init"),
            HistoryAction::Added => write!(f, "added"),
            HistoryAction::Read => write!(f, "read"),
            HistoryAction::Modify => write!(f, "modify"),
            HistoryAction::Deleted => write!(f, "deleted"),
        }
    }
}

/// One entry in an item's append-only history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub action: HistoryAction,
    /// Item state after the action.
    pub state: ItemState,
    /// Content snapshot after the action.
    pub content: Value,
    /// Reader or modifier that triggered the action, if any.
    pub actor: Option<String>,
    /// `"container->key"` when the action arrived through a link.
    pub accessed_via: Option<String>,
}

/// Result of reading an item directly.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemRead {
    Content(Value),
    /// The item's state forbids reads (expired or mid-write).
    Denied(ItemState),
}

/// Result of writing an item directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemWrite {
    Applied,
    /// The item's state forbids writes (expired or mid-write).
    Denied(ItemState),
}

/// An atomic memory value with access protocols, expiration, and history.
///
/// Items are created by the caller and transferred into a container on
/// `add`. Expiration is evaluated lazily at every access; there is no
/// background sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub content: Value,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub state: ItemState,
    pub read_protocol: ReadProtocol,
    pub modify_protocol: ModifyProtocol,
    /// Relative expiration, e.g. `"1d20h30m15s"`, anchored at `created_at`.
    pub duration: Option<String>,
    /// Absolute expiration deadline.
    pub end_time: Option<DateTime<Utc>>,
    pub read_count: u32,
    pub last_access_at: Option<DateTime<Utc>>,
    pub last_modify_at: Option<DateTime<Utc>>,
    pub last_reader: Option<String>,
    pub last_modifier: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    /// Free-form caller annotations carried through snapshots.
    #[serde(default)]
    pub extra: serde_json::Map<String, Value>,
}

impl MemoryItem {
    /// Create an item with a generated id and an `init` history entry.
    pub fn new(content: impl Into<Value>, source: impl Into<String>) -> Self {
        let mut item = Self {
            id: Uuid::now_v7().to_string(),
            content: content.into(),
            source: source.into(),
            created_at: Utc::now(),
            state: ItemState::Normal,
            read_protocol: ReadProtocol::default(),
            modify_protocol: ModifyProtocol::default(),
            duration: None,
            end_time: None,
            read_count: 0,
            last_access_at: None,
            last_modify_at: None,
            last_reader: None,
            last_modifier: None,
            history: Vec::new(),
            extra: serde_json::Map::new(),
        };
        item.record_history(HistoryAction::Init, None, None);
        item
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_read_protocol(mut self, protocol: ReadProtocol) -> Self {
        self.read_protocol = protocol;
        self
    }

    pub fn with_modify_protocol(mut self, protocol: ModifyProtocol) -> Self {
        self.modify_protocol = protocol;
        self
    }

    /// Set a relative expiration. The duration string is validated here.
    pub fn with_duration(mut self, duration: &str) -> Result<Self, MemoryError> {
        parse_duration(duration)?;
        self.duration = Some(duration.to_string());
        self.reconcile_expiration();
        Ok(self)
    }

    /// Set an absolute expiration deadline.
    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self.reconcile_expiration();
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// When both expiration settings are present, keep whichever produces
    /// the earlier deadline and clear the other.
    fn reconcile_expiration(&mut self) {
        let (Some(duration), Some(end_time)) = (&self.duration, self.end_time) else {
            return;
        };
        let Ok(delta) = parse_duration(duration) else {
            return;
        };
        warn!(
            item = %self.id,
            "both duration and end_time set; keeping the earlier deadline"
        );
        if self.created_at + delta < end_time {
            self.end_time = None;
        } else {
            self.duration = None;
        }
    }

    /// The effective expiration deadline, if any.
    pub fn expiration_time(&self) -> Option<DateTime<Utc>> {
        if let Some(duration) = &self.duration {
            return parse_duration(duration)
                .ok()
                .map(|delta| self.created_at + delta);
        }
        self.end_time
    }

    pub fn is_expired(&self) -> bool {
        match self.expiration_time() {
            Some(deadline) => Utc::now() > deadline,
            None => false,
        }
    }

    /// Whether the item can currently be read or modified.
    pub fn is_accessible(&self) -> bool {
        self.state == ItemState::Normal && !self.is_expired()
    }

    /// Append a history entry reflecting the current state and content.
    pub fn record_history(
        &mut self,
        action: HistoryAction,
        actor: Option<&str>,
        accessed_via: Option<&str>,
    ) {
        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            action,
            state: self.state,
            content: self.content.clone(),
            actor: actor.map(str::to_string),
            accessed_via: accessed_via.map(str::to_string),
        });
    }

    /// Gate on state and lazy expiry, then flip to `Expired` on the first
    /// detection of an elapsed deadline. Returns `None` when the item is
    /// readable.
    fn access_gate(&mut self) -> Option<ItemState> {
        if self.state != ItemState::Normal {
            return Some(self.state);
        }
        if self.is_expired() {
            self.state = ItemState::Expired;
            return Some(self.state);
        }
        None
    }

    /// Read the content, applying the read protocol.
    ///
    /// An inaccessible item yields `Denied` with no side effects beyond
    /// the lazy expiry flip. A successful read bumps the read count,
    /// records access metadata, burns the item if its protocol says so,
    /// and appends a history entry.
    pub fn read(&mut self, reader: Option<&str>, accessed_via: Option<&str>) -> ItemRead {
        if let Some(state) = self.access_gate() {
            return ItemRead::Denied(state);
        }

        self.read_count += 1;
        self.last_access_at = Some(Utc::now());
        self.last_reader = reader.map(str::to_string);

        if self.read_protocol == ReadProtocol::BurnAfterRead {
            self.state = ItemState::Expired;
        }

        self.record_history(HistoryAction::Read, reader, accessed_via);
        ItemRead::Content(self.content.clone())
    }

    /// Modify the content, applying the modify protocol (or an override).
    ///
    /// `Append` requires the content to be a JSON array and fails with
    /// `MemoryError::Unappendable` otherwise, before any metadata changes.
    pub fn modify(
        &mut self,
        new_content: Value,
        modifier: Option<&str>,
        protocol: Option<ModifyProtocol>,
        accessed_via: Option<&str>,
    ) -> Result<ItemWrite, MemoryError> {
        if let Some(state) = self.access_gate() {
            return Ok(ItemWrite::Denied(state));
        }

        match protocol.unwrap_or(self.modify_protocol) {
            ModifyProtocol::Overwrite => {
                self.content = new_content;
            }
            ModifyProtocol::Append => {
                let Some(entries) = self.content.as_array_mut() else {
                    return Err(MemoryError::Unappendable(self.id.clone()));
                };
                entries.push(new_content);
            }
        }

        self.last_modify_at = Some(Utc::now());
        self.last_modifier = modifier.map(str::to_string);
        self.record_history(HistoryAction::Modify, modifier, accessed_via);
        Ok(ItemWrite::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_new_item_defaults() {
        let item = MemoryItem::new("hello", "test");
        assert_eq!(item.state, ItemState::Normal);
        assert_eq!(item.read_protocol, ReadProtocol::Keep);
        assert_eq!(item.modify_protocol, ModifyProtocol::Overwrite);
        assert_eq!(item.read_count, 0);
        assert_eq!(item.history.len(), 1);
        assert_eq!(item.history[0].action, HistoryAction::Init);
    }

    #[test]
    fn test_read_bumps_metadata_and_history() {
        let mut item = MemoryItem::new("hello", "test");
        let got = item.read(Some("alice"), None);
        assert_eq!(got, ItemRead::Content(json!("hello")));
        assert_eq!(item.read_count, 1);
        assert_eq!(item.last_reader.as_deref(), Some("alice"));
        assert_eq!(item.history.last().map(|h| h.action), Some(HistoryAction::Read));
    }

    #[test]
    fn test_burn_after_read() {
        let mut item =
            MemoryItem::new("secret", "test").with_read_protocol(ReadProtocol::BurnAfterRead);
        assert_eq!(item.read(None, None), ItemRead::Content(json!("secret")));
        assert_eq!(item.state, ItemState::Expired);
        // Once expired, an item never returns to normal.
        assert_eq!(item.read(None, None), ItemRead::Denied(ItemState::Expired));
    }

    #[test]
    fn test_lazy_expiration_flips_state() {
        let mut item = MemoryItem::new("old", "test");
        item.end_time = Some(Utc::now() - Duration::seconds(5));
        assert_eq!(item.read(None, None), ItemRead::Denied(ItemState::Expired));
        assert_eq!(item.state, ItemState::Expired);
        // No access metadata recorded for a denied read.
        assert_eq!(item.read_count, 0);
    }

    #[test]
    fn test_modify_overwrite() {
        let mut item = MemoryItem::new("v1", "test");
        let out = item.modify(json!("v2"), Some("bob"), None, None).unwrap();
        assert_eq!(out, ItemWrite::Applied);
        assert_eq!(item.content, json!("v2"));
        assert_eq!(item.last_modifier.as_deref(), Some("bob"));
    }

    #[test]
    fn test_modify_append() {
        let mut item =
            MemoryItem::new(json!(["a"]), "test").with_modify_protocol(ModifyProtocol::Append);
        item.modify(json!("b"), None, None, None).unwrap();
        assert_eq!(item.content, json!(["a", "b"]));
    }

    #[test]
    fn test_modify_append_unappendable() {
        let mut item =
            MemoryItem::new("scalar", "test").with_modify_protocol(ModifyProtocol::Append);
        let err = item.modify(json!("x"), None, None, None).unwrap_err();
        assert!(matches!(err, MemoryError::Unappendable(_)));
        // Failed append leaves content and metadata untouched.
        assert_eq!(item.content, json!("scalar"));
        assert!(item.last_modify_at.is_none());
    }

    #[test]
    fn test_modify_protocol_override() {
        let mut item = MemoryItem::new(json!(["a"]), "test");
        item.modify(json!("b"), None, Some(ModifyProtocol::Append), None)
            .unwrap();
        assert_eq!(item.content, json!(["a", "b"]));
    }

    #[test]
    fn test_expiration_from_duration() {
        let item = MemoryItem::new("x", "test").with_duration("1h").unwrap();
        let deadline = item.expiration_time().unwrap();
        assert_eq!(deadline, item.created_at + Duration::hours(1));
        assert!(!item.is_expired());
    }

    #[test]
    fn test_dual_expiration_keeps_earlier_deadline() {
        // Duration deadline comes first: end_time cleared.
        let far = Utc::now() + Duration::days(30);
        let item = MemoryItem::new("x", "test")
            .with_end_time(far)
            .with_duration("1h")
            .unwrap();
        assert!(item.end_time.is_none());
        assert_eq!(item.duration.as_deref(), Some("1h"));

        // End-time deadline comes first: duration cleared.
        let near = Utc::now() + Duration::minutes(5);
        let item = MemoryItem::new("x", "test")
            .with_duration("2d")
            .unwrap()
            .with_end_time(near);
        assert!(item.duration.is_none());
        assert_eq!(item.end_time, Some(near));
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let err = MemoryItem::new("x", "test").with_duration("soon").unwrap_err();
        assert!(matches!(err, MemoryError::InvalidDuration(_)));
    }

    #[test]
    fn test_item_serde_roundtrip() {
        let item = MemoryItem::new(json!({"k": 1}), "test")
            .with_read_protocol(ReadProtocol::BurnAfterRead)
            .with_extra("note", json!("pinned"));
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["read_protocol"], json!("burn_after_read"));
        let back: MemoryItem = serde_json::from_value(value).unwrap();
        // Whole-item equality, history entries included.
        assert_eq!(back, item);
    }

    #[test]
    fn test_protocol_parse_roundtrip() {
        for p in [ReadProtocol::Keep, ReadProtocol::BurnAfterRead] {
            let parsed: ReadProtocol = p.to_string().parse().unwrap();
            assert_eq!(parsed, p);
        }
        for p in [ModifyProtocol::Overwrite, ModifyProtocol::Append] {
            let parsed: ModifyProtocol = p.to_string().parse().unwrap();
            assert_eq!(parsed, p);
        }
    }
}
