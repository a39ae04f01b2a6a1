//! Structural snapshot types used by container save/load.
//!
//! The snapshot mirrors every item field verbatim and records forward
//! links, but never the reverse index: that is rebuilt by replaying
//! forward links after a bulk load.

use serde::de::{Deserializer, Error as _};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Container type tag carried in snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Keyed,
    Ordered,
    Tree,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKind::Keyed => write!(f, "keyed"),
            ContainerKind::Ordered => write!(f, "ordered"),
            ContainerKind::Tree => write!(f, "tree"),
        }
    }
}

impl FromStr for ContainerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keyed" => Ok(ContainerKind::Keyed),
            "ordered" => Ok(ContainerKind::Ordered),
            "tree" => Ok(ContainerKind::Tree),
            other => Err(format!("invalid container kind: '{other}'")),
        }
    }
}

/// A non-owning reference to an item in another container.
///
/// Stored exactly as requested by the caller; resolution to the true
/// owner happens hop by hop at access time. Serializes as the two-element
/// array `[container_id, item_id]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub container_id: String,
    pub item_id: String,
}

impl LinkTarget {
    pub fn new(container_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            item_id: item_id.into(),
        }
    }
}

impl Serialize for LinkTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.container_id, &self.item_id).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LinkTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parts = <Vec<String>>::deserialize(deserializer)?;
        let [container_id, item_id] = <[String; 2]>::try_from(parts)
            .map_err(|_| D::Error::custom("link target must be [container_id, item_id]"))?;
        Ok(Self {
            container_id,
            item_id,
        })
    }
}

/// Serialized form of one container.
///
/// `order` is present only for ordered containers, `roots` only for tree
/// containers. `load` is the exact structural inverse of `save` except
/// for the reverse index, which is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ContainerKind,
    pub items: BTreeMap<String, Value>,
    pub links: BTreeMap<String, LinkTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_link_target_wire_format() {
        let target = LinkTarget::new("mem1", "item-a");
        let value = serde_json::to_value(&target).unwrap();
        assert_eq!(value, json!(["mem1", "item-a"]));
        let back: LinkTarget = serde_json::from_value(value).unwrap();
        assert_eq!(back, target);
    }

    #[test]
    fn test_link_target_rejects_wrong_arity() {
        assert!(serde_json::from_value::<LinkTarget>(json!(["only-one"])).is_err());
        assert!(serde_json::from_value::<LinkTarget>(json!(["a", "b", "c"])).is_err());
    }

    #[test]
    fn test_container_kind_roundtrip() {
        for kind in [
            ContainerKind::Keyed,
            ContainerKind::Ordered,
            ContainerKind::Tree,
        ] {
            let parsed: ContainerKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let mut links = BTreeMap::new();
        links.insert("shared".to_string(), LinkTarget::new("other", "x"));
        let snapshot = ContainerSnapshot {
            id: "notes".to_string(),
            kind: ContainerKind::Ordered,
            items: BTreeMap::new(),
            links,
            order: Some(vec!["shared".to_string()]),
            roots: None,
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["type"], json!("ordered"));
        assert_eq!(value["links"]["shared"], json!(["other", "x"]));
        assert_eq!(value["order"], json!(["shared"]));
        assert!(value.get("roots").is_none());
    }
}
