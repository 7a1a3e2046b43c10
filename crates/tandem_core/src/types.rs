//! Entity identifiers and classes.

use crate::error::{CoreError, CoreResult};
use crate::patch::Record;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an entity.
///
/// Entity ids are opaque strings minted by the caller (the engine never
/// interprets them). Ids are:
/// - Unique within a sync domain
/// - Immutable once assigned
/// - Shared between the primary and secondary stores
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an entity id from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a new random (UUID v4) entity id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The class of an entity: a graph node or a graph edge.
///
/// The engine treats payloads as opaque, but routes node and edge
/// operations differently: within any produced transaction all node
/// operations precede all edge operations, because an edge record names
/// two node ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityClass {
    /// A graph node (record in the node table).
    Node,
    /// A graph edge (record in the edge table, referencing two node ids).
    Edge,
}

impl EntityClass {
    /// Returns true for [`EntityClass::Node`].
    #[must_use]
    pub fn is_node(self) -> bool {
        matches!(self, EntityClass::Node)
    }

    /// Returns true for [`EntityClass::Edge`].
    #[must_use]
    pub fn is_edge(self) -> bool {
        matches!(self, EntityClass::Edge)
    }

    /// Ordering rank used when sequencing a batch: nodes before edges.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            EntityClass::Node => 0,
            EntityClass::Edge => 1,
        }
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityClass::Node => write!(f, "node"),
            EntityClass::Edge => write!(f, "edge"),
        }
    }
}

/// Extracts the `source` and `target` node ids from an edge record.
///
/// The only piece of domain knowledge the engine carries is that an edge
/// record names its two endpoints under these fields.
///
/// # Errors
///
/// Returns [`CoreError::MissingEndpoint`] when either field is absent or
/// not a string.
pub fn edge_endpoints(id: &EntityId, record: &Record) -> CoreResult<(EntityId, EntityId)> {
    let endpoint = |field: &'static str| -> CoreResult<EntityId> {
        record
            .get(field)
            .and_then(|v| v.as_str())
            .map(EntityId::from)
            .ok_or_else(|| CoreError::MissingEndpoint {
                id: id.to_string(),
                field,
            })
    };

    Ok((endpoint("source")?, endpoint("target")?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn entity_id_display() {
        let id = EntityId::new("note-1");
        assert_eq!(id.to_string(), "note-1");
        assert_eq!(format!("{id:?}"), "EntityId(note-1)");
    }

    #[test]
    fn random_ids_are_unique() {
        assert_ne!(EntityId::random(), EntityId::random());
    }

    #[test]
    fn class_ordering_rank() {
        assert!(EntityClass::Node.rank() < EntityClass::Edge.rank());
        assert!(EntityClass::Node.is_node());
        assert!(EntityClass::Edge.is_edge());
    }

    #[test]
    fn endpoints_present() {
        let rec = record(json!({"source": "a", "target": "b", "kind": "ref"}));
        let (from, to) = edge_endpoints(&EntityId::new("e1"), &rec).unwrap();
        assert_eq!(from.as_str(), "a");
        assert_eq!(to.as_str(), "b");
    }

    #[test]
    fn endpoints_missing_target() {
        let rec = record(json!({"source": "a"}));
        let err = edge_endpoints(&EntityId::new("e1"), &rec).unwrap_err();
        assert!(matches!(err, CoreError::MissingEndpoint { field: "target", .. }));
    }

    #[test]
    fn endpoints_non_string() {
        let rec = record(json!({"source": 1, "target": "b"}));
        assert!(edge_endpoints(&EntityId::new("e1"), &rec).is_err());
    }
}
