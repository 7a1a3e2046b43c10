//! Field patches: ordered, replayable diffs against a base record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An entity payload: an opaque JSON object map.
///
/// The engine never interprets payload fields, with one exception: an edge
/// record names its endpoints (see [`crate::edge_endpoints`]).
pub type Record = serde_json::Map<String, Value>;

/// The kind of change a [`FieldPatch`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Sets the value at the path, overwriting any existing value.
    Replace,
    /// Sets the value at the path; by convention used for new fields.
    Add,
    /// Removes the value at the path.
    Remove,
}

/// A single field-level change against a base record.
///
/// Patches address fields by dot-separated path (`"meta.color"`). A patch
/// list is ordered and replayable: applying the same list to the same base
/// always yields the same record, and later patches win on conflicting
/// paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPatch {
    /// The kind of change.
    pub op: PatchOp,
    /// Dot-separated path into the record.
    pub path: String,
    /// The new value. `None` for [`PatchOp::Remove`].
    pub value: Option<Value>,
}

impl FieldPatch {
    /// Creates a replace patch.
    #[must_use]
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: Some(value),
        }
    }

    /// Creates an add patch.
    #[must_use]
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    /// Creates a remove patch.
    #[must_use]
    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
        }
    }
}

/// Replays an ordered patch list against a base record.
///
/// Returns the reconstructed record. The base is not modified. Rules:
/// - `Replace`/`Add` set the value at the path, creating intermediate
///   objects as needed (a non-object intermediate is overwritten)
/// - `Remove` deletes the path; removing a missing path is a no-op
/// - Later patches win on conflicting paths
#[must_use]
pub fn apply_patches(base: &Record, patches: &[FieldPatch]) -> Record {
    let mut result = base.clone();
    for patch in patches {
        match patch.op {
            PatchOp::Replace | PatchOp::Add => {
                if let Some(value) = &patch.value {
                    set_path(&mut result, &patch.path, value.clone());
                }
            }
            PatchOp::Remove => remove_path(&mut result, &patch.path),
        }
    }
    result
}

fn set_path(target: &mut Record, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = target;

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_owned(), value);
            return;
        }

        let slot = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Record::new()));
        if !slot.is_object() {
            *slot = Value::Object(Record::new());
        }
        match slot {
            Value::Object(map) => current = map,
            _ => return,
        }
    }
}

fn remove_path(target: &mut Record, path: &str) {
    let mut segments = path.split('.').peekable();
    let mut current = target;

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.remove(segment);
            return;
        }

        match current.get_mut(segment).and_then(Value::as_object_mut) {
            Some(next) => current = next,
            None => return,
        }
    }
}
