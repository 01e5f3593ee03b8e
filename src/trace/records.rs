//! Trace record decoding
//!
//! A trace is a JSON Lines stream of node, edge and memory records:
//!
//! ```text
//! {"type":"node","id":1}
//! {"type":"edge","parent":1,"child":2}
//! {"type":"memory","node":2,"delta":{"objects":{"added":[...],"changed":[...],"deleted":[...]}}}
//! ```
//!
//! Delta bodies are decoded by hand from [`serde_json::Value`] so that a bad
//! field can be reported with its full path.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::memory::byte_diff::extend_unique;
use crate::memory::{
    AllocSite, ByteDiff, ByteValue, CowOwner, Deletion, Delta, ObjectChange, ObjectHeader,
    ObjectId, ObjectState, Offset, Plane, PlaneKind, UpdateLog,
};
use crate::trace::tree::NodeId;

/// One line of a trace file
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceRecord {
    Node { id: NodeId },
    Edge { parent: NodeId, child: NodeId },
    Memory { node: NodeId, delta: Value },
}

/// A delta record with a missing or mistyped field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeltaError {
    #[error("missing field `{0}`")]
    MissingField(String),
    #[error("field `{path}` should be {expected}")]
    InvalidField { path: String, expected: &'static str },
}

/// Decode one node's delta body
pub fn parse_delta(value: &Value) -> Result<Delta, DeltaError> {
    let root = Fields::open(value, String::new())?;
    let mut delta = Delta::default();

    let Some(objects) = root.object("objects")? else {
        return Ok(delta);
    };

    for (path, item) in objects.items("added")? {
        let record = Fields::open(item, path)?;
        delta.additions.push(parse_added(&record)?);
    }
    for (path, item) in objects.items("changed")? {
        let record = Fields::open(item, path)?;
        delta.changes.push(parse_changed(&record)?);
    }
    for (path, item) in objects.items("deleted")? {
        let record = Fields::open(item, path)?;
        delta.deletions.push(parse_deleted(&record)?);
    }

    Ok(delta)
}

/// How much of a plane record must be present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaneShape {
    /// Planes of added objects carry every metadata field
    Full,
    /// Planes of changed objects may carry content only
    Partial,
}

fn parse_added(record: &Fields<'_>) -> Result<ObjectState, DeltaError> {
    Ok(ObjectState {
        header: parse_header(record)?,
        segment_plane: parse_plane_slot(record, "segmentPlane", PlaneKind::Segment, PlaneShape::Full)?,
        offset_plane: parse_plane_slot(record, "offsetPlane", PlaneKind::Offset, PlaneShape::Full)?,
    })
}

fn parse_changed(record: &Fields<'_>) -> Result<ObjectChange, DeltaError> {
    let obj_id = ObjectId(record.u64("objID")?);
    // Metadata is optional on a change, but all-or-nothing once it appears.
    let header = if record.has("segment") || record.has("name") {
        Some(parse_header(record)?)
    } else {
        None
    };

    Ok(ObjectChange {
        obj_id,
        header,
        segment_plane: parse_plane_slot(
            record,
            "segmentPlane",
            PlaneKind::Segment,
            PlaneShape::Partial,
        )?,
        offset_plane: parse_plane_slot(record, "offsetPlane", PlaneKind::Offset, PlaneShape::Partial)?,
    })
}

fn parse_deleted(record: &Fields<'_>) -> Result<Deletion, DeltaError> {
    let obj_id = ObjectId(record.u64("objID")?);
    if let Some(kind) = record.opt_string("type")? {
        if kind != "DELETION" {
            return Err(record.invalid("type", "\"DELETION\""));
        }
    }
    Ok(Deletion { obj_id })
}

fn parse_header(record: &Fields<'_>) -> Result<ObjectHeader, DeltaError> {
    let alloc_site = match record.object("allocSite")? {
        Some(site) => Some(AllocSite {
            scope: site.opt_text("scope")?.unwrap_or_default(),
            name: site.opt_text("name")?.unwrap_or_default(),
            code: site.opt_text("code")?.unwrap_or_default(),
        }),
        None => None,
    };

    Ok(ObjectHeader {
        obj_id: ObjectId(record.u64("objID")?),
        segment: record.u64("segment")?,
        name: record.text("name")?,
        size: record.text("size")?,
        is_local: record.bool("isLocal")?,
        is_global: record.bool("isGlobal")?,
        is_fixed: record.bool("isFixed")?,
        is_user_spec: record.bool("isUserSpec")?,
        is_lazy: record.bool("isLazy")?,
        read_only: record.bool("readOnly")?,
        sym_address: record.text("symAddress")?,
        copy_on_write_owner: CowOwner::from_wire(record.u64("copyOnWriteOwner")?),
        alloc_site,
    })
}

fn parse_plane_slot(
    record: &Fields<'_>,
    key: &str,
    slot: PlaneKind,
    shape: PlaneShape,
) -> Result<Option<Plane>, DeltaError> {
    record
        .object(key)?
        .map(|plane| parse_plane(&plane, slot, shape))
        .transpose()
}

fn parse_plane(record: &Fields<'_>, slot: PlaneKind, shape: PlaneShape) -> Result<Plane, DeltaError> {
    let kind = match record.opt_string("type")? {
        Some(tag) => {
            PlaneKind::parse(&tag).ok_or_else(|| record.invalid("type", "a plane kind"))?
        }
        None => slot,
    };

    let mut plane = Plane::new(kind);
    match shape {
        PlaneShape::Full => {
            plane.memory_object_id = record.u64("memoryObjectID")?;
            plane.root_object = record.text("rootObject")?;
            plane.size_bound = record.u64("sizeBound")?;
            plane.initialized = record.bool("initialized")?;
            plane.symbolic = record.bool("symbolic")?;
            plane.initial_value = record.text("initialValue")?;
        }
        PlaneShape::Partial => {
            if let Some(id) = record.opt_u64("memoryObjectID")? {
                plane.memory_object_id = id;
            }
            if let Some(root) = record.opt_text("rootObject")? {
                plane.root_object = root;
            }
            if let Some(bound) = record.opt_u64("sizeBound")? {
                plane.size_bound = bound;
            }
            if let Some(initialized) = record.opt_bool("initialized")? {
                plane.initialized = initialized;
            }
            if let Some(symbolic) = record.opt_bool("symbolic")? {
                plane.symbolic = symbolic;
            }
            if let Some(initial) = record.opt_text("initialValue")? {
                plane.initial_value = initial;
            }
        }
    }

    if let Some(bytes) = record.object("bytes")? {
        plane.bytes = ByteDiff {
            additions: parse_byte_groups(&bytes, "add")?,
            deletions: parse_byte_groups(&bytes, "del")?,
        };
    }
    plane.updates = parse_updates(record)?;

    Ok(plane)
}

/// Byte groups are `[concrete, knownSymbolic, unflushed, value, idx...]`
fn parse_byte_groups(
    record: &Fields<'_>,
    key: &str,
) -> Result<BTreeMap<ByteValue, Vec<Offset>>, DeltaError> {
    let mut side: BTreeMap<ByteValue, Vec<Offset>> = BTreeMap::new();

    for (path, group) in record.items(key)? {
        let parts = group
            .as_array()
            .filter(|parts| parts.len() >= 4)
            .ok_or_else(|| DeltaError::InvalidField {
                path: path.clone(),
                expected: "a byte group of at least four elements",
            })?;

        let flag = |idx: usize| {
            parts[idx].as_bool().ok_or_else(|| DeltaError::InvalidField {
                path: format!("{path}[{idx}]"),
                expected: "a boolean",
            })
        };
        let value = ByteValue::new(
            token(&parts[3]).ok_or_else(|| DeltaError::InvalidField {
                path: format!("{path}[3]"),
                expected: "a string or number",
            })?,
            flag(0)?,
            flag(1)?,
            flag(2)?,
        );

        let offsets = parts[4..]
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                raw.as_u64().ok_or_else(|| DeltaError::InvalidField {
                    path: format!("{path}[{}]", i + 4),
                    expected: "a byte offset",
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if offsets.is_empty() {
            continue;
        }

        extend_unique(side.entry(value).or_default(), offsets);
    }

    Ok(side)
}

/// Updates are single-key objects, `{"<offset>": "<value>"}`, in log order
fn parse_updates(record: &Fields<'_>) -> Result<UpdateLog, DeltaError> {
    let mut log = UpdateLog::new();
    for (path, update) in record.items("updates")? {
        let (offset, value) = update
            .as_object()
            .filter(|entry| entry.len() == 1)
            .and_then(|entry| entry.iter().next())
            .ok_or_else(|| DeltaError::InvalidField {
                path: path.clone(),
                expected: "a single-key object",
            })?;
        let value = token(value).ok_or_else(|| DeltaError::InvalidField {
            path: format!("{path}.{offset}"),
            expected: "a string or number",
        })?;
        log.upsert(offset.clone(), value);
    }
    Ok(log)
}

/// Value text: strings as-is, numbers in their decimal form
fn token(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A JSON object together with its path from the delta root
struct Fields<'a> {
    map: &'a Map<String, Value>,
    path: String,
}

impl<'a> Fields<'a> {
    fn open(value: &'a Value, path: String) -> Result<Self, DeltaError> {
        match value.as_object() {
            Some(map) => Ok(Self { map, path }),
            None => Err(DeltaError::InvalidField {
                path: if path.is_empty() { "<root>".to_string() } else { path },
                expected: "an object",
            }),
        }
    }

    fn path_of(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    fn invalid(&self, key: &str, expected: &'static str) -> DeltaError {
        DeltaError::InvalidField {
            path: self.path_of(key),
            expected,
        }
    }

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Present, non-null value
    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|value| !value.is_null())
    }

    fn require(&self, key: &str) -> Result<&'a Value, DeltaError> {
        self.get(key)
            .ok_or_else(|| DeltaError::MissingField(self.path_of(key)))
    }

    fn u64(&self, key: &str) -> Result<u64, DeltaError> {
        self.require(key)?
            .as_u64()
            .ok_or_else(|| self.invalid(key, "an unsigned integer"))
    }

    fn opt_u64(&self, key: &str) -> Result<Option<u64>, DeltaError> {
        self.get(key)
            .map(|value| value.as_u64().ok_or_else(|| self.invalid(key, "an unsigned integer")))
            .transpose()
    }

    fn bool(&self, key: &str) -> Result<bool, DeltaError> {
        self.require(key)?
            .as_bool()
            .ok_or_else(|| self.invalid(key, "a boolean"))
    }

    fn opt_bool(&self, key: &str) -> Result<Option<bool>, DeltaError> {
        self.get(key)
            .map(|value| value.as_bool().ok_or_else(|| self.invalid(key, "a boolean")))
            .transpose()
    }

    fn text(&self, key: &str) -> Result<String, DeltaError> {
        token(self.require(key)?).ok_or_else(|| self.invalid(key, "a string or number"))
    }

    fn opt_text(&self, key: &str) -> Result<Option<String>, DeltaError> {
        self.get(key)
            .map(|value| token(value).ok_or_else(|| self.invalid(key, "a string or number")))
            .transpose()
    }

    fn opt_string(&self, key: &str) -> Result<Option<String>, DeltaError> {
        self.get(key)
            .map(|value| {
                value
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.invalid(key, "a string"))
            })
            .transpose()
    }

    fn object(&self, key: &str) -> Result<Option<Fields<'a>>, DeltaError> {
        self.get(key)
            .map(|value| Fields::open(value, self.path_of(key)))
            .transpose()
    }

    /// Elements of an optional array, each paired with its path
    fn items(&self, key: &str) -> Result<Vec<(String, &'a Value)>, DeltaError> {
        let Some(value) = self.get(key) else {
            return Ok(Vec::new());
        };
        let items = value.as_array().ok_or_else(|| self.invalid(key, "an array"))?;
        let base = self.path_of(key);
        Ok(items
            .iter()
            .enumerate()
            .map(|(idx, item)| (format!("{base}[{idx}]"), item))
            .collect())
    }
}
