//! Delta model for per-node memory changes

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::byte_diff::ByteDiff;
use super::update_log::UpdateLog;

/// Stable identifier the engine assigns to a memory object
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Object version a state is a copy-on-write child of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CowOwner {
    /// The state owns itself
    Own,
    Version(u64),
}

impl CowOwner {
    /// Decode the engine's integer form, where `0` means "own owner"
    pub fn from_wire(raw: u64) -> Self {
        match raw {
            0 => CowOwner::Own,
            version => CowOwner::Version(version),
        }
    }
}

/// Where an object was allocated. Carried through for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocSite {
    pub scope: String,
    pub name: String,
    pub code: String,
}

/// Scalar and flag metadata of a memory object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectHeader {
    pub obj_id: ObjectId,
    pub segment: u64,
    pub name: String,
    /// Size expression, concrete or symbolic
    pub size: String,
    pub is_local: bool,
    pub is_global: bool,
    pub is_fixed: bool,
    pub is_user_spec: bool,
    pub is_lazy: bool,
    pub read_only: bool,
    pub sym_address: String,
    pub copy_on_write_owner: CowOwner,
    pub alloc_site: Option<AllocSite>,
}

impl ObjectHeader {
    /// Header for an object known only through a "changed" entry
    pub fn placeholder(obj_id: ObjectId) -> Self {
        Self {
            obj_id,
            segment: 0,
            name: String::new(),
            size: String::new(),
            is_local: false,
            is_global: false,
            is_fixed: false,
            is_user_spec: false,
            is_lazy: false,
            read_only: false,
            sym_address: String::new(),
            copy_on_write_owner: CowOwner::Own,
            alloc_site: None,
        }
    }
}

/// Which of the two parallel views a plane is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaneKind {
    Segment,
    Offset,
}

impl PlaneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaneKind::Segment => "segment",
            PlaneKind::Offset => "offset",
        }
    }

    /// Parse the wire `type` tag ("segment", "segmentPlane", "offset", ...)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "segment" | "segmentplane" => Some(PlaneKind::Segment),
            "offset" | "offsetplane" => Some(PlaneKind::Offset),
            _ => None,
        }
    }
}

impl fmt::Display for PlaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One addressable view of an object's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plane {
    pub kind: PlaneKind,
    pub memory_object_id: u64,
    /// Root of the copy-on-write chain this plane derives from
    pub root_object: String,
    pub size_bound: u64,
    pub initialized: bool,
    pub symbolic: bool,
    /// Fill value for bytes never written
    pub initial_value: String,
    pub bytes: ByteDiff,
    pub updates: UpdateLog,
}

impl Plane {
    /// Empty plane with default metadata
    pub fn new(kind: PlaneKind) -> Self {
        Self {
            kind,
            memory_object_id: 0,
            root_object: String::new(),
            size_bound: 0,
            initialized: false,
            symbolic: false,
            initial_value: "0".to_string(),
            bytes: ByteDiff::new(),
            updates: UpdateLog::new(),
        }
    }

    pub fn with_bytes(mut self, bytes: ByteDiff) -> Self {
        self.bytes = bytes;
        self
    }

    pub fn with_updates(mut self, updates: UpdateLog) -> Self {
        self.updates = updates;
        self
    }

    /// Copy with byte deletions dropped, for content that has no base plane
    pub fn standalone(&self) -> Plane {
        Plane {
            bytes: self.bytes.normalized(),
            ..self.clone()
        }
    }
}

/// Full state of one memory object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectState {
    #[serde(flatten)]
    pub header: ObjectHeader,
    pub segment_plane: Option<Plane>,
    pub offset_plane: Option<Plane>,
}

impl ObjectState {
    pub fn new(header: ObjectHeader) -> Self {
        Self {
            header,
            segment_plane: None,
            offset_plane: None,
        }
    }

    pub fn obj_id(&self) -> ObjectId {
        self.header.obj_id
    }

    pub fn with_segment_plane(mut self, plane: Plane) -> Self {
        self.segment_plane = Some(plane);
        self
    }

    pub fn with_offset_plane(mut self, plane: Plane) -> Self {
        self.offset_plane = Some(plane);
        self
    }

    /// Present planes, segment plane first
    pub fn planes(&self) -> impl Iterator<Item = &Plane> {
        self.segment_plane.iter().chain(self.offset_plane.iter())
    }

    pub fn planes_mut(&mut self) -> impl Iterator<Item = &mut Plane> {
        self.segment_plane.iter_mut().chain(self.offset_plane.iter_mut())
    }
}

/// A "changed" entry: only the plane content that moved since the parent.
///
/// The engine may repeat the object's metadata on a change record; when it
/// does, it is kept so the object can be rebuilt if its addition is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectChange {
    pub obj_id: ObjectId,
    pub header: Option<ObjectHeader>,
    pub segment_plane: Option<Plane>,
    pub offset_plane: Option<Plane>,
}

impl ObjectChange {
    pub fn new(obj_id: ObjectId) -> Self {
        Self {
            obj_id,
            header: None,
            segment_plane: None,
            offset_plane: None,
        }
    }

    pub fn with_segment_plane(mut self, plane: Plane) -> Self {
        self.segment_plane = Some(plane);
        self
    }

    pub fn with_offset_plane(mut self, plane: Plane) -> Self {
        self.offset_plane = Some(plane);
        self
    }

    /// Build a standalone object from this change alone.
    ///
    /// Byte deletions have no base to apply to, so only additions are kept.
    pub fn to_state(&self) -> ObjectState {
        ObjectState {
            header: self
                .header
                .clone()
                .unwrap_or_else(|| ObjectHeader::placeholder(self.obj_id)),
            segment_plane: self.segment_plane.as_ref().map(Plane::standalone),
            offset_plane: self.offset_plane.as_ref().map(Plane::standalone),
        }
    }
}

/// Marks an object as no longer live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deletion {
    pub obj_id: ObjectId,
}

/// One tree node's memory change relative to its parent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub additions: Vec<ObjectState>,
    pub changes: Vec<ObjectChange>,
    pub deletions: Vec<Deletion>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.changes.is_empty() && self.deletions.is_empty()
    }

    /// Number of object entries across all three sections
    pub fn len(&self) -> usize {
        self.additions.len() + self.changes.len() + self.deletions.len()
    }

    /// First object named in more than one section, if any
    pub fn overlapping_object(&self) -> Option<ObjectId> {
        let mut sections: HashMap<ObjectId, u8> = HashMap::new();
        let ids = self
            .additions
            .iter()
            .map(|state| (state.obj_id(), 0b001))
            .chain(self.changes.iter().map(|change| (change.obj_id, 0b010)))
            .chain(self.deletions.iter().map(|deletion| (deletion.obj_id, 0b100)));

        for (obj_id, section) in ids {
            let seen = sections.entry(obj_id).or_default();
            if *seen != 0 && *seen & section == 0 {
                return Some(obj_id);
            }
            *seen |= section;
        }
        None
    }
}
