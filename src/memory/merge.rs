//! Merging accumulated object state with incoming changes
//!
//! Every function here returns fresh values and leaves its inputs untouched,
//! so snapshots of nodes sharing ancestors never see each other's merges.

use thiserror::Error;

use super::model::{ObjectChange, ObjectId, ObjectState, Plane};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("cannot merge change for object {found} into object {expected}")]
    ObjectIdMismatch { expected: ObjectId, found: ObjectId },
}

/// Merge an accumulated plane with an incoming one.
///
/// An `old` plane with nothing incoming is carried forward as-is. An
/// incoming plane with no `old` to subtract from keeps only its additions.
/// When both are present, metadata stays with `old`; bytes are composed and
/// update logs merged in order.
pub fn merge_plane(old: Option<&Plane>, incoming: Option<&Plane>) -> Option<Plane> {
    match (old, incoming) {
        (None, None) => None,
        (Some(plane), None) => Some(plane.clone()),
        (None, Some(plane)) => Some(plane.standalone()),
        (Some(old), Some(incoming)) => Some(Plane {
            kind: old.kind,
            memory_object_id: old.memory_object_id,
            root_object: old.root_object.clone(),
            size_bound: old.size_bound,
            initialized: old.initialized,
            symbolic: old.symbolic,
            initial_value: old.initial_value.clone(),
            bytes: old.bytes.compose(&incoming.bytes),
            updates: old.updates.merged_with(&incoming.updates),
        }),
    }
}

/// Apply a "changed" entry to the accumulated state of the same object.
///
/// Metadata is never updated by a change; only plane content evolves.
pub fn merge_object(old: &ObjectState, change: &ObjectChange) -> Result<ObjectState, MergeError> {
    if old.obj_id() != change.obj_id {
        return Err(MergeError::ObjectIdMismatch {
            expected: old.obj_id(),
            found: change.obj_id,
        });
    }

    Ok(ObjectState {
        header: old.header.clone(),
        segment_plane: merge_plane(old.segment_plane.as_ref(), change.segment_plane.as_ref()),
        offset_plane: merge_plane(old.offset_plane.as_ref(), change.offset_plane.as_ref()),
    })
}
