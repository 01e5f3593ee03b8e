//! Reconstructed memory at one tree node

use std::collections::BTreeMap;

use serde::Serialize;

use super::model::{ObjectId, ObjectState};

/// Every live object at a node, with additive-only byte content.
///
/// Only the current live set is recorded. Whether an absent object was
/// deleted or never existed is answered by a separate ancestry walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompleteMemory {
    objects: BTreeMap<ObjectId, ObjectState>,
}

impl CompleteMemory {
    pub(crate) fn from_live(objects: BTreeMap<ObjectId, ObjectState>) -> Self {
        Self { objects }
    }

    /// Live objects in ascending id order
    pub fn objects(&self) -> impl Iterator<Item = &ObjectState> {
        self.objects.values()
    }

    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    pub fn get(&self, obj_id: ObjectId) -> Option<&ObjectState> {
        self.objects.get(&obj_id)
    }

    pub fn contains(&self, obj_id: ObjectId) -> bool {
        self.objects.contains_key(&obj_id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
