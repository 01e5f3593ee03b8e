//! Per-node snapshot cache
//!
//! Reconstruction is a pure function of a node's ancestor chain, so results
//! can be kept until new deltas or links land above them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::memory::CompleteMemory;
use crate::trace::tree::{ExecutionTree, NodeId};

#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: RwLock<HashMap<NodeId, Arc<CompleteMemory>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: NodeId) -> Option<Arc<CompleteMemory>> {
        self.entries.read().get(&node).cloned()
    }

    /// Return the cached snapshot for `node`, computing it on a miss.
    ///
    /// The lock is not held while computing; two racing misses both compute
    /// and the first stored result wins.
    pub fn get_or_try_insert_with<E, F>(&self, node: NodeId, compute: F) -> Result<Arc<CompleteMemory>, E>
    where
        F: FnOnce() -> Result<CompleteMemory, E>,
    {
        if let Some(hit) = self.get(node) {
            return Ok(hit);
        }
        let fresh = Arc::new(compute()?);
        let mut entries = self.entries.write();
        Ok(entries.entry(node).or_insert(fresh).clone())
    }

    /// Drop `node` and everything below it. Returns how many entries went.
    pub fn invalidate_subtree(&self, tree: &ExecutionTree, node: NodeId) -> usize {
        let mut entries = self.entries.write();
        let mut removed = usize::from(entries.remove(&node).is_some());
        for id in tree.descendants(node) {
            if id != node && entries.remove(&id).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
