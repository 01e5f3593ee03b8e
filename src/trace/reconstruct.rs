//! Memory reconstruction
//!
//! Folds the deltas on the path from the root down to a node into that
//! node's complete memory. The walk is strictly root first: a "changed"
//! entry is relative to everything its ancestors built, and composing out
//! of order yields a wrong but plausible snapshot.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{error, warn};

use crate::memory::{
    merge_object, CompleteMemory, MergeError, ObjectChange, ObjectId, ObjectState, Offset,
    PlaneKind,
};
use crate::trace::tree::{ExecutionTree, NodeId, TreeError};

/// An upstream invariant break. Reconstruction of the affected subtree
/// cannot be trusted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralViolation {
    #[error("object {obj_id} appears in more than one section of node {node}'s delta")]
    OverlappingSections { node: NodeId, obj_id: ObjectId },
    #[error("object {obj_id} ends with residual byte deletions in its {plane} plane")]
    ResidualDeletions { obj_id: ObjectId, plane: PlaneKind },
    #[error("object {obj_id} holds more than one value at offsets {offsets:?} in its {plane} plane")]
    OverlappingOffsets {
        obj_id: ObjectId,
        plane: PlaneKind,
        offsets: Vec<Offset>,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconstructError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("structural violation: {0}")]
    Structural(#[from] StructuralViolation),
    #[error("merge failed at node {node}: {source}")]
    Merge {
        node: NodeId,
        #[source]
        source: MergeError,
    },
}

/// A dangling reference that was recovered from locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconstructWarning {
    /// A change named an object with no live state; the change itself was
    /// taken as the object's content
    ChangeWithoutAddition { node: NodeId, obj_id: ObjectId },
    /// A change brought a plane the live object did not have; its byte
    /// deletions had nothing to apply to and were dropped
    ChangeWithoutPlane {
        node: NodeId,
        obj_id: ObjectId,
        plane: PlaneKind,
    },
    /// A deletion named an object that was not live
    DeleteOfAbsent { node: NodeId, obj_id: ObjectId },
}

/// Where an object stands at a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStatus {
    Live,
    /// Deleted by the delta of `at` and not re-added since
    Deleted { at: NodeId },
    NeverExisted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconstructOptions {
    /// Treat residual byte deletions in a snapshot as an error. When off
    /// they are logged and dropped.
    pub strict: bool,
}

impl Default for ReconstructOptions {
    fn default() -> Self {
        Self { strict: true }
    }
}

/// Read-only view over a finished tree that rebuilds node memory
#[derive(Debug, Clone, Copy)]
pub struct Reconstructor<'t> {
    tree: &'t ExecutionTree,
    options: ReconstructOptions,
}

impl<'t> Reconstructor<'t> {
    pub fn new(tree: &'t ExecutionTree) -> Self {
        Self {
            tree,
            options: ReconstructOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ReconstructOptions) -> Self {
        self.options = options;
        self
    }

    pub fn reconstruct(&self, node: NodeId) -> Result<CompleteMemory, ReconstructError> {
        self.reconstruct_with_report(node).map(|(memory, _)| memory)
    }

    /// Reconstruct `node`, also returning the dangling references recovered
    /// along the way
    pub fn reconstruct_with_report(
        &self,
        node: NodeId,
    ) -> Result<(CompleteMemory, Vec<ReconstructWarning>), ReconstructError> {
        let mut warnings = Vec::new();
        let mut live: BTreeMap<ObjectId, ObjectState> = BTreeMap::new();

        for step in self.root_first(node)? {
            let Some(delta) = self.tree.delta(step) else {
                continue;
            };
            if let Some(obj_id) = delta.overlapping_object() {
                return Err(StructuralViolation::OverlappingSections { node: step, obj_id }.into());
            }

            for added in &delta.additions {
                live.insert(added.obj_id(), added.clone());
            }

            for change in &delta.changes {
                let next = match live.get(&change.obj_id) {
                    Some(old) => {
                        warnings.extend(unbased_planes(step, old, change));
                        merge_object(old, change)
                            .map_err(|source| ReconstructError::Merge { node: step, source })?
                    }
                    None => {
                        warn!(node = %step, obj_id = %change.obj_id, "Change for an object that is not live");
                        warnings.push(ReconstructWarning::ChangeWithoutAddition {
                            node: step,
                            obj_id: change.obj_id,
                        });
                        change.to_state()
                    }
                };
                live.insert(change.obj_id, next);
            }

            for deletion in &delta.deletions {
                if live.remove(&deletion.obj_id).is_none() {
                    warn!(node = %step, obj_id = %deletion.obj_id, "Deletion of an object that is not live");
                    warnings.push(ReconstructWarning::DeleteOfAbsent {
                        node: step,
                        obj_id: deletion.obj_id,
                    });
                }
            }
        }

        self.settle(&mut live)?;
        Ok((CompleteMemory::from_live(live), warnings))
    }

    /// Where `obj_id` stands at `node`, by replaying the object's lifecycle
    pub fn object_status(
        &self,
        node: NodeId,
        obj_id: ObjectId,
    ) -> Result<ObjectStatus, ReconstructError> {
        let mut status = ObjectStatus::NeverExisted;

        for step in self.root_first(node)? {
            let Some(delta) = self.tree.delta(step) else {
                continue;
            };
            if delta.additions.iter().any(|added| added.obj_id() == obj_id)
                || delta.changes.iter().any(|change| change.obj_id == obj_id)
            {
                status = ObjectStatus::Live;
            }
            if status == ObjectStatus::Live
                && delta.deletions.iter().any(|deletion| deletion.obj_id == obj_id)
            {
                status = ObjectStatus::Deleted { at: step };
            }
        }

        Ok(status)
    }

    /// Objects that were live at some ancestor of `node` and are gone at it
    pub fn deleted_objects(&self, node: NodeId) -> Result<BTreeSet<ObjectId>, ReconstructError> {
        let mut seen: BTreeSet<ObjectId> = BTreeSet::new();
        let mut live: BTreeSet<ObjectId> = BTreeSet::new();

        for step in self.root_first(node)? {
            let Some(delta) = self.tree.delta(step) else {
                continue;
            };
            let introduced = delta
                .additions
                .iter()
                .map(|added| added.obj_id())
                .chain(delta.changes.iter().map(|change| change.obj_id));
            for obj_id in introduced {
                seen.insert(obj_id);
                live.insert(obj_id);
            }
            for deletion in &delta.deletions {
                live.remove(&deletion.obj_id);
            }
        }

        Ok(seen.difference(&live).copied().collect())
    }

    fn root_first(&self, node: NodeId) -> Result<Vec<NodeId>, ReconstructError> {
        let mut chain = self.tree.ancestry(node)?;
        chain.reverse();
        Ok(chain)
    }

    /// A finished snapshot must be additive-only, with one value per offset
    fn settle(&self, live: &mut BTreeMap<ObjectId, ObjectState>) -> Result<(), ReconstructError> {
        for (obj_id, state) in live.iter_mut() {
            for plane in state.planes_mut() {
                if !plane.bytes.is_additive() {
                    let violation = StructuralViolation::ResidualDeletions {
                        obj_id: *obj_id,
                        plane: plane.kind,
                    };
                    if self.options.strict {
                        return Err(violation.into());
                    }
                    error!(error = %violation, "Dropping residual deletions from snapshot");
                    plane.bytes = plane.bytes.normalized();
                }

                let offsets = plane.bytes.overlapping_offsets();
                if !offsets.is_empty() {
                    let violation = StructuralViolation::OverlappingOffsets {
                        obj_id: *obj_id,
                        plane: plane.kind,
                        offsets,
                    };
                    if self.options.strict {
                        return Err(violation.into());
                    }
                    error!(error = %violation, "Snapshot keeps ambiguous byte values");
                }
            }
        }
        Ok(())
    }
}

/// Planes of `change` carrying deletions that `old` has no plane for
fn unbased_planes(node: NodeId, old: &ObjectState, change: &ObjectChange) -> Vec<ReconstructWarning> {
    let slots = [
        (PlaneKind::Segment, &old.segment_plane, &change.segment_plane),
        (PlaneKind::Offset, &old.offset_plane, &change.offset_plane),
    ];
    slots
        .into_iter()
        .filter_map(|(plane, base, incoming)| match (base, incoming) {
            (None, Some(incoming)) if !incoming.bytes.is_additive() => {
                warn!(%node, obj_id = %change.obj_id, %plane, "Change deletes bytes from a plane that is not live");
                Some(ReconstructWarning::ChangeWithoutPlane {
                    node,
                    obj_id: change.obj_id,
                    plane,
                })
            }
            _ => None,
        })
        .collect()
}
