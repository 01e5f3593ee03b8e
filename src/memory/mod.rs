//! Memory delta model and merge layers
//!
//! Each execution-tree node stores only the change in memory relative to
//! its parent. The types here describe those changes and the pure functions
//! that fold them into full object state.

pub mod byte_diff;
pub mod merge;
pub mod model;
pub mod snapshot;
pub mod update_log;

pub use byte_diff::{ByteDiff, ByteValue, Offset};
pub use merge::{merge_object, merge_plane, MergeError};
pub use model::{
    AllocSite, CowOwner, Deletion, Delta, ObjectChange, ObjectHeader, ObjectId, ObjectState,
    Plane, PlaneKind,
};
pub use snapshot::CompleteMemory;
pub use update_log::{UpdateEntry, UpdateLog};
