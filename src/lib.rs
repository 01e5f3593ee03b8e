pub mod config;
pub mod memory;
pub mod trace;
pub mod util;

pub use config::Config;
pub use memory::{
    merge_object, merge_plane, ByteDiff, ByteValue, CompleteMemory, Delta, ObjectChange,
    ObjectId, ObjectState, Plane, PlaneKind, UpdateLog,
};
pub use trace::{
    ExecutionTree, IngestContext, IngestError, IngestReport, MemoryExplorer, NodeId,
    ObjectStatus, ReconstructError, Reconstructor, SnapshotCache,
};
