//! Execution-tree traces
//!
//! This module ingests trace records into an execution tree and rebuilds
//! the memory of any node from the deltas above it.

pub mod cache;
pub mod explorer;
pub mod ingest;
pub mod records;
pub mod reconstruct;
pub mod tree;

pub use cache::SnapshotCache;
pub use explorer::MemoryExplorer;
pub use ingest::{load_trace, tree_from_deltas, IngestContext, IngestError, IngestReport};
pub use records::{parse_delta, DeltaError, TraceRecord};
pub use reconstruct::{
    ObjectStatus, ReconstructError, ReconstructOptions, ReconstructWarning, Reconstructor,
    StructuralViolation,
};
pub use tree::{ExecutionTree, NodeId, TreeError, TreeNode};
