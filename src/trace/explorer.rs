//! Front door for display code: a loaded trace plus a snapshot cache

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::memory::{CompleteMemory, ObjectId};
use crate::trace::cache::SnapshotCache;
use crate::trace::ingest::{IngestContext, IngestError, IngestReport};
use crate::trace::reconstruct::{
    ObjectStatus, ReconstructError, ReconstructOptions, Reconstructor,
};
use crate::trace::tree::{ExecutionTree, NodeId};

/// A finished execution tree that answers memory queries.
///
/// Queries take `&self` and may run from many threads at once. Appending
/// more records takes `&mut self`, so it can never overlap a query.
#[derive(Debug)]
pub struct MemoryExplorer {
    tree: ExecutionTree,
    report: IngestReport,
    options: ReconstructOptions,
    cache: Option<SnapshotCache>,
}

impl MemoryExplorer {
    pub fn new(tree: ExecutionTree, report: IngestReport) -> Self {
        Self {
            tree,
            report,
            options: ReconstructOptions::default(),
            cache: Some(SnapshotCache::new()),
        }
    }

    /// Load a trace file with the reconstruction settings from `config`
    pub fn open(path: &Path, config: &Config) -> Result<Self, IngestError> {
        let mut ctx = IngestContext::new();
        ctx.ingest_file(path)?;
        let (tree, report) = ctx.finish();
        info!(
            path = %path.display(),
            nodes = tree.len(),
            failures = report.failures.len(),
            "Loaded trace"
        );

        let explorer = Self::new(tree, report).with_options(config.reconstruct_options());
        Ok(if config.reconstruct.cache {
            explorer
        } else {
            explorer.without_cache()
        })
    }

    pub fn with_options(mut self, options: ReconstructOptions) -> Self {
        self.options = options;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn tree(&self) -> &ExecutionTree {
        &self.tree
    }

    pub fn report(&self) -> &IngestReport {
        &self.report
    }

    pub fn reconstructor(&self) -> Reconstructor<'_> {
        Reconstructor::new(&self.tree).with_options(self.options)
    }

    /// Complete memory at `node`, served from the cache when possible
    pub fn snapshot(&self, node: NodeId) -> Result<Arc<CompleteMemory>, ReconstructError> {
        let reconstructor = self.reconstructor();
        match &self.cache {
            Some(cache) => cache.get_or_try_insert_with(node, || reconstructor.reconstruct(node)),
            None => reconstructor.reconstruct(node).map(Arc::new),
        }
    }

    pub fn object_status(
        &self,
        node: NodeId,
        obj_id: ObjectId,
    ) -> Result<ObjectStatus, ReconstructError> {
        self.reconstructor().object_status(node, obj_id)
    }

    pub fn cached_snapshots(&self) -> usize {
        self.cache.as_ref().map_or(0, SnapshotCache::len)
    }

    /// Append more trace records, dropping cached snapshots below every node
    /// whose delta or parent link changed
    pub fn ingest_more<R: BufRead>(&mut self, reader: R) -> Result<(), IngestError> {
        let mut ctx = IngestContext::from_tree(std::mem::take(&mut self.tree));
        let outcome = ctx.ingest_reader(reader);
        let touched: Vec<NodeId> = ctx.touched().iter().copied().collect();
        let (tree, report) = ctx.finish();
        self.tree = tree;
        self.report.absorb(report);

        if let Some(cache) = &self.cache {
            let dropped: usize = touched
                .iter()
                .map(|node| cache.invalidate_subtree(&self.tree, *node))
                .sum();
            debug!(touched = touched.len(), dropped, "Invalidated cached snapshots");
        }

        outcome
    }
}
