//! Trace ingestion
//!
//! [`IngestContext`] owns the tree while records are applied to it, so no
//! reconstruction can observe a half-linked ancestor chain. Once ingestion
//! is done, [`IngestContext::finish`] hands the tree off read-only.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::memory::Delta;
use crate::trace::records::{parse_delta, DeltaError, TraceRecord};
use crate::trace::tree::{ExecutionTree, NodeId};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("malformed delta for node {node}: {source}")]
    MalformedDelta {
        node: NodeId,
        #[source]
        source: DeltaError,
    },
    #[error("a delta for node {0} was already recorded")]
    DuplicateDelta(NodeId),
    #[error("node {0} was declared twice")]
    DuplicateNode(NodeId),
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("node {0} cannot be its own parent")]
    SelfLoop(NodeId),
    #[error("node {child} already has parent {existing}, refusing to link it under {parent}")]
    Reparent {
        child: NodeId,
        parent: NodeId,
        existing: NodeId,
    },
    #[error("line {line}: {source}")]
    InvalidRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of an ingestion pass
#[derive(Debug, Default)]
pub struct IngestReport {
    pub nodes: usize,
    pub edges: usize,
    pub deltas: usize,
    /// Records that were rejected; the load carried on past each of them
    pub failures: Vec<IngestError>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold a later pass into this one
    pub fn absorb(&mut self, later: IngestReport) {
        self.nodes += later.nodes;
        self.edges += later.edges;
        self.deltas += later.deltas;
        self.failures.extend(later.failures);
    }
}

/// Incrementally populated ingestion state
#[derive(Debug, Default)]
pub struct IngestContext {
    tree: ExecutionTree,
    /// Children linked under a parent that has not been declared yet
    pending_children: HashMap<NodeId, Vec<NodeId>>,
    /// Nodes whose delta or parent link changed during this pass
    touched: BTreeSet<NodeId>,
    report: IngestReport,
}

impl IngestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume ingestion on top of an already finished tree
    pub fn from_tree(tree: ExecutionTree) -> Self {
        let mut pending_children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (parent, child) in tree.dangling_links() {
            pending_children.entry(parent).or_default().push(child);
        }
        Self {
            tree,
            pending_children,
            ..Self::default()
        }
    }

    pub fn tree(&self) -> &ExecutionTree {
        &self.tree
    }

    pub fn report(&self) -> &IngestReport {
        &self.report
    }

    pub fn touched(&self) -> &BTreeSet<NodeId> {
        &self.touched
    }

    /// Declare a node
    pub fn add_node(&mut self, id: NodeId) -> Result<(), IngestError> {
        if self.tree.contains(id) {
            return Err(IngestError::DuplicateNode(id));
        }
        let node = self.tree.insert_node(id);
        if let Some(children) = self.pending_children.remove(&id) {
            debug!(node = %id, count = children.len(), "Attached children linked before their parent");
            node.children = children;
        }
        self.touched.insert(id);
        self.report.nodes += 1;
        Ok(())
    }

    /// Link `child` under `parent`.
    ///
    /// The parent does not have to be declared yet; until it is, the child's
    /// subtree cannot be reconstructed.
    pub fn add_edge(&mut self, parent: NodeId, child: NodeId) -> Result<(), IngestError> {
        if parent == child {
            return Err(IngestError::SelfLoop(child));
        }
        let node = self
            .tree
            .node_mut(child)
            .ok_or(IngestError::UnknownNode(child))?;
        if let Some(existing) = node.parent {
            return Err(IngestError::Reparent {
                child,
                parent,
                existing,
            });
        }
        node.parent = Some(parent);

        match self.tree.node_mut(parent) {
            Some(parent_node) => parent_node.children.push(child),
            None => {
                warn!(parent = %parent, child = %child, "Edge names an undeclared parent");
                self.pending_children.entry(parent).or_default().push(child);
            }
        }
        self.touched.insert(child);
        self.report.edges += 1;
        Ok(())
    }

    /// Decode and attach a node's delta.
    ///
    /// A malformed delta leaves the node with an empty delta and is returned
    /// as an error; the node still counts as having its delta recorded.
    pub fn record_delta(&mut self, node: NodeId, body: &Value) -> Result<(), IngestError> {
        let slot = self
            .tree
            .node_mut(node)
            .ok_or(IngestError::UnknownNode(node))?;
        if slot.delta.is_some() {
            return Err(IngestError::DuplicateDelta(node));
        }

        let (delta, outcome) = match parse_delta(body) {
            Ok(delta) => {
                debug!(node = %node, entries = delta.len(), "Recorded delta");
                (delta, Ok(()))
            }
            Err(source) => (
                Delta::default(),
                Err(IngestError::MalformedDelta { node, source }),
            ),
        };
        slot.delta = Some(delta);
        self.touched.insert(node);
        self.report.deltas += 1;

        outcome
    }

    /// Apply one decoded record
    pub fn apply(&mut self, record: TraceRecord) -> Result<(), IngestError> {
        match record {
            TraceRecord::Node { id } => self.add_node(id),
            TraceRecord::Edge { parent, child } => self.add_edge(parent, child),
            TraceRecord::Memory { node, delta } => self.record_delta(node, &delta),
        }
    }

    /// Ingest a JSON Lines stream.
    ///
    /// Bad lines and rejected records are logged and collected in the report;
    /// only a read failure stops the pass.
    pub fn ingest_reader<R: BufRead>(&mut self, reader: R) -> Result<(), IngestError> {
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let outcome = serde_json::from_str::<TraceRecord>(&line)
                .map_err(|source| IngestError::InvalidRecord {
                    line: idx + 1,
                    source,
                })
                .and_then(|record| self.apply(record));

            if let Err(e) = outcome {
                warn!(line = idx + 1, error = %e, "Skipping trace record");
                self.report.failures.push(e);
            }
        }
        Ok(())
    }

    pub fn ingest_file(&mut self, path: &Path) -> Result<(), IngestError> {
        let file = File::open(path)?;
        self.ingest_reader(BufReader::new(file))
    }

    /// Hand the finished tree off for read-only use
    pub fn finish(self) -> (ExecutionTree, IngestReport) {
        if !self.pending_children.is_empty() {
            warn!(
                parents = self.pending_children.len(),
                "Trace ended with edges under undeclared parents"
            );
        }
        (self.tree, self.report)
    }
}

/// Ingest a whole trace file in one pass
pub fn load_trace(path: &Path) -> Result<(ExecutionTree, IngestReport), IngestError> {
    let mut ctx = IngestContext::new();
    ctx.ingest_file(path)?;
    Ok(ctx.finish())
}

/// Convenience for callers that already hold decoded deltas
pub fn tree_from_deltas<I>(edges: &[(NodeId, NodeId)], deltas: I) -> ExecutionTree
where
    I: IntoIterator<Item = (NodeId, Delta)>,
{
    let mut tree = ExecutionTree::new();
    for (id, delta) in deltas {
        tree.insert_node(id).delta = Some(delta);
    }
    for &(parent, child) in edges {
        tree.insert_node(parent).children.push(child);
        tree.insert_node(child).parent = Some(parent);
    }
    tree
}
