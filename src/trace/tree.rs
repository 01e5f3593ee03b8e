//! Execution tree: an index-based node table with parent/child links

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::Delta;

/// Stable identifier of an execution-tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("ancestor {missing} of node {node} is not in the tree")]
    MissingAncestor { node: NodeId, missing: NodeId },
    #[error("parent links starting at node {0} form a cycle")]
    Cycle(NodeId),
}

/// One node of the tree
#[derive(Debug, Clone, Default)]
pub struct TreeNode {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// `None` until a memory record has been ingested for the node
    pub delta: Option<Delta>,
}

/// Node table keyed by id. Children are owned through the table; parents
/// are plain id back-references.
#[derive(Debug, Clone, Default)]
pub struct ExecutionTree {
    nodes: HashMap<NodeId, TreeNode>,
}

impl ExecutionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn delta(&self, id: NodeId) -> Option<&Delta> {
        self.nodes.get(&id).and_then(|node| node.delta.as_ref())
    }

    /// All node ids, ascending
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Nodes without a parent link, ascending
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(id, _)| *id)
            .collect();
        roots.sort_unstable();
        roots
    }

    /// Path from `id` up to its root, leaf first
    pub fn ancestry(&self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut current = self.nodes.get(&id).ok_or(TreeError::UnknownNode(id))?;
        let mut path = vec![id];
        let mut seen: HashSet<NodeId> = HashSet::from([id]);

        while let Some(parent) = current.parent {
            if !seen.insert(parent) {
                return Err(TreeError::Cycle(id));
            }
            current = self.nodes.get(&parent).ok_or(TreeError::MissingAncestor {
                node: id,
                missing: parent,
            })?;
            path.push(parent);
        }

        Ok(path)
    }

    /// `id` and every node below it, parents before children
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    pub(crate) fn insert_node(&mut self, id: NodeId) -> &mut TreeNode {
        self.nodes.entry(id).or_default()
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(&id)
    }

    /// Nodes whose parent link points outside the table
    pub(crate) fn dangling_links(&self) -> Vec<(NodeId, NodeId)> {
        let mut dangling: Vec<(NodeId, NodeId)> = self
            .nodes
            .iter()
            .filter_map(|(id, node)| node.parent.map(|parent| (parent, *id)))
            .filter(|(parent, _)| !self.nodes.contains_key(parent))
            .collect();
        dangling.sort_unstable();
        dangling
    }
}
