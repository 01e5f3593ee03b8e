//! Integration tests for loading traces with bad or out-of-order records

use super::common::fixtures::{add_bytes, added_object, concrete, delta, TraceBuilder};
use memtrail::memory::ObjectHeader;
use memtrail::trace::{load_trace, tree_from_deltas, DeltaError, TraceRecord};
use memtrail::{
    Delta, IngestContext, IngestError, NodeId, ObjectId, ObjectState, Reconstructor,
};
use serde_json::json;

#[test]
fn test_malformed_delta_does_not_abort_the_load() {
    let trace = TraceBuilder::new()
        .node(1)
        .node(2)
        .node(3)
        .edge(1, 2)
        .edge(2, 3)
        .memory(
            1,
            delta(
                vec![added_object(5, "v", add_bytes(vec![concrete("3", &[0])]))],
                vec![],
                vec![],
            ),
        )
        .memory(2, json!({"objects": {"added": [{"objID": "five"}]}}))
        .memory(
            3,
            delta(
                vec![added_object(6, "w", add_bytes(vec![]))],
                vec![],
                vec![],
            ),
        )
        .write();

    let (tree, report) = load_trace(trace.path()).unwrap();

    assert_eq!(report.nodes, 3);
    assert_eq!(report.deltas, 3);
    assert_eq!(report.failures.len(), 1);
    match &report.failures[0] {
        IngestError::MalformedDelta { node, source } => {
            assert_eq!(*node, NodeId(2));
            assert!(matches!(source, DeltaError::InvalidField { path, .. } if path.ends_with("objID")));
        }
        other => panic!("Unexpected failure: {other}"),
    }

    // The bad node keeps an empty delta, so its children still reconstruct
    assert_eq!(tree.delta(NodeId(2)), Some(&Delta::default()));
    let memory = Reconstructor::new(&tree).reconstruct(NodeId(3)).unwrap();
    let ids: Vec<ObjectId> = memory.object_ids().collect();
    assert_eq!(ids, vec![ObjectId(5), ObjectId(6)]);
}

#[test]
fn test_unparseable_lines_are_reported_by_number() {
    let trace = TraceBuilder::new()
        .node(1)
        .raw("{not json")
        .raw("")
        .raw(r#"{"type":"bogus"}"#)
        .node(2)
        .write();

    let (tree, report) = load_trace(trace.path()).unwrap();

    assert_eq!(tree.len(), 2);
    let lines: Vec<usize> = report
        .failures
        .iter()
        .filter_map(|failure| match failure {
            IngestError::InvalidRecord { line, .. } => Some(*line),
            _ => None,
        })
        .collect();
    assert_eq!(lines, vec![2, 4]);
}

#[test]
fn test_second_delta_for_a_node_is_rejected() {
    let first = delta(vec![added_object(1, "a", add_bytes(vec![]))], vec![], vec![]);
    let second = delta(vec![added_object(2, "b", add_bytes(vec![]))], vec![], vec![]);
    let trace = TraceBuilder::new()
        .node(1)
        .memory(1, first)
        .memory(1, second)
        .write();

    let (tree, report) = load_trace(trace.path()).unwrap();

    assert!(matches!(
        report.failures.as_slice(),
        [IngestError::DuplicateDelta(NodeId(1))]
    ));
    let memory = Reconstructor::new(&tree).reconstruct(NodeId(1)).unwrap();
    assert!(memory.contains(ObjectId(1)));
    assert!(!memory.contains(ObjectId(2)));
}

#[test]
fn test_parent_declared_after_its_edge_is_linked() {
    let trace = TraceBuilder::new()
        .node(2)
        .edge(1, 2)
        .node(1)
        .memory(1, delta(vec![added_object(4, "g", add_bytes(vec![]))], vec![], vec![]))
        .write();

    let (tree, report) = load_trace(trace.path()).unwrap();

    assert!(report.is_clean());
    assert_eq!(tree.children(NodeId(1)), &[NodeId(2)]);
    assert_eq!(tree.roots(), vec![NodeId(1)]);
    assert!(Reconstructor::new(&tree)
        .reconstruct(NodeId(2))
        .unwrap()
        .contains(ObjectId(4)));
}

#[test]
fn test_rejected_links_are_collected() {
    let trace = TraceBuilder::new()
        .node(1)
        .node(2)
        .node(3)
        .edge(1, 2)
        .edge(3, 2)
        .edge(1, 8)
        .edge(3, 3)
        .node(1)
        .write();

    let (tree, report) = load_trace(trace.path()).unwrap();

    assert_eq!(tree.parent(NodeId(2)), Some(NodeId(1)));
    assert_eq!(report.failures.len(), 4);
    assert!(matches!(
        report.failures[0],
        IngestError::Reparent {
            child: NodeId(2),
            parent: NodeId(3),
            existing: NodeId(1),
        }
    ));
    assert!(matches!(report.failures[1], IngestError::UnknownNode(NodeId(8))));
    assert!(matches!(report.failures[2], IngestError::SelfLoop(NodeId(3))));
    assert!(matches!(report.failures[3], IngestError::DuplicateNode(NodeId(1))));
}

#[test]
fn test_context_applies_decoded_records() {
    let mut ctx = IngestContext::new();
    let records: Vec<TraceRecord> = [
        json!({"type": "node", "id": 10}),
        json!({"type": "node", "id": 11}),
        json!({"type": "edge", "parent": 10, "child": 11}),
    ]
    .into_iter()
    .map(|value| serde_json::from_value(value).unwrap())
    .collect();

    for record in records {
        ctx.apply(record).unwrap();
    }

    assert_eq!(ctx.tree().parent(NodeId(11)), Some(NodeId(10)));
    let touched: Vec<NodeId> = ctx.touched().iter().copied().collect();
    assert_eq!(touched, vec![NodeId(10), NodeId(11)]);

    let (_, report) = ctx.finish();
    assert_eq!((report.nodes, report.edges, report.deltas), (2, 1, 0));
}

#[test]
fn test_tree_from_decoded_deltas() {
    let root = Delta {
        additions: vec![ObjectState::new(ObjectHeader::placeholder(ObjectId(1)))],
        ..Delta::default()
    };
    let tree = tree_from_deltas(&[(NodeId(1), NodeId(2))], [(NodeId(1), root)]);

    let memory = Reconstructor::new(&tree).reconstruct(NodeId(2)).unwrap();
    assert!(memory.contains(ObjectId(1)));
}
