//! Integration tests for the explorer's snapshot cache

use std::io::Cursor;
use std::sync::Arc;
use std::thread;

use super::common::fixtures::{
    add_bytes, added_object, changed_bytes, concrete, delta, replace_bytes, TraceBuilder,
};
use memtrail::trace::ReconstructOptions;
use memtrail::{Config, MemoryExplorer, NodeId, ObjectId, Reconstructor};

/// 1 -> 2 -> 3 and 1 -> 4, with an object added at the root
fn base_trace() -> TraceBuilder {
    TraceBuilder::new()
        .node(1)
        .node(2)
        .node(3)
        .node(4)
        .edge(1, 2)
        .edge(2, 3)
        .edge(1, 4)
        .memory(
            1,
            delta(
                vec![added_object(1, "flag", add_bytes(vec![concrete("0", &[0])]))],
                vec![],
                vec![],
            ),
        )
}

fn open(builder: TraceBuilder, config: &Config) -> MemoryExplorer {
    let trace = builder.write();
    MemoryExplorer::open(trace.path(), config).expect("Failed to open trace")
}

#[test]
fn test_snapshots_are_cached_and_shared() {
    let explorer = open(base_trace(), &Config::default());
    assert_eq!(explorer.cached_snapshots(), 0);

    let first = explorer.snapshot(NodeId(3)).unwrap();
    let second = explorer.snapshot(NodeId(3)).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(explorer.cached_snapshots(), 1);
}

#[test]
fn test_cache_can_be_disabled_from_config() {
    let mut config = Config::default();
    config.reconstruct.cache = false;
    let explorer = open(base_trace(), &config);

    let first = explorer.snapshot(NodeId(2)).unwrap();
    let second = explorer.snapshot(NodeId(2)).unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first, second);
    assert_eq!(explorer.cached_snapshots(), 0);
}

#[test]
fn test_cached_result_matches_direct_reconstruction() {
    let explorer = open(base_trace(), &Config::default());

    for node in [1, 2, 3, 4] {
        let cached = explorer.snapshot(NodeId(node)).unwrap();
        let direct = Reconstructor::new(explorer.tree())
            .reconstruct(NodeId(node))
            .unwrap();
        assert_eq!(*cached, direct);
    }
}

#[test]
fn test_concurrent_queries_agree() {
    let explorer = open(base_trace(), &Config::default());

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let explorer = &explorer;
                scope.spawn(move || explorer.snapshot(NodeId(1 + i % 4)).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (i, memory) in results.iter().enumerate() {
        let expected = Reconstructor::new(explorer.tree())
            .reconstruct(NodeId(1 + i as u64 % 4))
            .unwrap();
        assert_eq!(**memory, expected);
    }
    assert_eq!(explorer.cached_snapshots(), 4);
}

#[test]
fn test_ingest_more_drops_only_affected_snapshots() {
    let mut explorer = open(base_trace(), &Config::default());
    for node in [1, 2, 3, 4] {
        explorer.snapshot(NodeId(node)).unwrap();
    }
    assert_eq!(explorer.cached_snapshots(), 4);

    let more = TraceBuilder::new().memory(
        2,
        delta(
            vec![],
            vec![changed_bytes(
                1,
                replace_bytes(vec![concrete("1", &[0])], vec![concrete("0", &[0])]),
            )],
            vec![],
        ),
    );
    explorer.ingest_more(Cursor::new(more.contents())).unwrap();

    // Node 2 and its child 3 were dropped; 1 and 4 survive
    assert_eq!(explorer.cached_snapshots(), 2);
    assert_eq!(explorer.report().deltas, 2);

    let below = explorer.snapshot(NodeId(3)).unwrap();
    let value = below
        .get(ObjectId(1))
        .and_then(|state| state.segment_plane.as_ref())
        .and_then(|plane| plane.bytes.value_at(0))
        .map(|value| value.token.clone());
    assert_eq!(value.as_deref(), Some("1"));

    let sibling = explorer.snapshot(NodeId(4)).unwrap();
    let untouched = sibling
        .get(ObjectId(1))
        .and_then(|state| state.segment_plane.as_ref())
        .and_then(|plane| plane.bytes.value_at(0))
        .map(|value| value.token.clone());
    assert_eq!(untouched.as_deref(), Some("0"));
}

#[test]
fn test_ingest_more_extends_the_tree() {
    let mut explorer = open(base_trace(), &Config::default());

    let more = TraceBuilder::new().node(5).edge(3, 5).memory(5, delta(vec![], vec![], vec![1]));
    explorer.ingest_more(Cursor::new(more.contents())).unwrap();

    assert_eq!(explorer.tree().parent(NodeId(5)), Some(NodeId(3)));
    assert_eq!(explorer.tree().children(NodeId(3)), &[NodeId(5)]);
    assert!(explorer.snapshot(NodeId(5)).unwrap().is_empty());
    assert!(explorer.snapshot(NodeId(3)).unwrap().contains(ObjectId(1)));
}

#[test]
fn test_ingest_more_links_a_late_parent() {
    let mut explorer = open(
        TraceBuilder::new().node(7).edge(6, 7),
        &Config::default(),
    );
    assert!(explorer.snapshot(NodeId(7)).is_err());

    let more = TraceBuilder::new().node(6).memory(
        6,
        delta(vec![added_object(2, "late", add_bytes(vec![]))], vec![], vec![]),
    );
    explorer.ingest_more(Cursor::new(more.contents())).unwrap();

    assert_eq!(explorer.tree().children(NodeId(6)), &[NodeId(7)]);
    assert!(explorer.snapshot(NodeId(7)).unwrap().contains(ObjectId(2)));
}

/// An addition that still carries byte deletions
fn residual_trace() -> TraceBuilder {
    TraceBuilder::new().node(1).memory(
        1,
        delta(
            vec![added_object(
                3,
                "r",
                replace_bytes(vec![concrete("2", &[0])], vec![concrete("3", &[1])]),
            )],
            vec![],
            vec![],
        ),
    )
}

#[test]
fn test_lenient_explorer_tolerates_residual_deletions() {
    let strict = open(residual_trace(), &Config::default());
    assert!(strict.snapshot(NodeId(1)).is_err());
    assert_eq!(strict.cached_snapshots(), 0);

    let mut config = Config::default();
    config.reconstruct.strict = false;
    let lenient = open(residual_trace(), &config);
    assert!(lenient.snapshot(NodeId(1)).unwrap().contains(ObjectId(3)));

    let overridden = open(residual_trace(), &Config::default())
        .with_options(ReconstructOptions { strict: false });
    assert!(overridden.snapshot(NodeId(1)).is_ok());
}
