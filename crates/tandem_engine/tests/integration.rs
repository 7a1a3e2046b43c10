//! End-to-end tests for the sync engine over in-memory stores.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tandem_core::{FieldPatch, Record, SyncConfig, SyncConfigOverrides};
use tandem_engine::SyncEngine;
use tandem_store::{MemoryGraphStore, MemoryPrimaryStore};

fn record(value: serde_json::Value) -> Record {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

fn test_config() -> SyncConfig {
    SyncConfig::new()
        .with_debounce(Duration::from_millis(100))
        .with_max_wait(Duration::from_secs(1))
        .with_retry_base_delay(Duration::from_millis(1))
}

fn engine() -> (
    SyncEngine<MemoryPrimaryStore, MemoryGraphStore>,
    Arc<MemoryPrimaryStore>,
    Arc<MemoryGraphStore>,
) {
    let primary = Arc::new(MemoryPrimaryStore::new());
    let graph = Arc::new(MemoryGraphStore::new());
    let engine = SyncEngine::new(test_config(), Arc::clone(&primary), Arc::clone(&graph));
    (engine, primary, graph)
}

#[tokio::test(start_paused = true)]
async fn insert_then_update_commits_one_merged_row() {
    let (engine, primary, _) = engine();

    engine.track_node_insert("a", record(json!({"name": "draft"})));
    engine.track_node_update("a", vec![FieldPatch::replace("name", json!("X"))]);
    engine.force_flush().await;

    // Exactly one insert reached the store, already carrying the update.
    let log = primary.applied_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].op, "insert");
    assert_eq!(primary.node(&"a".into()).unwrap()["name"], json!("X"));
}

#[tokio::test(start_paused = true)]
async fn edge_tracked_first_still_commits_after_its_node() {
    let (engine, primary, _) = engine();

    engine.track_edge_insert("e1", record(json!({"source": "a", "target": "b"})));
    engine.track_node_insert("a", record(json!({})));
    engine.track_node_insert("b", record(json!({})));
    engine.force_flush().await;

    let log = primary.applied_log();
    let node_pos = log
        .iter()
        .position(|row| row.id.as_str() == "a")
        .expect("node a committed");
    let edge_pos = log
        .iter()
        .position(|row| row.id.as_str() == "e1")
        .expect("edge e1 committed");
    assert!(node_pos < edge_pos, "node row must commit before edge row");
}

#[tokio::test(start_paused = true)]
async fn threshold_of_one_flushes_immediately() {
    let (engine, primary, _) = engine();
    engine.start();
    engine.set_config(SyncConfigOverrides {
        max_deltas_before_flush: Some(1),
        ..Default::default()
    });

    engine.track_node_insert("a", record(json!({})));
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert!(primary.node(&"a".into()).is_some());
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn at_least_once_delivery_under_transient_failures() {
    let (engine, primary, _) = engine();
    engine.set_config(SyncConfigOverrides {
        retry_attempts: Some(3),
        ..Default::default()
    });

    // Fail twice, then recover: fewer failures than retry attempts.
    primary.fail_next_applies(2);

    engine.track_node_insert("a", record(json!({"name": "x"})));
    engine.track_node_insert("b", record(json!({"name": "y"})));
    let result = engine.force_flush().await;

    assert!(result.success);
    assert_eq!(primary.apply_calls(), 3);

    // Every delta reached the store exactly once.
    let inserts: Vec<_> = primary
        .applied_log()
        .iter()
        .filter(|row| row.op == "insert")
        .map(|row| row.id.as_str().to_owned())
        .collect();
    assert_eq!(inserts.len(), 2);
    assert!(primary.node(&"a".into()).is_some());
    assert!(primary.node(&"b".into()).is_some());
}

#[tokio::test(start_paused = true)]
async fn insert_then_delete_never_reaches_either_store() {
    let (engine, primary, graph) = engine();

    engine.track_node_insert("ghost", record(json!({})));
    engine.track_node_delete("ghost");
    let result = engine.force_flush().await;

    assert!(result.success);
    assert_eq!(result.total_rows(), 0);
    assert!(primary.applied_log().is_empty());
    assert_eq!(graph.node_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn bounded_staleness_despite_debounce_resets() {
    let (engine, primary, _) = engine();
    engine.start();

    engine.track_node_insert("a", record(json!({})));
    let mut committed_at_ms = None;

    // Mutate every 50ms so the 100ms debounce never fires on its own.
    for tick in 1..=40u64 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if primary.node(&"a".into()).is_some() {
            committed_at_ms = Some(tick * 50);
            break;
        }
        engine.track_node_update("a", vec![FieldPatch::replace("tick", json!(tick))]);
    }

    // max_wait is 1s: the first delta must be included in a flush no later
    // than t0 + max_wait.
    let committed_at_ms = committed_at_ms.expect("delta never flushed");
    assert!(committed_at_ms <= 1050, "flushed only after {committed_at_ms}ms");

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn committed_batch_streams_to_graph_store() {
    let (engine, _, graph) = engine();

    engine.track_node_insert("a", record(json!({"name": "note"})));
    engine.track_node_insert("b", record(json!({"name": "other"})));
    engine.track_edge_insert("e1", record(json!({"source": "a", "target": "b", "kind": "ref"})));
    engine.force_flush().await;

    assert_eq!(graph.node_count(), 2);
    let edge = graph.edge(&"e1".into()).unwrap();
    assert_eq!(edge.source.as_str(), "a");
    assert_eq!(edge.target.as_str(), "b");
}

#[tokio::test(start_paused = true)]
async fn graph_failure_does_not_fail_the_primary_commit() {
    let (engine, primary, graph) = engine();
    graph.fail_next(10);

    engine.track_node_insert("a", record(json!({})));
    let result = engine.force_flush().await;

    assert!(result.success);
    assert!(primary.node(&"a".into()).is_some());
    assert_eq!(graph.node_count(), 0);
    // The failure is swallowed: nothing pending, no requeue.
    assert!(!engine.has_pending_changes());
}

#[tokio::test(start_paused = true)]
async fn hydrate_then_edit_round_trip() {
    let (engine, primary, _) = engine();
    primary.seed_node("root", record(json!({"name": "workspace"})));
    primary.seed_node("child", record(json!({"parent": "root", "updated_at": 1})));
    primary.seed_edge("e1", record(json!({"source": "root", "target": "child"})));

    let graph = engine.hydrate().await.unwrap();
    assert_eq!(graph.nodes_loaded, 2);
    assert_eq!(graph.edges_loaded, 1);

    let status = engine.status();
    assert!(status.is_hydrated);
    assert!(!status.is_hydrating);

    // The hydrated app keeps editing through the same engine.
    engine.track_node_update("child", vec![FieldPatch::replace("name", json!("renamed"))]);
    engine.force_flush().await;
    assert_eq!(primary.node(&"child".into()).unwrap()["name"], json!("renamed"));
}

#[tokio::test(start_paused = true)]
async fn progressive_hydration_loads_every_node_exactly_once() {
    let (engine, primary, _) = engine();
    for i in 0..20 {
        let parent = if i % 4 == 0 {
            json!({})
        } else {
            json!({"parent": format!("n{}", i - (i % 4)), "updated_at": i})
        };
        let mut rec = record(parent);
        rec.insert("name".into(), json!(format!("node {i}")));
        primary.seed_node(format!("n{i}"), rec);
    }
    engine.set_config(SyncConfigOverrides {
        progressive_threshold: Some(10),
        critical_limit: Some(6),
        visible_limit: Some(6),
        ..Default::default()
    });

    let graph = engine.hydrate().await.unwrap();

    assert_eq!(graph.nodes_loaded, 20);
    let mut ids: Vec<&str> = graph.nodes.iter().map(|r| r.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 20, "hydration produced duplicate nodes");
}

#[tokio::test(start_paused = true)]
async fn delete_tracked_during_failing_flush_cancels_cleanly() {
    let (engine, primary, _) = engine();
    engine.start();
    engine.set_config(SyncConfigOverrides {
        retry_attempts: Some(1),
        retry_base_delay: Some(Duration::from_millis(500)),
        ..Default::default()
    });
    primary.fail_next_applies(2);

    engine.track_node_insert("a", record(json!({})));

    // The debounce fires at 100ms; the first attempt fails and the writer
    // backs off 500ms. Track the delete inside that backoff window, while
    // the insert is in flight.
    tokio::time::sleep(Duration::from_millis(150)).await;
    engine.track_node_delete("a");

    // Let the retry fail too and the batch requeue.
    tokio::time::sleep(Duration::from_secs(1)).await;

    // The requeued insert met the pending delete and both cancelled: the
    // insert never committed, so nothing remains to do.
    assert!(!engine.has_pending_changes());
    assert!(primary.node(&"a".into()).is_none());
    assert!(engine.status().last_error.is_some());

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn subscription_follows_a_full_flush_cycle() {
    let (engine, _, _) = engine();
    let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _sub = engine.subscribe(move |status| {
        sink.lock().push((status.is_syncing, status.dirty_node_count));
    });

    engine.track_node_insert("a", record(json!({})));
    engine.force_flush().await;

    let seen = events.lock().clone();
    // Replay, dirty bump, syncing on, syncing off with counts drained.
    assert_eq!(seen.first(), Some(&(false, 0)));
    assert!(seen.contains(&(false, 1)));
    assert!(seen.contains(&(true, 1)));
    assert_eq!(seen.last(), Some(&(false, 0)));
}

#[tokio::test(start_paused = true)]
async fn config_change_applies_to_next_window() {
    let (engine, primary, _) = engine();
    engine.start();
    engine.set_config(SyncConfigOverrides {
        debounce: Some(Duration::from_millis(10)),
        ..Default::default()
    });

    engine.track_node_insert("a", record(json!({})));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(primary.node(&"a".into()).is_some());
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn edge_update_reaches_both_stores() {
    let (engine, primary, graph) = engine();
    primary.seed_node("a", record(json!({})));
    primary.seed_node("b", record(json!({})));
    primary.seed_edge("e1", record(json!({"source": "a", "target": "b", "weight": 1})));

    engine.track_edge_update("e1", vec![FieldPatch::replace("weight", json!(5))]);
    engine.force_flush().await;

    assert_eq!(primary.edge(&"e1".into()).unwrap()["weight"], json!(5));
    let edge = graph.edge(&"e1".into()).unwrap();
    assert_eq!(edge.properties["weight"], json!(5));
}
