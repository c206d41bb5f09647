//! End-to-end tests for the execution engine.
//!
//! Most tests build their own catalog and cache so they can run in parallel;
//! the ones touching the process-wide registry or default cache take
//! `GLOBAL_LOCK` and reset both first.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nodes::mock::MockNode;
use nodes::{LookupError, Node, NodeDescriptor, NodeError, NodeId, Scope, Value};
use tokio_util::sync::CancellationToken;

use crate::{
    execute, execute_for, register, reset_default_cache, reset_registry, Builder, Cache,
    CacheError, Catalog, Engine, EngineError, MemoryCache, RunOptions,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
struct A(i64);
#[derive(Debug, PartialEq)]
struct B(i64);
#[derive(Debug, PartialEq)]
struct C(i64);
#[derive(Debug, PartialEq)]
struct D(i64);

#[derive(Debug, Clone, PartialEq)]
struct Counter(usize);

/// a() → 1, b(a) → a*2, c(b) → b*2
fn chain() -> Catalog {
    Catalog::from_nodes([
        NodeDescriptor::from(Node::new("a", |_scope: Scope| async { Ok(A(1)) })),
        Node::new("b", |scope: Scope| async move { Ok(B(scope.dep::<A>()?.0 * 2)) })
            .depends_on(["a"])
            .into(),
        Node::new("c", |scope: Scope| async move { Ok(C(scope.dep::<B>()?.0 * 2)) })
            .depends_on(["b"])
            .into(),
    ])
    .unwrap()
}

/// a() → 1, b(a) → a+10, c(a) → a+100, d(b, c) → b+c
fn diamond() -> Catalog {
    Catalog::from_nodes([
        NodeDescriptor::from(Node::new("a", |_scope: Scope| async { Ok(A(1)) })),
        Node::new("b", |scope: Scope| async move { Ok(B(scope.dep::<A>()?.0 + 10)) })
            .depends_on(["a"])
            .into(),
        Node::new("c", |scope: Scope| async move { Ok(C(scope.dep::<A>()?.0 + 100)) })
            .depends_on(["a"])
            .into(),
        Node::new("d", |scope: Scope| async move {
            let b = scope.dep::<B>()?;
            let c = scope.dep::<C>()?;
            Ok(D(b.0 + c.0))
        })
        .depends_on(["b", "c"])
        .into(),
    ])
    .unwrap()
}

/// Cacheable node returning how many times its body has run.
fn counting_node(id: &str, calls: Arc<AtomicUsize>) -> Node<Counter> {
    Node::new(id, move |_scope: Scope| {
        let calls = Arc::clone(&calls);
        async move { Ok(Counter(calls.fetch_add(1, Ordering::SeqCst) + 1)) }
    })
    .cacheable()
}

fn ids(raw: &[&str]) -> Vec<NodeId> {
    raw.iter().map(|&id| NodeId::from(id)).collect()
}

/// Cache whose every operation fails.
struct BrokenCache;

#[async_trait]
impl Cache for BrokenCache {
    async fn get(&self, _id: &NodeId) -> Result<Option<Value>, CacheError> {
        Err(CacheError::Backend("connection refused".into()))
    }

    async fn set(&self, _id: &NodeId, _value: Value) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".into()))
    }
}

// ============================================================
// Results of well-formed graphs
// ============================================================

#[tokio::test]
async fn linear_chain_produces_expected_values() {
    let engine = Builder::new(chain()).build_for(["c"]).unwrap();
    let results = engine.run().await.expect("run should succeed");

    assert_eq!(*results.get::<A>().unwrap(), A(1));
    assert_eq!(*results.get::<B>().unwrap(), B(2));
    assert_eq!(*results.get::<C>().unwrap(), C(4));
    assert_eq!(results.ids(), ids(&["a", "b", "c"]));
}

#[tokio::test]
async fn diamond_produces_expected_values() {
    let engine = Builder::new(diamond()).build_for(["d"]).unwrap();
    assert_eq!(
        engine.levels().unwrap(),
        vec![ids(&["a"]), ids(&["b", "c"]), ids(&["d"])]
    );

    let results = engine.run().await.unwrap();
    assert_eq!(*results.get::<A>().unwrap(), A(1));
    assert_eq!(*results.get::<B>().unwrap(), B(11));
    assert_eq!(*results.get::<C>().unwrap(), C(101));
    assert_eq!(*results.get::<D>().unwrap(), D(112));
}

#[tokio::test]
async fn empty_engine_returns_empty_results() {
    let results = Engine::new(Catalog::new()).run().await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn nodes_of_one_level_run_concurrently() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut catalog = Catalog::new();
    for (id, value) in [("x", 1_u8), ("y", 2), ("z", 3)] {
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        // All three produce u8; results are read back by identifier.
        let node = Node::new(id, move |_scope: Scope| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(value)
            }
        });
        catalog.register(node).unwrap();
    }

    let results = Engine::new(catalog).run().await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(peak.load(Ordering::SeqCst), 3, "level width was not reached");
    assert_eq!(*results.get_by_id::<u8>("y").unwrap(), 2);
}

#[tokio::test]
async fn snapshot_holds_only_declared_dependencies() {
    // c depends on b only; a's result is committed but not visible to c.
    let catalog = Catalog::from_nodes([
        NodeDescriptor::fixed("a", A(1)),
        Node::new("b", |scope: Scope| async move { Ok(B(scope.dep::<A>()?.0)) })
            .depends_on(["a"])
            .into(),
        Node::new("c", |scope: Scope| async move {
            let sees_a = scope.contains("a");
            let a_lookup = scope.dep::<A>().err();
            let b = scope.dep::<B>()?;
            Ok((sees_a, a_lookup, b.0))
        })
        .depends_on(["b"])
        .into(),
    ])
    .unwrap();

    let results = Engine::new(catalog).run().await.unwrap();
    let observed = results
        .get::<(bool, Option<LookupError>, i64)>()
        .unwrap();

    assert!(!observed.0);
    assert_eq!(observed.1, Some(LookupError::DependencyNotFound("a".into())));
    assert_eq!(observed.2, 1);
}

// ============================================================
// Caching
// ============================================================

#[tokio::test]
async fn cacheable_node_runs_once_across_runs_sharing_a_cache() {
    let cache = Arc::new(MemoryCache::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let catalog = Catalog::from_nodes([counting_node("counter", Arc::clone(&calls))]).unwrap();

    let first = Engine::new(catalog.clone())
        .with_cache(cache.clone())
        .run()
        .await
        .unwrap();
    let second = Engine::new(catalog)
        .with_cache(cache.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*first.get::<Counter>().unwrap(), Counter(1));
    assert_eq!(*second.get::<Counter>().unwrap(), Counter(1));
    assert!(cache.contains("counter"));
}

#[tokio::test]
async fn bypass_forces_execution_and_refreshes_cache() {
    let cache = Arc::new(MemoryCache::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let catalog = Catalog::from_nodes([counting_node("counter", Arc::clone(&calls))]).unwrap();

    Engine::new(catalog.clone())
        .with_cache(cache.clone())
        .run()
        .await
        .unwrap();

    let bypassed = Engine::new(catalog.clone())
        .with_cache(cache.clone())
        .bypass_cache_for(["counter"])
        .run()
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*bypassed.get::<Counter>().unwrap(), Counter(2));

    // The refreshed entry is what the next cached run sees.
    let cached = Engine::new(catalog)
        .with_cache(cache.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*cached.get::<Counter>().unwrap(), Counter(2));
}

#[tokio::test]
async fn non_cacheable_nodes_never_touch_the_cache() {
    let cache = Arc::new(MemoryCache::new());
    let mock = MockNode::returning("plain", 5_u32);
    let catalog = Catalog::from_nodes([mock.node()]).unwrap();

    for _ in 0..2 {
        Engine::new(catalog.clone())
            .with_cache(cache.clone())
            .run()
            .await
            .unwrap();
    }

    assert_eq!(mock.call_count(), 2);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn failing_node_does_not_poison_the_cache() {
    let cache = Arc::new(MemoryCache::new());
    let mock = MockNode::<u32>::failing("flaky", "backend unavailable").cacheable();
    let catalog = Catalog::from_nodes([mock.node()]).unwrap();

    let err = Engine::new(catalog)
        .with_cache(cache.clone())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::NodeFailed { ref node_id, .. } if node_id == "flaky"));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn cache_read_failure_fails_the_node() {
    let mock = MockNode::returning("cached", 1_u8).cacheable();
    let catalog = Catalog::from_nodes([mock.node()]).unwrap();

    let err = Engine::new(catalog)
        .with_cache(Arc::new(BrokenCache))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Cache { ref node_id, .. } if node_id == "cached"));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn cache_write_failure_fails_a_bypassed_node() {
    let mock = MockNode::returning("cached", 1_u8).cacheable();
    let catalog = Catalog::from_nodes([mock.node()]).unwrap();

    let err = Engine::new(catalog)
        .with_cache(Arc::new(BrokenCache))
        .bypass_cache_for(["cached"])
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Cache { .. }));
    assert_eq!(mock.call_count(), 1);
}

// ============================================================
// Failures and cancellation
// ============================================================

#[tokio::test]
async fn unknown_dependency_fails_before_anything_runs() {
    let mock = MockNode::returning("a", 1_u8).after(["ghost"]);
    let root = MockNode::returning("root", 2_u16);
    let catalog = Catalog::from_nodes([NodeDescriptor::from(mock.node()), root.node().into()]).unwrap();

    let err = Engine::new(catalog).run().await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::UnknownDependency { ref node, ref dependency } if node == "a" && dependency == "ghost"
    ));
    assert_eq!(mock.call_count(), 0);
    assert_eq!(root.call_count(), 0);
}

#[tokio::test]
async fn cycle_fails_before_anything_runs() {
    let x = MockNode::returning("x", 1_u8).after(["y"]);
    let y = MockNode::returning("y", 2_u16).after(["x"]);
    let catalog = Catalog::from_nodes([NodeDescriptor::from(x.node()), y.node().into()]).unwrap();

    let engine = Engine::new(catalog);
    assert!(matches!(engine.levels(), Err(EngineError::CycleDetected)));
    assert!(matches!(engine.run().await, Err(EngineError::CycleDetected)));
    assert_eq!(x.call_count() + y.call_count(), 0);
}

#[tokio::test]
async fn failing_level_waits_for_siblings_and_stops() {
    let root = MockNode::returning("root", 1_u8);
    let bad = MockNode::<u16>::failing("bad", "intentional failure").after(["root"]);
    let slow = MockNode::returning("slow", 3_u32)
        .after(["root"])
        .with_delay(Duration::from_millis(50));
    let never = MockNode::returning("never", 4_u64).after(["slow"]);

    let catalog = Catalog::from_nodes([
        NodeDescriptor::from(root.node()),
        bad.node().into(),
        slow.node().into(),
        never.node().into(),
    ])
    .unwrap();

    let engine = Engine::new(catalog);
    let err = engine.run().await.unwrap_err();

    assert_eq!(err.to_string(), "node 'bad': intentional failure");
    assert_eq!(err.node_id().map(NodeId::as_str), Some("bad"));
    assert_eq!(slow.call_count(), 1);
    assert_eq!(never.call_count(), 0);

    // Completed work stays readable.
    let partial = engine.results();
    assert_eq!(partial.ids(), ids(&["root", "slow"]));
    assert_eq!(*partial.get::<u32>().unwrap(), 3);
}

#[tokio::test]
async fn panicking_node_is_reported_as_panic() {
    fn explode() -> Result<u8, NodeError> {
        panic!("kaboom")
    }
    let catalog =
        Catalog::from_nodes([Node::new("explodes", |_scope: Scope| async { explode() })]).unwrap();

    let err = Engine::new(catalog).run().await.unwrap_err();
    match err {
        EngineError::TaskPanicked { node_id, message } => {
            assert_eq!(node_id, "explodes");
            assert_eq!(message, "kaboom");
        }
        other => panic!("expected TaskPanicked, got {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_between_levels_stops_the_run() {
    let later = MockNode::returning("later", 2_u16).after(["first"]);
    let catalog = Catalog::from_nodes([
        NodeDescriptor::from(Node::new("first", |scope: Scope| async move {
            scope.cancellation().cancel();
            Ok(1_u8)
        })),
        later.node().into(),
    ])
    .unwrap();

    let engine = Engine::new(catalog);
    let err = engine.run().await.unwrap_err();

    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(later.call_count(), 0);
    assert!(engine.results().contains("first"));
}

#[tokio::test]
async fn cancelled_before_start_runs_nothing() {
    let token = CancellationToken::new();
    token.cancel();
    let mock = MockNode::returning("a", 1_u8);

    let err = Engine::new(Catalog::from_nodes([mock.node()]).unwrap())
        .with_cancellation(token)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(mock.call_count(), 0);
}

// ============================================================
// Top-level entry points and run options
// ============================================================

#[tokio::test]
async fn execute_for_runs_only_the_needed_subgraph() {
    let unrelated = MockNode::returning("unrelated", String::from("idle"));
    let mut catalog = chain();
    catalog.register(unrelated.node()).unwrap();

    let (value, results) = execute_for::<B>(
        RunOptions::new().with_registry(catalog).disable_cache(),
    )
    .await
    .unwrap();

    assert_eq!(*value, B(2));
    assert_eq!(results.ids(), ids(&["a", "b"]));
    assert_eq!(unrelated.call_count(), 0);
}

#[tokio::test]
async fn execute_for_unregistered_type_fails() {
    let err = execute_for::<D>(RunOptions::new().with_registry(chain()).disable_cache())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Lookup(LookupError::TypeNotRegistered { .. })
    ));
}

#[tokio::test]
async fn patch_value_replaces_a_dependency() {
    let (value, _) = execute_for::<D>(
        RunOptions::new()
            .with_registry(diamond())
            .disable_cache()
            .patch_value(A(1000)),
    )
    .await
    .unwrap();

    assert_eq!(*value, D(1010 + 1100));
}

#[tokio::test]
async fn patch_node_keeps_dependents_wired() {
    let (value, results) = execute_for::<C>(
        RunOptions::new()
            .with_registry(chain())
            .disable_cache()
            .patch(Node::new("b-double", |scope: Scope| async move {
                Ok(B(scope.dep::<A>()?.0 * 20))
            })
            .depends_on(["a"])),
    )
    .await
    .unwrap();

    assert_eq!(*value, C(40));
    assert!(results.contains("b"));
    assert!(!results.contains("b-double"));
}

#[tokio::test]
async fn merge_registry_overrides_win() {
    let overrides = Catalog::from_nodes([NodeDescriptor::fixed("a", A(5))]).unwrap();
    let results = execute(
        RunOptions::new()
            .with_registry(chain())
            .merge_registry(overrides)
            .disable_cache(),
    )
    .await
    .unwrap();

    assert_eq!(*results.get::<C>().unwrap(), C(20));
}

#[tokio::test]
async fn custom_cache_and_disabled_cache() {
    let cache = Arc::new(MemoryCache::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let catalog = Catalog::from_nodes([counting_node("counter", Arc::clone(&calls))]).unwrap();

    for _ in 0..2 {
        execute(RunOptions::new().with_registry(catalog.clone()).with_cache(cache.clone()))
            .await
            .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    execute(RunOptions::new().with_registry(catalog).disable_cache())
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn process_wide_registry_and_default_cache() {
    let _guard = crate::test_support::GLOBAL_LOCK.lock();
    reset_registry();
    reset_default_cache();

    let calls = Arc::new(AtomicUsize::new(0));
    register(counting_node("counter", Arc::clone(&calls)));
    register(
        Node::new("report", |scope: Scope| async move {
            Ok(format!("count={}", scope.dep::<Counter>()?.0))
        })
        .depends_on(["counter"]),
    );

    let first = execute(RunOptions::default()).await.unwrap();
    let (report, _) = execute_for::<String>(RunOptions::default()).await.unwrap();

    assert_eq!(*first.get::<String>().unwrap(), "count=1");
    assert_eq!(*report, "count=1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(crate::default_cache().contains("counter"));

    reset_default_cache();
    execute(RunOptions::default()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    reset_registry();
    reset_default_cache();
}
