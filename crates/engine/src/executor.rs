//! Level-by-level execution engine.
//!
//! `Engine` is the central orchestrator:
//! 1. Partitions its node set into levels (see [`crate::dag::levels`]).
//! 2. Runs each level's nodes as concurrent tokio tasks, waiting for all of
//!    them before moving on.
//! 3. Hands every node a `Scope` holding its dependencies' committed outputs.
//! 4. Consults the cache for cacheable nodes and refreshes it after success.
//! 5. Stops at the first failing level, or at a level boundary once the
//!    cancellation token fires.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use nodes::{NodeDescriptor, NodeId, ResultMap, Scope, TypeIndex, Value};
use parking_lot::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::cache::Cache;
use crate::dag::{levels, ExecutionLevel};
use crate::{Catalog, EngineError, Results};

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// One execution unit: a fixed node set plus the cache, bypass set and
/// cancellation signal it runs with.
///
/// Construct one per run request; results accumulate in the engine and stay
/// readable through [`Engine::results`] after a failed run.
pub struct Engine {
    nodes: Arc<Catalog>,
    types: Arc<TypeIndex>,
    results: Arc<Mutex<ResultMap>>,
    cache: Option<Arc<dyn Cache>>,
    bypass: HashSet<NodeId>,
    cancel: CancellationToken,
}

impl Engine {
    /// Engine over `nodes` with no cache, no bypass set and a fresh token.
    pub fn new(nodes: Catalog) -> Self {
        let types = Arc::new(nodes.types().clone());
        Self {
            nodes: Arc::new(nodes),
            types,
            results: Arc::new(Mutex::new(ResultMap::new())),
            cache: None,
            bypass: HashSet::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// Force re-execution of these cacheable nodes; their entries are still
    /// refreshed on success.
    pub fn bypass_cache_for<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<NodeId>,
    {
        self.bypass.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn catalog(&self) -> &Catalog {
        &self.nodes
    }

    /// Identifiers of the nodes this engine runs, sorted.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.ids()
    }

    /// The schedule `run` would follow.
    pub fn levels(&self) -> Result<Vec<ExecutionLevel>, EngineError> {
        levels(&self.nodes)
    }

    /// Copy of the results committed so far.
    pub fn results(&self) -> Results {
        Results::new(self.results.lock().clone(), Arc::clone(&self.types))
    }

    /// Run every node, level by level.
    ///
    /// # Errors
    /// - Graph-shape errors from scheduling, before any node runs.
    /// - [`EngineError::Cancelled`] when the token has fired at a level
    ///   boundary.
    /// - The failure of one node of the first failing level
    ///   ([`EngineError::NodeFailed`], [`EngineError::Cache`] or
    ///   [`EngineError::TaskPanicked`]).
    #[instrument(skip(self), fields(run_id = %Uuid::new_v4(), nodes = self.nodes.len()))]
    pub async fn run(&self) -> Result<Results, EngineError> {
        let levels = levels(&self.nodes)?;
        info!(levels = levels.len(), "schedule computed, starting run");

        for (index, level) in levels.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(level = index, "cancellation observed, not starting level");
                return Err(EngineError::Cancelled);
            }
            debug!(level = index, nodes = ?level, "starting level");
            self.run_level(index, level).await?;
        }

        let results = self.results();
        info!(results = results.len(), "run succeeded");
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Internal: one level
    // -----------------------------------------------------------------------

    async fn run_level(&self, index: usize, level: &[NodeId]) -> Result<(), EngineError> {
        let tasks = {
            let committed = self.results.lock();
            level
                .iter()
                .map(|id| {
                    self.nodes
                        .get(id.as_str())
                        .map(|node| self.prepare(node.clone(), &committed))
                        .ok_or_else(|| EngineError::UnknownTarget(id.clone()))
                })
                .collect::<Result<Vec<_>, EngineError>>()?
        };

        let handles: Vec<(NodeId, JoinHandle<Result<(), EngineError>>)> = tasks
            .into_iter()
            .map(|task| (task.node.id.clone(), tokio::spawn(task.run())))
            .collect();

        // Every launched task is awaited, even after a failure.
        let mut first_error = None;
        for (id, handle) in handles {
            let outcome = handle.await.unwrap_or_else(|err| {
                Err(EngineError::TaskPanicked {
                    node_id: id.clone(),
                    message: panic_message(err),
                })
            });
            if let Err(err) = outcome {
                error!(level = index, node = %id, error = %err, "node failed");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn prepare(&self, node: NodeDescriptor, committed: &ResultMap) -> NodeTask {
        let snapshot = node
            .depends_on
            .iter()
            .filter_map(|dep| committed.get_key_value(dep))
            .map(|(id, value)| (id.clone(), Arc::clone(value)))
            .collect();

        let cache = if node.cacheable {
            self.cache.clone()
        } else {
            None
        };
        let read_cache = cache.is_some() && !self.bypass.contains(&node.id);

        NodeTask {
            node,
            snapshot,
            types: Arc::clone(&self.types),
            cache,
            read_cache,
            results: Arc::clone(&self.results),
            cancel: self.cancel.clone(),
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("nodes", &self.nodes.ids())
            .field("cached", &self.cache.is_some())
            .field("bypass", &self.bypass)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Internal: one node
// ---------------------------------------------------------------------------

/// Everything a spawned node task owns.
struct NodeTask {
    node: NodeDescriptor,
    snapshot: ResultMap,
    types: Arc<TypeIndex>,
    /// Set only for cacheable nodes when the run has a cache.
    cache: Option<Arc<dyn Cache>>,
    read_cache: bool,
    results: Arc<Mutex<ResultMap>>,
    cancel: CancellationToken,
}

impl NodeTask {
    async fn run(self) -> Result<(), EngineError> {
        let NodeTask {
            node,
            snapshot,
            types,
            cache,
            read_cache,
            results,
            cancel,
        } = self;
        let id = node.id.clone();

        if let (Some(cache), true) = (&cache, read_cache) {
            match cache.get(&id).await {
                Ok(Some(value)) => {
                    debug!(node = %id, "cache hit");
                    publish(&results, id, value);
                    return Ok(());
                }
                Ok(None) => debug!(node = %id, "cache miss"),
                Err(source) => return Err(EngineError::Cache { node_id: id, source }),
            }
        } else if cache.is_some() {
            debug!(node = %id, "cache bypassed");
        }

        debug!(node = %id, deps = snapshot.len(), "executing node");
        let scope = Scope::new(id.clone(), snapshot, types, cancel);
        let value = node
            .execute(scope)
            .await
            .map_err(|source| EngineError::NodeFailed {
                node_id: id.clone(),
                source,
            })?;

        if let Some(cache) = &cache {
            cache
                .set(&id, Arc::clone(&value))
                .await
                .map_err(|source| EngineError::Cache {
                    node_id: id.clone(),
                    source,
                })?;
        }

        publish(&results, id, value);
        Ok(())
    }
}

fn publish(results: &Mutex<ResultMap>, id: NodeId, value: Value) {
    results.lock().insert(id, value);
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
