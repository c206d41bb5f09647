//! Per-node execution scope.
//!
//! A `Scope` is handed to every node body. It holds an immutable snapshot of
//! the outputs of the node's declared dependencies, taken from the results
//! committed before the node's level began, plus the type index used to map
//! an output type back to the node producing it.

use std::any::Any;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::types::{downcast_value, ResultMap, TypeIndex};
use crate::{LookupError, NodeId};

#[derive(Debug, Clone)]
pub struct Scope {
    node_id: Option<NodeId>,
    snapshot: Option<Arc<ResultMap>>,
    types: Arc<TypeIndex>,
    cancel: CancellationToken,
}

impl Scope {
    /// Scope for `node_id` during a run.
    pub fn new(
        node_id: NodeId,
        snapshot: ResultMap,
        types: Arc<TypeIndex>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            node_id: Some(node_id),
            snapshot: Some(Arc::new(snapshot)),
            types,
            cancel,
        }
    }

    /// Scope with no results, as seen when a body is called outside a run.
    pub fn detached() -> Self {
        Self {
            node_id: None,
            snapshot: None,
            types: Arc::new(TypeIndex::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the type index, e.g. to call a body directly in a test.
    pub fn with_types(mut self, types: Arc<TypeIndex>) -> Self {
        self.types = types;
        self
    }

    /// The node this scope was created for.
    pub fn node_id(&self) -> Option<&NodeId> {
        self.node_id.as_ref()
    }

    /// Output of the dependency producing `T`.
    ///
    /// # Errors
    /// - [`LookupError::TypeNotRegistered`] if no node produces `T`.
    /// - [`LookupError::NoResults`] if the scope was not created by a run.
    /// - [`LookupError::DependencyNotFound`] if the producer has not completed
    ///   or is not a declared dependency.
    /// - [`LookupError::TypeMismatch`] if the stored value is not a `T`.
    pub fn dep<T: Any + Send + Sync>(&self) -> Result<Arc<T>, LookupError> {
        let id = self.types.resolve::<T>()?;
        self.dep_by_id(id.as_str())
    }

    /// Output of dependency `id`, for nodes sharing an output type.
    pub fn dep_by_id<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>, LookupError> {
        let snapshot = self.snapshot.as_ref().ok_or(LookupError::NoResults)?;
        let (id, value) = snapshot
            .get_key_value(id)
            .ok_or_else(|| LookupError::DependencyNotFound(id.into()))?;
        downcast_value(id, value)
    }

    /// Whether `id`'s output is visible to this node.
    pub fn contains(&self, id: &str) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot.contains_key(id))
    }

    /// The run's cancellation signal.
    ///
    /// The engine only observes it between levels; long-running bodies may
    /// poll it themselves.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::detached()
    }
}
