//! Engine-level error types.

use nodes::{LookupError, NodeError, NodeId};
use thiserror::Error;

use crate::cache::CacheError;

/// Errors produced by the engine (registration, graph shape, execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Registration errors ------

    /// Two nodes share the same ID.
    #[error("duplicate node registration: '{0}'")]
    DuplicateNode(NodeId),

    // ------ Graph-shape errors (detected before any node runs) ------

    /// A node lists a dependency missing from the executing set.
    #[error("node '{node}' depends on unknown node '{dependency}'")]
    UnknownDependency { node: NodeId, dependency: NodeId },

    /// Level scheduling could not place every node.
    #[error("cycle detected in dependency graph")]
    CycleDetected,

    /// Subgraph resolution reached an identifier absent from the catalog.
    #[error("unknown node: '{0}'")]
    UnknownTarget(NodeId),

    // ------ Execution errors ------

    /// A node's body failed.
    #[error("node '{node_id}': {source}")]
    NodeFailed {
        node_id: NodeId,
        #[source]
        source: NodeError,
    },

    /// Reading or writing a node's cache entry failed.
    #[error("node '{node_id}': cache error: {source}")]
    Cache {
        node_id: NodeId,
        #[source]
        source: CacheError,
    },

    /// A node's task panicked instead of returning.
    #[error("node '{node_id}' panicked: {message}")]
    TaskPanicked { node_id: NodeId, message: String },

    /// Cancellation was observed at a level boundary.
    #[error("run cancelled")]
    Cancelled,

    // ------ Typed access ------

    /// Typed retrieval of a result failed.
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl EngineError {
    /// Identifier of the node the error is attributed to, if any.
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::DuplicateNode(id) | Self::UnknownTarget(id) => Some(id),
            Self::UnknownDependency { node, .. } => Some(node),
            Self::NodeFailed { node_id, .. }
            | Self::Cache { node_id, .. }
            | Self::TaskPanicked { node_id, .. } => Some(node_id),
            Self::CycleDetected | Self::Cancelled | Self::Lookup(_) => None,
        }
    }
}
