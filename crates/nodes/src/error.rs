//! Node-level error types.

use thiserror::Error;

use crate::NodeId;

/// Failure to fetch a typed output from a scope or a results map.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No registered node produces the requested type.
    #[error("type {type_name} is not registered as a node output")]
    TypeNotRegistered { type_name: &'static str },

    /// The scope was not created by a run, so it carries no results.
    #[error("no dependency results in scope")]
    NoResults,

    /// The dependency has not completed or was not declared.
    #[error("dependency '{0}' not found")]
    DependencyNotFound(NodeId),

    /// A finished run holds no result for the node.
    #[error("result '{0}' not found")]
    ResultNotFound(NodeId),

    /// The stored value's dynamic type disagrees with the requested type.
    #[error("'{id}' has wrong type (want {expected})")]
    TypeMismatch { id: NodeId, expected: &'static str },
}

/// Errors returned by a node's body.
///
/// The engine wraps these with the failing node's identifier.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A dependency lookup inside the body failed.
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// The body reported a failure.
    #[error("{0}")]
    Failed(String),

    /// Any other error source.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NodeError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}
