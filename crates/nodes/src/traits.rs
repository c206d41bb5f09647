//! The `ExecutableNode` trait, the type-erased seam the engine runs.

use async_trait::async_trait;

use crate::{NodeError, Scope, Value};

/// A node body with its output type erased.
///
/// [`Node<T>`](crate::Node) implements this at registration time by boxing the
/// typed output; the engine only ever sees `Value`s.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Run the body against the results visible in `scope`.
    async fn execute(&self, scope: Scope) -> Result<Value, NodeError>;
}
