//! Node declarations.
//!
//! [`Node<T>`] is the typed form authors write; [`NodeDescriptor`] is the
//! type-erased form a catalog stores. Erasure happens once, in the
//! `From<Node<T>>` conversion, so a catalog can hold nodes of any output type.

use std::any::{type_name, TypeId};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{ExecutableNode, NodeError, NodeId, Scope, Value};

/// Boxed future returned by a node body.
pub type NodeFuture<T> = Pin<Box<dyn Future<Output = Result<T, NodeError>> + Send>>;

type Body<T> = dyn Fn(Scope) -> NodeFuture<T> + Send + Sync;

// ---------------------------------------------------------------------------
// Node<T>
// ---------------------------------------------------------------------------

/// A unit of work producing a `T`.
///
/// ```ignore
/// let db = Node::new("db", |scope: Scope| async move {
///     let cfg = scope.dep::<Config>()?;
///     Ok(Db::connect(&cfg.url))
/// })
/// .depends_on(["config"])
/// .cacheable();
/// ```
pub struct Node<T> {
    id: NodeId,
    depends_on: Vec<NodeId>,
    cacheable: bool,
    body: Arc<Body<T>>,
}

impl<T: Send + Sync + 'static> Node<T> {
    /// Declare a node with no dependencies.
    pub fn new<F, Fut>(id: impl Into<NodeId>, run: F) -> Self
    where
        F: Fn(Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, NodeError>> + Send + 'static,
    {
        let body: Arc<Body<T>> =
            Arc::new(move |scope: Scope| -> NodeFuture<T> { Box::pin(run(scope)) });
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            cacheable: false,
            body,
        }
    }

    /// Add dependencies. Repeated identifiers are kept once, in first-seen order.
    pub fn depends_on<I>(mut self, deps: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<NodeId>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.depends_on.contains(&dep) {
                self.depends_on.push(dep);
            }
        }
        self
    }

    /// Allow the output to be memoized across runs sharing a cache.
    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn dependencies(&self) -> &[NodeId] {
        &self.depends_on
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    /// Call the body directly, outside any engine run.
    pub async fn call(&self, scope: Scope) -> Result<T, NodeError> {
        (self.body)(scope).await
    }
}

impl<T> Clone for Node<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            depends_on: self.depends_on.clone(),
            cacheable: self.cacheable,
            body: Arc::clone(&self.body),
        }
    }
}

impl<T> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("depends_on", &self.depends_on)
            .field("cacheable", &self.cacheable)
            .field("output", &type_name::<T>())
            .finish()
    }
}

struct TypedBody<T> {
    body: Arc<Body<T>>,
}

#[async_trait]
impl<T: Send + Sync + 'static> ExecutableNode for TypedBody<T> {
    async fn execute(&self, scope: Scope) -> Result<Value, NodeError> {
        let output = (self.body)(scope).await?;
        Ok(Arc::new(output) as Value)
    }
}

struct FixedValue(Value);

#[async_trait]
impl ExecutableNode for FixedValue {
    async fn execute(&self, _scope: Scope) -> Result<Value, NodeError> {
        Ok(Arc::clone(&self.0))
    }
}

// ---------------------------------------------------------------------------
// NodeDescriptor
// ---------------------------------------------------------------------------

/// Static output type of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputType {
    pub id: TypeId,
    pub name: &'static str,
}

impl OutputType {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

/// Type-erased node as stored in a catalog.
#[derive(Clone)]
pub struct NodeDescriptor {
    pub id: NodeId,
    pub depends_on: Vec<NodeId>,
    pub cacheable: bool,
    pub output: OutputType,
    pub body: Arc<dyn ExecutableNode>,
}

impl NodeDescriptor {
    /// A dependency-free, non-cacheable node that always yields `value`.
    pub fn fixed<T: Send + Sync + 'static>(id: impl Into<NodeId>, value: T) -> Self {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            cacheable: false,
            output: OutputType::of::<T>(),
            body: Arc::new(FixedValue(Arc::new(value))),
        }
    }

    /// The same node under a different identifier.
    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    pub async fn execute(&self, scope: Scope) -> Result<Value, NodeError> {
        self.body.execute(scope).await
    }
}

impl<T: Send + Sync + 'static> From<Node<T>> for NodeDescriptor {
    fn from(node: Node<T>) -> Self {
        Self {
            id: node.id,
            depends_on: node.depends_on,
            cacheable: node.cacheable,
            output: OutputType::of::<T>(),
            body: Arc::new(TypedBody { body: node.body }),
        }
    }
}

impl fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("id", &self.id)
            .field("depends_on", &self.depends_on)
            .field("cacheable", &self.cacheable)
            .field("output", &self.output.name)
            .finish()
    }
}
