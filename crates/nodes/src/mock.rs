//! `MockNode`, a test double for building nodes with observable behaviour.
//!
//! Useful in unit and integration tests where the body itself is irrelevant
//! and only call counts, failures or timing matter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::{Node, NodeError, NodeId, Scope};

/// Behaviour injected into `MockNode` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour<T> {
    /// Return a specific value.
    ReturnValue(T),
    /// Fail with [`NodeError::Failed`].
    Fail(String),
}

/// A mock node that counts its invocations and returns a
/// programmer-specified result.
#[derive(Debug, Clone)]
pub struct MockNode<T> {
    pub id: NodeId,
    pub depends_on: Vec<NodeId>,
    pub behaviour: MockBehaviour<T>,
    /// Sleep before answering.
    pub delay: Option<Duration>,
    pub cacheable: bool,
    calls: Arc<AtomicUsize>,
}

impl<T: Clone + Send + Sync + 'static> MockNode<T> {
    /// Create a mock that always succeeds with the given value.
    pub fn returning(id: impl Into<NodeId>, value: T) -> Self {
        Self::with_behaviour(id, MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that always fails.
    pub fn failing(id: impl Into<NodeId>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(id, MockBehaviour::Fail(msg.into()))
    }

    fn with_behaviour(id: impl Into<NodeId>, behaviour: MockBehaviour<T>) -> Self {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            behaviour,
            delay: None,
            cacheable: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn after<I>(mut self, deps: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<NodeId>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    /// Number of times a node built from this mock has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Build a node sharing this mock's call counter.
    pub fn node(&self) -> Node<T> {
        let calls = Arc::clone(&self.calls);
        let behaviour = self.behaviour.clone();
        let delay = self.delay;
        let id = self.id.clone();

        let node = Node::new(self.id.clone(), move |_scope: Scope| {
            let calls = Arc::clone(&calls);
            let behaviour = behaviour.clone();
            let id = id.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tracing::trace!(node = %id, "mock node invoked");
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                match behaviour {
                    MockBehaviour::ReturnValue(value) => Ok(value),
                    MockBehaviour::Fail(msg) => Err(NodeError::Failed(msg)),
                }
            }
        })
        .depends_on(self.depends_on.clone());

        if self.cacheable {
            node.cacheable()
        } else {
            node
        }
    }
}
