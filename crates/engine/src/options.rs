//! Per-run configuration.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use nodes::{Node, NodeDescriptor, NodeId, OutputType};
use tokio_util::sync::CancellationToken;

use crate::cache::{default_cache, Cache};
use crate::catalog::registry;
use crate::{Catalog, Engine, EngineError};

/// Which cache a run uses.
#[derive(Clone, Default)]
pub enum CacheChoice {
    /// The process-wide [`default_cache`].
    #[default]
    Default,
    Custom(Arc<dyn Cache>),
    Disabled,
}

impl fmt::Debug for CacheChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::Custom(_) => f.write_str("Custom"),
            Self::Disabled => f.write_str("Disabled"),
        }
    }
}

/// Replacement for the node producing a given output type.
#[derive(Debug, Clone)]
struct Patch {
    output: OutputType,
    replacement: NodeDescriptor,
}

/// Options for [`crate::execute`] and [`crate::execute_for`].
///
/// The default runs the process-wide catalog against the process-wide cache
/// with no bypassed nodes, no patches and a token nobody cancels.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    registry: Option<Catalog>,
    overrides: Vec<Catalog>,
    cache: CacheChoice,
    bypass: HashSet<NodeId>,
    patches: Vec<Patch>,
    cancel: CancellationToken,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run against `catalog` instead of the process-wide one.
    pub fn with_registry(mut self, catalog: Catalog) -> Self {
        self.registry = Some(catalog);
        self
    }

    /// Overlay `overrides` onto the base catalog; overriding nodes win.
    pub fn merge_registry(mut self, overrides: Catalog) -> Self {
        self.overrides.push(overrides);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = CacheChoice::Custom(cache);
        self
    }

    pub fn disable_cache(mut self) -> Self {
        self.cache = CacheChoice::Disabled;
        self
    }

    /// Re-execute these cacheable nodes even on a warm cache.
    pub fn bypass_cache_for<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<NodeId>,
    {
        self.bypass.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Replace the node producing `T` with one that yields `value`.
    pub fn patch_value<T: Any + Send + Sync>(self, value: T) -> Self {
        let replacement = NodeDescriptor::fixed(std::any::type_name::<T>(), value);
        self.push_patch(OutputType::of::<T>(), replacement)
    }

    /// Replace the node producing `T` with `node`, keeping the original
    /// identifier.
    pub fn patch<T: Any + Send + Sync>(self, node: Node<T>) -> Self {
        self.push_patch(OutputType::of::<T>(), node.into())
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cache(&self) -> &CacheChoice {
        &self.cache
    }

    fn push_patch(mut self, output: OutputType, replacement: NodeDescriptor) -> Self {
        self.patches.push(Patch {
            output,
            replacement,
        });
        self
    }

    /// The catalog a run with these options sees: base, then merges, then
    /// patches.
    pub(crate) fn catalog(&self) -> Result<Catalog, EngineError> {
        let mut catalog = match &self.registry {
            Some(catalog) => catalog.clone(),
            None => registry(),
        };
        for overrides in &self.overrides {
            catalog.merge(overrides.clone());
        }
        for patch in &self.patches {
            catalog.replace_output(patch.output, patch.replacement.clone())?;
        }
        Ok(catalog)
    }

    /// Engine over `nodes` configured with these options.
    pub(crate) fn engine(self, nodes: Catalog) -> Engine {
        let engine = Engine::new(nodes)
            .bypass_cache_for(self.bypass)
            .with_cancellation(self.cancel);
        match self.cache {
            CacheChoice::Default => engine.with_cache(default_cache()),
            CacheChoice::Custom(cache) => engine.with_cache(cache),
            CacheChoice::Disabled => engine.without_cache(),
        }
    }
}
