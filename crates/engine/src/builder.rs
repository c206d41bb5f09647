//! Dependency resolution: from a set of target identifiers to the minimal
//! node set that can produce them.

use std::collections::HashSet;

use nodes::NodeId;
use tracing::debug;

use crate::{Catalog, Engine, EngineError};

/// Resolves targets against a catalog and builds engines for them.
#[derive(Debug, Clone, Default)]
pub struct Builder {
    catalog: Catalog,
}

impl Builder {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Targets plus everything they transitively depend on.
    ///
    /// # Errors
    /// [`EngineError::UnknownTarget`] when a target, or any dependency reached
    /// from one, is not in the catalog.
    pub fn resolve<I>(&self, targets: I) -> Result<Catalog, EngineError>
    where
        I: IntoIterator,
        I::Item: Into<NodeId>,
    {
        resolve(&self.catalog, targets)
    }

    /// [`Builder::resolve`] then wrap the subset in an [`Engine`].
    pub fn build_for<I>(&self, targets: I) -> Result<Engine, EngineError>
    where
        I: IntoIterator,
        I::Item: Into<NodeId>,
    {
        Ok(Engine::new(self.resolve(targets)?))
    }
}

/// Closure of `targets` under the dependency relation of `catalog`.
///
/// Shared dependencies are included once; `catalog` is left untouched.
pub fn resolve<I>(catalog: &Catalog, targets: I) -> Result<Catalog, EngineError>
where
    I: IntoIterator,
    I::Item: Into<NodeId>,
{
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<NodeId> = targets.into_iter().map(Into::into).collect();
    stack.reverse();

    while let Some(id) = stack.pop() {
        if visited.contains(&id) {
            continue;
        }
        let node = catalog
            .get(id.as_str())
            .ok_or_else(|| EngineError::UnknownTarget(id.clone()))?;
        stack.extend(
            node.depends_on
                .iter()
                .rev()
                .filter(|dep| !visited.contains(*dep))
                .cloned(),
        );
        visited.insert(id);
    }

    debug!(count = visited.len(), "resolved node set");
    Ok(catalog.subset(visited))
}
