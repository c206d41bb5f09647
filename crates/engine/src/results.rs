//! Post-run access to a finished run's outputs.

use std::any::Any;
use std::sync::Arc;

use nodes::{downcast_value, LookupError, NodeId, ResultMap, TypeIndex};

/// Outputs of a run keyed by node identifier, plus the type index needed for
/// typed retrieval.
#[derive(Debug, Clone, Default)]
pub struct Results {
    values: ResultMap,
    types: Arc<TypeIndex>,
}

impl Results {
    pub fn new(values: ResultMap, types: Arc<TypeIndex>) -> Self {
        Self { values, types }
    }

    /// Output of the node producing `T`.
    ///
    /// # Errors
    /// - [`LookupError::TypeNotRegistered`] if no node produces `T`.
    /// - [`LookupError::ResultNotFound`] if that node has no result.
    /// - [`LookupError::TypeMismatch`] if the stored value is not a `T`.
    pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>, LookupError> {
        let id = self.types.resolve::<T>()?;
        self.get_by_id(id.as_str())
    }

    /// Output of node `id`.
    pub fn get_by_id<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>, LookupError> {
        let (id, value) = self
            .values
            .get_key_value(id)
            .ok_or_else(|| LookupError::ResultNotFound(id.into()))?;
        downcast_value(id, value)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    /// Identifiers with a result, sorted.
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.values.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_map(&self) -> &ResultMap {
        &self.values
    }

    pub fn into_map(self) -> ResultMap {
        self.values
    }
}

/// Typed lookup on a finished run; see [`Results::get`].
pub fn result_of<T: Any + Send + Sync>(results: &Results) -> Result<Arc<T>, LookupError> {
    results.get::<T>()
}
