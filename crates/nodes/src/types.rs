//! Type-erased values and the output-type index.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::{LookupError, NodeId};

/// A node output with its concrete type erased.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Results keyed by the node that produced them.
pub type ResultMap = HashMap<NodeId, Value>;

/// Maps a node's static output type to the identifier of the node producing it.
///
/// Built alongside catalog registration so dependency outputs can be fetched
/// by type alone.
#[derive(Debug, Clone, Default)]
pub struct TypeIndex {
    by_type: HashMap<TypeId, NodeId>,
}

impl TypeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` produces values of type `type_id`.
    ///
    /// Returns the identifier previously mapped to that type, if any.
    pub fn insert(&mut self, type_id: TypeId, id: NodeId) -> Option<NodeId> {
        self.by_type.insert(type_id, id)
    }

    /// Identifier of the node producing `T`.
    pub fn id_of<T: 'static>(&self) -> Option<&NodeId> {
        self.by_type.get(&TypeId::of::<T>())
    }

    /// Identifier of the node producing the type behind `type_id`.
    pub fn id_for(&self, type_id: TypeId) -> Option<&NodeId> {
        self.by_type.get(&type_id)
    }

    /// Like [`TypeIndex::id_of`] but reports an unregistered type as an error.
    pub fn resolve<T: 'static>(&self) -> Result<&NodeId, LookupError> {
        self.id_of::<T>().ok_or(LookupError::TypeNotRegistered {
            type_name: type_name::<T>(),
        })
    }

    /// Drop every type mapped to `id`.
    pub fn remove_id(&mut self, id: &NodeId) {
        self.by_type.retain(|_, mapped| mapped != id);
    }

    /// Keep only the types whose node satisfies `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&NodeId) -> bool) {
        self.by_type.retain(|_, id| keep(id));
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

/// Checked downcast of a stored value to the requested output type.
pub fn downcast_value<T: Any + Send + Sync>(
    id: &NodeId,
    value: &Value,
) -> Result<Arc<T>, LookupError> {
    Arc::clone(value)
        .downcast::<T>()
        .map_err(|_| LookupError::TypeMismatch {
            id: id.clone(),
            expected: type_name::<T>(),
        })
}
