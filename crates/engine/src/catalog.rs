//! Node catalog and the process-wide registry.
//!
//! A [`Catalog`] maps identifiers to type-erased node descriptors and keeps a
//! [`TypeIndex`] from each node's output type to its identifier. The
//! process-wide registry is a resettable catalog behind a lock; hosts populate
//! it at startup through [`register`] and every run reads a copy of it.

use std::collections::HashMap;

use nodes::{LookupError, NodeDescriptor, NodeId, OutputType, TypeIndex};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::EngineError;

/// Identifier → node mapping plus the output-type index.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    nodes: HashMap<NodeId, NodeDescriptor>,
    types: TypeIndex,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a set of nodes.
    ///
    /// # Errors
    /// [`EngineError::DuplicateNode`] if two nodes share an identifier.
    pub fn from_nodes<I>(nodes: I) -> Result<Self, EngineError>
    where
        I: IntoIterator,
        I::Item: Into<NodeDescriptor>,
    {
        let mut catalog = Self::new();
        for node in nodes {
            catalog.register(node)?;
        }
        Ok(catalog)
    }

    /// Add a node.
    ///
    /// # Errors
    /// [`EngineError::DuplicateNode`] if the identifier is already present.
    pub fn register(&mut self, node: impl Into<NodeDescriptor>) -> Result<(), EngineError> {
        let node = node.into();
        if self.nodes.contains_key(&node.id) {
            return Err(EngineError::DuplicateNode(node.id));
        }
        self.index_output(&node.id, node.output);
        debug!(node = %node.id, deps = ?node.depends_on, "registered node");
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Insert a node, replacing any node with the same identifier.
    pub fn upsert(&mut self, node: impl Into<NodeDescriptor>) -> Option<NodeDescriptor> {
        let node = node.into();
        self.types.remove_id(&node.id);
        self.index_output(&node.id, node.output);
        self.nodes.insert(node.id.clone(), node)
    }

    fn index_output(&mut self, id: &NodeId, output: OutputType) {
        if let Some(previous) = self.types.insert(output.id, id.clone()) {
            if &previous != id {
                warn!(
                    output = output.name,
                    previous = %previous,
                    node = %id,
                    "output type already produced by another node; typed lookups now resolve to the newer node"
                );
            }
        }
    }

    /// Overlay `overrides` onto this catalog; overriding nodes win.
    pub fn merge(&mut self, overrides: Catalog) {
        for (_, node) in overrides.nodes {
            self.upsert(node);
        }
    }

    /// Swap the node producing `output` for `replacement`, keeping the
    /// original identifier so dependents still resolve.
    pub fn replace_output(
        &mut self,
        output: OutputType,
        replacement: NodeDescriptor,
    ) -> Result<NodeId, LookupError> {
        let id = self
            .types
            .id_for(output.id)
            .cloned()
            .ok_or(LookupError::TypeNotRegistered {
                type_name: output.name,
            })?;
        debug!(node = %id, output = output.name, "patching node");
        self.upsert(replacement.with_id(id.clone()));
        Ok(id)
    }

    /// Catalog restricted to `ids`; the type index is carried over whole.
    pub(crate) fn subset(&self, ids: impl IntoIterator<Item = NodeId>) -> Catalog {
        let nodes = ids
            .into_iter()
            .filter_map(|id| self.nodes.get(&id).map(|node| (id, node.clone())))
            .collect();
        Catalog {
            nodes,
            types: self.types.clone(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&NodeDescriptor> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// All identifiers, sorted.
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.nodes.values()
    }

    pub fn types(&self) -> &TypeIndex {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Process-wide registry
// ---------------------------------------------------------------------------

static REGISTRY: Lazy<RwLock<Catalog>> = Lazy::new(|| RwLock::new(Catalog::new()));

/// Add a node to the process-wide catalog.
///
/// # Panics
/// If a node with the same identifier is already registered. A duplicate is a
/// configuration error in the host program; use [`try_register`] to handle it.
pub fn register(node: impl Into<NodeDescriptor>) {
    if let Err(err) = try_register(node) {
        panic!("graft: {err}");
    }
}

/// Add a node to the process-wide catalog.
pub fn try_register(node: impl Into<NodeDescriptor>) -> Result<(), EngineError> {
    REGISTRY.write().register(node)
}

/// Copy of the process-wide catalog.
pub fn registry() -> Catalog {
    REGISTRY.read().clone()
}

/// Remove every node from the process-wide catalog.
pub fn reset_registry() {
    *REGISTRY.write() = Catalog::new();
}
