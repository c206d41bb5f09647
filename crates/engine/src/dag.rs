//! Level scheduling. Run this before executing a node set.
//!
//! Rules enforced:
//! 1. Every dependency must name a node in the set.
//! 2. The dependency relation must be acyclic.
//!
//! On success the nodes are partitioned into levels (Kahn's algorithm): every
//! node's dependencies sit in strictly earlier levels, so the nodes of one
//! level can run concurrently.

use std::collections::HashMap;

use nodes::NodeId;

use crate::{Catalog, EngineError};

/// Nodes that may run concurrently. Sorted by identifier.
pub type ExecutionLevel = Vec<NodeId>;

/// Partition `nodes` into dependency-respecting levels.
///
/// # Errors
/// - [`EngineError::UnknownDependency`] if a node depends on an identifier
///   outside the set.
/// - [`EngineError::CycleDetected`] if not every node can be placed.
pub fn levels(nodes: &Catalog) -> Result<Vec<ExecutionLevel>, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Validate dependency references
    // -----------------------------------------------------------------------
    for node in nodes.nodes() {
        if let Some(missing) = node.depends_on.iter().find(|dep| !nodes.contains(dep.as_str())) {
            return Err(EngineError::UnknownDependency {
                node: node.id.clone(),
                dependency: missing.clone(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // 2. In-degrees and reverse adjacency (who depends on me)
    // -----------------------------------------------------------------------
    let mut in_degree: HashMap<&NodeId, usize> = HashMap::with_capacity(nodes.len());
    let mut dependents: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();

    for node in nodes.nodes() {
        in_degree.insert(&node.id, node.depends_on.len());
        for dep in &node.depends_on {
            dependents.entry(dep).or_default().push(&node.id);
        }
    }

    // -----------------------------------------------------------------------
    // 3. Peel frontiers into levels
    // -----------------------------------------------------------------------
    let mut frontier: Vec<&NodeId> = in_degree
        .iter()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut levels: Vec<ExecutionLevel> = Vec::new();
    let mut placed = 0;

    while !frontier.is_empty() {
        let mut next: Vec<&NodeId> = Vec::new();
        for &id in &frontier {
            for &dependent in dependents.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(dependent);
                    }
                }
            }
        }

        let mut level: ExecutionLevel = frontier.into_iter().cloned().collect();
        level.sort();
        placed += level.len();
        levels.push(level);
        frontier = next;
    }

    // Nodes left unplaced sit on or behind a cycle.
    if placed != nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(levels)
}
