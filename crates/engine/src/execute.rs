//! Top-level entry points: run the whole catalog, or only what one output
//! type needs.

use std::any::{type_name, Any};
use std::sync::Arc;

use tracing::debug;

use crate::builder::resolve;
use crate::{EngineError, Results, RunOptions};

/// Run every node of the catalog selected by `options`.
pub async fn execute(options: RunOptions) -> Result<Results, EngineError> {
    let catalog = options.catalog()?;
    options.engine(catalog).run().await
}

/// Run only the node producing `T` and its transitive dependencies.
///
/// Returns the typed output together with every result of the run.
pub async fn execute_for<T: Any + Send + Sync>(
    options: RunOptions,
) -> Result<(Arc<T>, Results), EngineError> {
    let catalog = options.catalog()?;
    let target = catalog.types().resolve::<T>()?.clone();
    debug!(target = %target, output = type_name::<T>(), "running subgraph");

    let subset = resolve(&catalog, [target])?;
    let results = options.engine(subset).run().await?;
    let value = results.get::<T>()?;
    Ok((value, results))
}
