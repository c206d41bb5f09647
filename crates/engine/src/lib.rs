//! `engine` crate: catalog, dependency resolution, level scheduling, the
//! concurrent execution engine and the result cache.

pub mod builder;
pub mod cache;
pub mod catalog;
pub mod dag;
pub mod error;
pub mod execute;
pub mod executor;
pub mod options;
pub mod results;

pub use builder::{resolve, Builder};
pub use cache::{default_cache, reset_default_cache, Cache, CacheError, MemoryCache};
pub use catalog::{register, registry, reset_registry, try_register, Catalog};
pub use dag::{levels, ExecutionLevel};
pub use error::EngineError;
pub use execute::{execute, execute_for};
pub use executor::Engine;
pub use options::{CacheChoice, RunOptions};
pub use results::{result_of, Results};

pub use nodes::{
    LookupError, Node, NodeDescriptor, NodeError, NodeId, Scope, Value,
};


#[cfg(test)]
mod executor_tests;
