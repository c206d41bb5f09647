//! `nodes` crate: everything a node author touches.
//!
//! A node is declared with [`Node<T>`], naming its identifier, the nodes it
//! depends on and an async body producing a `T`. Registration erases the type
//! into a [`NodeDescriptor`] whose body implements [`ExecutableNode`]; the
//! engine crate schedules and runs descriptors. Inside a body, dependency
//! outputs are fetched through the [`Scope`] handed to it.

pub mod error;
pub mod id;
pub mod mock;
pub mod node;
pub mod scope;
pub mod traits;
pub mod types;

pub use error::{LookupError, NodeError};
pub use id::NodeId;
pub use node::{Node, NodeDescriptor, NodeFuture, OutputType};
pub use scope::Scope;
pub use traits::ExecutableNode;
pub use types::{downcast_value, ResultMap, TypeIndex, Value};
