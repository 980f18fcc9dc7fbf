//! Regression tree representation.
//!
//! - [`RegTree`]: mutable node array with split/prune and a free list
//! - [`Node`], [`NodeKind`], [`ParentLink`]: node layout in memory
//! - [`NodeStat`]: per-node training statistics

mod codec;
mod model;
mod node;

/// Index of a node within a [`RegTree`]'s node array.
pub type NodeId = u32;

pub use model::{RegTree, TreeParam, TreeValidationError, MAX_SPLIT_FEATURE};
pub use node::{Node, NodeKind, NodeStat, ParentLink};
