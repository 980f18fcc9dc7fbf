//! Model representations.
//!
//! - [`tree`]: mutable regression trees ([`RegTree`])
//! - [`linear`]: linear weights with a trailing bias ([`LinearModel`])

pub mod linear;
pub mod tree;

pub use linear::LinearModel;
pub use tree::{NodeId, RegTree};
