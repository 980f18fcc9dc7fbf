//! boostcore: training core for gradient boosting.
//!
//! A dual-access sparse feature matrix, mutable regression trees with
//! stable node ids, and pluggable tree and linear boosters behind a single
//! trait.
//!
//! # Key Types
//!
//! - [`SparseMatrix`] - Row storage plus a value-sorted column view
//! - [`RegTree`] - Array-backed regression tree with split/prune
//! - [`GradBooster`] / [`BoosterRegistry`] - Booster interface and factory
//! - [`TreeUpdater`] / [`ColMaker`] - Tree growth contract and its exact greedy implementation
//! - [`TreeTrainParams`] / [`LinearTrainParams`] - Configuration builders
//!
//! # Training
//!
//! Build a [`SparseMatrix`] with `add_row`, call `build_column_view`, then
//! feed gradients to a booster created by [`BoosterRegistry`] (or to an
//! [`Ensemble`] for multi-round training).
//!
//! ```
//! use boostcore::{BoosterRegistry, GradBooster, Parallelism, SparseMatrix};
//!
//! let mut matrix = SparseMatrix::new();
//! for i in 0..8 {
//!     matrix.add_row(&[0], &[i as f32]);
//! }
//! matrix.build_column_view(Parallelism::Sequential);
//!
//! let mut booster = BoosterRegistry::with_defaults().create_by_name("gbtree").unwrap();
//! booster.set_param("min_child_weight", "0").unwrap();
//! booster.init_model();
//!
//! let mut grad: Vec<f32> = (0..8).map(|i| if i < 4 { -1.0 } else { 1.0 }).collect();
//! let mut hess = vec![1.0; 8];
//! booster.do_boost(&mut grad, &mut hess, &matrix, &[]).unwrap();
//! assert!(booster.predict(&matrix, 0, 0) > booster.predict(&matrix, 7, 0));
//! ```

// Re-export approx traits for users who want to compare predictions
pub use approx;

pub mod booster;
pub mod data;
pub mod io;
pub mod repr;
pub mod training;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use booster::{BoosterError, BoosterRegistry, Ensemble, GBLinear, GBTree, GradBooster};
pub use data::{Entry, FVec, SparseMatrix};
pub use io::BoosterKind;
pub use repr::{LinearModel, NodeId, RegTree};
pub use training::{ColMaker, LinearTrainParams, TreePruner, TreeTrainParams, TreeUpdater};

// Shared utilities
pub use utils::{run_with_threads, Parallelism};
