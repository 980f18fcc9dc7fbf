//! Training components.
//!
//! - [`TreeUpdater`] / [`UpdateContext`]: the contract a tree booster drives
//!   every round
//! - [`ColMaker`]: exact greedy growth over the matrix's column view
//! - [`TreePruner`]: bottom-up removal of low-gain splits
//! - [`CoordinateDescent`]: the linear booster's per-round update
//! - [`TreeTrainParams`] / [`LinearTrainParams`]: validated configuration
//! - [`TrainingLogger`]: verbosity-gated progress reporting

pub mod colmaker;
pub mod gain;
pub mod linear;
pub mod logger;
pub mod params;
pub mod pruner;
pub mod sampling;
pub mod updater;

pub use colmaker::ColMaker;
pub use gain::{GainStrategy, L2Gain};
pub use linear::CoordinateDescent;
pub use logger::{TrainingLogger, Verbosity};
pub use params::{ConfigError, DefaultDirection, LinearTrainParams, TreeTrainParams};
pub use pruner::TreePruner;
pub use sampling::RowSubsampler;
pub use updater::{TreeUpdater, UpdateContext};
