//! Training data containers.
//!
//! - [`BucketBuilder`]: two-phase budget-then-fill bucketing
//! - [`SparseMatrix`]: row storage plus a value-sorted column view
//! - [`FVec`]: dense per-instance feature vector used for tree traversal

mod bucket;
mod fvec;
mod sparse;

pub use bucket::{BucketBuilder, MAX_BUCKET_KEY};
pub use fvec::FVec;
pub use sparse::{ColEntry, ColIter, Cursor, Entry, MatrixError, RowIter, SparseMatrix};
