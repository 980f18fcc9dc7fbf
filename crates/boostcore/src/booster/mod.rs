//! Gradient boosters.
//!
//! A booster turns per-instance gradient statistics into a model update and
//! answers predictions from that model. Two variants ship with the crate:
//!
//! - [`GBTree`]: one regression tree grown by a sequence of
//!   [`TreeUpdater`](crate::training::TreeUpdater)s
//! - [`GBLinear`]: a linear model trained by coordinate descent
//!
//! Boosters are used through the [`GradBooster`] trait and created through a
//! [`BoosterRegistry`], keyed by [`BoosterKind`]. Every saved model is
//! wrapped in the native envelope, which records the kind so a stream saved
//! by one variant cannot be loaded into another.
//!
//! ```
//! use boostcore::booster::{BoosterRegistry, GradBooster};
//! use boostcore::io::BoosterKind;
//!
//! let registry = BoosterRegistry::with_defaults();
//! let mut booster = registry.create_by_name("gbtree").unwrap();
//! booster.set_param("max_depth", "3").unwrap();
//! booster.init_model();
//! assert_eq!(booster.kind(), BoosterKind::Tree);
//! ```

pub mod ensemble;
pub mod gblinear;
pub mod gbtree;
pub mod registry;

use std::io::{Read, Write};

use ndarray::{Array1, ArrayView2, Axis};
use thiserror::Error;

use crate::data::{MatrixError, SparseMatrix};
use crate::io::{BoosterKind, DeserializeError, FormatHeader, NativeCodec, SerializeError};
use crate::repr::NodeId;
use crate::utils::ParamError;
use crate::Parallelism;

pub use ensemble::Ensemble;
pub use gblinear::GBLinear;
pub use gbtree::GBTree;
pub use registry::{BoosterCtor, BoosterRegistry};

// =============================================================================
// BoosterError
// =============================================================================

/// Errors reported by boosters and the registry.
#[derive(Debug, Error)]
pub enum BoosterError {
    /// No constructor is registered under this name or id.
    #[error("unknown booster `{0}`")]
    UnknownBooster(String),

    /// A recognized parameter carried an unusable value.
    #[error(transparent)]
    InvalidParam(#[from] ParamError),

    /// The booster does not support this operation.
    #[error("{0} is not implemented for this booster")]
    NotImplemented(&'static str),

    /// Training needs the matrix's column view.
    #[error("training requires a matrix with column access")]
    NoColumnAccess,

    /// Gradient buffers do not match the number of rows.
    #[error("got {grad} gradients and {hess} hessians for {rows} rows")]
    GradientLenMismatch { grad: usize, hess: usize, rows: usize },

    /// Root assignment is malformed.
    #[error("invalid root index: {0}")]
    InvalidRootIndex(String),

    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error(transparent)]
    Deserialize(#[from] DeserializeError),
}

impl From<MatrixError> for BoosterError {
    fn from(err: MatrixError) -> Self {
        match err {
            MatrixError::NoColumnAccess => Self::NoColumnAccess,
            MatrixError::Serialize(e) => Self::Serialize(e),
            MatrixError::Deserialize(e) => Self::Deserialize(e),
            MatrixError::Io(e) => Self::Deserialize(DeserializeError::Io(e)),
        }
    }
}

/// Check the shared preconditions of a training step and return the number
/// of feature columns.
pub(crate) fn check_boost_inputs(
    grad: &[f32],
    hess: &[f32],
    matrix: &SparseMatrix,
    root_index: &[u32],
    num_roots: u32,
) -> Result<usize, BoosterError> {
    let num_col = matrix.num_col()?;
    let rows = matrix.num_row();
    if grad.len() != rows || hess.len() != rows {
        return Err(BoosterError::GradientLenMismatch {
            grad: grad.len(),
            hess: hess.len(),
            rows,
        });
    }
    check_root_index(root_index, rows, num_roots)?;
    Ok(num_col)
}

/// An empty `root_index` puts every row under root 0; otherwise it needs one
/// root below `num_roots` per row.
pub(crate) fn check_root_index(
    root_index: &[u32],
    rows: usize,
    num_roots: u32,
) -> Result<(), BoosterError> {
    if root_index.is_empty() {
        return Ok(());
    }
    if root_index.len() != rows {
        return Err(BoosterError::InvalidRootIndex(format!(
            "{} entries for {rows} rows",
            root_index.len()
        )));
    }
    if let Some(&bad) = root_index.iter().find(|&&r| r >= num_roots) {
        return Err(BoosterError::InvalidRootIndex(format!(
            "root {bad} out of range for {num_roots} roots"
        )));
    }
    Ok(())
}

// =============================================================================
// GradBooster
// =============================================================================

/// Interface of a gradient booster.
///
/// Implementors provide the raw payload codec and training step; the
/// envelope handling, batch prediction and the kind check on load are
/// provided.
pub trait GradBooster: Send + Sync {
    fn kind(&self) -> BoosterKind;

    /// Number of features recorded by the model.
    fn num_feature(&self) -> u32;

    /// Apply a name/value pair. Unrecognized names are ignored. Shape
    /// parameters such as `num_roots` take effect at the next
    /// [`init_model`](Self::init_model); the current model is untouched.
    fn set_param(&mut self, name: &str, value: &str) -> Result<(), BoosterError>;

    /// Reset the model to its untrained state using the current parameters.
    fn init_model(&mut self);

    /// Write the raw model payload (no envelope).
    fn save_payload(&self, out: &mut Vec<u8>) -> Result<(), SerializeError>;

    /// Replace the model with one decoded from a raw payload.
    fn load_payload(&mut self, payload: &[u8]) -> Result<(), DeserializeError>;

    /// One training step. `grad` and `hess` hold one entry per row and may
    /// be overwritten. An empty `root_index` puts every row under root 0.
    fn do_boost(
        &mut self,
        grad: &mut [f32],
        hess: &mut [f32],
        matrix: &SparseMatrix,
        root_index: &[u32],
    ) -> Result<(), BoosterError>;

    /// Prediction for row `ridx` of `matrix`.
    fn predict(&self, matrix: &SparseMatrix, ridx: usize, root_id: u32) -> f32;

    /// Prediction for a dense instance; `unknown[i]` marks feature `i` missing.
    fn predict_dense(&self, values: &[f32], unknown: &[bool], root_id: u32) -> f32;

    /// Append the node ids visited when predicting row `ridx`.
    fn pred_path(
        &self,
        _out: &mut Vec<NodeId>,
        _matrix: &SparseMatrix,
        _ridx: usize,
        _root_id: u32,
    ) -> Result<(), BoosterError> {
        Err(BoosterError::NotImplemented("pred_path"))
    }

    /// Write the model wrapped in the native envelope.
    fn save_model(&self, writer: &mut dyn Write) -> Result<(), BoosterError> {
        let mut payload = Vec::new();
        self.save_payload(&mut payload)?;
        let mut header = FormatHeader::new(self.kind(), self.num_feature());
        NativeCodec::new().write_to(writer, &mut header, &payload)?;
        Ok(())
    }

    /// Load a model saved by a booster of the same kind. On success the
    /// previous model is fully replaced.
    fn load_model(&mut self, reader: &mut dyn Read) -> Result<(), BoosterError> {
        let (header, payload) = NativeCodec::new().read_from(reader)?;
        if header.kind != self.kind() {
            return Err(DeserializeError::TypeMismatch {
                expected: self.kind(),
                actual: header.kind,
            }
            .into());
        }
        self.load_payload(&payload)?;
        Ok(())
    }

    /// Predictions for every row. `root_index` follows the same convention
    /// as [`do_boost`](Self::do_boost): empty, or one entry per row.
    fn predict_batch(
        &self,
        matrix: &SparseMatrix,
        root_index: &[u32],
        parallelism: Parallelism,
    ) -> Result<Vec<f32>, BoosterError> {
        check_root_index(root_index, matrix.num_row(), u32::MAX)?;
        Ok(parallelism.maybe_par_map(0..matrix.num_row(), |ridx| {
            let root = root_index.get(ridx).copied().unwrap_or(0);
            self.predict(matrix, ridx, root)
        }))
    }

    /// Predictions for the rows of a dense sample-major array. NaN marks a
    /// missing value.
    fn predict_dense_rows(
        &self,
        features: ArrayView2<'_, f32>,
        root_id: u32,
        parallelism: Parallelism,
    ) -> Array1<f32> {
        let rows: Vec<_> = features.axis_iter(Axis(0)).collect();
        let out = parallelism.maybe_par_map(rows, |row| {
            let values: Vec<f32> = row.iter().copied().collect();
            let unknown: Vec<bool> = values.iter().map(|v| v.is_nan()).collect();
            self.predict_dense(&values, &unknown, root_id)
        });
        Array1::from(out)
    }
}

/// Decode a whole payload, rejecting trailing bytes.
pub(crate) fn decode_payload<T>(
    payload: &[u8],
    decode: impl FnOnce(&mut &[u8]) -> Result<T, DeserializeError>,
) -> Result<T, DeserializeError> {
    let mut cursor = payload;
    let value = decode(&mut cursor)?;
    if !cursor.is_empty() {
        return Err(DeserializeError::Corrupt(format!(
            "{} trailing bytes after model payload",
            cursor.len()
        )));
    }
    Ok(value)
}
