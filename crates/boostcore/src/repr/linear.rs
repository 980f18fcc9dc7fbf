//! Linear model data structure.

use std::io::{Read, Write};

use ndarray::{Array1, ArrayView1};

use crate::data::{Entry, FVec};
use crate::io::{DeserializeError, ReadLe, SerializeError, WriteLe};

const RESERVED_PARAM_BYTES: usize = 28;

/// Linear booster model (weights + bias).
///
/// Weights are stored as an `Array1<f32>` of length `n_features + 1`:
///
/// ```text
/// weights[feature]    → coefficient
/// weights[n_features] → bias (last slot)
/// ```
///
/// Features at or beyond `n_features` contribute nothing.
///
/// # Persisted layout
///
/// ```text
/// i32 num_feature, 28 reserved bytes
/// u64 weight count (num_feature + 1)
/// f32 × count
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    weights: Array1<f32>,
}

impl Default for LinearModel {
    fn default() -> Self {
        Self::zeros(0)
    }
}

impl LinearModel {
    /// Create a zero-initialized linear model.
    pub fn zeros(num_features: usize) -> Self {
        Self {
            weights: Array1::zeros(num_features + 1),
        }
    }

    /// Create from coefficients followed by the bias.
    ///
    /// # Panics
    ///
    /// Panics if `weights` is empty (the bias slot is required).
    pub fn from_weights(weights: Vec<f32>) -> Self {
        assert!(!weights.is_empty(), "weights must include the bias slot");
        Self {
            weights: Array1::from(weights),
        }
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.weights.len() - 1
    }

    #[inline]
    pub fn weight(&self, feature: usize) -> f32 {
        self.weights[feature]
    }

    #[inline]
    pub fn bias(&self) -> f32 {
        self.weights[self.n_features()]
    }

    /// Coefficients without the bias.
    #[inline]
    pub fn coefficients(&self) -> ArrayView1<'_, f32> {
        self.weights.slice(ndarray::s![..-1])
    }

    #[inline]
    pub fn set_weight(&mut self, feature: usize, value: f32) {
        self.weights[feature] = value;
    }

    #[inline]
    pub fn add_weight(&mut self, feature: usize, delta: f32) {
        self.weights[feature] += delta;
    }

    #[inline]
    pub fn add_bias(&mut self, delta: f32) {
        let n = self.n_features();
        self.weights[n] += delta;
    }

    /// Grow to at least `num_features` coefficients. New coefficients are
    /// zero; existing weights and the bias are kept.
    pub fn ensure_features(&mut self, num_features: usize) {
        let n = self.n_features();
        if num_features <= n {
            return;
        }
        let mut weights = Array1::zeros(num_features + 1);
        weights.slice_mut(ndarray::s![..n]).assign(&self.weights.slice(ndarray::s![..n]));
        weights[num_features] = self.bias();
        self.weights = weights;
    }

    /// Prediction for a sparse row.
    pub fn predict_row(&self, row: &[Entry]) -> f32 {
        let n = self.n_features();
        row.iter()
            .filter(|e| (e.index as usize) < n)
            .fold(self.bias(), |acc, e| acc + self.weights[e.index as usize] * e.value)
    }

    /// Prediction for a dense feature vector; missing features contribute 0.
    pub fn predict_fvec(&self, feat: &FVec) -> f32 {
        (0..self.n_features())
            .filter_map(|f| feat.get(f).map(|v| self.weights[f] * v))
            .fold(self.bias(), |acc, x| acc + x)
    }

    pub fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> Result<(), SerializeError> {
        writer.write_le_i32(self.n_features() as i32)?;
        writer.write_all(&[0u8; RESERVED_PARAM_BYTES])?;
        writer.write_le_len(self.weights.len())?;
        for &w in &self.weights {
            writer.write_le_f32(w)?;
        }
        Ok(())
    }

    pub fn deserialize<R: Read + ?Sized>(reader: &mut R) -> Result<Self, DeserializeError> {
        let num_feature = reader.read_le_i32("linear param block")?;
        reader.read_le_array::<RESERVED_PARAM_BYTES>("linear param block")?;
        let count = reader.read_le_len("linear weights")?;
        if num_feature < 0 || count != num_feature as usize + 1 {
            return Err(DeserializeError::Corrupt(format!(
                "linear model with {num_feature} features holds {count} weights"
            )));
        }
        let weights = reader.read_le_vec(count, |r| r.read_le_f32("linear weights"))?;
        Ok(Self::from_weights(weights))
    }
}
