//! Linear booster.

use super::{check_boost_inputs, decode_payload, BoosterError, GradBooster};
use crate::data::{FVec, SparseMatrix};
use crate::io::{BoosterKind, DeserializeError, SerializeError};
use crate::repr::LinearModel;
use crate::training::{CoordinateDescent, LinearTrainParams, TrainingLogger};
use crate::utils::{parse_param, run_with_threads};

/// Linear model trained by one coordinate-descent round per
/// [`do_boost`](GradBooster::do_boost).
///
/// Unlike [`GBTree`](super::GBTree), rounds accumulate into the same
/// weights. The model widens itself to the matrix's column count; features
/// beyond the model's width are ignored at prediction time.
pub struct GBLinear {
    model: LinearModel,
    num_feature: u32,
    updater: CoordinateDescent,
    logger: TrainingLogger,
    rounds: usize,
}

impl Default for GBLinear {
    fn default() -> Self {
        Self::new()
    }
}

impl GBLinear {
    pub fn new() -> Self {
        Self::with_params(LinearTrainParams::default())
    }

    pub fn with_params(params: LinearTrainParams) -> Self {
        Self {
            model: LinearModel::default(),
            num_feature: 0,
            logger: TrainingLogger::new(params.verbosity),
            updater: CoordinateDescent::new(params),
            rounds: 0,
        }
    }

    #[inline]
    pub fn model(&self) -> &LinearModel {
        &self.model
    }

    #[inline]
    pub fn params(&self) -> &LinearTrainParams {
        self.updater.params()
    }
}

impl GradBooster for GBLinear {
    fn kind(&self) -> BoosterKind {
        BoosterKind::Linear
    }

    fn num_feature(&self) -> u32 {
        self.model.n_features() as u32
    }

    fn set_param(&mut self, name: &str, value: &str) -> Result<(), BoosterError> {
        if name == "num_feature" {
            self.num_feature = parse_param(name, value)?;
            return Ok(());
        }
        let mut params = self.updater.params().clone();
        if params.set_param(name, value)? {
            self.logger = TrainingLogger::new(params.verbosity);
            self.updater.set_params(params);
        }
        Ok(())
    }

    /// Zero weights for `num_feature` features.
    fn init_model(&mut self) {
        self.model = LinearModel::zeros(self.num_feature as usize);
        self.rounds = 0;
    }

    fn save_payload(&self, out: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.model.serialize(out)
    }

    fn load_payload(&mut self, payload: &[u8]) -> Result<(), DeserializeError> {
        self.model = decode_payload(payload, |r| LinearModel::deserialize(r))?;
        self.num_feature = self.model.n_features() as u32;
        Ok(())
    }

    fn do_boost(
        &mut self,
        grad: &mut [f32],
        hess: &mut [f32],
        matrix: &SparseMatrix,
        _root_index: &[u32],
    ) -> Result<(), BoosterError> {
        let num_col = check_boost_inputs(grad, hess, matrix, &[], 1)?;
        self.model.ensure_features(num_col);
        self.num_feature = self.model.n_features() as u32;

        let (model, updater) = (&mut self.model, &self.updater);
        let hess = &*hess;
        run_with_threads(updater.params().n_threads, |parallelism| {
            updater.update(model, grad, hess, matrix, parallelism);
        });

        self.logger.log_metrics(
            self.rounds,
            &[
                ("bias", self.model.bias() as f64),
                ("l1_norm", self.model.coefficients().iter().map(|w| w.abs() as f64).sum()),
            ],
        );
        self.rounds += 1;
        Ok(())
    }

    fn predict(&self, matrix: &SparseMatrix, ridx: usize, _root_id: u32) -> f32 {
        self.model.predict_row(matrix.row_slice(ridx))
    }

    fn predict_dense(&self, values: &[f32], unknown: &[bool], _root_id: u32) -> f32 {
        self.model.predict_fvec(&FVec::from_dense(values, unknown))
    }
}
