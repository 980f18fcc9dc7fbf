//! Coordinate descent for the linear booster.
//!
//! One round updates the bias with a Newton step, then visits every feature
//! column once and applies an elastic-net regularized Newton step to its
//! weight. After each step the gradient buffer is adjusted in place,
//! `g_i += h_i · x_i · Δ`, so later coordinates see the effect of earlier
//! ones within the same round. Feature steps are inherently sequential; only
//! the bias step's reductions use the [`Parallelism`] flag.

use rayon::prelude::*;

use super::gain::soft_threshold;
use super::params::LinearTrainParams;
use crate::data::SparseMatrix;
use crate::repr::LinearModel;
use crate::Parallelism;

/// Denominators below this are treated as zero curvature.
const MIN_HESS: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct CoordinateDescent {
    params: LinearTrainParams,
}

impl CoordinateDescent {
    pub fn new(params: LinearTrainParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &LinearTrainParams {
        &self.params
    }

    pub fn set_params(&mut self, params: LinearTrainParams) {
        self.params = params;
    }

    /// Bias step. Returns the applied delta.
    pub fn update_bias(
        &self,
        model: &mut LinearModel,
        grad: &mut [f32],
        hess: &[f32],
        parallelism: Parallelism,
    ) -> f32 {
        let fold = |(sg, sh): (f64, f64), (&g, &h): (&f32, &f32)| {
            if h >= 0.0 {
                (sg + g as f64, sh + h as f64)
            } else {
                (sg, sh)
            }
        };
        let (sum_grad, sum_hess) = if parallelism.is_parallel() {
            grad.par_iter()
                .zip(hess.par_iter())
                .fold(|| (0.0, 0.0), fold)
                .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1))
        } else {
            grad.iter().zip(hess).fold((0.0, 0.0), fold)
        };

        let denom = sum_hess + self.params.reg_lambda_bias as f64;
        if denom < MIN_HESS {
            return 0.0;
        }
        let delta = (-sum_grad / denom) as f32 * self.params.learning_rate;
        model.add_bias(delta);
        let shift = |(g, &h): (&mut f32, &f32)| {
            if h >= 0.0 {
                *g += h * delta;
            }
        };
        if parallelism.is_parallel() {
            grad.par_iter_mut().zip(hess.par_iter()).for_each(shift);
        } else {
            grad.iter_mut().zip(hess).for_each(shift);
        }
        delta
    }

    /// Weight step for one feature. Returns the applied delta.
    pub fn update_feature(
        &self,
        model: &mut LinearModel,
        grad: &mut [f32],
        hess: &[f32],
        matrix: &SparseMatrix,
        feature: usize,
    ) -> f32 {
        let col = matrix.col_slice(feature);
        let (mut sum_grad, mut sum_hess) = (0.0f64, 0.0f64);
        for e in col {
            let h = hess[e.row as usize];
            if h < 0.0 {
                continue;
            }
            let v = e.value as f64;
            sum_grad += grad[e.row as usize] as f64 * v;
            sum_hess += h as f64 * v * v;
        }

        let lambda = self.params.reg_lambda as f64;
        let grad_l2 = sum_grad + lambda * model.weight(feature) as f64;
        let hess_l2 = sum_hess + lambda;
        if hess_l2 < MIN_HESS {
            return 0.0;
        }
        let step = soft_threshold(-grad_l2 / hess_l2, self.params.reg_alpha as f64 / hess_l2);
        let delta = step as f32 * self.params.learning_rate;
        if delta == 0.0 {
            return 0.0;
        }

        model.add_weight(feature, delta);
        for e in col {
            let h = hess[e.row as usize];
            if h >= 0.0 {
                grad[e.row as usize] += h * e.value * delta;
            }
        }
        delta
    }

    /// Full round: bias, then every feature present in both model and matrix.
    ///
    /// # Panics
    ///
    /// Panics if the matrix lacks column access.
    pub fn update(
        &self,
        model: &mut LinearModel,
        grad: &mut [f32],
        hess: &[f32],
        matrix: &SparseMatrix,
        parallelism: Parallelism,
    ) {
        self.update_bias(model, grad, hess, parallelism);
        let n = matrix
            .num_col()
            .expect("coordinate descent requires column access")
            .min(model.n_features());
        for feature in 0..n {
            self.update_feature(model, grad, hess, matrix, feature);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params() -> LinearTrainParams {
        LinearTrainParams::default()
    }

    #[test]
    fn bias_newton_step() {
        let cd = CoordinateDescent::new(params());
        let mut model = LinearModel::zeros(1);
        let mut grad = vec![-1.0, -3.0];
        let hess = vec![1.0, 1.0];
        let delta = cd.update_bias(&mut model, &mut grad, &hess, Parallelism::Parallel);
        assert_relative_eq!(delta, 2.0);
        assert_relative_eq!(model.bias(), 2.0);
        assert_relative_eq!(grad[0], 1.0);
        assert_relative_eq!(grad[1], -1.0);
    }

    #[test]
    fn feature_step_solves_single_feature_least_squares() {
        // Squared loss at prediction 0 for target y = 2x: g = -y, h = 1.
        let mut m = SparseMatrix::new();
        let xs = [1.0f32, 2.0, 3.0];
        for &x in &xs {
            m.add_row(&[0], &[x]);
        }
        m.build_column_view(Parallelism::Sequential);
        let mut grad: Vec<f32> = xs.iter().map(|&x| -2.0 * x).collect();
        let hess = vec![1.0; 3];

        let cd = CoordinateDescent::new(params());
        let mut model = LinearModel::zeros(1);
        let delta = cd.update_feature(&mut model, &mut grad, &hess, &m, 0);
        assert_relative_eq!(delta, 2.0, epsilon = 1e-6);
        assert_relative_eq!(model.weight(0), 2.0, epsilon = 1e-6);
        assert!(grad.iter().all(|g| g.abs() < 1e-5));
    }

    #[test]
    fn l1_zeroes_small_steps() {
        let mut m = SparseMatrix::new();
        m.add_row(&[0], &[1.0]);
        m.build_column_view(Parallelism::Sequential);
        let mut grad = vec![-0.5];
        let hess = vec![1.0];
        let cd = CoordinateDescent::new(LinearTrainParams::builder().reg_alpha(1.0).build().unwrap());
        let mut model = LinearModel::zeros(1);
        assert_eq!(cd.update_feature(&mut model, &mut grad, &hess, &m, 0), 0.0);
        assert_eq!(model.weight(0), 0.0);
        assert_eq!(grad[0], -0.5);
    }

    #[test]
    fn full_round_reduces_loss() {
        let mut m = SparseMatrix::new();
        let rows = [(1.0f32, 0.5f32), (2.0, -1.0), (3.0, 0.0), (4.0, 2.0)];
        let targets: Vec<f32> = rows.iter().map(|&(a, b)| 1.0 + 0.5 * a - b).collect();
        for &(a, b) in &rows {
            m.add_row(&[0, 1], &[a, b]);
        }
        m.build_column_view(Parallelism::Sequential);

        let loss = |model: &LinearModel| -> f32 {
            (0..m.num_row())
                .map(|r| (model.predict_row(m.row_slice(r)) - targets[r]).powi(2))
                .sum()
        };

        let cd = CoordinateDescent::new(params());
        let mut model = LinearModel::zeros(2);
        let mut last = loss(&model);
        for _ in 0..5 {
            let mut grad: Vec<f32> = (0..m.num_row())
                .map(|r| model.predict_row(m.row_slice(r)) - targets[r])
                .collect();
            let hess = vec![1.0; m.num_row()];
            cd.update(&mut model, &mut grad, &hess, &m, Parallelism::Sequential);
            let now = loss(&model);
            assert!(now <= last + 1e-6, "loss went up: {last} -> {now}");
            last = now;
        }
        assert!(last < loss(&LinearModel::zeros(2)) * 0.5);
    }
}
