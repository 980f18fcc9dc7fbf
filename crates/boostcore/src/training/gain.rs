//! Split gain and leaf weight computation.

// =============================================================================
// GainStrategy
// =============================================================================

/// Scores gradient statistics for split search.
///
/// The updater only relies on two quantities: the optimal weight of a node
/// with statistics `(G, H)` and that node's structure score. A split's loss
/// change is `gain(L) + gain(R) - gain(L + R)`.
pub trait GainStrategy: Send + Sync {
    /// Optimal leaf weight for gradient sum `sum_grad` and hessian sum `sum_hess`.
    fn weight(&self, sum_grad: f64, sum_hess: f64) -> f64;

    /// Structure score of a node.
    fn gain(&self, sum_grad: f64, sum_hess: f64) -> f64;

    /// Loss change of splitting a node into the two given halves.
    #[inline]
    fn split_gain(&self, grad_left: f64, hess_left: f64, grad_right: f64, hess_right: f64) -> f64 {
        self.gain(grad_left, hess_left) + self.gain(grad_right, hess_right)
            - self.gain(grad_left + grad_right, hess_left + hess_right)
    }
}

// =============================================================================
// L2Gain
// =============================================================================

/// Elastic-net regularized second-order gain.
///
/// ```text
/// gain   = T(G)² / (H + λ)
/// weight = -T(G) / (H + λ)
/// T(G)   = sign(G) × max(0, |G| - α)
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct L2Gain {
    /// L2 regularization (lambda).
    pub reg_lambda: f32,
    /// L1 regularization (alpha).
    pub reg_alpha: f32,
}

impl Default for L2Gain {
    fn default() -> Self {
        Self {
            reg_lambda: 1.0,
            reg_alpha: 0.0,
        }
    }
}

impl L2Gain {
    #[inline]
    fn threshold(&self, g: f64) -> f64 {
        soft_threshold(g, self.reg_alpha as f64)
    }
}

impl GainStrategy for L2Gain {
    #[inline]
    fn weight(&self, sum_grad: f64, sum_hess: f64) -> f64 {
        let denom = sum_hess + self.reg_lambda as f64;
        if denom <= 0.0 {
            return 0.0;
        }
        -self.threshold(sum_grad) / denom
    }

    #[inline]
    fn gain(&self, sum_grad: f64, sum_hess: f64) -> f64 {
        let denom = sum_hess + self.reg_lambda as f64;
        if denom <= 0.0 {
            return 0.0;
        }
        let g = self.threshold(sum_grad);
        g * g / denom
    }
}

/// `sign(x) × max(0, |x| - t)`.
#[inline]
pub fn soft_threshold(x: f64, t: f64) -> f64 {
    if x > t {
        x - t
    } else if x < -t {
        x + t
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gain_symmetric_split() {
        let g = L2Gain::default();
        // left 100/6, right 100/6, parent 0
        let gain = g.split_gain(10.0, 5.0, -10.0, 5.0);
        assert_relative_eq!(gain, 200.0 / 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_weight_no_l1() {
        let g = L2Gain::default();
        assert_relative_eq!(g.weight(-10.0, 5.0), 10.0 / 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_weight_with_l1() {
        let g = L2Gain {
            reg_alpha: 2.0,
            ..Default::default()
        };
        assert_eq!(g.weight(-1.0, 5.0), 0.0);
        assert_relative_eq!(g.weight(-10.0, 5.0), 8.0 / 6.0, epsilon = 1e-9);
        assert_eq!(g.gain(1.5, 5.0), 0.0);
    }

    #[test]
    fn test_zero_denominator() {
        let g = L2Gain {
            reg_lambda: 0.0,
            reg_alpha: 0.0,
        };
        assert_eq!(g.weight(1.0, 0.0), 0.0);
        assert_eq!(g.gain(1.0, 0.0), 0.0);
    }

    #[test]
    fn test_soft_threshold() {
        assert_eq!(soft_threshold(5.0, 2.0), 3.0);
        assert_eq!(soft_threshold(-5.0, 2.0), -3.0);
        assert_eq!(soft_threshold(1.0, 2.0), 0.0);
    }
}
