//! Training parameters for the tree and linear boosters.
//!
//! Both parameter sets are plain structs with a `bon` builder that validates
//! on [`build`](TreeTrainParamsBuilder::build), serde support for external
//! config sources, and a string-keyed `set_param` for name/value pairs.
//!
//! ```
//! use boostcore::training::{DefaultDirection, TreeTrainParams};
//!
//! let params = TreeTrainParams::builder()
//!     .learning_rate(0.1)
//!     .max_depth(4)
//!     .default_direction(DefaultDirection::Left)
//!     .build()
//!     .unwrap();
//! assert_eq!(params.max_depth, 4);
//! ```

use std::fmt;
use std::str::FromStr;

use bon::Builder;
use serde::{Deserialize, Serialize};

use super::gain::L2Gain;
use super::logger::Verbosity;
use crate::utils::{parse_flag, parse_param, ParamError};

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during parameter validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Learning rate must be positive.
    InvalidLearningRate(f32),
    /// Invalid sampling ratio (must be in (0, 1]).
    InvalidSamplingRatio { field: &'static str, value: f32 },
    /// Invalid regularization parameter.
    InvalidRegularization { field: &'static str, value: f32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLearningRate(v) => {
                write!(f, "learning_rate must be positive, got {}", v)
            }
            Self::InvalidSamplingRatio { field, value } => {
                write!(f, "{} must be in (0, 1], got {}", field, value)
            }
            Self::InvalidRegularization { field, value } => {
                write!(f, "{} must be non-negative, got {}", field, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

fn check_learning_rate(v: f32) -> Result<(), ConfigError> {
    if v > 0.0 && v.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidLearningRate(v))
    }
}

fn check_non_negative(field: &'static str, v: f32) -> Result<(), ConfigError> {
    if v >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidRegularization { field, value: v })
    }
}

// =============================================================================
// DefaultDirection
// =============================================================================

/// Which child receives instances whose split feature is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultDirection {
    /// Try both sides and keep the better one.
    #[default]
    Learn,
    Left,
    Right,
}

impl FromStr for DefaultDirection {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "learn" | "0" => Ok(Self::Learn),
            "left" | "1" => Ok(Self::Left),
            "right" | "2" => Ok(Self::Right),
            _ => Err(()),
        }
    }
}

// =============================================================================
// TreeTrainParams
// =============================================================================

/// Parameters of the column-scan tree updater.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
#[serde(default)]
pub struct TreeTrainParams {
    /// Shrinkage applied to leaf weights. Default: 0.3.
    #[builder(default = 0.3)]
    pub learning_rate: f32,

    /// Minimum loss reduction to keep a split after growth. Default: 0.0.
    #[builder(default = 0.0)]
    pub min_split_loss: f32,

    /// Maximum depth of grown trees. Default: 6.
    #[builder(default = 6)]
    pub max_depth: u32,

    /// Minimum hessian sum per child. Default: 1.0.
    #[builder(default = 1.0)]
    pub min_child_weight: f32,

    /// L2 regularization on leaf weights. Default: 1.0.
    #[builder(default = 1.0)]
    pub reg_lambda: f32,

    /// L1 regularization on leaf weights. Default: 0.0.
    #[builder(default = 0.0)]
    pub reg_alpha: f32,

    /// Fraction of instances used per tree. Default: 1.0.
    #[builder(default = 1.0)]
    pub subsample: f32,

    /// Missing-value routing. Default: learn.
    #[builder(default)]
    pub default_direction: DefaultDirection,

    /// Worker threads; 0 uses the ambient pool. Default: 0.
    #[builder(default = 0)]
    pub n_threads: usize,

    /// Seed of the subsampling generator. Default: 0.
    #[builder(default = 0)]
    pub seed: u64,

    /// Verbosity level. Default: `Silent`.
    #[builder(default)]
    pub verbosity: Verbosity,
}

impl<S: tree_train_params_builder::IsComplete> TreeTrainParamsBuilder<S> {
    /// Build and validate the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `learning_rate <= 0`, `subsample` is
    /// outside (0, 1], or a regularization term is negative.
    pub fn build(self) -> Result<TreeTrainParams, ConfigError> {
        let params = self.__build_internal();
        params.validate()?;
        Ok(params)
    }
}

impl Default for TreeTrainParams {
    fn default() -> Self {
        Self::builder().build().expect("default params are valid")
    }
}

impl TreeTrainParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_learning_rate(self.learning_rate)?;
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(ConfigError::InvalidSamplingRatio {
                field: "subsample",
                value: self.subsample,
            });
        }
        check_non_negative("min_split_loss", self.min_split_loss)?;
        check_non_negative("min_child_weight", self.min_child_weight)?;
        check_non_negative("reg_lambda", self.reg_lambda)?;
        check_non_negative("reg_alpha", self.reg_alpha)?;
        Ok(())
    }

    /// Gain strategy configured by these parameters.
    pub fn gain(&self) -> L2Gain {
        L2Gain {
            reg_lambda: self.reg_lambda,
            reg_alpha: self.reg_alpha,
        }
    }

    /// Apply a name/value pair.
    ///
    /// Returns `Ok(false)` for names this struct does not own. A known name
    /// whose value does not parse or fails validation is an error and
    /// leaves the parameters unchanged.
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<bool, ParamError> {
        let mut next = self.clone();
        match name {
            "learning_rate" | "eta" => next.learning_rate = parse_param(name, value)?,
            "min_split_loss" | "gamma" => next.min_split_loss = parse_param(name, value)?,
            "max_depth" => next.max_depth = parse_param(name, value)?,
            "min_child_weight" => next.min_child_weight = parse_param(name, value)?,
            "reg_lambda" | "lambda" => next.reg_lambda = parse_param(name, value)?,
            "reg_alpha" | "alpha" => next.reg_alpha = parse_param(name, value)?,
            "subsample" => next.subsample = parse_param(name, value)?,
            "nthread" => next.n_threads = parse_param(name, value)?,
            "seed" => next.seed = parse_param(name, value)?,
            "silent" => next.verbosity = Verbosity::from_silent(parse_flag(name, value)?),
            "default_direction" => {
                next.default_direction = value
                    .trim()
                    .parse()
                    .map_err(|_| ParamError::new(name, value))?;
            }
            _ => return Ok(false),
        }
        next.validate().map_err(|_| ParamError::new(name, value))?;
        *self = next;
        Ok(true)
    }
}

// =============================================================================
// LinearTrainParams
// =============================================================================

/// Parameters of the coordinate-descent linear updater.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
#[serde(default)]
pub struct LinearTrainParams {
    /// Step scale of each coordinate update. Default: 1.0.
    #[builder(default = 1.0)]
    pub learning_rate: f32,

    /// L2 regularization on weights. Default: 0.0.
    #[builder(default = 0.0)]
    pub reg_lambda: f32,

    /// L1 regularization on weights. Default: 0.0.
    #[builder(default = 0.0)]
    pub reg_alpha: f32,

    /// L2 regularization on the bias. Default: 0.0.
    #[builder(default = 0.0)]
    pub reg_lambda_bias: f32,

    /// Worker threads; 0 uses the ambient pool. Default: 0.
    #[builder(default = 0)]
    pub n_threads: usize,

    /// Verbosity level. Default: `Silent`.
    #[builder(default)]
    pub verbosity: Verbosity,
}

impl<S: linear_train_params_builder::IsComplete> LinearTrainParamsBuilder<S> {
    /// Build and validate the parameters.
    pub fn build(self) -> Result<LinearTrainParams, ConfigError> {
        let params = self.__build_internal();
        params.validate()?;
        Ok(params)
    }
}

impl Default for LinearTrainParams {
    fn default() -> Self {
        Self::builder().build().expect("default params are valid")
    }
}

impl LinearTrainParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_learning_rate(self.learning_rate)?;
        check_non_negative("reg_lambda", self.reg_lambda)?;
        check_non_negative("reg_alpha", self.reg_alpha)?;
        check_non_negative("reg_lambda_bias", self.reg_lambda_bias)?;
        Ok(())
    }

    /// Apply a name/value pair; see [`TreeTrainParams::set_param`].
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<bool, ParamError> {
        let mut next = self.clone();
        match name {
            "learning_rate" | "eta" => next.learning_rate = parse_param(name, value)?,
            "reg_lambda" | "lambda" => next.reg_lambda = parse_param(name, value)?,
            "reg_alpha" | "alpha" => next.reg_alpha = parse_param(name, value)?,
            "reg_lambda_bias" | "lambda_bias" => next.reg_lambda_bias = parse_param(name, value)?,
            "nthread" => next.n_threads = parse_param(name, value)?,
            "silent" => next.verbosity = Verbosity::from_silent(parse_flag(name, value)?),
            _ => return Ok(false),
        }
        next.validate().map_err(|_| ParamError::new(name, value))?;
        *self = next;
        Ok(true)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn tree_defaults() {
        let p = TreeTrainParams::default();
        assert_eq!(p.learning_rate, 0.3);
        assert_eq!(p.max_depth, 6);
        assert_eq!(p.min_child_weight, 1.0);
        assert_eq!(p.reg_lambda, 1.0);
        assert_eq!(p.subsample, 1.0);
        assert_eq!(p.default_direction, DefaultDirection::Learn);
        assert_eq!(p.verbosity, Verbosity::Silent);
    }

    #[test]
    fn builder_validates() {
        let err = TreeTrainParams::builder().learning_rate(0.0).build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidLearningRate(0.0));

        let err = TreeTrainParams::builder().subsample(1.5).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSamplingRatio { field: "subsample", .. }));

        let err = LinearTrainParams::builder().reg_alpha(-1.0).build().unwrap_err();
        assert_eq!(err.to_string(), "reg_alpha must be non-negative, got -1");
    }

    #[rstest]
    #[case("eta", "0.1")]
    #[case("learning_rate", "0.1")]
    fn tree_learning_rate_aliases(#[case] name: &str, #[case] value: &str) {
        let mut p = TreeTrainParams::default();
        assert_eq!(p.set_param(name, value), Ok(true));
        assert_eq!(p.learning_rate, 0.1);
    }

    #[rstest]
    #[case("gamma", "2", |p: &TreeTrainParams| p.min_split_loss == 2.0)]
    #[case("lambda", "3", |p: &TreeTrainParams| p.reg_lambda == 3.0)]
    #[case("alpha", "0.5", |p: &TreeTrainParams| p.reg_alpha == 0.5)]
    #[case("max_depth", "3", |p: &TreeTrainParams| p.max_depth == 3)]
    #[case("subsample", "0.5", |p: &TreeTrainParams| p.subsample == 0.5)]
    #[case("nthread", "4", |p: &TreeTrainParams| p.n_threads == 4)]
    #[case("default_direction", "right", |p: &TreeTrainParams| p.default_direction == DefaultDirection::Right)]
    #[case("default_direction", "1", |p: &TreeTrainParams| p.default_direction == DefaultDirection::Left)]
    #[case("silent", "0", |p: &TreeTrainParams| p.verbosity == Verbosity::Info)]
    fn tree_set_param(
        #[case] name: &str,
        #[case] value: &str,
        #[case] check: fn(&TreeTrainParams) -> bool,
    ) {
        let mut p = TreeTrainParams::default();
        assert_eq!(p.set_param(name, value), Ok(true));
        assert!(check(&p), "{name}={value} not applied: {p:?}");
    }

    #[test]
    fn unknown_and_invalid_params() {
        let mut p = TreeTrainParams::default();
        assert_eq!(p.set_param("colsample_bytree", "0.5"), Ok(false));

        let before = p.clone();
        assert!(p.set_param("max_depth", "deep").is_err());
        assert!(p.set_param("subsample", "0").is_err());
        assert!(p.set_param("default_direction", "up").is_err());
        assert_eq!(p, before);
    }

    #[test]
    fn linear_set_param() {
        let mut p = LinearTrainParams::default();
        assert_eq!(p.learning_rate, 1.0);
        assert_eq!(p.set_param("lambda_bias", "2"), Ok(true));
        assert_eq!(p.set_param("reg_alpha", "0.25"), Ok(true));
        assert_eq!(p.set_param("max_depth", "3"), Ok(false));
        assert_eq!(p.reg_lambda_bias, 2.0);
        assert_eq!(p.reg_alpha, 0.25);
    }

    #[test]
    fn serde_roundtrip_with_defaults() {
        let p: TreeTrainParams =
            serde_json::from_str(r#"{"max_depth": 3, "default_direction": "left"}"#).unwrap();
        assert_eq!(p.max_depth, 3);
        assert_eq!(p.default_direction, DefaultDirection::Left);
        assert_eq!(p.learning_rate, 0.3);

        let json = serde_json::to_string(&p).unwrap();
        let back: TreeTrainParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
