//! Model family selection and hyperparameters
//!
//! One variant per supported regressor family, each carrying its own
//! hyperparameters. Defaults reproduce the reference benchmark setup.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use validator::Validate;

use crate::config::ConfigError;

/// Whether a family fits all target columns at once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCapability {
    NativeMultiOutput,
    SingleOutput,
}

/// Regressor family plus hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    NeuralNet(NeuralNetParams),
    Knn(KnnParams),
    Lasso(LassoParams),
    ElasticNet(ElasticNetParams),
    Svr(SvrParams),
    AdaBoost(AdaBoostParams),
    GradientBoost(GradientBoostParams),
    BoostedTrees(BoostedTreesParams),
}

impl ModelSpec {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NeuralNet(_) => "neural_net",
            Self::Knn(_) => "knn",
            Self::Lasso(_) => "lasso",
            Self::ElasticNet(_) => "elastic_net",
            Self::Svr(_) => "svr",
            Self::AdaBoost(_) => "ada_boost",
            Self::GradientBoost(_) => "gradient_boost",
            Self::BoostedTrees(_) => "boosted_trees",
        }
    }

    pub fn capability(&self) -> OutputCapability {
        match self {
            Self::NeuralNet(_) | Self::Knn(_) | Self::Lasso(_) | Self::ElasticNet(_) => {
                OutputCapability::NativeMultiOutput
            }
            Self::Svr(_) | Self::AdaBoost(_) | Self::GradientBoost(_) | Self::BoostedTrees(_) => {
                OutputCapability::SingleOutput
            }
        }
    }

    /// Range-check the hyperparameters of the selected family
    pub fn validate_params(&self) -> Result<(), ConfigError> {
        let checked = match self {
            Self::NeuralNet(p) => p.validate(),
            Self::Knn(p) => p.validate(),
            Self::Lasso(p) => p.validate(),
            Self::ElasticNet(p) => p.validate(),
            Self::Svr(p) => p.validate(),
            Self::AdaBoost(p) => p.validate(),
            Self::GradientBoost(p) => p.validate(),
            Self::BoostedTrees(p) => p.validate(),
        };
        checked.map_err(|e| ConfigError::InvalidHyperparameters {
            model: self.name(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Family by name, with default hyperparameters
impl FromStr for ModelSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = match s.trim().to_ascii_lowercase().as_str() {
            "nn" | "neural_net" => Self::NeuralNet(NeuralNetParams::default()),
            "knn" => Self::Knn(KnnParams::default()),
            "lasso" => Self::Lasso(LassoParams::default()),
            "elastic" | "elastic_net" => Self::ElasticNet(ElasticNetParams::default()),
            "svr" => Self::Svr(SvrParams::default()),
            "adaboost" | "ada_boost" => Self::AdaBoost(AdaBoostParams::default()),
            "gradientboost" | "gradient_boost" => {
                Self::GradientBoost(GradientBoostParams::default())
            }
            "lightgbm" | "boosted_trees" => Self::BoostedTrees(BoostedTreesParams::default()),
            other => return Err(ConfigError::UnknownModel(other.to_string())),
        };
        Ok(spec)
    }
}

/// Hidden-layer activation of the feed-forward network
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    LeakyRelu,
    Relu,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct NeuralNetParams {
    /// Hidden dense layers; the linear output layer comes on top
    #[validate(range(min = 3, max = 6))]
    pub hidden_layers: usize,
    #[validate(range(min = 1, max = 4096))]
    pub width: usize,
    pub activation: Activation,
    #[validate(range(min = 0.0, max = 1.0))]
    pub leaky_alpha: f64,
    #[validate(range(min = 1e-6, max = 1.0))]
    pub learning_rate: f64,
    #[validate(range(min = 1))]
    pub batch_size: usize,
    #[validate(range(min = 1))]
    pub max_epochs: usize,
    #[validate(range(min = 1))]
    pub patience: usize,
    /// Trailing fraction of the training rows held out for early stopping
    #[validate(range(min = 0.01, max = 0.5))]
    pub validation_split: f64,
}

impl Default for NeuralNetParams {
    fn default() -> Self {
        Self {
            hidden_layers: 4,
            width: 256,
            activation: Activation::LeakyRelu,
            leaky_alpha: 0.2,
            learning_rate: 1e-3,
            batch_size: 8,
            max_epochs: 10_000,
            patience: 100,
            validation_split: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NeighbourWeights {
    Uniform,
    #[default]
    Distance,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NeighbourMetric {
    /// Minkowski p = 1
    #[default]
    Manhattan,
    /// Minkowski p = 2
    Euclidean,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct KnnParams {
    #[validate(range(min = 1))]
    pub k: usize,
    pub weights: NeighbourWeights,
    pub metric: NeighbourMetric,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self {
            k: 10,
            weights: NeighbourWeights::Distance,
            metric: NeighbourMetric::Manhattan,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct LassoParams {
    #[validate(range(min = 0.0))]
    pub alpha: f64,
    pub fit_intercept: bool,
    #[validate(range(min = 1))]
    pub max_iterations: u32,
    #[validate(range(min = 0.0))]
    pub tolerance: f64,
}

impl Default for LassoParams {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            fit_intercept: false,
            max_iterations: 10_000,
            tolerance: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct ElasticNetParams {
    #[validate(range(min = 0.0))]
    pub alpha: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub l1_ratio: f64,
    pub fit_intercept: bool,
    #[validate(range(min = 1))]
    pub max_iterations: u32,
    #[validate(range(min = 0.0))]
    pub tolerance: f64,
}

impl Default for ElasticNetParams {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            l1_ratio: 0.5,
            fit_intercept: false,
            max_iterations: 10_000,
            tolerance: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct SvrParams {
    #[validate(range(min = 1e-12))]
    pub c: f64,
    #[validate(range(min = 0.0))]
    pub epsilon: f64,
    /// RBF coefficient; `None` uses 1 / (n_features * Var(X))
    #[validate(range(min = 1e-12))]
    pub gamma: Option<f64>,
}

impl Default for SvrParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            epsilon: 0.1,
            gamma: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoostLoss {
    #[default]
    Linear,
    Square,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct AdaBoostParams {
    #[validate(range(min = 1))]
    pub n_estimators: usize,
    #[validate(range(min = 1e-6))]
    pub learning_rate: f64,
    #[validate(range(min = 1, max = 64))]
    pub max_depth: u16,
    pub loss: BoostLoss,
}

impl Default for AdaBoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 1.0,
            max_depth: 3,
            loss: BoostLoss::Linear,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct GradientBoostParams {
    #[validate(range(min = 1))]
    pub n_estimators: usize,
    #[validate(range(min = 1e-6, max = 1.0))]
    pub learning_rate: f64,
    #[validate(range(min = 1, max = 64))]
    pub max_depth: u16,
    #[validate(range(min = 1))]
    pub min_samples_leaf: usize,
    /// Row fraction drawn (without replacement) for each tree
    #[validate(range(min = 0.01, max = 1.0))]
    pub subsample: f64,
}

impl Default for GradientBoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
        }
    }
}

/// Gradient-boosted trees with LightGBM-like defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct BoostedTreesParams {
    #[validate(range(min = 1))]
    pub n_estimators: usize,
    #[validate(range(min = 1e-6, max = 1.0))]
    pub learning_rate: f64,
    #[validate(range(min = 1, max = 64))]
    pub max_depth: u16,
    #[validate(range(min = 1))]
    pub min_child_samples: usize,
    #[validate(range(min = 0.01, max = 1.0))]
    pub bagging_fraction: f64,
}

impl Default for BoostedTreesParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 5,
            min_child_samples: 20,
            bagging_fraction: 1.0,
        }
    }
}

impl From<&BoostedTreesParams> for GradientBoostParams {
    fn from(p: &BoostedTreesParams) -> Self {
        Self {
            n_estimators: p.n_estimators,
            learning_rate: p.learning_rate,
            max_depth: p.max_depth,
            min_samples_leaf: p.min_child_samples,
            subsample: p.bagging_fraction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_families() {
        for (name, expected) in [
            ("nn", "neural_net"),
            ("knn", "knn"),
            ("lasso", "lasso"),
            ("elastic", "elastic_net"),
            ("svr", "svr"),
            ("adaboost", "ada_boost"),
            ("gradientboost", "gradient_boost"),
            ("lightgbm", "boosted_trees"),
        ] {
            assert_eq!(name.parse::<ModelSpec>().unwrap().name(), expected);
        }
    }

    #[test]
    fn test_unknown_model_rejected() {
        assert_eq!(
            "randomforest".parse::<ModelSpec>().unwrap_err(),
            ConfigError::UnknownModel("randomforest".into())
        );
    }

    #[test]
    fn test_capabilities() {
        assert_eq!(
            ModelSpec::Knn(KnnParams::default()).capability(),
            OutputCapability::NativeMultiOutput
        );
        assert_eq!(
            ModelSpec::Svr(SvrParams::default()).capability(),
            OutputCapability::SingleOutput
        );
    }

    #[test]
    fn test_tagged_deserialization_with_defaults() {
        let spec: ModelSpec =
            serde_json::from_str(r#"{"kind": "gradient_boost", "max_depth": 4}"#).unwrap();
        match spec {
            ModelSpec::GradientBoost(p) => {
                assert_eq!(p.max_depth, 4);
                assert_eq!(p.n_estimators, 100);
            }
            other => panic!("unexpected variant {other}"),
        }

        let err = serde_json::from_str::<ModelSpec>(r#"{"kind": "randomforest"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_hyperparameter_ranges() {
        let spec = ModelSpec::NeuralNet(NeuralNetParams {
            hidden_layers: 9,
            ..Default::default()
        });
        assert!(matches!(
            spec.validate_params(),
            Err(ConfigError::InvalidHyperparameters { model: "neural_net", .. })
        ));
        assert!("svr".parse::<ModelSpec>().unwrap().validate_params().is_ok());
    }
}
