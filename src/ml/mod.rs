//! Regression model families
//!
//! - [`models`]: the closed `ModelSpec` variant and its hyperparameters
//! - native multi-output backends: [`neural`], [`neighbors`], [`linear`]
//! - single-output backends: [`svr`], [`boosting`] (on [`smartcore`] trees)
//!
//! Fitting consults the family's declared capability once: native
//! multi-output families fit the whole target matrix, single-output families
//! are wrapped in a [`multi_output::PerColumnRegressor`].

use anyhow::Result;
use ndarray::{Array1, Array2};
use tracing::info;

pub mod boosting;
pub mod linear;
pub mod models;
pub mod multi_output;
pub mod neighbors;
pub mod neural;
pub mod smartcore;
pub mod svr;
pub mod training;

pub use models::{ModelSpec, OutputCapability};
pub use training::TrainingHistory;

use boosting::{AdaBoostRegressor, GradientBoostingRegressor};
use linear::{MultiTaskLinear, PenaltySettings};
use models::GradientBoostParams;
use multi_output::PerColumnRegressor;
use neighbors::KnnRegressor;
use svr::SvrRegressor;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("Feature and target count mismatch: {rows} rows, {targets} targets")]
    ShapeMismatch { rows: usize, targets: usize },

    #[error("Input width mismatch: model expects {expected} features, got {found}")]
    WidthMismatch { expected: usize, found: usize },

    #[error("Cannot train on an empty dataset")]
    EmptyTrainingSet,

    #[error("Target table has no columns")]
    NoTargets,

    #[error("Validation split {fraction} leaves no rows on one side of {rows} rows")]
    ValidationSplit { rows: usize, fraction: f64 },

    #[error("Model family {0} does not support {1:?} fitting")]
    Capability(&'static str, OutputCapability),
}

/// Fitted model predicting every target column at once
pub trait Regressor {
    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>>;
}

/// Fitted model predicting a single target column
pub trait SingleOutputRegressor {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

/// A fitted family plus its training history, if it has one
pub struct TrainedModel {
    pub name: &'static str,
    pub regressor: Box<dyn Regressor>,
    pub history: Option<TrainingHistory>,
}

impl TrainedModel {
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.regressor.predict(x)
    }
}

impl ModelSpec {
    /// Fit the selected family on scaled features and targets
    pub fn fit(&self, x: &Array2<f64>, y: &Array2<f64>, seed: u64) -> Result<TrainedModel> {
        if x.nrows() != y.nrows() {
            return Err(ModelError::ShapeMismatch {
                rows: x.nrows(),
                targets: y.nrows(),
            }
            .into());
        }
        if x.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet.into());
        }

        let capability = self.capability();
        info!(
            model = self.name(),
            ?capability,
            rows = x.nrows(),
            features = x.ncols(),
            targets = y.ncols(),
            "fitting model"
        );

        match capability {
            OutputCapability::NativeMultiOutput => self.fit_native(x, y, seed),
            OutputCapability::SingleOutput => {
                let adapter = PerColumnRegressor::fit(x, y, |x, column, c| {
                    self.fit_single(x, column, seed.wrapping_add(c as u64))
                })?;
                Ok(TrainedModel {
                    name: self.name(),
                    regressor: Box::new(adapter),
                    history: None,
                })
            }
        }
    }

    fn fit_native(&self, x: &Array2<f64>, y: &Array2<f64>, seed: u64) -> Result<TrainedModel> {
        let regressor: Box<dyn Regressor> = match self {
            Self::NeuralNet(p) => {
                let (net, history) = training::train_network(x, y, p, seed)?;
                return Ok(TrainedModel {
                    name: self.name(),
                    regressor: Box::new(net),
                    history: Some(history),
                });
            }
            Self::Knn(p) => Box::new(KnnRegressor::fit(x, y, p)?),
            Self::Lasso(p) => Box::new(MultiTaskLinear::fit(x, y, PenaltySettings::from(p))?),
            Self::ElasticNet(p) => Box::new(MultiTaskLinear::fit(x, y, PenaltySettings::from(p))?),
            Self::Svr(_) | Self::AdaBoost(_) | Self::GradientBoost(_) | Self::BoostedTrees(_) => {
                return Err(
                    ModelError::Capability(self.name(), OutputCapability::NativeMultiOutput).into(),
                )
            }
        };

        Ok(TrainedModel {
            name: self.name(),
            regressor,
            history: None,
        })
    }

    fn fit_single(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        seed: u64,
    ) -> Result<Box<dyn SingleOutputRegressor>> {
        let model: Box<dyn SingleOutputRegressor> = match self {
            Self::Svr(p) => Box::new(SvrRegressor::fit(x, y, p)?),
            Self::AdaBoost(p) => Box::new(AdaBoostRegressor::fit(x, y, p, seed)?),
            Self::GradientBoost(p) => Box::new(GradientBoostingRegressor::fit(x, y, p, seed)?),
            Self::BoostedTrees(p) => Box::new(GradientBoostingRegressor::fit(
                x,
                y,
                &GradientBoostParams::from(p),
                seed,
            )?),
            Self::NeuralNet(_) | Self::Knn(_) | Self::Lasso(_) | Self::ElasticNet(_) => {
                return Err(
                    ModelError::Capability(self.name(), OutputCapability::SingleOutput).into(),
                )
            }
        };
        Ok(model)
    }
}
