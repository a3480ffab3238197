//! One-model-per-column adapter for single-output families

use anyhow::{Context, Result};
use ndarray::{Array1, Array2, Axis};
use tracing::debug;

use super::{ModelError, Regressor, SingleOutputRegressor};

/// Independent single-output models, one per target column
pub struct PerColumnRegressor {
    models: Vec<Box<dyn SingleOutputRegressor>>,
}

impl PerColumnRegressor {
    /// Fit `fit_column(x, column, column_index)` for every target column
    pub fn fit<F>(x: &Array2<f64>, y: &Array2<f64>, mut fit_column: F) -> Result<Self>
    where
        F: FnMut(&Array2<f64>, &Array1<f64>, usize) -> Result<Box<dyn SingleOutputRegressor>>,
    {
        if y.ncols() == 0 {
            return Err(ModelError::NoTargets.into());
        }

        let mut models = Vec::with_capacity(y.ncols());
        for (c, column) in y.axis_iter(Axis(1)).enumerate() {
            let model = fit_column(x, &column.to_owned(), c)
                .with_context(|| format!("Failed to fit model for target column {c}"))?;
            debug!(column = c, "target column fitted");
            models.push(model);
        }
        Ok(Self { models })
    }

    pub fn n_models(&self) -> usize {
        self.models.len()
    }
}

impl Regressor for PerColumnRegressor {
    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((x.nrows(), self.models.len()));
        for (model, mut column) in self.models.iter().zip(out.axis_iter_mut(Axis(1))) {
            let predicted = model.predict(x)?;
            if predicted.len() != x.nrows() {
                return Err(ModelError::ShapeMismatch {
                    rows: x.nrows(),
                    targets: predicted.len(),
                }
                .into());
            }
            column.assign(&predicted);
        }
        Ok(out)
    }
}
