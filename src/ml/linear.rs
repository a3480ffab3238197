//! Multi-task lasso and elastic net
//!
//! Both families fit all target columns jointly with a shared sparsity
//! pattern (L1/L2 mixed-norm penalty). Lasso is the `l1_ratio = 1` case.

use anyhow::Result;
use linfa::prelude::*;
use linfa_elasticnet::MultiTaskElasticNet;
use ndarray::Array2;
use tracing::debug;

use super::models::{ElasticNetParams, LassoParams};
use super::{ModelError, Regressor};

/// Settings shared by both multi-task linear families
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenaltySettings {
    pub alpha: f64,
    pub l1_ratio: f64,
    pub fit_intercept: bool,
    pub max_iterations: u32,
    pub tolerance: f64,
}

impl From<&LassoParams> for PenaltySettings {
    fn from(p: &LassoParams) -> Self {
        Self {
            alpha: p.alpha,
            l1_ratio: 1.0,
            fit_intercept: p.fit_intercept,
            max_iterations: p.max_iterations,
            tolerance: p.tolerance,
        }
    }
}

impl From<&ElasticNetParams> for PenaltySettings {
    fn from(p: &ElasticNetParams) -> Self {
        Self {
            alpha: p.alpha,
            l1_ratio: p.l1_ratio,
            fit_intercept: p.fit_intercept,
            max_iterations: p.max_iterations,
            tolerance: p.tolerance,
        }
    }
}

pub struct MultiTaskLinear {
    model: MultiTaskElasticNet<f64>,
    n_features: usize,
}

impl MultiTaskLinear {
    pub fn fit(x: &Array2<f64>, y: &Array2<f64>, settings: PenaltySettings) -> Result<Self> {
        let dataset = Dataset::new(x.clone(), y.clone());
        let model = MultiTaskElasticNet::<f64>::params()
            .penalty(settings.alpha)
            .l1_ratio(settings.l1_ratio)
            .with_intercept(settings.fit_intercept)
            .max_iterations(settings.max_iterations)
            .tolerance(settings.tolerance)
            .fit(&dataset)
            .map_err(|e| anyhow::anyhow!("Multi-task elastic net training failed: {e}"))?;

        debug!(
            duality_gap = model.duality_gap(),
            iterations = model.n_steps(),
            "multi-task linear model fitted"
        );

        Ok(Self {
            model,
            n_features: x.ncols(),
        })
    }

    /// Coefficients, `n_features x n_targets`
    pub fn coefficients(&self) -> &Array2<f64> {
        self.model.hyperplane()
    }
}

impl Regressor for MultiTaskLinear {
    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features {
            return Err(ModelError::WidthMismatch {
                expected: self.n_features,
                found: x.ncols(),
            }
            .into());
        }
        Ok(self.model.predict(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, Axis};

    fn data() -> (Array2<f64>, Array2<f64>) {
        let x = Array::from_shape_fn((50, 4), |(i, j)| (((i + 3) * (j + 2)) % 11) as f64 / 11.0);
        let first = x.column(0).mapv(|v| 2.0 * v);
        let second = x.column(1).mapv(|v| -1.0 * v);
        let y = ndarray::stack![Axis(1), first, second];
        (x, y)
    }

    #[test]
    fn test_lasso_settings_force_pure_l1() {
        let settings = PenaltySettings::from(&LassoParams::default());
        assert_eq!(settings.l1_ratio, 1.0);
        assert_eq!(settings.alpha, 0.05);
        assert!(!settings.fit_intercept);
    }

    #[test]
    fn test_multi_task_fit_predicts_all_targets() {
        let (x, y) = data();
        let model = MultiTaskLinear::fit(
            &x,
            &y,
            PenaltySettings::from(&ElasticNetParams {
                alpha: 0.001,
                ..Default::default()
            }),
        )
        .unwrap();

        let pred = model.predict(&x).unwrap();
        assert_eq!(pred.dim(), (50, 2));
        assert_eq!(model.coefficients().dim(), (4, 2));
        let mae = (&pred - &y).mapv(f64::abs).mean().unwrap();
        assert!(mae < 0.1, "mae {mae}");
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let (x, y) = data();
        let model = MultiTaskLinear::fit(&x, &y, PenaltySettings::from(&LassoParams::default())).unwrap();
        assert!(model.predict(&Array2::zeros((2, 3))).is_err());
    }
}
