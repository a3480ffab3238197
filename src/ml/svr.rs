//! Epsilon support-vector regression with an RBF kernel (single-output)

use anyhow::Result;
use linfa::prelude::*;
use linfa_svm::Svm;
use ndarray::{Array1, Array2};
use tracing::debug;

use super::models::SvrParams;
use super::SingleOutputRegressor;

/// `1 / (n_features * Var(X))` over every element of `x`
pub fn scale_gamma(x: &Array2<f64>) -> f64 {
    let variance = x.var(0.0);
    let n_features = x.ncols().max(1) as f64;
    if variance > 0.0 {
        1.0 / (n_features * variance)
    } else {
        1.0
    }
}

pub struct SvrRegressor {
    model: Svm<f64, f64>,
}

impl SvrRegressor {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: &SvrParams) -> Result<Self> {
        let gamma = params.gamma.unwrap_or_else(|| scale_gamma(x));
        let dataset = Dataset::new(x.clone(), y.clone());

        // linfa parameterises the Gaussian kernel as exp(-|x - y|^2 / eps)
        let model = Svm::<f64, f64>::params()
            .c_svr(params.c, Some(params.epsilon))
            .gaussian_kernel(1.0 / gamma)
            .fit(&dataset)
            .map_err(|e| anyhow::anyhow!("SVR training failed: {e}"))?;

        debug!(gamma, support_vectors = model.nsupport(), "SVR fitted");
        Ok(Self { model })
    }
}

impl SingleOutputRegressor for SvrRegressor {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.model.predict(x))
    }
}
