//! Tree boosting ensembles (single-output)
//!
//! - least-squares gradient boosting, used by both the `gradient_boost` and
//!   `boosted_trees` families
//! - AdaBoost.R2 with weighted bootstrap resampling and weighted-median
//!   prediction

use anyhow::Result;
use ndarray::{Array1, Array2};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;
use tracing::debug;

use super::models::{AdaBoostParams, BoostLoss, GradientBoostParams};
use super::smartcore::{predict_tree, select_rows, to_dense_matrix, Tree, TreeSettings};
use super::{ModelError, SingleOutputRegressor};

/// Least-squares gradient boosting over CART trees
pub struct GradientBoostingRegressor {
    init: f64,
    learning_rate: f64,
    trees: Vec<Tree>,
}

impl GradientBoostingRegressor {
    pub fn fit(
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &GradientBoostParams,
        seed: u64,
    ) -> Result<Self> {
        ensure_trainable(x, y)?;

        let settings = TreeSettings {
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf,
        };
        let n = x.nrows();
        let sample_size = ((n as f64 * params.subsample).round() as usize).clamp(1, n);
        let mut rng = StdRng::seed_from_u64(seed);

        let full = to_dense_matrix(x);
        let init = y.mean().unwrap_or(0.0);
        let mut fitted = Array1::from_elem(n, init);
        let mut trees = Vec::with_capacity(params.n_estimators);

        for round in 0..params.n_estimators {
            let residuals = y - &fitted;

            let tree = if sample_size < n {
                let mut rows = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
                rows.sort_unstable();
                let target: Vec<f64> = rows.iter().map(|&r| residuals[r]).collect();
                settings.fit(&select_rows(x, &rows), &target)?
            } else {
                settings.fit(&full, &residuals.to_vec())?
            };

            let step = predict_tree(&tree, &full)?;
            fitted.scaled_add(params.learning_rate, &step);
            trees.push(tree);

            if round % 25 == 0 {
                let mse = (y - &fitted).mapv(|r| r * r).mean().unwrap_or(0.0);
                debug!(round, mse, "gradient boosting progress");
            }
        }

        Ok(Self {
            init,
            learning_rate: params.learning_rate,
            trees,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl SingleOutputRegressor for GradientBoostingRegressor {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let matrix = to_dense_matrix(x);
        let mut out = Array1::from_elem(x.nrows(), self.init);
        for tree in &self.trees {
            out.scaled_add(self.learning_rate, &predict_tree(tree, &matrix)?);
        }
        Ok(out)
    }
}

/// AdaBoost.R2 over CART trees
pub struct AdaBoostRegressor {
    trees: Vec<Tree>,
    weights: Vec<f64>,
}

impl AdaBoostRegressor {
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: &AdaBoostParams, seed: u64) -> Result<Self> {
        ensure_trainable(x, y)?;
        let n = x.nrows();

        let settings = TreeSettings {
            max_depth: params.max_depth,
            min_samples_leaf: 1,
        };
        let full = to_dense_matrix(x);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut sample_weight = vec![1.0 / n as f64; n];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut weights = Vec::with_capacity(params.n_estimators);

        for round in 0..params.n_estimators {
            let sampler = WeightedIndex::new(&sample_weight)
                .map_err(|e| anyhow::anyhow!("invalid AdaBoost sample weights: {e}"))?;
            let rows: Vec<usize> = (0..n).map(|_| sampler.sample(&mut rng)).collect();
            let target: Vec<f64> = rows.iter().map(|&r| y[r]).collect();
            let tree = settings.fit(&select_rows(x, &rows), &target)?;

            let predicted = predict_tree(&tree, &full)?;
            let mut error: Vec<f64> = predicted
                .iter()
                .zip(y.iter())
                .map(|(p, t)| (p - t).abs())
                .collect();
            let error_max = error
                .iter()
                .zip(sample_weight.iter())
                .filter(|(_, w)| **w > 0.0)
                .map(|(e, _)| *e)
                .fold(0.0_f64, f64::max);
            if error_max > 0.0 {
                error.iter_mut().for_each(|e| *e /= error_max);
            }
            for e in error.iter_mut() {
                *e = match params.loss {
                    BoostLoss::Linear => *e,
                    BoostLoss::Square => *e * *e,
                    BoostLoss::Exponential => 1.0 - (-*e).exp(),
                };
            }

            let estimator_error: f64 = sample_weight
                .iter()
                .zip(error.iter())
                .map(|(w, e)| w * e)
                .sum();

            if estimator_error <= 0.0 {
                // perfect fit
                trees.push(tree);
                weights.push(1.0);
                break;
            }
            if estimator_error >= 0.5 {
                if trees.is_empty() {
                    trees.push(tree);
                    weights.push(1.0);
                }
                debug!(round, estimator_error, "AdaBoost stopped: weak learner too poor");
                break;
            }

            let beta = estimator_error / (1.0 - estimator_error);
            trees.push(tree);
            weights.push(params.learning_rate * (1.0 / beta).ln());

            if round + 1 < params.n_estimators {
                for (w, e) in sample_weight.iter_mut().zip(error.iter()) {
                    if *w > 0.0 {
                        *w *= beta.powf((1.0 - e) * params.learning_rate);
                    }
                }
                let total: f64 = sample_weight.iter().sum();
                if total <= 0.0 {
                    break;
                }
                sample_weight.iter_mut().for_each(|w| *w /= total);
            }
        }

        Ok(Self { trees, weights })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl SingleOutputRegressor for AdaBoostRegressor {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let matrix = to_dense_matrix(x);
        let per_tree = self
            .trees
            .iter()
            .map(|tree| predict_tree(tree, &matrix))
            .collect::<Result<Vec<_>>>()?;

        let out = (0..x.nrows())
            .map(|i| {
                let values: Vec<f64> = per_tree.iter().map(|p| p[i]).collect();
                weighted_median(&values, &self.weights)
            })
            .collect::<Vec<f64>>();
        Ok(Array1::from(out))
    }
}

fn ensure_trainable(x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ModelError> {
    if x.nrows() != y.len() {
        return Err(ModelError::ShapeMismatch {
            rows: x.nrows(),
            targets: y.len(),
        });
    }
    if x.nrows() == 0 {
        return Err(ModelError::EmptyTrainingSet);
    }
    Ok(())
}

/// Lowest value whose cumulative weight reaches half the total
pub fn weighted_median(values: &[f64], weights: &[f64]) -> f64 {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let total: f64 = weights.iter().sum();
    let mut cumulative = 0.0;
    for &i in &order {
        cumulative += weights[i];
        if cumulative >= 0.5 * total {
            return values[i];
        }
    }
    order.last().map(|&i| values[i]).unwrap_or(f64::NAN)
}
