//! K-nearest-neighbours regression
//!
//! Neighbour search is delegated to a linfa-nn KD-tree built over the
//! training features; targets are averaged (uniformly or by inverse
//! distance) across all output columns at once.

use anyhow::Result;
use linfa_nn::distance::{Distance, L1Dist, L2Dist};
use linfa_nn::{CommonNearestNeighbour, NearestNeighbour};
use ndarray::{Array1, Array2};

use super::models::{KnnParams, NeighbourMetric, NeighbourWeights};
use super::{ModelError, Regressor};

pub struct KnnRegressor {
    features: Array2<f64>,
    targets: Array2<f64>,
    params: KnnParams,
}

impl KnnRegressor {
    pub fn fit(x: &Array2<f64>, y: &Array2<f64>, params: &KnnParams) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet.into());
        }
        Ok(Self {
            features: x.clone(),
            targets: y.clone(),
            params: params.clone(),
        })
    }

    fn k(&self) -> usize {
        self.params.k.min(self.features.nrows())
    }

    fn predict_with<D>(&self, x: &Array2<f64>, dist: D) -> Result<Array2<f64>>
    where
        D: Distance<f64> + Clone + 'static,
    {
        let index = CommonNearestNeighbour::KdTree
            .from_batch(&self.features, dist.clone())
            .map_err(|e| anyhow::anyhow!("Failed to build neighbour index: {e}"))?;

        let mut out = Array2::zeros((x.nrows(), self.targets.ncols()));
        for (row, mut target) in x.rows().into_iter().zip(out.rows_mut()) {
            let neighbours = index
                .k_nearest(row, self.k())
                .map_err(|e| anyhow::anyhow!("Neighbour query failed: {e}"))?;

            let distances: Vec<f64> = neighbours
                .iter()
                .map(|(point, _)| dist.distance(row, point.view()))
                .collect();
            let weights = neighbour_weights(&distances, self.params.weights);

            for (w, (_, i)) in weights.iter().zip(neighbours.iter()) {
                target.scaled_add(*w, &self.targets.row(*i));
            }
        }
        Ok(out)
    }
}

/// Normalised neighbour weights
///
/// Inverse-distance weighting gives all weight to exact matches when any
/// neighbour sits at distance zero.
pub fn neighbour_weights(distances: &[f64], scheme: NeighbourWeights) -> Array1<f64> {
    let raw: Array1<f64> = match scheme {
        NeighbourWeights::Uniform => Array1::ones(distances.len()),
        NeighbourWeights::Distance if distances.iter().any(|d| *d == 0.0) => distances
            .iter()
            .map(|d| if *d == 0.0 { 1.0 } else { 0.0 })
            .collect(),
        NeighbourWeights::Distance => distances.iter().map(|d| 1.0 / d).collect(),
    };
    let total = raw.sum();
    raw / total
}

impl Regressor for KnnRegressor {
    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.features.ncols() {
            return Err(ModelError::WidthMismatch {
                expected: self.features.ncols(),
                found: x.ncols(),
            }
            .into());
        }
        match self.params.metric {
            NeighbourMetric::Manhattan => self.predict_with(x, L1Dist),
            NeighbourMetric::Euclidean => self.predict_with(x, L2Dist),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_uniform_weights() {
        let w = neighbour_weights(&[1.0, 2.0, 4.0, 8.0], NeighbourWeights::Uniform);
        assert_eq!(w, Array1::from_elem(4, 0.25));
    }

    #[test]
    fn test_distance_weights() {
        let w = neighbour_weights(&[1.0, 2.0], NeighbourWeights::Distance);
        assert_abs_diff_eq!(w[0], 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w[1], 1.0 / 3.0, epsilon = 1e-12);

        let exact = neighbour_weights(&[0.0, 0.5, 0.0], NeighbourWeights::Distance);
        assert_eq!(exact, array![0.5, 0.0, 0.5]);
    }

    #[test]
    fn test_exact_match_returns_training_target() {
        let x = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [5.0, 5.0]];
        let y = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let model = KnnRegressor::fit(&x, &y, &KnnParams::default()).unwrap();

        let pred = model.predict(&array![[1.0, 0.0]]).unwrap();
        assert_abs_diff_eq!(pred[[0, 0]], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pred[[0, 1]], 20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_k_clamped_to_training_rows() {
        let x = array![[0.0], [2.0]];
        let y = array![[0.0], [4.0]];
        let params = KnnParams {
            k: 10,
            weights: NeighbourWeights::Uniform,
            metric: NeighbourMetric::Euclidean,
        };
        let model = KnnRegressor::fit(&x, &y, &params).unwrap();
        let pred = model.predict(&array![[1.5]]).unwrap();
        assert_abs_diff_eq!(pred[[0, 0]], 2.0, epsilon = 1e-12);
    }
}
