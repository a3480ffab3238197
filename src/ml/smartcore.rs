//! SmartCore regression-tree wrapper
//!
//! The boosting ensembles are built from SmartCore's CART regression trees.
//! This module owns the conversion between `ndarray` tables and SmartCore's
//! `DenseMatrix` plus the tree parameter defaults.

use anyhow::Result;
use ndarray::{Array1, Array2, Axis};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};

/// Fitted CART tree
pub type Tree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Row-major copy of an ndarray table
pub fn to_dense_matrix(x: &Array2<f64>) -> DenseMatrix<f64> {
    let flat: Vec<f64> = x.iter().copied().collect();
    DenseMatrix::new(x.nrows(), x.ncols(), flat, false)
}

/// Row subset of an ndarray table as a `DenseMatrix`
pub fn select_rows(x: &Array2<f64>, rows: &[usize]) -> DenseMatrix<f64> {
    to_dense_matrix(&x.select(Axis(0), rows))
}

/// Tree settings shared by the boosting ensembles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeSettings {
    pub max_depth: u16,
    pub min_samples_leaf: usize,
}

impl TreeSettings {
    pub fn parameters(&self) -> DecisionTreeRegressorParameters {
        DecisionTreeRegressorParameters::default()
            .with_max_depth(self.max_depth)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_min_samples_split(2.max(2 * self.min_samples_leaf))
    }

    pub fn fit(&self, x: &DenseMatrix<f64>, y: &Vec<f64>) -> Result<Tree> {
        if y.is_empty() {
            anyhow::bail!("Cannot train a regression tree on an empty dataset");
        }
        DecisionTreeRegressor::fit(x, y, self.parameters())
            .map_err(|e| anyhow::anyhow!("Regression tree training failed: {:?}", e))
    }
}

/// Predict with a fitted tree
pub fn predict_tree(tree: &Tree, x: &DenseMatrix<f64>) -> Result<Array1<f64>> {
    let predictions = tree
        .predict(x)
        .map_err(|e| anyhow::anyhow!("Regression tree prediction failed: {:?}", e))?;
    Ok(Array1::from(predictions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_tree_settings_parameters() {
        let params = TreeSettings {
            max_depth: 3,
            min_samples_leaf: 5,
        }
        .parameters();
        assert_eq!(params.max_depth, Some(3));
        assert_eq!(params.min_samples_leaf, 5);
        assert_eq!(params.min_samples_split, 10);
    }

    #[test]
    fn test_fit_step_function() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [10.0], [11.0], [12.0], [13.0]];
        let y = vec![1.0, 1.0, 1.0, 1.0, 5.0, 5.0, 5.0, 5.0];

        let settings = TreeSettings {
            max_depth: 2,
            min_samples_leaf: 1,
        };
        let tree = settings.fit(&to_dense_matrix(&x), &y).unwrap();
        let pred = predict_tree(&tree, &to_dense_matrix(&array![[0.5], [12.5]])).unwrap();

        assert!((pred[0] - 1.0).abs() < 1e-9);
        assert!((pred[1] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_select_rows() {
        let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let m = select_rows(&x, &[2, 0, 2]);
        let tree = TreeSettings {
            max_depth: 1,
            min_samples_leaf: 1,
        }
        .fit(&m, &vec![1.0, 2.0, 1.0])
        .unwrap();
        assert_eq!(predict_tree(&tree, &m).unwrap().len(), 3);
    }
}
