//! Per-column scalers for model inputs and outputs
//!
//! Both supported methods are affine per column, `x' = (x - offset) / scale`,
//! so a fitted scaler is just the two parameter vectors.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::config::ConfigError;

/// Scales below this are treated as constant columns
const MIN_SCALE: f64 = 1e-10;

/// Scaling method applied to inputs and outputs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMethod {
    /// Map each training column onto [0, 1]
    MinMax,
    /// Zero mean, unit variance per training column
    MeanStd,
}

impl fmt::Display for ScaleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinMax => write!(f, "minmax"),
            Self::MeanStd => write!(f, "meanstd"),
        }
    }
}

impl FromStr for ScaleMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minmax" => Ok(Self::MinMax),
            "meanstd" => Ok(Self::MeanStd),
            other => Err(ConfigError::UnknownScaler(other.to_string())),
        }
    }
}

/// A scaler fitted on a training matrix
#[derive(Debug, Clone, PartialEq)]
pub struct FittedScaler {
    pub method: ScaleMethod,
    offset: Array1<f64>,
    scale: Array1<f64>,
}

impl FittedScaler {
    /// Fit per-column parameters on `data` (rows are samples)
    pub fn fit(method: ScaleMethod, data: &Array2<f64>) -> anyhow::Result<Self> {
        if data.nrows() == 0 {
            anyhow::bail!("Cannot fit a {method} scaler on an empty table");
        }

        let (offset, raw_scale) = match method {
            ScaleMethod::MinMax => {
                let min = data.fold_axis(Axis(0), f64::INFINITY, |acc, &v| acc.min(v));
                let max = data.fold_axis(Axis(0), f64::NEG_INFINITY, |acc, &v| acc.max(v));
                let range = &max - &min;
                (min, range)
            }
            ScaleMethod::MeanStd => {
                let mean = data
                    .mean_axis(Axis(0))
                    .ok_or_else(|| anyhow::anyhow!("mean of empty table"))?;
                // population standard deviation
                let std = data.std_axis(Axis(0), 0.0);
                (mean, std)
            }
        };

        // constant columns are shifted only
        let scale = raw_scale.mapv(|s| if s.abs() < MIN_SCALE { 1.0 } else { s });

        Ok(Self {
            method,
            offset,
            scale,
        })
    }

    pub fn n_columns(&self) -> usize {
        self.offset.len()
    }

    pub fn transform(&self, data: &Array2<f64>) -> anyhow::Result<Array2<f64>> {
        self.check_width(data)?;
        Ok((data - &self.offset) / &self.scale)
    }

    pub fn inverse_transform(&self, data: &Array2<f64>) -> anyhow::Result<Array2<f64>> {
        self.check_width(data)?;
        Ok(data * &self.scale + &self.offset)
    }

    fn check_width(&self, data: &Array2<f64>) -> anyhow::Result<()> {
        if data.ncols() != self.n_columns() {
            anyhow::bail!(
                "Scaler column count mismatch: fitted on {}, got {}",
                self.n_columns(),
                data.ncols()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_minmax_bounds() {
        let data = array![[10.0, 20.0], [20.0, 30.0], [30.0, 40.0]];
        let scaler = FittedScaler::fit(ScaleMethod::MinMax, &data).unwrap();

        let scaled = scaler.transform(&data).unwrap();
        assert_eq!(scaled.column(0).to_vec(), vec![0.0, 0.5, 1.0]);
        assert_eq!(scaled.column(1).to_vec(), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_meanstd_standardizes() {
        let data = array![[1.0], [2.0], [3.0], [4.0]];
        let scaler = FittedScaler::fit(ScaleMethod::MeanStd, &data).unwrap();
        let scaled = scaler.transform(&data).unwrap();

        let mean = scaled.mean_axis(Axis(0)).unwrap()[0];
        let std = scaled.std_axis(Axis(0), 0.0)[0];
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(std, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_column_is_shifted_only() {
        let data = array![[5.0, 1.0], [5.0, 2.0]];
        for method in [ScaleMethod::MinMax, ScaleMethod::MeanStd] {
            let scaler = FittedScaler::fit(method, &data).unwrap();
            let scaled = scaler.transform(&data).unwrap();
            assert!(scaled.iter().all(|v| v.is_finite()));
            assert_eq!(scaled[[0, 0]], 0.0);
        }
    }

    #[test]
    fn test_test_data_uses_training_parameters() {
        let train = array![[0.0], [10.0]];
        let test = array![[20.0]];
        let scaler = FittedScaler::fit(ScaleMethod::MinMax, &train).unwrap();
        assert_eq!(scaler.transform(&test).unwrap()[[0, 0]], 2.0);
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let scaler = FittedScaler::fit(ScaleMethod::MeanStd, &array![[1.0, 2.0]]).unwrap();
        assert!(scaler.transform(&array![[1.0]]).is_err());
    }

    #[test]
    fn test_parse_scale_method() {
        assert_eq!("minmax".parse::<ScaleMethod>().unwrap(), ScaleMethod::MinMax);
        assert_eq!("MeanStd".parse::<ScaleMethod>().unwrap(), ScaleMethod::MeanStd);
        assert_eq!(
            "zscore".parse::<ScaleMethod>().unwrap_err(),
            ConfigError::UnknownScaler("zscore".into())
        );
    }
}
