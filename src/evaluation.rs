//! Forecast accuracy metrics
//!
//! The headline score is the symmetric mean absolute percentage error
//! (SMAPE), averaged over every element of the prediction matrix. MAE, RMSE,
//! R² and the largest absolute error are reported alongside.

use chrono::{Duration, NaiveDateTime};
use ndarray::Array2;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

use crate::domain::Frame;

/// Metric calculation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricsError {
    #[error("Dimension mismatch: actual={actual:?}, predicted={predicted:?}")]
    DimensionMismatch {
        actual: (usize, usize),
        predicted: (usize, usize),
    },

    #[error("Empty data provided")]
    EmptyData,
}

/// SMAPE contribution of one (prediction, actual) pair
///
/// `0 / 0` contributes 0: a zero forecast of a zero price is exact.
pub fn smape_term(predicted: f64, actual: f64) -> f64 {
    let denom = predicted.abs() + actual.abs();
    if denom == 0.0 {
        0.0
    } else {
        2.0 * (actual - predicted).abs() / denom
    }
}

/// `mean(2|r - p| / (|p| + |r|))` over all elements, in [0, 2]
pub fn smape(predicted: &Array2<f64>, actual: &Array2<f64>) -> Result<f64, MetricsError> {
    check_shapes(predicted, actual)?;
    let total: f64 = predicted
        .iter()
        .zip(actual.iter())
        .map(|(p, r)| smape_term(*p, *r))
        .sum();
    Ok(total / predicted.len() as f64)
}

fn check_shapes(predicted: &Array2<f64>, actual: &Array2<f64>) -> Result<(), MetricsError> {
    if predicted.dim() != actual.dim() {
        return Err(MetricsError::DimensionMismatch {
            actual: actual.dim(),
            predicted: predicted.dim(),
        });
    }
    if predicted.is_empty() {
        return Err(MetricsError::EmptyData);
    }
    Ok(())
}

/// Forecast accuracy metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastMetrics {
    pub smape: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Square Error
    pub rmse: f64,
    /// R² (coefficient of determination)
    pub r2: f64,
    pub sample_count: usize,
    pub max_error: f64,
}

impl ForecastMetrics {
    pub fn calculate(predicted: &Array2<f64>, actual: &Array2<f64>) -> Result<Self, MetricsError> {
        let smape = smape(predicted, actual)?;
        let n = actual.len() as f64;

        let errors = actual - predicted;
        let mae = errors.mapv(f64::abs).sum() / n;
        let sse = errors.mapv(|e| e * e).sum();
        let rmse = (sse / n).sqrt();

        let mean_actual = actual.sum() / n;
        let total_variance: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();
        let r2 = if total_variance > 1e-10 {
            1.0 - sse / total_variance
        } else {
            0.0
        };

        let max_error = errors.iter().map(|e| e.abs()).fold(0.0f64, f64::max);

        Ok(Self {
            smape,
            mae,
            rmse,
            r2,
            sample_count: actual.len(),
            max_error,
        })
    }
}

impl fmt::Display for ForecastMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SMAPE={:.4}, MAE={:.3}, RMSE={:.3}, R²={:.3}, max error={:.3}, n={}",
            self.smape, self.mae, self.rmse, self.r2, self.max_error, self.sample_count
        )
    }
}

/// SMAPE of one externally produced forecast over the test targets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkScore {
    pub forecast: String,
    pub smape: f64,
    /// Target cells that had a matching reference timestamp
    pub matched: usize,
    pub total: usize,
}

/// Flatten a wide daily target family into `(timestamp, value)` hourly points
///
/// Column `<prefix><h>` of the row dated `d` is the value at `d + h hours`.
/// Columns outside the family are ignored.
pub fn hourly_points(targets: &Frame, prefix: &str) -> Vec<(NaiveDateTime, f64)> {
    let hours: Vec<(usize, i64)> = targets
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(c, name)| {
            name.strip_prefix(prefix)
                .and_then(|h| h.parse::<i64>().ok())
                .map(|h| (c, h))
        })
        .collect();

    let mut points = Vec::with_capacity(targets.height() * hours.len());
    for (r, day) in targets.index().iter().enumerate() {
        for &(c, h) in &hours {
            points.push((*day + Duration::hours(h), targets.values()[[r, c]]));
        }
    }
    points
}

/// Score every reference forecast column against the hourly test targets
pub fn benchmark_reference(
    reference: &Frame,
    targets: &Frame,
    prefix: &str,
) -> Vec<BenchmarkScore> {
    let points = hourly_points(targets, prefix);
    let rows: HashMap<NaiveDateTime, usize> = reference
        .index()
        .iter()
        .enumerate()
        .map(|(i, ts)| (*ts, i))
        .collect();

    let matched: Vec<(usize, f64)> = points
        .iter()
        .filter_map(|(ts, actual)| rows.get(ts).map(|&row| (row, *actual)))
        .collect();

    if matched.is_empty() {
        warn!(
            reference_rows = reference.height(),
            target_points = points.len(),
            "reference forecasts do not overlap the test period"
        );
        return Vec::new();
    }
    if matched.len() < points.len() {
        warn!(
            matched = matched.len(),
            total = points.len(),
            "reference forecasts cover the test period only partially"
        );
    }

    reference
        .columns()
        .iter()
        .enumerate()
        .map(|(c, name)| {
            let total: f64 = matched
                .iter()
                .map(|&(row, actual)| smape_term(reference.values()[[row, c]], actual))
                .sum();
            let score = BenchmarkScore {
                forecast: name.clone(),
                smape: total / matched.len() as f64,
                matched: matched.len(),
                total: points.len(),
            };
            info!(forecast = %score.forecast, smape = score.smape, "reference benchmark");
            score
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;
    use ndarray::array;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2016, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_smape_known_pair() {
        // 2 * 10 / 210
        let v = smape(&array![[100.0]], &array![[110.0]]).unwrap();
        assert_abs_diff_eq!(v, 0.095238095, epsilon = 1e-8);
        let v = smape(&array![[1.0, 2.0]], &array![[1.1, 2.2]]).unwrap();
        assert_abs_diff_eq!(v, 2.0 * 0.1 / 2.1, epsilon = 1e-12);
    }

    #[test]
    fn test_smape_fixed_pair_and_symmetry() {
        let pred = array![[100.0, 50.0]];
        let real = array![[100.0, 60.0]];
        let v = smape(&pred, &real).unwrap();
        assert_abs_diff_eq!(v, 0.5 * (20.0 / 110.0), epsilon = 1e-12);
        assert_abs_diff_eq!(v, 0.0909, epsilon = 1e-4);
        assert_eq!(v, smape(&real, &pred).unwrap());
    }

    #[test]
    fn test_smape_zero_pairs_count_as_exact() {
        let v = smape(&array![[0.0, 1.0]], &array![[0.0, 3.0]]).unwrap();
        // (0 + 1) / 2
        assert_abs_diff_eq!(v, 0.5, epsilon = 1e-12);
        assert_eq!(smape(&array![[0.0]], &array![[0.0]]).unwrap(), 0.0);
    }

    #[test]
    fn test_smape_shape_errors() {
        assert_eq!(
            smape(&array![[1.0, 2.0]], &array![[1.0], [2.0]]),
            Err(MetricsError::DimensionMismatch {
                actual: (2, 1),
                predicted: (1, 2)
            })
        );
        assert_eq!(
            smape(&Array2::zeros((0, 3)), &Array2::zeros((0, 3))),
            Err(MetricsError::EmptyData)
        );
    }

    #[test]
    fn test_perfect_forecast() {
        let actual = array![[1.0, 2.0], [3.0, 4.0]];
        let metrics = ForecastMetrics::calculate(&actual, &actual).unwrap();
        assert_eq!(metrics.smape, 0.0);
        assert_eq!(metrics.mae, 0.0);
        assert_eq!(metrics.rmse, 0.0);
        assert_eq!(metrics.r2, 1.0);
        assert_eq!(metrics.sample_count, 4);
    }

    #[test]
    fn test_forecast_with_errors() {
        let actual = array![[100.0, 200.0, 300.0, 400.0, 500.0]];
        let predicted = array![[110.0, 190.0, 310.0, 390.0, 510.0]];
        let metrics = ForecastMetrics::calculate(&predicted, &actual).unwrap();
        assert_abs_diff_eq!(metrics.mae, 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(metrics.max_error, 10.0, epsilon = 1e-12);
        assert!(metrics.r2 > 0.95);
    }

    #[test]
    fn test_benchmark_matches_hourly_timestamps() {
        let targets = Frame::from_rows(
            vec![day(4), day(5)],
            vec!["PriceNextDay.0".into(), "PriceNextDay.1".into()],
            &[vec![10.0, 20.0], vec![30.0, 40.0]],
        )
        .unwrap();

        let hourly: Vec<NaiveDateTime> = (0..2)
            .flat_map(|d| (0..2).map(move |h| day(4 + d) + Duration::hours(h)))
            .collect();
        let reference = Frame::from_rows(
            hourly,
            vec!["Exact".into(), "Double".into()],
            &[
                vec![10.0, 20.0],
                vec![20.0, 40.0],
                vec![30.0, 60.0],
                vec![40.0, 80.0],
            ],
        )
        .unwrap();

        let scores = benchmark_reference(&reference, &targets, "PriceNextDay.");
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].smape, 0.0);
        assert_eq!(scores[0].matched, 4);
        // 2|x - 2x| / 3x
        assert_abs_diff_eq!(scores[1].smape, 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_benchmark_without_overlap_is_empty() {
        let targets =
            Frame::from_rows(vec![day(4)], vec!["PriceNextDay.0".into()], &[vec![1.0]]).unwrap();
        let reference = Frame::from_rows(vec![day(20)], vec!["X".into()], &[vec![1.0]]).unwrap();
        assert!(benchmark_reference(&reference, &targets, "PriceNextDay.").is_empty());
    }
}
