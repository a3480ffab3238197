//! Interquartile-band outlier trimming of training targets
//!
//! Each target column gets its own band `[Q10 - 1.5*IQR, Q90 + 1.5*IQR]`
//! with `IQR = Q90 - Q10`. A row is dropped when any of its target values lies
//! strictly outside its column's band; features are filtered with the same mask.

use serde::Serialize;
use tracing::info;

use crate::domain::{Frame, FrameError};

const LOWER_PERCENTILE: f64 = 10.0;
const UPPER_PERCENTILE: f64 = 90.0;
const IQR_MULTIPLIER: f64 = 1.5;

/// Acceptance band of one target column
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutlierBand {
    pub lower: f64,
    pub upper: f64,
}

impl OutlierBand {
    /// Band from the 10th/90th percentiles of `values`
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let q10 = percentile_sorted(&sorted, LOWER_PERCENTILE);
        let q90 = percentile_sorted(&sorted, UPPER_PERCENTILE);
        let iqr = q90 - q10;

        Some(Self {
            lower: q10 - IQR_MULTIPLIER * iqr,
            upper: q90 + IQR_MULTIPLIER * iqr,
        })
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Result of trimming a feature/target pair
#[derive(Debug, Clone)]
pub struct OutlierFilterOutcome {
    pub features: Frame,
    pub targets: Frame,
    pub bands: Vec<OutlierBand>,
    pub dropped_rows: usize,
}

/// Percentile with linear interpolation between closest ranks
pub fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Row mask (`true` = keep) for the targets frame
pub fn inlier_mask(targets: &Frame) -> (Vec<bool>, Vec<OutlierBand>) {
    let mut keep = vec![true; targets.height()];
    let mut bands = Vec::with_capacity(targets.width());

    for column in targets.values().columns() {
        let values = column.to_vec();
        let Some(band) = OutlierBand::from_values(&values) else {
            // all-missing column: every row is missing there
            keep.iter_mut().for_each(|k| *k = false);
            bands.push(OutlierBand {
                lower: f64::NAN,
                upper: f64::NAN,
            });
            continue;
        };
        for (k, v) in keep.iter_mut().zip(values.iter()) {
            if !band.contains(*v) {
                *k = false;
            }
        }
        bands.push(band);
    }

    (keep, bands)
}

/// Drop every row with an out-of-band target value from both frames
pub fn remove_outliers(
    features: &Frame,
    targets: &Frame,
) -> Result<OutlierFilterOutcome, FrameError> {
    features.ensure_aligned(targets)?;

    let (keep, bands) = inlier_mask(targets);
    let dropped_rows = keep.iter().filter(|k| !**k).count();
    info!(
        dropped_rows,
        remaining_rows = targets.height() - dropped_rows,
        "outlier rows removed"
    );

    Ok(OutlierFilterOutcome {
        features: features.filter_rows(&keep)?,
        targets: targets.filter_rows(&keep)?,
        bands,
        dropped_rows,
    })
}
