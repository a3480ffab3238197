//! Data preparation stages of the modeling pipeline
//!
//! - wide/long reshaping of hourly target families
//! - interquartile-band outlier trimming
//! - per-column input/output scaling

pub mod outliers;
pub mod reshape;
pub mod scaling;

pub use outliers::{remove_outliers, OutlierBand, OutlierFilterOutcome};
pub use reshape::{ReshapeError, Reshaper, HOUR_COLUMN};
pub use scaling::{FittedScaler, ScaleMethod};
