//! Day-ahead electricity price forecasting workbench
//!
//! Downloads a benchmark market dataset, turns it into a keyed feature store
//! of daily samples and evaluates regression families on it.

pub mod acquisition;
pub mod config;
pub mod diagnostics;
pub mod domain;
pub mod evaluation;
pub mod ml;
pub mod pipeline;
pub mod preprocess;
pub mod store;
pub mod telemetry;
