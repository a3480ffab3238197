use anyhow::Result;
use chrono::NaiveDate;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};

use crate::ml::ModelSpec;
use crate::preprocess::ScaleMethod;

/// Configuration validation failures, raised before any data is touched
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown scaler '{0}' (expected minmax or meanstd)")]
    UnknownScaler(String),

    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    #[error("Unknown layout '{0}' (expected wide or long)")]
    UnknownLayout(String),

    #[error("Invalid hyperparameters for {model}: {reason}")]
    InvalidHyperparameters { model: &'static str, reason: String },

    #[error("At least one target family must be declared")]
    NoTargetFamilies,

    #[error("Invalid test period: {begin} is after {end}")]
    TestPeriod { begin: NaiveDate, end: NaiveDate },

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// Target table layout fed to the model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// One row per day, one target column per hour
    #[default]
    Wide,
    /// One row per (day, hour) with an explicit hour feature
    Long,
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wide => write!(f, "wide"),
            Self::Long => write!(f, "long"),
        }
    }
}

impl FromStr for Layout {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wide" => Ok(Self::Wide),
            "long" => Ok(Self::Long),
            other => Err(ConfigError::UnknownLayout(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub acquisition: AcquisitionConfig,
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcquisitionConfig {
    pub market: String,
    pub dataset_base_url: String,
    pub forecast_url: String,
    /// Directory receiving the train/test/forecast CSVs
    pub output_dir: PathBuf,
    pub begin_test_date: Option<NaiveDate>,
    pub end_test_date: Option<NaiveDate>,
    /// Used only when no test dates are configured
    pub years_test: u32,
    /// Training rows before this date are discarded
    pub train_cutoff: NaiveDate,
    pub http_timeout_seconds: u64,
}

impl AcquisitionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let (Some(begin), Some(end)) = (self.begin_test_date, self.end_test_date) {
            if begin > end {
                return Err(ConfigError::TestPeriod { begin, end });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Feature store directory (one Parquet file per key)
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DiagnosticsConfig {
    pub dir: PathBuf,
    /// Target column shown in the scatter plots
    pub column: usize,
    pub plot_training_fit: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("diagnostics"),
            column: 0,
            plot_training_fit: false,
        }
    }
}

/// Everything one modelling run depends on
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub scaler: ScaleMethod,
    pub model: ModelSpec,
    pub remove_outliers: bool,
    pub layout: Layout,
    #[serde(default = "default_target_families")]
    pub target_families: Vec<String>,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub seed: u64,
}

pub fn default_target_families() -> Vec<String> {
    vec!["PriceNextDay.".to_string()]
}

impl PipelineConfig {
    pub fn new(scaler: ScaleMethod, model: ModelSpec) -> Self {
        Self {
            scaler,
            model,
            remove_outliers: false,
            layout: Layout::Wide,
            target_families: default_target_families(),
            diagnostics: DiagnosticsConfig::default(),
            seed: 0,
        }
    }

    /// Build from textual names, as given on the command line
    pub fn from_names(scaler: &str, model: &str) -> Result<Self, ConfigError> {
        let config = Self::new(scaler.parse()?, model.parse()?);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_families.is_empty() || self.target_families.iter().any(String::is_empty) {
            return Err(ConfigError::NoTargetFamilies);
        }
        self.model.validate_params()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config/default.toml")
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("EPF__").split("__"));
        let config: Config = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        config.acquisition.validate()?;
        config.pipeline.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::{KnnParams, SvrParams};

    #[test]
    fn test_layout_parsing() {
        assert_eq!("LONG".parse::<Layout>().unwrap(), Layout::Long);
        assert_eq!(
            "tall".parse::<Layout>().unwrap_err(),
            ConfigError::UnknownLayout("tall".into())
        );
    }

    #[test]
    fn test_from_names() {
        let cfg = PipelineConfig::from_names("meanstd", "knn").unwrap();
        assert_eq!(cfg.scaler, ScaleMethod::MeanStd);
        assert_eq!(cfg.model, ModelSpec::Knn(KnnParams::default()));
        assert_eq!(cfg.target_families, vec!["PriceNextDay.".to_string()]);

        assert_eq!(
            PipelineConfig::from_names("zscore", "knn").unwrap_err(),
            ConfigError::UnknownScaler("zscore".into())
        );
    }

    #[test]
    fn test_empty_families_rejected() {
        let mut cfg = PipelineConfig::new(ScaleMethod::MinMax, ModelSpec::Svr(SvrParams::default()));
        cfg.target_families.clear();
        assert_eq!(cfg.validate(), Err(ConfigError::NoTargetFamilies));
    }

    #[test]
    fn test_load_from_toml_with_env_override() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "epf.toml",
                r#"
                [acquisition]
                market = "DE"
                dataset_base_url = "https://zenodo.org/records/4624805/files"
                forecast_url = "https://example.invalid/forecasts.csv"
                output_dir = "data"
                begin_test_date = "2016-01-04"
                end_test_date = "2017-12-31"
                years_test = 2
                train_cutoff = "2013-01-10"
                http_timeout_seconds = 30

                [store]
                path = "data/store"

                [pipeline]
                scaler = "minmax"
                remove_outliers = true
                layout = "wide"

                [pipeline.model]
                kind = "lasso"
                alpha = 0.2
                "#,
            )?;
            jail.set_env("EPF__PIPELINE__SCALER", "meanstd");

            let cfg = Config::load_from("epf.toml").expect("config loads");
            assert_eq!(cfg.pipeline.scaler, ScaleMethod::MeanStd);
            assert!(cfg.pipeline.remove_outliers);
            assert_eq!(cfg.pipeline.model.name(), "lasso");
            assert_eq!(cfg.acquisition.train_cutoff, NaiveDate::from_ymd_opt(2013, 1, 10).unwrap());
            Ok(())
        });
    }

    #[test]
    fn test_unknown_scaler_in_file_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "bad.toml",
                r#"
                [acquisition]
                market = "DE"
                dataset_base_url = "u"
                forecast_url = "u"
                output_dir = "data"
                years_test = 2
                train_cutoff = "2013-01-10"
                http_timeout_seconds = 30

                [store]
                path = "s"

                [pipeline]
                scaler = "zscore"
                remove_outliers = false
                layout = "wide"
                model = { kind = "knn" }
                "#,
            )?;
            assert!(Config::load_from("bad.toml").is_err());
            Ok(())
        });
    }
}
