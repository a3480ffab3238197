//! The modelling run
//!
//! load → optional long reshape → optional outlier trimming → scale →
//! fit → predict → inverse-scale → evaluate → plot. Control flow only
//! branches on the [`PipelineConfig`].

use anyhow::{Context, Result};
use ndarray::Array2;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::{Layout, PipelineConfig};
use crate::diagnostics::Diagnostics;
use crate::domain::Frame;
use crate::evaluation::{benchmark_reference, BenchmarkScore, ForecastMetrics};
use crate::preprocess::{remove_outliers, FittedScaler, Reshaper, ScaleMethod};
use crate::store::{FeatureStore, TableKey};

/// Outcome of one run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub model: &'static str,
    pub scaler: ScaleMethod,
    pub layout: Layout,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Training rows dropped by outlier trimming
    pub dropped_rows: usize,
    pub test_metrics: ForecastMetrics,
    pub train_metrics: Option<ForecastMetrics>,
    pub benchmarks: Vec<BenchmarkScore>,
    pub epochs: Option<usize>,
    pub artifacts: Vec<PathBuf>,
}

/// Feature/target tables of one run, as loaded from the store
#[derive(Debug, Clone)]
pub struct Dataset {
    pub xtrain: Frame,
    pub ytrain: Frame,
    pub xtest: Frame,
    pub ytest: Frame,
    pub forecasts: Option<Frame>,
}

impl Dataset {
    pub fn load(store: &FeatureStore) -> Result<Self> {
        let forecasts = if store.contains(TableKey::Forecasts) {
            Some(store.read(TableKey::Forecasts)?)
        } else {
            None
        };
        Ok(Self {
            xtrain: store.read(TableKey::Xtrain)?,
            ytrain: store.read(TableKey::Ytrain)?,
            xtest: store.read(TableKey::Xtest)?,
            ytest: store.read(TableKey::Ytest)?,
            forecasts,
        })
    }
}

/// Run against a feature store on disk
pub fn run(config: &PipelineConfig, store: &FeatureStore) -> Result<PipelineReport> {
    config.validate()?;
    let data = Dataset::load(store).context("failed to load feature store")?;
    run_on(config, &data)
}

/// Column of `values` as a vector, or an empty one when out of range
fn column_values(values: &Array2<f64>, column: usize) -> Vec<f64> {
    if column < values.ncols() {
        values.column(column).to_vec()
    } else {
        Vec::new()
    }
}

pub fn run_on(config: &PipelineConfig, data: &Dataset) -> Result<PipelineReport> {
    config.validate()?;
    data.xtrain.ensure_aligned(&data.ytrain)?;
    data.xtest.ensure_aligned(&data.ytest)?;

    // only the long layout relies on `<family><hour>` target names
    let reshaper = match config.layout {
        Layout::Wide => None,
        Layout::Long => Some(Reshaper::from_targets(&data.ytrain, &config.target_families)?),
    };

    let (xtrain, ytrain, xtest, ytest) = match &reshaper {
        None => (
            data.xtrain.clone(),
            data.ytrain.clone(),
            data.xtest.clone(),
            data.ytest.clone(),
        ),
        Some(reshaper) => {
            let (xtrain, ytrain) = reshaper.to_long(&data.xtrain, &data.ytrain)?;
            let (xtest, ytest) = reshaper.to_long(&data.xtest, &data.ytest)?;
            (xtrain, ytrain, xtest, ytest)
        }
    };

    let (xtrain, ytrain, dropped_rows) = if config.remove_outliers {
        let outcome = remove_outliers(&xtrain, &ytrain)?;
        (outcome.features, outcome.targets, outcome.dropped_rows)
    } else {
        (xtrain, ytrain, 0)
    };
    if xtrain.is_empty() {
        anyhow::bail!("no training rows left");
    }

    let x_scaler = FittedScaler::fit(config.scaler, xtrain.values())?;
    let y_scaler = FittedScaler::fit(config.scaler, ytrain.values())?;
    let xtrain_scaled = x_scaler.transform(xtrain.values())?;
    let ytrain_scaled = y_scaler.transform(ytrain.values())?;
    let xtest_scaled = x_scaler.transform(xtest.values())?;

    let model = config.model.fit(&xtrain_scaled, &ytrain_scaled, config.seed)?;

    let test_pred = y_scaler.inverse_transform(&model.predict(&xtest_scaled)?)?;
    let test_pred = ytest.with_values(test_pred)?;
    // evaluate on the wide daily layout regardless of the model layout
    let test_pred = match &reshaper {
        None => test_pred,
        Some(reshaper) => reshaper.targets_to_wide(&test_pred)?,
    };
    let test_actual = data.ytest.clone();
    let test_metrics = ForecastMetrics::calculate(test_pred.values(), test_actual.values())?;
    info!(model = model.name, %test_metrics, "test set evaluated");

    let train_pred = if config.diagnostics.plot_training_fit {
        Some(y_scaler.inverse_transform(&model.predict(&xtrain_scaled)?)?)
    } else {
        None
    };
    let train_metrics = train_pred
        .as_ref()
        .map(|pred| ForecastMetrics::calculate(pred, ytrain.values()))
        .transpose()?;

    let family = config.target_families.iter().find(|prefix| {
        data.ytest
            .columns()
            .iter()
            .any(|c| c.strip_prefix(prefix.as_str()).is_some_and(|h| h.parse::<usize>().is_ok()))
    });
    let benchmarks = match (&data.forecasts, family) {
        (Some(forecasts), Some(prefix)) => benchmark_reference(forecasts, &data.ytest, prefix),
        (Some(_), None) => {
            warn!("no target column matches a declared family, reference benchmark skipped");
            Vec::new()
        }
        _ => Vec::new(),
    };

    let diagnostics = Diagnostics::create(&config.diagnostics.dir)?;
    let column = config.diagnostics.column;
    if column >= test_actual.width() {
        warn!(column, width = test_actual.width(), "diagnostics column out of range, using 0");
    }
    let column = if column < test_actual.width() { column } else { 0 };
    let column_name = test_actual.columns()[column].clone();

    let mut artifacts = vec![diagnostics.scatter(
        "test_scatter",
        &format!("{} test: {column_name}", model.name),
        &column_values(test_actual.values(), column),
        &column_values(test_pred.values(), column),
    )?];
    if let Some(pred) = &train_pred {
        let train_column = column.min(ytrain.width() - 1);
        artifacts.push(diagnostics.scatter(
            "train_scatter",
            &format!("{} train: {}", model.name, ytrain.columns()[train_column]),
            &column_values(ytrain.values(), train_column),
            &column_values(pred, train_column),
        )?);
    }
    if let Some(history) = &model.history {
        artifacts.push(diagnostics.loss_curve(history)?);
    }

    Ok(PipelineReport {
        run_id: diagnostics.run_id().to_string(),
        model: model.name,
        scaler: config.scaler,
        layout: config.layout,
        train_rows: xtrain.height(),
        test_rows: xtest.height(),
        dropped_rows,
        test_metrics,
        train_metrics,
        benchmarks,
        epochs: model.history.as_ref().map(|h| h.epochs()),
        artifacts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::{KnnParams, LassoParams};
    use crate::acquisition::PRICE_COLUMN;
    use crate::ml::ModelSpec;
    use chrono::{NaiveDate, NaiveDateTime};

    fn days(n: usize, offset: i64) -> Vec<NaiveDateTime> {
        let start = NaiveDate::from_ymd_opt(2015, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n as i64)
            .map(|d| start + chrono::Duration::days(d + offset))
            .collect()
    }

    fn dataset(train: usize, test: usize) -> Dataset {
        let build = |n: usize, offset: i64| {
            let x: Vec<Vec<f64>> = (0..n)
                .map(|i| {
                    let t = (i as i64 + offset) as f64;
                    vec![(t * 0.3).sin(), (t * 0.1).cos()]
                })
                .collect();
            let y: Vec<Vec<f64>> = x
                .iter()
                .map(|r| (0..3).map(|h| 50.0 + 10.0 * r[0] + h as f64).collect())
                .collect();
            (
                Frame::from_rows(days(n, offset), vec!["a".into(), "b".into()], &x).unwrap(),
                Frame::from_rows(
                    days(n, offset),
                    (0..3).map(|h| format!("PriceNextDay.{h}")).collect(),
                    &y,
                )
                .unwrap(),
            )
        };
        let (xtrain, ytrain) = build(train, 0);
        let (xtest, ytest) = build(test, train as i64);
        Dataset {
            xtrain,
            ytrain,
            xtest,
            ytest,
            forecasts: None,
        }
    }

    fn config(model: ModelSpec, layout: Layout, dir: &std::path::Path) -> PipelineConfig {
        let mut cfg = PipelineConfig::new(ScaleMethod::MinMax, model);
        cfg.layout = layout;
        cfg.diagnostics.dir = dir.to_path_buf();
        cfg
    }

    #[test]
    fn test_wide_run_reports_metrics_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(ModelSpec::Knn(KnnParams::default()), Layout::Wide, dir.path());
        let report = run_on(&cfg, &dataset(60, 10)).unwrap();

        assert_eq!(report.model, "knn");
        assert_eq!(report.train_rows, 60);
        assert_eq!(report.test_metrics.sample_count, 30);
        assert!(report.test_metrics.smape < 0.2);
        assert_eq!(report.artifacts.len(), 1);
        assert!(report.artifacts[0].starts_with(dir.path().join(&report.run_id)));
    }

    #[test]
    fn test_long_run_evaluates_in_wide_shape() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(
            ModelSpec::Lasso(LassoParams {
                alpha: 0.0001,
                ..Default::default()
            }),
            Layout::Long,
            dir.path(),
        );
        cfg.diagnostics.plot_training_fit = true;
        let report = run_on(&cfg, &dataset(40, 5)).unwrap();

        assert_eq!(report.train_rows, 40 * 3);
        assert_eq!(report.test_rows, 5 * 3);
        assert_eq!(report.test_metrics.sample_count, 15);
        assert!(report.train_metrics.is_some());
        assert_eq!(report.artifacts.len(), 2);
    }

    #[test]
    fn test_unclaimed_target_column_rejected_in_long_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(ModelSpec::Knn(KnnParams::default()), Layout::Long, dir.path());
        cfg.target_families = vec!["Load.".into()];
        assert!(run_on(&cfg, &dataset(20, 5)).is_err());
    }

    #[test]
    fn test_wide_run_accepts_any_target_names() {
        let dir = tempfile::tempdir().unwrap();
        let data = dataset(40, 10);
        let rename = |frame: &Frame| {
            Frame::new(
                frame.index().to_vec(),
                vec![PRICE_COLUMN.to_string()],
                frame.values().slice(ndarray::s![.., 0..1]).to_owned(),
            )
            .unwrap()
        };
        let reference = Frame::new(
            data.ytest.index().to_vec(),
            vec!["reference".into()],
            data.ytest.values().slice(ndarray::s![.., 0..1]).to_owned(),
        )
        .unwrap();
        let data = Dataset {
            ytrain: rename(&data.ytrain),
            ytest: rename(&data.ytest),
            forecasts: Some(reference),
            ..data
        };

        let cfg = config(ModelSpec::Knn(KnnParams::default()), Layout::Wide, dir.path());
        let report = run_on(&cfg, &data).unwrap();
        assert_eq!(report.test_metrics.sample_count, 10);
        assert!(report.benchmarks.is_empty());
    }
}
