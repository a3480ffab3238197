//! Benchmark dataset acquisition
//!
//! Downloads a market's hourly dataset and the published reference
//! forecasts, splits the dataset into train/test periods and writes
//! `<market>_train.csv`, `<market>_test.csv` and `<market>_test_forecasts.csv`.

pub mod hourly;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::config::AcquisitionConfig;
use crate::domain::Frame;

pub const PRICE_COLUMN: &str = "Price";

/// Hours per test year in the year-based split
const HOURS_PER_TEST_YEAR: usize = 24 * 364;

/// How the hourly dataset is cut into train and test periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestSplit {
    /// Test runs from `begin` 00:00 through `end` 23:00
    Dates { begin: NaiveDate, end: NaiveDate },
    /// The trailing `years` * 364 days form the test set
    Years(u32),
}

impl TestSplit {
    pub fn from_config(cfg: &AcquisitionConfig) -> Self {
        match (cfg.begin_test_date, cfg.end_test_date) {
            (Some(begin), Some(end)) => Self::Dates { begin, end },
            _ => Self::Years(cfg.years_test),
        }
    }

    /// Split into `(train, test)`
    pub fn apply(&self, data: &Frame) -> Result<(Frame, Frame)> {
        let (train_mask, test_mask): (Vec<bool>, Vec<bool>) = match *self {
            Self::Dates { begin, end } => {
                let begin = begin.and_time(NaiveTime::MIN);
                let end = end
                    .and_hms_opt(23, 0, 0)
                    .context("invalid test end date")?;
                data.index()
                    .iter()
                    .map(|ts| (*ts < begin, *ts >= begin && *ts <= end))
                    .unzip()
            }
            Self::Years(years) => {
                let test_rows = HOURS_PER_TEST_YEAR * years as usize;
                if test_rows >= data.height() {
                    anyhow::bail!(
                        "{years} test years need more than the {} available rows",
                        data.height()
                    );
                }
                let start = data.height() - test_rows;
                (0..data.height()).map(|i| (i < start, i >= start)).unzip()
            }
        };

        Ok((data.filter_rows(&train_mask)?, data.filter_rows(&test_mask)?))
    }
}

/// Drop training rows dated before `cutoff`
pub fn apply_cutoff(train: &Frame, cutoff: NaiveDate) -> Result<Frame> {
    let cutoff = cutoff.and_time(NaiveTime::MIN);
    let mask: Vec<bool> = train.index().iter().map(|ts| *ts >= cutoff).collect();
    Ok(train.filter_rows(&mask)?)
}

/// Second column becomes `Price`, the rest `Exogenous 1..n`
fn dataset_column_name(position: usize, _raw: &str) -> String {
    if position == 0 {
        PRICE_COLUMN.to_string()
    } else {
        format!("Exogenous {position}")
    }
}

/// HTTP client for the benchmark dataset and reference forecasts
#[derive(Clone)]
pub struct MarketDataClient {
    dataset_base_url: String,
    forecast_url: String,
    client: reqwest::Client,
}

impl MarketDataClient {
    pub fn new(dataset_base_url: String, forecast_url: String, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("epf-workbench/0.1"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            dataset_base_url,
            forecast_url,
            client,
        })
    }

    pub fn from_config(cfg: &AcquisitionConfig) -> Result<Self> {
        Self::new(
            cfg.dataset_base_url.clone(),
            cfg.forecast_url.clone(),
            Duration::from_secs(cfg.http_timeout_seconds),
        )
    }

    pub fn dataset_url(&self, market: &str) -> String {
        format!("{}/{}.csv", self.dataset_base_url.trim_end_matches('/'), market)
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        let status = resp.status();
        let body = resp.text().await.context("response read failed")?;
        if !status.is_success() {
            anyhow::bail!("GET {url}: HTTP {status}");
        }
        Ok(body)
    }

    /// Hourly dataset with `Price` and `Exogenous n` columns
    pub async fn fetch_market(&self, market: &str) -> Result<Frame> {
        let url = self.dataset_url(market);
        let body = self.get_text(&url).await?;
        let frame = hourly::read_table(body.as_bytes(), dataset_column_name)
            .with_context(|| format!("failed to parse dataset {market}"))?;
        info!(market, rows = frame.height(), columns = frame.width(), "dataset downloaded");
        Ok(frame)
    }

    /// Reference forecast table, column names kept as published
    pub async fn fetch_forecasts(&self) -> Result<Frame> {
        let body = self.get_text(&self.forecast_url).await?;
        let frame = hourly::read_table(body.as_bytes(), |_, name| name.to_string())
            .context("failed to parse reference forecasts")?;
        info!(rows = frame.height(), forecasts = ?frame.columns(), "reference forecasts downloaded");
        Ok(frame)
    }
}

/// Paths of the files written by [`acquire`]
#[derive(Debug, Clone, PartialEq)]
pub struct AcquiredFiles {
    pub train: PathBuf,
    pub test: PathBuf,
    pub forecasts: PathBuf,
}

impl AcquiredFiles {
    pub fn in_dir(dir: &Path, market: &str) -> Self {
        Self {
            train: dir.join(format!("{market}_train.csv")),
            test: dir.join(format!("{market}_test.csv")),
            forecasts: dir.join(format!("{market}_test_forecasts.csv")),
        }
    }
}

pub async fn acquire(cfg: &AcquisitionConfig) -> Result<AcquiredFiles> {
    let client = MarketDataClient::from_config(cfg)?;
    let data = client.fetch_market(&cfg.market).await?;

    let split = TestSplit::from_config(cfg);
    let (train, test) = split.apply(&data)?;
    let train = apply_cutoff(&train, cfg.train_cutoff)?;
    info!(
        ?split,
        train_rows = train.height(),
        test_rows = test.height(),
        first_train = ?train.index().first().map(NaiveDateTime::to_string),
        "dataset split"
    );

    let forecasts = client.fetch_forecasts().await?;

    tokio::fs::create_dir_all(&cfg.output_dir)
        .await
        .with_context(|| format!("failed to create {}", cfg.output_dir.display()))?;
    let files = AcquiredFiles::in_dir(&cfg.output_dir, &cfg.market);
    let targets = files.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        hourly::write_table_file(&targets.train, &train)?;
        hourly::write_table_file(&targets.test, &test)?;
        hourly::write_table_file(&targets.forecasts, &forecasts)
    })
    .await
    .context("CSV writer task panicked")??;

    info!(dir = %cfg.output_dir.display(), "acquisition files written");
    Ok(files)
}
