//! Keyed feature store
//!
//! A directory holding one Parquet file per table key. Each file carries an
//! `index` datetime column followed by the named `f64` columns of the frame,
//! so every key can be loaded on its own.

pub mod features;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tracing::{debug, info};

use crate::domain::Frame;

pub const INDEX_COLUMN: &str = "index";

/// Tables held by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum TableKey {
    Xtrain,
    Ytrain,
    Xtest,
    Ytest,
    Forecasts,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Feature store has no table '{key}' ({path})")]
    MissingTable { key: TableKey, path: PathBuf },

    #[error("Table '{0}' has no '{INDEX_COLUMN}' column")]
    MissingIndex(TableKey),

    #[error("Table '{key}' has an empty index cell at row {row}")]
    NullIndex { key: TableKey, row: usize },

    #[error("Table '{key}' has an out-of-range timestamp: {millis}")]
    BadTimestamp { key: TableKey, millis: i64 },
}

#[derive(Debug, Clone)]
pub struct FeatureStore {
    root: PathBuf,
}

impl FeatureStore {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open the store, creating its directory if needed
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create feature store {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, key: TableKey) -> PathBuf {
        self.root.join(format!("{key}.parquet"))
    }

    pub fn contains(&self, key: TableKey) -> bool {
        self.path(key).is_file()
    }

    pub fn write(&self, key: TableKey, frame: &Frame) -> Result<()> {
        let mut df = frame_to_dataframe(frame)?;
        let path = self.path(key);
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        ParquetWriter::new(file)
            .finish(&mut df)
            .with_context(|| format!("failed to write table {key}"))?;
        info!(%key, rows = frame.height(), columns = frame.width(), "table stored");
        Ok(())
    }

    pub fn read(&self, key: TableKey) -> Result<Frame> {
        let path = self.path(key);
        if !path.is_file() {
            return Err(StoreError::MissingTable { key, path }.into());
        }
        let file = File::open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let df = ParquetReader::new(file)
            .finish()
            .with_context(|| format!("failed to read table {key}"))?;
        let frame = dataframe_to_frame(key, &df)?;
        debug!(%key, rows = frame.height(), columns = frame.width(), "table loaded");
        Ok(frame)
    }
}

fn frame_to_dataframe(frame: &Frame) -> Result<DataFrame> {
    let millis: Vec<i64> = frame
        .index()
        .iter()
        .map(|ts| ts.and_utc().timestamp_millis())
        .collect();
    let index = Series::new(INDEX_COLUMN, millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;

    let mut columns = Vec::with_capacity(frame.width() + 1);
    columns.push(index);
    for (c, name) in frame.columns().iter().enumerate() {
        columns.push(Series::new(name, frame.values().column(c).to_vec()));
    }
    Ok(DataFrame::new(columns)?)
}

fn dataframe_to_frame(key: TableKey, df: &DataFrame) -> Result<Frame> {
    let index_series = df
        .column(INDEX_COLUMN)
        .map_err(|_| StoreError::MissingIndex(key))?
        .cast(&DataType::Int64)?;
    let index = index_series
        .i64()?
        .into_iter()
        .enumerate()
        .map(|(row, ms)| {
            let ms = ms.ok_or(StoreError::NullIndex { key, row })?;
            DateTime::from_timestamp_millis(ms)
                .map(|dt| dt.naive_utc())
                .ok_or(StoreError::BadTimestamp { key, millis: ms })
        })
        .collect::<Result<Vec<NaiveDateTime>, StoreError>>()?;

    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|name| *name != INDEX_COLUMN)
        .map(str::to_string)
        .collect();

    let mut values = ndarray::Array2::<f64>::zeros((df.height(), names.len()));
    for (c, name) in names.iter().enumerate() {
        let series = df.column(name)?.cast(&DataType::Float64)?;
        for (r, v) in series.f64()?.into_iter().enumerate() {
            values[[r, c]] = v.unwrap_or(f64::NAN);
        }
    }

    Ok(Frame::new(index, names, values)?)
}
