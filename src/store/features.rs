//! Daily samples for the feature store
//!
//! One sample per delivery day `d`:
//! - prices of days d-1, d-2, d-3 and d-7 (24 values each)
//! - every exogenous series for days d and d-1 (24 values each)
//! - the day of week of `d`
//!
//! Targets are the 24 hourly prices of day `d` (`PriceNextDay.<h>`).

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use itertools::iproduct;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::{FeatureStore, TableKey};
use crate::acquisition::{hourly, AcquiredFiles, PRICE_COLUMN};
use crate::config::{AcquisitionConfig, StoreConfig};
use crate::domain::Frame;

pub const HOURS_PER_DAY: usize = 24;
pub const PRICE_LAGS: [i64; 4] = [1, 2, 3, 7];
pub const EXOGENOUS_LAGS: [i64; 2] = [0, 1];
pub const TARGET_PREFIX: &str = "PriceNextDay.";
pub const DAY_OF_WEEK_COLUMN: &str = "DayOfWeek";

/// Complete days of an hourly table: date -> row (24 hours x columns)
fn complete_days(hourly: &Frame) -> BTreeMap<NaiveDate, Vec<Vec<f64>>> {
    let mut days: BTreeMap<NaiveDate, Vec<(NaiveTime, Vec<f64>)>> = BTreeMap::new();
    for (ts, row) in hourly.index().iter().zip(hourly.values().rows()) {
        days.entry(ts.date())
            .or_default()
            .push((ts.time(), row.to_vec()));
    }

    days.into_iter()
        .filter_map(|(date, mut hours)| {
            if hours.len() != HOURS_PER_DAY {
                warn!(%date, hours = hours.len(), "skipping day without exactly 24 hourly rows");
                return None;
            }
            hours.sort_by_key(|(time, _)| *time);
            Some((date, hours.into_iter().map(|(_, v)| v).collect()))
        })
        .collect()
}

pub fn feature_columns(exogenous: &[String]) -> Vec<String> {
    let mut columns: Vec<String> = iproduct!(PRICE_LAGS, 0..HOURS_PER_DAY)
        .map(|(lag, h)| format!("{PRICE_COLUMN} d-{lag}.{h}"))
        .collect();
    for (name, lag, h) in iproduct!(exogenous, EXOGENOUS_LAGS, 0..HOURS_PER_DAY) {
        let day = if lag == 0 { "d".to_string() } else { format!("d-{lag}") };
        columns.push(format!("{name} {day}.{h}"));
    }
    columns.push(DAY_OF_WEEK_COLUMN.to_string());
    columns
}

pub fn target_columns() -> Vec<String> {
    (0..HOURS_PER_DAY)
        .map(|h| format!("{TARGET_PREFIX}{h}"))
        .collect()
}

/// Build `(features, targets)` from an hourly `Price` + exogenous table
///
/// Days lacking any of the required history are not sampled.
pub fn daily_samples(hourly: &Frame) -> Result<(Frame, Frame)> {
    let price_col = hourly
        .column_position(PRICE_COLUMN)
        .with_context(|| format!("hourly table has no '{PRICE_COLUMN}' column"))?;
    let exogenous: Vec<(usize, String)> = hourly
        .columns()
        .iter()
        .enumerate()
        .filter(|(c, _)| *c != price_col)
        .map(|(c, name)| (c, name.clone()))
        .collect();
    let exogenous_names: Vec<String> = exogenous.iter().map(|(_, n)| n.clone()).collect();

    let days = complete_days(hourly);
    let mut index = Vec::new();
    let mut features = Vec::new();
    let mut targets = Vec::new();

    for (date, today) in &days {
        let lagged = |lag: i64| days.get(&(*date - Duration::days(lag)));
        let Some(price_history) = PRICE_LAGS.iter().map(|&lag| lagged(lag)).collect::<Option<Vec<_>>>()
        else {
            continue;
        };
        let Some(yesterday) = lagged(1) else {
            continue;
        };

        let mut row = Vec::with_capacity(PRICE_LAGS.len() * HOURS_PER_DAY + 1);
        for day in price_history {
            row.extend(day.iter().map(|hour| hour[price_col]));
        }
        for (c, _) in &exogenous {
            for day in [today, yesterday] {
                row.extend(day.iter().map(|hour| hour[*c]));
            }
        }
        row.push(f64::from(date.weekday().num_days_from_monday()));

        index.push(date.and_time(NaiveTime::MIN));
        features.push(row);
        targets.push(today.iter().map(|hour| hour[price_col]).collect());
    }

    let x = Frame::from_rows(index.clone(), feature_columns(&exogenous_names), &features)?;
    let y = Frame::from_rows(index, target_columns(), &targets)?;
    Ok((x, y))
}

/// Split samples at `test_start` (first test day goes to the test side)
pub fn split_samples(frame: &Frame, test_start: NaiveDate) -> Result<(Frame, Frame)> {
    let start = test_start.and_time(NaiveTime::MIN);
    let train: Vec<bool> = frame.index().iter().map(|ts| *ts < start).collect();
    let test: Vec<bool> = train.iter().map(|t| !t).collect();
    Ok((frame.filter_rows(&train)?, frame.filter_rows(&test)?))
}

/// Row counts written by [`build_store`]
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSummary {
    pub train_samples: usize,
    pub test_samples: usize,
    pub features: usize,
    pub forecast_rows: usize,
}

/// Convert the acquisition CSVs into the keyed feature store
pub fn build_store(acquisition: &AcquisitionConfig, store: &StoreConfig) -> Result<StoreSummary> {
    let files = AcquiredFiles::in_dir(&acquisition.output_dir, &acquisition.market);
    let train = hourly::read_table_file(&files.train)?;
    let test = hourly::read_table_file(&files.test)?;
    let forecasts = hourly::read_table_file(&files.forecasts)?;

    let test_start = test
        .index()
        .first()
        .map(|ts| ts.date())
        .context("test CSV has no rows")?;

    // test samples draw their lagged history from the end of the train period
    let combined = train.vstack(&test)?;
    let (x, y) = daily_samples(&combined)?;
    let (xtrain, xtest) = split_samples(&x, test_start)?;
    let (ytrain, ytest) = split_samples(&y, test_start)?;

    let store = FeatureStore::create(&store.path)?;
    store.write(TableKey::Xtrain, &xtrain)?;
    store.write(TableKey::Ytrain, &ytrain)?;
    store.write(TableKey::Xtest, &xtest)?;
    store.write(TableKey::Ytest, &ytest)?;
    store.write(TableKey::Forecasts, &forecasts)?;

    let summary = StoreSummary {
        train_samples: xtrain.height(),
        test_samples: xtest.height(),
        features: x.width(),
        forecast_rows: forecasts.height(),
    };
    info!(?summary, root = %store.root().display(), "feature store built");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2016, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    /// Price = 100 * day + hour, exogenous = -price
    fn hourly_days(days: usize) -> Frame {
        let index = (0..days * 24)
            .map(|h| start() + Duration::hours(h as i64))
            .collect();
        let rows: Vec<Vec<f64>> = (0..days * 24)
            .map(|h| {
                let price = (100 * (h / 24) + h % 24) as f64;
                vec![price, -price]
            })
            .collect();
        Frame::from_rows(index, vec![PRICE_COLUMN.into(), "Exogenous 1".into()], &rows).unwrap()
    }

    #[test]
    fn test_feature_layout() {
        let columns = feature_columns(&["Exogenous 1".to_string()]);
        assert_eq!(columns.len(), 4 * 24 + 2 * 24 + 1);
        assert_eq!(columns[0], "Price d-1.0");
        assert_eq!(columns[4 * 24], "Exogenous 1 d.0");
        assert_eq!(columns[5 * 24], "Exogenous 1 d-1.0");
        assert_eq!(columns.last().unwrap(), DAY_OF_WEEK_COLUMN);
    }

    #[test]
    fn test_daily_samples_need_a_week_of_history() {
        let (x, y) = daily_samples(&hourly_days(10)).unwrap();
        // days 7, 8, 9 have a d-7 day
        assert_eq!(x.height(), 3);
        assert_eq!(y.columns()[23], "PriceNextDay.23");

        // first sample is day 7
        assert_eq!(y.values()[[0, 5]], 705.0);
        assert_eq!(x.values()[[0, 0]], 600.0); // d-1 hour 0
        assert_eq!(x.values()[[0, 3 * 24 + 1]], 1.0); // d-7 hour 1
        assert_eq!(x.values()[[0, 4 * 24 + 2]], -702.0); // exogenous day d
        assert_eq!(x.values()[[0, 5 * 24]], -600.0); // exogenous d-1
        // 2016-01-08 is a Friday
        assert_eq!(x.values()[[0, x.width() - 1]], 4.0);
    }

    #[test]
    fn test_incomplete_day_is_skipped() {
        let full = hourly_days(9);
        // drop one hour of day 8
        let mask: Vec<bool> = (0..full.height()).map(|i| i != 8 * 24 + 3).collect();
        let (x, _) = daily_samples(&full.filter_rows(&mask).unwrap()).unwrap();
        assert_eq!(x.height(), 1);
        assert_eq!(x.index()[0].date(), NaiveDate::from_ymd_opt(2016, 1, 8).unwrap());
    }

    #[test]
    fn test_split_samples() {
        let (x, _) = daily_samples(&hourly_days(10)).unwrap();
        let (train, test) = split_samples(&x, NaiveDate::from_ymd_opt(2016, 1, 9).unwrap()).unwrap();
        assert_eq!(train.height(), 1);
        assert_eq!(test.height(), 2);
    }
}
