//! Wide/long reshaping of hourly target families
//!
//! In wide layout a family such as `PriceNextDay.` spans one column per hour
//! (`PriceNextDay.0` .. `PriceNextDay.23`). In long layout every wide row
//! becomes one row per hour: features are repeated, the hour is appended as a
//! feature column and each family collapses into a single target column.

use chrono::NaiveDateTime;
use ndarray::Array2;
use thiserror::Error;

use crate::domain::{Frame, FrameError};

/// Name of the feature column holding the hour in long layout
pub const HOUR_COLUMN: &str = "hour";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReshapeError {
    #[error("No columns found for target family '{0}'")]
    EmptyFamily(String),

    #[error("Target column '{0}' does not belong to any declared family")]
    UnclaimedColumn(String),

    #[error("Target family '{family}' has hours {found:?}, expected {expected:?}")]
    InconsistentHours {
        family: String,
        found: Vec<usize>,
        expected: Vec<usize>,
    },

    #[error("Long table has {rows} rows, not a multiple of {hours} hours")]
    RaggedLongTable { rows: usize, hours: usize },

    #[error("Long row {row} carries hour {found}, expected {expected}")]
    HourOutOfOrder {
        row: usize,
        found: f64,
        expected: usize,
    },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Column layout of the hourly target families, learned from a wide table
#[derive(Debug, Clone, PartialEq)]
pub struct Reshaper {
    /// Long target column name per family
    families: Vec<String>,
    /// Sorted hours shared by all families
    hours: Vec<usize>,
    /// Wide column names in their original order
    wide_columns: Vec<String>,
    /// For each wide column: (family position, hour position)
    slots: Vec<(usize, usize)>,
}

impl Reshaper {
    /// Learn the family layout of `targets` for the declared prefixes
    pub fn from_targets(targets: &Frame, prefixes: &[String]) -> Result<Self, ReshapeError> {
        let mut per_family: Vec<Vec<(usize, String)>> = vec![Vec::new(); prefixes.len()];

        for name in targets.columns() {
            let claimed = prefixes.iter().enumerate().find_map(|(f, prefix)| {
                name.strip_prefix(prefix.as_str())
                    .and_then(|suffix| suffix.parse::<usize>().ok())
                    .map(|hour| (f, hour))
            });
            match claimed {
                Some((f, hour)) => per_family[f].push((hour, name.clone())),
                None => return Err(ReshapeError::UnclaimedColumn(name.clone())),
            }
        }

        let mut hours: Option<Vec<usize>> = None;
        for (prefix, members) in prefixes.iter().zip(per_family.iter()) {
            if members.is_empty() {
                return Err(ReshapeError::EmptyFamily(prefix.clone()));
            }
            let mut found: Vec<usize> = members.iter().map(|(h, _)| *h).collect();
            found.sort_unstable();
            match &hours {
                None => hours = Some(found),
                Some(expected) if *expected != found => {
                    return Err(ReshapeError::InconsistentHours {
                        family: prefix.clone(),
                        found,
                        expected: expected.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        let hours = hours.ok_or_else(|| ReshapeError::EmptyFamily(String::new()))?;

        let slots = targets
            .columns()
            .iter()
            .map(|name| {
                let (f, hour) = per_family
                    .iter()
                    .enumerate()
                    .find_map(|(f, members)| {
                        members.iter().find(|(_, n)| n == name).map(|(h, _)| (f, *h))
                    })
                    .ok_or_else(|| ReshapeError::UnclaimedColumn(name.clone()))?;
                let hour_pos = hours
                    .binary_search(&hour)
                    .map_err(|_| ReshapeError::UnclaimedColumn(name.clone()))?;
                Ok((f, hour_pos))
            })
            .collect::<Result<Vec<_>, ReshapeError>>()?;

        Ok(Self {
            families: prefixes.iter().map(|p| family_name(p)).collect(),
            hours,
            wide_columns: targets.columns().to_vec(),
            slots,
        })
    }

    pub fn hours(&self) -> &[usize] {
        &self.hours
    }

    /// Unpivot a wide feature/target pair into long layout
    pub fn to_long(&self, features: &Frame, targets: &Frame) -> Result<(Frame, Frame), ReshapeError> {
        features.ensure_aligned(targets)?;
        if targets.columns() != self.wide_columns.as_slice() {
            let stray = targets
                .columns()
                .iter()
                .find(|c| !self.wide_columns.contains(c))
                .cloned()
                .unwrap_or_default();
            return Err(ReshapeError::UnclaimedColumn(stray));
        }

        let n_hours = self.hours.len();
        let rows = features.height() * n_hours;
        let x_width = features.width() + 1;
        let y_width = self.families.len();

        let mut index = Vec::with_capacity(rows);
        let mut x = Array2::<f64>::zeros((rows, x_width));
        let mut y = Array2::<f64>::zeros((rows, y_width));

        for (i, ts) in features.index().iter().enumerate() {
            for (k, hour) in self.hours.iter().enumerate() {
                let r = i * n_hours + k;
                index.push(*ts);
                x.row_mut(r)
                    .slice_mut(ndarray::s![..features.width()])
                    .assign(&features.values().row(i));
                x[[r, x_width - 1]] = *hour as f64;
            }
            for (c, &(f, hour_pos)) in self.slots.iter().enumerate() {
                y[[i * n_hours + hour_pos, f]] = targets.values()[[i, c]];
            }
        }

        let mut x_columns = features.columns().to_vec();
        x_columns.push(HOUR_COLUMN.to_string());

        Ok((
            Frame::new(index.clone(), x_columns, x)?,
            Frame::new(index, self.families.clone(), y)?,
        ))
    }

    /// Pivot long-layout targets (or predictions) back to the wide columns
    pub fn targets_to_wide(&self, long: &Frame) -> Result<Frame, ReshapeError> {
        let n_hours = self.hours.len();
        let blocks = self.block_count(long.height())?;

        let mut values = Array2::<f64>::zeros((blocks, self.wide_columns.len()));
        for b in 0..blocks {
            for (c, &(f, hour_pos)) in self.slots.iter().enumerate() {
                values[[b, c]] = long.values()[[b * n_hours + hour_pos, f]];
            }
        }

        Ok(Frame::new(
            block_index(long.index(), n_hours),
            self.wide_columns.clone(),
            values,
        )?)
    }

    /// Collapse long-layout features back to one row per wide row
    pub fn features_to_wide(&self, long: &Frame) -> Result<Frame, ReshapeError> {
        let n_hours = self.hours.len();
        let blocks = self.block_count(long.height())?;
        let hour_col = long
            .column_position(HOUR_COLUMN)
            .ok_or_else(|| FrameError::MissingColumn(HOUR_COLUMN.to_string()))?;

        for b in 0..blocks {
            for (k, hour) in self.hours.iter().enumerate() {
                let row = b * n_hours + k;
                let found = long.values()[[row, hour_col]];
                if found != *hour as f64 {
                    return Err(ReshapeError::HourOutOfOrder {
                        row,
                        found,
                        expected: *hour,
                    });
                }
            }
        }

        let keep: Vec<usize> = (0..long.width()).filter(|&c| c != hour_col).collect();
        let mut values = Array2::<f64>::zeros((blocks, keep.len()));
        for b in 0..blocks {
            for (j, &c) in keep.iter().enumerate() {
                values[[b, j]] = long.values()[[b * n_hours, c]];
            }
        }
        let columns = keep.iter().map(|&c| long.columns()[c].clone()).collect();

        Ok(Frame::new(block_index(long.index(), n_hours), columns, values)?)
    }

    fn block_count(&self, rows: usize) -> Result<usize, ReshapeError> {
        let n_hours = self.hours.len();
        if n_hours == 0 || rows % n_hours != 0 {
            return Err(ReshapeError::RaggedLongTable {
                rows,
                hours: n_hours,
            });
        }
        Ok(rows / n_hours)
    }
}

fn block_index(index: &[NaiveDateTime], n_hours: usize) -> Vec<NaiveDateTime> {
    index.iter().step_by(n_hours).copied().collect()
}

/// `PriceNextDay.` -> `PriceNextDay`
fn family_name(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches(['.', '_', '-']);
    if trimmed.is_empty() {
        prefix.to_string()
    } else {
        trimmed.to_string()
    }
}
