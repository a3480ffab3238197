//! Timestamp-indexed numeric tables
//!
//! Feature, target and reference-forecast tables all share this shape: a row
//! index of timestamps, named columns and a dense row-major `f64` matrix.

use chrono::NaiveDateTime;
use ndarray::{Array2, ArrayView1, Axis};
use thiserror::Error;

/// Errors raised while building or combining frames
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FrameError {
    #[error("Shape mismatch: index has {index} rows, values have {rows} rows")]
    RowMismatch { index: usize, rows: usize },

    #[error("Shape mismatch: {names} column names for {cols} value columns")]
    ColumnMismatch { names: usize, cols: usize },

    #[error("Row mask length {mask} does not match frame height {height}")]
    MaskMismatch { mask: usize, height: usize },

    #[error("Column not found: {0}")]
    MissingColumn(String),

    #[error("Frames are not row-aligned: {left} vs {right} rows")]
    NotAligned { left: usize, right: usize },

    #[error("Cannot stack frames with different columns: {left:?} vs {right:?}")]
    SchemaMismatch { left: Vec<String>, right: Vec<String> },
}

/// A row-indexed table of numeric columns
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    index: Vec<NaiveDateTime>,
    columns: Vec<String>,
    values: Array2<f64>,
}

impl Frame {
    pub fn new(
        index: Vec<NaiveDateTime>,
        columns: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, FrameError> {
        if index.len() != values.nrows() {
            return Err(FrameError::RowMismatch {
                index: index.len(),
                rows: values.nrows(),
            });
        }
        if columns.len() != values.ncols() {
            return Err(FrameError::ColumnMismatch {
                names: columns.len(),
                cols: values.ncols(),
            });
        }
        Ok(Self {
            index,
            columns,
            values,
        })
    }

    /// Build a frame from row vectors
    pub fn from_rows(
        index: Vec<NaiveDateTime>,
        columns: Vec<String>,
        rows: &[Vec<f64>],
    ) -> Result<Self, FrameError> {
        let width = columns.len();
        let mut flat = Vec::with_capacity(rows.len() * width);
        for row in rows {
            if row.len() != width {
                return Err(FrameError::ColumnMismatch {
                    names: width,
                    cols: row.len(),
                });
            }
            flat.extend_from_slice(row);
        }
        let values = Array2::from_shape_vec((rows.len(), width), flat).map_err(|_| {
            FrameError::RowMismatch {
                index: index.len(),
                rows: rows.len(),
            }
        })?;
        Self::new(index, columns, values)
    }

    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>, FrameError> {
        let pos = self
            .column_position(name)
            .ok_or_else(|| FrameError::MissingColumn(name.to_string()))?;
        Ok(self.values.column(pos))
    }

    /// Same index and column names, new values
    pub fn with_values(&self, values: Array2<f64>) -> Result<Self, FrameError> {
        Self::new(self.index.clone(), self.columns.clone(), values)
    }

    /// Keep the rows where `mask` is true
    pub fn filter_rows(&self, mask: &[bool]) -> Result<Self, FrameError> {
        if mask.len() != self.height() {
            return Err(FrameError::MaskMismatch {
                mask: mask.len(),
                height: self.height(),
            });
        }
        let keep: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect();
        Ok(Self {
            index: keep.iter().map(|&i| self.index[i]).collect(),
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), &keep),
        })
    }

    /// Rows of `self` followed by the rows of `other`
    pub fn vstack(&self, other: &Frame) -> Result<Self, FrameError> {
        if self.columns != other.columns {
            return Err(FrameError::SchemaMismatch {
                left: self.columns.clone(),
                right: other.columns.clone(),
            });
        }
        let values = ndarray::concatenate(Axis(0), &[self.values.view(), other.values.view()])
            .map_err(|_| FrameError::ColumnMismatch {
                names: self.width(),
                cols: other.width(),
            })?;
        let mut index = self.index.clone();
        index.extend_from_slice(&other.index);
        Self::new(index, self.columns.clone(), values)
    }

    /// Check that another frame has the same row count (row-aligned tables)
    pub fn ensure_aligned(&self, other: &Frame) -> Result<(), FrameError> {
        if self.height() != other.height() {
            return Err(FrameError::NotAligned {
                left: self.height(),
                right: other.height(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::array;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2016, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_frame_shape_checks() {
        let values = array![[1.0, 2.0], [3.0, 4.0]];
        let err = Frame::new(vec![ts(1)], vec!["a".into(), "b".into()], values.clone());
        assert_eq!(err.unwrap_err(), FrameError::RowMismatch { index: 1, rows: 2 });

        let err = Frame::new(vec![ts(1), ts(2)], vec!["a".into()], values);
        assert!(matches!(err, Err(FrameError::ColumnMismatch { .. })));
    }

    #[test]
    fn test_filter_rows() {
        let frame = Frame::from_rows(
            vec![ts(1), ts(2), ts(3)],
            vec!["a".into(), "b".into()],
            &[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]],
        )
        .unwrap();

        let filtered = frame.filter_rows(&[true, false, true]).unwrap();
        assert_eq!(filtered.height(), 2);
        assert_eq!(filtered.index(), &[ts(1), ts(3)]);
        assert_eq!(filtered.values(), &array![[1.0, 2.0], [5.0, 6.0]]);

        assert!(frame.filter_rows(&[true]).is_err());
    }

    #[test]
    fn test_column_lookup() {
        let frame = Frame::from_rows(
            vec![ts(1), ts(2)],
            vec!["price".into(), "load".into()],
            &[vec![10.0, 1.0], vec![20.0, 2.0]],
        )
        .unwrap();

        assert_eq!(frame.column("load").unwrap().to_vec(), vec![1.0, 2.0]);
        assert_eq!(
            frame.column("wind").unwrap_err(),
            FrameError::MissingColumn("wind".into())
        );
    }

    #[test]
    fn test_vstack() {
        let a = Frame::from_rows(vec![ts(1)], vec!["p".into()], &[vec![1.0]]).unwrap();
        let b = Frame::from_rows(vec![ts(2)], vec!["p".into()], &[vec![2.0]]).unwrap();
        let stacked = a.vstack(&b).unwrap();
        assert_eq!(stacked.index(), &[ts(1), ts(2)]);
        assert_eq!(stacked.values(), &array![[1.0], [2.0]]);

        let c = Frame::from_rows(vec![ts(3)], vec!["q".into()], &[vec![3.0]]).unwrap();
        assert!(matches!(a.vstack(&c), Err(FrameError::SchemaMismatch { .. })));
    }
}
