//! Hourly CSV tables
//!
//! Header row, first column the timestamp (`Date`), every other column a
//! float. Empty cells read as NaN and are written back empty.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use std::io::{Read, Write};
use std::path::Path;

use crate::domain::Frame;

pub const DATE_COLUMN: &str = "Date";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp cell, with or without seconds, or a bare date (midnight)
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .with_context(|| format!("invalid timestamp '{raw}'"))
}

fn parse_value(raw: &str) -> Result<f64> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>()
        .with_context(|| format!("invalid number '{raw}'"))
}

/// Read a table; `rename` maps the value column headers (not the timestamp)
pub fn read_table<R: Read>(
    reader: R,
    rename: impl Fn(usize, &str) -> String,
) -> Result<Frame> {
    let mut csv = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers = csv.headers().context("missing CSV header")?.clone();
    if headers.len() < 2 {
        anyhow::bail!("CSV needs a timestamp column and at least one value column");
    }
    let columns: Vec<String> = headers
        .iter()
        .skip(1)
        .enumerate()
        .map(|(i, name)| rename(i, name))
        .collect();

    let mut index = Vec::new();
    let mut rows = Vec::new();
    for (line, record) in csv.records().enumerate() {
        let record = record.with_context(|| format!("bad CSV record {}", line + 2))?;
        let mut fields = record.iter();
        let ts = fields
            .next()
            .map(parse_timestamp)
            .transpose()?
            .with_context(|| format!("empty CSV record {}", line + 2))?;
        let values = fields.map(parse_value).collect::<Result<Vec<f64>>>()?;
        index.push(ts);
        rows.push(values);
    }

    Ok(Frame::from_rows(index, columns, &rows)?)
}

pub fn read_table_file(path: &Path) -> Result<Frame> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_table(file, |_, name| name.to_string())
        .with_context(|| format!("failed to parse {}", path.display()))
}

pub fn write_table<W: Write>(writer: W, frame: &Frame) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(std::iter::once(DATE_COLUMN).chain(frame.columns().iter().map(String::as_str)))?;

    for (ts, row) in frame.index().iter().zip(frame.values().rows()) {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(ts.format(TIMESTAMP_FORMAT).to_string());
        record.extend(row.iter().map(|v| {
            if v.is_nan() {
                String::new()
            } else {
                v.to_string()
            }
        }));
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_table_file(path: &Path, frame: &Frame) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_table(file, frame).with_context(|| format!("failed to write {}", path.display()))
}
