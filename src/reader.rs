//! Loading power readings out of CSV and spreadsheet exports.
//!
//! Both layouts carry one line of metadata before the header row, which is
//! skipped. Only the timestamp and power columns are read; everything else
//! in the file is ignored.

use std::{
    io::Cursor,
    path::{Path, PathBuf},
    str::FromStr,
};

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use miette::Diagnostic;
use thiserror::Error;
use tracing::debug;

use crate::{
    timestamp::{from_excel_serial, parse_timestamp, TimestampError},
    Reading,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Spreadsheet,
}

impl Format {
    /// Guess the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, ReadError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        extension
            .parse()
            .map_err(|_| ReadError::UnsupportedFormat(path.to_path_buf()))
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "xlsm" | "xls" => Ok(Self::Spreadsheet),
            s => Err(format!(
                "Unknown file format {s}. Expecting `csv`, `xlsx` or `xls`"
            )),
        }
    }
}

/// How the input table is laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Field separator, CSV only.
    pub delimiter: u8,
    /// Lines (or sheet rows) before the header row.
    pub skip_rows: usize,
    /// Decimal separator used by text power values.
    pub decimal: char,
    pub timestamp_column: String,
    pub power_column: String,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            delimiter: b';',
            skip_rows: 1,
            decimal: '.',
            timestamp_column: String::from("Timestamp"),
            power_column: String::from("Power Avg [kW]"),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ReadError {
    #[error("Could not read {}: {source}", path.display())]
    #[diagnostic(code(power_avg::read::io))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Unsupported file {}", .0.display())]
    #[diagnostic(
        code(power_avg::read::format),
        help("upload a `.csv`, `.xlsx` or `.xls` file, or pass `--format`")
    )]
    UnsupportedFormat(PathBuf),
    #[error("Bad CSV: {0}")]
    #[diagnostic(code(power_avg::read::csv))]
    Csv(#[from] csv::Error),
    #[error("Bad spreadsheet: {0}")]
    #[diagnostic(code(power_avg::read::workbook))]
    Workbook(#[from] calamine::Error),
    #[error("The spreadsheet has no worksheet")]
    #[diagnostic(code(power_avg::read::worksheet))]
    NoWorksheet,
    #[error("Missing column `{0}`")]
    #[diagnostic(
        code(power_avg::read::column),
        help("the header row comes right after the skipped metadata lines")
    )]
    MissingColumn(String),
    #[error("Bad timestamp on row {row}: {source}")]
    #[diagnostic(code(power_avg::read::timestamp))]
    BadTimestamp {
        row: usize,
        #[source]
        source: TimestampError,
    },
    #[error("Bad power value on row {row}: `{value}`")]
    #[diagnostic(code(power_avg::read::power))]
    BadPower { row: usize, value: String },
}

/// Read the file at `path`. Without an explicit format it is guessed from
/// the extension.
pub fn load(
    path: &Path,
    format: Option<Format>,
    options: &ReaderOptions,
) -> Result<Vec<Reading>, ReadError> {
    let format = match format {
        Some(format) => format,
        None => Format::from_path(path)?,
    };
    let bytes = std::fs::read(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), ?format, bytes = bytes.len(), "loading readings");

    read_readings(&bytes, format, options)
}

pub fn read_readings(
    bytes: &[u8],
    format: Format,
    options: &ReaderOptions,
) -> Result<Vec<Reading>, ReadError> {
    let readings = match format {
        Format::Csv => read_csv(bytes, options)?,
        Format::Spreadsheet => read_spreadsheet(bytes, options)?,
    };
    debug!(rows = readings.len(), "parsed readings");
    Ok(readings)
}

pub fn read_csv(bytes: &[u8], options: &ReaderOptions) -> Result<Vec<Reading>, ReadError> {
    let body = skip_lines(bytes, options.skip_rows);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body);

    let headers = reader.headers()?.clone();
    let timestamp_idx = column_index(headers.iter(), &options.timestamp_column)?;
    let power_idx = column_index(headers.iter(), &options.power_column)?;

    let mut readings = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let row = record
            .position()
            .map_or(0, |position| position.line() as usize + options.skip_rows);

        let timestamp = parse_timestamp(record.get(timestamp_idx).unwrap_or_default())
            .map_err(|source| ReadError::BadTimestamp { row, source })?;
        let power_avg_kw = parse_power(record.get(power_idx).unwrap_or_default(), options.decimal)
            .ok_or_else(|| ReadError::BadPower {
                row,
                value: record.get(power_idx).unwrap_or_default().to_string(),
            })?;

        readings.push(Reading {
            timestamp,
            power_avg_kw,
        });
    }

    Ok(readings)
}

pub fn read_spreadsheet(bytes: &[u8], options: &ReaderOptions) -> Result<Vec<Reading>, ReadError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ReadError::NoWorksheet)??;

    // The range starts at the first non-empty cell, not at A1, so leading
    // empty rows already count as skipped.
    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    let mut rows = range
        .rows()
        .enumerate()
        .skip(options.skip_rows.saturating_sub(first_row));

    let (_, header) = rows
        .next()
        .ok_or_else(|| ReadError::MissingColumn(options.timestamp_column.clone()))?;
    let header: Vec<String> = header.iter().map(|cell| cell.to_string()).collect();
    let timestamp_idx = column_index(header.iter().map(String::as_str), &options.timestamp_column)?;
    let power_idx = column_index(header.iter().map(String::as_str), &options.power_column)?;

    let mut readings = Vec::new();
    for (idx, cells) in rows {
        if cells.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }
        let row = first_row + idx + 1;
        let timestamp = cell_timestamp(cells.get(timestamp_idx).unwrap_or(&Data::Empty))
            .map_err(|source| ReadError::BadTimestamp { row, source })?;
        let power = cells.get(power_idx).unwrap_or(&Data::Empty);
        let power_avg_kw = cell_power(power, options.decimal).ok_or_else(|| ReadError::BadPower {
            row,
            value: power.to_string(),
        })?;

        readings.push(Reading {
            timestamp,
            power_avg_kw,
        });
    }

    Ok(readings)
}

fn skip_lines(bytes: &[u8], count: usize) -> &[u8] {
    let mut rest = bytes;
    for _ in 0..count {
        match rest.iter().position(|&b| b == b'\n') {
            Some(end) => rest = &rest[end + 1..],
            None => return &[],
        }
    }
    rest
}

fn column_index<'a>(
    mut headers: impl Iterator<Item = &'a str>,
    name: &str,
) -> Result<usize, ReadError> {
    headers
        .position(|header| header.trim_start_matches('\u{feff}').trim() == name)
        .ok_or_else(|| ReadError::MissingColumn(name.to_string()))
}

/// `Some(None)` is an empty cell, `None` is something that is not a finite
/// number.
fn parse_power(raw: &str, decimal: char) -> Option<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(None);
    }
    let value: f64 = if decimal == '.' {
        raw.parse().ok()?
    } else {
        raw.replace(decimal, ".").parse().ok()?
    };
    finite_power(value)
}

fn finite_power(value: f64) -> Option<Option<f64>> {
    if value.is_nan() {
        Some(None)
    } else if value.is_infinite() {
        None
    } else {
        Some(Some(value))
    }
}

fn cell_timestamp(cell: &Data) -> Result<time::PrimitiveDateTime, TimestampError> {
    match cell {
        Data::DateTime(datetime) => from_excel_serial(datetime.as_f64()),
        Data::DateTimeIso(s) | Data::String(s) => parse_timestamp(s),
        Data::Empty => Err(TimestampError::Empty),
        other => Err(TimestampError::Unexpected(other.to_string())),
    }
}

fn cell_power(cell: &Data, decimal: char) -> Option<Option<f64>> {
    match cell {
        Data::Float(value) => finite_power(*value),
        Data::Int(value) => Some(Some(*value as f64)),
        Data::String(s) => parse_power(s, decimal),
        Data::Empty => Some(None),
        _ => None,
    }
}
