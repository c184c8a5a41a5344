use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::ReportError;

// ---------------------------------------------------------------------------
// CellValue – a single cell of the process table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell, mirroring what a dataframe reader infers.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Integer(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
    Null,
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::DateTime(d) => write!(f, "{d}"),
            CellValue::Null => write!(f, "<null>"),
        }
    }
}

/// Text that a dataframe reader treats as a missing value by default.
const NA_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

impl CellValue {
    /// Infer the cell type from raw text (CSV fields, JSON strings).
    /// Empty cells and the usual missing-value markers are `Null`.
    pub fn guess(s: &str) -> CellValue {
        let s = s.trim();
        if s.is_empty() || NA_TOKENS.contains(&s) {
            return CellValue::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return CellValue::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return CellValue::Float(f);
        }
        CellValue::Text(s.to_string())
    }

    /// Numeric view of the cell. `Null` reads as NaN (missing value).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Null => Some(f64::NAN),
            CellValue::Text(s) => s.trim().parse::<f64>().ok(),
            CellValue::DateTime(_) => None,
        }
    }

    /// Date-time view of the cell, parsing text in the accepted formats.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::DateTime(d) => Some(*d),
            CellValue::Text(s) => parse_datetime(s),
            _ => None,
        }
    }
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a timestamp string: RFC 3339, ISO-like date-time, or a bare date.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// ---------------------------------------------------------------------------
// TimeAxis – the x values shared by every panel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeKind {
    /// Plain numbers (sample index, seconds, ...).
    Numeric,
    /// Date-times, stored as seconds since the Unix epoch.
    DateTime,
}

#[derive(Debug, Clone)]
pub struct TimeAxis {
    pub values: Vec<f64>,
    pub kind: TimeKind,
}

impl TimeAxis {
    /// Extent of the finite values, or `None` when there are none.
    pub fn finite_range(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

// ---------------------------------------------------------------------------
// ProcessTable – the complete loaded table
// ---------------------------------------------------------------------------

/// Column-oriented table. Every column holds exactly `n_rows` cells.
#[derive(Debug, Clone, Default)]
pub struct ProcessTable {
    /// Column names in header order.
    pub column_names: Vec<String>,
    columns: BTreeMap<String, Vec<CellValue>>,
    n_rows: usize,
}

impl ProcessTable {
    /// Build a table from header-ordered columns. Short columns are padded
    /// with `Null` so that every column has the same length.
    ///
    /// A repeated name keeps the first column under that name; later ones
    /// become `name.1`, `name.2`, ...
    pub fn from_columns(columns: Vec<(String, Vec<CellValue>)>) -> Self {
        let n_rows = columns.iter().map(|(_, c)| c.len()).max().unwrap_or(0);
        let mut column_names = Vec::with_capacity(columns.len());
        let mut map = BTreeMap::new();
        for (name, mut cells) in columns {
            cells.resize(n_rows, CellValue::Null);
            let name = if map.contains_key(&name) {
                let renamed = (1..)
                    .map(|k| format!("{name}.{k}"))
                    .find(|candidate| !map.contains_key(candidate))
                    .unwrap_or_default();
                log::warn!("duplicate column '{name}' renamed to '{renamed}'");
                renamed
            } else {
                name
            };
            column_names.push(name.clone());
            map.insert(name, cells);
        }
        ProcessTable {
            column_names,
            columns: map,
            n_rows,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.n_rows
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Raw cells of a column.
    pub fn cells(&self, name: &str) -> Result<&[CellValue], ReportError> {
        self.columns
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ReportError::MissingColumn {
                column: name.to_string(),
            })
    }

    /// A column as `f64` values; empty cells become NaN.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>, ReportError> {
        self.cells(name)?
            .iter()
            .enumerate()
            .map(|(row, cell)| {
                cell.as_f64().ok_or_else(|| ReportError::NonNumeric {
                    column: name.to_string(),
                    row,
                    value: cell.to_string(),
                })
            })
            .collect()
    }

    /// Interpret a column as the time axis.
    ///
    /// The column is numeric if every non-empty cell is a number, otherwise
    /// every non-empty cell must be a date-time.
    pub fn time_axis(&self, name: &str) -> Result<TimeAxis, ReportError> {
        let cells = self.cells(name)?;
        let numeric = cells
            .iter()
            .all(|c| matches!(c, CellValue::Integer(_) | CellValue::Float(_) | CellValue::Null));

        if numeric {
            let values = cells.iter().map(|c| c.as_f64().unwrap_or(f64::NAN)).collect();
            return Ok(TimeAxis {
                values,
                kind: TimeKind::Numeric,
            });
        }

        let values = cells
            .iter()
            .enumerate()
            .map(|(row, cell)| match cell {
                CellValue::Null => Ok(f64::NAN),
                other => other
                    .as_datetime()
                    .map(|dt| dt.and_utc().timestamp_millis() as f64 / 1000.0)
                    .ok_or_else(|| ReportError::BadTimestamp {
                        column: name.to_string(),
                        row,
                        value: other.to_string(),
                    }),
            })
            .collect::<Result<Vec<f64>, ReportError>>()?;

        Ok(TimeAxis {
            values,
            kind: TimeKind::DateTime,
        })
    }
}
