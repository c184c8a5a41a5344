use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type, TimeUnit};
use chrono::{DateTime, NaiveDateTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{CellValue, ProcessTable};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a process table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, one column per tag (the usual historian export)
/// * `.json`    – `[{ "timestamp": ..., "TT_101": ..., ... }, ...]`
/// * `.parquet` – flat columns of numbers, strings or timestamps
pub fn load_file(path: &Path) -> Result<ProcessTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "csv" => load_csv(path),
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    log::info!(
        "Loaded {} rows x {} columns from {}",
        table.len(),
        table.column_names.len(),
        path.display()
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one value per cell.
/// Cell types are inferred per cell; empty cells are `Null`.
fn load_csv(path: &Path) -> Result<ProcessTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut columns: Vec<Vec<CellValue>> = vec![Vec::new(); headers.len()];

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        for (col_idx, cells) in columns.iter_mut().enumerate() {
            cells.push(CellValue::guess(record.get(col_idx).unwrap_or("")));
        }
    }

    Ok(ProcessTable::from_columns(
        headers.into_iter().zip(columns).collect(),
    ))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "timestamp": "2024-01-01 00:00:00", "TT_101": 350.2, "SP_TT_101": 350.0 },
///   ...
/// ]
/// ```
///
/// Column order follows first appearance; keys missing from a record are `Null`.
fn load_json(path: &Path) -> Result<ProcessTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut names: Vec<String> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        for key in obj.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }

    let columns = names
        .into_iter()
        .map(|name| {
            let cells = records
                .iter()
                .map(|rec| rec.get(&name).map(json_to_cell).unwrap_or(CellValue::Null))
                .collect();
            (name, cells)
        })
        .collect();

    Ok(ProcessTable::from_columns(columns))
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::Text(n.to_string())
            }
        }
        JsonValue::String(s) => CellValue::guess(s),
        JsonValue::Null => CellValue::Null,
        other => CellValue::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one flat column per tag.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`); record batches are concatenated.
fn load_parquet(path: &Path) -> Result<ProcessTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let names: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut columns: Vec<Vec<CellValue>> = vec![Vec::new(); names.len()];

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for (col_idx, cells) in columns.iter_mut().enumerate() {
            let col = batch.column(col_idx);
            let values = extract_cells(col)
                .with_context(|| format!("column '{}'", names[col_idx]))?;
            cells.extend(values);
        }
    }

    Ok(ProcessTable::from_columns(names.into_iter().zip(columns).collect()))
}

// -- Parquet / Arrow helpers --

/// Convert a flat Arrow column into cells.
fn extract_cells(col: &ArrayRef) -> Result<Vec<CellValue>> {
    let n = col.len();
    match col.data_type() {
        DataType::Utf8 => {
            let s = col.as_string::<i32>();
            Ok((0..n)
                .map(|i| if s.is_null(i) { CellValue::Null } else { CellValue::guess(s.value(i)) })
                .collect())
        }
        DataType::LargeUtf8 => {
            let s = col.as_string::<i64>();
            Ok((0..n)
                .map(|i| if s.is_null(i) { CellValue::Null } else { CellValue::guess(s.value(i)) })
                .collect())
        }
        DataType::Timestamp(unit, _) => {
            let unit = *unit;
            let ints = cast(col, &DataType::Int64).context("casting timestamp column")?;
            let ints = ints.as_primitive::<Int64Type>();
            Ok((0..n)
                .map(|i| {
                    if ints.is_null(i) {
                        return CellValue::Null;
                    }
                    timestamp_to_datetime(ints.value(i), unit)
                        .map(CellValue::DateTime)
                        .unwrap_or(CellValue::Null)
                })
                .collect())
        }
        dt if dt.is_integer() => {
            let ints = cast(col, &DataType::Int64).context("casting integer column")?;
            let ints = ints.as_primitive::<Int64Type>();
            Ok((0..n)
                .map(|i| if ints.is_null(i) { CellValue::Null } else { CellValue::Integer(ints.value(i)) })
                .collect())
        }
        dt if dt.is_floating() || matches!(dt, DataType::Decimal128(..) | DataType::Boolean) => {
            let floats = cast(col, &DataType::Float64).context("casting numeric column")?;
            let floats = floats.as_primitive::<Float64Type>();
            Ok((0..n)
                .map(|i| if floats.is_null(i) { CellValue::Null } else { CellValue::Float(floats.value(i)) })
                .collect())
        }
        other => bail!("Unsupported column type {other:?}"),
    }
}

fn timestamp_to_datetime(value: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let dt = match unit {
        TimeUnit::Second => DateTime::from_timestamp(value, 0),
        TimeUnit::Millisecond => DateTime::from_timestamp_millis(value),
        TimeUnit::Microsecond => DateTime::from_timestamp_micros(value),
        TimeUnit::Nanosecond => Some(DateTime::from_timestamp_nanos(value)),
    };
    dt.map(|d| d.naive_utc())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int32Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    use super::*;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn csv_columns_in_header_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "data.csv",
            "timestamp,TT_101,SP_TT_101\n2024-01-01 00:00:00,10,10\n2024-01-01 00:00:01,12.5,\n",
        );
        let table = load_file(&path).unwrap();
        assert_eq!(table.column_names, vec!["timestamp", "TT_101", "SP_TT_101"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.numeric_column("TT_101").unwrap(), vec![10.0, 12.5]);
        assert!(table.numeric_column("SP_TT_101").unwrap()[1].is_nan());
    }

    #[test]
    fn csv_missing_value_markers_are_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "data.csv", "timestamp,TT_101,SP_TT_101\n1,12,NA\n2,11,N/A\n3,10,10\n");
        let table = load_file(&path).unwrap();
        let sp = table.numeric_column("SP_TT_101").unwrap();
        assert!(sp[0].is_nan() && sp[1].is_nan());
        assert_eq!(sp[2], 10.0);
    }

    #[test]
    fn csv_duplicate_header_keeps_first_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "data.csv", "timestamp,TT_101,TT_101\n0,1,100\n");
        let table = load_file(&path).unwrap();
        assert_eq!(table.column_names, vec!["timestamp", "TT_101", "TT_101.1"]);
        assert_eq!(table.numeric_column("TT_101").unwrap(), vec![1.0]);
        assert_eq!(table.numeric_column("TT_101.1").unwrap(), vec![100.0]);
    }

    #[test]
    fn csv_ragged_row_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "bad.csv", "a,b\n1,2\n3\n");
        assert!(load_file(&path).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_file(&dir.path().join("cascaded_cstr.csv")).unwrap_err();
        assert!(format!("{err:#}").contains("opening CSV"));
    }

    #[test]
    fn unsupported_extension() {
        let err = load_file(Path::new("data.xlsx")).unwrap_err();
        assert!(err.to_string().contains(".xlsx"));
    }

    #[test]
    fn json_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "data.json",
            r#"[{"timestamp": 0, "LT_101": 1.5}, {"timestamp": 1, "LT_101": 2, "SP_LT_101": 2.0}]"#,
        );
        let table = load_file(&path).unwrap();
        assert_eq!(table.column_names, vec!["timestamp", "LT_101", "SP_LT_101"]);
        assert_eq!(table.numeric_column("LT_101").unwrap(), vec![1.5, 2.0]);
        assert!(table.numeric_column("SP_LT_101").unwrap()[0].is_nan());
    }

    #[test]
    fn json_columns_keep_record_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "data.json",
            r#"[{"timestamp": 0, "TT_102": 1, "SP_TT_102": 1, "LT_101": 2, "SP_LT_101": 2}]"#,
        );
        let table = load_file(&path).unwrap();
        assert_eq!(
            table.column_names,
            vec!["timestamp", "TT_102", "SP_TT_102", "LT_101", "SP_LT_101"]
        );
        let loops = crate::data::discover::discover_loops(&table.column_names);
        let pvs: Vec<&str> = loops.iter().map(|l| l.pv_column.as_str()).collect();
        assert_eq!(pvs, vec!["TT_102", "LT_101"]);
    }

    #[test]
    fn json_must_be_an_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "data.json", r#"{"timestamp": 0}"#);
        assert!(load_file(&path).is_err());
    }

    #[test]
    fn parquet_flat_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.parquet");

        let schema = Arc::new(Schema::new(vec![
            Field::new("timestamp", DataType::Utf8, false),
            Field::new("TT_101", DataType::Float64, true),
            Field::new("SP_TT_101", DataType::Int32, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["2024-01-01 00:00:00", "2024-01-01 00:00:05"])),
                Arc::new(Float64Array::from(vec![Some(351.0), None])),
                Arc::new(Int32Array::from(vec![350, 350])),
            ],
        )
        .unwrap();
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_file(&path).unwrap();
        assert_eq!(table.len(), 2);
        let tt = table.numeric_column("TT_101").unwrap();
        assert_eq!(tt[0], 351.0);
        assert!(tt[1].is_nan());
        assert_eq!(table.numeric_column("SP_TT_101").unwrap(), vec![350.0, 350.0]);
        let axis = table.time_axis("timestamp").unwrap();
        assert_eq!(axis.values[1] - axis.values[0], 5.0);
    }
}
