//! Artifact files: Parquet (columnar) and CSV (delimited text).
//!
//! Both files of an artifact carry the same rows and columns:
//! `date, cpi_value, cpi_prev_year, inflation_rate`. Each file is written to a
//! temporary path in the target directory and renamed into place only once
//! complete; existing files are never overwritten.
use crate::error::{Error, Result};
use crate::models::{Artifact, EnrichedRow};
use arrow_array::cast::AsArray;
use arrow_array::types::{Date32Type, Float64Type};
use arrow_array::{Array, ArrayRef, Date32Array, Float64Array, RecordBatch};
use arrow_schema::{ArrowError, DataType, Field, Schema, SchemaRef};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use csv::WriterBuilder;
use log::info;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const COLUMNS: [&str; 4] = ["date", "cpi_value", "cpi_prev_year", "inflation_rate"];

// Days from 0001-01-01 (CE) to 1970-01-01; Date32 counts days since the Unix epoch.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// File name stem shared by both files: `inflation_data_<source>_<YYYYMMDD_HHMMSS>`.
pub fn artifact_stem(source: &str, generated_at: NaiveDateTime) -> String {
    format!(
        "inflation_data_{}_{}",
        source,
        generated_at.format("%Y%m%d_%H%M%S")
    )
}

/// Write both files of an artifact into `dir`, creating it if needed.
///
/// Either both files are published or neither is.
pub fn write_artifact(
    dir: &Path,
    source: &str,
    rows: &[EnrichedRow],
    generated_at: NaiveDateTime,
) -> Result<Artifact> {
    fs::create_dir_all(dir).map_err(|e| Error::persistence(dir, e))?;

    let (parquet_path, csv_path) = artifact_paths(dir, source, generated_at);

    let mut parquet_tmp = NamedTempFile::new_in(dir).map_err(|e| Error::persistence(dir, e))?;
    write_parquet(rows, parquet_tmp.as_file_mut(), source, generated_at)
        .map_err(|e| Error::persistence(&parquet_path, e))?;
    parquet_tmp
        .as_file()
        .sync_all()
        .map_err(|e| Error::persistence(&parquet_path, e))?;

    let mut csv_tmp = NamedTempFile::new_in(dir).map_err(|e| Error::persistence(dir, e))?;
    write_csv(rows, csv_tmp.as_file_mut()).map_err(|e| Error::persistence(&csv_path, e))?;
    csv_tmp
        .as_file()
        .sync_all()
        .map_err(|e| Error::persistence(&csv_path, e))?;

    parquet_tmp
        .persist_noclobber(&parquet_path)
        .map_err(|e| Error::persistence(&parquet_path, e.error))?;
    if let Err(e) = csv_tmp.persist_noclobber(&csv_path) {
        let _ = fs::remove_file(&parquet_path);
        return Err(Error::persistence(&csv_path, e.error));
    }

    info!(
        "wrote {} rows to {} and {}",
        rows.len(),
        parquet_path.display(),
        csv_path.display()
    );
    Ok(Artifact {
        source: source.to_string(),
        generated_at,
        parquet_path,
        csv_path,
        rows: rows.len(),
    })
}

fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(COLUMNS[0], DataType::Date32, false),
        Field::new(COLUMNS[1], DataType::Float64, false),
        Field::new(COLUMNS[2], DataType::Float64, true),
        Field::new(COLUMNS[3], DataType::Float64, true),
    ]))
}

fn to_batch(rows: &[EnrichedRow]) -> std::result::Result<RecordBatch, ArrowError> {
    let dates: Date32Array = rows
        .iter()
        .map(|r| Some(r.date.num_days_from_ce() - EPOCH_DAYS_FROM_CE))
        .collect();
    let values: Float64Array = rows.iter().map(|r| Some(r.cpi_value)).collect();
    let prev: Float64Array = rows.iter().map(|r| r.cpi_prev_year).collect();
    let rate: Float64Array = rows.iter().map(|r| r.inflation_rate).collect();
    RecordBatch::try_new(
        schema(),
        vec![
            Arc::new(dates) as ArrayRef,
            Arc::new(values),
            Arc::new(prev),
            Arc::new(rate),
        ],
    )
}

/// Serialize rows as a single-row-group Parquet file (Snappy).
pub fn write_parquet<W: Write + Send>(
    rows: &[EnrichedRow],
    out: W,
    source: &str,
    generated_at: NaiveDateTime,
) -> std::result::Result<(), parquet::errors::ParquetError> {
    let batch = to_batch(rows)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(vec![
            KeyValue::new("source".to_string(), source.to_string()),
            KeyValue::new(
                "generated_at".to_string(),
                generated_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            ),
        ]))
        .build();
    let mut writer = ArrowWriter::try_new(out, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Serialize rows as CSV with a header. Absent values are empty cells.
pub fn write_csv<W: Write>(rows: &[EnrichedRow], out: W) -> std::result::Result<(), csv::Error> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(out);
    wtr.write_record(COLUMNS)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read the CSV half of an artifact back into rows.
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Vec<EnrichedRow>> {
    let path = path.as_ref();
    let mut rdr = csv::Reader::from_path(path).map_err(|e| Error::persistence(path, e))?;
    rdr.deserialize()
        .collect::<std::result::Result<Vec<EnrichedRow>, _>>()
        .map_err(|e| Error::persistence(path, e))
}

/// Read the Parquet half of an artifact back into rows.
pub fn read_parquet<P: AsRef<Path>>(path: P) -> Result<Vec<EnrichedRow>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::persistence(path, e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .and_then(|b| b.build())
        .map_err(|e| Error::persistence(path, e))?;

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| Error::persistence(path, e))?;
        rows_from_batch(&batch, &mut out).map_err(|e| Error::persistence(path, e))?;
    }
    Ok(out)
}

fn rows_from_batch(
    batch: &RecordBatch,
    out: &mut Vec<EnrichedRow>,
) -> std::result::Result<(), ArrowError> {
    let column = |name: &str| {
        batch
            .column_by_name(name)
            .ok_or_else(|| ArrowError::SchemaError(format!("missing column {name}")))
    };
    let dates = column(COLUMNS[0])?.as_primitive_opt::<Date32Type>();
    let values = column(COLUMNS[1])?.as_primitive_opt::<Float64Type>();
    let prev = column(COLUMNS[2])?.as_primitive_opt::<Float64Type>();
    let rate = column(COLUMNS[3])?.as_primitive_opt::<Float64Type>();
    let (Some(dates), Some(values), Some(prev), Some(rate)) = (dates, values, prev, rate) else {
        return Err(ArrowError::SchemaError("unexpected column types".into()));
    };

    let opt = |arr: &Float64Array, i: usize| (!arr.is_null(i)).then(|| arr.value(i));
    for i in 0..batch.num_rows() {
        let date = NaiveDate::from_num_days_from_ce_opt(dates.value(i) + EPOCH_DAYS_FROM_CE)
            .ok_or_else(|| ArrowError::InvalidArgumentError("date out of range".into()))?;
        out.push(EnrichedRow {
            date,
            cpi_value: values.value(i),
            cpi_prev_year: opt(prev, i),
            inflation_rate: opt(rate, i),
        });
    }
    Ok(())
}

/// Both paths of the artifact that `source` would produce at `generated_at` inside `dir`.
pub fn artifact_paths(dir: &Path, source: &str, generated_at: NaiveDateTime) -> (PathBuf, PathBuf) {
    let stem = artifact_stem(source, generated_at);
    (
        dir.join(format!("{stem}.parquet")),
        dir.join(format!("{stem}.csv")),
    )
}
