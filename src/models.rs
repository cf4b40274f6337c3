use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Unmodified API payload plus where and when it was fetched.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub payload: Value,
    /// Request URL with any API key redacted.
    pub url: String,
    pub fetched_at: DateTime<Local>,
    pub bytes: usize,
}

impl RawRecord {
    /// Wrap an already-parsed payload (tests, replays).
    pub fn from_json(payload: Value) -> Self {
        Self {
            payload,
            url: String::new(),
            fetched_at: Local::now(),
            bytes: 0,
        }
    }
}

/// One normalized observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub date: NaiveDate,
    pub cpi_value: f64,
}

/// Observations sorted ascending by date, with unique dates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationTable {
    rows: Vec<ObservationRow>,
}

impl ObservationTable {
    /// Sort by date and drop repeated dates, keeping the first occurrence in input order.
    pub fn new(mut rows: Vec<ObservationRow>) -> Self {
        rows.sort_by_key(|r| r.date);
        rows.dedup_by_key(|r| r.date);
        Self { rows }
    }

    pub fn rows(&self) -> &[ObservationRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }
}

/// Observation plus its year-over-year comparison. Column order matches the artifact files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRow {
    pub date: NaiveDate,
    pub cpi_value: f64,
    pub cpi_prev_year: Option<f64>,
    pub inflation_rate: Option<f64>,
}

/// Row counts gathered while normalizing one payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeReport {
    /// Entries in the observation array.
    pub seen: usize,
    /// Entries rejected by the source's filters.
    pub filtered: usize,
    /// Entries whose date or value could not be coerced.
    pub invalid: usize,
    /// Entries dropped because an earlier entry had the same date.
    pub duplicates: usize,
    pub kept: usize,
}

/// The durable output of one run: a Parquet file and a CSV file with identical content.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub source: String,
    pub generated_at: NaiveDateTime,
    pub parquet_path: PathBuf,
    pub csv_path: PathBuf,
    pub rows: usize,
}
