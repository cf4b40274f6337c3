//! Payload → table → enriched rows → artifact.
//!
//! `normalize` and `derive` are pure functions of their input; only
//! `persist` touches the filesystem.
use crate::config::{CanonicalField, SourceConfig};
use crate::dates::parse_period;
use crate::error::{Error, Result};
use crate::models::{
    Artifact, EnrichedRow, NormalizeReport, ObservationRow, ObservationTable, RawRecord,
};
use crate::storage;
use ahash::AHashMap;
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Transformer {
    records: String,
    date_fields: Vec<String>,
    value_fields: Vec<String>,
    filters: Vec<(String, String)>,
    periods_per_year: u32,
    output_dir: PathBuf,
}

impl Transformer {
    pub fn new(config: &SourceConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            records: config.records.clone(),
            date_fields: config.fields.spellings(CanonicalField::Date),
            value_fields: config.fields.spellings(CanonicalField::CpiValue),
            filters: lowercase_filters(&config.filters),
            periods_per_year: config.periods_per_year.max(1),
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn periods_per_year(&self) -> u32 {
        self.periods_per_year
    }

    /// Normalize a payload into an ascending, duplicate-free table.
    pub fn normalize(&self, raw: &RawRecord) -> Result<ObservationTable> {
        self.normalize_with_report(raw).map(|(table, _)| table)
    }

    /// Like [`normalize`](Self::normalize), also returning the row counts.
    ///
    /// Rows whose date or value cannot be coerced are skipped and counted. The
    /// call only fails when nothing usable is left.
    pub fn normalize_with_report(
        &self,
        raw: &RawRecord,
    ) -> Result<(ObservationTable, NormalizeReport)> {
        let entries = self.locate_records(raw)?;
        let mut report = NormalizeReport {
            seen: entries.len(),
            ..Default::default()
        };

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(obj) = entry.as_object() else {
                report.invalid += 1;
                continue;
            };
            if !self.passes_filters(obj) {
                report.filtered += 1;
                continue;
            }
            let date = lookup(obj, &self.date_fields).and_then(coerce_date);
            let value = lookup(obj, &self.value_fields).and_then(coerce_value);
            match (date, value) {
                (Some(date), Some(cpi_value)) => rows.push(ObservationRow { date, cpi_value }),
                _ => {
                    debug!("skipping unusable record: {}", Value::Object(obj.clone()));
                    report.invalid += 1;
                }
            }
        }

        let coerced = rows.len();
        let table = ObservationTable::new(rows);
        report.duplicates = coerced - table.len();
        report.kept = table.len();

        if report.invalid > 0 {
            warn!(
                "dropped {} of {} records that could not be coerced",
                report.invalid, report.seen
            );
        }
        if table.is_empty() {
            return Err(Error::EmptyDataset {
                seen: report.seen,
                invalid: report.invalid,
                filtered: report.filtered,
            });
        }
        info!(
            "normalized {} rows ({} seen, {} filtered, {} invalid, {} duplicate dates)",
            report.kept, report.seen, report.filtered, report.invalid, report.duplicates
        );
        Ok((table, report))
    }

    /// Attach the value from one year earlier and the year-over-year rate to every row.
    pub fn derive(&self, table: &ObservationTable) -> Vec<EnrichedRow> {
        derive_rates(table, self.periods_per_year)
    }

    /// Write `rows` as a new timestamped artifact under the output directory.
    pub fn persist(&self, rows: &[EnrichedRow], source_name: &str) -> Result<Artifact> {
        self.persist_at(rows, source_name, Local::now().naive_local())
    }

    /// [`persist`](Self::persist) with an explicit generation timestamp.
    pub fn persist_at(
        &self,
        rows: &[EnrichedRow],
        source_name: &str,
        generated_at: NaiveDateTime,
    ) -> Result<Artifact> {
        storage::write_artifact(&self.output_dir, source_name, rows, generated_at)
    }

    fn locate_records<'a>(&self, raw: &'a RawRecord) -> Result<&'a Vec<Value>> {
        let node = if self.records.is_empty() {
            Some(&raw.payload)
        } else {
            raw.payload.pointer(&self.records)
        };
        match node {
            Some(Value::Array(entries)) => Ok(entries),
            // Some APIs answer an empty result with `null` in place of the array.
            Some(Value::Null) => Err(Error::EmptyDataset {
                seen: 0,
                invalid: 0,
                filtered: 0,
            }),
            _ => Err(Error::Upstream {
                url: raw.url.clone(),
                reason: format!("no observation array at '{}'", self.records),
            }),
        }
    }

    fn passes_filters(&self, obj: &Map<String, Value>) -> bool {
        self.filters.iter().all(|(field, expected)| {
            lookup(obj, std::slice::from_ref(field))
                .and_then(scalar_text)
                .is_some_and(|actual| actual == *expected)
        })
    }
}

/// Year-over-year comparison by calendar arithmetic.
///
/// Each date is bucketed into its period (`12 / periods_per_year` months
/// long) and compared with the same period one calendar year earlier, so a
/// monthly series labelled `2021-02-28` finds `2020-02-29`. A row whose
/// earlier period is missing from the table, or whose earlier value is zero,
/// gets no rate.
pub fn derive_rates(table: &ObservationTable, periods_per_year: u32) -> Vec<EnrichedRow> {
    let span = period_months(periods_per_year);
    let index = period_index(table.rows().iter().map(|r| (r.date, r.cpi_value)), span);

    table
        .rows()
        .iter()
        .map(|row| {
            let (year, bucket) = period_key(row.date, span);
            let cpi_prev_year = index.get(&(year - 1, bucket)).copied();
            EnrichedRow {
                date: row.date,
                cpi_value: row.cpi_value,
                cpi_prev_year,
                inflation_rate: cpi_prev_year.and_then(|prev| percent_change(row.cpi_value, prev)),
            }
        })
        .collect()
}

/// Change from the immediately preceding period, in percent, aligned with `rows`.
///
/// Month-over-month for monthly series, quarter-over-quarter for quarterly
/// ones. Same matching rules as [`derive_rates`].
pub fn period_over_period(rows: &[EnrichedRow], periods_per_year: u32) -> Vec<Option<f64>> {
    let span = period_months(periods_per_year);
    let buckets = 12 / span;
    let index = period_index(rows.iter().map(|r| (r.date, r.cpi_value)), span);

    rows.iter()
        .map(|row| {
            let (year, bucket) = period_key(row.date, span);
            let prev_key = if bucket == 0 {
                (year - 1, buckets - 1)
            } else {
                (year, bucket - 1)
            };
            index
                .get(&prev_key)
                .and_then(|prev| percent_change(row.cpi_value, *prev))
        })
        .collect()
}

fn period_months(periods_per_year: u32) -> u32 {
    (12 / periods_per_year.clamp(1, 12)).max(1)
}

fn period_key(date: NaiveDate, span: u32) -> (i32, u32) {
    (date.year(), date.month0() / span)
}

// First row of each period wins.
fn period_index(
    rows: impl Iterator<Item = (NaiveDate, f64)>,
    span: u32,
) -> AHashMap<(i32, u32), f64> {
    let mut index = AHashMap::new();
    for (date, value) in rows {
        index.entry(period_key(date, span)).or_insert(value);
    }
    index
}

/// `None` for a zero base and for results that overflow to infinity.
fn percent_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }
    Some((current - previous) / previous * 100.0).filter(|r| r.is_finite())
}

fn lowercase_filters(filters: &BTreeMap<String, String>) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect()
}

/// First configured spelling present in `obj`, compared case-insensitively.
fn lookup<'a>(obj: &'a Map<String, Value>, spellings: &[String]) -> Option<&'a Value> {
    spellings.iter().find_map(|want| {
        obj.iter()
            .find(|(key, _)| key.trim().to_lowercase() == *want)
            .map(|(_, v)| v)
    })
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_date(v: &Value) -> Option<NaiveDate> {
    match v {
        Value::String(s) => parse_period(s),
        Value::Number(n) => {
            let year = i32::try_from(n.as_i64()?).ok()?;
            NaiveDate::from_ymd_opt(year, 1, 1)
        }
        _ => None,
    }
}

fn coerce_value(v: &Value) -> Option<f64> {
    let x = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        // Bank of Canada Valet nests the value: {"v": "136.8"}
        Value::Object(inner) => {
            let nested = inner.get("v").or_else(|| inner.get("value"))?;
            if nested.is_object() {
                return None;
            }
            return coerce_value(nested);
        }
        _ => return None,
    };
    (x.is_finite() && x >= 0.0).then_some(x)
}
