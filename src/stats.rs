use crate::models::EnrichedRow;
use crate::transform::period_over_period;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Headline numbers for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub records: usize,
    pub periods_per_year: u32,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub latest_value: Option<f64>,
    pub latest_rate: Option<f64>,
    /// Change from the previous period at the latest row (month-over-month for monthly series).
    pub latest_mom_rate: Option<f64>,
    /// Rows in the trailing-year window (`periods_per_year`, or fewer if the series is short).
    pub trailing_periods: usize,
    /// Mean of the year-over-year rates present in the trailing-year window.
    pub trailing_average_rate: Option<f64>,
    /// Mean of the period-over-period rates present in the trailing-year window.
    pub trailing_average_mom_rate: Option<f64>,
    /// Rows carrying a year-over-year rate.
    pub with_rate: usize,
}

impl RunSummary {
    /// Label for the period-over-period figures.
    pub fn period_label(&self) -> &'static str {
        match self.periods_per_year {
            12 => "Month-over-month",
            4 => "Quarter-over-quarter",
            _ => "Period-over-period",
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Summarize enriched rows, assumed ascending by date.
pub fn summarize(rows: &[EnrichedRow], periods_per_year: u32) -> RunSummary {
    let latest = rows.last();
    let window = (periods_per_year.max(1) as usize).min(rows.len());
    let start = rows.len() - window;
    let mom = period_over_period(rows, periods_per_year);

    RunSummary {
        records: rows.len(),
        periods_per_year,
        first_date: rows.first().map(|r| r.date),
        last_date: latest.map(|r| r.date),
        latest_value: latest.map(|r| r.cpi_value),
        latest_rate: latest.and_then(|r| r.inflation_rate),
        latest_mom_rate: mom.last().copied().flatten(),
        trailing_periods: window,
        trailing_average_rate: mean(rows[start..].iter().filter_map(|r| r.inflation_rate)),
        trailing_average_mom_rate: mean(mom[start..].iter().flatten().copied()),
        with_rate: rows.iter().filter(|r| r.inflation_rate.is_some()).count(),
    }
}
