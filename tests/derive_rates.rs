use chrono::{Months, NaiveDate};
use cpi_etl::{ObservationRow, ObservationTable, derive_rates, period_over_period};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Consecutive periods of `step` months starting at `start`.
fn table(start: NaiveDate, step: u32, values: &[f64]) -> ObservationTable {
    ObservationTable::new(
        values
            .iter()
            .enumerate()
            .map(|(i, v)| ObservationRow {
                date: start + Months::new(step * i as u32),
                cpi_value: *v,
            })
            .collect(),
    )
}

fn rising(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 + 0.5 * i as f64).collect()
}

#[test]
fn two_years_of_rising_cpi() {
    let t = table(d(2020, 1, 1), 1, &rising(24));
    let rows = derive_rates(&t, 12);
    assert_eq!(rows.len(), 24);

    for (idx, row) in rows.iter().enumerate() {
        let i = idx as f64 + 1.0; // 1-based month number
        if idx < 12 {
            assert_eq!(row.cpi_prev_year, None, "month {i}");
            assert_eq!(row.inflation_rate, None, "month {i}");
        } else {
            let now = 100.0 + 0.5 * (i - 1.0);
            let prev = 100.0 + 0.5 * (i - 13.0);
            let expected = (now - prev) / prev * 100.0;
            assert_eq!(row.cpi_prev_year, Some(prev));
            let got = row.inflation_rate.expect("rate present");
            assert!((got - expected).abs() < 1e-9, "month {i}: {got} vs {expected}");
        }
    }
    // month 13: (106 - 100) / 100
    assert!((rows[12].inflation_rate.unwrap() - 6.0).abs() < 1e-9);
}

#[test]
fn six_rows_have_no_rates() {
    let rows = derive_rates(&table(d(2023, 1, 1), 1, &rising(6)), 12);
    assert_eq!(rows.len(), 6);
    assert!(rows.iter().all(|r| r.cpi_prev_year.is_none() && r.inflation_rate.is_none()));
}

#[test]
fn every_row_from_the_thirteenth_has_a_rate() {
    for n in 13..=40 {
        let rows = derive_rates(&table(d(2010, 7, 1), 1, &rising(n)), 12);
        assert!(rows[..12].iter().all(|r| r.inflation_rate.is_none()), "n={n}");
        assert!(rows[12..].iter().all(|r| r.inflation_rate.is_some()), "n={n}");
    }
}

#[test]
fn zero_prior_value_gives_no_rate() {
    let mut values = rising(13);
    values[0] = 0.0;
    let rows = derive_rates(&table(d(2020, 1, 1), 1, &values), 12);
    assert_eq!(rows[12].cpi_prev_year, Some(0.0));
    assert_eq!(rows[12].inflation_rate, None);
}

#[test]
fn lookback_uses_calendar_dates_not_offsets() {
    // 2020-01 .. 2021-06 with 2020-03 missing.
    let rows: Vec<ObservationRow> = (0..18u32)
        .filter(|&i| i != 2)
        .map(|i| ObservationRow {
            date: d(2020, 1, 1) + Months::new(i),
            cpi_value: 100.0 + i as f64,
        })
        .collect();
    let enriched = derive_rates(&ObservationTable::new(rows), 12);

    let find = |date: NaiveDate| enriched.iter().find(|r| r.date == date).unwrap();
    assert_eq!(find(d(2021, 3, 1)).cpi_prev_year, None);
    assert_eq!(find(d(2021, 3, 1)).inflation_rate, None);
    // Twelve rows back from 2021-02 lands on 2020-01; the calendar says 2020-02.
    assert_eq!(find(d(2021, 2, 1)).cpi_prev_year, Some(101.0));
    assert_eq!(find(d(2021, 4, 1)).cpi_prev_year, Some(103.0));
}

#[test]
fn quarterly_series_looks_back_four_periods() {
    let t = table(d(2018, 1, 1), 3, &[100.0, 101.0, 102.0, 103.0, 104.0, 106.0]);
    let rows = derive_rates(&t, 4);
    assert!(rows[..4].iter().all(|r| r.inflation_rate.is_none()));
    assert_eq!(rows[4].date, d(2019, 1, 1));
    assert_eq!(rows[4].cpi_prev_year, Some(100.0));
    assert!((rows[4].inflation_rate.unwrap() - 4.0).abs() < 1e-9);
    assert!((rows[5].inflation_rate.unwrap() - 4.950_495_049_504_95).abs() < 1e-9);
}

#[test]
fn derive_is_idempotent() {
    let t = table(d(2015, 1, 1), 1, &rising(30));
    let a = derive_rates(&t, 12);
    let b = derive_rates(&t, 12);
    assert_eq!(a, b);
}

fn month_end(y: i32, m: u32) -> NaiveDate {
    d(y, m, 1) + Months::new(1) - chrono::Days::new(1)
}

#[test]
fn month_end_labels_survive_a_leap_february() {
    // 2020-01-31 .. 2021-02-28; the year-ago row of 2021-02-28 is 2020-02-29.
    let rows: Vec<ObservationRow> = (0..14u32)
        .map(|i| ObservationRow {
            date: month_end(2020 + (i / 12) as i32, i % 12 + 1),
            cpi_value: 100.0 + i as f64,
        })
        .collect();
    let enriched = derive_rates(&ObservationTable::new(rows), 12);

    assert_eq!(enriched[13].date, d(2021, 2, 28));
    assert_eq!(enriched[13].cpi_prev_year, Some(101.0));
    assert!(enriched[12..].iter().all(|r| r.inflation_rate.is_some()));
    assert!((enriched[12].inflation_rate.unwrap() - 12.0).abs() < 1e-9);
}

#[test]
fn tiny_prior_value_gives_no_rate_instead_of_infinity() {
    let mut values = rising(13);
    values[0] = 5e-324;
    let rows = derive_rates(&table(d(2020, 1, 1), 1, &values), 12);
    assert_eq!(rows[12].cpi_prev_year, Some(5e-324));
    assert_eq!(rows[12].inflation_rate, None);
}

#[test]
fn period_over_period_compares_adjacent_periods() {
    let monthly = derive_rates(&table(d(2020, 11, 1), 1, &[100.0, 102.0, 0.0, 5.0]), 12);
    let mom = period_over_period(&monthly, 12);
    assert_eq!(mom[0], None);
    assert!((mom[1].unwrap() - 2.0).abs() < 1e-9);
    // December -> January crosses the year boundary.
    assert_eq!(mom[2], Some(-100.0));
    assert_eq!(mom[3], None);

    let quarterly = derive_rates(&table(d(2019, 10, 1), 3, &[200.0, 210.0]), 4);
    let qoq = period_over_period(&quarterly, 4);
    assert_eq!(qoq[0], None);
    assert!((qoq[1].unwrap() - 5.0).abs() < 1e-9);
}
