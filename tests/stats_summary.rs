use chrono::NaiveDate;
use cpi_etl::EnrichedRow;
use cpi_etl::stats::summarize;

fn row(y: i32, m: u32, v: f64, rate: Option<f64>) -> EnrichedRow {
    EnrichedRow {
        date: NaiveDate::from_ymd_opt(y, m, 1).unwrap(),
        cpi_value: v,
        cpi_prev_year: rate.map(|_| 100.0),
        inflation_rate: rate,
    }
}

#[test]
fn summary_reports_latest_point_and_trailing_average() {
    // 2023-01..2023-06 without rates, then 2023-07..2024-06 with rates 1..=12
    let mut rows: Vec<EnrichedRow> = (1..=6).map(|m| row(2023, m, 100.0, None)).collect();
    rows.extend((0..12u32).map(|i| {
        let (y, m) = if i < 6 { (2023, 7 + i) } else { (2024, i - 5) };
        row(y, m, 101.0 + i as f64, Some(1.0 + i as f64))
    }));

    let s = summarize(&rows, 12);
    assert_eq!(s.records, 18);
    assert_eq!(s.first_date, NaiveDate::from_ymd_opt(2023, 1, 1));
    assert_eq!(s.last_date, NaiveDate::from_ymd_opt(2024, 6, 1));
    assert_eq!(s.latest_value, Some(112.0));
    assert_eq!(s.latest_rate, Some(12.0));
    assert_eq!(s.with_rate, 12);
    assert_eq!(s.trailing_periods, 12);
    assert_eq!(s.trailing_average_rate, Some(6.5));
}

#[test]
fn trailing_window_skips_missing_rates() {
    let rows = vec![
        row(2024, 1, 100.0, None),
        row(2024, 4, 101.0, Some(2.0)),
        row(2024, 7, 102.0, None),
        row(2024, 10, 103.0, Some(4.0)),
        row(2025, 1, 104.0, Some(6.0)),
    ];
    let s = summarize(&rows, 4);
    assert_eq!(s.trailing_periods, 4);
    // window holds 2.0, None, 4.0, 6.0
    assert_eq!(s.trailing_average_rate, Some(4.0));
}

#[test]
fn short_series_has_no_rates_to_average() {
    let rows: Vec<EnrichedRow> = (1..=3).map(|m| row(2024, m, 99.0, None)).collect();
    let s = summarize(&rows, 12);
    assert_eq!(s.trailing_periods, 3);
    assert_eq!(s.trailing_average_rate, None);
    assert_eq!(s.latest_rate, None);
    assert_eq!(s.with_rate, 0);
}

#[test]
fn empty_input_is_all_none() {
    let s = summarize(&[], 12);
    assert_eq!(s.records, 0);
    assert_eq!(s.first_date, None);
    assert_eq!(s.latest_value, None);
    assert_eq!(s.trailing_periods, 0);
}

#[test]
fn month_over_month_figures_use_adjacent_months() {
    // 2023-01..2024-06, CPI rising by 1.0 each month from 100.0
    let rows: Vec<EnrichedRow> = (0..18u32)
        .map(|i| row(2023 + (i / 12) as i32, i % 12 + 1, 100.0 + i as f64, None))
        .collect();
    let s = summarize(&rows, 12);
    assert_eq!(s.period_label(), "Month-over-month");

    let latest = s.latest_mom_rate.unwrap();
    assert!((latest - 1.0 / 116.0 * 100.0).abs() < 1e-9, "{latest}");

    // trailing window: 2023-07..2024-06, each compared with the month before
    let expected = (105..117).map(|p| 100.0 / p as f64).sum::<f64>() / 12.0;
    let avg = s.trailing_average_mom_rate.unwrap();
    assert!((avg - expected).abs() < 1e-9, "{avg} vs {expected}");
}

#[test]
fn month_over_month_skips_gaps() {
    let rows = vec![
        row(2024, 1, 100.0, None),
        row(2024, 3, 102.0, None),
        row(2024, 4, 103.02, None),
    ];
    let s = summarize(&rows, 12);
    assert!((s.latest_mom_rate.unwrap() - 1.0).abs() < 1e-9);
    // 2024-03 has no February to compare with
    assert!((s.trailing_average_mom_rate.unwrap() - 1.0).abs() < 1e-9);
}

#[test]
fn quarterly_summary_is_labelled_by_quarter() {
    let rows = vec![row(2024, 1, 100.0, None), row(2024, 4, 101.0, None)];
    let s = summarize(&rows, 4);
    assert_eq!(s.period_label(), "Quarter-over-quarter");
    assert!((s.latest_mom_rate.unwrap() - 1.0).abs() < 1e-9);
}
