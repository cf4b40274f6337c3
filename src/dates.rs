//! Coercion of period labels to calendar dates.
//!
//! Statistics APIs label observations in several ways: `2020-01-15`,
//! `2020-01`, `2020M01`, `2020Q1`, or a bare year. Labels without a day
//! resolve to the first day of the period so that monthly and quarterly
//! series line up on calendar arithmetic.
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

static YEAR_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})(?:-|/|M)(\d{1,2})$").expect("year-month regex"));
static YEAR_QUARTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-?Q([1-4])$").expect("year-quarter regex"));
static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})$").expect("year regex"));

/// Parse a period label, returning `None` when it is not a recognisable date.
pub fn parse_period(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    // Full dates, optionally followed by a time component we ignore.
    let head = s.get(..10).unwrap_or(s);
    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(head, fmt) {
            let rest = &s[head.len()..];
            if rest.is_empty() || rest.starts_with('T') || rest.starts_with(' ') {
                return Some(d);
            }
        }
    }

    if let Some(c) = YEAR_MONTH.captures(s) {
        let year = c[1].parse().ok()?;
        let month = c[2].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, 1);
    }
    if let Some(c) = YEAR_QUARTER.captures(s) {
        let year = c[1].parse().ok()?;
        let quarter: u32 = c[2].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, (quarter - 1) * 3 + 1, 1);
    }
    if let Some(c) = YEAR.captures(s) {
        return NaiveDate::from_ymd_opt(c[1].parse().ok()?, 1, 1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, day)
    }

    #[test]
    fn accepts_common_labels() {
        assert_eq!(parse_period("2020-01-15"), d(2020, 1, 15));
        assert_eq!(parse_period(" 2020/02/01 "), d(2020, 2, 1));
        assert_eq!(parse_period("2020-03-01T00:00:00Z"), d(2020, 3, 1));
        assert_eq!(parse_period("2020-04"), d(2020, 4, 1));
        assert_eq!(parse_period("2020M05"), d(2020, 5, 1));
        assert_eq!(parse_period("2020Q3"), d(2020, 7, 1));
        assert_eq!(parse_period("2020-Q4"), d(2020, 10, 1));
        assert_eq!(parse_period("2020"), d(2020, 1, 1));
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", ".", "n/a", "2020-13", "2020-02-30", "2020Q5", "2020-01-01x"] {
            assert_eq!(parse_period(bad), None, "{bad:?}");
        }
    }
}
