//! Chart rendering for one artifact: CPI level, period-over-period and
//! year-over-year rates stacked in three panels, written as **SVG**.
//!
//! The most recent year of each series is drawn over the full line in a
//! highlight color. Text is emitted as SVG `<text>` elements, so no font
//! files are needed at render time.
use crate::models::EnrichedRow;
use crate::transform::period_over_period;
use anyhow::{Result, anyhow};
use chrono::{Datelike, NaiveDate};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::FontFamily;
use plotters_svg::SVGBackend;
use std::path::Path;

pub const DEFAULT_SIZE: (u32, u32) = (1200, 1000);

// Line colors per panel, plus the trailing-year highlight.
const CPI_COLOR: RGBColor = RGBColor(0x2E, 0x86, 0xAB);
const MOM_COLOR: RGBColor = RGBColor(0xF1, 0x8F, 0x01);
const YOY_COLOR: RGBColor = RGBColor(0x06, 0xA7, 0x7D);
const RECENT_COLOR: RGBColor = RGBColor(0xA2, 0x3B, 0x72);

/// Whether `path` names a format [`plot_inflation`] can write.
pub fn is_supported_output(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"))
}

/// Fractional year on the x axis (2020-07-01 -> 2020.5).
fn x_of(date: NaiveDate) -> f64 {
    date.year() as f64 + date.month0() as f64 / 12.0
}

fn y_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (-1.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(0.5);
    (lo - pad, hi + pad)
}

/// Render `rows` (ascending by date) as a three-panel SVG chart.
pub fn plot_inflation<P: AsRef<Path>>(
    rows: &[EnrichedRow],
    periods_per_year: u32,
    out_path: P,
    title: &str,
    size: (u32, u32),
) -> Result<()> {
    let out_path = out_path.as_ref();
    if rows.is_empty() {
        return Err(anyhow!("no data to plot"));
    }
    if !is_supported_output(out_path) {
        return Err(anyhow!(
            "unsupported chart format for {} (expected .svg)",
            out_path.display()
        ));
    }

    let cpi: Vec<(f64, f64)> = rows.iter().map(|r| (x_of(r.date), r.cpi_value)).collect();
    let mom: Vec<(f64, f64)> = rows
        .iter()
        .zip(period_over_period(rows, periods_per_year))
        .filter_map(|(r, rate)| rate.map(|v| (x_of(r.date), v)))
        .collect();
    let yoy: Vec<(f64, f64)> = rows
        .iter()
        .filter_map(|r| r.inflation_rate.map(|v| (x_of(r.date), v)))
        .collect();

    let (mut x_min, mut x_max) = (cpi[0].0, cpi[cpi.len() - 1].0);
    if x_max - x_min < f64::EPSILON {
        x_min -= 0.5;
        x_max += 0.5;
    }
    let recent = periods_per_year.max(1) as usize;
    let mom_caption = match periods_per_year {
        12 => "Month-over-month inflation rate",
        4 => "Quarter-over-quarter inflation rate",
        _ => "Period-over-period inflation rate",
    };

    let root = SVGBackend::new(out_path, size).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("{:?}", e))?;
    let root = root
        .titled(title, (FontFamily::SansSerif, 24))
        .map_err(|e| anyhow!("{:?}", e))?;
    let panels = root.split_evenly((3, 1));

    let x = (x_min, x_max);
    draw_panel(&panels[0], "Consumer Price Index", "CPI", &cpi, CPI_COLOR, recent, x, false)?;
    draw_panel(&panels[1], mom_caption, "%", &mom, MOM_COLOR, recent, x, true)?;
    draw_panel(
        &panels[2],
        "Year-over-year inflation rate",
        "%",
        &yoy,
        YOY_COLOR,
        recent,
        x,
        true,
    )?;

    root.present().map_err(|e| anyhow!("{:?}", e))?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    caption: &str,
    y_desc: &str,
    series: &[(f64, f64)],
    color: RGBColor,
    recent: usize,
    (x_min, x_max): (f64, f64),
    zero_line: bool,
) -> Result<()> {
    let (y_min, y_max) = y_range(series.iter().map(|p| p.1));
    let mut chart = ChartBuilder::on(area)
        .margin(12)
        .caption(caption, (FontFamily::SansSerif, 16))
        .set_label_area_size(LabelAreaPosition::Left, 64)
        .set_label_area_size(LabelAreaPosition::Bottom, 32)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| anyhow!("{:?}", e))?;

    let x_label_fmt = |x: &f64| format!("{:.0}", x.floor());
    let y_label_fmt = |y: &f64| format!("{:.1}", y);
    chart
        .configure_mesh()
        .y_desc(y_desc)
        .x_labels(10)
        .y_labels(6)
        .x_label_formatter(&x_label_fmt)
        .y_label_formatter(&y_label_fmt)
        .light_line_style(WHITE.mix(0.0))
        .label_style((FontFamily::SansSerif, 12))
        .axis_desc_style((FontFamily::SansSerif, 14))
        .draw()
        .map_err(|e| anyhow!("{:?}", e))?;

    if zero_line && y_min < 0.0 && y_max > 0.0 {
        chart
            .draw_series(LineSeries::new(
                vec![(x_min, 0.0), (x_max, 0.0)],
                BLACK.mix(0.5),
            ))
            .map_err(|e| anyhow!("{:?}", e))?;
    }

    chart
        .draw_series(LineSeries::new(series.iter().copied(), color.stroke_width(2)))
        .map_err(|e| anyhow!("{:?}", e))?;

    let tail = &series[series.len().saturating_sub(recent)..];
    if tail.len() > 1 {
        chart
            .draw_series(LineSeries::new(
                tail.iter().copied(),
                RECENT_COLOR.stroke_width(3),
            ))
            .map_err(|e| anyhow!("{:?}", e))?
            .label(format!("Last {} periods", tail.len()))
            .legend(|(x, y)| {
                PathElement::new(vec![(x, y), (x + 18, y)], RECENT_COLOR.stroke_width(3))
            });
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .label_font((FontFamily::SansSerif, 12))
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK.mix(0.3))
            .draw()
            .map_err(|e| anyhow!("{:?}", e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x_axis_is_fractional_year() {
        let d = NaiveDate::from_ymd_opt(2020, 7, 1).unwrap();
        assert_eq!(x_of(d), 2020.5);
    }

    #[test]
    fn flat_or_empty_series_get_a_usable_range() {
        assert_eq!(y_range([2.0, 2.0].into_iter()), (1.5, 2.5));
        assert_eq!(y_range(std::iter::empty()), (-1.0, 1.0));
    }

    #[test]
    fn only_svg_is_supported() {
        assert!(is_supported_output(Path::new("out/chart.svg")));
        assert!(is_supported_output(Path::new("chart.SVG")));
        assert!(!is_supported_output(Path::new("chart.png")));
        assert!(!is_supported_output(Path::new("chart")));
    }
}
