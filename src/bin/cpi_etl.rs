use anyhow::{Context, Result};
use clap::Parser;
use cpi_etl::config::DEFAULT_CONFIG_PATH;
use cpi_etl::viz::{self, DEFAULT_SIZE};
use cpi_etl::{Pipeline, RunReport, Settings};
use log::{error, info};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "cpi-etl",
    version,
    about = "Fetch a CPI series, derive year-over-year inflation, and write Parquet + CSV"
)]
struct Cli {
    /// Source name from the configuration file (e.g., fred, bank_of_canada)
    #[arg(short, long)]
    source: String,
    /// Sources configuration file.
    #[arg(short, long, env = "CPI_ETL_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Directory for artifacts (overrides `output_dir` from the config file).
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Also render CPI, month-over-month and year-over-year panels to this SVG file.
    #[arg(long)]
    plot: Option<PathBuf>,
    /// Append log lines to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Debug-level logging.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn fmt_opt(v: Option<f64>, suffix: &str) -> String {
    match v {
        Some(x) if x.is_finite() => format!("{:.2}{}", x, suffix),
        _ => "NA".to_string(),
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    if let Some(path) = &cli.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.format_timestamp_secs().try_init()?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli) {
        eprintln!("error: {e:#}");
        return ExitCode::from(2);
    }

    let mut pipeline = match startup(&cli) {
        Ok(p) => p,
        Err(e) => {
            error!("startup failed: {e:#}");
            eprintln!("error: {e:#}");
            return ExitCode::from(2);
        }
    };

    match run(&mut pipeline, cli.plot.as_deref()) {
        Ok(report) => {
            print_summary(&report, cli.plot.as_deref());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn startup(cli: &Cli) -> Result<Pipeline> {
    dotenvy::dotenv().ok();
    let settings = Settings::load(&cli.config)
        .with_context(|| format!("load configuration {}", cli.config.display()))?;
    let source = settings.source(&cli.source)?;
    // Resolve the key now so a missing variable fails before any request.
    source.request_url()?;
    if let Some(path) = &cli.plot {
        if !viz::is_supported_output(path) {
            anyhow::bail!("--plot {} must name an .svg file", path.display());
        }
    }
    let out_dir = cli.out_dir.clone().unwrap_or(settings.output_dir);
    info!(
        "source '{}' -> {} (artifacts in {})",
        source.name,
        source.display_url(),
        out_dir.display()
    );
    let name = source.name.clone();
    Pipeline::new(source, out_dir)
        .with_context(|| format!("prepare pipeline for source '{name}'"))
}

fn run(pipeline: &mut Pipeline, plot: Option<&Path>) -> Result<RunReport> {
    let name = pipeline.config().name.clone();
    let report = pipeline
        .run()
        .with_context(|| format!("run for source '{name}' aborted"))?;
    if let Some(path) = plot {
        let title = format!("CPI and inflation: {} ({})", name, pipeline.config().series);
        viz::plot_inflation(
            &report.rows,
            report.summary.periods_per_year,
            path,
            &title,
            DEFAULT_SIZE,
        )
        .with_context(|| format!("render chart {}", path.display()))?;
        info!("chart written to {}", path.display());
    }
    Ok(report)
}

fn print_summary(report: &RunReport, plot: Option<&Path>) {
    let s = &report.summary;
    let date = |d: Option<chrono::NaiveDate>| {
        d.map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "NA".into())
    };
    println!("{}", "=".repeat(70));
    println!("Pipeline summary");
    println!("{}", "=".repeat(70));
    println!("Source: {}", report.source);
    println!(
        "Records processed: {} ({} skipped, {} filtered, {} duplicate dates)",
        s.records, report.normalize.invalid, report.normalize.filtered, report.normalize.duplicates
    );
    println!("Date range: {} to {}", date(s.first_date), date(s.last_date));
    println!();
    println!("Latest data point ({}):", date(s.last_date));
    println!("  CPI value: {}", fmt_opt(s.latest_value, ""));
    println!("  {}: {}", s.period_label(), fmt_opt(s.latest_mom_rate, "%"));
    println!("  Year-over-year: {}", fmt_opt(s.latest_rate, "%"));
    println!("Trailing {} periods average:", s.trailing_periods);
    println!(
        "  {}: {}",
        s.period_label(),
        fmt_opt(s.trailing_average_mom_rate, "%")
    );
    println!("  Year-over-year: {}", fmt_opt(s.trailing_average_rate, "%"));
    println!();
    println!("Parquet: {}", report.artifact.parquet_path.display());
    println!("CSV:     {}", report.artifact.csv_path.display());
    if let Some(path) = plot {
        println!("Chart:   {}", path.display());
    }
    println!("{}", "=".repeat(70));
}
