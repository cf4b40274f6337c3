//! cpi_etl
//!
//! A small scheduled ETL job for Consumer Price Index series. Pairs with the
//! `cpi-etl` CLI, which an external scheduler invokes once per run.
//!
//! ### Features
//! - Fetch a CPI series from a configured statistics API, under a rolling-window rate limit
//! - Normalize the payload into a date-sorted table (bad rows are skipped and counted)
//! - Derive year-over-year inflation by calendar arithmetic
//! - Persist each run as an immutable, timestamped Parquet + CSV pair
//! - Optionally chart the run (CPI, period-over-period and year-over-year rates) as SVG
//!
//! ### Example
//! ```no_run
//! use cpi_etl::{Pipeline, Settings};
//!
//! let settings = Settings::load("config/sources.toml")?;
//! let source = settings.source("bank_of_canada")?;
//! let mut pipeline = Pipeline::new(source, &settings.output_dir)?;
//! let report = pipeline.run()?;
//! println!("wrote {}", report.artifact.csv_path.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod api;
pub mod config;
pub mod dates;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod rate_limit;
pub mod stats;
pub mod storage;
pub mod transform;
pub mod viz;

pub use api::Fetcher;
pub use config::{CanonicalField, FieldMap, RateLimitConfig, Settings, SourceConfig};
pub use error::{Error, Result};
pub use models::{Artifact, EnrichedRow, NormalizeReport, ObservationRow, ObservationTable, RawRecord};
pub use pipeline::{Pipeline, PipelineFailure, RunReport, Stage};
pub use rate_limit::{Clock, RateLimiter, SystemClock};
pub use transform::{Transformer, derive_rates, period_over_period};
