//! One linear run: fetch → normalize → derive → persist.
//!
//! Any failure moves the pipeline to [`Stage::Failed`] and skips the
//! remaining stages. There is no partial-stage recovery.
use crate::api::Fetcher;
use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::models::{Artifact, EnrichedRow, NormalizeReport};
use crate::rate_limit::{Clock, SystemClock};
use crate::stats::{self, RunSummary};
use crate::transform::Transformer;
use chrono::{DateTime, Local};
use log::{error, info};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error as ThisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Fetching,
    Normalizing,
    Deriving,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Idle => "idle",
            Stage::Fetching => "fetching",
            Stage::Normalizing => "normalizing",
            Stage::Deriving => "deriving",
            Stage::Persisting => "persisting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        })
    }
}

/// A run that stopped at `stage`.
#[derive(Debug, ThisError)]
#[error("pipeline for source '{source_name}' failed while {stage}")]
pub struct PipelineFailure {
    pub source_name: String,
    pub stage: Stage,
    #[source]
    pub error: Error,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub source: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub fetched_bytes: usize,
    pub rate_limit_wait: Duration,
    pub normalize: NormalizeReport,
    pub summary: RunSummary,
    pub artifact: Artifact,
    /// The rows written to the artifact.
    pub rows: Vec<EnrichedRow>,
}

pub struct Pipeline<C: Clock = SystemClock> {
    config: SourceConfig,
    fetcher: Fetcher<C>,
    transformer: Transformer,
    stage: Stage,
}

impl Pipeline<SystemClock> {
    pub fn new(config: SourceConfig, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let fetcher = Fetcher::new(&config)?;
        Ok(Self::with_fetcher(config, fetcher, output_dir))
    }
}

impl<C: Clock> Pipeline<C> {
    pub fn with_fetcher(
        config: SourceConfig,
        fetcher: Fetcher<C>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let transformer = Transformer::new(&config, output_dir);
        Self {
            config,
            fetcher,
            transformer,
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Execute every stage once.
    pub fn run(&mut self) -> Result<RunReport, PipelineFailure> {
        let started_at = Local::now();
        info!(
            "run started for source '{}' at {}",
            self.config.name,
            started_at.format("%Y-%m-%d %H:%M:%S")
        );

        let raw = self.step(Stage::Fetching, |p| p.fetcher.fetch(&p.config))?;
        let (table, normalize) =
            self.step(Stage::Normalizing, |p| p.transformer.normalize_with_report(&raw))?;
        let fetched_bytes = raw.bytes;
        drop(raw);

        let rows = self.step(Stage::Deriving, |p| Ok(p.transformer.derive(&table)))?;
        info!(
            "derived {} rows, {} with a year-over-year rate",
            rows.len(),
            rows.iter().filter(|r| r.inflation_rate.is_some()).count()
        );

        let artifact = self.step(Stage::Persisting, |p| {
            p.transformer.persist(&rows, &p.config.name)
        })?;

        self.stage = Stage::Done;
        let finished_at = Local::now();
        let elapsed = (finished_at - started_at).to_std().unwrap_or_default();
        info!(
            "run finished at {} after {:?}",
            finished_at.format("%Y-%m-%d %H:%M:%S"),
            elapsed
        );

        Ok(RunReport {
            source: self.config.name.clone(),
            started_at,
            finished_at,
            fetched_bytes,
            rate_limit_wait: self.fetcher.limiter().total_wait(),
            normalize,
            summary: stats::summarize(&rows, self.transformer.periods_per_year()),
            artifact,
            rows,
        })
    }

    fn step<T>(
        &mut self,
        stage: Stage,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T, PipelineFailure> {
        self.stage = stage;
        info!("stage: {stage}");
        f(self).map_err(|err| {
            self.stage = Stage::Failed;
            error!("source '{}' failed while {stage}: {err}", self.config.name);
            PipelineFailure {
                source_name: self.config.name.clone(),
                stage,
                error: err,
            }
        })
    }
}
