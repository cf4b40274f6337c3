//! Declarative source configuration.
//!
//! A single TOML file maps source names to [`SourceConfig`] entries:
//!
//! ```toml
//! output_dir = "data/processed"
//!
//! [sources.fred]
//! endpoint = "https://api.stlouisfed.org/fred/series/observations?series_id={series}&api_key={api_key}&file_type=json"
//! series = "CPIAUCSL"
//! api_key_env = "FRED_API_KEY"
//!
//! [sources.fred.fields]
//! date = ["date"]
//! cpi_value = ["value"]
//! ```
//!
//! The file is loaded once per run and never mutated afterwards.
use crate::error::{Error, Result};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/sources.toml";
const REDACTED: &str = "REDACTED";

// Allow -, _, . unescaped in identifiers (common for series ids)
const SAFE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_]+)\}").expect("placeholder regex"));
static SOURCE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("source name regex"));

/// Whole configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Where artifacts are written unless overridden on the command line.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/processed")
}

impl Settings {
    /// Read and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), strip_prefix(e))))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let mut settings: Settings =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        for (name, source) in settings.sources.iter_mut() {
            source.name = name.clone();
            source.validate()?;
        }
        Ok(settings)
    }

    /// Look up one source by name. Absence is fatal for the run.
    pub fn source(&self, name: &str) -> Result<SourceConfig> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownSource {
                name: name.to_string(),
                available: self.sources.keys().cloned().collect::<Vec<_>>().join(", "),
            })
    }
}

fn strip_prefix(e: Error) -> String {
    match e {
        Error::Config(msg) => msg,
        other => other.to_string(),
    }
}

/// Canonical fields the transformer extracts from every observation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CanonicalField {
    Date,
    CpiValue,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 2] = [CanonicalField::Date, CanonicalField::CpiValue];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Date => "date",
            CanonicalField::CpiValue => "cpi_value",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mapping from canonical field name to the acceptable source spellings.
///
/// Matching is case-insensitive and the first spelling present in a record wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap(BTreeMap<String, Vec<String>>);

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: CanonicalField, spellings: &[&str]) -> Self {
        self.0.insert(
            field.as_str().to_string(),
            spellings.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    /// Lower-cased spellings for `field`, in configured order.
    pub fn spellings(&self, field: CanonicalField) -> Vec<String> {
        self.0
            .get(field.as_str())
            .map(|v| v.iter().map(|s| s.trim().to_lowercase()).collect())
            .unwrap_or_default()
    }

    fn validate(&self, source: &str) -> Result<()> {
        for key in self.0.keys() {
            if !CanonicalField::ALL.iter().any(|f| f.as_str() == key) {
                return Err(Error::Config(format!(
                    "source '{source}': unknown canonical field '{key}' (expected date, cpi_value)"
                )));
            }
        }
        for field in CanonicalField::ALL {
            if self.spellings(field).iter().all(|s| s.is_empty()) {
                return Err(Error::Config(format!(
                    "source '{source}': no spellings configured for field '{field}'"
                )));
            }
        }
        Ok(())
    }
}

/// Request ceiling over a rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_max_requests() -> usize {
    60
}

fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// One statistics endpoint and how to read its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Filled from the table key when loading.
    #[serde(skip)]
    pub name: String,
    /// URL template with `{series}` and `{api_key}` placeholders.
    pub endpoint: String,
    pub series: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Environment variable holding the API key, if the endpoint needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// JSON pointer to the observation array; empty means the payload itself.
    #[serde(default = "default_records")]
    pub records: String,
    pub fields: FieldMap,
    /// Field name -> required value; records not matching every entry are skipped.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

fn default_records() -> String {
    "/observations".into()
}

fn default_periods_per_year() -> u32 {
    12
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl SourceConfig {
    /// Minimal config for a series; everything else takes its default.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        series: impl Into<String>,
        fields: FieldMap,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            series: series.into(),
            headers: BTreeMap::new(),
            api_key_env: None,
            rate_limit: RateLimitConfig::default(),
            records: default_records(),
            fields,
            filters: BTreeMap::new(),
            periods_per_year: default_periods_per_year(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_retries: 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let name = &self.name;
        if !SOURCE_NAME.is_match(name) {
            return Err(Error::Config(format!(
                "source name '{name}' may only contain letters, digits, '-' and '_'"
            )));
        }
        if self.endpoint.trim().is_empty() {
            return Err(Error::Config(format!("source '{name}': endpoint is empty")));
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            return Err(Error::Config(format!(
                "source '{name}': rate_limit.max_requests and rate_limit.window_secs must be >= 1"
            )));
        }
        if self.periods_per_year == 0 || 12 % self.periods_per_year != 0 {
            return Err(Error::Config(format!(
                "source '{name}': periods_per_year must divide 12, got {}",
                self.periods_per_year
            )));
        }
        if !self.records.is_empty() && !self.records.starts_with('/') {
            return Err(Error::Config(format!(
                "source '{name}': records must be a JSON pointer starting with '/'"
            )));
        }
        self.fields.validate(name)?;
        // Catch unknown placeholders early; the key itself is resolved at request time.
        let key = self.api_key_env.as_ref().map(|_| "");
        self.render(&self.endpoint, key)?;
        for value in self.headers.values() {
            self.render(value, key)?;
        }
        Ok(())
    }

    /// Months spanned by one period (1 for monthly, 3 for quarterly).
    pub fn period_months(&self) -> u32 {
        12 / self.periods_per_year.max(1)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Resolve the API key from the environment, if one is configured.
    pub fn api_key(&self) -> Result<Option<String>> {
        match &self.api_key_env {
            None => Ok(None),
            Some(var) => std::env::var(var).map(Some).map_err(|_| {
                Error::Config(format!(
                    "source '{}': environment variable {var} is not set",
                    self.name
                ))
            }),
        }
    }

    /// Substitute placeholders in `template`.
    pub fn render(&self, template: &str, api_key: Option<&str>) -> Result<String> {
        let mut unknown: Option<String> = None;
        let mut missing_key = false;
        let out = PLACEHOLDER.replace_all(template, |caps: &Captures| match &caps[1] {
            "series" => encode(&self.series),
            "api_key" => match api_key {
                Some(k) => encode(k),
                None => {
                    missing_key = true;
                    String::new()
                }
            },
            other => {
                unknown.get_or_insert_with(|| other.to_string());
                String::new()
            }
        });
        if let Some(p) = unknown {
            return Err(Error::Config(format!(
                "source '{}': unknown placeholder {{{p}}} in '{template}'",
                self.name
            )));
        }
        if missing_key {
            return Err(Error::Config(format!(
                "source '{}': template uses {{api_key}} but no api_key_env is configured",
                self.name
            )));
        }
        Ok(out.into_owned())
    }

    /// Request URL with the real key.
    pub fn request_url(&self) -> Result<String> {
        let key = self.api_key()?;
        self.render(&self.endpoint, key.as_deref())
    }

    /// Request URL safe for logs.
    pub fn display_url(&self) -> String {
        self.render(&self.endpoint, Some(REDACTED))
            .unwrap_or_else(|_| self.endpoint.clone())
    }
}

fn encode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s.trim(), SAFE).to_string()
}
