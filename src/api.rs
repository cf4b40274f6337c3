//! Rate-limited HTTP fetcher for statistics APIs.
//!
//! One [`Fetcher`] serves one source for one run. It owns the reqwest
//! blocking client and a [`RateLimiter`] sized from the source's
//! `rate_limit` table, and returns the payload as an opaque [`RawRecord`].
//!
//! ### Notes
//! - [`Fetcher::fetch`] is the governed path: it waits for a rate-limit slot
//!   and never fails with `RateLimitExceeded`.
//! - [`Fetcher::try_fetch`] skips the wait and fails instead when the window is full.
//! - Retries are off unless `max_retries` is set. When enabled, only transport
//!   errors and 5xx responses are retried, each attempt going through the limiter.
//!
//! Typical usage:
//! ```no_run
//! # use cpi_etl::{Fetcher, Settings};
//! let settings = Settings::load("config/sources.toml")?;
//! let source = settings.source("fred")?;
//! let mut fetcher = Fetcher::new(&source)?;
//! let raw = fetcher.fetch(&source)?;
//! println!("{} bytes from {}", raw.bytes, raw.url);
//! # Ok::<(), cpi_etl::Error>(())
//! ```
use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::models::RawRecord;
use crate::rate_limit::{Clock, RateLimiter, SystemClock};
use chrono::Local;
use log::{debug, info, warn};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use serde_json::Value;
use std::time::Duration;

const BACKOFF_MS: [u64; 3] = [100, 300, 700];

#[derive(Debug)]
pub struct Fetcher<C: Clock = SystemClock> {
    http: HttpClient,
    limiter: RateLimiter<C>,
}

impl Fetcher<SystemClock> {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> Fetcher<C> {
    pub fn with_clock(config: &SourceConfig, clock: C) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .redirect(Policy::limited(5))
            .user_agent(concat!("cpi_etl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            limiter: RateLimiter::from_config(&config.rate_limit, clock),
        })
    }

    pub fn limiter(&self) -> &RateLimiter<C> {
        &self.limiter
    }

    pub fn limiter_mut(&mut self) -> &mut RateLimiter<C> {
        &mut self.limiter
    }

    /// Fetch the source's payload, waiting for the rate limiter as needed.
    pub fn fetch(&mut self, config: &SourceConfig) -> Result<RawRecord> {
        self.fetch_inner(config, true)
    }

    /// Like [`fetch`](Self::fetch) but fails with `RateLimitExceeded` instead of waiting.
    pub fn try_fetch(&mut self, config: &SourceConfig) -> Result<RawRecord> {
        self.fetch_inner(config, false)
    }

    fn fetch_inner(&mut self, config: &SourceConfig, governed: bool) -> Result<RawRecord> {
        let url = config.request_url()?;
        let shown = config.display_url();
        let headers = build_headers(config)?;

        let mut attempt: u32 = 0;
        loop {
            if governed {
                let waited = self.limiter.acquire();
                if !waited.is_zero() {
                    info!("waited {:?} for a rate-limit slot", waited);
                }
            } else {
                self.limiter.try_acquire()?;
            }

            debug!("GET {} (attempt {})", shown, attempt + 1);
            match self.request(&url, &shown, &headers) {
                Ok(raw) => return Ok(raw),
                Err(Retry::Retryable(e)) if attempt < config.max_retries => {
                    let backoff = BACKOFF_MS[(attempt as usize).min(BACKOFF_MS.len() - 1)];
                    warn!("{e}; retrying in {backoff} ms");
                    self.limiter.clock().sleep(Duration::from_millis(backoff));
                    attempt += 1;
                }
                Err(Retry::Retryable(e)) | Err(Retry::Fatal(e)) => return Err(e),
            }
        }
    }

    fn request(&self, url: &str, shown: &str, headers: &HeaderMap) -> Result<RawRecord, Retry> {
        let resp = self
            .http
            .get(url)
            .headers(headers.clone())
            .send()
            .map_err(|source| {
                Retry::Retryable(Error::Network {
                    url: shown.to_string(),
                    source: without_url(source),
                })
            })?;

        let status = resp.status();
        if !status.is_success() {
            let err = Error::Upstream {
                url: shown.to_string(),
                reason: format!("HTTP {status}"),
            };
            return Err(if status.is_server_error() {
                Retry::Retryable(err)
            } else {
                Retry::Fatal(err)
            });
        }

        let body = resp.bytes().map_err(|source| {
            Retry::Retryable(Error::Network {
                url: shown.to_string(),
                source: without_url(source),
            })
        })?;
        let payload = parse_envelope(&body).map_err(|reason| {
            Retry::Fatal(Error::Upstream {
                url: shown.to_string(),
                reason,
            })
        })?;

        info!("fetched {} bytes from {} (HTTP {})", body.len(), shown, status);
        Ok(RawRecord {
            payload,
            url: shown.to_string(),
            fetched_at: Local::now(),
            bytes: body.len(),
        })
    }
}

enum Retry {
    Retryable(Error),
    Fatal(Error),
}

// Strip the URL from transport errors; it may carry the API key.
fn without_url(e: reqwest::Error) -> reqwest::Error {
    e.without_url()
}

fn build_headers(config: &SourceConfig) -> Result<HeaderMap> {
    let key = config.api_key()?;
    let mut map = HeaderMap::new();
    for (name, template) in &config.headers {
        let value = config.render(template, key.as_deref())?;
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Config(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|e| Error::Config(format!("invalid value for header '{name}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Check the top-level shape of a response body and surface API error payloads.
///
/// Only the envelope is inspected; the observation records stay opaque.
pub fn parse_envelope(body: &[u8]) -> std::result::Result<Value, String> {
    let v: Value =
        serde_json::from_slice(body).map_err(|e| format!("response is not valid JSON: {e}"))?;
    match &v {
        Value::Object(obj) => {
            // FRED: {"error_code": 400, "error_message": "..."}; others use "error".
            for key in ["error_message", "error"] {
                if let Some(msg) = obj.get(key) {
                    return Err(format!("api error: {msg}"));
                }
            }
        }
        Value::Array(arr) => {
            // World Bank style: [{"message": [...]}] in position 0 on error.
            if arr.first().and_then(|m| m.get("message")).is_some() {
                return Err(format!("api error: {}", arr[0]));
            }
        }
        _ => return Err("unexpected response shape: expected a JSON object or array".into()),
    }
    Ok(v)
}
