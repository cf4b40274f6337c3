use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Boxed error used for the various writer/reader failures behind `Persistence`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the fetch and transform core.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure (DNS, connect, timeout, truncated body).
    #[error("network error while requesting {url}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status or a response body that is not the expected envelope.
    #[error("upstream error from {url}: {reason}")]
    Upstream { url: String, reason: String },

    /// Only raised on the ungoverned request path; the governed path waits instead.
    #[error("rate limit of {max_requests} requests per {window:?} reached, next slot in {retry_after:?}")]
    RateLimitExceeded {
        max_requests: usize,
        window: Duration,
        retry_after: Duration,
    },

    #[error(
        "normalization produced no usable rows ({seen} records seen, {invalid} invalid, {filtered} filtered out)"
    )]
    EmptyDataset {
        seen: usize,
        invalid: usize,
        filtered: usize,
    },

    /// Writing or reading an artifact file failed.
    #[error("persistence error at {}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown source '{name}' (configured: {available})")]
    UnknownSource { name: String, available: String },
}

impl Error {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Error::Persistence {
            path: path.into(),
            source: source.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
