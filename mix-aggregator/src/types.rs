use bytes::Bytes;
use chrono::{DateTime, Utc};
use interfaces::{FetchOpt, SourceType};

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchOpt::default().into()
    }
}

impl From<FetchOpt> for FetchConfig {
    fn from(opt: FetchOpt) -> Self {
        Self {
            user_agent: opt.user_agent,
            timeout_seconds: opt.timeout_seconds,
            max_retries: opt.max_retries,
            retry_delay_seconds: opt.retry_delay_seconds,
        }
    }
}

/// Point-in-time view of a cached source.
///
/// `data` shares the cached buffer; a later refresh swaps in a new buffer
/// instead of writing into this one.
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    pub name: String,
    pub url: String,
    pub source_type: SourceType,
    pub data: Bytes,
    pub updated_at: DateTime<Utc>,
}

impl SourceSnapshot {
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MixError {
    #[error("source not found: {name}")]
    SourceNotFound { name: String },

    #[error("too many errors for source {name}, retry in {retry_in_secs}s")]
    BackoffActive { name: String, retry_in_secs: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported URI scheme: {0}")]
    UnsupportedLocator(String),

    #[error("refresh of source {name} failed: {message}")]
    Fetch { name: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("merge error: {0}")]
    Merge(String),

    #[error("mixing {field}: {source}")]
    Rule {
        field: String,
        #[source]
        source: Box<MixError>,
    },
}

impl MixError {
    pub fn in_rule(self, field: impl Into<String>) -> Self {
        MixError::Rule {
            field: field.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping rule context.
    pub fn root(&self) -> &MixError {
        match self {
            MixError::Rule { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self.root(),
            MixError::Http(_)
                | MixError::Status { .. }
                | MixError::Io(_)
                | MixError::InvalidUrl(_)
                | MixError::UnsupportedLocator(_)
                | MixError::Fetch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MixError>;
