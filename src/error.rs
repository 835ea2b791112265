use thiserror::Error;

#[derive(Error, Debug)]
pub enum PagerError {
    #[error("Fetch failed for {target}: {reason}")]
    FetchFailure { target: String, reason: String },

    #[error("Invalid navigation target: {reason}")]
    InvalidTarget { reason: String },

    #[error("Corrupt verse sequence: {reason}")]
    CorruptVerseSequence { reason: String },

    #[error("Configuration error: {reason}")]
    Config { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP status error: {status}")]
    HttpStatus { status: u16 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl PagerError {
    pub fn fetch(target: impl Into<String>, reason: impl ToString) -> Self {
        PagerError::FetchFailure {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_target(reason: impl Into<String>) -> Self {
        PagerError::InvalidTarget {
            reason: reason.into(),
        }
    }

    pub fn corrupt(reason: impl Into<String>) -> Self {
        PagerError::CorruptVerseSequence {
            reason: reason.into(),
        }
    }

    /// True when the caller can reasonably offer a retry.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, PagerError::FetchFailure { .. })
    }

    /// Collapses any collaborator error into a `FetchFailure` for `target`.
    pub(crate) fn into_fetch_failure(self, target: impl Into<String>) -> Self {
        match self {
            err @ PagerError::FetchFailure { .. } => err,
            other => PagerError::fetch(target, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, PagerError>;
