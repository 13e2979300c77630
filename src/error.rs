//! Mimir error types

use std::fmt;
use std::time::Duration;

/// Pipeline stage that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Embedding,
    Search,
    Generation,
}

impl Stage {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Embedding => "embedding",
            Stage::Search => "search",
            Stage::Generation => "generation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mimir error types
///
/// Backend clients return the low-level variants (`Http`, `Api`, ...). The
/// orchestrator wraps them in the stage variant that failed, so callers can
/// branch on [`stage()`](Self::stage) without parsing messages.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MimirError {
    // Pipeline stage failures
    #[error("embedding stage failed: {0}")]
    Embedding(#[source] Box<MimirError>),

    #[error("search stage failed: {0}")]
    Search(#[source] Box<MimirError>),

    #[error("generation stage failed: {0}")]
    Generation(#[source] Box<MimirError>),

    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    // Backend/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("empty response from backend")]
    EmptyResponse,

    /// Generated output ended before the backend signalled completion.
    #[error("truncated output: {0}")]
    Truncated(String),

    #[error("LLM error: {0}")]
    Llm(String),

    /// Shared cache tier failure. Absorbed inside the tiered cache.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("data error: {0}")]
    DataError(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MimirError {
    /// Wrap a backend failure as an embedding-stage error.
    pub fn embedding(cause: MimirError) -> Self {
        MimirError::Embedding(Box::new(cause))
    }

    /// Wrap a backend failure as a search-stage error.
    pub fn search(cause: MimirError) -> Self {
        MimirError::Search(Box::new(cause))
    }

    /// Wrap a backend failure as a generation-stage error.
    pub fn generation(cause: MimirError) -> Self {
        MimirError::Generation(Box::new(cause))
    }

    /// Wrap `cause` in the variant for `stage`.
    pub fn at_stage(stage: Stage, cause: MimirError) -> Self {
        match stage {
            Stage::Embedding => Self::embedding(cause),
            Stage::Search => Self::search(cause),
            Stage::Generation => Self::generation(cause),
        }
    }

    /// Stage that failed, if this error came out of the pipeline.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            MimirError::Embedding(_) => Some(Stage::Embedding),
            MimirError::Search(_) => Some(Stage::Search),
            MimirError::Generation(_) => Some(Stage::Generation),
            _ => None,
        }
    }

    /// Underlying backend failure for stage errors; `self` otherwise.
    pub fn cause(&self) -> &MimirError {
        match self {
            MimirError::Embedding(inner)
            | MimirError::Search(inner)
            | MimirError::Generation(inner) => inner.cause(),
            other => other,
        }
    }

    /// Whether the caller may reasonably retry the same request.
    ///
    /// The core never retries on its own. Every stage failure is surfaced
    /// as retryable; inspect [`cause`](Self::cause) to tell an outage from
    /// a rejected input.
    pub fn is_retryable(&self) -> bool {
        match self {
            MimirError::Embedding(_)
            | MimirError::Search(_)
            | MimirError::Generation(_)
            | MimirError::RequestTimeout(_) => true,
            other => other.is_transient(),
        }
    }

    /// Whether this low-level error is likely to go away on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            MimirError::Http(_)
            | MimirError::Timeout(_)
            | MimirError::RequestTimeout(_)
            | MimirError::EmptyResponse
            | MimirError::Truncated(_)
            | MimirError::CacheUnavailable(_) => true,
            MimirError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for MimirError {
    fn from(err: serde_json::Error) -> Self {
        MimirError::Json(err.to_string())
    }
}

impl From<llm::error::LLMError> for MimirError {
    fn from(err: llm::error::LLMError) -> Self {
        let msg = err.to_string();
        if msg.contains("rate limit") || msg.contains("429") {
            MimirError::Api {
                status: 429,
                message: msg,
            }
        } else if msg.contains("authentication")
            || msg.contains("401")
            || msg.contains("invalid api key")
        {
            MimirError::Configuration(msg)
        } else {
            MimirError::Llm(msg)
        }
    }
}

/// Result type alias for Mimir operations
pub type Result<T> = std::result::Result<T, MimirError>;
