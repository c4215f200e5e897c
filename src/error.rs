//! Error conditions surfaced by the grading pipeline.
//!
//! Every variant is recoverable: callers display it and let the user retry
//! from the step that failed.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which request budget ran out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaDenial {
    DailyExceeded,
    MonthlyExceeded,
}

impl fmt::Display for QuotaDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaDenial::DailyExceeded => write!(f, "Global daily rate limit reached"),
            QuotaDenial::MonthlyExceeded => write!(f, "Global monthly rate limit reached"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GradeError {
    /// Input image missing or undecodable.
    #[error("image not available at {}: {reason}", path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    /// Drawing, font or encoding problem.
    #[error("render failure: {0}")]
    RenderFailure(String),

    /// Request budget exhausted; raised before the model is called.
    #[error("{0}")]
    QuotaExceeded(QuotaDenial),

    /// The model answered, but not with a usable answer sheet.
    #[error("malformed model response: {0}")]
    UpstreamMalformed(String),

    /// The model request itself failed.
    #[error("model request failed: {0}")]
    UpstreamFailure(String),

    /// A session action that is not valid in the current state.
    #[error("cannot {action} while session is {state}")]
    InvalidTransition { state: String, action: &'static str },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl GradeError {
    pub(crate) fn source_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        GradeError::SourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn render(reason: impl ToString) -> Self {
        GradeError::RenderFailure(reason.to_string())
    }

    /// Quota denials are final for the current period; retrying will not help.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GradeError::QuotaExceeded(_))
    }
}
