/// AI generation jobs
///
/// A [`GenerationTask`] walks `Idle -> Submitting -> (Processing ->) Completed | Failed`.
/// Transitions are plain methods on the task; [`PollRunner`] drives them
/// against a [`GenerationBackend`] and a [`Timer`].
use serde::{Deserialize, Serialize};
use studio_api::ApiError;
use thiserror::Error;

mod backend;
pub use backend::*;

mod poll;
pub use poll::*;

mod task;
pub use task::*;

mod timer;
pub use timer::*;

/// Message reported when the poll ceiling is reached
pub const TIMEOUT_MESSAGE: &str = "generation timed out";

/// Fallback when the server gave no usable text
pub const FALLBACK_MESSAGE: &str = "generation failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Server reported a terminal failure status
    ServerStatus,
    /// Server attached an explicit error message
    ServerMessage,
    /// Poll ceiling reached
    Timeout,
    /// Submit or poll request itself failed
    Request,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("{message}")]
    GenerationFailed {
        message: String,
        reason: FailureReason,
    },

    #[error("generation cancelled")]
    Cancelled,

    #[error("unauthorized")]
    Unauthorized,

    #[error("cannot {action} while the task is {status}")]
    InvalidTransition {
        action: &'static str,
        status: TaskStatus,
    },
}

impl GenerationError {
    pub fn failed(message: impl Into<String>, reason: FailureReason) -> Self {
        GenerationError::GenerationFailed {
            message: message.into(),
            reason,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GenerationError::Unauthorized)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            GenerationError::GenerationFailed {
                reason: FailureReason::Timeout,
                ..
            }
        )
    }

    /// Rejected before anything was sent.
    pub fn is_validation(&self) -> bool {
        matches!(self, GenerationError::EmptyPrompt)
    }

    pub(crate) fn from_request(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => GenerationError::Unauthorized,
            other => GenerationError::failed(
                other.user_message(FALLBACK_MESSAGE),
                FailureReason::Request,
            ),
        }
    }
}
