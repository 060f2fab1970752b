/// Short-play authoring engine
///
/// The [`Orchestrator`] owns the scene lists, the generation tasks and the
/// selection; everything outside (HTTP, storage, toasts) comes in as a port.
use generation::{GenerationError, GenerationKind};
use optimistic::{ItemId, ListError};
use studio_api::ApiError;
use thiserror::Error;

mod config;
pub use config::*;

pub mod endpoints;

mod guard;
pub use guard::*;

mod orchestrator;
pub use orchestrator::*;

mod voices;
pub use voices::*;

pub use generation;
pub use optimistic;
pub use scene_cache;
pub use studio_api;
pub use timerange;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StudioError {
    #[error("no series selected")]
    NoSeriesSelected,

    #[error("no scene selected")]
    NoSceneSelected,

    #[error("a {kind} generation is already running for scene {scene}")]
    GenerationInFlight { kind: GenerationKind, scene: String },

    #[error("{category} list does not hold that kind of item")]
    WrongList { category: ListCategory },

    #[error("item {0} has not been saved yet")]
    Unsaved(ItemId),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    List(#[from] ListError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

pub type Result<T> = std::result::Result<T, StudioError>;

impl StudioError {
    pub fn is_unauthorized(&self) -> bool {
        match self {
            StudioError::Api(err) => err.is_unauthorized(),
            StudioError::List(err) => err.is_unauthorized(),
            StudioError::Generation(err) => err.is_unauthorized(),
            _ => false,
        }
    }

    /// Caught locally; nothing reached the server.
    pub fn is_validation(&self) -> bool {
        match self {
            StudioError::Api(_) => false,
            StudioError::List(err) => err.is_validation(),
            StudioError::Generation(err) => err.is_validation(),
            _ => true,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StudioError::Generation(GenerationError::Cancelled))
    }

    /// Toast text: the server's message when there is one, else `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            StudioError::Api(err) | StudioError::List(ListError::Request(err)) => {
                err.user_message(fallback)
            }
            StudioError::Generation(GenerationError::GenerationFailed { message, .. })
                if !message.trim().is_empty() =>
            {
                message.clone()
            }
            StudioError::Generation(_) => fallback.to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_seen_through_layers() {
        assert!(StudioError::Api(ApiError::Unauthorized).is_unauthorized());
        assert!(StudioError::List(ListError::Request(ApiError::Unauthorized)).is_unauthorized());
        assert!(StudioError::Generation(GenerationError::Unauthorized).is_unauthorized());
        assert!(!StudioError::NoSceneSelected.is_unauthorized());
    }

    #[test]
    fn test_user_message() {
        let err = StudioError::List(ListError::Request(ApiError::rejected(3, "locked")));
        assert_eq!(err.user_message("Save failed"), "locked");
        let err = StudioError::Api(ApiError::Transport("reset".into()));
        assert_eq!(err.user_message("Save failed"), "Save failed");
        let err = StudioError::Generation(GenerationError::failed(
            "generation timed out",
            generation::FailureReason::Timeout,
        ));
        assert_eq!(err.user_message("Generation failed"), "generation timed out");
    }

    #[test]
    fn test_validation_classification() {
        assert!(StudioError::NoSceneSelected.is_validation());
        assert!(StudioError::Generation(GenerationError::EmptyPrompt).is_validation());
        assert!(StudioError::List(ListError::Busy).is_validation());
        assert!(!StudioError::Api(ApiError::rejected(1, "x")).is_validation());
        assert!(!StudioError::Generation(GenerationError::Cancelled).is_validation());
    }
}
