/// Optimistically synchronised ordered lists
///
/// Local edits land immediately; the matching server call runs afterwards
/// and a rejection restores the exact pre-mutation sequence.
use studio_api::ApiError;
use thiserror::Error;
use timerange::TimeRangeError;

mod id;
pub use id::*;

mod list;
pub use list::*;

mod synced;
pub use synced::*;

mod content;
pub use content::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error(transparent)]
    Range(#[from] TimeRangeError),
    #[error("invalid field: {0}")]
    Field(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    #[error("another change to this list is still being saved")]
    Busy,
    #[error("index {index} out of bounds for list of {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("item {0} not found")]
    NotFound(ItemId),
    #[error("item {0} has not been saved yet")]
    Unsaved(ItemId),
    #[error(transparent)]
    Invalid(#[from] PatchError),
    #[error(transparent)]
    Request(#[from] ApiError),
}

impl ListError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ListError::Request(err) if err.is_unauthorized())
    }

    /// Rejected locally before any request was sent.
    pub fn is_validation(&self) -> bool {
        !matches!(self, ListError::Request(_))
    }
}
