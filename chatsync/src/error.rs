//! Error taxonomy surfaced to the presentation layer.
//!
//! Every variant carries a [`user_message`](ChatError::user_message) so the
//! caller can show something meaningful without matching on internals.

use chatsync_proto::validate::ValidationError;

use crate::media::MediaError;
use crate::store::StoreError;

/// A state transition that does not fit the relationship's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Conflict {
    /// A waiting request for this pair already exists.
    #[error("a request to this user is already pending")]
    RequestExists,
    /// The pair already has an active chat.
    #[error("the chat is already active")]
    AlreadyActive,
    /// The operation needs a waiting relationship.
    #[error("the relationship is not waiting")]
    NotWaiting,
    /// The operation needs an active relationship.
    #[error("the relationship is not active")]
    NotActive,
    /// The row belongs to another user's namespace.
    #[error("the relationship belongs to another user")]
    NotOwner,
}

/// Errors returned by chat and profile operations.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// User input was rejected before touching the store.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The referenced user, relationship or message does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is not allowed in the current state.
    #[error("conflict: {0}")]
    Conflict(#[from] Conflict),

    /// The store rejected or could not apply a write.
    #[error("store write failed: {0}")]
    WriteFailed(StoreError),

    /// The store could not serve a read.
    #[error("store read failed: {0}")]
    ReadFailed(StoreError),

    /// Media upload or download failed.
    #[error(transparent)]
    Media(#[from] MediaError),
}

impl ChatError {
    /// Wraps a failed read.
    #[must_use]
    pub const fn read(err: StoreError) -> Self {
        Self::ReadFailed(err)
    }

    /// Wraps a failed write.
    #[must_use]
    pub const fn write(err: StoreError) -> Self {
        Self::WriteFailed(err)
    }

    /// Whether retrying the same call later could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WriteFailed(StoreError::Unavailable(_) | StoreError::Timeout(_))
                | Self::ReadFailed(StoreError::Unavailable(_) | StoreError::Timeout(_))
        )
    }

    /// Text suitable for showing to the user.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Validation(err) => err.user_message(),
            Self::NotFound(_) => "It no longer exists",
            Self::Conflict(Conflict::RequestExists) => "You have already sent a request",
            Self::Conflict(Conflict::AlreadyActive) => "You are already chatting",
            Self::Conflict(Conflict::NotWaiting) => "This request is no longer pending",
            Self::Conflict(Conflict::NotActive) => "This chat is not active",
            Self::Conflict(Conflict::NotOwner) => "You cannot change another user's data",
            Self::WriteFailed(_) => "Could not save, try again",
            Self::ReadFailed(_) => "Could not load data, try again",
            Self::Media(MediaError::TooLarge { .. }) => "The image is too large",
            Self::Media(_) => "Could not transfer the image",
        }
    }
}
