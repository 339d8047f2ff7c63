//! Sign-in resolution and profile setup.
//!
//! Authentication itself is external; this module only decides whether an
//! authenticated account already has a profile and writes new or edited
//! profiles.

use std::sync::Arc;

use chatsync_proto::user::{User, UserId};
use chatsync_proto::validate::{ValidationError, validate_profile};

use crate::chat::Session;
use crate::error::{ChatError, Conflict};
use crate::media::{self, MediaStorage};
use crate::store::{Directory, DocumentStore};

/// Outcome of resolving an authenticated account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignIn {
    /// The account has a profile; a session can start.
    Existing(User),
    /// The account has no profile yet and must go through setup.
    NeedsSetup {
        /// Auth-provider id.
        id: UserId,
        /// Address the account signed in with.
        email: String,
    },
}

/// Input collected on the profile setup screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDraft {
    /// Display name.
    pub display_name: Option<String>,
    /// Free-form description.
    pub bio: Option<String>,
    /// Self-declared sex tag.
    pub sex_tag: Option<String>,
    /// Avatar image bytes.
    pub photo: Option<Vec<u8>>,
}

/// Creates and edits user profiles.
pub struct ProfileService<D, M> {
    directory: Arc<Directory<D>>,
    media: Arc<M>,
}

impl<D: DocumentStore, M: MediaStorage> ProfileService<D, M> {
    /// Creates a service over the shared directory and media storage.
    #[must_use]
    pub const fn new(directory: Arc<Directory<D>>, media: Arc<M>) -> Self {
        Self { directory, media }
    }

    /// Resolves an authenticated account to a profile or a setup request.
    ///
    /// # Errors
    ///
    /// [`ChatError::ReadFailed`] if the profile cannot be read.
    pub async fn resolve_sign_in(&self, id: &UserId, email: &str) -> Result<SignIn, ChatError> {
        match self.directory.get_user(id).await.map_err(ChatError::read)? {
            Some(user) => {
                tracing::info!(user_id = %id, "signed in with existing profile");
                Ok(SignIn::Existing(user))
            }
            None => {
                tracing::info!(user_id = %id, "signed in, profile setup required");
                Ok(SignIn::NeedsSetup {
                    id: id.clone(),
                    email: email.to_string(),
                })
            }
        }
    }

    /// Validates a draft, uploads the avatar to `avatars/{id}` and saves
    /// the profile.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Validation`] for a blank field or a missing photo
    /// - [`ChatError::Media`] if the avatar upload fails
    /// - [`ChatError::WriteFailed`] if the profile cannot be saved
    pub async fn setup_profile(
        &self,
        id: &UserId,
        email: &str,
        draft: ProfileDraft,
    ) -> Result<User, ChatError> {
        validate_profile(
            draft.display_name.as_deref(),
            draft.bio.as_deref(),
            draft.sex_tag.as_deref(),
        )?;
        let Some(photo) = draft.photo else {
            return Err(ValidationError::PhotoMissing.into());
        };

        let avatar_ref = self
            .media
            .upload(&media::avatar_key(id), photo, "image/jpeg")
            .await?;

        let user = User {
            id: id.clone(),
            display_name: draft.display_name.unwrap_or_default().trim().to_string(),
            email: email.to_string(),
            avatar_ref,
            bio: draft.bio.unwrap_or_default().trim().to_string(),
            sex_tag: draft.sex_tag.unwrap_or_default().trim().to_string(),
        };
        self.directory
            .save_user(&user)
            .await
            .map_err(ChatError::write)?;

        tracing::info!(user_id = %id, "profile created");
        Ok(user)
    }

    /// Saves edits to the session user's own profile.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Conflict`] with `NotOwner` when editing someone else
    /// - [`ChatError::Validation`] for a blank field
    /// - [`ChatError::WriteFailed`] if the profile cannot be saved
    pub async fn update_profile(&self, session: &mut Session, updated: User) -> Result<(), ChatError> {
        if updated.id != session.user.id {
            return Err(Conflict::NotOwner.into());
        }
        validate_profile(
            Some(&updated.display_name),
            Some(&updated.bio),
            Some(&updated.sex_tag),
        )?;
        self.directory
            .save_user(&updated)
            .await
            .map_err(ChatError::write)?;
        tracing::info!(user_id = %updated.id, "profile updated");
        session.user = updated;
        Ok(())
    }
}
