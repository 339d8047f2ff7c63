//! Viewed flags and unread counts.
//!
//! A message is marked viewed on the recipient's copy only; the sender's
//! copy keeps `isViewed = false` forever. Marking is idempotent.

use std::sync::Arc;

use tokio::task::JoinHandle;

use chatsync_proto::chat::{ChatRef, ChatStatus};
use chatsync_proto::document::viewed_patch;
use chatsync_proto::message::{Message, MessageId};
use chatsync_proto::path::DocPath;
use chatsync_proto::user::UserId;

use crate::error::ChatError;
use crate::store::{Directory, DocumentStore, StoreError, WriteBatch};

/// Counts messages from someone other than `me` that are still unviewed.
#[must_use]
pub fn unread_count<'a, I>(messages: I, me: &UserId) -> usize
where
    I: IntoIterator<Item = &'a Message>,
{
    messages
        .into_iter()
        .filter(|m| !m.is_viewed && m.sender_id != *me)
        .count()
}

/// Marks messages viewed on the current user's copy.
pub struct ReadTracker<D> {
    directory: Arc<Directory<D>>,
    owner: UserId,
}

impl<D> Clone for ReadTracker<D> {
    fn clone(&self) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
            owner: self.owner.clone(),
        }
    }
}

impl<D: DocumentStore + 'static> ReadTracker<D> {
    /// Creates a tracker acting for `owner`.
    #[must_use]
    pub const fn new(directory: Arc<Directory<D>>, owner: UserId) -> Self {
        Self { directory, owner }
    }

    /// Sets `isViewed` on `owner`'s copy of message `id` in `chat`.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotFound`] if the message is gone, or
    /// [`ChatError::WriteFailed`] if the update could not be applied.
    pub async fn mark_viewed_id(&self, chat: &ChatRef, id: &MessageId) -> Result<(), ChatError> {
        let path = DocPath::message(&self.owner, chat.status, &chat.peer, id);
        let mut batch = WriteBatch::new();
        batch.update(path.clone(), viewed_patch());
        match self.directory.commit(batch).await {
            Ok(()) => {
                tracing::debug!(message_id = %id, chat = %chat, "message marked viewed");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Err(ChatError::NotFound(path.to_string())),
            Err(err) => Err(ChatError::write(err)),
        }
    }

    /// Marks `message` viewed if it is an unviewed message from the peer.
    ///
    /// Own messages and already viewed messages are left untouched.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotFound`] for a message without an id, otherwise as
    /// [`mark_viewed_id`](Self::mark_viewed_id).
    pub async fn mark_viewed(&self, chat: &ChatRef, message: &Message) -> Result<(), ChatError> {
        let Some(id) = &message.id else {
            return Err(ChatError::NotFound("message has not been persisted".into()));
        };
        if message.is_viewed || message.sender_id == self.owner {
            return Ok(());
        }
        self.mark_viewed_id(chat, id).await
    }

    /// Marks a message viewed in the background.
    ///
    /// Failures are logged and not retried.
    #[must_use = "await the handle to know when the flag has been written"]
    pub fn spawn_mark_viewed(&self, chat: ChatRef, id: MessageId) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            if let Err(err) = tracker.mark_viewed_id(&chat, &id).await {
                tracing::warn!(message_id = %id, chat = %chat, error = %err, "failed to mark message viewed");
            }
        })
    }

    /// Unread messages in one of the owner's active chats.
    ///
    /// # Errors
    ///
    /// [`ChatError::ReadFailed`] if the messages cannot be listed.
    pub async fn unread_in(&self, peer: &UserId) -> Result<usize, ChatError> {
        let chat = ChatRef::new(self.owner.clone(), peer.clone(), ChatStatus::Active);
        let messages = self
            .directory
            .list_messages(&chat)
            .await
            .map_err(ChatError::read)?;
        Ok(unread_count(&messages, &self.owner))
    }
}
