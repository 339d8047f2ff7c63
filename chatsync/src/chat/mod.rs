//! Chat lifecycle: requests, acceptance, rejection and messaging.
//!
//! [`ChatStateMachine`] drives a relationship through
//! `None → Waiting → Active` (or `Rejected`). Every multi-document write is
//! one atomic [`WriteBatch`], so a crash or network failure never leaves a
//! half-promoted chat or a message present in only one namespace.
//!
//! Submodules hold the reactive side:
//! - [`stream`] — per-chat message reconciliation
//! - [`read`] — viewed flags and unread counts
//! - [`lists`] — people and chat lists
//! - [`state`] — the relationship state enum

pub mod lists;
pub mod read;
pub mod state;
pub mod stream;

use std::sync::Arc;

use chatsync_proto::chat::{ChatRef, ChatRelationship, ChatStatus};
use chatsync_proto::document::{Document, IntoDocument};
use chatsync_proto::message::{
    IMAGE_SUMMARY_PLACEHOLDER, ImageBody, ImageSize, MAX_MESSAGE_SIZE, Message, MessageBody,
    MessageId,
};
use chatsync_proto::path::DocPath;
use chatsync_proto::user::{User, UserId};
use chatsync_proto::validate::ValidationError;
use serde_json::Value;

use crate::error::{ChatError, Conflict};
use crate::media::{self, DEFAULT_MAX_DOWNLOAD, MediaStorage};
use crate::store::{Directory, DocumentStore, StoreError, Subscription, WriteBatch};

pub use lists::{ChatEvent, ChatList, KeyedList, ListUpdate, UserDirectory};
pub use read::ReadTracker;
pub use state::RelationshipState;
pub use stream::{Applied, MessageReconciler, StreamEntry};

/// The signed-in user on whose behalf every operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Current user's profile.
    pub user: User,
}

impl Session {
    /// Starts a session for `user`.
    #[must_use]
    pub const fn new(user: User) -> Self {
        Self { user }
    }

    /// Current user's id.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user.id
    }
}

/// Tunables for the chat subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOptions {
    /// Guard `send_request` with store preconditions so two racing
    /// requests for the same pair cannot both succeed.
    pub unique_requests: bool,
    /// Summary written to the sender's own chat row for image messages.
    pub image_summary: String,
    /// Largest accepted text message, in bytes.
    pub max_message_size: usize,
    /// Largest image the reconciler downloads, in bytes.
    pub max_download: usize,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            unique_requests: false,
            image_summary: IMAGE_SUMMARY_PLACEHOLDER.to_string(),
            max_message_size: MAX_MESSAGE_SIZE,
            max_download: DEFAULT_MAX_DOWNLOAD,
        }
    }
}

/// Fields rewritten on both chat rows whenever a message is sent.
fn summary_patch(content: &str, sender: &UserId, message: &Message) -> Document {
    let mut doc = Document::new();
    doc.insert("lastMessage".into(), Value::from(content));
    doc.insert("lastSenderId".into(), Value::from(sender.as_str()));
    doc.insert(
        "lastMessageDate".into(),
        Value::from(message.sent_at.as_millis()),
    );
    doc
}

/// Drives relationship transitions and message sends for one session.
pub struct ChatStateMachine<D, M> {
    session: Session,
    directory: Arc<Directory<D>>,
    media: Arc<M>,
    options: ChatOptions,
}

impl<D: DocumentStore + 'static, M: MediaStorage> ChatStateMachine<D, M> {
    /// Creates a state machine with default options.
    #[must_use]
    pub fn new(session: Session, directory: Arc<Directory<D>>, media: Arc<M>) -> Self {
        Self {
            session,
            directory,
            media,
            options: ChatOptions::default(),
        }
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    /// The session this machine acts for.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// The shared directory.
    #[must_use]
    pub const fn directory(&self) -> &Arc<Directory<D>> {
        &self.directory
    }

    fn me(&self) -> &User {
        &self.session.user
    }

    fn ensure_owner(&self, chat: &ChatRelationship) -> Result<(), ChatError> {
        if chat.owner_id == self.me().id {
            Ok(())
        } else {
            Err(Conflict::NotOwner.into())
        }
    }

    fn validate(&self, message: &Message) -> Result<(), ChatError> {
        message.validate()?;
        if let MessageBody::Text(text) = &message.body
            && text.len() > self.options.max_message_size
        {
            return Err(ValidationError::TooLarge {
                size: text.len(),
                max: self.options.max_message_size,
            }
            .into());
        }
        Ok(())
    }

    /// Where the current user stands with `peer`.
    ///
    /// # Errors
    ///
    /// [`ChatError::ReadFailed`] if the store cannot be read.
    pub async fn relationship_state(&self, peer: &UserId) -> Result<RelationshipState, ChatError> {
        let me = &self.me().id;
        let dir = &self.directory;
        let active = dir
            .exists_relationship(me, peer, ChatStatus::Active)
            .await
            .map_err(ChatError::read)?;
        if active {
            return Ok(RelationshipState::Active);
        }
        let received = dir
            .exists_relationship(me, peer, ChatStatus::Waiting)
            .await
            .map_err(ChatError::read)?;
        let sent = dir
            .exists_relationship(peer, me, ChatStatus::Waiting)
            .await
            .map_err(ChatError::read)?;
        Ok(RelationshipState::from_rows(false, received, sent))
    }

    /// Sends a chat request with an initial text message to `to`.
    ///
    /// Creates a waiting row in the receiver's namespace plus the message,
    /// in one batch. The duplicate check is advisory unless
    /// [`ChatOptions::unique_requests`] is set.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Validation`] for an empty message or a self-request
    /// - [`ChatError::Conflict`] if a request or chat already exists
    /// - [`ChatError::WriteFailed`] / [`ChatError::ReadFailed`] on store errors
    pub async fn send_request(&self, to: &User, text: &str) -> Result<ChatRelationship, ChatError> {
        let me = self.me();
        if to.id == me.id {
            return Err(ValidationError::SelfChat.into());
        }
        let message = Message::text(me, text);
        self.validate(&message)?;

        match self.relationship_state(&to.id).await? {
            RelationshipState::Active => return Err(Conflict::AlreadyActive.into()),
            RelationshipState::WaitingSent | RelationshipState::WaitingReceived => {
                return Err(Conflict::RequestExists.into());
            }
            RelationshipState::None | RelationshipState::Rejected => {}
        }

        let waiting = ChatRelationship {
            owner_id: to.id.clone(),
            peer_id: me.id.clone(),
            peer_display_name: me.display_name.clone(),
            peer_avatar_ref: me.avatar_ref.clone(),
            last_message_content: text.to_string(),
            last_message_sender_id: me.id.clone(),
            last_message_at: message.sent_at,
            status: ChatStatus::Waiting,
        };
        let chat = waiting.chat_ref();
        let id = MessageId::generate();

        let mut batch = if self.options.unique_requests {
            WriteBatch::new()
                .require_missing(chat.doc_path())
                .require_missing(DocPath::chat(&me.id, ChatStatus::Waiting, &to.id))
                .require_missing(DocPath::chat(&me.id, ChatStatus::Active, &to.id))
        } else {
            WriteBatch::new()
        };
        batch
            .set(chat.doc_path(), waiting.to_document())
            .set(chat.messages_path().doc(id.as_str()), message.to_document());

        self.directory.commit(batch).await.map_err(|err| match err {
            StoreError::PreconditionFailed { .. } => Conflict::RequestExists.into(),
            other => ChatError::write(other),
        })?;

        tracing::info!(from = %me.id, to = %to.id, message_id = %id, "chat request sent");
        Ok(waiting)
    }

    /// Messages attached to a waiting request, oldest first.
    ///
    /// # Errors
    ///
    /// [`ChatError::Conflict`] for a row owned by someone else, or
    /// [`ChatError::ReadFailed`] on store errors.
    pub async fn waiting_chat_messages(
        &self,
        chat: &ChatRelationship,
    ) -> Result<Vec<Message>, ChatError> {
        self.ensure_owner(chat)?;
        let waiting = ChatRef::new(chat.owner_id.clone(), chat.peer_id.clone(), ChatStatus::Waiting);
        self.directory
            .list_messages(&waiting)
            .await
            .map_err(ChatError::read)
    }

    /// Accepts a waiting request, promoting it to an active chat for both
    /// participants.
    ///
    /// The waiting row and its messages are deleted, both active rows are
    /// created, and every message is copied into both active collections
    /// under its original id, all in one batch.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Conflict`] with `AlreadyActive` on a repeat accept,
    ///   `NotWaiting` if the request is gone, `NotOwner` for another
    ///   user's row
    /// - [`ChatError::WriteFailed`] / [`ChatError::ReadFailed`] on store errors
    pub async fn accept(&self, chat: &ChatRelationship) -> Result<ChatRelationship, ChatError> {
        self.ensure_owner(chat)?;
        let me = self.me();
        let waiting = ChatRef::new(me.id.clone(), chat.peer_id.clone(), ChatStatus::Waiting);
        let mine = ChatRef::new(me.id.clone(), chat.peer_id.clone(), ChatStatus::Active);
        let theirs = mine.mirrored();

        let Some(current) = self
            .directory
            .get_relationship(&waiting)
            .await
            .map_err(ChatError::read)?
        else {
            return Err(self.missing_waiting_conflict(&chat.peer_id).await);
        };
        let messages = self
            .directory
            .list_messages(&waiting)
            .await
            .map_err(ChatError::read)?;

        let active = ChatRelationship {
            status: ChatStatus::Active,
            ..current
        };
        let mirrored = ChatRelationship {
            owner_id: chat.peer_id.clone(),
            peer_id: me.id.clone(),
            peer_display_name: me.display_name.clone(),
            peer_avatar_ref: me.avatar_ref.clone(),
            status: ChatStatus::Active,
            ..active.clone()
        };

        let mut batch = WriteBatch::new()
            .require_exists(waiting.doc_path())
            .require_missing(mine.doc_path());
        for message in &messages {
            let Some(id) = &message.id else { continue };
            let doc = message.to_document();
            batch
                .delete(waiting.messages_path().doc(id.as_str()))
                .set(mine.messages_path().doc(id.as_str()), doc.clone())
                .set(theirs.messages_path().doc(id.as_str()), doc);
        }
        batch
            .delete(waiting.doc_path())
            .set(mine.doc_path(), active.to_document())
            .set(theirs.doc_path(), mirrored.to_document());

        match self.directory.commit(batch).await {
            Ok(()) => {}
            Err(StoreError::PreconditionFailed { .. }) => {
                return Err(self.missing_waiting_conflict(&chat.peer_id).await);
            }
            Err(err) => return Err(ChatError::write(err)),
        }

        tracing::info!(
            owner = %me.id,
            peer = %chat.peer_id,
            messages = messages.len(),
            "chat request accepted"
        );
        Ok(active)
    }

    /// Rejects a waiting request, deleting it and its messages.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Conflict`] with `NotWaiting` if the row is not a
    ///   pending request, `NotOwner` for another user's row
    /// - [`ChatError::WriteFailed`] / [`ChatError::ReadFailed`] on store errors
    pub async fn reject(&self, chat: &ChatRelationship) -> Result<(), ChatError> {
        self.ensure_owner(chat)?;
        if chat.status != ChatStatus::Waiting {
            return Err(Conflict::NotWaiting.into());
        }
        let waiting = chat.chat_ref();
        let messages = self
            .directory
            .list_messages(&waiting)
            .await
            .map_err(ChatError::read)?;

        let mut batch = WriteBatch::new().require_exists(waiting.doc_path());
        for id in messages.iter().filter_map(|m| m.id.as_ref()) {
            batch.delete(waiting.messages_path().doc(id.as_str()));
        }
        batch.delete(waiting.doc_path());

        self.directory.commit(batch).await.map_err(|err| match err {
            StoreError::PreconditionFailed { .. } => Conflict::NotWaiting.into(),
            other => ChatError::write(other),
        })?;

        tracing::info!(owner = %chat.owner_id, peer = %chat.peer_id, "chat request rejected");
        Ok(())
    }

    /// Sends a message in an active chat.
    ///
    /// The message lands in both participants' collections and both chat
    /// rows get a new summary, in one batch. For images the sender's row
    /// shows [`ChatOptions::image_summary`] while the peer's row gets the
    /// raw (empty) content.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Validation`] for an invalid body
    /// - [`ChatError::Conflict`] with `NotActive` if the chat is not active
    /// - [`ChatError::WriteFailed`] on store errors
    pub async fn send_message(
        &self,
        chat: &ChatRelationship,
        body: MessageBody,
    ) -> Result<Message, ChatError> {
        let message = Message::pending(self.me(), body);
        self.send_prepared(chat, message).await
    }

    /// Sends an already built pending message, typically one shown as a
    /// local echo through [`MessageReconciler::insert_pending`].
    ///
    /// # Errors
    ///
    /// As [`send_message`](Self::send_message).
    pub async fn send_prepared(
        &self,
        chat: &ChatRelationship,
        message: Message,
    ) -> Result<Message, ChatError> {
        self.ensure_owner(chat)?;
        if chat.status != ChatStatus::Active {
            return Err(Conflict::NotActive.into());
        }
        self.validate(&message)?;

        let me = &self.me().id;
        let mine = chat.chat_ref();
        let theirs = mine.mirrored();
        let id = MessageId::generate();
        let doc = message.to_document();

        let mut batch = WriteBatch::new()
            .require_exists(mine.doc_path())
            .require_exists(theirs.doc_path());
        batch
            .set(mine.messages_path().doc(id.as_str()), doc.clone())
            .set(theirs.messages_path().doc(id.as_str()), doc)
            .update(
                mine.doc_path(),
                summary_patch(&message.summary(&self.options.image_summary), me, &message),
            )
            .update(
                theirs.doc_path(),
                summary_patch(message.body.raw_content(), me, &message),
            );

        self.directory.commit(batch).await.map_err(|err| match err {
            StoreError::PreconditionFailed { .. } => Conflict::NotActive.into(),
            other => ChatError::write(other),
        })?;

        tracing::debug!(chat = %mine, message_id = %id, "message sent");
        Ok(message.with_id(id))
    }

    /// Convenience wrapper for a text message.
    ///
    /// # Errors
    ///
    /// As [`send_message`](Self::send_message).
    pub async fn send_text(&self, chat: &ChatRelationship, text: &str) -> Result<Message, ChatError> {
        self.send_message(chat, MessageBody::Text(text.to_string())).await
    }

    /// Uploads an image and sends it as a message.
    ///
    /// Nothing is written to the store if the upload fails.
    ///
    /// # Errors
    ///
    /// [`ChatError::Media`] if the upload fails, otherwise as
    /// [`send_message`](Self::send_message).
    pub async fn send_image(
        &self,
        chat: &ChatRelationship,
        bytes: Vec<u8>,
        size: ImageSize,
    ) -> Result<Message, ChatError> {
        self.ensure_owner(chat)?;
        if chat.status != ChatStatus::Active {
            return Err(Conflict::NotActive.into());
        }
        let pending = Message::image(self.me(), String::new(), size);
        let key = media::chat_image_key(&chat.peer_id, &self.me().id, pending.sent_at);
        let url = self.media.upload(&key, bytes, "image/jpeg").await?;
        tracing::debug!(key = %key, "chat image uploaded");

        let message = Message {
            body: MessageBody::Image(ImageBody {
                url,
                placeholder: size,
            }),
            ..pending
        };
        self.send_prepared(chat, message).await
    }

    /// Opens an active chat: subscribes to its messages and returns a
    /// reconciler bound to that subscription.
    ///
    /// # Errors
    ///
    /// [`ChatError::Conflict`] if the row is not active or not owned by the
    /// current user, [`ChatError::ReadFailed`] if the listener cannot be
    /// attached.
    pub fn open_chat(&self, chat: &ChatRelationship) -> Result<OpenChat<D, M>, ChatError> {
        self.ensure_owner(chat)?;
        if chat.status != ChatStatus::Active {
            return Err(Conflict::NotActive.into());
        }
        let chat_ref = chat.chat_ref();
        let subscription = self
            .directory
            .subscribe_messages(&chat_ref)
            .map_err(ChatError::read)?;
        let tracker = ReadTracker::new(Arc::clone(&self.directory), self.me().id.clone());
        let reconciler = MessageReconciler::new(
            chat_ref,
            tracker,
            Arc::clone(&self.media),
            self.options.max_download,
        );
        Ok(OpenChat {
            subscription,
            reconciler,
        })
    }

    /// Live feed of one of the current user's chat buckets.
    ///
    /// # Errors
    ///
    /// [`ChatError::ReadFailed`] if the listener cannot be attached.
    pub fn subscribe_chats(
        &self,
        status: ChatStatus,
    ) -> Result<Subscription<ChatRelationship>, ChatError> {
        self.directory
            .subscribe_relationships(&self.me().id, status)
            .map_err(ChatError::read)
    }

    /// Live feed of every user.
    ///
    /// # Errors
    ///
    /// [`ChatError::ReadFailed`] if the listener cannot be attached.
    pub fn subscribe_people(&self) -> Result<Subscription<User>, ChatError> {
        self.directory.subscribe_users().map_err(ChatError::read)
    }

    /// A read tracker for the current user.
    #[must_use]
    pub fn read_tracker(&self) -> ReadTracker<D> {
        ReadTracker::new(Arc::clone(&self.directory), self.me().id.clone())
    }

    async fn missing_waiting_conflict(&self, peer: &UserId) -> ChatError {
        match self
            .directory
            .exists_relationship(&self.me().id, peer, ChatStatus::Active)
            .await
        {
            Ok(true) => Conflict::AlreadyActive.into(),
            Ok(false) => Conflict::NotWaiting.into(),
            Err(err) => ChatError::read(err),
        }
    }
}

/// An open chat view: the message subscription plus its reconciler.
///
/// Call [`close`](Self::close) when the view goes away.
pub struct OpenChat<D, M> {
    subscription: Subscription<Message>,
    reconciler: MessageReconciler<D, M>,
}

impl<D: DocumentStore + 'static, M: MediaStorage> OpenChat<D, M> {
    /// Waits for the next change batch and reconciles it.
    ///
    /// Returns `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<Vec<Applied>> {
        self.reconciler.pump(&mut self.subscription).await
    }

    /// Reconciles every batch already queued, without waiting.
    pub async fn drain(&mut self) -> Vec<Applied> {
        let changes = lists::drain(&mut self.subscription);
        self.reconciler.apply_all(changes).await
    }

    /// The reconciled message list.
    #[must_use]
    pub const fn reconciler(&self) -> &MessageReconciler<D, M> {
        &self.reconciler
    }

    /// Mutable access, e.g. for local echoes.
    pub const fn reconciler_mut(&mut self) -> &mut MessageReconciler<D, M> {
        &mut self.reconciler
    }

    /// Releases the subscription, waits for pending read receipts and
    /// returns the final message list.
    pub async fn close(self) -> MessageReconciler<D, M> {
        let Self {
            subscription,
            mut reconciler,
        } = self;
        subscription.release();
        reconciler.settle().await;
        reconciler
    }
}
