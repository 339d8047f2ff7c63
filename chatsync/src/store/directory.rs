//! Typed directory of users, chat relationships and messages.
//!
//! [`Directory`] is the sole writer of canonical state. It translates
//! between model types and documents, routes every call through the
//! [`StoreGuard`], and hands out typed [`Subscription`]s.

use chatsync_proto::chat::{ChatRef, ChatRelationship, ChatStatus};
use chatsync_proto::document::{Document, FromDocument, IntoDocument};
use chatsync_proto::message::Message;
use chatsync_proto::path::{CollectionPath, DocPath};
use chatsync_proto::user::{User, UserId};

use crate::retry::StoreGuard;

use super::{DocumentStore, StoreError, Subscription, WriteBatch};

fn decode<T: FromDocument>(path: &DocPath, doc: &Document) -> Result<T, StoreError> {
    T::from_document(path, doc).map_err(|e| StoreError::Malformed(e.to_string()))
}

/// Typed facade over a [`DocumentStore`].
pub struct Directory<D> {
    store: D,
    guard: StoreGuard,
}

impl<D: DocumentStore> Directory<D> {
    /// Wraps `store` with the default timeout and retry policy.
    #[must_use]
    pub fn new(store: D) -> Self {
        Self::with_guard(store, StoreGuard::default())
    }

    /// Wraps `store` with an explicit guard.
    #[must_use]
    pub const fn with_guard(store: D, guard: StoreGuard) -> Self {
        Self { store, guard }
    }

    /// The underlying backend.
    #[must_use]
    pub const fn store(&self) -> &D {
        &self.store
    }

    /// The timeout and retry policy applied to every call.
    #[must_use]
    pub const fn guard(&self) -> &StoreGuard {
        &self.guard
    }

    // -- Users --

    /// Fetches a user profile.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails or the profile is malformed.
    pub async fn get_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let path = DocPath::user(id);
        let doc = self.guard.read("get_user", || self.store.get(&path)).await?;
        doc.map(|d| decode(&path, &d)).transpose()
    }

    /// Creates or overwrites a user profile.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    pub async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.set(DocPath::user(&user.id), user.to_document());
        self.commit(batch).await?;
        tracing::debug!(user_id = %user.id, "user profile saved");
        Ok(())
    }

    /// Lists every registered user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails. Undecodable profiles are
    /// skipped.
    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = CollectionPath::users();
        let docs = self.guard.read("list_users", || self.store.list(&users)).await?;
        Ok(decode_all(docs))
    }

    /// Live feed of the users collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the listener cannot be attached.
    pub fn subscribe_users(&self) -> Result<Subscription<User>, StoreError> {
        self.subscribe(CollectionPath::users())
    }

    // -- Relationships --

    /// Live feed of `owner`'s relationships in one bucket.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the listener cannot be attached.
    pub fn subscribe_relationships(
        &self,
        owner: &UserId,
        status: ChatStatus,
    ) -> Result<Subscription<ChatRelationship>, StoreError> {
        self.subscribe(CollectionPath::chats(owner, status))
    }

    /// Whether `owner` has a relationship with `peer` in `status`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails.
    pub async fn exists_relationship(
        &self,
        owner: &UserId,
        peer: &UserId,
        status: ChatStatus,
    ) -> Result<bool, StoreError> {
        let path = DocPath::chat(owner, status, peer);
        let doc = self
            .guard
            .read("exists_relationship", || self.store.get(&path))
            .await?;
        Ok(doc.is_some())
    }

    /// Fetches one relationship row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails or the row is malformed.
    pub async fn get_relationship(
        &self,
        chat: &ChatRef,
    ) -> Result<Option<ChatRelationship>, StoreError> {
        let path = chat.doc_path();
        let doc = self
            .guard
            .read("get_relationship", || self.store.get(&path))
            .await?;
        doc.map(|d| decode(&path, &d)).transpose()
    }

    // -- Messages --

    /// Live feed of one chat's messages.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the listener cannot be attached.
    pub fn subscribe_messages(&self, chat: &ChatRef) -> Result<Subscription<Message>, StoreError> {
        self.subscribe(chat.messages_path())
    }

    /// Reads every message of a chat, ordered by send time then id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails. Undecodable messages are
    /// skipped.
    pub async fn list_messages(&self, chat: &ChatRef) -> Result<Vec<Message>, StoreError> {
        let collection = chat.messages_path();
        let docs = self
            .guard
            .read("list_messages", || self.store.list(&collection))
            .await?;
        let mut messages: Vec<Message> = decode_all(docs);
        messages.sort_by(|a, b| (a.sent_at, &a.id).cmp(&(b.sent_at, &b.id)));
        Ok(messages)
    }

    // -- Writes --

    /// Applies `batch` atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the batch is rejected; nothing is written
    /// in that case.
    pub async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let ops = batch.len();
        self.guard
            .write("commit", || self.store.commit(batch.clone()))
            .await?;
        tracing::trace!(ops, "batch committed");
        Ok(())
    }

    fn subscribe<T: FromDocument>(
        &self,
        collection: CollectionPath,
    ) -> Result<Subscription<T>, StoreError> {
        let listener = self.store.listen(&collection)?;
        tracing::debug!(collection = %collection, "subscription attached");
        Ok(Subscription::new(listener, collection))
    }
}

fn decode_all<T: FromDocument>(docs: Vec<(DocPath, Document)>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|(path, doc)| match decode(&path, &doc) {
            Ok(item) => Some(item),
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "skipping undecodable document");
                None
            }
        })
        .collect()
}
