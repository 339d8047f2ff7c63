//! Store-agnostic document paths.
//!
//! The persisted layout is:
//!
//! ```text
//! users/{id}
//! users/{id}/waitingChats/{peerId}/messages/{msgId}
//! users/{id}/activeChats/{peerId}/messages/{msgId}
//! ```
//!
//! A [`CollectionPath`] always has an odd number of segments and a
//! [`DocPath`] an even number.

use crate::chat::ChatStatus;
use crate::message::MessageId;
use crate::user::UserId;

const USERS: &str = "users";
const MESSAGES: &str = "messages";

/// Path of a collection of documents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionPath(Vec<String>);

impl CollectionPath {
    /// `users`
    #[must_use]
    pub fn users() -> Self {
        Self(vec![USERS.to_string()])
    }

    /// `users/{owner}/{waitingChats|activeChats}`
    #[must_use]
    pub fn chats(owner: &UserId, status: ChatStatus) -> Self {
        Self(vec![
            USERS.to_string(),
            owner.to_string(),
            status.collection_name().to_string(),
        ])
    }

    /// `users/{owner}/{bucket}/{peer}/messages`
    #[must_use]
    pub fn messages(owner: &UserId, status: ChatStatus, peer: &UserId) -> Self {
        Self(vec![
            USERS.to_string(),
            owner.to_string(),
            status.collection_name().to_string(),
            peer.to_string(),
            MESSAGES.to_string(),
        ])
    }

    /// Path of the document `id` inside this collection.
    #[must_use]
    pub fn doc(&self, id: &str) -> DocPath {
        let mut segments = self.0.clone();
        segments.push(id.to_string());
        DocPath(segments)
    }

    /// Raw path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Path of a single document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocPath(Vec<String>);

impl DocPath {
    /// `users/{id}`
    #[must_use]
    pub fn user(id: &UserId) -> Self {
        CollectionPath::users().doc(id.as_str())
    }

    /// `users/{owner}/{bucket}/{peer}`
    #[must_use]
    pub fn chat(owner: &UserId, status: ChatStatus, peer: &UserId) -> Self {
        CollectionPath::chats(owner, status).doc(peer.as_str())
    }

    /// `users/{owner}/{bucket}/{peer}/messages/{id}`
    #[must_use]
    pub fn message(owner: &UserId, status: ChatStatus, peer: &UserId, id: &MessageId) -> Self {
        CollectionPath::messages(owner, status, peer).doc(id.as_str())
    }

    /// The final segment: the document id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.0.last().map_or("", String::as_str)
    }

    /// The collection containing this document.
    #[must_use]
    pub fn parent(&self) -> CollectionPath {
        let mut segments = self.0.clone();
        segments.pop();
        CollectionPath(segments)
    }

    /// Raw path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}
