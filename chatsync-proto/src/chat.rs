//! Chat relationships between two users.

use serde::{Deserialize, Serialize};

use crate::message::Timestamp;
use crate::path::{CollectionPath, DocPath};
use crate::user::UserId;

/// Which bucket a relationship lives in.
///
/// A waiting relationship exists only in the receiver's namespace; an
/// active one exists symmetrically in both participants' namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatStatus {
    /// A pending request, visible to the receiver only.
    Waiting,
    /// A mutually accepted conversation.
    Active,
}

impl ChatStatus {
    /// Collection name used in the persisted layout.
    #[must_use]
    pub const fn collection_name(self) -> &'static str {
        match self {
            Self::Waiting => "waitingChats",
            Self::Active => "activeChats",
        }
    }

    /// Parses a collection name back into a bucket.
    #[must_use]
    pub fn from_collection_name(name: &str) -> Option<Self> {
        match name {
            "waitingChats" => Some(Self::Waiting),
            "activeChats" => Some(Self::Active),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => f.write_str("waiting"),
            Self::Active => f.write_str("active"),
        }
    }
}

/// Addresses one relationship row: `owner`'s copy of the chat with `peer`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatRef {
    /// Namespace the row is stored under.
    pub owner: UserId,
    /// The other participant.
    pub peer: UserId,
    /// Waiting or active bucket.
    pub status: ChatStatus,
}

impl ChatRef {
    /// Creates a reference to `owner`'s chat with `peer` in `status`.
    #[must_use]
    pub const fn new(owner: UserId, peer: UserId, status: ChatStatus) -> Self {
        Self {
            owner,
            peer,
            status,
        }
    }

    /// Path of the relationship document.
    #[must_use]
    pub fn doc_path(&self) -> DocPath {
        DocPath::chat(&self.owner, self.status, &self.peer)
    }

    /// Path of the nested message collection.
    #[must_use]
    pub fn messages_path(&self) -> CollectionPath {
        CollectionPath::messages(&self.owner, self.status, &self.peer)
    }

    /// The same pair seen from the peer's namespace.
    #[must_use]
    pub fn mirrored(&self) -> Self {
        Self::new(self.peer.clone(), self.owner.clone(), self.status)
    }
}

impl std::fmt::Display for ChatRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.doc_path())
    }
}

/// One user's view of a conversation with a peer.
///
/// In-memory collections deduplicate relationships by `peer_id`: a newer
/// record for the same peer replaces the older one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRelationship {
    /// Namespace this row belongs to.
    pub owner_id: UserId,
    /// The other participant.
    pub peer_id: UserId,
    /// Peer's display name when the row was written.
    pub peer_display_name: String,
    /// Peer's avatar when the row was written.
    pub peer_avatar_ref: String,
    /// Summary text of the most recent message.
    pub last_message_content: String,
    /// Sender of the most recent message.
    pub last_message_sender_id: UserId,
    /// When the most recent message was sent.
    pub last_message_at: Timestamp,
    /// Waiting or active.
    pub status: ChatStatus,
}

impl ChatRelationship {
    /// Address of this row in the store.
    #[must_use]
    pub fn chat_ref(&self) -> ChatRef {
        ChatRef::new(self.owner_id.clone(), self.peer_id.clone(), self.status)
    }

    /// Whether the last message was written by the peer rather than the owner.
    #[must_use]
    pub fn last_message_from_peer(&self) -> bool {
        self.last_message_sender_id != self.owner_id
    }
}
