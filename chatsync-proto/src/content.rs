//! Closed set of items a presentation layer can render.
//!
//! Lists of heterogeneous rows are diffed by [`ContentKey`], so two
//! versions of the same row compare equal by identity even when their
//! fields changed.

use crate::chat::{ChatRelationship, ChatStatus};
use crate::message::{Message, MessageBody, MessageId};
use crate::user::{User, UserId};

/// A renderable row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentItem {
    /// A text bubble.
    TextMessage(Message),
    /// An image bubble.
    ImageMessage(Message),
    /// A row in the people list.
    UserSummary(User),
    /// A row in the waiting or active chat list.
    ChatSummary(ChatRelationship),
}

/// Identity of a [`ContentItem`] for list diffing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentKey {
    /// Persisted message.
    Message(MessageId),
    /// Message not yet persisted; identified by sender and send time.
    PendingMessage(UserId, u64),
    /// User row.
    User(UserId),
    /// Chat row, one per peer and bucket.
    Chat(ChatStatus, UserId),
}

impl ContentItem {
    /// Wraps a message in the variant matching its body.
    #[must_use]
    pub fn from_message(message: Message) -> Self {
        match message.body {
            MessageBody::Text(_) => Self::TextMessage(message),
            MessageBody::Image(_) => Self::ImageMessage(message),
        }
    }

    /// Identity used to match old and new versions of this row.
    #[must_use]
    pub fn key(&self) -> ContentKey {
        match self {
            Self::TextMessage(m) | Self::ImageMessage(m) => m.id.as_ref().map_or_else(
                || ContentKey::PendingMessage(m.sender_id.clone(), m.sent_at.as_millis()),
                |id| ContentKey::Message(id.clone()),
            ),
            Self::UserSummary(u) => ContentKey::User(u.id.clone()),
            Self::ChatSummary(c) => ContentKey::Chat(c.status, c.peer_id.clone()),
        }
    }
}

impl From<User> for ContentItem {
    fn from(user: User) -> Self {
        Self::UserSummary(user)
    }
}

impl From<ChatRelationship> for ContentItem {
    fn from(chat: ChatRelationship) -> Self {
        Self::ChatSummary(chat)
    }
}

impl From<Message> for ContentItem {
    fn from(message: Message) -> Self {
        Self::from_message(message)
    }
}
