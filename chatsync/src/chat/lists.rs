//! Keyed lists for the people directory and the chat lists.
//!
//! Unlike messages, these rows are identified by a natural key (user id,
//! peer id) and a newer record for the same key replaces the older one.

use chatsync_proto::change::{Change, ChangeKind};
use chatsync_proto::chat::{ChatRelationship, ChatStatus};
use chatsync_proto::content::ContentItem;
use chatsync_proto::document::FromDocument;
use chatsync_proto::user::{User, UserId};

use crate::store::Subscription;

/// Outcome of applying one change to a [`KeyedList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListUpdate {
    /// Appended at this index.
    Appended(usize),
    /// Replaced the existing row at this index.
    Replaced(usize),
    /// Removed from this index.
    Removed(usize),
    /// Nothing to do.
    Unchanged,
}

/// A list deduplicated by key: replace on modify, append on add, remove on
/// delete.
#[derive(Debug, Clone)]
pub struct KeyedList<K, T> {
    items: Vec<T>,
    key: fn(&T) -> K,
}

impl<K: Eq, T> KeyedList<K, T> {
    /// Creates an empty list keyed by `key`.
    #[must_use]
    pub const fn new(key: fn(&T) -> K) -> Self {
        Self {
            items: Vec::new(),
            key,
        }
    }

    /// Applies one change.
    ///
    /// An `Added` for a key already present replaces the row, and a
    /// `Modified` for an unknown key appends it.
    pub fn apply(&mut self, change: Change<T>) -> ListUpdate {
        let key = (self.key)(&change.item);
        let position = self.items.iter().position(|i| (self.key)(i) == key);
        match (change.kind, position) {
            (ChangeKind::Added | ChangeKind::Modified, Some(index)) => {
                self.items[index] = change.item;
                ListUpdate::Replaced(index)
            }
            (ChangeKind::Added | ChangeKind::Modified, None) => {
                self.items.push(change.item);
                ListUpdate::Appended(self.items.len() - 1)
            }
            (ChangeKind::Removed, Some(index)) => {
                self.items.remove(index);
                ListUpdate::Removed(index)
            }
            (ChangeKind::Removed, None) => ListUpdate::Unchanged,
        }
    }

    /// Rows in insertion order.
    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Looks up a row by key.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&T> {
        self.items.iter().find(|i| (self.key)(i) == *key)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Notable transitions surfaced by a [`ChatList`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A new waiting request appeared.
    NewRequest(ChatRelationship),
    /// An active chat was updated by a message from the peer.
    IncomingActivity(ChatRelationship),
}

fn peer_key(chat: &ChatRelationship) -> UserId {
    chat.peer_id.clone()
}

/// One bucket of the current user's chats, deduplicated by peer.
#[derive(Debug, Clone)]
pub struct ChatList {
    status: ChatStatus,
    list: KeyedList<UserId, ChatRelationship>,
}

impl ChatList {
    /// Creates an empty list for one bucket.
    #[must_use]
    pub const fn new(status: ChatStatus) -> Self {
        Self {
            status,
            list: KeyedList::new(peer_key),
        }
    }

    /// The bucket this list mirrors.
    #[must_use]
    pub const fn status(&self) -> ChatStatus {
        self.status
    }

    /// Applies one change, returning an event worth surfacing.
    ///
    /// Rows from another bucket are ignored. A request is announced only
    /// when its peer was not already listed, so a re-delivered snapshot
    /// stays quiet.
    pub fn apply(&mut self, change: Change<ChatRelationship>) -> Option<ChatEvent> {
        if change.item.status != self.status {
            return None;
        }
        let kind = change.kind;
        let chat = change.item.clone();
        let update = self.list.apply(change);

        match (self.status, kind, update) {
            (ChatStatus::Waiting, ChangeKind::Added, ListUpdate::Appended(_)) => {
                tracing::debug!(peer_id = %chat.peer_id, "new chat request");
                Some(ChatEvent::NewRequest(chat))
            }
            (ChatStatus::Active, ChangeKind::Modified, _) if chat.last_message_from_peer() => {
                Some(ChatEvent::IncomingActivity(chat))
            }
            _ => None,
        }
    }

    /// Applies a batch of changes.
    pub fn apply_all(&mut self, changes: Vec<Change<ChatRelationship>>) -> Vec<ChatEvent> {
        changes
            .into_iter()
            .filter_map(|change| self.apply(change))
            .collect()
    }

    /// Waits for the next batch on `subscription` and applies it.
    pub async fn pump(
        &mut self,
        subscription: &mut Subscription<ChatRelationship>,
    ) -> Option<Vec<ChatEvent>> {
        let changes = subscription.recv().await?;
        Some(self.apply_all(changes))
    }

    /// The row for `peer`, if any.
    #[must_use]
    pub fn get(&self, peer: &UserId) -> Option<&ChatRelationship> {
        self.list.get(peer)
    }

    /// Rows, most recent message first.
    #[must_use]
    pub fn sorted(&self) -> Vec<&ChatRelationship> {
        let mut rows: Vec<_> = self.list.items().iter().collect();
        rows.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Renderable rows, most recent first.
    #[must_use]
    pub fn items(&self) -> Vec<ContentItem> {
        self.sorted().into_iter().cloned().map(ContentItem::from).collect()
    }
}

fn user_key(user: &User) -> UserId {
    user.id.clone()
}

/// Everyone except the current user.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    me: UserId,
    list: KeyedList<UserId, User>,
}

impl UserDirectory {
    /// Creates an empty directory that hides `me`.
    #[must_use]
    pub const fn new(me: UserId) -> Self {
        Self {
            me,
            list: KeyedList::new(user_key),
        }
    }

    /// Applies one change. Changes about the current user are ignored.
    pub fn apply(&mut self, change: Change<User>) -> ListUpdate {
        if change.item.id == self.me {
            return ListUpdate::Unchanged;
        }
        self.list.apply(change)
    }

    /// Applies a batch of changes.
    pub fn apply_all(&mut self, changes: Vec<Change<User>>) -> Vec<ListUpdate> {
        changes.into_iter().map(|c| self.apply(c)).collect()
    }

    /// Waits for the next batch on `subscription` and applies it.
    pub async fn pump(&mut self, subscription: &mut Subscription<User>) -> Option<Vec<ListUpdate>> {
        let changes = subscription.recv().await?;
        Some(self.apply_all(changes))
    }

    /// Users whose display name contains `filter`, case-insensitively.
    #[must_use]
    pub fn filtered(&self, filter: Option<&str>) -> Vec<&User> {
        self.list
            .items()
            .iter()
            .filter(|u| u.matches_filter(filter))
            .collect()
    }

    /// Renderable rows matching `filter`.
    #[must_use]
    pub fn items(&self, filter: Option<&str>) -> Vec<ContentItem> {
        self.filtered(filter)
            .into_iter()
            .cloned()
            .map(ContentItem::from)
            .collect()
    }

    /// Number of users listed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether nobody else is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

/// Collects every batch already queued on `subscription` without waiting.
pub fn drain<T: FromDocument>(subscription: &mut Subscription<T>) -> Vec<Change<T>> {
    let mut all = Vec::new();
    while let Some(batch) = subscription.try_recv() {
        all.extend(batch);
    }
    all
}
