//! Reconciles a chat's change feed into an ordered local message list.
//!
//! Order is always re-derived from `sent_at`; delivery order only breaks
//! ties. Each persisted message is inserted at most once, and the first
//! time an unviewed peer message is inserted a background
//! [`ReadTracker::spawn_mark_viewed`] is issued for it.
//!
//! Image messages are inserted only once their bytes are fetched. A failed
//! download leaves the message out so a re-delivery fetches it again.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinHandle;

use chatsync_proto::change::{Change, ChangeKind};
use chatsync_proto::chat::ChatRef;
use chatsync_proto::content::ContentItem;
use chatsync_proto::message::{Message, MessageBody, MessageId};
use chatsync_proto::user::UserId;

use crate::media::{MediaError, MediaStorage};
use crate::store::{DocumentStore, Subscription};

use super::read::{ReadTracker, unread_count};

/// One reconciled message plus its fetched image bytes, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// The message as last seen.
    pub message: Message,
    /// Image bytes for image messages whose download succeeded.
    pub image: Option<Vec<u8>>,
}

/// What a single change did to the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// A new message was inserted at this index.
    Inserted(usize),
    /// A local pending message was confirmed by its persisted copy, which
    /// now sits at this index.
    Confirmed(usize),
    /// The message at this index was replaced.
    Replaced(usize),
    /// The message at this index was removed.
    Removed(usize),
    /// The message was already present; nothing changed.
    Duplicate,
    /// The change referenced a message that is not in the list.
    Missing,
    /// The image could not be fetched; the message was not inserted.
    MediaFailed(MediaError),
}

/// Ordered, deduplicated view of one chat's messages.
pub struct MessageReconciler<D, M> {
    chat: ChatRef,
    me: UserId,
    entries: Vec<StreamEntry>,
    media: Arc<M>,
    tracker: ReadTracker<D>,
    max_download: usize,
    requested: HashSet<MessageId>,
    receipts: Vec<JoinHandle<()>>,
}

impl<D: DocumentStore + 'static, M: MediaStorage> MessageReconciler<D, M> {
    /// Creates an empty reconciler for `chat`, acting as `chat.owner`.
    #[must_use]
    pub fn new(chat: ChatRef, tracker: ReadTracker<D>, media: Arc<M>, max_download: usize) -> Self {
        Self {
            me: chat.owner.clone(),
            chat,
            entries: Vec::new(),
            media,
            tracker,
            max_download,
            requested: HashSet::new(),
            receipts: Vec::new(),
        }
    }

    /// The chat being reconciled.
    #[must_use]
    pub const fn chat(&self) -> &ChatRef {
        &self.chat
    }

    /// Applies one change.
    pub async fn apply(&mut self, change: Change<Message>) -> Applied {
        match change.kind {
            ChangeKind::Added => self.on_added(change.item).await,
            ChangeKind::Modified => self.on_modified(change.item),
            ChangeKind::Removed => self.on_removed(&change.item),
        }
    }

    /// Applies a batch of changes in delivery order.
    pub async fn apply_all(&mut self, changes: Vec<Change<Message>>) -> Vec<Applied> {
        let mut applied = Vec::with_capacity(changes.len());
        for change in changes {
            applied.push(self.apply(change).await);
        }
        applied
    }

    /// Waits for the next batch on `subscription` and applies it.
    ///
    /// Returns `None` once the subscription has ended.
    pub async fn pump(&mut self, subscription: &mut Subscription<Message>) -> Option<Vec<Applied>> {
        let changes = subscription.recv().await?;
        Some(self.apply_all(changes).await)
    }

    /// Inserts a locally created message before the store has confirmed it.
    ///
    /// The entry is replaced when its persisted copy arrives.
    pub fn insert_pending(&mut self, message: Message) -> usize {
        let index = self.insertion_point(&message);
        self.entries.insert(
            index,
            StreamEntry {
                message,
                image: None,
            },
        );
        index
    }

    /// Drops a pending message whose send failed.
    pub fn discard_pending(&mut self, message: &Message) -> bool {
        let Some(index) = self.pending_index(message) else {
            return false;
        };
        self.entries.remove(index);
        true
    }

    /// Reconciled entries in display order.
    #[must_use]
    pub fn entries(&self) -> &[StreamEntry] {
        &self.entries
    }

    /// Messages in display order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().map(|e| &e.message)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no message has been reconciled yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unviewed messages from the peer, as last seen.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        unread_count(self.messages(), &self.me)
    }

    /// Fetched bytes of an image message.
    #[must_use]
    pub fn image(&self, id: &MessageId) -> Option<&[u8]> {
        self.position(id)
            .and_then(|i| self.entries[i].image.as_deref())
    }

    /// Renderable rows in display order.
    #[must_use]
    pub fn items(&self) -> Vec<ContentItem> {
        self.messages().cloned().map(ContentItem::from_message).collect()
    }

    /// Waits for every mark-viewed request issued so far to finish.
    pub async fn settle(&mut self) {
        for handle in std::mem::take(&mut self.receipts) {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "mark-viewed task panicked");
            }
        }
    }

    async fn on_added(&mut self, message: Message) -> Applied {
        let Some(id) = message.id.clone() else {
            tracing::warn!(chat = %self.chat, "ignoring added message without id");
            return Applied::Missing;
        };
        if self.position(&id).is_some() {
            tracing::trace!(message_id = %id, "duplicate added event ignored");
            return Applied::Duplicate;
        }

        let image = match &message.body {
            MessageBody::Image(body) => match self.fetch_image(&id, &body.url).await {
                Ok(bytes) => Some(bytes),
                Err(err) => return Applied::MediaFailed(err),
            },
            MessageBody::Text(_) => None,
        };

        let pending = self.pending_index(&message);
        if let Some(i) = pending {
            self.entries.remove(i);
        }
        let confirmed = pending.is_some();

        let needs_receipt = !message.is_viewed && message.sender_id != self.me;
        let index = self.insertion_point(&message);
        self.entries.insert(index, StreamEntry { message, image });

        if needs_receipt && self.requested.insert(id.clone()) {
            self.receipts.retain(|h| !h.is_finished());
            self.receipts
                .push(self.tracker.spawn_mark_viewed(self.chat.clone(), id));
        }

        if confirmed {
            Applied::Confirmed(index)
        } else {
            Applied::Inserted(index)
        }
    }

    async fn fetch_image(&self, id: &MessageId, url: &str) -> Result<Vec<u8>, MediaError> {
        self.media
            .download(url, self.max_download)
            .await
            .inspect_err(|err| {
                tracing::warn!(message_id = %id, url, error = %err, "image download failed");
            })
    }

    fn on_modified(&mut self, message: Message) -> Applied {
        let Some(index) = message.id.as_ref().and_then(|id| self.position(id)) else {
            return Applied::Missing;
        };
        let entry = &mut self.entries[index];
        if entry.message.body != message.body {
            entry.image = None;
        }
        entry.message = message;
        Applied::Replaced(index)
    }

    fn on_removed(&mut self, message: &Message) -> Applied {
        let Some(index) = message.id.as_ref().and_then(|id| self.position(id)) else {
            return Applied::Missing;
        };
        self.entries.remove(index);
        Applied::Removed(index)
    }

    /// First index after every entry sent at or before `message`, so equal
    /// timestamps keep arrival order.
    fn insertion_point(&self, message: &Message) -> usize {
        self.entries
            .partition_point(|e| e.message.sent_at <= message.sent_at)
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.message.id.as_ref() == Some(id))
    }

    fn pending_index(&self, message: &Message) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| !e.message.is_persisted() && e.message.same_content(message))
    }
}
