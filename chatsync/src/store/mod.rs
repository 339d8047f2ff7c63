//! Document store seam and change-feed subscriptions.
//!
//! [`DocumentStore`] is the only trait a backend has to implement: point
//! reads, collection listing, atomic batched writes, and live listeners on a
//! collection. [`Directory`] layers the typed user/chat/message API on top.
//!
//! Implementations include:
//! - [`MemoryStore`] — in-process store with failure and latency injection

pub mod directory;
pub mod memory;

use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::mpsc;

use chatsync_proto::change::{Change, ChangeKind};
use chatsync_proto::document::{Document, FromDocument};
use chatsync_proto::path::{CollectionPath, DocPath};

pub use directory::Directory;
pub use memory::MemoryStore;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached. Safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the configured timeout.
    #[error("store call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A write was rejected by the backend.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A read was rejected by the backend.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// An update targeted a document that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A batch precondition did not hold; nothing was written.
    #[error("precondition failed on {path}: expected {expected}")]
    PreconditionFailed {
        /// Document the precondition was attached to.
        path: String,
        /// `"exists"` or `"missing"`.
        expected: &'static str,
    },

    /// A stored document could not be decoded.
    #[error("malformed document: {0}")]
    Malformed(String),
}

/// A single mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or overwrite a document.
    Set(DocPath, Document),
    /// Merge fields into an existing document; fails if it is missing.
    Update(DocPath, Document),
    /// Delete a document. Deleting a missing document is a no-op.
    Delete(DocPath),
}

/// A condition checked against the state before any op is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The document must exist.
    Exists(DocPath),
    /// The document must not exist.
    Missing(DocPath),
}

/// An ordered group of writes applied atomically.
///
/// Either every op is applied and listeners see the resulting changes, or
/// nothing is written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    /// Checked before any op runs.
    pub preconditions: Vec<Precondition>,
    /// Applied in order.
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `path` to exist when the batch commits.
    #[must_use]
    pub fn require_exists(mut self, path: DocPath) -> Self {
        self.preconditions.push(Precondition::Exists(path));
        self
    }

    /// Requires `path` to be absent when the batch commits.
    #[must_use]
    pub fn require_missing(mut self, path: DocPath) -> Self {
        self.preconditions.push(Precondition::Missing(path));
        self
    }

    /// Appends a [`WriteOp::Set`].
    pub fn set(&mut self, path: DocPath, doc: Document) -> &mut Self {
        self.ops.push(WriteOp::Set(path, doc));
        self
    }

    /// Appends a [`WriteOp::Update`].
    pub fn update(&mut self, path: DocPath, fields: Document) -> &mut Self {
        self.ops.push(WriteOp::Update(path, fields));
        self
    }

    /// Appends a [`WriteOp::Delete`].
    pub fn delete(&mut self, path: DocPath) -> &mut Self {
        self.ops.push(WriteOp::Delete(path));
        self
    }

    /// Number of ops in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch has no ops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// An untyped change to one document in a listened collection.
#[derive(Debug, Clone, PartialEq)]
pub struct DocChange {
    /// What happened.
    pub kind: ChangeKind,
    /// Which document.
    pub path: DocPath,
    /// New state, or last known state for `Removed`.
    pub doc: Document,
}

/// Backend hook that detaches a listener.
pub trait Registration: Send + Sync {
    /// Stops delivery to the listener. Must be idempotent.
    fn remove(&self);
}

/// Raw listener returned by [`DocumentStore::listen`].
///
/// The first batch carries the current contents of the collection as
/// `Added` changes; later batches carry one commit's worth of changes each.
pub struct Listener {
    rx: mpsc::UnboundedReceiver<Vec<DocChange>>,
    registration: Box<dyn Registration>,
}

impl Listener {
    /// Pairs a change receiver with the backend hook that detaches it.
    #[must_use]
    pub fn new(
        rx: mpsc::UnboundedReceiver<Vec<DocChange>>,
        registration: Box<dyn Registration>,
    ) -> Self {
        Self { rx, registration }
    }
}

/// Trait for document databases with change-feed support.
pub trait DocumentStore: Send + Sync {
    /// Reads one document.
    fn get(
        &self,
        path: &DocPath,
    ) -> impl std::future::Future<Output = Result<Option<Document>, StoreError>> + Send;

    /// Reads every document directly inside a collection, ordered by path.
    fn list(
        &self,
        collection: &CollectionPath,
    ) -> impl std::future::Future<Output = Result<Vec<(DocPath, Document)>, StoreError>> + Send;

    /// Applies a batch atomically.
    fn commit(
        &self,
        batch: WriteBatch,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Registers a live listener on a collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backend cannot attach it.
    fn listen(&self, collection: &CollectionPath) -> Result<Listener, StoreError>;
}

/// A typed, explicitly released change-feed handle.
///
/// The owner must call [`release`](Self::release) when its chat view or
/// session ends. A handle dropped without release is detached as well, but
/// logs a warning, since a forgotten listener keeps delivering events for
/// as long as it lives.
pub struct Subscription<T> {
    listener: Listener,
    collection: CollectionPath,
    released: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromDocument> Subscription<T> {
    /// Wraps a raw listener on `collection`.
    #[must_use]
    pub fn new(listener: Listener, collection: CollectionPath) -> Self {
        Self {
            listener,
            collection,
            released: false,
            _marker: PhantomData,
        }
    }

    /// Waits for the next snapshot diff.
    ///
    /// Documents that fail to decode are skipped and logged. Returns `None`
    /// once the backend has dropped the listener.
    pub async fn recv(&mut self) -> Option<Vec<Change<T>>> {
        let raw = self.listener.rx.recv().await?;
        Some(self.decode_batch(raw))
    }

    /// Returns the next diff if one is already queued.
    pub fn try_recv(&mut self) -> Option<Vec<Change<T>>> {
        let raw = self.listener.rx.try_recv().ok()?;
        Some(self.decode_batch(raw))
    }

    /// The collection this subscription observes.
    #[must_use]
    pub const fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    /// Detaches the listener. No further events are delivered.
    pub fn release(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.released {
            self.listener.registration.remove();
            self.listener.rx.close();
            self.released = true;
            tracing::debug!(collection = %self.collection, "subscription released");
        }
    }

    fn decode_batch(&self, raw: Vec<DocChange>) -> Vec<Change<T>> {
        raw.into_iter()
            .filter_map(|change| match T::from_document(&change.path, &change.doc) {
                Ok(item) => Some(Change {
                    kind: change.kind,
                    item,
                }),
                Err(err) => {
                    tracing::warn!(
                        path = %change.path,
                        error = %err,
                        "skipping undecodable document in change feed"
                    );
                    None
                }
            })
            .collect()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(
                collection = %self.collection,
                "subscription dropped without release"
            );
            self.listener.registration.remove();
            self.released = true;
        }
    }
}

impl<T: FromDocument> futures_util::Stream for Subscription<T> {
    type Item = Vec<Change<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.listener.rx.poll_recv(cx) {
            Poll::Ready(Some(raw)) => Poll::Ready(Some(this.decode_batch(raw))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
