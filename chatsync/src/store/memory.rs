//! In-process implementation of [`DocumentStore`].
//!
//! Documents live in a `BTreeMap` keyed by path. Commits are staged on an
//! overlay and only applied once every precondition and update target has
//! been checked, so a failed batch leaves no trace. Listeners on a
//! collection receive one batch of changes per commit.
//!
//! The store doubles as a test backend: [`set_offline`](MemoryStore::set_offline),
//! [`fail_next_writes`](MemoryStore::fail_next_writes) and
//! [`set_latency`](MemoryStore::set_latency) simulate network trouble.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use chatsync_proto::change::ChangeKind;
use chatsync_proto::document::Document;
use chatsync_proto::path::{CollectionPath, DocPath};

use super::{
    DocChange, DocumentStore, Listener, Precondition, Registration, StoreError, WriteBatch,
    WriteOp,
};

struct ListenerEntry {
    collection: CollectionPath,
    tx: mpsc::UnboundedSender<Vec<DocChange>>,
}

#[derive(Default)]
struct State {
    docs: BTreeMap<DocPath, Document>,
    listeners: HashMap<u64, ListenerEntry>,
}

impl State {
    fn notify(&mut self, changes: &[DocChange]) {
        self.listeners.retain(|id, listener| {
            let batch: Vec<DocChange> = changes
                .iter()
                .filter(|c| c.path.parent() == listener.collection)
                .cloned()
                .collect();
            if batch.is_empty() {
                return true;
            }
            if listener.tx.send(batch).is_err() {
                tracing::debug!(listener = id, "dropping closed listener");
                return false;
            }
            true
        });
    }
}

#[derive(Default)]
struct Faults {
    offline: AtomicBool,
    failing_writes: AtomicU32,
    latency_ms: AtomicU64,
}

/// In-memory document store.
///
/// Cloning is cheap and yields a handle to the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    faults: Arc<Faults>,
    next_listener: Arc<AtomicU64>,
}

struct MemoryRegistration {
    id: u64,
    state: Weak<Mutex<State>>,
}

impl Registration for MemoryRegistration {
    fn remove(&self) {
        if let Some(state) = self.state.upgrade() {
            state.lock().listeners.remove(&self.id);
        }
    }
}

impl MemoryStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline, every call fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.faults.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes the next `n` commits fail with [`StoreError::Unavailable`].
    pub fn fail_next_writes(&self, n: u32) {
        self.faults.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Delays every call by `latency` before it touches the data.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.faults.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Number of stored documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.state.lock().docs.len()
    }

    async fn simulate_network(&self) -> Result<(), StoreError> {
        let latency = self.faults.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.faults.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        Ok(())
    }

    fn take_write_fault(&self) -> bool {
        self.faults
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Reads `path` through the staged overlay, falling back to committed data.
fn staged<'a>(
    docs: &'a BTreeMap<DocPath, Document>,
    overlay: &'a BTreeMap<DocPath, Option<Document>>,
    path: &DocPath,
) -> Option<&'a Document> {
    match overlay.get(path) {
        Some(entry) => entry.as_ref(),
        None => docs.get(path),
    }
}

impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        self.simulate_network().await?;
        Ok(self.state.lock().docs.get(path).cloned())
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<(DocPath, Document)>, StoreError> {
        self.simulate_network().await?;
        let state = self.state.lock();
        Ok(state
            .docs
            .iter()
            .filter(|(path, _)| path.parent() == *collection)
            .map(|(path, doc)| (path.clone(), doc.clone()))
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.simulate_network().await?;
        if self.take_write_fault() {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }

        let mut state = self.state.lock();

        for precondition in &batch.preconditions {
            match precondition {
                Precondition::Exists(path) if !state.docs.contains_key(path) => {
                    return Err(StoreError::PreconditionFailed {
                        path: path.to_string(),
                        expected: "exists",
                    });
                }
                Precondition::Missing(path) if state.docs.contains_key(path) => {
                    return Err(StoreError::PreconditionFailed {
                        path: path.to_string(),
                        expected: "missing",
                    });
                }
                _ => {}
            }
        }

        // Stage every op first so that a failing update aborts the batch.
        let mut overlay: BTreeMap<DocPath, Option<Document>> = BTreeMap::new();
        for op in &batch.ops {
            match op {
                WriteOp::Set(path, doc) => {
                    overlay.insert(path.clone(), Some(doc.clone()));
                }
                WriteOp::Update(path, fields) => {
                    let Some(current) = staged(&state.docs, &overlay, path) else {
                        return Err(StoreError::NotFound(path.to_string()));
                    };
                    let mut merged = current.clone();
                    for (key, value) in fields {
                        merged.insert(key.clone(), value.clone());
                    }
                    overlay.insert(path.clone(), Some(merged));
                }
                WriteOp::Delete(path) => {
                    overlay.insert(path.clone(), None);
                }
            }
        }

        let mut changes = Vec::with_capacity(overlay.len());
        for (path, entry) in overlay {
            match entry {
                Some(doc) => match state.docs.insert(path.clone(), doc.clone()) {
                    None => changes.push(DocChange {
                        kind: ChangeKind::Added,
                        path,
                        doc,
                    }),
                    Some(previous) if previous != doc => changes.push(DocChange {
                        kind: ChangeKind::Modified,
                        path,
                        doc,
                    }),
                    Some(_) => {}
                },
                None => {
                    if let Some(previous) = state.docs.remove(&path) {
                        changes.push(DocChange {
                            kind: ChangeKind::Removed,
                            path,
                            doc: previous,
                        });
                    }
                }
            }
        }

        state.notify(&changes);
        drop(state);

        tracing::trace!(
            ops = batch.ops.len(),
            changes = changes.len(),
            "memory store batch committed"
        );
        Ok(())
    }

    fn listen(&self, collection: &CollectionPath) -> Result<Listener, StoreError> {
        if self.faults.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        let initial: Vec<DocChange> = state
            .docs
            .iter()
            .filter(|(path, _)| path.parent() == *collection)
            .map(|(path, doc)| DocChange {
                kind: ChangeKind::Added,
                path: path.clone(),
                doc: doc.clone(),
            })
            .collect();
        // The initial snapshot is delivered even when empty, as real backends do.
        let _ = tx.send(initial);
        state.listeners.insert(
            id,
            ListenerEntry {
                collection: collection.clone(),
                tx,
            },
        );
        drop(state);

        Ok(Listener::new(
            rx,
            Box::new(MemoryRegistration {
                id,
                state: Arc::downgrade(&self.state),
            }),
        ))
    }
}
