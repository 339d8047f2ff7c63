//! Snapshot diffs delivered by a live subscription.

/// How a document changed relative to the previously observed snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The document appeared (including the initial snapshot).
    Added,
    /// The document's fields changed.
    Modified,
    /// The document was deleted; the item carries its last known state.
    Removed,
}

/// A single typed change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change<T> {
    /// What happened.
    pub kind: ChangeKind,
    /// The decoded document.
    pub item: T,
}

impl<T> Change<T> {
    /// An `Added` event.
    pub const fn added(item: T) -> Self {
        Self {
            kind: ChangeKind::Added,
            item,
        }
    }

    /// A `Modified` event.
    pub const fn modified(item: T) -> Self {
        Self {
            kind: ChangeKind::Modified,
            item,
        }
    }

    /// A `Removed` event.
    pub const fn removed(item: T) -> Self {
        Self {
            kind: ChangeKind::Removed,
            item,
        }
    }
}
