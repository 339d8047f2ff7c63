//! Media storage collaborator: bytes to URL and back.
//!
//! Avatars are stored under `avatars/{uid}` and chat images under
//! `chats/{peer}|<>|{me}/{uuid}{millis}`. [`MemoryMedia`] is the
//! in-process implementation used by tests and demos.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use uuid::Uuid;

use chatsync_proto::message::Timestamp;
use chatsync_proto::user::UserId;

/// Default download limit for images (1 MiB).
pub const DEFAULT_MAX_DOWNLOAD: usize = 1024 * 1024;

/// Errors raised by a [`MediaStorage`] backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    /// Upload was rejected or could not complete.
    #[error("upload failed: {0}")]
    UploadFailed(String),

    /// Download was rejected or could not complete.
    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// Nothing is stored at the given URL.
    #[error("no media at {0}")]
    NotFound(String),

    /// The object is larger than the caller allows.
    #[error("media too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Stored size in bytes.
        size: usize,
        /// Caller's limit in bytes.
        max: usize,
    },
}

/// Trait for blob storage that turns bytes into a URL.
pub trait MediaStorage: Send + Sync {
    /// Stores `bytes` under `key` and returns a URL that resolves to them.
    fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> impl std::future::Future<Output = Result<String, MediaError>> + Send;

    /// Fetches the object at `url`, refusing anything above `max_size`.
    fn download(
        &self,
        url: &str,
        max_size: usize,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, MediaError>> + Send;
}

/// Storage key of a user's avatar.
#[must_use]
pub fn avatar_key(user: &UserId) -> String {
    format!("avatars/{user}")
}

/// Storage key of a fresh chat image sent by `me` to `peer`.
#[must_use]
pub fn chat_image_key(peer: &UserId, me: &UserId, at: Timestamp) -> String {
    format!(
        "chats/{peer}|<>|{me}/{}{}",
        Uuid::now_v7().simple(),
        at.as_millis()
    )
}

const MEM_SCHEME: &str = "mem://";

#[derive(Default)]
struct MemoryMediaInner {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: AtomicBool,
    fail_downloads: AtomicBool,
    downloads: AtomicUsize,
}

/// In-memory [`MediaStorage`] with failure injection.
///
/// URLs have the form `mem://{key}`. Cloning shares the same objects.
#[derive(Clone, Default)]
pub struct MemoryMedia {
    inner: Arc<MemoryMediaInner>,
}

impl MemoryMedia {
    /// Creates an empty media store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every upload fail while set.
    pub fn set_fail_uploads(&self, fail: bool) {
        self.inner.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Makes every download fail while set.
    pub fn set_fail_downloads(&self, fail: bool) {
        self.inner.fail_downloads.store(fail, Ordering::SeqCst);
    }

    /// Number of download calls, successful or not.
    #[must_use]
    pub fn download_count(&self) -> usize {
        self.inner.downloads.load(Ordering::SeqCst)
    }

    /// Whether an object exists under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.objects.lock().contains_key(key)
    }
}

impl MediaStorage for MemoryMedia {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, MediaError> {
        if self.inner.fail_uploads.load(Ordering::SeqCst) {
            return Err(MediaError::UploadFailed("injected upload failure".into()));
        }
        tracing::trace!(key, content_type, size = bytes.len(), "media uploaded");
        self.inner.objects.lock().insert(key.to_string(), bytes);
        Ok(format!("{MEM_SCHEME}{key}"))
    }

    async fn download(&self, url: &str, max_size: usize) -> Result<Vec<u8>, MediaError> {
        self.inner.downloads.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_downloads.load(Ordering::SeqCst) {
            return Err(MediaError::DownloadFailed("injected download failure".into()));
        }
        let Some(key) = url.strip_prefix(MEM_SCHEME) else {
            return Err(MediaError::NotFound(url.to_string()));
        };
        let objects = self.inner.objects.lock();
        let bytes = objects
            .get(key)
            .ok_or_else(|| MediaError::NotFound(url.to_string()))?;
        if bytes.len() > max_size {
            return Err(MediaError::TooLarge {
                size: bytes.len(),
                max: max_size,
            });
        }
        Ok(bytes.clone())
    }
}
