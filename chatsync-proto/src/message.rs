//! Chat message types shared by every `chatsync` component.
//!
//! A [`Message`] is created client-side without an id, persisted by the
//! directory store (which assigns the id), and then observed back through
//! a change stream. Everything except `is_viewed` is immutable once the
//! message has been persisted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user::{User, UserId};
use crate::validate::ValidationError;

/// Maximum allowed text payload size in bytes (64 KB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Summary text shown in the sender's own chat list for image messages.
pub const IMAGE_SUMMARY_PLACEHOLDER: &str = "Изображение 🖼";

/// Store-assigned identifier of a persisted message.
///
/// Generated ids are UUID v7 strings, so lexicographic order follows
/// creation time. Ids read back from an existing backend are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Creates a new time-ordered message identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an identifier read from the store.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Display size reserved for an image before its bytes are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    /// Width in points.
    pub width: u32,
    /// Height in points.
    pub height: u32,
}

impl Default for ImageSize {
    fn default() -> Self {
        Self {
            width: 150,
            height: 100,
        }
    }
}

/// An image attachment referenced by its remote location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageBody {
    /// Remote URL or storage key returned by the media collaborator.
    pub url: String,
    /// Size to reserve while the image is being fetched.
    pub placeholder: ImageSize,
}

/// Content of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageBody {
    /// Plain text.
    Text(String),
    /// A remote image.
    Image(ImageBody),
}

impl MessageBody {
    /// The content as it is stored in the `content` field of the document.
    ///
    /// Image messages carry their reference in `url`, so their raw content
    /// is empty.
    #[must_use]
    pub fn raw_content(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Image(_) => "",
        }
    }

    /// Returns the image reference, if this is an image body.
    #[must_use]
    pub const fn image(&self) -> Option<&ImageBody> {
        match self {
            Self::Image(image) => Some(image),
            Self::Text(_) => None,
        }
    }
}

/// A chat message, either pending (no id yet) or persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned id; `None` until the message has been persisted.
    pub id: Option<MessageId>,
    /// Who sent the message.
    pub sender_id: UserId,
    /// Sender's display name at send time.
    pub sender_name: String,
    /// When the message was created on the sender's device.
    pub sent_at: Timestamp,
    /// Whether the recipient has opened the chat since this arrived.
    pub is_viewed: bool,
    /// Text or image content.
    pub body: MessageBody,
}

impl Message {
    /// Creates a pending text message from `sender`.
    #[must_use]
    pub fn text(sender: &User, text: impl Into<String>) -> Self {
        Self::pending(sender, MessageBody::Text(text.into()))
    }

    /// Creates a pending image message from `sender`.
    #[must_use]
    pub fn image(sender: &User, url: impl Into<String>, placeholder: ImageSize) -> Self {
        Self::pending(
            sender,
            MessageBody::Image(ImageBody {
                url: url.into(),
                placeholder,
            }),
        )
    }

    /// Creates a pending message with an arbitrary body, stamped now.
    #[must_use]
    pub fn pending(sender: &User, body: MessageBody) -> Self {
        Self {
            id: None,
            sender_id: sender.id.clone(),
            sender_name: sender.display_name.clone(),
            sent_at: Timestamp::now(),
            is_viewed: false,
            body,
        }
    }

    /// Returns a copy carrying the given store id.
    #[must_use]
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    /// Whether the store has assigned an id to this message.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Chat-list summary text for this message.
    ///
    /// Images are summarized with `image_placeholder`.
    #[must_use]
    pub fn summary(&self, image_placeholder: &str) -> String {
        match &self.body {
            MessageBody::Text(text) => text.clone(),
            MessageBody::Image(_) => image_placeholder.to_string(),
        }
    }

    /// Whether `other` is the persisted copy of this pending message.
    ///
    /// Used only while this message has no id: same sender and same body.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.sender_id == other.sender_id && self.body == other.body
    }

    /// Validates this message for sending.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Empty`] for blank text,
    /// [`ValidationError::TooLarge`] above [`MAX_MESSAGE_SIZE`], and
    /// [`ValidationError::MissingField`] for an image without a URL.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.body {
            MessageBody::Text(text) => {
                if text.trim().is_empty() {
                    return Err(ValidationError::Empty);
                }
                let size = text.len();
                if size > MAX_MESSAGE_SIZE {
                    return Err(ValidationError::TooLarge {
                        size,
                        max: MAX_MESSAGE_SIZE,
                    });
                }
            }
            MessageBody::Image(image) => {
                if image.url.is_empty() {
                    return Err(ValidationError::MissingField("url"));
                }
            }
        }
        Ok(())
    }
}
