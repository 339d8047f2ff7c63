//! Key/value document format for persisted users, chats and messages.
//!
//! Field names match the documents already written by the mobile client,
//! so existing data decodes without migration. Fields added later
//! (`isViewed`, `lastSenderId`, `lastMessageDate`, image sizes) are optional
//! on decode.

use serde::Deserialize;
use serde_json::Value;

use crate::chat::{ChatRelationship, ChatStatus};
use crate::message::{ImageBody, ImageSize, Message, MessageBody, MessageId, Timestamp};
use crate::path::DocPath;
use crate::user::{User, UserId};

/// A schemaless document: string keys to JSON values.
pub type Document = serde_json::Map<String, Value>;

/// Field holding the viewed flag of a message document.
pub const FIELD_IS_VIEWED: &str = "isViewed";

/// Error type for document encode/decode operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    /// Required fields are missing or have the wrong type.
    #[error("malformed document at {path}: {reason}")]
    Malformed {
        /// Path of the offending document.
        path: String,
        /// Decoder message.
        reason: String,
    },
    /// The document lives somewhere its type cannot.
    #[error("unexpected path for {kind}: {path}")]
    UnexpectedPath {
        /// Type being decoded.
        kind: &'static str,
        /// Path of the offending document.
        path: String,
    },
}

/// Types that can be written as a document.
pub trait IntoDocument {
    /// Encodes `self` as document fields. The document id is not included.
    fn to_document(&self) -> Document;
}

/// Types that can be read back from a document and its path.
pub trait FromDocument: Sized {
    /// Decodes a document stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] if fields are missing or the path does not
    /// fit the type.
    fn from_document(path: &DocPath, doc: &Document) -> Result<Self, DocumentError>;
}

/// Patch setting a message's viewed flag.
#[must_use]
pub fn viewed_patch() -> Document {
    let mut doc = Document::new();
    doc.insert(FIELD_IS_VIEWED.into(), Value::Bool(true));
    doc
}

fn decode<T: for<'de> Deserialize<'de>>(path: &DocPath, doc: &Document) -> Result<T, DocumentError> {
    serde_json::from_value(Value::Object(doc.clone())).map_err(|e| DocumentError::Malformed {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// users/{id}
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct UserRecord {
    username: String,
    email: String,
    #[serde(rename = "avatarStringURL", default)]
    avatar_string_url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    sex: String,
    #[serde(default)]
    uid: Option<String>,
}

impl IntoDocument for User {
    fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("username".into(), Value::from(self.display_name.as_str()));
        doc.insert("email".into(), Value::from(self.email.as_str()));
        doc.insert("avatarStringURL".into(), Value::from(self.avatar_ref.as_str()));
        doc.insert("description".into(), Value::from(self.bio.as_str()));
        doc.insert("sex".into(), Value::from(self.sex_tag.as_str()));
        doc.insert("uid".into(), Value::from(self.id.as_str()));
        doc
    }
}

impl FromDocument for User {
    fn from_document(path: &DocPath, doc: &Document) -> Result<Self, DocumentError> {
        if path.segments().len() != 2 {
            return Err(DocumentError::UnexpectedPath {
                kind: "user",
                path: path.to_string(),
            });
        }
        let record: UserRecord = decode(path, doc)?;
        Ok(Self {
            id: UserId::new(record.uid.unwrap_or_else(|| path.id().to_string())),
            display_name: record.username,
            email: record.email,
            avatar_ref: record.avatar_string_url,
            bio: record.description,
            sex_tag: record.sex,
        })
    }
}

// ---------------------------------------------------------------------------
// users/{owner}/{bucket}/{peer}
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRecord {
    friend_username: String,
    #[serde(rename = "friendAvatarStringURL", default)]
    friend_avatar_string_url: String,
    #[serde(default)]
    last_message: String,
    friend_id: String,
    #[serde(default)]
    last_sender_id: Option<String>,
    #[serde(default)]
    last_message_date: u64,
}

impl IntoDocument for ChatRelationship {
    fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("friendUsername".into(), Value::from(self.peer_display_name.as_str()));
        doc.insert(
            "friendAvatarStringURL".into(),
            Value::from(self.peer_avatar_ref.as_str()),
        );
        doc.insert("lastMessage".into(), Value::from(self.last_message_content.as_str()));
        doc.insert("friendId".into(), Value::from(self.peer_id.as_str()));
        doc.insert(
            "lastSenderId".into(),
            Value::from(self.last_message_sender_id.as_str()),
        );
        doc.insert(
            "lastMessageDate".into(),
            Value::from(self.last_message_at.as_millis()),
        );
        doc
    }
}

impl FromDocument for ChatRelationship {
    fn from_document(path: &DocPath, doc: &Document) -> Result<Self, DocumentError> {
        let segments = path.segments();
        let status = match segments {
            [_, _, bucket, _] => ChatStatus::from_collection_name(bucket),
            _ => None,
        };
        let Some(status) = status else {
            return Err(DocumentError::UnexpectedPath {
                kind: "chat",
                path: path.to_string(),
            });
        };
        let owner_id = UserId::new(segments[1].as_str());
        let record: ChatRecord = decode(path, doc)?;
        let peer_id = UserId::new(record.friend_id);
        Ok(Self {
            last_message_sender_id: record
                .last_sender_id
                .map_or_else(|| peer_id.clone(), UserId::new),
            owner_id,
            peer_id,
            peer_display_name: record.friend_username,
            peer_avatar_ref: record.friend_avatar_string_url,
            last_message_content: record.last_message,
            last_message_at: Timestamp::from_millis(record.last_message_date),
            status,
        })
    }
}

// ---------------------------------------------------------------------------
// .../messages/{id}
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRecord {
    created: u64,
    sender_id: String,
    #[serde(default)]
    sender_name: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    is_viewed: bool,
    #[serde(default)]
    image_width: Option<u32>,
    #[serde(default)]
    image_height: Option<u32>,
}

impl IntoDocument for Message {
    fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("created".into(), Value::from(self.sent_at.as_millis()));
        doc.insert("senderId".into(), Value::from(self.sender_id.as_str()));
        doc.insert("senderName".into(), Value::from(self.sender_name.as_str()));
        doc.insert("content".into(), Value::from(self.body.raw_content()));
        doc.insert(FIELD_IS_VIEWED.into(), Value::Bool(self.is_viewed));
        if let MessageBody::Image(image) = &self.body {
            doc.insert("url".into(), Value::from(image.url.as_str()));
            doc.insert("imageWidth".into(), Value::from(image.placeholder.width));
            doc.insert("imageHeight".into(), Value::from(image.placeholder.height));
        }
        doc
    }
}

impl FromDocument for Message {
    fn from_document(path: &DocPath, doc: &Document) -> Result<Self, DocumentError> {
        if path.parent().segments().last().map(String::as_str) != Some("messages") {
            return Err(DocumentError::UnexpectedPath {
                kind: "message",
                path: path.to_string(),
            });
        }
        let record: MessageRecord = decode(path, doc)?;
        let body = match record.url {
            Some(url) if !url.is_empty() => {
                let defaults = ImageSize::default();
                MessageBody::Image(ImageBody {
                    url,
                    placeholder: ImageSize {
                        width: record.image_width.unwrap_or(defaults.width),
                        height: record.image_height.unwrap_or(defaults.height),
                    },
                })
            }
            _ => MessageBody::Text(record.content),
        };
        Ok(Self {
            id: Some(MessageId::new(path.id())),
            sender_id: UserId::new(record.sender_id),
            sender_name: record.sender_name,
            sent_at: Timestamp::from_millis(record.created),
            is_viewed: record.is_viewed,
            body,
        })
    }
}
