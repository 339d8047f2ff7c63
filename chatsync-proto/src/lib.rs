//! Shared data model and document format for `chatsync`.

pub mod change;
pub mod chat;
pub mod content;
pub mod document;
pub mod message;
pub mod path;
pub mod user;
pub mod validate;
