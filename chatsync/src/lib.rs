//! `chatsync` — backend-agnostic chat request and message synchronization.
//!
//! The engine models how a one-directional chat request is promoted to a
//! bidirectional chat, how live change feeds are reconciled into ordered
//! local lists, and how viewed flags propagate. Backends plug in through
//! [`store::DocumentStore`] and [`media::MediaStorage`]; in-memory
//! implementations of both ship with the crate.
//!
//! ```text
//! DocumentStore ─▶ Directory ─▶ ChatStateMachine ─▶ MessageReconciler ─▶ ReadTracker
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod logging;
pub mod media;
pub mod profile;
pub mod retry;
pub mod store;
pub mod timefmt;

pub use chat::{ChatOptions, ChatStateMachine, OpenChat, Session};
pub use error::{ChatError, Conflict};
pub use store::{Directory, DocumentStore, MemoryStore, StoreError, Subscription, WriteBatch};
