//! Integration tests for viewed flags and unread counts.
//!
//! Verifies that:
//! - Marking a message viewed touches only the reader's copy
//! - Marking is idempotent, and own or already viewed messages are skipped
//! - Unread counts follow the reader's copy
//! - Background marking logs failures instead of surfacing them

use std::sync::Arc;
use std::time::Duration;

use chatsync::chat::read::unread_count;
use chatsync::chat::{ChatStateMachine, ReadTracker, Session};
use chatsync::error::ChatError;
use chatsync::media::MemoryMedia;
use chatsync::retry::{RetryPolicy, StoreGuard};
use chatsync::store::{Directory, MemoryStore};

use chatsync_proto::chat::{ChatRef, ChatRelationship};
use chatsync_proto::message::{Message, MessageId};
use chatsync_proto::user::{User, UserId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type Machine = ChatStateMachine<MemoryStore, MemoryMedia>;

fn user(id: &str, name: &str) -> User {
    User {
        id: UserId::new(id),
        display_name: name.to_string(),
        email: format!("{id}@example.com"),
        avatar_ref: String::new(),
        bio: String::new(),
        sex_tag: String::new(),
    }
}

struct World {
    store: MemoryStore,
    dir: Arc<Directory<MemoryStore>>,
    alice: Machine,
    bob: Machine,
    alice_row: ChatRelationship,
    bob_row: ChatRelationship,
}

impl World {
    /// An active chat between a1 and b1, seeded with Alice's "Hi".
    async fn active() -> Self {
        let store = MemoryStore::new();
        let dir = Arc::new(Directory::with_guard(
            store.clone(),
            StoreGuard::new(Duration::from_secs(1), RetryPolicy::none()),
        ));
        let media = Arc::new(MemoryMedia::new());
        let alice = ChatStateMachine::new(
            Session::new(user("a1", "Alice")),
            Arc::clone(&dir),
            Arc::clone(&media),
        );
        let bob = ChatStateMachine::new(Session::new(user("b1", "Bob")), Arc::clone(&dir), media);

        let waiting = alice
            .send_request(&bob.session().user, "Hi")
            .await
            .unwrap();
        let bob_row = bob.accept(&waiting).await.unwrap();
        let alice_row = dir
            .get_relationship(&bob_row.chat_ref().mirrored())
            .await
            .unwrap()
            .unwrap();

        Self {
            store,
            dir,
            alice,
            bob,
            alice_row,
            bob_row,
        }
    }

    fn alice_chat(&self) -> ChatRef {
        self.alice_row.chat_ref()
    }

    fn alice_tracker(&self) -> ReadTracker<MemoryStore> {
        self.alice.read_tracker()
    }

    async fn alice_copy(&self, id: &MessageId) -> Message {
        self.dir
            .list_messages(&self.alice_chat())
            .await
            .unwrap()
            .into_iter()
            .find(|m| m.id.as_ref() == Some(id))
            .unwrap()
    }

    async fn bob_copy(&self, id: &MessageId) -> Message {
        self.dir
            .list_messages(&self.bob_row.chat_ref())
            .await
            .unwrap()
            .into_iter()
            .find(|m| m.id.as_ref() == Some(id))
            .unwrap()
    }
}

// ---------------------------------------------------------------------------
// Marking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn marking_touches_only_the_readers_copy() {
    let w = World::active().await;
    let sent = w.bob.send_text(&w.bob_row, "Hello back").await.unwrap();
    let id = sent.id.clone().unwrap();

    w.alice_tracker()
        .mark_viewed(&w.alice_chat(), &w.alice_copy(&id).await)
        .await
        .unwrap();

    assert!(w.alice_copy(&id).await.is_viewed);
    assert!(!w.bob_copy(&id).await.is_viewed);
}

#[tokio::test]
async fn marking_is_idempotent() {
    let w = World::active().await;
    let sent = w.bob.send_text(&w.bob_row, "Hello back").await.unwrap();
    let id = sent.id.clone().unwrap();
    let tracker = w.alice_tracker();
    let chat = w.alice_chat();

    tracker.mark_viewed_id(&chat, &id).await.unwrap();
    let once = w.alice_copy(&id).await;
    tracker.mark_viewed_id(&chat, &id).await.unwrap();
    let twice = w.alice_copy(&id).await;
    assert_eq!(once, twice);
    assert!(twice.is_viewed);

    // An already viewed copy is skipped without a write, even offline.
    w.store.set_offline(true);
    tracker.mark_viewed(&chat, &twice).await.unwrap();
}

#[tokio::test]
async fn own_messages_are_skipped() {
    let w = World::active().await;
    let hi = w
        .dir
        .list_messages(&w.alice_chat())
        .await
        .unwrap()
        .remove(0);
    assert_eq!(hi.sender_id, UserId::new("a1"));

    w.alice_tracker().mark_viewed(&w.alice_chat(), &hi).await.unwrap();
    assert!(!w.alice_copy(hi.id.as_ref().unwrap()).await.is_viewed);
}

#[tokio::test]
async fn marking_a_missing_message_is_not_found() {
    let w = World::active().await;
    let err = w
        .alice_tracker()
        .mark_viewed_id(&w.alice_chat(), &MessageId::new("gone"))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));
    // The failed update created nothing.
    assert_eq!(w.dir.list_messages(&w.alice_chat()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unsent_message_cannot_be_marked() {
    let w = World::active().await;
    let draft = Message::text(&w.bob.session().user, "draft");
    let err = w
        .alice_tracker()
        .mark_viewed(&w.alice_chat(), &draft)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));
}

#[tokio::test]
async fn background_marking_completes() {
    let w = World::active().await;
    let sent = w.bob.send_text(&w.bob_row, "Hello back").await.unwrap();
    let id = sent.id.clone().unwrap();

    w.alice_tracker()
        .spawn_mark_viewed(w.alice_chat(), id.clone())
        .await
        .unwrap();
    assert!(w.alice_copy(&id).await.is_viewed);
}

#[tokio::test]
async fn background_marking_failure_is_swallowed() {
    let w = World::active().await;
    let sent = w.bob.send_text(&w.bob_row, "Hello back").await.unwrap();
    let id = sent.id.clone().unwrap();

    w.store.fail_next_writes(1);
    let handle = w.alice_tracker().spawn_mark_viewed(w.alice_chat(), id.clone());
    assert!(handle.await.is_ok());
    assert!(!w.alice_copy(&id).await.is_viewed);
}

// ---------------------------------------------------------------------------
// Unread counts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unread_counts_follow_each_readers_copy() {
    let w = World::active().await;
    w.bob.send_text(&w.bob_row, "one").await.unwrap();
    let two = w.bob.send_text(&w.bob_row, "two").await.unwrap();

    let alice = w.alice_tracker();
    let bob = w.bob.read_tracker();
    assert_eq!(alice.unread_in(&UserId::new("b1")).await.unwrap(), 2);
    // Bob has not read Alice's "Hi".
    assert_eq!(bob.unread_in(&UserId::new("a1")).await.unwrap(), 1);

    alice
        .mark_viewed_id(&w.alice_chat(), two.id.as_ref().unwrap())
        .await
        .unwrap();
    assert_eq!(alice.unread_in(&UserId::new("b1")).await.unwrap(), 1);
    assert_eq!(bob.unread_in(&UserId::new("a1")).await.unwrap(), 1);
}

#[tokio::test]
async fn unread_count_ignores_own_and_viewed() {
    let w = World::active().await;
    let me = UserId::new("a1");
    let mut messages = w.dir.list_messages(&w.alice_chat()).await.unwrap();
    assert_eq!(unread_count(&messages, &me), 0);

    let mut from_bob = Message::text(&w.bob.session().user, "x");
    messages.push(from_bob.clone());
    from_bob.is_viewed = true;
    messages.push(from_bob);
    assert_eq!(unread_count(&messages, &me), 1);
}

#[tokio::test]
async fn unread_in_unknown_chat_is_zero() {
    let w = World::active().await;
    let tracker = w.alice_tracker();
    assert_eq!(tracker.unread_in(&UserId::new("nobody")).await.unwrap(), 0);
}
