//! Integration tests for the request lifecycle: send, accept, reject.
//!
//! Covers the end-to-end request scenarios:
//! 1. A sends "Hi" to B: a waiting row appears under B's namespace.
//! 2. B accepts: the waiting row is gone and both active rows exist, with
//!    the original message (same id) copied to both collections.
//! 4. Two concurrent requests for the same pair: both land by default,
//!    only one lands with `unique_requests`.
//!
//! plus accept-once, reject and atomicity on write failure.

use std::sync::Arc;
use std::time::Duration;

use chatsync::chat::{ChatOptions, ChatStateMachine, RelationshipState, Session};
use chatsync::error::{ChatError, Conflict};
use chatsync::media::MemoryMedia;
use chatsync::retry::{RetryPolicy, StoreGuard};
use chatsync::store::{Directory, DocumentStore, MemoryStore};

use chatsync_proto::chat::{ChatRef, ChatRelationship, ChatStatus};
use chatsync_proto::path::CollectionPath;
use chatsync_proto::user::{User, UserId};
use chatsync_proto::validate::ValidationError;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type Machine = ChatStateMachine<MemoryStore, MemoryMedia>;

fn user(id: &str, name: &str) -> User {
    User {
        id: UserId::new(id),
        display_name: name.to_string(),
        email: format!("{id}@example.com"),
        avatar_ref: format!("mem://avatars/{id}"),
        bio: String::new(),
        sex_tag: String::new(),
    }
}

struct World {
    store: MemoryStore,
    dir: Arc<Directory<MemoryStore>>,
    media: Arc<MemoryMedia>,
    alice: User,
    bob: User,
}

impl World {
    fn new() -> Self {
        Self::with_guard(StoreGuard::default())
    }

    /// A world whose store calls never retry.
    fn without_retry() -> Self {
        Self::with_guard(StoreGuard::new(Duration::from_secs(1), RetryPolicy::none()))
    }

    fn with_guard(guard: StoreGuard) -> Self {
        let store = MemoryStore::new();
        Self {
            dir: Arc::new(Directory::with_guard(store.clone(), guard)),
            store,
            media: Arc::new(MemoryMedia::new()),
            alice: user("a1", "Alice"),
            bob: user("b1", "Bob"),
        }
    }

    fn machine(&self, who: &User) -> Machine {
        ChatStateMachine::new(
            Session::new(who.clone()),
            Arc::clone(&self.dir),
            Arc::clone(&self.media),
        )
    }

    fn unique_machine(&self, who: &User) -> Machine {
        self.machine(who).with_options(ChatOptions {
            unique_requests: true,
            ..ChatOptions::default()
        })
    }

    async fn count(&self, collection: &CollectionPath) -> usize {
        self.store.list(collection).await.unwrap().len()
    }

    /// Alice sends "Hi" to Bob; returns Bob's waiting row.
    async fn request_hi(&self) -> ChatRelationship {
        self.machine(&self.alice)
            .send_request(&self.bob, "Hi")
            .await
            .unwrap()
    }
}

// ---------------------------------------------------------------------------
// Scenario 1: request
// ---------------------------------------------------------------------------

#[tokio::test]
async fn request_creates_waiting_row_under_receiver() {
    let w = World::new();
    let waiting = w.request_hi().await;

    assert_eq!(waiting.owner_id, w.bob.id);
    assert_eq!(waiting.peer_id, w.alice.id);
    assert_eq!(waiting.status, ChatStatus::Waiting);

    let stored = w
        .dir
        .get_relationship(&ChatRef::new(w.bob.id.clone(), w.alice.id.clone(), ChatStatus::Waiting))
        .await
        .unwrap()
        .expect("waiting row under b1");
    assert_eq!(stored.peer_id, UserId::new("a1"));
    assert_eq!(stored.peer_display_name, "Alice");
    assert_eq!(stored.last_message_content, "Hi");

    let messages = w.machine(&w.bob).waiting_chat_messages(&stored).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender_id, UserId::new("a1"));
    assert!(!messages[0].is_viewed);
    assert!(messages[0].id.is_some());

    // Nothing in the sender's namespace.
    assert_eq!(
        w.count(&CollectionPath::chats(&w.alice.id, ChatStatus::Waiting)).await,
        0
    );
}

#[tokio::test]
async fn relationship_state_from_both_sides() {
    let w = World::new();
    let (alice, bob) = (w.machine(&w.alice), w.machine(&w.bob));
    assert_eq!(alice.relationship_state(&w.bob.id).await.unwrap(), RelationshipState::None);

    let waiting = w.request_hi().await;
    assert_eq!(
        alice.relationship_state(&w.bob.id).await.unwrap(),
        RelationshipState::WaitingSent
    );
    assert_eq!(
        bob.relationship_state(&w.alice.id).await.unwrap(),
        RelationshipState::WaitingReceived
    );

    bob.accept(&waiting).await.unwrap();
    assert_eq!(alice.relationship_state(&w.bob.id).await.unwrap(), RelationshipState::Active);
    assert_eq!(bob.relationship_state(&w.alice.id).await.unwrap(), RelationshipState::Active);
}

#[tokio::test]
async fn request_to_self_is_rejected() {
    let w = World::new();
    let err = w
        .machine(&w.alice)
        .send_request(&w.alice, "Hi me")
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Validation(ValidationError::SelfChat)));
}

#[tokio::test]
async fn blank_request_is_rejected_before_writing() {
    let w = World::new();
    let err = w.machine(&w.alice).send_request(&w.bob, "  ").await.unwrap_err();
    assert!(matches!(err, ChatError::Validation(ValidationError::Empty)));
    assert_eq!(w.store.document_count(), 0);
}

#[tokio::test]
async fn repeated_request_hits_advisory_check() {
    let w = World::new();
    w.request_hi().await;

    let again = w.machine(&w.alice).send_request(&w.bob, "Hi again").await;
    assert!(matches!(again, Err(ChatError::Conflict(Conflict::RequestExists))));

    // The receiver answering with their own request is a conflict too.
    let reverse = w.machine(&w.bob).send_request(&w.alice, "Hey").await;
    assert!(matches!(reverse, Err(ChatError::Conflict(Conflict::RequestExists))));
}

// ---------------------------------------------------------------------------
// Scenario 2: accept
// ---------------------------------------------------------------------------

#[tokio::test]
async fn accept_promotes_to_symmetric_active_chat() {
    let w = World::new();
    let waiting = w.request_hi().await;
    let original = w
        .machine(&w.bob)
        .waiting_chat_messages(&waiting)
        .await
        .unwrap();
    let hi_id = original[0].id.clone().unwrap();

    let active = w.machine(&w.bob).accept(&waiting).await.unwrap();
    assert_eq!(active.status, ChatStatus::Active);
    assert_eq!(active.owner_id, w.bob.id);

    // No waiting state remains for the pair.
    let waiting_ref = waiting.chat_ref();
    assert!(w.dir.get_relationship(&waiting_ref).await.unwrap().is_none());
    assert_eq!(w.count(&waiting_ref.messages_path()).await, 0);

    // Active rows on both sides, each naming the other.
    let bob_side = ChatRef::new(w.bob.id.clone(), w.alice.id.clone(), ChatStatus::Active);
    let alice_side = bob_side.mirrored();
    let bob_row = w.dir.get_relationship(&bob_side).await.unwrap().unwrap();
    let alice_row = w.dir.get_relationship(&alice_side).await.unwrap().unwrap();
    assert_eq!(bob_row.peer_display_name, "Alice");
    assert_eq!(alice_row.peer_display_name, "Bob");
    assert_eq!(alice_row.peer_avatar_ref, "mem://avatars/b1");
    assert_eq!(alice_row.last_message_content, "Hi");

    // "Hi" under the same id in both active collections.
    for side in [&bob_side, &alice_side] {
        let messages = w.dir.list_messages(side).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id.as_ref(), Some(&hi_id));
        assert_eq!(messages[0].body.raw_content(), "Hi");
    }
}

#[tokio::test]
async fn second_accept_is_conflict_not_duplicate() {
    let w = World::new();
    let waiting = w.request_hi().await;
    let bob = w.machine(&w.bob);
    bob.accept(&waiting).await.unwrap();

    let err = bob.accept(&waiting).await.unwrap_err();
    assert!(matches!(err, ChatError::Conflict(Conflict::AlreadyActive)));

    let bob_side = ChatRef::new(w.bob.id.clone(), w.alice.id.clone(), ChatStatus::Active);
    assert_eq!(w.dir.list_messages(&bob_side).await.unwrap().len(), 1);
    assert_eq!(
        w.count(&CollectionPath::chats(&w.bob.id, ChatStatus::Active)).await,
        1
    );
}

#[tokio::test]
async fn only_the_receiver_can_accept() {
    let w = World::new();
    let waiting = w.request_hi().await;
    let err = w.machine(&w.alice).accept(&waiting).await.unwrap_err();
    assert!(matches!(err, ChatError::Conflict(Conflict::NotOwner)));
}

#[tokio::test]
async fn failed_accept_leaves_request_untouched() {
    let w = World::without_retry();
    let waiting = w.request_hi().await;

    w.store.fail_next_writes(1);
    let err = w.machine(&w.bob).accept(&waiting).await.unwrap_err();
    assert!(matches!(err, ChatError::WriteFailed(_)));
    assert!(err.is_transient());

    assert!(w.dir.get_relationship(&waiting.chat_ref()).await.unwrap().is_some());
    assert_eq!(w.count(&waiting.chat_ref().messages_path()).await, 1);
    assert_eq!(
        w.count(&CollectionPath::chats(&w.bob.id, ChatStatus::Active)).await,
        0
    );
    assert_eq!(
        w.count(&CollectionPath::chats(&w.alice.id, ChatStatus::Active)).await,
        0
    );

    // Retrying after the outage succeeds.
    w.machine(&w.bob).accept(&waiting).await.unwrap();
}

// ---------------------------------------------------------------------------
// Reject
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reject_removes_request_and_its_messages() {
    let w = World::new();
    let waiting = w.request_hi().await;
    let bob = w.machine(&w.bob);

    bob.reject(&waiting).await.unwrap();

    assert!(bob.waiting_chat_messages(&waiting).await.unwrap().is_empty());
    assert!(w.dir.get_relationship(&waiting.chat_ref()).await.unwrap().is_none());
    assert_eq!(w.store.document_count(), 0);
    assert_eq!(
        bob.relationship_state(&w.alice.id).await.unwrap(),
        RelationshipState::None
    );

    let err = bob.reject(&waiting).await.unwrap_err();
    assert!(matches!(err, ChatError::Conflict(Conflict::NotWaiting)));
}

#[tokio::test]
async fn rejected_pair_can_request_again() {
    let w = World::new();
    let waiting = w.request_hi().await;
    w.machine(&w.bob).reject(&waiting).await.unwrap();
    assert!(w.machine(&w.alice).send_request(&w.bob, "Second try").await.is_ok());
}

// ---------------------------------------------------------------------------
// Scenario 4: concurrent requests
// ---------------------------------------------------------------------------

/// Both calls finish their existence checks before either commits.
fn slow_store(w: &World) {
    w.store.set_latency(Duration::from_millis(20));
}

#[tokio::test]
async fn concurrent_requests_both_land_by_default() {
    let w = World::new();
    slow_store(&w);
    let (first, second) = (w.machine(&w.alice), w.machine(&w.alice));

    let (r1, r2) = tokio::join!(
        first.send_request(&w.bob, "Hi"),
        second.send_request(&w.bob, "Hi there"),
    );
    assert!(r1.is_ok());
    assert!(r2.is_ok());

    // One waiting row (same key), two request messages under it.
    let waiting = ChatRef::new(w.bob.id.clone(), w.alice.id.clone(), ChatStatus::Waiting);
    assert_eq!(
        w.count(&CollectionPath::chats(&w.bob.id, ChatStatus::Waiting)).await,
        1
    );
    assert_eq!(w.count(&waiting.messages_path()).await, 2);
}

#[tokio::test]
async fn concurrent_requests_admit_one_with_unique_requests() {
    let w = World::new();
    slow_store(&w);
    let (first, second) = (w.unique_machine(&w.alice), w.unique_machine(&w.alice));

    let (r1, r2) = tokio::join!(
        first.send_request(&w.bob, "Hi"),
        second.send_request(&w.bob, "Hi there"),
    );
    let results = [r1, r2];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(ChatError::Conflict(Conflict::RequestExists))))
        .count();
    assert_eq!((ok, conflicts), (1, 1));

    let waiting = ChatRef::new(w.bob.id.clone(), w.alice.id.clone(), ChatStatus::Waiting);
    assert_eq!(w.count(&waiting.messages_path()).await, 1);
}
