//! Integration tests for change-feed subscriptions and the lists built on
//! top of them.
//!
//! Verifies that:
//! - Subscriptions start with a snapshot and detach on release or drop
//! - The people list hides the current user and filters by name
//! - Chat lists surface new requests and incoming activity, and follow a
//!   request from the waiting bucket into the active one

use std::sync::Arc;

use futures_util::StreamExt;

use chatsync::chat::{ChatEvent, ChatList, ChatStateMachine, ListUpdate, Session, UserDirectory};
use chatsync::error::ChatError;
use chatsync::media::MemoryMedia;
use chatsync::store::{Directory, MemoryStore, StoreError};

use chatsync_proto::change::ChangeKind;
use chatsync_proto::chat::ChatStatus;
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
    media: Arc<MemoryMedia>,
}

impl World {
    fn new() -> Self {
        let store = MemoryStore::new();
        Self {
            dir: Arc::new(Directory::new(store.clone())),
            store,
            media: Arc::new(MemoryMedia::new()),
        }
    }

    fn machine(&self, who: User) -> Machine {
        ChatStateMachine::new(Session::new(who), Arc::clone(&self.dir), Arc::clone(&self.media))
    }

    async fn register(&self, users: &[User]) {
        for u in users {
            self.dir.save_user(u).await.unwrap();
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_batch_is_a_snapshot() {
    let w = World::new();
    w.register(&[user("a1", "Alice"), user("b1", "Bob")]).await;

    let mut sub = w.dir.subscribe_users().unwrap();
    let snapshot = sub.recv().await.unwrap();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.iter().all(|c| c.kind == ChangeKind::Added));
    sub.release();
}

#[tokio::test]
async fn empty_collection_still_yields_a_snapshot() {
    let w = World::new();
    let mut sub = w.dir.subscribe_users().unwrap();
    assert!(sub.recv().await.unwrap().is_empty());
    sub.release();
}

#[tokio::test]
async fn release_detaches_listener() {
    let w = World::new();
    let sub = w.dir.subscribe_users().unwrap();
    let chats = w
        .dir
        .subscribe_relationships(&UserId::new("a1"), ChatStatus::Active)
        .unwrap();
    assert_eq!(w.store.listener_count(), 2);

    sub.release();
    assert_eq!(w.store.listener_count(), 1);
    chats.release();
    assert_eq!(w.store.listener_count(), 0);

    // Writes after release reach nobody.
    w.register(&[user("c1", "Carol")]).await;
    assert_eq!(w.store.listener_count(), 0);
}

#[tokio::test]
async fn dropped_subscription_detaches_too() {
    let w = World::new();
    {
        let _sub = w.dir.subscribe_users().unwrap();
        assert_eq!(w.store.listener_count(), 1);
    }
    assert_eq!(w.store.listener_count(), 0);
}

#[tokio::test]
async fn subscribing_while_offline_fails() {
    let w = World::new();
    w.store.set_offline(true);
    assert!(matches!(
        w.dir.subscribe_users(),
        Err(StoreError::Unavailable(_))
    ));
    let alice = w.machine(user("a1", "Alice"));
    assert!(matches!(
        alice.subscribe_chats(ChatStatus::Waiting),
        Err(ChatError::ReadFailed(StoreError::Unavailable(_)))
    ));
}

#[tokio::test]
async fn subscription_is_a_stream() {
    let w = World::new();
    let mut sub = w.dir.subscribe_users().unwrap();
    assert!(sub.next().await.unwrap().is_empty());

    w.register(&[user("b1", "Bob")]).await;
    let batch = sub.next().await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].item.display_name, "Bob");
    sub.release();
}

// ---------------------------------------------------------------------------
// People list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn people_list_hides_me_and_filters() {
    let w = World::new();
    w.register(&[
        user("a1", "Alice"),
        user("b1", "Bob"),
        user("c1", "Carol"),
    ])
    .await;
    let alice = w.machine(user("a1", "Alice"));

    let mut sub = alice.subscribe_people().unwrap();
    let mut people = UserDirectory::new(UserId::new("a1"));
    people.pump(&mut sub).await.unwrap();
    assert_eq!(people.len(), 2);
    assert!(people.filtered(None).iter().all(|u| u.id != UserId::new("a1")));

    let carol: Vec<_> = people.filtered(Some("CAR")).into_iter().map(|u| u.id.clone()).collect();
    assert_eq!(carol, vec![UserId::new("c1")]);
    assert_eq!(people.items(Some("")).len(), 2);

    // A profile edit replaces the row in place.
    w.register(&[user("b1", "Robert")]).await;
    assert_eq!(people.pump(&mut sub).await.unwrap(), vec![ListUpdate::Replaced(0)]);
    assert_eq!(people.filtered(Some("rob")).len(), 1);

    // My own edits never show up.
    w.register(&[user("a1", "Alicia")]).await;
    assert_eq!(people.pump(&mut sub).await.unwrap(), vec![ListUpdate::Unchanged]);
    assert_eq!(people.len(), 2);

    sub.release();
}

// ---------------------------------------------------------------------------
// Chat lists
// ---------------------------------------------------------------------------

#[tokio::test]
async fn waiting_list_reports_new_request_then_clears_on_accept() {
    let w = World::new();
    let (alice_user, bob_user) = (user("a1", "Alice"), user("b1", "Bob"));
    let alice = w.machine(alice_user);
    let bob = w.machine(bob_user.clone());

    let mut sub = bob.subscribe_chats(ChatStatus::Waiting).unwrap();
    let mut waiting = ChatList::new(ChatStatus::Waiting);
    assert!(waiting.pump(&mut sub).await.unwrap().is_empty());

    let request = alice.send_request(&bob_user, "Hi").await.unwrap();
    let events = waiting.pump(&mut sub).await.unwrap();
    let [ChatEvent::NewRequest(row)] = events.as_slice() else {
        panic!("expected one new request, got {events:?}");
    };
    assert_eq!(row.peer_id, request.peer_id);
    assert_eq!(row.status, ChatStatus::Waiting);
    assert_eq!(waiting.get(&UserId::new("a1")).unwrap().last_message_content, "Hi");

    bob.accept(&request).await.unwrap();
    assert!(waiting.pump(&mut sub).await.unwrap().is_empty());
    assert!(waiting.is_empty());

    sub.release();
}

#[tokio::test]
async fn active_list_reports_only_peer_activity() {
    let w = World::new();
    let (alice_user, bob_user) = (user("a1", "Alice"), user("b1", "Bob"));
    let alice = w.machine(alice_user);
    let bob = w.machine(bob_user.clone());
    let request = alice.send_request(&bob_user, "Hi").await.unwrap();
    let bob_row = bob.accept(&request).await.unwrap();

    let mut sub = alice.subscribe_chats(ChatStatus::Active).unwrap();
    let mut active = ChatList::new(ChatStatus::Active);
    assert!(active.pump(&mut sub).await.unwrap().is_empty());
    assert_eq!(active.len(), 1);
    let alice_row = active.get(&UserId::new("b1")).unwrap().clone();

    bob.send_text(&bob_row, "Hello back").await.unwrap();
    let events = active.pump(&mut sub).await.unwrap();
    assert_eq!(events.len(), 1);
    let ChatEvent::IncomingActivity(row) = &events[0] else {
        panic!("expected incoming activity, got {events:?}");
    };
    assert_eq!(row.last_message_content, "Hello back");
    assert_eq!(row.last_message_sender_id, UserId::new("b1"));

    alice.send_text(&alice_row, "Great").await.unwrap();
    assert!(active.pump(&mut sub).await.unwrap().is_empty());
    assert_eq!(active.get(&UserId::new("b1")).unwrap().last_message_content, "Great");

    sub.release();
}

#[tokio::test]
async fn chat_list_sorts_most_recent_first() {
    let w = World::new();
    let me = user("a1", "Alice");
    let alice = w.machine(me.clone());
    for (id, name) in [("b1", "Bob"), ("c1", "Carol")] {
        let peer = user(id, name);
        let request = w.machine(peer.clone()).send_request(&me, "Hi").await.unwrap();
        alice.accept(&request).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let mut sub = alice.subscribe_chats(ChatStatus::Active).unwrap();
    let mut active = ChatList::new(ChatStatus::Active);
    active.pump(&mut sub).await.unwrap();

    let order: Vec<_> = active.sorted().iter().map(|r| r.peer_id.clone()).collect();
    assert_eq!(order, vec![UserId::new("c1"), UserId::new("b1")]);
    sub.release();
}
