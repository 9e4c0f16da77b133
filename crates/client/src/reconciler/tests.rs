use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use banter_shared::{
    Chat, ChatError, ChatKind, ClientEvent, FriendRequest, FriendshipStatus, Message, ReadUpdate,
    ServerEvent, User,
};
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Notify;

use super::*;
use crate::api_client::Directory;
use crate::ws::{EventSink, StreamEvent};

const ME: &str = "me";

// --- Fakes ---

#[derive(Default)]
struct FakeDirectory {
    chats: Mutex<Vec<Chat>>,
    users: Mutex<Vec<User>>,
    online: Mutex<Vec<User>>,
    history: Mutex<HashMap<String, Vec<Message>>>,
    fail_send: AtomicBool,
    fail_history: AtomicBool,
    slow_history: Mutex<Option<(String, Arc<Notify>)>>,
    slow_chats: Mutex<Option<Arc<Notify>>>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl FakeDirectory {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn called(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn list_chats(&self) -> Result<Vec<Chat>, ChatError> {
        self.record("list_chats");
        let gate = self.slow_chats.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.chats.lock().unwrap().clone())
    }

    async fn create_direct_chat(&self, user_id: &str) -> Result<Chat, ChatError> {
        self.record(format!("create_direct_chat:{user_id}"));
        Ok(direct(&format!("dm-{user_id}"), user_id, 1_000))
    }

    async fn create_group_chat(&self, name: &str, member_ids: &[String]) -> Result<Chat, ChatError> {
        self.record(format!("create_group_chat:{name}"));
        let mut members = vec![user(ME, FriendshipStatus::None)];
        members.extend(member_ids.iter().map(|id| user(id, FriendshipStatus::Friends)));
        Ok(Chat {
            id: "g-1".into(),
            kind: ChatKind::Group,
            name: Some(name.to_string()),
            members,
            latest_message: None,
            updated_at: Utc::now(),
        })
    }

    async fn list_users(&self) -> Result<Vec<User>, ChatError> {
        self.record("list_users");
        Ok(self.users.lock().unwrap().clone())
    }

    async fn list_online_users(&self) -> Result<Vec<User>, ChatError> {
        self.record("list_online_users");
        Ok(self.online.lock().unwrap().clone())
    }

    async fn list_friend_requests(&self) -> Result<Vec<FriendRequest>, ChatError> {
        self.record("list_friend_requests");
        Ok(Vec::new())
    }

    async fn send_friend_request(&self, user_id: &str) -> Result<(), ChatError> {
        self.record(format!("send_friend_request:{user_id}"));
        Ok(())
    }

    async fn accept_friend_request(&self, user_id: &str) -> Result<(), ChatError> {
        self.record(format!("accept_friend_request:{user_id}"));
        Ok(())
    }

    async fn reject_friend_request(&self, user_id: &str) -> Result<(), ChatError> {
        self.record(format!("reject_friend_request:{user_id}"));
        Ok(())
    }

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>, ChatError> {
        self.record(format!("list_messages:{chat_id}"));
        let gate = self
            .slow_history
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(id, _)| id == chat_id)
            .map(|(_, notify)| notify.clone());
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(ChatError::Network("offline".into()));
        }
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(chat_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(&self, chat_id: &str, content: &str) -> Result<Message, ChatError> {
        self.record(format!("send_message:{chat_id}"));
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ChatError::Network("offline".into()));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(Message {
            id: format!("sent-{n}"),
            chat_id: chat_id.to_string(),
            sender: user(ME, FriendshipStatus::None),
            content: content.to_string(),
            created_at: Utc::now(),
            read_by: Default::default(),
        })
    }

    async fn mark_read(&self, chat_id: &str) -> Result<(), ChatError> {
        self.record(format!("mark_read:{chat_id}"));
        Ok(())
    }

    async fn clear_chat(&self, chat_id: &str) -> Result<(), ChatError> {
        self.record(format!("clear_chat:{chat_id}"));
        Ok(())
    }
}

struct FakeSink {
    events: Mutex<Vec<ClientEvent>>,
    connected: AtomicBool,
}

impl FakeSink {
    fn count(&self, pred: impl Fn(&ClientEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for FakeSink {
    fn emit(&self, event: ClientEvent) -> Result<(), ChatError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ChatError::StreamDisconnected);
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

// --- Builders ---

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn user(id: &str, friendship: FriendshipStatus) -> User {
    User {
        id: id.into(),
        username: format!("user-{id}"),
        avatar: None,
        is_online: false,
        friendship,
    }
}

fn direct(id: &str, peer: &str, updated: i64) -> Chat {
    Chat {
        id: id.into(),
        kind: ChatKind::Direct,
        name: None,
        members: vec![
            user(ME, FriendshipStatus::None),
            user(peer, FriendshipStatus::Friends),
        ],
        latest_message: None,
        updated_at: at(updated),
    }
}

fn msg(chat: &str, id: &str, sender: &str, secs: i64) -> Message {
    Message {
        id: id.into(),
        chat_id: chat.into(),
        sender: user(sender, FriendshipStatus::Friends),
        content: format!("text of {id}"),
        created_at: at(secs),
        read_by: Default::default(),
    }
}

fn push(message: Message) -> StreamEvent {
    StreamEvent::Server(ServerEvent::MessageReceived(message))
}

fn fixture() -> (Reconciler, Arc<FakeDirectory>, Arc<FakeSink>) {
    let directory = Arc::new(FakeDirectory::default());
    let sink = Arc::new(FakeSink {
        events: Mutex::new(Vec::new()),
        connected: AtomicBool::new(true),
    });
    let reconciler = Reconciler::new(
        user(ME, FriendshipStatus::None),
        directory.clone(),
        sink.clone(),
        SyncConfig::default(),
    );
    (reconciler, directory, sink)
}

fn chat_order(r: &Reconciler) -> Vec<String> {
    r.with_state(|s| s.chats.chats().iter().map(|c| c.id.clone()).collect())
}

fn open_ids(r: &Reconciler) -> Vec<String> {
    r.with_state(|s| {
        s.open
            .as_ref()
            .map(|v| v.messages.iter().map(|m| m.id.clone()).collect())
            .unwrap_or_default()
    })
}

async fn eventually(cond: impl Fn() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never held");
}

// --- Delivery and ordering ---

#[tokio::test]
async fn optimistic_send_and_push_yield_one_entry() {
    let (r, dir, sink) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("c1", "peer", 10)];
    r.load_initial().await.unwrap();
    r.select_chat("c1").await.unwrap();

    r.update_composer("hello");
    let sent = r.send_message().await.unwrap();
    assert_eq!(r.composer(), "");

    r.apply_event(&push(sent.clone())).unwrap();
    r.apply_event(&push(sent.clone())).unwrap();

    assert_eq!(open_ids(&r), vec![sent.id.clone()]);
    assert_eq!(
        sink.count(|e| matches!(e, ClientEvent::NewMessage(m) if m.id == sent.id)),
        1
    );
    let latest = r.with_state(|s| s.chats.get("c1").unwrap().latest_message.clone());
    assert_eq!(latest.map(|m| m.id), Some(sent.id));
}

#[tokio::test]
async fn chats_stay_ordered_by_latest_message() {
    let (r, dir, _) = fixture();
    *dir.chats.lock().unwrap() = vec![
        direct("a", "pa", 10),
        direct("b", "pb", 20),
        direct("c", "pc", 30),
    ];
    r.load_initial().await.unwrap();
    assert_eq!(chat_order(&r), ["c", "b", "a"]);

    r.apply_event(&push(msg("a", "m1", "pa", 40))).unwrap();
    assert_eq!(chat_order(&r), ["a", "c", "b"]);
    r.apply_event(&push(msg("c", "m2", "pc", 50))).unwrap();
    r.apply_event(&push(msg("b", "m3", "pb", 45))).unwrap();
    assert_eq!(chat_order(&r), ["c", "b", "a"]);
    assert_eq!(dir.called("list_chats"), 1);
}

#[tokio::test]
async fn unread_counts_follow_the_active_chat() {
    let (r, dir, _) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("A", "pa", 10), direct("B", "pb", 20)];
    r.load_initial().await.unwrap();
    r.select_chat("A").await.unwrap();

    for i in 0..3 {
        r.apply_event(&push(msg("B", &format!("b{i}"), "pb", 100 + i))).unwrap();
    }
    assert_eq!(r.unread("B"), 3);
    assert_eq!(r.unread("A"), 0);
    let note = r.with_state(|s| s.notification.clone()).unwrap();
    assert_eq!(note.chat_id, "B");
    assert_eq!(note.sender_name, "user-pb");

    r.select_chat("B").await.unwrap();
    assert_eq!(r.unread("B"), 0);
    assert_eq!(dir.called("mark_read:B"), 1);
}

#[tokio::test]
async fn repeat_delivery_to_a_closed_chat_counts_once() {
    let (r, dir, _) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("A", "pa", 10), direct("B", "pb", 20)];
    r.load_initial().await.unwrap();
    r.select_chat("A").await.unwrap();

    let dup = msg("B", "dup-1", "pb", 100);
    r.apply_event(&push(dup.clone())).unwrap();
    r.with_state(|s| assert!(s.notification.is_some()));
    r.dismiss_notification();

    r.apply_event(&push(dup)).unwrap();
    assert_eq!(r.unread("B"), 1);
    assert!(r.with_state(|s| s.notification.is_none()));
}

#[tokio::test(start_paused = true)]
async fn repeat_delivery_to_the_open_chat_marks_read_once() {
    let (r, dir, _) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("A", "pa", 10)];
    r.load_initial().await.unwrap();
    r.select_chat("A").await.unwrap();
    assert_eq!(dir.called("mark_read:A"), 1);

    let m = msg("A", "a1", "pa", 100);
    r.apply_event(&push(m.clone())).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(dir.called("mark_read:A"), 2);

    r.apply_event(&push(m)).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(dir.called("mark_read:A"), 2);
    assert_eq!(open_ids(&r), ["a1"]);
}

#[tokio::test]
async fn own_messages_elsewhere_do_not_count_as_unread() {
    let (r, dir, _) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("A", "pa", 10), direct("B", "pb", 20)];
    r.load_initial().await.unwrap();
    r.select_chat("A").await.unwrap();

    r.apply_event(&push(msg("B", "mine", ME, 100))).unwrap();
    assert_eq!(r.unread("B"), 0);
    assert!(r.with_state(|s| s.notification.is_none()));
    assert_eq!(chat_order(&r)[0], "B");
}

#[tokio::test]
async fn message_for_unknown_chat_refreshes_the_list() {
    let (r, dir, _) = fixture();
    r.load_initial().await.unwrap();
    *dir.chats.lock().unwrap() = vec![direct("new", "peer", 10)];

    r.apply_event(&push(msg("new", "m1", "peer", 20))).unwrap();
    eventually(|| r.with_state(|s| s.chats.contains("new"))).await;
    assert_eq!(dir.called("list_chats"), 2);
}

#[tokio::test]
async fn malformed_push_is_rejected() {
    let (r, _, _) = fixture();
    let bad = msg("", "m1", "peer", 20);
    assert!(matches!(
        r.apply_event(&push(bad)),
        Err(ChatError::MalformedEvent(_))
    ));
}

// --- Read receipts ---

#[tokio::test]
async fn read_updates_are_idempotent() {
    let (r, dir, _) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("c1", "peer", 10)];
    dir.history.lock().unwrap().insert(
        "c1".into(),
        vec![
            msg("c1", "m1", ME, 1),
            msg("c1", "m2", "peer", 2),
            msg("c1", "m3", ME, 3),
        ],
    );
    r.load_initial().await.unwrap();
    r.select_chat("c1").await.unwrap();

    let update = StreamEvent::Server(ServerEvent::MessagesReadUpdate(ReadUpdate {
        chat_id: Some("c1".into()),
        user_id: "peer".into(),
    }));
    r.apply_event(&update).unwrap();
    let first = r.snapshot().open.unwrap();
    r.apply_event(&update).unwrap();
    let second = r.snapshot().open.unwrap();

    assert_eq!(first, second);
    let receipts: Vec<usize> = second.messages.iter().map(|m| m.read_by.len()).collect();
    assert_eq!(receipts, [1, 0, 1]);
}

#[tokio::test]
async fn opening_a_chat_broadcasts_read_only_when_connected() {
    let (r, dir, sink) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("c1", "peer", 10)];
    r.load_initial().await.unwrap();

    sink.connected.store(false, Ordering::SeqCst);
    r.select_chat("c1").await.unwrap();
    assert_eq!(dir.called("mark_read:c1"), 1);
    assert_eq!(sink.count(|e| matches!(e, ClientEvent::MessagesRead(_))), 0);

    sink.connected.store(true, Ordering::SeqCst);
    r.select_chat("c1").await.unwrap();
    assert_eq!(sink.count(|e| matches!(e, ClientEvent::MessagesRead(n) if n.user_id == ME)), 1);
}

// --- Sending ---

#[tokio::test]
async fn failed_send_restores_the_composer() {
    let (r, dir, sink) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("a", "pa", 10), direct("b", "pb", 20)];
    r.load_initial().await.unwrap();
    r.select_chat("a").await.unwrap();
    let order = chat_order(&r);

    dir.fail_send.store(true, Ordering::SeqCst);
    r.update_composer("draft text");
    let err = r.send_message().await.unwrap_err();

    assert_eq!(err, ChatError::Network("offline".into()));
    assert_eq!(r.composer(), "draft text");
    assert_eq!(chat_order(&r), order);
    assert!(open_ids(&r).is_empty());
    assert_eq!(sink.count(|e| matches!(e, ClientEvent::NewMessage(_))), 0);
}

#[tokio::test]
async fn send_preconditions_skip_the_network() {
    let (r, dir, _) = fixture();
    r.update_composer("hello");
    assert_eq!(r.send_message().await, Err(ChatError::NoActiveChat));

    *dir.chats.lock().unwrap() = vec![direct("c1", "peer", 10)];
    r.load_initial().await.unwrap();
    r.select_chat("c1").await.unwrap();
    r.update_composer("   ");
    assert_eq!(r.send_message().await, Err(ChatError::EmptyContent));
    assert_eq!(r.composer(), "   ");
    assert_eq!(dir.called("send_message:c1"), 0);
}

// --- Typing ---

#[tokio::test(start_paused = true)]
async fn typing_stop_is_sent_once_per_idle_period() {
    let (r, dir, sink) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("c1", "peer", 10)];
    r.load_initial().await.unwrap();
    r.select_chat("c1").await.unwrap();

    let typing = || sink.count(|e| matches!(e, ClientEvent::Typing(_)));
    let stops = || sink.count(|e| matches!(e, ClientEvent::StopTyping(_)));

    r.update_composer("h");
    tokio::time::sleep(Duration::from_secs(1)).await;
    r.update_composer("he");
    tokio::time::sleep(Duration::from_secs(1)).await;
    r.update_composer("hey");
    assert_eq!((typing(), stops()), (1, 0));

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!((typing(), stops()), (1, 1));
    assert!(!r.with_state(|s| s.is_typing));

    r.update_composer("hey!");
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!((typing(), stops()), (2, 2));

    // Sending ends the period immediately
    r.update_composer("again");
    r.send_message().await.unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!((typing(), stops()), (3, 3));
}

#[tokio::test(start_paused = true)]
async fn notification_expires_after_its_ttl() {
    let (r, dir, _) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("A", "pa", 10), direct("B", "pb", 20)];
    r.load_initial().await.unwrap();
    r.select_chat("A").await.unwrap();

    r.apply_event(&push(msg("B", "b1", "pb", 100))).unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(
        r.with_state(|s| s.notification.as_ref().map(|n| n.message_id.clone())),
        Some("b1".to_string())
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(r.with_state(|s| s.notification.is_none()));
    assert_eq!(r.unread("B"), 1);
}

#[tokio::test(start_paused = true)]
async fn pushes_into_the_open_chat_mark_read_after_a_quiet_period() {
    let (r, dir, _) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("A", "pa", 10)];
    r.load_initial().await.unwrap();
    r.select_chat("A").await.unwrap();
    assert_eq!(dir.called("mark_read:A"), 1);

    for i in 0..3 {
        r.apply_event(&push(msg("A", &format!("a{i}"), "pa", 100 + i))).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(dir.called("mark_read:A"), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(dir.called("mark_read:A"), 2);

    // Our own message needs no receipt
    r.apply_event(&push(msg("A", "mine", ME, 200))).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(dir.called("mark_read:A"), 2);
    assert_eq!(r.unread("A"), 0);
}

#[tokio::test]
async fn peer_typing_tracks_the_active_chat() {
    let (r, dir, _) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("c1", "peer", 10)];
    r.load_initial().await.unwrap();
    r.select_chat("c1").await.unwrap();

    r.apply_event(&StreamEvent::Server(ServerEvent::Typing("other".into())))
        .unwrap();
    assert!(!r.with_state(|s| s.peer_typing));
    r.apply_event(&StreamEvent::Server(ServerEvent::Typing("c1".into())))
        .unwrap();
    assert!(r.with_state(|s| s.peer_typing));
    r.apply_event(&StreamEvent::Server(ServerEvent::StopTyping("c1".into())))
        .unwrap();
    assert!(!r.with_state(|s| s.peer_typing));
}

// --- Selection ---

#[tokio::test]
async fn stale_history_is_discarded() {
    let (r, dir, _) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("c1", "p1", 10), direct("c2", "p2", 20)];
    {
        let mut history = dir.history.lock().unwrap();
        history.insert("c1".into(), vec![msg("c1", "m1", "p1", 1)]);
        history.insert("c2".into(), vec![msg("c2", "m2", "p2", 2)]);
    }
    let gate = Arc::new(Notify::new());
    *dir.slow_history.lock().unwrap() = Some(("c1".into(), gate.clone()));
    r.load_initial().await.unwrap();

    let slow = {
        let r = r.clone();
        tokio::spawn(async move { r.select_chat("c1").await })
    };
    eventually(|| dir.called("list_messages:c1") == 1).await;

    r.select_chat("c2").await.unwrap();
    gate.notify_one();
    slow.await.unwrap().unwrap();

    assert_eq!(r.active_chat().as_deref(), Some("c2"));
    assert_eq!(open_ids(&r), ["m2"]);
    assert_eq!(dir.called("mark_read:c1"), 0);
}

#[tokio::test]
async fn pushes_during_history_fetch_are_merged() {
    let (r, dir, _) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("c1", "peer", 10)];
    dir.history
        .lock()
        .unwrap()
        .insert("c1".into(), vec![msg("c1", "m1", "peer", 1)]);
    let gate = Arc::new(Notify::new());
    *dir.slow_history.lock().unwrap() = Some(("c1".into(), gate.clone()));
    r.load_initial().await.unwrap();

    let select = {
        let r = r.clone();
        tokio::spawn(async move { r.select_chat("c1").await })
    };
    eventually(|| dir.called("list_messages:c1") == 1).await;

    r.apply_event(&push(msg("c1", "m2", "peer", 2))).unwrap();
    gate.notify_one();
    select.await.unwrap().unwrap();

    assert_eq!(open_ids(&r), ["m1", "m2"]);
    assert_eq!(r.unread("c1"), 0);
}

#[tokio::test]
async fn failed_selection_restores_the_previous_chat() {
    let (r, dir, _) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("c1", "p1", 10), direct("c2", "p2", 20)];
    dir.history
        .lock()
        .unwrap()
        .insert("c1".into(), vec![msg("c1", "m1", "p1", 1)]);
    r.load_initial().await.unwrap();
    r.select_chat("c1").await.unwrap();
    r.apply_event(&push(msg("c2", "x", "p2", 30))).unwrap();
    assert_eq!(r.unread("c2"), 1);

    dir.fail_history.store(true, Ordering::SeqCst);
    assert!(r.select_chat("c2").await.is_err());

    assert_eq!(r.active_chat().as_deref(), Some("c1"));
    assert_eq!(open_ids(&r), ["m1"]);
    assert_eq!(r.unread("c2"), 1);
}

#[tokio::test]
async fn direct_chat_requires_a_friend() {
    let (r, dir, _) = fixture();
    *dir.users.lock().unwrap() = vec![
        user("friend", FriendshipStatus::Friends),
        user("stranger", FriendshipStatus::PendingSent),
    ];
    r.load_initial().await.unwrap();

    assert_eq!(
        r.select_chat("nope").await,
        Err(ChatError::UnknownChat("nope".into()))
    );
    assert_eq!(r.open_direct_chat("stranger").await, Err(ChatError::NotFriends));
    assert_eq!(dir.called("create_direct_chat:stranger"), 0);

    let id = r.open_direct_chat("friend").await.unwrap();
    assert_eq!(id, "dm-friend");
    assert_eq!(r.active_chat().as_deref(), Some("dm-friend"));
    assert_eq!(chat_order(&r), ["dm-friend"]);
}

// --- Groups ---

#[tokio::test]
async fn group_creation_is_validated() {
    let (r, dir, _) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("c1", "peer", 10)];
    r.load_initial().await.unwrap();

    for (name, members) in [
        ("", vec![]),
        ("Team", vec!["a".to_string()]),
        ("Team", vec!["a".to_string(), ME.to_string()]),
        ("   ", vec!["a".to_string(), "b".to_string()]),
    ] {
        assert!(matches!(
            r.create_group_chat(name, &members).await,
            Err(ChatError::InvalidGroup(_))
        ));
    }
    assert_eq!(dir.calls.lock().unwrap().iter().filter(|c| c.starts_with("create_group")).count(), 0);

    let chat = r
        .create_group_chat("Team", &["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    assert_eq!(chat.members.len(), 3);
    assert_eq!(chat_order(&r), ["g-1", "c1"]);
}

#[tokio::test]
async fn group_draft_is_cleared_after_creation() {
    let (r, _, _) = fixture();
    r.set_group_name("Team");
    r.toggle_group_member("a");
    r.toggle_group_member("b");
    r.toggle_group_member("c");
    r.toggle_group_member("c");
    assert_eq!(r.with_state(|s| s.group_draft.members.clone()), ["a", "b"]);

    r.submit_group_draft().await.unwrap();
    assert_eq!(r.with_state(|s| s.group_draft.clone()), GroupDraft::default());
}

// --- Presence and friends ---

#[tokio::test]
async fn presence_updates_in_place_and_refreshes_unknown_users() {
    let (r, dir, _) = fixture();
    *dir.users.lock().unwrap() = vec![user("peer", FriendshipStatus::Friends)];
    r.load_initial().await.unwrap();

    r.apply_event(&StreamEvent::Server(ServerEvent::UserOnline("peer".into())))
        .unwrap();
    assert!(r.with_state(|s| s.roster.is_online("peer")));
    r.apply_event(&StreamEvent::Server(ServerEvent::UserOffline("peer".into())))
        .unwrap();
    assert!(!r.with_state(|s| s.roster.is_online("peer")));
    assert_eq!(dir.called("list_users"), 1);

    r.apply_event(&StreamEvent::Server(ServerEvent::UserOnline("ghost".into())))
        .unwrap();
    eventually(|| dir.called("list_users") == 2).await;
}

#[tokio::test]
async fn friend_actions_emit_and_refresh() {
    let (r, dir, sink) = fixture();
    r.send_friend_request("u2").await.unwrap();
    assert_eq!(sink.count(|e| matches!(e, ClientEvent::FriendRequestSent(n) if n.to == "u2")), 1);

    r.accept_friend_request("u3").await.unwrap();
    assert_eq!(
        sink.count(|e| matches!(e, ClientEvent::FriendRequestAccepted(n) if n.from == ME)),
        1
    );
    assert_eq!(dir.called("list_online_users"), 1);

    r.reject_friend_request("u4").await.unwrap();
    assert_eq!(dir.called("list_friend_requests"), 3);
    assert_eq!(dir.called("list_users"), 3);
}

// --- History, reconnect, reset ---

#[tokio::test]
async fn clearing_a_chat_empties_view_and_latest() {
    let (r, dir, _) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("c1", "peer", 10)];
    dir.history
        .lock()
        .unwrap()
        .insert("c1".into(), vec![msg("c1", "m1", "peer", 1)]);
    r.load_initial().await.unwrap();
    assert_eq!(r.clear_active_chat().await, Err(ChatError::NoActiveChat));

    r.select_chat("c1").await.unwrap();
    r.apply_event(&push(msg("c1", "m2", "peer", 20))).unwrap();
    r.clear_active_chat().await.unwrap();

    assert!(open_ids(&r).is_empty());
    assert!(r.with_state(|s| s.chats.get("c1").unwrap().latest_message.is_none()));
    assert_eq!(dir.called("clear_chat:c1"), 1);
}

#[tokio::test]
async fn reconnect_resyncs_the_active_chat() {
    let (r, dir, sink) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("c1", "peer", 10)];
    r.load_initial().await.unwrap();
    r.select_chat("c1").await.unwrap();

    dir.history
        .lock()
        .unwrap()
        .insert("c1".into(), vec![msg("c1", "missed", "peer", 5)]);
    r.apply_event(&StreamEvent::Disconnected).unwrap();
    r.apply_event(&StreamEvent::Reconnected).unwrap();

    eventually(|| open_ids(&r) == ["missed"]).await;
    assert_eq!(dir.called("list_chats"), 2);
    assert_eq!(sink.count(|e| matches!(e, ClientEvent::JoinChat(id) if id == "c1")), 2);
    assert_eq!(r.with_state(|s| s.connection.clone()), ConnectionState::Connected);
}

#[tokio::test]
async fn exhausted_reconnect_is_reflected_in_state() {
    let (r, _, _) = fixture();
    r.apply_event(&StreamEvent::ReconnectFailed { attempts: 5 }).unwrap();
    assert!(r.with_state(|s| s.connection.is_failed()));
}

#[tokio::test]
async fn reset_discards_everything() {
    let (r, dir, _) = fixture();
    *dir.chats.lock().unwrap() = vec![direct("c1", "peer", 10), direct("c2", "p2", 20)];
    r.load_initial().await.unwrap();
    r.select_chat("c1").await.unwrap();
    r.apply_event(&push(msg("c2", "m1", "p2", 30))).unwrap();
    r.update_composer("half typed");

    let mut changes = r.subscribe();
    r.reset();
    assert!(changes.has_changed().unwrap());

    let state = r.snapshot();
    assert!(state.chats.is_empty());
    assert!(state.open.is_none());
    assert!(state.notification.is_none());
    assert_eq!(state.composer, "");
    assert!(!state.is_typing);
}

#[tokio::test]
async fn reset_cancels_refreshes_in_flight() {
    let (r, dir, _) = fixture();
    let gate = Arc::new(Notify::new());
    *dir.slow_chats.lock().unwrap() = Some(gate.clone());

    r.apply_event(&push(msg("ghost", "g1", "px", 10))).unwrap();
    eventually(|| dir.called("list_chats") == 1).await;

    r.reset();
    *dir.chats.lock().unwrap() = vec![direct("ghost", "px", 10)];
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(r.snapshot().chats.is_empty());
}
