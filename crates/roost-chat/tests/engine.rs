//! End-to-end engine tests against an in-memory database, a recording
//! publisher, and an in-memory file store.

use std::sync::Arc;

use roost_chat::membership::NewUpload;
use roost_chat::messages::SendMessage;
use roost_chat::publisher::RecordingPublisher;
use roost_chat::storage::MemoryFileStore;
use roost_chat::{ChatError, ChatService};
use roost_db::{Database, queries};
use roost_types::UserId;
use roost_types::events::{Channel, ChatEvent, ConversationAction};
use roost_types::models::{DeliveryState, MessageKind, Role};

struct Harness {
    db: Arc<Database>,
    service: ChatService,
    recorder: Arc<RecordingPublisher>,
    store: Arc<MemoryFileStore>,
    push_rx: tokio::sync::mpsc::UnboundedReceiver<roost_types::models::PushNotification>,
}

fn harness() -> Harness {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let recorder = Arc::new(RecordingPublisher::default());
    let store = Arc::new(MemoryFileStore::default());
    let (push_tx, push_rx) = tokio::sync::mpsc::unbounded_channel();
    let service = ChatService::new(
        db.clone(),
        store.clone(),
        recorder.clone(),
        Some(push_tx),
    );
    Harness {
        db,
        service,
        recorder,
        store,
        push_rx,
    }
}

fn user(h: &Harness, name: &str) -> UserId {
    h.db.with_conn::<_, rusqlite::Error, _>(|conn| queries::insert_user(conn, name))
        .unwrap()
}

fn text(body: &str, conversation_id: i64) -> SendMessage {
    SendMessage {
        conversation_id: Some(conversation_id),
        body: Some(body.into()),
        ..Default::default()
    }
}

#[test]
fn send_fans_out_one_status_row_per_active_participant() {
    let h = harness();
    let (alice, bob, carol) = (user(&h, "alice"), user(&h, "bob"), user(&h, "carol"));
    let group = h
        .service
        .create_group(alice, &[bob, carol], "lunch")
        .unwrap();

    let message = h.service.send_message(alice, text("hello", group.id)).unwrap();

    let statuses = h
        .db
        .with_conn::<_, rusqlite::Error, _>(|conn| queries::statuses_for_message(conn, message.id))
        .unwrap();
    assert_eq!(statuses.len(), 3);
    let seen: Vec<_> = statuses
        .iter()
        .filter(|s| s.status() == DeliveryState::Seen)
        .collect();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].user_id, alice);

    let events = h.recorder.take();
    assert!(events.iter().any(|o| {
        o.channel == Channel::Conversation(group.id) && matches!(o.event, ChatEvent::Sent { .. })
    }));
}

#[test]
fn delivery_states_only_move_forward() {
    let h = harness();
    let (alice, bob) = (user(&h, "alice"), user(&h, "bob"));
    let convo = h.service.create_private(alice, bob).unwrap();
    let message = h.service.send_message(alice, text("hi", convo.id)).unwrap();

    assert_eq!(h.service.mark_delivered(bob, convo.id).unwrap(), 1);
    let latest = h.service.mark_read(bob, convo.id).unwrap();
    assert_eq!(latest, Some(message.id));

    // A late delivery receipt must not regress the seen status.
    assert_eq!(h.service.mark_delivered(bob, convo.id).unwrap(), 0);
    let statuses = h
        .db
        .with_conn::<_, rusqlite::Error, _>(|conn| queries::statuses_for_message(conn, message.id))
        .unwrap();
    let bobs = statuses.iter().find(|s| s.user_id == bob).unwrap();
    assert_eq!(bobs.status(), DeliveryState::Seen);

    // Read mark never moves backwards either.
    h.service.send_message(alice, text("again", convo.id)).unwrap();
    h.service.mark_read(bob, convo.id).unwrap();
    let p = h
        .db
        .with_conn::<_, rusqlite::Error, _>(|conn| queries::get_participant(conn, convo.id, bob))
        .unwrap()
        .unwrap();
    let high = p.last_read_message_id.unwrap();
    assert!(high > message.id);
}

#[test]
fn muted_participants_are_left_out_of_push_fanout() {
    let mut h = harness();
    let (alice, bob, carol) = (user(&h, "alice"), user(&h, "bob"), user(&h, "carol"));
    let group = h.service.create_group(alice, &[bob, carol], "ops").unwrap();

    h.service.register_device(bob, "bob-token").unwrap();
    h.service.register_device(carol, "carol-token").unwrap();
    h.service.mute(carol, group.id, 1).unwrap();

    h.service.send_message(alice, text("ping", group.id)).unwrap();

    let push = h.push_rx.try_recv().unwrap();
    assert_eq!(push.tokens, vec!["bob-token".to_string()]);
    assert_eq!(push.title, "alice");
    assert_eq!(push.body, "ping");
    assert_eq!(push.data.get("type").map(String::as_str), Some("chat_message"));

    // Unmute (0 minutes) brings carol back in.
    h.service.mute(carol, group.id, 0).unwrap();
    h.service.send_message(alice, text("pong", group.id)).unwrap();
    let push = h.push_rx.try_recv().unwrap();
    assert_eq!(push.tokens.len(), 2);
}

#[test]
fn blocking_is_asymmetric_and_reversible() {
    let h = harness();
    let (alice, bob) = (user(&h, "alice"), user(&h, "bob"));
    let convo = h.service.create_private(alice, bob).unwrap();

    assert!(h.service.toggle_block(bob, alice).unwrap());
    let err = h.service.send_message(alice, text("hi", convo.id)).unwrap_err();
    assert!(matches!(err, ChatError::Forbidden(_)));

    // The blocker can still write.
    h.service.send_message(bob, text("fine", convo.id)).unwrap();

    assert!(!h.service.toggle_block(bob, alice).unwrap());
    h.service.send_message(alice, text("hi again", convo.id)).unwrap();
}

#[test]
fn restricted_bodies_are_hidden_from_the_restrictor() {
    let h = harness();
    let (alice, bob) = (user(&h, "alice"), user(&h, "bob"));
    let convo = h.service.create_private(alice, bob).unwrap();

    assert!(h.service.toggle_restrict(bob, alice).unwrap());
    let message = h.service.send_message(alice, text("secret", convo.id)).unwrap();
    assert!(message.is_restricted);

    let bob_view = h.service.messages_for(bob, convo.id, None).unwrap();
    assert_eq!(bob_view.last().unwrap().message.body, None);

    let alice_view = h.service.messages_for(alice, convo.id, None).unwrap();
    assert_eq!(
        alice_view.last().unwrap().message.body.as_deref(),
        Some("secret")
    );
}

#[test]
fn group_settings_gate_member_roster_changes() {
    let h = harness();
    let (alice, bob, carol) = (user(&h, "alice"), user(&h, "bob"), user(&h, "carol"));
    let group = h.service.create_group(alice, &[bob], "team").unwrap();

    // Default settings: members cannot manage the roster.
    let err = h.service.add_members(bob, group.id, &[carol]).unwrap_err();
    assert!(matches!(err, ChatError::Forbidden(_)));

    let system = h.service.add_members(alice, group.id, &[carol]).unwrap();
    assert_eq!(system.len(), 1);
    assert_eq!(system[0].kind(), MessageKind::System);
    assert_eq!(
        system[0].body.as_deref(),
        Some("alice added carol to the conversation")
    );

    let events = h.recorder.take();
    assert!(events.iter().any(|o| {
        matches!(
            o.event,
            ChatEvent::Conversation {
                action: ConversationAction::Added,
                target_user_id,
                ..
            } if target_user_id == carol
        )
    }));

    // Opening the flag lets plain members add.
    let patch = roost_chat::membership::SettingsPatch {
        allow_members_to_add_remove_participants: Some(true),
        ..Default::default()
    };
    h.service.update_group_settings(alice, group.id, patch).unwrap();
    let dave = user(&h, "dave");
    h.service.add_members(bob, group.id, &[dave]).unwrap();
}

#[test]
fn adding_an_active_member_again_is_a_no_op() {
    let h = harness();
    let (alice, bob) = (user(&h, "alice"), user(&h, "bob"));
    let group = h.service.create_group(alice, &[bob], "team").unwrap();

    let system = h.service.add_members(alice, group.id, &[bob]).unwrap();
    assert!(system.is_empty());

    // Removed then re-added: the single participant row is reactivated.
    h.service.remove_members(alice, group.id, &[bob]).unwrap();
    let system = h.service.add_members(alice, group.id, &[bob]).unwrap();
    assert_eq!(system.len(), 1);
    let members = h.service.members(alice, group.id).unwrap();
    assert_eq!(members.iter().filter(|p| p.user_id == bob).count(), 1);
}

#[test]
fn removed_members_cannot_send() {
    let h = harness();
    let (alice, bob) = (user(&h, "alice"), user(&h, "bob"));
    let group = h.service.create_group(alice, &[bob], "team").unwrap();

    h.service.remove_members(alice, group.id, &[bob]).unwrap();
    let err = h.service.send_message(bob, text("still here?", group.id)).unwrap_err();
    assert!(matches!(err, ChatError::Forbidden(_)));
}

#[test]
fn leaving_emits_a_system_message_and_targeted_event() {
    let h = harness();
    let (alice, bob) = (user(&h, "alice"), user(&h, "bob"));
    let group = h.service.create_group(alice, &[bob], "team").unwrap();
    h.recorder.take();

    let message = h.service.leave(bob, group.id).unwrap();
    assert_eq!(message.body.as_deref(), Some("bob left the conversation"));

    let events = h.recorder.take();
    assert!(events.iter().any(|o| {
        o.channel == Channel::User(bob)
            && matches!(
                o.event,
                ChatEvent::Conversation {
                    action: ConversationAction::Left,
                    ..
                }
            )
    }));

    // A second leave finds nothing to flip.
    assert!(h.service.leave(bob, group.id).is_err());
}

#[test]
fn role_flips_never_touch_the_super_admin() {
    let h = harness();
    let (alice, bob) = (user(&h, "alice"), user(&h, "bob"));
    let group = h.service.create_group(alice, &[bob], "team").unwrap();

    assert_eq!(
        h.service.set_role(alice, group.id, &[bob], Role::Admin).unwrap(),
        1
    );
    // Demoting everyone only hits plain admins.
    assert_eq!(
        h.service
            .set_role(alice, group.id, &[alice, bob], Role::Member)
            .unwrap(),
        1
    );
    let members = h.service.members(alice, group.id).unwrap();
    let creator = members.iter().find(|p| p.user_id == alice).unwrap();
    assert_eq!(creator.role(), Role::SuperAdmin);

    let err = h
        .service
        .set_role(alice, group.id, &[bob], Role::SuperAdmin)
        .unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
}

#[test]
fn delete_for_everyone_is_two_phase() {
    let h = harness();
    let (alice, bob) = (user(&h, "alice"), user(&h, "bob"));
    let convo = h.service.create_private(alice, bob).unwrap();
    let message = h
        .service
        .send_message(
            alice,
            SendMessage {
                conversation_id: Some(convo.id),
                body: Some("oops".into()),
                attachments: vec![NewUpload {
                    original_name: "photo.png".into(),
                    data: vec![1, 2, 3],
                }],
                ..Default::default()
            },
        )
        .unwrap();
    h.recorder.take();

    // Bob cannot delete alice's message for everyone.
    let err = h
        .service
        .delete_messages_for_everyone(bob, &[message.id])
        .unwrap_err();
    assert!(matches!(err, ChatError::Forbidden(_)));

    // Phase one: tombstone, attachments stripped.
    h.service
        .delete_messages_for_everyone(alice, &[message.id])
        .unwrap();
    let row = h
        .db
        .with_conn::<_, rusqlite::Error, _>(|conn| queries::get_message(conn, message.id))
        .unwrap()
        .unwrap();
    assert_eq!(row.body.as_deref(), Some("Unsent"));
    assert_eq!(h.service.attachments(message.id).unwrap().len(), 0);
    assert_eq!(h.store.deleted.lock().unwrap().len(), 1);
    let events = h.recorder.take();
    assert!(events.iter().any(|o| matches!(
        o.event,
        ChatEvent::DeletedForEveryone { unsent: true, .. }
    )));

    // Phase two: the row is purged.
    h.service
        .delete_messages_for_everyone(alice, &[message.id])
        .unwrap();
    let gone = h
        .db
        .with_conn::<_, rusqlite::Error, _>(|conn| queries::get_message(conn, message.id))
        .unwrap();
    assert!(gone.is_none());
    let events = h.recorder.take();
    assert!(events.iter().any(|o| matches!(o.event, ChatEvent::DeletedPermanent { .. })));

    // Phase three: nothing left to delete.
    let err = h
        .service
        .delete_messages_for_everyone(alice, &[message.id])
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));
}

#[test]
fn delete_for_me_hides_only_the_callers_view() {
    let h = harness();
    let (alice, bob) = (user(&h, "alice"), user(&h, "bob"));
    let convo = h.service.create_private(alice, bob).unwrap();
    let message = h.service.send_message(alice, text("hi", convo.id)).unwrap();

    h.service.delete_messages_for_me(bob, &[message.id]).unwrap();

    let bob_view = h.service.messages_for(bob, convo.id, None).unwrap();
    assert!(bob_view.iter().all(|v| v.message.id != message.id));
    let alice_view = h.service.messages_for(alice, convo.id, None).unwrap();
    assert!(alice_view.iter().any(|v| v.message.id == message.id));

    // Idempotent, and unknown ids are skipped.
    h.service
        .delete_messages_for_me(bob, &[message.id, 9999])
        .unwrap();
}

#[test]
fn reaction_toggle_is_an_involution() {
    let h = harness();
    let (alice, bob) = (user(&h, "alice"), user(&h, "bob"));
    let convo = h.service.create_private(alice, bob).unwrap();
    let message = h.service.send_message(alice, text("hi", convo.id)).unwrap();

    let grouped = h.service.toggle_reaction(bob, message.id, "👍").unwrap();
    assert_eq!(grouped.len(), 1);
    assert_eq!(grouped[0].user_ids, vec![bob]);

    // A different reaction replaces, never stacks.
    let grouped = h.service.toggle_reaction(bob, message.id, "❤️").unwrap();
    assert_eq!(grouped.len(), 1);
    assert_eq!(grouped[0].reaction, "❤️");

    // Same reaction again removes it.
    let grouped = h.service.toggle_reaction(bob, message.id, "❤️").unwrap();
    assert!(grouped.is_empty());
    assert_eq!(h.service.reactions(message.id).unwrap().total, 0);
}

#[test]
fn private_conversations_are_idempotent_per_pair() {
    let h = harness();
    let (alice, bob) = (user(&h, "alice"), user(&h, "bob"));

    let first = h.service.create_private(alice, bob).unwrap();
    let second = h.service.create_private(bob, alice).unwrap();
    assert_eq!(first.id, second.id);

    // Self conversation is its own kind, distinct from any pair.
    let own = h.service.create_private(alice, alice).unwrap();
    assert_ne!(own.id, first.id);
    let again = h.service.create_private(alice, alice).unwrap();
    assert_eq!(own.id, again.id);
}

#[test]
fn send_by_receiver_id_resolves_the_private_conversation() {
    let h = harness();
    let (alice, bob) = (user(&h, "alice"), user(&h, "bob"));

    let message = h
        .service
        .send_message(
            alice,
            SendMessage {
                receiver_id: Some(bob),
                body: Some("first contact".into()),
                ..Default::default()
            },
        )
        .unwrap();

    let convo = h.service.create_private(alice, bob).unwrap();
    assert_eq!(message.conversation_id, convo.id);
}

#[test]
fn empty_sends_and_edits_are_rejected() {
    let h = harness();
    let (alice, bob) = (user(&h, "alice"), user(&h, "bob"));
    let convo = h.service.create_private(alice, bob).unwrap();

    let err = h
        .service
        .send_message(alice, text("   ", convo.id))
        .unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));

    let message = h.service.send_message(alice, text("hi", convo.id)).unwrap();
    let err = h.service.update_message(bob, message.id, "mine now").unwrap_err();
    assert!(matches!(err, ChatError::Forbidden(_)));

    h.service.delete_messages_for_everyone(alice, &[message.id]).unwrap();
    let err = h.service.update_message(alice, message.id, "too late").unwrap_err();
    assert!(matches!(err, ChatError::Conflict(_)));
}

#[test]
fn conversation_list_orders_by_recency_with_unread_counts() {
    let h = harness();
    let (alice, bob, carol) = (user(&h, "alice"), user(&h, "bob"), user(&h, "carol"));
    let pair = h.service.create_private(alice, bob).unwrap();
    let group = h.service.create_group(alice, &[bob, carol], "book club").unwrap();

    h.service.send_message(bob, text("hi alice", pair.id)).unwrap();
    h.service.send_message(carol, text("meeting?", group.id)).unwrap();
    h.service.send_message(carol, text("tonight", group.id)).unwrap();

    // The group was touched last, so it sorts first; unread counts are
    // per viewer and skip the viewer's own messages.
    let list = h.service.conversations_for(alice, None).unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].conversation.id, group.id);
    assert_eq!(list[0].unread_count, 2);
    assert_eq!(list[1].conversation.id, pair.id);
    assert_eq!(list[1].unread_count, 1);

    // A new message in the pair flips the ordering. Touch timestamps
    // have millisecond resolution, so step past the previous touch.
    std::thread::sleep(std::time::Duration::from_millis(5));
    h.service.send_message(bob, text("you there?", pair.id)).unwrap();
    let list = h.service.conversations_for(alice, None).unwrap();
    assert_eq!(list[0].conversation.id, pair.id);
    assert_eq!(list[0].unread_count, 2);

    // Reading collapses the count to zero.
    h.service.mark_read(alice, pair.id).unwrap();
    let list = h.service.conversations_for(alice, None).unwrap();
    assert_eq!(list[0].unread_count, 0);

    // Filtering: group name, or the other participant's name for pairs.
    let list = h.service.conversations_for(alice, Some("book")).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].conversation.id, group.id);
    let list = h.service.conversations_for(alice, Some("bob")).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].conversation.id, pair.id);

    // Leaving drops the conversation from the list.
    h.service.leave(alice, group.id).unwrap();
    let list = h.service.conversations_for(alice, None).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].conversation.id, pair.id);
}

#[test]
fn deleting_a_group_is_an_admin_action_and_takes_everything_with_it() {
    let h = harness();
    let (alice, bob) = (user(&h, "alice"), user(&h, "bob"));
    let group = h.service.create_group(alice, &[bob], "team").unwrap();
    let message = h.service.send_message(alice, text("minutes", group.id)).unwrap();

    let err = h.service.delete_group(bob, group.id).unwrap_err();
    assert!(matches!(err, ChatError::Forbidden(_)));

    // Private conversations are not deletable this way.
    let pair = h.service.create_private(alice, bob).unwrap();
    let err = h.service.delete_group(alice, pair.id).unwrap_err();
    assert!(matches!(err, ChatError::Forbidden(_)));

    h.service.delete_group(alice, group.id).unwrap();
    let gone = h
        .db
        .with_conn::<_, rusqlite::Error, _>(|conn| queries::get_conversation(conn, group.id))
        .unwrap();
    assert!(gone.is_none());
    let message_gone = h
        .db
        .with_conn::<_, rusqlite::Error, _>(|conn| queries::get_message(conn, message.id))
        .unwrap();
    assert!(message_gone.is_none());
    assert!(h.service.delete_group(alice, group.id).is_err());
}

#[test]
fn typing_goes_to_the_presence_channel() {
    let h = harness();
    let (alice, bob) = (user(&h, "alice"), user(&h, "bob"));
    let convo = h.service.create_private(alice, bob).unwrap();

    h.service.typing(alice, convo.id, true);
    let events = h.recorder.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].channel, Channel::Presence);

    h.service.touch_activity(alice).unwrap();
    assert!(h.service.is_online(alice).unwrap());
}
