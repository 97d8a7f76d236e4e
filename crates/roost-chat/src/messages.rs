//! Message lifecycle engine: send, edit, the two delete paths, and the
//! delivery/read status fanout.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use roost_db::models::{AttachmentRow, MessageRow};
use roost_db::{Database, queries};
use roost_types::events::ChatEvent;
use roost_types::models::{
    ConversationKind, DeliveryState, MessageKind, MessageLifecycle, PushNotification,
    ReactionGroup,
};
use roost_types::{ConversationId, MessageId, UserId};

use crate::error::{ChatError, ChatResult};
use crate::membership::{MembershipManager, NewUpload, require_conversation, require_user};
use crate::permissions;
use crate::publisher::Outgoing;
use crate::reactions::group_reactions;
use crate::storage::{FileStore, kind_for_name};
use crate::wire;

#[derive(Debug, Clone, Default)]
pub struct SendMessage {
    /// Target conversation; may be omitted when `receiver_id` is given,
    /// in which case the private conversation is resolved or created.
    pub conversation_id: Option<ConversationId>,
    pub receiver_id: Option<UserId>,
    pub body: Option<String>,
    pub kind: Option<MessageKind>,
    pub reply_to_id: Option<MessageId>,
    pub attachments: Vec<NewUpload>,
}

/// Result of a committed send: the persisted row, the events to
/// publish, and the push job to enqueue (if anyone is reachable).
pub struct SendOutcome {
    pub message: MessageRow,
    pub events: Vec<Outgoing>,
    pub push: Option<PushNotification>,
}

/// One message as one user sees it.
#[derive(Debug, Clone)]
pub struct MessageView {
    pub message: MessageRow,
    pub attachments: Vec<AttachmentRow>,
    pub reactions: Vec<ReactionGroup>,
}

pub struct MessageEngine {
    db: Arc<Database>,
    store: Arc<dyn FileStore>,
    membership: MembershipManager,
}

impl MessageEngine {
    pub fn new(db: Arc<Database>, store: Arc<dyn FileStore>) -> Self {
        let membership = MembershipManager::new(db.clone(), store.clone());
        Self {
            db,
            store,
            membership,
        }
    }

    pub fn send(&self, sender: UserId, req: SendMessage) -> ChatResult<SendOutcome> {
        let body = req.body.as_deref().map(str::trim).filter(|b| !b.is_empty());
        if body.is_none() && req.attachments.is_empty() {
            return Err(ChatError::validation(
                "A message body or at least one attachment is required.",
            ));
        }

        // Resolve the target before the send transaction; creating the
        // private conversation is its own atomic unit.
        let conversation_id = match (req.conversation_id, req.receiver_id) {
            (Some(id), _) => id,
            (None, Some(receiver)) => self.membership.create_private(sender, receiver)?.id,
            (None, None) => {
                return Err(ChatError::validation(
                    "Either conversation_id or receiver_id is required.",
                ));
            }
        };

        self.db.with_txn(|tx| {
            let convo = require_conversation(tx, conversation_id)?;

            if queries::active_participant(tx, conversation_id, sender)?.is_none() {
                return Err(ChatError::forbidden(
                    "You are no longer a member of this conversation.",
                ));
            }
            if !permissions::can_send_in(tx, conversation_id, sender)? {
                return Err(ChatError::forbidden(
                    "You are not allowed to send messages in this conversation.",
                ));
            }

            let participants = queries::active_participants(tx, conversation_id)?;

            // Block and restrict checks apply to private pairs only.
            let other = if convo.kind() == ConversationKind::Private {
                participants.iter().find(|p| p.user_id != sender).map(|p| p.user_id)
            } else {
                None
            };
            let mut is_restricted = false;
            if let Some(other) = other {
                if queries::has_blocked(tx, other, sender)? {
                    return Err(ChatError::forbidden(
                        "You cannot send message to this user.",
                    ));
                }
                is_restricted = queries::has_restricted(tx, other, sender)?;
            }

            // Kind defaults from the payload: classified by the first
            // attachment, `multiple` past one, plain text otherwise.
            let kind = match req.kind {
                Some(k) => k,
                None if req.attachments.len() > 1 => MessageKind::Multiple,
                None => match req.attachments.first() {
                    Some(a) => MessageKind::parse(kind_for_name(&a.original_name))
                        .unwrap_or(MessageKind::File),
                    None => MessageKind::Text,
                },
            };
            let message_id = queries::insert_message(
                tx,
                conversation_id,
                sender,
                body,
                kind,
                req.reply_to_id,
                is_restricted,
            )?;

            for upload in &req.attachments {
                let path =
                    self.store
                        .store("uploads/messages", &upload.original_name, &upload.data)?;
                queries::insert_attachment(
                    tx,
                    message_id,
                    &path,
                    kind_for_name(&upload.original_name),
                    Some(upload.data.len() as i64),
                    Some(&upload.original_name),
                )?;
            }

            // The sender implicitly reads their own message.
            queries::advance_last_read(tx, conversation_id, sender, message_id)?;

            // One status row per active participant, in one batch inside
            // this transaction: no partial fanout is ever visible.
            let statuses: Vec<(i64, DeliveryState)> = participants
                .iter()
                .map(|p| {
                    let state = if p.user_id == sender {
                        DeliveryState::Seen
                    } else {
                        DeliveryState::Sent
                    };
                    (p.user_id, state)
                })
                .collect();
            queries::insert_statuses(tx, message_id, &statuses)?;

            queries::touch_conversation(tx, conversation_id)?;

            let message = queries::get_message(tx, message_id)?
                .ok_or_else(|| ChatError::not_found("Message not found."))?;

            let events = vec![Outgoing::from(ChatEvent::Sent {
                message: wire::payload(&message),
            })];

            // Resolve push recipients now, while the roster is in view;
            // dispatch itself happens off the request path.
            let now = Utc::now();
            let mut tokens = Vec::new();
            for p in &participants {
                if p.user_id == sender || p.is_muted_now(now) {
                    continue;
                }
                tokens.extend(queries::tokens_for_user(tx, p.user_id)?);
            }
            let push = if tokens.is_empty() {
                None
            } else {
                let sender_row = require_user(tx, sender)?;
                let push_body = match kind {
                    MessageKind::Text => message
                        .body
                        .clone()
                        .unwrap_or_else(|| "New message received".into()),
                    _ => "Sent you an attachment".into(),
                };
                let mut data = HashMap::new();
                data.insert("type".into(), "chat_message".into());
                data.insert("conversation_id".into(), conversation_id.to_string());
                data.insert("message_id".into(), message_id.to_string());
                data.insert("sender_id".into(), sender.to_string());
                Some(PushNotification {
                    tokens,
                    title: sender_row.name,
                    body: push_body,
                    data,
                })
            };

            Ok(SendOutcome {
                message,
                events,
                push,
            })
        })
    }

    /// Edit a message body. Sender-only; no edit history is kept.
    pub fn update(
        &self,
        editor: UserId,
        message_id: MessageId,
        new_body: &str,
    ) -> ChatResult<(MessageRow, Vec<Outgoing>)> {
        let new_body = new_body.trim();
        if new_body.is_empty() {
            return Err(ChatError::validation("Message body must not be empty."));
        }
        self.db.with_txn(|tx| {
            let message = queries::get_message(tx, message_id)?
                .ok_or_else(|| ChatError::not_found("Message not found."))?;
            if message.sender_id != editor {
                return Err(ChatError::forbidden(
                    "You are not allowed to update this message.",
                ));
            }
            if message.lifecycle() == MessageLifecycle::Tombstoned {
                return Err(ChatError::conflict("This message has been deleted."));
            }

            queries::update_message_body(tx, message_id, new_body)?;
            let fresh = queries::get_message(tx, message_id)?
                .ok_or_else(|| ChatError::not_found("Message not found."))?;
            let events = vec![Outgoing::from(ChatEvent::Updated {
                message: wire::payload(&fresh),
            })];
            Ok((fresh, events))
        })
    }

    /// Hide messages from the caller's own view. Idempotent; unknown
    /// ids are skipped.
    pub fn delete_for_me(
        &self,
        user: UserId,
        message_ids: &[MessageId],
    ) -> ChatResult<Vec<Outgoing>> {
        if message_ids.is_empty() {
            return Err(ChatError::validation("No messages provided."));
        }
        self.db.with_txn(|tx| {
            let mut events = Vec::new();
            for &id in message_ids {
                let Some(message) = queries::get_message(tx, id)? else {
                    continue;
                };
                queries::insert_deletion(tx, id, user)?;
                events.push(Outgoing::from(ChatEvent::DeletedForMe {
                    conversation_id: message.conversation_id,
                    message_id: id,
                    user_id: user,
                }));
            }
            Ok(events)
        })
    }

    /// Two-phase delete. First call tombstones the message and strips
    /// its attachments; the second purges the row for good. A third
    /// call finds nothing.
    pub fn delete_for_everyone(
        &self,
        user: UserId,
        message_ids: &[MessageId],
    ) -> ChatResult<Vec<Outgoing>> {
        if message_ids.is_empty() {
            return Err(ChatError::validation("No messages provided."));
        }
        self.db.with_txn(|tx| {
            let mut events = Vec::new();
            for &id in message_ids {
                let message = queries::get_message(tx, id)?
                    .ok_or_else(|| ChatError::not_found("Message not found."))?;
                if message.sender_id != user {
                    return Err(ChatError::forbidden(
                        "You can only delete your own messages for everyone.",
                    ));
                }

                match message.lifecycle() {
                    MessageLifecycle::Tombstoned => {
                        queries::purge_message(tx, id)?;
                        events.push(Outgoing::from(ChatEvent::DeletedPermanent {
                            conversation_id: message.conversation_id,
                            message_id: id,
                        }));
                    }
                    MessageLifecycle::Active => {
                        queries::tombstone_message(tx, id)?;
                        for attachment in queries::attachments_for(tx, id)? {
                            self.store.delete(&attachment.path);
                        }
                        queries::delete_attachments(tx, id)?;
                        events.push(Outgoing::from(ChatEvent::DeletedForEveryone {
                            conversation_id: message.conversation_id,
                            message_id: id,
                            unsent: true,
                        }));
                    }
                }
            }
            Ok(events)
        })
    }

    /// Bulk sent -> delivered for one user in one conversation.
    pub fn mark_delivered(
        &self,
        user: UserId,
        conversation_id: ConversationId,
    ) -> ChatResult<(usize, Vec<Outgoing>)> {
        self.db.with_txn(|tx| {
            require_conversation(tx, conversation_id)?;
            let changed = queries::mark_delivered(tx, conversation_id, user)?;
            let events = vec![Outgoing::from(ChatEvent::Delivered {
                conversation_id,
                user_id: user,
            })];
            Ok((changed, events))
        })
    }

    /// Collapse the caller's whole unread run: advance the read mark to
    /// the newest message and flip every remaining status to seen. One
    /// event carries the high-water mark for receivers.
    pub fn mark_read(
        &self,
        user: UserId,
        conversation_id: ConversationId,
    ) -> ChatResult<Option<(MessageId, Vec<Outgoing>)>> {
        self.db.with_txn(|tx| {
            require_conversation(tx, conversation_id)?;
            let Some(latest) = queries::latest_message_id(tx, conversation_id)? else {
                return Ok(None);
            };

            queries::advance_last_read(tx, conversation_id, user, latest)?;
            queries::mark_seen_all(tx, conversation_id, user)?;

            let events = vec![Outgoing::from(ChatEvent::Seen {
                conversation_id,
                user_id: user,
                last_read_message_id: latest,
            })];
            Ok(Some((latest, events)))
        })
    }

    /// Messages as one participant sees them: delete-for-me rows
    /// hidden, restricted bodies blanked for the restricting viewer.
    pub fn messages_for(
        &self,
        user: UserId,
        conversation_id: ConversationId,
        query: Option<&str>,
    ) -> ChatResult<Vec<MessageView>> {
        self.db.with_conn(|conn| {
            require_conversation(conn, conversation_id)?;
            if queries::get_participant(conn, conversation_id, user)?.is_none() {
                return Err(ChatError::forbidden(
                    "You are not allowed to view this conversation.",
                ));
            }

            let rows = queries::messages_for(conn, conversation_id, user, query)?;
            let ids: Vec<i64> = rows.iter().map(|m| m.id).collect();
            let reaction_rows = queries::reactions_for_messages(conn, &ids)?;

            let mut by_message: HashMap<i64, Vec<roost_db::models::ReactionRow>> = HashMap::new();
            for r in reaction_rows {
                by_message.entry(r.message_id).or_default().push(r);
            }

            let mut views = Vec::with_capacity(rows.len());
            for mut message in rows {
                if message.is_restricted && message.sender_id != user {
                    message.body = None;
                }
                let attachments = queries::attachments_for(conn, message.id)?;
                let reactions = by_message
                    .get(&message.id)
                    .map(|rows| group_reactions(rows))
                    .unwrap_or_default();
                views.push(MessageView {
                    message,
                    attachments,
                    reactions,
                });
            }
            Ok(views)
        })
    }
}
