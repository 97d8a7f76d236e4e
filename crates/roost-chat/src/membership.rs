//! Membership manager: conversation creation and the participant
//! roster. Every roster mutation is a read-then-write on the current
//! `is_active` state inside one transaction, which keeps double-add
//! and double-leave races out.

use std::sync::Arc;

use chrono::{Duration, SecondsFormat, Utc};
use rusqlite::Transaction;

use roost_db::models::{
    ConversationOverview, ConversationRow, GroupSettingsRow, MessageRow, ParticipantRow,
};
use roost_db::{Database, queries};
use roost_types::events::{ChatEvent, ConversationAction};
use roost_types::models::{ConversationKind, MessageKind, Role};
use roost_types::{ConversationId, UserId};

use crate::error::{ChatError, ChatResult};
use crate::permissions;
use crate::publisher::Outgoing;
use crate::storage::FileStore;
use crate::wire;

/// A file handed in by the caller, not yet stored.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub original_name: String,
    pub data: Vec<u8>,
}

/// Partial update of the per-group permission flags. `None` leaves a
/// flag untouched.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub allow_members_to_send_messages: Option<bool>,
    pub allow_members_to_add_remove_participants: Option<bool>,
    pub allow_members_to_change_group_info: Option<bool>,
    pub admins_must_approve_new_members: Option<bool>,
}

impl SettingsPatch {
    fn apply(&self, row: &mut GroupSettingsRow) {
        if let Some(v) = self.allow_members_to_send_messages {
            row.allow_members_to_send_messages = v;
        }
        if let Some(v) = self.allow_members_to_add_remove_participants {
            row.allow_members_to_add_remove_participants = v;
        }
        if let Some(v) = self.allow_members_to_change_group_info {
            row.allow_members_to_change_group_info = v;
        }
        if let Some(v) = self.admins_must_approve_new_members {
            row.admins_must_approve_new_members = v;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroupInfoPatch {
    pub name: Option<String>,
    pub avatar: Option<NewUpload>,
    pub settings: Option<SettingsPatch>,
}

pub struct MembershipManager {
    db: Arc<Database>,
    store: Arc<dyn FileStore>,
}

impl MembershipManager {
    pub fn new(db: Arc<Database>, store: Arc<dyn FileStore>) -> Self {
        Self { db, store }
    }

    /// Resolve or create the private conversation between two users.
    /// Idempotent: the pair maps to at most one conversation for all
    /// time. `a == b` resolves to the user's self conversation.
    pub fn create_private(&self, a: UserId, b: UserId) -> ChatResult<ConversationRow> {
        self.db.with_txn(|tx| {
            for user in [a, b] {
                if queries::get_user(tx, user)?.is_none() {
                    return Err(ChatError::not_found("User not found."));
                }
            }

            let existing = if a == b {
                queries::find_self_chat(tx, a)?
            } else {
                queries::find_private_between(tx, a, b)?
            };
            if let Some(convo) = existing {
                return Ok(convo);
            }

            let kind = if a == b {
                ConversationKind::SelfChat
            } else {
                ConversationKind::Private
            };
            let id = queries::insert_conversation(tx, kind, None, None)?;
            queries::insert_participant(tx, id, a, Role::Member)?;
            if a != b {
                queries::insert_participant(tx, id, b, Role::Member)?;
            }
            require_conversation(tx, id)
        })
    }

    /// Create a group with the creator as super admin and a restrictive
    /// default settings row (only admins act until flags are opened).
    pub fn create_group(
        &self,
        creator: UserId,
        member_ids: &[UserId],
        name: &str,
    ) -> ChatResult<ConversationRow> {
        self.db.with_txn(|tx| {
            let id = queries::insert_conversation(
                tx,
                ConversationKind::Group,
                Some(name),
                Some(creator),
            )?;

            let mut seen = vec![creator];
            queries::insert_participant(tx, id, creator, Role::SuperAdmin)?;
            for &member in member_ids {
                if seen.contains(&member) {
                    continue;
                }
                if queries::get_user(tx, member)?.is_none() {
                    return Err(ChatError::not_found("User not found."));
                }
                queries::insert_participant(tx, id, member, Role::Member)?;
                seen.push(member);
            }

            queries::insert_group_settings(tx, id)?;
            require_conversation(tx, id)
        })
    }

    /// Add (or re-add) members. One system message and one targeted
    /// `added` event per member who actually joined; already-active
    /// members are skipped.
    pub fn add_members(
        &self,
        actor: UserId,
        conversation_id: ConversationId,
        member_ids: &[UserId],
    ) -> ChatResult<(Vec<MessageRow>, Vec<Outgoing>)> {
        self.db.with_txn(|tx| {
            let convo = require_conversation(tx, conversation_id)?;
            if !permissions::can_manage_members_in(tx, conversation_id, actor)? {
                return Err(ChatError::forbidden("Only admins can add members."));
            }
            let actor_row = require_user(tx, actor)?;

            let mut system_messages = Vec::new();
            let mut events = Vec::new();

            for &member in member_ids {
                let added = require_user(tx, member)?;

                match queries::get_participant(tx, conversation_id, member)? {
                    Some(p) if p.is_active => continue,
                    Some(p) => {
                        queries::reactivate_participant(tx, p.id)?;
                    }
                    None => {
                        queries::insert_participant(tx, conversation_id, member, Role::Member)?;
                    }
                }

                let body = format!("{} added {} to the conversation", actor_row.name, added.name);
                let message = insert_system_message(tx, conversation_id, actor, &body)?;
                events.push(Outgoing::from(ChatEvent::Sent {
                    message: wire::payload(&message),
                }));
                events.push(Outgoing::from(ChatEvent::Conversation {
                    action: ConversationAction::Added,
                    target_user_id: member,
                    conversation: wire::summary(&convo),
                }));
                system_messages.push(message);
            }

            if !system_messages.is_empty() {
                queries::touch_conversation(tx, conversation_id)?;
            }
            Ok((system_messages, events))
        })
    }

    /// Deactivate matching active rows. Members already gone are
    /// skipped, so a racing double-remove settles on one transition.
    pub fn remove_members(
        &self,
        actor: UserId,
        conversation_id: ConversationId,
        member_ids: &[UserId],
    ) -> ChatResult<(Vec<MessageRow>, Vec<Outgoing>)> {
        self.db.with_txn(|tx| {
            let convo = require_conversation(tx, conversation_id)?;
            if !permissions::can_manage_members_in(tx, conversation_id, actor)? {
                return Err(ChatError::forbidden("Only admins can remove members."));
            }

            let mut system_messages = Vec::new();
            let mut events = Vec::new();

            for &member in member_ids {
                if queries::mark_removed(tx, conversation_id, member)? == 0 {
                    continue;
                }
                let removed = require_user(tx, member)?;

                let body = format!("{} was removed from the conversation", removed.name);
                let message = insert_system_message(tx, conversation_id, actor, &body)?;
                events.push(Outgoing::from(ChatEvent::Sent {
                    message: wire::payload(&message),
                }));
                events.push(Outgoing::from(ChatEvent::Conversation {
                    action: ConversationAction::Removed,
                    target_user_id: member,
                    conversation: wire::summary(&convo),
                }));
                system_messages.push(message);
            }

            if !system_messages.is_empty() {
                queries::touch_conversation(tx, conversation_id)?;
            }
            Ok((system_messages, events))
        })
    }

    /// Promote members to admin or demote admins to member. Super
    /// admins are never touched by this path. Returns the number of
    /// rows changed.
    pub fn set_role(
        &self,
        actor: UserId,
        conversation_id: ConversationId,
        user_ids: &[UserId],
        role: Role,
    ) -> ChatResult<usize> {
        let from = match role {
            Role::Admin => Role::Member,
            Role::Member => Role::Admin,
            Role::SuperAdmin => {
                return Err(ChatError::validation(
                    "The super admin role cannot be assigned.",
                ));
            }
        };
        self.db.with_txn(|tx| {
            let convo = require_conversation(tx, conversation_id)?;
            if !permissions::can_manage_members_in(tx, conversation_id, actor)? {
                return Err(ChatError::forbidden("Only admins can manage admins."));
            }
            if convo.kind() != ConversationKind::Group {
                return Err(ChatError::forbidden(
                    "Admins are allowed only in group conversations.",
                ));
            }
            Ok(queries::flip_roles(tx, conversation_id, user_ids, from, role)?)
        })
    }

    /// Self-service exit; always allowed for active participants.
    pub fn leave(
        &self,
        user: UserId,
        conversation_id: ConversationId,
    ) -> ChatResult<(MessageRow, Vec<Outgoing>)> {
        self.db.with_txn(|tx| {
            let convo = require_conversation(tx, conversation_id)?;
            if queries::mark_left(tx, conversation_id, user)? == 0 {
                return Err(ChatError::not_found(
                    "You are not a participant of this conversation.",
                ));
            }
            let leaver = require_user(tx, user)?;

            let body = format!("{} left the conversation", leaver.name);
            let message = insert_system_message(tx, conversation_id, user, &body)?;
            queries::touch_conversation(tx, conversation_id)?;

            let events = vec![
                Outgoing::from(ChatEvent::Sent {
                    message: wire::payload(&message),
                }),
                Outgoing::from(ChatEvent::Conversation {
                    action: ConversationAction::Left,
                    target_user_id: user,
                    conversation: wire::summary(&convo),
                }),
            ];
            Ok((message, events))
        })
    }

    /// Mute semantics: 0 minutes unmutes, exactly 1 mutes indefinitely
    /// (sentinel), anything above mutes until now + minutes.
    pub fn mute(
        &self,
        user: UserId,
        conversation_id: ConversationId,
        minutes: u32,
    ) -> ChatResult<(ParticipantRow, Vec<Outgoing>)> {
        self.db.with_txn(|tx| {
            let convo = require_conversation(tx, conversation_id)?;
            if queries::get_participant(tx, conversation_id, user)?.is_none() {
                return Err(ChatError::not_found("Participant not found."));
            }

            match minutes {
                0 => queries::set_mute(tx, conversation_id, user, false, None)?,
                1 => queries::set_mute(tx, conversation_id, user, true, None)?,
                n => {
                    let until = (Utc::now() + Duration::minutes(i64::from(n)))
                        .to_rfc3339_opts(SecondsFormat::Millis, true);
                    queries::set_mute(tx, conversation_id, user, true, Some(&until))?
                }
            };

            let participant = queries::get_participant(tx, conversation_id, user)?
                .ok_or_else(|| ChatError::not_found("Participant not found."))?;
            let events = vec![Outgoing::from(ChatEvent::Conversation {
                action: ConversationAction::Muted,
                target_user_id: user,
                conversation: wire::summary(&convo),
            })];
            Ok((participant, events))
        })
    }

    /// Update group name, avatar, and/or settings flags. Replacing the
    /// avatar deletes the previous stored file before storing the new
    /// one.
    pub fn update_group_info(
        &self,
        actor: UserId,
        conversation_id: ConversationId,
        patch: GroupInfoPatch,
    ) -> ChatResult<ConversationRow> {
        self.db.with_txn(|tx| {
            require_conversation(tx, conversation_id)?;
            if !permissions::can_edit_info_in(tx, conversation_id, actor)? {
                return Err(ChatError::forbidden("Only admins can update group info."));
            }

            if let Some(name) = patch.name.as_deref() {
                queries::set_conversation_name(tx, conversation_id, name)?;
            }

            if patch.avatar.is_some() || patch.settings.is_some() {
                let mut settings = queries::get_group_settings(tx, conversation_id)?
                    .ok_or_else(|| ChatError::not_found("Group settings not found."))?;

                if let Some(upload) = &patch.avatar {
                    if let Some(old) = settings.avatar_path.take() {
                        self.store.delete(&old);
                    }
                    let path = self.store.store(
                        "uploads/groups/avatars",
                        &upload.original_name,
                        &upload.data,
                    )?;
                    settings.avatar_path = Some(path);
                }
                if let Some(sp) = &patch.settings {
                    sp.apply(&mut settings);
                }
                queries::update_group_settings(tx, &settings)?;
            }

            queries::touch_conversation(tx, conversation_id)?;
            require_conversation(tx, conversation_id)
        })
    }

    /// Update only the permission flags; same gate as group info.
    pub fn update_group_settings(
        &self,
        actor: UserId,
        conversation_id: ConversationId,
        patch: SettingsPatch,
    ) -> ChatResult<GroupSettingsRow> {
        self.db.with_txn(|tx| {
            require_conversation(tx, conversation_id)?;
            if !permissions::can_edit_info_in(tx, conversation_id, actor)? {
                return Err(ChatError::forbidden("Only admins can update group info."));
            }
            let mut settings = queries::get_group_settings(tx, conversation_id)?
                .ok_or_else(|| ChatError::not_found("Group settings not found."))?;
            patch.apply(&mut settings);
            queries::update_group_settings(tx, &settings)?;
            Ok(settings)
        })
    }

    /// Active roster, visible to anyone with a participant row past or
    /// present.
    pub fn members(
        &self,
        actor: UserId,
        conversation_id: ConversationId,
    ) -> ChatResult<Vec<ParticipantRow>> {
        self.db.with_conn(|conn| {
            require_conversation(conn, conversation_id)?;
            if queries::get_participant(conn, conversation_id, actor)?.is_none() {
                return Err(ChatError::forbidden(
                    "You are not allowed to view this conversation.",
                ));
            }
            Ok(queries::active_participants(conn, conversation_id)?)
        })
    }

    /// The caller's conversation list, most recently touched first,
    /// each entry carrying their unread count. The optional filter
    /// matches group names or, for private pairs, the other
    /// participant's name.
    pub fn conversations_for(
        &self,
        user: UserId,
        query: Option<&str>,
    ) -> ChatResult<Vec<ConversationOverview>> {
        self.db.with_conn(|conn| {
            require_user(conn, user)?;
            Ok(queries::conversations_for(conn, user, query)?)
        })
    }

    /// Drop a group conversation and everything under it. Groups are
    /// never auto-deleted; this is the explicit admin action.
    pub fn delete_group(
        &self,
        actor: UserId,
        conversation_id: ConversationId,
    ) -> ChatResult<()> {
        self.db.with_txn(|tx| {
            let convo = require_conversation(tx, conversation_id)?;
            if convo.kind() != ConversationKind::Group {
                return Err(ChatError::forbidden(
                    "Only group conversations can be deleted.",
                ));
            }
            let role = queries::active_participant(tx, conversation_id, actor)?.map(|p| p.role());
            if !role.is_some_and(|r| r.is_admin()) {
                return Err(ChatError::forbidden("Only admins can delete the group."));
            }
            queries::delete_conversation(tx, conversation_id)?;
            Ok(())
        })
    }

    /// Hide the conversation from the caller's list. The conversation
    /// itself survives for everyone else.
    pub fn delete_conversation_for_user(
        &self,
        user: UserId,
        conversation_id: ConversationId,
    ) -> ChatResult<()> {
        self.db.with_txn(|tx| {
            if queries::mark_left(tx, conversation_id, user)? == 0 {
                return Err(ChatError::forbidden(
                    "Conversation not found or already removed.",
                ));
            }
            Ok(())
        })
    }
}

pub(crate) fn require_conversation(
    conn: &rusqlite::Connection,
    id: ConversationId,
) -> ChatResult<ConversationRow> {
    queries::get_conversation(conn, id)?
        .ok_or_else(|| ChatError::not_found("Conversation not found."))
}

pub(crate) fn require_user(
    conn: &rusqlite::Connection,
    id: UserId,
) -> ChatResult<roost_db::models::UserRow> {
    queries::get_user(conn, id)?.ok_or_else(|| ChatError::not_found("User not found."))
}

/// System messages carry no status fanout; they are roster markers, not
/// deliverables.
fn insert_system_message(
    tx: &Transaction<'_>,
    conversation_id: ConversationId,
    sender: UserId,
    body: &str,
) -> ChatResult<MessageRow> {
    let id = queries::insert_message(
        tx,
        conversation_id,
        sender,
        Some(body),
        MessageKind::System,
        None,
        false,
    )?;
    queries::get_message(tx, id)?.ok_or_else(|| ChatError::not_found("Message not found."))
}
