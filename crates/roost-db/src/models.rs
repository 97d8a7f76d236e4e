//! Database row types mapping directly to SQLite rows.
//! Distinct from the roost-types wire models to keep the DB layer
//! independent. Timestamps stay in their stored string form; callers
//! parse them only where a comparison is needed.

use chrono::{DateTime, Utc};
use roost_types::models::{ConversationKind, DeliveryState, MessageKind, MessageLifecycle, Role};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub last_active_at: Option<String>,
    pub created_at: String,
}

impl UserRow {
    /// Online iff the last activity falls within the given window.
    pub fn is_online(&self, window: chrono::Duration) -> bool {
        self.last_active_at
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .is_some_and(|t| Utc::now() - t.with_timezone(&Utc) < window)
    }
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: i64,
    pub kind: String,
    pub name: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl ConversationRow {
    pub fn kind(&self) -> ConversationKind {
        ConversationKind::parse(&self.kind).unwrap_or(ConversationKind::Private)
    }
}

/// One entry of a user's conversation list: the conversation plus that
/// user's unread message count.
#[derive(Debug, Clone)]
pub struct ConversationOverview {
    pub conversation: ConversationRow,
    pub unread_count: i64,
}

#[derive(Debug, Clone)]
pub struct GroupSettingsRow {
    pub conversation_id: i64,
    pub allow_members_to_send_messages: bool,
    pub allow_members_to_add_remove_participants: bool,
    pub allow_members_to_change_group_info: bool,
    pub admins_must_approve_new_members: bool,
    pub avatar_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ParticipantRow {
    pub id: i64,
    pub conversation_id: i64,
    pub user_id: i64,
    pub role: String,
    pub is_active: bool,
    pub is_muted: bool,
    pub muted_until: Option<String>,
    pub left_at: Option<String>,
    pub removed_at: Option<String>,
    pub last_read_message_id: Option<i64>,
    pub joined_at: String,
}

impl ParticipantRow {
    pub fn role(&self) -> Role {
        Role::parse(&self.role).unwrap_or(Role::Member)
    }

    /// Whether the mute is in effect right now. `muted_until = NULL`
    /// with the flag set means muted indefinitely.
    pub fn is_muted_now(&self, now: DateTime<Utc>) -> bool {
        if !self.is_muted {
            return false;
        }
        match self.muted_until.as_deref() {
            None => true,
            Some(until) => DateTime::parse_from_rfc3339(until)
                .map(|t| t.with_timezone(&Utc) > now)
                .unwrap_or(true),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub body: Option<String>,
    pub kind: String,
    pub reply_to_id: Option<i64>,
    pub lifecycle: String,
    pub is_restricted: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl MessageRow {
    pub fn kind(&self) -> MessageKind {
        MessageKind::parse(&self.kind).unwrap_or(MessageKind::Text)
    }

    pub fn lifecycle(&self) -> MessageLifecycle {
        MessageLifecycle::parse(&self.lifecycle).unwrap_or(MessageLifecycle::Active)
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentRow {
    pub id: i64,
    pub message_id: i64,
    pub path: String,
    pub kind: String,
    pub size: Option<i64>,
    pub original_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StatusRow {
    pub id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl StatusRow {
    pub fn status(&self) -> DeliveryState {
        DeliveryState::parse(&self.status).unwrap_or(DeliveryState::Sent)
    }
}

#[derive(Debug, Clone)]
pub struct ReactionRow {
    pub id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub reaction: String,
    pub created_at: String,
}
