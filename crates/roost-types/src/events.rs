use serde::{Deserialize, Serialize};

use crate::models::{ConversationKind, MessageKind, ReactionGroup};
use crate::{ConversationId, MessageId, UserId};

/// Routing key for the event transport. Conversation channels are
/// visible only to active participants; user channels carry targeted
/// membership updates; the presence channel carries typing/online
/// indicators and is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "key", rename_all = "snake_case")]
pub enum Channel {
    Conversation(ConversationId),
    User(UserId),
    Presence,
}

/// Message snapshot carried on the wire. Deliberately minimal; the
/// persisted row stays in roost-db.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: Option<String>,
    pub kind: MessageKind,
    pub reply_to_id: Option<MessageId>,
    pub is_restricted: bool,
    pub created_at: String,
}

/// Conversation summary sent with user-scoped membership events, enough
/// for a client to insert or drop the conversation from its list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub kind: ConversationKind,
    pub name: Option<String>,
}

/// Membership actions delivered on a user channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationAction {
    Added,
    Removed,
    Left,
    Blocked,
    Unblocked,
    Muted,
}

/// Events emitted by the engine. Mutations return these; the publisher
/// seam delivers them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A new message (chat or system) was persisted.
    Sent { message: MessagePayload },

    /// A message body was edited by its sender.
    Updated { message: MessagePayload },

    /// The target user hid a message from their own view.
    DeletedForMe {
        conversation_id: ConversationId,
        message_id: MessageId,
        user_id: UserId,
    },

    /// First-phase delete: the message is now a tombstone.
    DeletedForEveryone {
        conversation_id: ConversationId,
        message_id: MessageId,
        unsent: bool,
    },

    /// Second-phase delete: the row is gone for good.
    DeletedPermanent {
        conversation_id: ConversationId,
        message_id: MessageId,
    },

    /// Full replacement reaction set for a message.
    Reaction {
        conversation_id: ConversationId,
        message_id: MessageId,
        reactions: Vec<ReactionGroup>,
    },

    /// A recipient's pending statuses moved to delivered.
    Delivered {
        conversation_id: ConversationId,
        user_id: UserId,
    },

    /// A recipient read the conversation up to last_read_message_id.
    Seen {
        conversation_id: ConversationId,
        user_id: UserId,
        last_read_message_id: MessageId,
    },

    /// Targeted membership change, routed to one user.
    Conversation {
        action: ConversationAction,
        target_user_id: UserId,
        conversation: ConversationSummary,
    },

    /// Typing indicator; presence channel, never persisted.
    Typing {
        conversation_id: ConversationId,
        user_id: UserId,
        is_typing: bool,
    },

    /// Online/offline transition; presence channel, never persisted.
    Presence { user_id: UserId, online: bool },
}

impl ChatEvent {
    /// The channel this event is routed to.
    pub fn channel(&self) -> Channel {
        match self {
            Self::Sent { message } | Self::Updated { message } => {
                Channel::Conversation(message.conversation_id)
            }
            Self::DeletedForMe { user_id, .. } => Channel::User(*user_id),
            Self::DeletedForEveryone { conversation_id, .. }
            | Self::DeletedPermanent { conversation_id, .. }
            | Self::Reaction { conversation_id, .. }
            | Self::Delivered { conversation_id, .. }
            | Self::Seen { conversation_id, .. } => Channel::Conversation(*conversation_id),
            Self::Conversation { target_user_id, .. } => Channel::User(*target_user_id),
            Self::Typing { .. } | Self::Presence { .. } => Channel::Presence,
        }
    }
}
