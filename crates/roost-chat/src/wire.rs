//! Row -> wire payload conversions.

use roost_db::models::{ConversationRow, MessageRow};
use roost_types::events::{ConversationSummary, MessagePayload};

pub(crate) fn summary(row: &ConversationRow) -> ConversationSummary {
    ConversationSummary {
        id: row.id,
        kind: row.kind(),
        name: row.name.clone(),
    }
}

pub(crate) fn payload(msg: &MessageRow) -> MessagePayload {
    MessagePayload {
        id: msg.id,
        conversation_id: msg.conversation_id,
        sender_id: msg.sender_id,
        body: msg.body.clone(),
        kind: msg.kind(),
        reply_to_id: msg.reply_to_id,
        is_restricted: msg.is_restricted,
        created_at: msg.created_at.clone(),
    }
}
