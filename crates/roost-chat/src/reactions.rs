//! Reaction toggles and per-message grouping.

use std::sync::Arc;

use roost_db::models::ReactionRow;
use roost_db::{Database, queries};
use roost_types::events::ChatEvent;
use roost_types::models::ReactionGroup;
use roost_types::{MessageId, UserId};

use crate::error::{ChatError, ChatResult};
use crate::publisher::Outgoing;

#[derive(Debug, Clone)]
pub struct ReactionSummary {
    pub total: usize,
    pub grouped: Vec<ReactionGroup>,
}

pub struct ReactionEngine {
    db: Arc<Database>,
}

impl ReactionEngine {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Toggle `reaction` for `user` on one message. Same reaction twice
    /// removes it; a different reaction replaces the old one. The event
    /// carries the full replacement set so clients never merge deltas.
    pub fn toggle(
        &self,
        user: UserId,
        message_id: MessageId,
        reaction: &str,
    ) -> ChatResult<(Vec<ReactionGroup>, Vec<Outgoing>)> {
        let reaction = reaction.trim();
        if reaction.is_empty() {
            return Err(ChatError::validation("A reaction is required."));
        }
        self.db.with_txn(|tx| {
            let message = queries::get_message(tx, message_id)?
                .ok_or_else(|| ChatError::not_found("Message not found."))?;

            queries::toggle_reaction(tx, message_id, user, reaction)?;

            let rows = queries::reactions_for_message(tx, message_id)?;
            let grouped = group_reactions(&rows);
            let events = vec![Outgoing::from(ChatEvent::Reaction {
                conversation_id: message.conversation_id,
                message_id,
                reactions: grouped.clone(),
            })];
            Ok((grouped, events))
        })
    }

    pub fn list(&self, message_id: MessageId) -> ChatResult<ReactionSummary> {
        self.db.with_conn(|conn| {
            if queries::get_message(conn, message_id)?.is_none() {
                return Err(ChatError::not_found("Message not found."));
            }
            let rows = queries::reactions_for_message(conn, message_id)?;
            Ok(ReactionSummary {
                total: rows.len(),
                grouped: group_reactions(&rows),
            })
        })
    }
}

/// Collapse raw rows into groups ordered by reaction text. Rows arrive
/// ordered by insertion, so user_ids keep first-reacted-first order.
pub(crate) fn group_reactions(rows: &[ReactionRow]) -> Vec<ReactionGroup> {
    let mut grouped: Vec<ReactionGroup> = Vec::new();
    for row in rows {
        match grouped.iter_mut().find(|g| g.reaction == row.reaction) {
            Some(group) => {
                group.count += 1;
                group.user_ids.push(row.user_id);
            }
            None => grouped.push(ReactionGroup {
                reaction: row.reaction.clone(),
                count: 1,
                user_ids: vec![row.user_id],
            }),
        }
    }
    grouped.sort_by(|a, b| a.reaction.cmp(&b.reaction));
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(user_id: i64, reaction: &str) -> ReactionRow {
        ReactionRow {
            id: 0,
            message_id: 1,
            user_id,
            reaction: reaction.into(),
            created_at: String::new(),
        }
    }

    #[test]
    fn grouping_counts_and_orders() {
        let rows = vec![row(3, "👍"), row(1, "❤️"), row(2, "👍")];
        let grouped = group_reactions(&rows);
        assert_eq!(grouped.len(), 2);
        let thumbs = grouped.iter().find(|g| g.reaction == "👍").unwrap();
        assert_eq!(thumbs.count, 2);
        assert_eq!(thumbs.user_ids, vec![3, 2]);
    }
}
