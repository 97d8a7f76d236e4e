//! Block / restrict set-membership service. State is held in unique
//! pair tables; toggles run inside one transaction so concurrent calls
//! by the same actor settle on a definite state.

use std::sync::Arc;

use roost_db::{Database, queries};
use roost_types::UserId;
use roost_types::events::{ChatEvent, ConversationAction};

use crate::error::{ChatError, ChatResult};
use crate::publisher::Outgoing;
use crate::wire;

pub struct RelationService {
    db: Arc<Database>,
}

impl RelationService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Flip the block state of `other` as seen by `actor`. Returns the
    /// new state plus a targeted blocked/unblocked event when a private
    /// conversation exists between the pair.
    pub fn toggle_block(&self, actor: UserId, other: UserId) -> ChatResult<(bool, Vec<Outgoing>)> {
        if actor == other {
            return Err(ChatError::validation("You cannot block yourself."));
        }
        self.db.with_txn(|tx| {
            if queries::get_user(tx, other)?.is_none() {
                return Err(ChatError::not_found("User not found."));
            }

            let blocked = queries::toggle_block(tx, actor, other)?;

            let mut events = Vec::new();
            if let Some(convo) = queries::find_private_between(tx, actor, other)? {
                events.push(Outgoing::from(ChatEvent::Conversation {
                    action: if blocked {
                        ConversationAction::Blocked
                    } else {
                        ConversationAction::Unblocked
                    },
                    target_user_id: other,
                    conversation: wire::summary(&convo),
                }));
            }
            Ok((blocked, events))
        })
    }

    /// Flip the restrict state. Restriction is silent: the restricted
    /// sender keeps sending, the restrictor stops seeing bodies, so no
    /// event is emitted.
    pub fn toggle_restrict(&self, actor: UserId, other: UserId) -> ChatResult<bool> {
        if actor == other {
            return Err(ChatError::validation("You cannot restrict yourself."));
        }
        self.db.with_txn(|tx| {
            if queries::get_user(tx, other)?.is_none() {
                return Err(ChatError::not_found("User not found."));
            }
            Ok(queries::toggle_restrict(tx, actor, other)?)
        })
    }

    pub fn is_blocked(&self, blocker: UserId, blocked: UserId) -> ChatResult<bool> {
        self.db
            .with_conn(|conn| Ok(queries::has_blocked(conn, blocker, blocked)?))
    }

    pub fn is_restricted(&self, restrictor: UserId, restricted: UserId) -> ChatResult<bool> {
        self.db
            .with_conn(|conn| Ok(queries::has_restricted(conn, restrictor, restricted)?))
    }
}
