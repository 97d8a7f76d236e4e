//! The service facade: one entry point per operation. Engines return
//! events; this layer publishes them and hands push jobs to the worker
//! queue, so nothing below ever touches a transport.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use roost_db::models::{
    AttachmentRow, ConversationOverview, ConversationRow, GroupSettingsRow, MessageRow,
    ParticipantRow,
};
use roost_db::{Database, queries};
use roost_types::events::ChatEvent;
use roost_types::models::{PushNotification, ReactionGroup, Role, online_window};
use roost_types::{ConversationId, MessageId, UserId};

use crate::error::{ChatError, ChatResult};
use crate::membership::{GroupInfoPatch, MembershipManager, SettingsPatch};
use crate::messages::{MessageEngine, MessageView, SendMessage};
use crate::publisher::{EventPublisher, Outgoing};
use crate::reactions::{ReactionEngine, ReactionSummary};
use crate::relations::RelationService;
use crate::storage::FileStore;

pub struct ChatService {
    db: Arc<Database>,
    publisher: Arc<dyn EventPublisher>,
    push: Option<UnboundedSender<PushNotification>>,
    membership: MembershipManager,
    messages: MessageEngine,
    reactions: ReactionEngine,
    relations: RelationService,
}

impl ChatService {
    pub fn new(
        db: Arc<Database>,
        store: Arc<dyn FileStore>,
        publisher: Arc<dyn EventPublisher>,
        push: Option<UnboundedSender<PushNotification>>,
    ) -> Self {
        Self {
            membership: MembershipManager::new(db.clone(), store.clone()),
            messages: MessageEngine::new(db.clone(), store),
            reactions: ReactionEngine::new(db.clone()),
            relations: RelationService::new(db.clone()),
            db,
            publisher,
            push,
        }
    }

    fn publish_all(&self, events: Vec<Outgoing>) {
        for outgoing in events {
            self.publisher.publish(outgoing.channel, &outgoing.event);
        }
    }

    fn enqueue_push(&self, notification: PushNotification) {
        let Some(sender) = &self.push else { return };
        if sender.send(notification).is_err() {
            warn!("push worker is gone; dropping notification");
        }
    }

    // Messages

    pub fn send_message(&self, sender: UserId, req: SendMessage) -> ChatResult<MessageRow> {
        let outcome = self.messages.send(sender, req)?;
        self.publish_all(outcome.events);
        if let Some(push) = outcome.push {
            self.enqueue_push(push);
        }
        Ok(outcome.message)
    }

    pub fn update_message(
        &self,
        editor: UserId,
        message_id: MessageId,
        body: &str,
    ) -> ChatResult<MessageRow> {
        let (message, events) = self.messages.update(editor, message_id, body)?;
        self.publish_all(events);
        Ok(message)
    }

    pub fn delete_messages_for_me(
        &self,
        user: UserId,
        message_ids: &[MessageId],
    ) -> ChatResult<()> {
        let events = self.messages.delete_for_me(user, message_ids)?;
        self.publish_all(events);
        Ok(())
    }

    pub fn delete_messages_for_everyone(
        &self,
        user: UserId,
        message_ids: &[MessageId],
    ) -> ChatResult<()> {
        let events = self.messages.delete_for_everyone(user, message_ids)?;
        self.publish_all(events);
        Ok(())
    }

    /// Returns the number of statuses that moved to delivered.
    pub fn mark_delivered(
        &self,
        user: UserId,
        conversation_id: ConversationId,
    ) -> ChatResult<usize> {
        let (changed, events) = self.messages.mark_delivered(user, conversation_id)?;
        if changed > 0 {
            self.publish_all(events);
        }
        Ok(changed)
    }

    /// Returns the high-water mark, or None for an empty conversation.
    pub fn mark_read(
        &self,
        user: UserId,
        conversation_id: ConversationId,
    ) -> ChatResult<Option<MessageId>> {
        match self.messages.mark_read(user, conversation_id)? {
            Some((latest, events)) => {
                self.publish_all(events);
                Ok(Some(latest))
            }
            None => Ok(None),
        }
    }

    pub fn messages_for(
        &self,
        user: UserId,
        conversation_id: ConversationId,
        query: Option<&str>,
    ) -> ChatResult<Vec<MessageView>> {
        self.messages.messages_for(user, conversation_id, query)
    }

    pub fn attachments(&self, message_id: MessageId) -> ChatResult<Vec<AttachmentRow>> {
        self.db
            .with_conn(|conn| Ok(queries::attachments_for(conn, message_id)?))
    }

    // Reactions

    pub fn toggle_reaction(
        &self,
        user: UserId,
        message_id: MessageId,
        reaction: &str,
    ) -> ChatResult<Vec<ReactionGroup>> {
        let (grouped, events) = self.reactions.toggle(user, message_id, reaction)?;
        self.publish_all(events);
        Ok(grouped)
    }

    pub fn reactions(&self, message_id: MessageId) -> ChatResult<ReactionSummary> {
        self.reactions.list(message_id)
    }

    // Conversations and roster

    pub fn create_private(&self, a: UserId, b: UserId) -> ChatResult<ConversationRow> {
        self.membership.create_private(a, b)
    }

    pub fn create_group(
        &self,
        creator: UserId,
        member_ids: &[UserId],
        name: &str,
    ) -> ChatResult<ConversationRow> {
        self.membership.create_group(creator, member_ids, name)
    }

    pub fn add_members(
        &self,
        actor: UserId,
        conversation_id: ConversationId,
        member_ids: &[UserId],
    ) -> ChatResult<Vec<MessageRow>> {
        let (messages, events) = self.membership.add_members(actor, conversation_id, member_ids)?;
        self.publish_all(events);
        Ok(messages)
    }

    pub fn remove_members(
        &self,
        actor: UserId,
        conversation_id: ConversationId,
        member_ids: &[UserId],
    ) -> ChatResult<Vec<MessageRow>> {
        let (messages, events) =
            self.membership
                .remove_members(actor, conversation_id, member_ids)?;
        self.publish_all(events);
        Ok(messages)
    }

    pub fn set_role(
        &self,
        actor: UserId,
        conversation_id: ConversationId,
        user_ids: &[UserId],
        role: Role,
    ) -> ChatResult<usize> {
        self.membership.set_role(actor, conversation_id, user_ids, role)
    }

    pub fn leave(&self, user: UserId, conversation_id: ConversationId) -> ChatResult<MessageRow> {
        let (message, events) = self.membership.leave(user, conversation_id)?;
        self.publish_all(events);
        Ok(message)
    }

    pub fn mute(
        &self,
        user: UserId,
        conversation_id: ConversationId,
        minutes: u32,
    ) -> ChatResult<ParticipantRow> {
        let (participant, events) = self.membership.mute(user, conversation_id, minutes)?;
        self.publish_all(events);
        Ok(participant)
    }

    pub fn update_group_info(
        &self,
        actor: UserId,
        conversation_id: ConversationId,
        patch: GroupInfoPatch,
    ) -> ChatResult<ConversationRow> {
        self.membership.update_group_info(actor, conversation_id, patch)
    }

    pub fn update_group_settings(
        &self,
        actor: UserId,
        conversation_id: ConversationId,
        patch: SettingsPatch,
    ) -> ChatResult<GroupSettingsRow> {
        self.membership
            .update_group_settings(actor, conversation_id, patch)
    }

    pub fn members(
        &self,
        actor: UserId,
        conversation_id: ConversationId,
    ) -> ChatResult<Vec<ParticipantRow>> {
        self.membership.members(actor, conversation_id)
    }

    pub fn conversations_for(
        &self,
        user: UserId,
        query: Option<&str>,
    ) -> ChatResult<Vec<ConversationOverview>> {
        self.membership.conversations_for(user, query)
    }

    pub fn delete_group(&self, actor: UserId, conversation_id: ConversationId) -> ChatResult<()> {
        self.membership.delete_group(actor, conversation_id)
    }

    pub fn delete_conversation_for_user(
        &self,
        user: UserId,
        conversation_id: ConversationId,
    ) -> ChatResult<()> {
        self.membership
            .delete_conversation_for_user(user, conversation_id)
    }

    // Relations

    pub fn toggle_block(&self, actor: UserId, other: UserId) -> ChatResult<bool> {
        let (blocked, events) = self.relations.toggle_block(actor, other)?;
        self.publish_all(events);
        Ok(blocked)
    }

    pub fn toggle_restrict(&self, actor: UserId, other: UserId) -> ChatResult<bool> {
        self.relations.toggle_restrict(actor, other)
    }

    pub fn is_blocked(&self, blocker: UserId, blocked: UserId) -> ChatResult<bool> {
        self.relations.is_blocked(blocker, blocked)
    }

    // Presence and devices

    /// Typing indicators are fire-and-forget; nothing is persisted.
    pub fn typing(&self, user: UserId, conversation_id: ConversationId, is_typing: bool) {
        let event = ChatEvent::Typing {
            conversation_id,
            user_id: user,
            is_typing,
        };
        self.publisher.publish(event.channel(), &event);
    }

    /// Bump the activity timestamp that online status derives from.
    pub fn touch_activity(&self, user: UserId) -> ChatResult<()> {
        self.db.with_conn(|conn| {
            if queries::touch_last_active(conn, user)? == 0 {
                return Err(ChatError::not_found("User not found."));
            }
            Ok(())
        })
    }

    /// Online is derived, never stored: active within the last window.
    pub fn is_online(&self, user: UserId) -> ChatResult<bool> {
        self.db.with_conn(|conn| {
            let row = queries::get_user(conn, user)?
                .ok_or_else(|| ChatError::not_found("User not found."))?;
            Ok(row.is_online(online_window()))
        })
    }

    pub fn register_device(&self, user: UserId, token: &str) -> ChatResult<()> {
        if token.trim().is_empty() {
            return Err(ChatError::validation("A device token is required."));
        }
        self.db.with_txn(|tx| {
            if queries::get_user(tx, user)?.is_none() {
                return Err(ChatError::not_found("User not found."));
            }
            queries::register_device_token(tx, user, token)?;
            Ok(())
        })
    }

    pub fn remove_device(&self, token: &str) -> ChatResult<usize> {
        self.db
            .with_conn(|conn| Ok(queries::remove_device_token(conn, token)?))
    }
}
