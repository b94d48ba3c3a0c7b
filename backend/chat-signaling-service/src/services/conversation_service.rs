use crate::error::{AppError, AppResult, Denial, Entity};
use crate::models::Conversation;
use crate::services::AuthorizationGate;
use crate::storage::ChatStore;
use std::sync::Arc;
use uuid::Uuid;

pub struct ConversationService {
    store: Arc<dyn ChatStore>,
    gate: AuthorizationGate,
}

impl ConversationService {
    pub fn new(store: Arc<dyn ChatStore>, gate: AuthorizationGate) -> Self {
        Self { store, gate }
    }

    /// Return the conversation between the two users, creating it on first
    /// authorized contact
    pub async fn get_or_create(&self, requester: Uuid, other: Uuid) -> AppResult<Conversation> {
        if requester == other {
            return Err(AppError::Validation(
                "cannot start a conversation with yourself".into(),
            ));
        }

        self.gate.ensure_can_message(requester, other).await?;

        if let Some(existing) = self.store.find_conversation_by_pair(requester, other).await? {
            return Ok(existing);
        }

        let conversation = self
            .store
            .insert_conversation(Conversation::new(requester, other))
            .await?;
        tracing::info!(
            conversation_id = %conversation.id,
            requester = %requester,
            other = %other,
            "conversation ready"
        );
        Ok(conversation)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        self.store.conversations_for_user(user_id).await
    }

    /// Load a conversation the caller participates in
    pub async fn get(&self, conversation_id: Uuid, caller: Uuid) -> AppResult<Conversation> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(Entity::Conversation))?;

        if !conversation.is_participant(caller) {
            return Err(AppError::Authorization(Denial::NotParticipant));
        }
        Ok(conversation)
    }
}
