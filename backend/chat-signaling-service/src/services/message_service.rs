use crate::config::MessagingConfig;
use crate::error::{AppError, AppResult, Denial, Entity};
use crate::metrics;
use crate::models::{CallPayload, Conversation, Message, MessageKind, NewMessage};
use crate::services::AuthorizationGate;
use crate::storage::ChatStore;
use crate::websocket::{DeliveryOutcome, RealtimeHub, ServerEvent};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub call_payload: Option<CallPayload>,
}

impl SendMessageRequest {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: MessageKind::Text,
            call_payload: None,
        }
    }
}

/// Delivery coordinator: durable write first, then a best-effort push
///
/// The push never changes the outcome of `send`. A recipient without a live
/// session picks the message up on its next `list`.
pub struct MessageService {
    store: Arc<dyn ChatStore>,
    gate: AuthorizationGate,
    hub: Arc<RealtimeHub>,
    limits: MessagingConfig,
}

impl MessageService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        gate: AuthorizationGate,
        hub: Arc<RealtimeHub>,
        limits: MessagingConfig,
    ) -> Self {
        Self {
            store,
            gate,
            hub,
            limits,
        }
    }

    pub async fn send(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        request: SendMessageRequest,
    ) -> AppResult<Message> {
        let conversation = self.participant_view(conversation_id, sender_id).await?;
        let recipient_id = conversation
            .other_participant(sender_id)
            .ok_or(AppError::Internal)?;

        self.gate.ensure_can_message(sender_id, recipient_id).await?;
        self.validate(&request)?;

        let message = self
            .store
            .append_message(
                NewMessage {
                    id: Uuid::new_v4(),
                    conversation_id,
                    sender_id,
                    content: request.content,
                    kind: request.kind,
                    call_payload: request.call_payload,
                    created_at: Utc::now(),
                },
                recipient_id,
            )
            .await?;
        metrics::record_message_sent();

        tracing::info!(
            message_id = %message.id,
            conversation_id = %conversation_id,
            sender_id = %sender_id,
            sequence_number = message.sequence_number,
            "message stored"
        );

        let outcome = self
            .hub
            .push(
                recipient_id,
                ServerEvent::NewMessage {
                    message: message.clone(),
                    conversation_id,
                },
            )
            .await;
        metrics::record_push(outcome.as_str());
        if outcome == DeliveryOutcome::Missed {
            tracing::info!(
                message_id = %message.id,
                recipient_id = %recipient_id,
                "delivery miss: recipient has no live session"
            );
        }

        Ok(message)
    }

    /// Page of messages visible to `caller`, oldest first; marks them read
    pub async fn list(
        &self,
        conversation_id: Uuid,
        caller: Uuid,
        limit: Option<i64>,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Message>> {
        self.participant_view(conversation_id, caller).await?;

        let limit = self.limits.clamp_limit(limit);
        self.store
            .read_page(conversation_id, caller, limit, before)
            .await
    }

    /// Hide a message from its sender; the other participant still sees it
    pub async fn soft_delete(&self, message_id: Uuid, caller: Uuid) -> AppResult<()> {
        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound(Entity::Message))?;

        if message.sender_id != caller {
            return Err(AppError::Authorization(Denial::NotSender));
        }

        if !self.store.mark_deleted_for(message_id, caller).await? {
            return Err(AppError::NotFound(Entity::Message));
        }
        tracing::debug!(message_id = %message_id, user_id = %caller, "message hidden for sender");
        Ok(())
    }

    pub async fn unread_total(&self, user_id: Uuid) -> AppResult<i64> {
        self.store.unread_total(user_id).await
    }

    async fn participant_view(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<Conversation> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(Entity::Conversation))?;

        if !conversation.is_participant(user_id) {
            return Err(AppError::Authorization(Denial::NotParticipant));
        }
        Ok(conversation)
    }

    fn validate(&self, request: &SendMessageRequest) -> AppResult<()> {
        match (request.kind, &request.call_payload) {
            (MessageKind::Text, Some(_)) => {
                return Err(AppError::Validation(
                    "text messages cannot carry a call payload".into(),
                ))
            }
            (MessageKind::CallNotification, None) => {
                return Err(AppError::Validation(
                    "call notifications require a call payload".into(),
                ))
            }
            _ => {}
        }

        if request.kind == MessageKind::Text && request.content.trim().is_empty() {
            return Err(AppError::Validation("message content is empty".into()));
        }

        let length = request.content.chars().count();
        if length > self.limits.max_length {
            return Err(AppError::Validation(format!(
                "message content is {length} characters, limit is {}",
                self.limits.max_length
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CallOutcome;
    use crate::storage::{InMemoryChatStore, InMemoryRelationshipDirectory};
    use crate::websocket::{InMemoryConnectionRegistry, SessionHandle, SessionId};
    use tokio::sync::mpsc::unbounded_channel;

    struct Fixture {
        service: MessageService,
        hub: Arc<RealtimeHub>,
        conversation: Conversation,
        a: Uuid,
        b: Uuid,
    }

    async fn fixture() -> Fixture {
        let directory = Arc::new(InMemoryRelationshipDirectory::new());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        directory.connect(a, b).await;

        let store = Arc::new(InMemoryChatStore::new());
        let conversation = store
            .insert_conversation(Conversation::new(a, b))
            .await
            .unwrap();
        let hub = Arc::new(RealtimeHub::new(Arc::new(InMemoryConnectionRegistry::new())));
        let service = MessageService::new(
            store,
            AuthorizationGate::new(directory),
            hub.clone(),
            MessagingConfig {
                max_length: 16,
                ..MessagingConfig::default()
            },
        );

        Fixture {
            service,
            hub,
            conversation,
            a,
            b,
        }
    }

    #[tokio::test]
    async fn test_send_pushes_to_live_recipient() {
        let f = fixture().await;
        let (tx, mut rx) = unbounded_channel();
        f.hub.connect(f.b, SessionHandle::new(SessionId::new(), tx)).await;

        let message = f
            .service
            .send(f.conversation.id, f.a, SendMessageRequest::text("hello"))
            .await
            .unwrap();

        match rx.try_recv().unwrap() {
            ServerEvent::NewMessage {
                message: pushed,
                conversation_id,
            } => {
                assert_eq!(pushed.id, message.id);
                assert_eq!(conversation_id, f.conversation.id);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_succeeds_without_live_recipient() {
        let f = fixture().await;
        let message = f
            .service
            .send(f.conversation.id, f.a, SendMessageRequest::text("hello"))
            .await
            .unwrap();
        assert!(message.read_by.contains(&f.a));
        assert_eq!(f.service.unread_total(f.b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_send_validation() {
        let f = fixture().await;
        let cases = vec![
            SendMessageRequest::text("   "),
            SendMessageRequest::text("x".repeat(17)),
            SendMessageRequest {
                content: "call".into(),
                kind: MessageKind::CallNotification,
                call_payload: None,
            },
            SendMessageRequest {
                content: "hi".into(),
                kind: MessageKind::Text,
                call_payload: Some(CallPayload {
                    call_id: "c".into(),
                    status: CallOutcome::Missed,
                    duration_secs: None,
                }),
            },
        ];

        for request in cases {
            assert!(matches!(
                f.service.send(f.conversation.id, f.a, request).await,
                Err(AppError::Validation(_))
            ));
        }
        assert_eq!(f.service.unread_total(f.b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_call_notification_accepted() {
        let f = fixture().await;
        let message = f
            .service
            .send(
                f.conversation.id,
                f.b,
                SendMessageRequest {
                    content: String::new(),
                    kind: MessageKind::CallNotification,
                    call_payload: Some(CallPayload {
                        call_id: "c1".into(),
                        status: CallOutcome::Completed,
                        duration_secs: Some(42),
                    }),
                },
            )
            .await
            .unwrap();
        assert_eq!(message.kind, MessageKind::CallNotification);
        assert_eq!(message.call_payload.unwrap().duration_secs, Some(42));
    }

    #[tokio::test]
    async fn test_soft_delete_only_by_sender() {
        let f = fixture().await;
        let message = f
            .service
            .send(f.conversation.id, f.a, SendMessageRequest::text("oops"))
            .await
            .unwrap();

        assert!(matches!(
            f.service.soft_delete(message.id, f.b).await,
            Err(AppError::Authorization(_))
        ));
        f.service.soft_delete(message.id, f.a).await.unwrap();
        f.service.soft_delete(message.id, f.a).await.unwrap();

        assert!(f
            .service
            .list(f.conversation.id, f.a, None, None)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            f.service
                .list(f.conversation.id, f.b, None, None)
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(matches!(
            f.service.soft_delete(Uuid::new_v4(), f.a).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_before_cursor() {
        let f = fixture().await;
        let first = f
            .service
            .send(f.conversation.id, f.a, SendMessageRequest::text("one"))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = f
            .service
            .send(f.conversation.id, f.a, SendMessageRequest::text("two"))
            .await
            .unwrap();

        let older = f
            .service
            .list(f.conversation.id, f.b, None, Some(second.created_at))
            .await
            .unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].id, first.id);
    }
}
