use super::{ChatStore, RelationshipDirectory};
use crate::error::{AppError, AppResult, Entity};
use crate::models::conversation::canonical_pair;
use crate::models::{Conversation, Message, NewMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Default)]
struct ChatTables {
    conversations: HashMap<Uuid, Conversation>,
    pairs: HashMap<(Uuid, Uuid), Uuid>,
    messages: HashMap<Uuid, Message>,
    // conversation_id -> message ids in sequence order
    timeline: HashMap<Uuid, Vec<Uuid>>,
}

/// Process-local [`ChatStore`]
///
/// One mutex guards every table, so each trait call is a single atomic step.
#[derive(Default)]
pub struct InMemoryChatStore {
    tables: Mutex<ChatTables>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn find_conversation_by_pair(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> AppResult<Option<Conversation>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .pairs
            .get(&canonical_pair(a, b))
            .and_then(|id| tables.conversations.get(id))
            .cloned())
    }

    async fn insert_conversation(&self, conversation: Conversation) -> AppResult<Conversation> {
        let [low, high] = conversation.participants;
        if low == high {
            return Err(AppError::Validation(
                "a conversation needs two distinct participants".into(),
            ));
        }

        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables
            .pairs
            .get(&(low, high))
            .and_then(|id| tables.conversations.get(id))
        {
            return Ok(existing.clone());
        }

        tables.pairs.insert((low, high), conversation.id);
        tables.timeline.insert(conversation.id, Vec::new());
        tables
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self
            .tables
            .lock()
            .await
            .conversations
            .get(&conversation_id)
            .cloned())
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let tables = self.tables.lock().await;
        let mut conversations: Vec<Conversation> = tables
            .conversations
            .values()
            .filter(|c| c.is_participant(user_id))
            .cloned()
            .collect();
        conversations.sort_by(Conversation::recency_order);
        Ok(conversations)
    }

    async fn append_message(&self, message: NewMessage, recipient_id: Uuid) -> AppResult<Message> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;

        let conversation = tables
            .conversations
            .get_mut(&message.conversation_id)
            .ok_or_else(|| AppError::NotFound(Entity::Conversation))?;
        let timeline = tables
            .timeline
            .entry(message.conversation_id)
            .or_default();

        let sequence_number = timeline.len() as i64 + 1;
        let created_at = match conversation.last_message_at {
            Some(last) if last > message.created_at => last,
            _ => message.created_at,
        };
        let message = message.into_message(sequence_number, created_at);

        conversation.last_message_id = Some(message.id);
        conversation.last_message_at = Some(created_at);
        *conversation.unread_count.entry(recipient_id).or_insert(0) += 1;

        timeline.push(message.id);
        tables.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn read_page(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Message>> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;

        let conversation = tables
            .conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| AppError::NotFound(Entity::Conversation))?;

        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        let page_ids: Vec<Uuid> = tables
            .timeline
            .get(&conversation_id)
            .map(|ids| {
                ids.iter()
                    .rev()
                    .filter(|id| {
                        tables.messages.get(*id).is_some_and(|m| {
                            m.is_visible_to(reader_id) && before.map_or(true, |b| m.created_at < b)
                        })
                    })
                    .take(limit)
                    .copied()
                    .collect()
            })
            .unwrap_or_default();

        let mut page = Vec::with_capacity(page_ids.len());
        for id in page_ids.iter().rev() {
            if let Some(message) = tables.messages.get_mut(id) {
                if message.sender_id != reader_id {
                    message.read_by.insert(reader_id);
                }
                page.push(message.clone());
            }
        }

        conversation.unread_count.insert(reader_id, 0);
        Ok(page)
    }

    async fn get_message(&self, message_id: Uuid) -> AppResult<Option<Message>> {
        Ok(self.tables.lock().await.messages.get(&message_id).cloned())
    }

    async fn mark_deleted_for(&self, message_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.messages.get_mut(&message_id) {
            Some(message) => {
                message.deleted_for.insert(user_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn unread_total(&self, user_id: Uuid) -> AppResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .conversations
            .values()
            .filter(|c| c.is_participant(user_id))
            .map(|c| c.unread_for(user_id))
            .sum())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentorshipStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Default)]
struct Graph {
    // (user, listed connection), one direction per entry
    connections: HashSet<(Uuid, Uuid)>,
    mentorships: Vec<(Uuid, Uuid, MentorshipStatus)>,
}

/// Process-local [`RelationshipDirectory`] seeded by tests and local runs
#[derive(Default)]
pub struct InMemoryRelationshipDirectory {
    graph: RwLock<Graph>,
    unavailable: AtomicBool,
}

impl InMemoryRelationshipDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// `user_id` lists `connection_id`; the reverse is not implied
    pub async fn add_connection(&self, user_id: Uuid, connection_id: Uuid) {
        self.graph
            .write()
            .await
            .connections
            .insert((user_id, connection_id));
    }

    pub async fn connect(&self, a: Uuid, b: Uuid) {
        let mut graph = self.graph.write().await;
        graph.connections.insert((a, b));
        graph.connections.insert((b, a));
    }

    pub async fn add_mentorship(&self, mentor_id: Uuid, mentee_id: Uuid, status: MentorshipStatus) {
        self.graph
            .write()
            .await
            .mentorships
            .push((mentor_id, mentee_id, status));
    }

    /// Make every lookup fail, as an unreachable database would
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Database("relationship directory unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RelationshipDirectory for InMemoryRelationshipDirectory {
    async fn are_mutual_connections(&self, a: Uuid, b: Uuid) -> AppResult<bool> {
        self.check_available()?;
        let graph = self.graph.read().await;
        Ok(graph.connections.contains(&(a, b)) && graph.connections.contains(&(b, a)))
    }

    async fn has_accepted_mentorship(&self, a: Uuid, b: Uuid) -> AppResult<bool> {
        self.check_available()?;
        let graph = self.graph.read().await;
        Ok(graph.mentorships.iter().any(|(mentor, mentee, status)| {
            *status == MentorshipStatus::Accepted
                && ((*mentor == a && *mentee == b) || (*mentor == b && *mentee == a))
        }))
    }
}
