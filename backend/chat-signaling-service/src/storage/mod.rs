//! Persistence seams
//!
//! Services talk to storage through these traits only. [`postgres`] is the
//! production backing; [`memory`] keeps everything in process for tests and
//! local runs. Both implement the same atomicity guarantees: a message
//! append and its unread/last-message bookkeeping land together or not at
//! all, and a page read marks its messages read in the same step that
//! resets the reader's counter.

pub mod memory;
pub mod postgres;

use crate::error::AppResult;
use crate::models::{Conversation, Message, NewMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::{InMemoryChatStore, InMemoryRelationshipDirectory};
pub use postgres::{PgChatStore, PgRelationshipDirectory};

/// Conversation and message persistence
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn find_conversation_by_pair(&self, a: Uuid, b: Uuid)
        -> AppResult<Option<Conversation>>;

    /// Insert `conversation`, or return the row that already holds its pair
    async fn insert_conversation(&self, conversation: Conversation) -> AppResult<Conversation>;

    async fn get_conversation(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>>;

    /// Conversations `user_id` participates in, most recent activity first
    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>>;

    /// Append a message and, atomically with it, move the conversation's
    /// last-message pointer and bump `recipient_id`'s unread counter.
    ///
    /// The store assigns the sequence number and never lets `created_at` go
    /// backwards within a conversation.
    async fn append_message(&self, message: NewMessage, recipient_id: Uuid) -> AppResult<Message>;

    /// Read up to `limit` messages visible to `reader_id`, oldest first.
    ///
    /// Atomically with the read, `reader_id` joins `read_by` of every
    /// returned message it did not author and its unread counter drops to
    /// zero.
    async fn read_page(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Message>>;

    async fn get_message(&self, message_id: Uuid) -> AppResult<Option<Message>>;

    /// Hide a message from `user_id`. Returns false for an unknown message.
    async fn mark_deleted_for(&self, message_id: Uuid, user_id: Uuid) -> AppResult<bool>;

    /// Sum of `user_id`'s unread counters across its conversations
    async fn unread_total(&self, user_id: Uuid) -> AppResult<i64>;
}

/// Read-only view of the social graph owned by other services
#[async_trait]
pub trait RelationshipDirectory: Send + Sync {
    /// Both users list each other as connections
    async fn are_mutual_connections(&self, a: Uuid, b: Uuid) -> AppResult<bool>;

    /// An accepted mentorship exists with either user as mentor
    async fn has_accepted_mentorship(&self, a: Uuid, b: Uuid) -> AppResult<bool>;
}
