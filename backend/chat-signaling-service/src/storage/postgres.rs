use super::{ChatStore, RelationshipDirectory};
use crate::error::{AppError, AppResult, Entity};
use crate::models::conversation::canonical_pair;
use crate::models::{CallPayload, Conversation, Message, MessageKind, NewMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db_pool::{acquire_with_metrics, Pool};
use std::collections::BTreeMap;
use tokio_postgres::Row;
use uuid::Uuid;

const SERVICE: &str = "chat-signaling-service";

const CONVERSATION_SELECT: &str = r#"
    SELECT c.id, c.user_low, c.user_high, c.last_message_id, c.last_message_at, c.created_at,
           COALESCE(array_agg(u.user_id) FILTER (WHERE u.user_id IS NOT NULL), '{}') AS unread_users,
           COALESCE(array_agg(u.unread_count) FILTER (WHERE u.user_id IS NOT NULL), '{}') AS unread_counts
    FROM conversations c
    LEFT JOIN conversation_unread u ON u.conversation_id = c.id
"#;

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, kind, call_payload, \
     read_by, deleted_for, sequence_number, created_at";

fn conversation_from_row(row: &Row) -> Conversation {
    let users: Vec<Uuid> = row.get("unread_users");
    let counts: Vec<i64> = row.get("unread_counts");
    let unread_count: BTreeMap<Uuid, i64> = users.into_iter().zip(counts).collect();

    Conversation {
        id: row.get("id"),
        participants: [row.get("user_low"), row.get("user_high")],
        last_message_id: row.get("last_message_id"),
        last_message_at: row.get("last_message_at"),
        unread_count,
        created_at: row.get("created_at"),
    }
}

fn message_from_row(row: &Row) -> AppResult<Message> {
    let kind_str: String = row.get("kind");
    let kind = MessageKind::from_db(&kind_str)
        .ok_or_else(|| AppError::Database(format!("unknown message kind: {kind_str}")))?;

    let call_payload = row
        .get::<_, Option<serde_json::Value>>("call_payload")
        .map(serde_json::from_value::<CallPayload>)
        .transpose()
        .map_err(|e| AppError::Database(format!("malformed call payload: {e}")))?;

    let read_by: Vec<Uuid> = row.get("read_by");
    let deleted_for: Vec<Uuid> = row.get("deleted_for");

    Ok(Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        kind,
        call_payload,
        read_by: read_by.into_iter().collect(),
        deleted_for: deleted_for.into_iter().collect(),
        sequence_number: row.get("sequence_number"),
        created_at: row.get("created_at"),
    })
}

/// [`ChatStore`] over PostgreSQL
///
/// Appends and page reads lock the conversation row, which serializes them
/// per conversation and keeps the unread counter exact.
#[derive(Clone)]
pub struct PgChatStore {
    pool: Pool,
}

impl PgChatStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn find_conversation_by_pair(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> AppResult<Option<Conversation>> {
        let (low, high) = canonical_pair(a, b);
        let client = acquire_with_metrics(&self.pool, SERVICE).await?;
        let query = format!(
            "{CONVERSATION_SELECT} WHERE c.user_low = $1 AND c.user_high = $2 GROUP BY c.id"
        );
        let row = client.query_opt(query.as_str(), &[&low, &high]).await?;
        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn insert_conversation(&self, conversation: Conversation) -> AppResult<Conversation> {
        let [low, high] = conversation.participants;
        let client = acquire_with_metrics(&self.pool, SERVICE).await?;

        // A concurrent creator of the same pair wins the unique constraint;
        // both callers then read back the single surviving row.
        client
            .execute(
                r#"
                INSERT INTO conversations (id, user_low, user_high, created_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_low, user_high) DO NOTHING
                "#,
                &[&conversation.id, &low, &high, &conversation.created_at],
            )
            .await?;
        drop(client);

        self.find_conversation_by_pair(low, high)
            .await?
            .ok_or(AppError::Internal)
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>> {
        let client = acquire_with_metrics(&self.pool, SERVICE).await?;
        let query = format!("{CONVERSATION_SELECT} WHERE c.id = $1 GROUP BY c.id");
        let row = client.query_opt(query.as_str(), &[&conversation_id]).await?;
        Ok(row.as_ref().map(conversation_from_row))
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let client = acquire_with_metrics(&self.pool, SERVICE).await?;
        let query = format!(
            "{CONVERSATION_SELECT} WHERE c.user_low = $1 OR c.user_high = $1 GROUP BY c.id \
             ORDER BY c.last_message_at DESC NULLS LAST, c.created_at DESC"
        );
        let rows = client.query(query.as_str(), &[&user_id]).await?;
        Ok(rows.iter().map(conversation_from_row).collect())
    }

    async fn append_message(&self, message: NewMessage, recipient_id: Uuid) -> AppResult<Message> {
        let call_payload = message
            .call_payload
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| AppError::Validation(format!("call payload: {e}")))?;

        let mut client = acquire_with_metrics(&self.pool, SERVICE).await?;
        let tx = client.transaction().await?;

        // Row lock on the conversation orders concurrent appends and hands
        // out the next sequence number. GREATEST ignores a NULL last_message_at.
        let row = tx
            .query_opt(
                r#"
                UPDATE conversations
                SET last_seq = last_seq + 1,
                    last_message_id = $2,
                    last_message_at = GREATEST(last_message_at, $3)
                WHERE id = $1
                RETURNING last_seq, last_message_at
                "#,
                &[&message.conversation_id, &message.id, &message.created_at],
            )
            .await?
            .ok_or_else(|| AppError::NotFound(Entity::Conversation))?;
        let sequence_number: i64 = row.get("last_seq");
        let created_at: DateTime<Utc> = row.get("last_message_at");

        let read_by = vec![message.sender_id];
        tx.execute(
            r#"
            INSERT INTO messages
                (id, conversation_id, sender_id, content, kind, call_payload,
                 read_by, sequence_number, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
            &[
                &message.id,
                &message.conversation_id,
                &message.sender_id,
                &message.content,
                &message.kind.as_str(),
                &call_payload,
                &read_by,
                &sequence_number,
                &created_at,
            ],
        )
        .await?;

        tx.execute(
            r#"
            INSERT INTO conversation_unread (conversation_id, user_id, unread_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (conversation_id, user_id)
            DO UPDATE SET unread_count = conversation_unread.unread_count + 1
            "#,
            &[&message.conversation_id, &recipient_id],
        )
        .await?;

        tx.commit().await?;

        Ok(message.into_message(sequence_number, created_at))
    }

    async fn read_page(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Message>> {
        let mut client = acquire_with_metrics(&self.pool, SERVICE).await?;
        let tx = client.transaction().await?;

        tx.query_opt(
            "SELECT id FROM conversations WHERE id = $1 FOR UPDATE",
            &[&conversation_id],
        )
        .await?
        .ok_or_else(|| AppError::NotFound(Entity::Conversation))?;

        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 \
               AND NOT ($2 = ANY(deleted_for)) \
               AND ($3::timestamptz IS NULL OR created_at < $3) \
             ORDER BY created_at DESC, sequence_number DESC \
             LIMIT $4"
        );
        let rows = tx
            .query(
                query.as_str(),
                &[&conversation_id, &reader_id, &before, &limit.max(0)],
            )
            .await?;

        let mut page = rows
            .iter()
            .map(message_from_row)
            .collect::<AppResult<Vec<Message>>>()?;
        page.reverse();

        let unread_ids: Vec<Uuid> = page
            .iter()
            .filter(|m| m.sender_id != reader_id && !m.read_by.contains(&reader_id))
            .map(|m| m.id)
            .collect();
        if !unread_ids.is_empty() {
            tx.execute(
                r#"
                UPDATE messages
                SET read_by = array_append(read_by, $2)
                WHERE id = ANY($1) AND NOT ($2 = ANY(read_by))
                "#,
                &[&unread_ids, &reader_id],
            )
            .await?;
        }

        tx.execute(
            r#"
            INSERT INTO conversation_unread (conversation_id, user_id, unread_count)
            VALUES ($1, $2, 0)
            ON CONFLICT (conversation_id, user_id) DO UPDATE SET unread_count = 0
            "#,
            &[&conversation_id, &reader_id],
        )
        .await?;

        tx.commit().await?;

        for message in page.iter_mut() {
            if message.sender_id != reader_id {
                message.read_by.insert(reader_id);
            }
        }
        Ok(page)
    }

    async fn get_message(&self, message_id: Uuid) -> AppResult<Option<Message>> {
        let client = acquire_with_metrics(&self.pool, SERVICE).await?;
        let query = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        client
            .query_opt(query.as_str(), &[&message_id])
            .await?
            .as_ref()
            .map(message_from_row)
            .transpose()
    }

    async fn mark_deleted_for(&self, message_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let client = acquire_with_metrics(&self.pool, SERVICE).await?;
        let updated = client
            .execute(
                r#"
                UPDATE messages
                SET deleted_for = CASE
                    WHEN $2 = ANY(deleted_for) THEN deleted_for
                    ELSE array_append(deleted_for, $2)
                END
                WHERE id = $1
                "#,
                &[&message_id, &user_id],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn unread_total(&self, user_id: Uuid) -> AppResult<i64> {
        let client = acquire_with_metrics(&self.pool, SERVICE).await?;
        let row = client
            .query_one(
                "SELECT COALESCE(SUM(unread_count), 0)::BIGINT AS total \
                 FROM conversation_unread WHERE user_id = $1",
                &[&user_id],
            )
            .await?;
        Ok(row.get("total"))
    }
}

/// [`RelationshipDirectory`] reading the social service's tables
#[derive(Clone)]
pub struct PgRelationshipDirectory {
    pool: Pool,
}

impl PgRelationshipDirectory {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RelationshipDirectory for PgRelationshipDirectory {
    async fn are_mutual_connections(&self, a: Uuid, b: Uuid) -> AppResult<bool> {
        let client = acquire_with_metrics(&self.pool, SERVICE).await?;
        let row = client
            .query_one(
                r#"
                SELECT
                    EXISTS(SELECT 1 FROM user_connections WHERE user_id = $1 AND connection_id = $2)
                    AND
                    EXISTS(SELECT 1 FROM user_connections WHERE user_id = $2 AND connection_id = $1)
                    AS mutual
                "#,
                &[&a, &b],
            )
            .await?;
        Ok(row.get("mutual"))
    }

    async fn has_accepted_mentorship(&self, a: Uuid, b: Uuid) -> AppResult<bool> {
        let client = acquire_with_metrics(&self.pool, SERVICE).await?;
        let row = client
            .query_one(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM mentorships
                    WHERE status = 'accepted'
                      AND ((mentor_id = $1 AND mentee_id = $2)
                        OR (mentor_id = $2 AND mentee_id = $1))
                ) AS accepted
                "#,
                &[&a, &b],
            )
            .await?;
        Ok(row.get("accepted"))
    }
}
