use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Two-party conversation
///
/// Participants are kept in ascending order so the unordered pair has one
/// canonical form. `unread_count` only ever holds participant keys; a
/// missing key reads as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    pub last_message_id: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: BTreeMap<Uuid, i64>,
    pub created_at: DateTime<Utc>,
}

/// Sort a pair into canonical order
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl Conversation {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        let (low, high) = canonical_pair(a, b);
        Self {
            id: Uuid::new_v4(),
            participants: [low, high],
            last_message_id: None,
            last_message_at: None,
            unread_count: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    /// The participant that is not `user_id`, if `user_id` is a participant
    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        match self.participants {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }

    pub fn unread_for(&self, user_id: Uuid) -> i64 {
        self.unread_count.get(&user_id).copied().unwrap_or(0)
    }

    /// Most recent activity first; conversations without messages sort last,
    /// newest created first among themselves
    pub fn recency_order(a: &Conversation, b: &Conversation) -> Ordering {
        match (a.last_message_at, b.last_message_at) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => b.created_at.cmp(&a.created_at),
        }
    }
}
