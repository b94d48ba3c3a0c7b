use super::call::CallPayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    #[default]
    Text,
    CallNotification,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::CallNotification => "call-notification",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "text" => Some(MessageKind::Text),
            "call-notification" => Some(MessageKind::CallNotification),
            _ => None,
        }
    }
}

/// Persisted message
///
/// `content` never changes after insert. The only mutations are additions
/// to `read_by` and `deleted_for`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_payload: Option<CallPayload>,
    pub read_by: BTreeSet<Uuid>,
    pub deleted_for: BTreeSet<Uuid>,
    pub sequence_number: i64,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_visible_to(&self, user_id: Uuid) -> bool {
        !self.deleted_for.contains(&user_id)
    }
}

/// A validated message ready to be appended
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub call_payload: Option<CallPayload>,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    /// Materialize with the store-assigned sequence number and timestamp
    pub fn into_message(self, sequence_number: i64, created_at: DateTime<Utc>) -> Message {
        Message {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            content: self.content,
            kind: self.kind,
            call_payload: self.call_payload,
            read_by: BTreeSet::from([self.sender_id]),
            deleted_for: BTreeSet::new(),
            sequence_number,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_db_names() {
        for kind in [MessageKind::Text, MessageKind::CallNotification] {
            assert_eq!(MessageKind::from_db(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::from_db("image"), None);
    }

    #[test]
    fn test_sender_has_read_own_message() {
        let sender = Uuid::new_v4();
        let message = NewMessage {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: sender,
            content: "hello".into(),
            kind: MessageKind::Text,
            call_payload: None,
            created_at: Utc::now(),
        }
        .into_message(1, Utc::now());

        assert!(message.read_by.contains(&sender));
        assert!(message.deleted_for.is_empty());
    }

    #[test]
    fn test_message_serializes_kind_as_type() {
        let message = NewMessage {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: "hi".into(),
            kind: MessageKind::CallNotification,
            call_payload: None,
            created_at: Utc::now(),
        }
        .into_message(3, Utc::now());

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "call-notification");
        assert_eq!(value["sequenceNumber"], 3);
        assert!(value.get("callPayload").is_none());
    }
}
