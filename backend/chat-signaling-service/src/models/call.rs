use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a call ended, as recorded in a call-notification message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallOutcome {
    Missed,
    Declined,
    Cancelled,
    Completed,
}

/// Structured body of a `call-notification` message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallPayload {
    pub call_id: String,
    pub status: CallOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<i64>,
}

/// Profile card shown to the other side of a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerProfile {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

impl PeerProfile {
    /// Placeholder used when the caller sent no profile for the recipient
    pub fn bare(id: Uuid) -> Self {
        Self {
            id,
            name: String::new(),
            profile_picture: None,
        }
    }
}
