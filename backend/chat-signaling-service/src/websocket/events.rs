//! Wire events exchanged over the WebSocket
//!
//! Every frame is a JSON object `{"event": "<name>", "data": {...}}` with
//! kebab-case event names and camelCase payload fields.

use crate::models::{Message, PeerProfile};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events pushed from the server to a live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    UserOnline {
        user_id: Uuid,
    },
    UserOffline {
        user_id: Uuid,
    },
    UserTyping {
        conversation_id: Uuid,
        user_id: Uuid,
    },
    UserStopTyping {
        conversation_id: Uuid,
        user_id: Uuid,
    },
    IncomingCall {
        call_id: String,
        caller_id: Uuid,
        caller_name: String,
        caller_profile_picture: Option<String>,
        other_user: PeerProfile,
    },
    CallAccepted {
        call_id: String,
    },
    StartVideoCall {
        call_id: String,
        other_user: PeerProfile,
    },
    CallDenied {
        call_id: String,
    },
    CallCancelled {
        call_id: String,
    },
    CallTimeout {
        call_id: String,
    },
    CallEnded {
        call_id: String,
    },
    NewMessage {
        message: Message,
        conversation_id: Uuid,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::UserOnline { .. } => "user-online",
            ServerEvent::UserOffline { .. } => "user-offline",
            ServerEvent::UserTyping { .. } => "user-typing",
            ServerEvent::UserStopTyping { .. } => "user-stop-typing",
            ServerEvent::IncomingCall { .. } => "incoming-call",
            ServerEvent::CallAccepted { .. } => "call-accepted",
            ServerEvent::StartVideoCall { .. } => "start-video-call",
            ServerEvent::CallDenied { .. } => "call-denied",
            ServerEvent::CallCancelled { .. } => "call-cancelled",
            ServerEvent::CallTimeout { .. } => "call-timeout",
            ServerEvent::CallEnded { .. } => "call-ended",
            ServerEvent::NewMessage { .. } => "new-message",
        }
    }
}

/// Call invitation sent by the caller
///
/// `other_user` is the recipient's profile as the caller knows it; it is
/// handed back to the caller in `start-video-call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInvite {
    pub call_id: String,
    pub recipient_id: Uuid,
    #[serde(default)]
    pub caller_name: String,
    #[serde(default)]
    pub caller_profile_picture: Option<String>,
    #[serde(default)]
    pub other_user: Option<PeerProfile>,
}

/// Events a client may send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    Typing {
        conversation_id: Uuid,
        to_user_id: Uuid,
    },
    StopTyping {
        conversation_id: Uuid,
        to_user_id: Uuid,
    },
    CallInvite(CallInvite),
    CallAccept {
        call_id: String,
    },
    CallDeny {
        call_id: String,
    },
    CallCancel {
        call_id: String,
    },
    CallTimeout {
        call_id: String,
    },
    EndCall {
        call_id: String,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Typing { .. } => "typing",
            ClientEvent::StopTyping { .. } => "stop-typing",
            ClientEvent::CallInvite(_) => "call-invite",
            ClientEvent::CallAccept { .. } => "call-accept",
            ClientEvent::CallDeny { .. } => "call-deny",
            ClientEvent::CallCancel { .. } => "call-cancel",
            ClientEvent::CallTimeout { .. } => "call-timeout",
            ClientEvent::EndCall { .. } => "end-call",
        }
    }
}
