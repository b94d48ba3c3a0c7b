//! Pure routing from a client event to the events it causes
//!
//! Nothing here touches the registry: [`route`] decides who should hear
//! what, and the hub resolves those targets to live sessions afterwards.

use super::call_state::{CallBook, SignalRejected};
use super::events::{ClientEvent, ServerEvent};
use uuid::Uuid;

/// An event addressed to a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub to: Uuid,
    pub event: ServerEvent,
}

impl Outbound {
    pub fn new(to: Uuid, event: ServerEvent) -> Self {
        Self { to, event }
    }
}

/// Route one client event sent by `sender`
pub fn route(
    sender: Uuid,
    event: ClientEvent,
    calls: &mut CallBook,
) -> Result<Vec<Outbound>, SignalRejected> {
    match event {
        ClientEvent::Typing {
            conversation_id,
            to_user_id,
        } => typing(
            sender,
            to_user_id,
            ServerEvent::UserTyping {
                conversation_id,
                user_id: sender,
            },
        ),
        ClientEvent::StopTyping {
            conversation_id,
            to_user_id,
        } => typing(
            sender,
            to_user_id,
            ServerEvent::UserStopTyping {
                conversation_id,
                user_id: sender,
            },
        ),
        ClientEvent::CallInvite(invite) => calls.invite(sender, invite),
        ClientEvent::CallAccept { call_id } => calls.accept(sender, &call_id),
        ClientEvent::CallDeny { call_id } => calls.deny(sender, &call_id),
        ClientEvent::CallCancel { call_id } => calls.cancel(sender, &call_id),
        ClientEvent::CallTimeout { call_id } => calls.timeout(sender, &call_id),
        ClientEvent::EndCall { call_id } => calls.end(sender, &call_id),
    }
}

fn typing(sender: Uuid, to: Uuid, event: ServerEvent) -> Result<Vec<Outbound>, SignalRejected> {
    if to == sender {
        return Err(SignalRejected::SelfTarget);
    }
    Ok(vec![Outbound::new(to, event)])
}
