//! Online/offline announcements
//!
//! Presence is fire-and-forget: no acknowledgement, buffering or history.

use super::events::ServerEvent;
use super::relay::Outbound;
use uuid::Uuid;

/// `user-online` for every other live user
pub fn online(user_id: Uuid, live_users: impl IntoIterator<Item = Uuid>) -> Vec<Outbound> {
    announce(user_id, live_users, ServerEvent::UserOnline { user_id })
}

/// `user-offline` for every remaining live user
pub fn offline(user_id: Uuid, live_users: impl IntoIterator<Item = Uuid>) -> Vec<Outbound> {
    announce(user_id, live_users, ServerEvent::UserOffline { user_id })
}

fn announce(
    user_id: Uuid,
    live_users: impl IntoIterator<Item = Uuid>,
    event: ServerEvent,
) -> Vec<Outbound> {
    live_users
        .into_iter()
        .filter(|peer| *peer != user_id)
        .map(|peer| Outbound::new(peer, event.clone()))
        .collect()
}
