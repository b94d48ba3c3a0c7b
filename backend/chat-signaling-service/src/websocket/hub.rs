use super::call_state::CallBook;
use super::events::{ClientEvent, ServerEvent};
use super::relay::{self, Outbound};
use super::{presence, ConnectionRegistry, SessionHandle, SessionId};
use crate::metrics;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Result of one push attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// No live session, or the session closed before the event was queued
    Missed,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::Missed => "missed",
        }
    }
}

/// Node-local fan-out point for presence, typing relay and call signaling
///
/// Call book mutations and the dispatch of their results happen under one
/// lock, so the two sides of a call observe its events in the same order.
pub struct RealtimeHub {
    registry: Arc<dyn ConnectionRegistry>,
    calls: Mutex<CallBook>,
}

impl RealtimeHub {
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self {
            registry,
            calls: Mutex::new(CallBook::new()),
        }
    }

    pub fn registry(&self) -> &Arc<dyn ConnectionRegistry> {
        &self.registry
    }

    /// Admit an authenticated session and announce the user
    pub async fn connect(&self, user_id: Uuid, session: SessionHandle) {
        let session_id = session.session_id;
        if let Some(displaced) = self.registry.register(user_id, session).await {
            tracing::info!(
                user_id = %user_id,
                session_id = %session_id,
                displaced_session_id = %displaced.session_id,
                "newer connection replaced live session"
            );
        }

        let live: Vec<Uuid> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .map(|(peer, _)| peer)
            .collect();
        metrics::set_live_sessions(live.len());

        self.dispatch(presence::online(user_id, live)).await;
        tracing::info!(user_id = %user_id, session_id = %session_id, "user online");
    }

    /// Drop a session; a stale session leaves the current one untouched
    pub async fn disconnect(&self, user_id: Uuid, session_id: SessionId) {
        if !self.registry.unregister(user_id, session_id).await {
            tracing::debug!(
                user_id = %user_id,
                session_id = %session_id,
                "ignoring disconnect of replaced session"
            );
            return;
        }

        {
            let mut calls = self.calls.lock().await;
            let ended = calls.abandon(user_id);
            if !ended.is_empty() {
                tracing::info!(user_id = %user_id, calls = ended.len(), "ended calls of departed user");
            }
            self.dispatch(ended).await;
        }

        let live: Vec<Uuid> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .map(|(peer, _)| peer)
            .collect();
        metrics::set_live_sessions(live.len());

        self.dispatch(presence::offline(user_id, live)).await;
        tracing::info!(user_id = %user_id, session_id = %session_id, "user offline");
    }

    /// Route and deliver one event from `sender`
    ///
    /// Rejected events are logged and produce nothing; the sender is never
    /// told. Returns the outcome of every delivery attempted.
    pub async fn handle_client_event(
        &self,
        sender: Uuid,
        event: ClientEvent,
    ) -> Vec<DeliveryOutcome> {
        let name = event.name();
        let mut calls = self.calls.lock().await;

        match relay::route(sender, event, &mut calls) {
            Ok(outbound) => {
                metrics::record_client_event(name, "accepted");
                self.dispatch(outbound).await
            }
            Err(rejected) => {
                metrics::record_client_event(name, rejected.reason());
                tracing::warn!(
                    user_id = %sender,
                    event = name,
                    reason = %rejected,
                    "dropped client event"
                );
                Vec::new()
            }
        }
    }

    /// Best-effort push to one user's live session
    pub async fn push(&self, user_id: Uuid, event: ServerEvent) -> DeliveryOutcome {
        let name = event.name();
        let outcome = match self.registry.lookup(user_id).await {
            Some(session) if session.deliver(event) => DeliveryOutcome::Delivered,
            _ => DeliveryOutcome::Missed,
        };

        if outcome == DeliveryOutcome::Missed {
            tracing::debug!(user_id = %user_id, event = name, "no live session for push");
        }
        outcome
    }

    async fn dispatch(&self, outbound: Vec<Outbound>) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(outbound.len());
        for Outbound { to, event } in outbound {
            outcomes.push(self.push(to, event).await);
        }
        outcomes
    }
}
