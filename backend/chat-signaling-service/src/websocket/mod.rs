use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{mpsc::UnboundedSender, RwLock};
use uuid::Uuid;

pub mod call_state;
pub mod events;
pub mod handshake;
pub mod hub;
pub mod presence;
pub mod relay;

pub use call_state::{CallBook, CallState, SignalRejected};
pub use events::{CallInvite, ClientEvent, ServerEvent};
pub use handshake::HandshakeAuthenticator;
pub use hub::{DeliveryOutcome, RealtimeHub};
pub use relay::Outbound;

/// Unique identifier for one live transport connection
///
/// A user reconnecting gets a fresh id, which lets a late disconnect from the
/// old connection be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Outbound half of a live session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: SessionId,
    sender: UnboundedSender<ServerEvent>,
}

impl SessionHandle {
    pub fn new(session_id: SessionId, sender: UnboundedSender<ServerEvent>) -> Self {
        Self { session_id, sender }
    }

    /// Queue an event for the session; false once the session has gone away
    pub fn deliver(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Maps each user to its single current session
///
/// Registering a second session for a user replaces the first
/// (last-connect-wins). Unregistering only removes the entry when the given
/// session is still the current one.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Returns the displaced session, if any
    async fn register(&self, user_id: Uuid, session: SessionHandle) -> Option<SessionHandle>;

    /// Returns true when `session_id` was current and has been removed
    async fn unregister(&self, user_id: Uuid, session_id: SessionId) -> bool;

    async fn lookup(&self, user_id: Uuid) -> Option<SessionHandle>;

    async fn snapshot(&self) -> Vec<(Uuid, SessionHandle)>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Node-local registry
#[derive(Default)]
pub struct InMemoryConnectionRegistry {
    inner: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl InMemoryConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionRegistry for InMemoryConnectionRegistry {
    async fn register(&self, user_id: Uuid, session: SessionHandle) -> Option<SessionHandle> {
        let mut guard = self.inner.write().await;
        let displaced = guard.insert(user_id, session);

        tracing::debug!(
            user_id = %user_id,
            displaced = displaced.is_some(),
            live_sessions = guard.len(),
            "registered session"
        );

        displaced
    }

    async fn unregister(&self, user_id: Uuid, session_id: SessionId) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get(&user_id) {
            Some(current) if current.session_id == session_id => {
                guard.remove(&user_id);
                tracing::debug!(
                    user_id = %user_id,
                    session_id = %session_id,
                    live_sessions = guard.len(),
                    "unregistered session"
                );
                true
            }
            _ => false,
        }
    }

    async fn lookup(&self, user_id: Uuid) -> Option<SessionHandle> {
        self.inner.read().await.get(&user_id).cloned()
    }

    async fn snapshot(&self) -> Vec<(Uuid, SessionHandle)> {
        self.inner
            .read()
            .await
            .iter()
            .map(|(user_id, session)| (*user_id, session.clone()))
            .collect()
    }

    async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn handle() -> (SessionHandle, tokio::sync::mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = unbounded_channel();
        (SessionHandle::new(SessionId::new(), tx), rx)
    }

    #[tokio::test]
    async fn test_last_connect_wins() {
        let registry = InMemoryConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (first, _rx1) = handle();
        let (second, _rx2) = handle();

        assert!(registry.register(user, first.clone()).await.is_none());
        let displaced = registry.register(user, second.clone()).await.unwrap();

        assert_eq!(displaced.session_id, first.session_id);
        assert_eq!(
            registry.lookup(user).await.unwrap().session_id,
            second.session_id
        );
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_stale_unregister_keeps_current_session() {
        let registry = InMemoryConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (first, _rx1) = handle();
        let (second, _rx2) = handle();

        registry.register(user, first.clone()).await;
        registry.register(user, second.clone()).await;

        assert!(!registry.unregister(user, first.session_id).await);
        assert!(registry.lookup(user).await.is_some());

        assert!(registry.unregister(user, second.session_id).await);
        assert!(registry.lookup(user).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_deliver_fails_after_receiver_dropped() {
        let (session, rx) = handle();
        assert!(session.deliver(ServerEvent::UserOnline {
            user_id: Uuid::new_v4()
        }));

        drop(rx);
        assert!(!session.deliver(ServerEvent::UserOnline {
            user_id: Uuid::new_v4()
        }));
    }
}
