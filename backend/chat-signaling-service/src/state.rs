use crate::config::Config;
use crate::error::AppResult;
use crate::services::{AuthorizationGate, ConversationService, MessageService};
use crate::storage::{ChatStore, RelationshipDirectory};
use crate::websocket::{ConnectionRegistry, HandshakeAuthenticator, RealtimeHub};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub conversations: Arc<ConversationService>,
    pub messages: Arc<MessageService>,
    pub hub: Arc<RealtimeHub>,
    pub authenticator: Arc<HandshakeAuthenticator>,
}

impl AppState {
    /// Wire services over the given backends
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ChatStore>,
        directory: Arc<dyn RelationshipDirectory>,
        registry: Arc<dyn ConnectionRegistry>,
    ) -> AppResult<Self> {
        let authenticator = Arc::new(HandshakeAuthenticator::from_public_key_pem(
            &config.jwt_public_key_pem,
        )?);
        let gate = AuthorizationGate::new(directory);
        let hub = Arc::new(RealtimeHub::new(registry));

        let conversations = Arc::new(ConversationService::new(store.clone(), gate.clone()));
        let messages = Arc::new(MessageService::new(
            store,
            gate,
            hub.clone(),
            config.messaging,
        ));

        Ok(Self {
            config,
            conversations,
            messages,
            hub,
            authenticator,
        })
    }
}
