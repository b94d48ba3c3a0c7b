pub mod conversation_service;
pub mod message_service;
pub mod relationship_service;

pub use conversation_service::ConversationService;
pub use message_service::{MessageService, SendMessageRequest};
pub use relationship_service::AuthorizationGate;
