pub mod call;
pub mod conversation;
pub mod message;

pub use call::{CallOutcome, CallPayload, PeerProfile};
pub use conversation::Conversation;
pub use message::{Message, MessageKind, NewMessage};
