pub mod conversation;
pub mod message;
pub mod user;

pub use conversation::{canonical_pair, Conversation, ConversationSummary};
pub use message::{Message, MessageDto, MessageKind};
pub use user::UserProfile;
