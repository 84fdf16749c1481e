pub mod conversation;
pub mod policy;

pub use conversation::{ConversationState, Role, Turn, TurnId};
pub use policy::{SamplingParams, SystemPolicy};
