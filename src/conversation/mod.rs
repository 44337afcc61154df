//! Conversation state
//!
//! - `Scenario` classification by ordered keyword rules
//! - Append-only message history
//! - Session context (session id, persona, greeting flags) over a pluggable store

mod context;
mod message;
mod scenario;

pub use context::{KeyValueStore, MemoryStore, Persona, SessionContext};
pub use message::{ConversationHistory, ConversationMessage, Transcript};
pub use scenario::{classify, contains_greeting, Scenario};
