//! Conversation client module
//!
//! One request per user turn against the remote `/chat` endpoint. Failures
//! never escape as errors to the widget: both error kinds carry a fixed,
//! user-facing fallback reply.

mod http;
mod protocol;

pub use http::{ConversationService, HttpConversationClient, Reply, TurnError};
pub use protocol::{PROTOCOL_FALLBACK, TRANSPORT_FALLBACK};
