//! Wire types for the `/chat` endpoint
//!
//! Request: `{ message, history }`. Response: `{ response?, history? }`.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::transcript::Entry;

/// Reply text used when the service answers without a usable `response`
pub const PROTOCOL_FALLBACK: &str = "Systems failure. Unable to process command.";

/// Reply text used when the service cannot be reached or returns garbage
pub const TRANSPORT_FALLBACK: &str = "Communication link severed. Please check backend status.";

/// Outbound request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<Entry>,
}

/// Inbound response body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// An unreadable history is dropped rather than failing the reply
    #[serde(
        default,
        deserialize_with = "lenient_history",
        skip_serializing_if = "Option::is_none"
    )]
    pub history: Option<Vec<Entry>>,
}

fn lenient_history<'de, D>(deserializer: D) -> Result<Option<Vec<Entry>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<serde_json::Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    match serde_json::from_value(raw) {
        Ok(history) => Ok(Some(history)),
        Err(e) => {
            warn!(?e, "reply history unreadable, keeping local transcript");
            Ok(None)
        }
    }
}

impl ChatResponse {
    /// The reply text, if the service produced a non-empty one
    pub fn reply_text(&self) -> Option<&str> {
        self.response.as_deref().filter(|text| !text.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Role;

    #[test]
    fn test_request_serialization() {
        let req = ChatRequest {
            message: "hello".into(),
            history: vec![Entry::user("earlier")],
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"message":"hello","history":[{"role":"user","text":"earlier"}]}"#
        );
    }

    #[test]
    fn test_empty_response_has_no_reply() {
        let resp: ChatResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.reply_text().is_none());
        assert!(resp.history.is_none());

        let resp: ChatResponse = serde_json::from_str(r#"{"response":"  "}"#).unwrap();
        assert!(resp.reply_text().is_none());
    }

    #[test]
    fn test_response_with_history() {
        let json = r#"{"response":"Hi.","history":[
            {"role":"user","content":"hello"},
            {"role":"assistant","content":"Hi."}
        ]}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.reply_text(), Some("Hi."));

        let history = resp.history.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[test]
    fn test_unreadable_history_keeps_reply() {
        let json = r#"{"response":"Hi.","history":[{"content":"no role"}]}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.reply_text(), Some("Hi."));
        assert!(resp.history.is_none());

        let json = r#"{"response":"Hi.","history":"oops"}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.reply_text(), Some("Hi."));
        assert!(resp.history.is_none());
    }

    #[test]
    fn test_unfamiliar_role_in_history() {
        let json = r#"{"response":"Hi.","history":[{"role":"developer","content":"x"}]}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.reply_text(), Some("Hi."));
        assert_eq!(
            resp.history.unwrap()[0].role,
            Role::Other("developer".into())
        );
    }
}
