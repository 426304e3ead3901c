//! HTTP conversation client

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::transcript::Entry;

use super::protocol::{ChatRequest, ChatResponse, PROTOCOL_FALLBACK, TRANSPORT_FALLBACK};

/// A successful service reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Canonical history, when the service sent one
    pub history: Option<Vec<Entry>>,
}

/// Ways a turn can fail to produce a reply
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("reply carried no response text")]
    Protocol,
}

impl TurnError {
    /// The fixed user-facing message shown in place of a reply
    pub fn fallback_text(&self) -> &'static str {
        match self {
            TurnError::Transport(_) => TRANSPORT_FALLBACK,
            TurnError::Protocol => PROTOCOL_FALLBACK,
        }
    }
}

/// The remote conversation service
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Issue exactly one request for this turn. No retries.
    async fn send(&self, text: &str, history: Vec<Entry>) -> Result<Reply, TurnError>;
}

/// Talks to a `POST /chat` endpoint over HTTP
pub struct HttpConversationClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpConversationClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ConversationService for HttpConversationClient {
    async fn send(&self, text: &str, history: Vec<Entry>) -> Result<Reply, TurnError> {
        let body = ChatRequest {
            message: text.to_string(),
            history,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(?e, endpoint = %self.endpoint, "chat request failed");
                TurnError::Transport(e.to_string())
            })?;

        let status = response.status();
        // The status code alone is not decisive: an error page that still
        // carries a `response` field is shown as-is.
        let parsed: ChatResponse = response.json().await.map_err(|e| {
            warn!(?e, %status, "chat response was not valid JSON");
            TurnError::Transport(e.to_string())
        })?;

        let Some(text) = parsed.reply_text() else {
            warn!(%status, "chat response had no response text");
            return Err(TurnError::Protocol);
        };

        debug!(%status, has_history = parsed.history.is_some(), "chat reply received");

        Ok(Reply {
            text: text.to_string(),
            history: parsed.history,
        })
    }
}
