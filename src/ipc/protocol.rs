//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::bridge::Command;
use crate::capability::{CapabilityError, RecognitionErrorKind, RecognitionEvent, Voice};
use crate::events::{ControlEvent, WidgetEvent};
use crate::state::ControllerStatus;

/// Requests from the widget shell to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to widget events and capability commands
    Subscribe,

    // UI events
    SubmitText { text: String },
    ToggleVoice,
    StartVideoCall,
    EndVideoCall,

    /// Which capabilities the shell provides
    Capabilities {
        recognition: bool,
        synthesis: bool,
        capture: bool,
    },

    // Recognition session events
    RecognitionStarted,
    RecognitionResult { transcript: String },
    RecognitionEnded,
    RecognitionError { error: String },

    // Synthesis events
    VoicesChanged { voices: Vec<Voice> },
    SpeechEnded,

    // Capture outcomes
    CaptureOpened { stream_id: String, tracks: Vec<String> },
    CaptureFailed { error: String },
}

impl Request {
    /// The coordinator event for requests that map one-to-one
    pub fn into_control_event(self) -> Option<ControlEvent> {
        let event = match self {
            Request::SubmitText { text } => ControlEvent::SubmitText(text),
            Request::ToggleVoice => ControlEvent::ToggleVoice,
            Request::StartVideoCall => ControlEvent::StartVideoCall,
            Request::EndVideoCall => ControlEvent::EndVideoCall,
            Request::RecognitionStarted => ControlEvent::Recognition(RecognitionEvent::Started),
            Request::RecognitionResult { transcript } => {
                ControlEvent::Recognition(RecognitionEvent::Result(transcript))
            }
            Request::RecognitionEnded => ControlEvent::Recognition(RecognitionEvent::End),
            Request::RecognitionError { error } => ControlEvent::Recognition(
                RecognitionEvent::Error(RecognitionErrorKind::from_code(&error)),
            ),
            Request::SpeechEnded => ControlEvent::SpeechEnded,
            Request::CaptureFailed { error } => {
                ControlEvent::CaptureFailed(capture_error_from_name(&error))
            }
            Request::GetStatus
            | Request::Ping
            | Request::Subscribe
            | Request::Capabilities { .. }
            | Request::VoicesChanged { .. }
            | Request::CaptureOpened { .. } => return None,
        };
        Some(event)
    }
}

/// Map a capture error name reported by the shell
pub fn capture_error_from_name(name: &str) -> CapabilityError {
    match name {
        "NotAllowedError" | "SecurityError" | "PermissionDeniedError" => CapabilityError::Denied,
        "NotFoundError" | "NotSupportedError" => CapabilityError::Unavailable,
        other => CapabilityError::Transient(other.to_string()),
    }
}

/// Responses from daemon to the shell
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Event queued for the coordinator
    Accepted,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to the shell (for subscribed clients)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Something to render
    Widget(WidgetEvent),
    /// Something for a capability to do
    Command(Command),
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    #[serde(flatten)]
    pub controller: ControllerStatus,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: 0,
            controller: ControllerStatus::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization() {
        let req: Request =
            serde_json::from_str(r#"{"type":"submit_text","text":"hello"}"#).unwrap();
        assert!(matches!(
            req.into_control_event(),
            Some(ControlEvent::SubmitText(text)) if text == "hello"
        ));

        let req: Request =
            serde_json::from_str(r#"{"type":"recognition_error","error":"not-allowed"}"#).unwrap();
        assert!(matches!(
            req.into_control_event(),
            Some(ControlEvent::Recognition(RecognitionEvent::Error(
                RecognitionErrorKind::NotAllowed
            )))
        ));
    }

    #[test]
    fn test_control_only_requests_have_no_event() {
        assert!(Request::Ping.into_control_event().is_none());
        assert!(Request::CaptureOpened {
            stream_id: "s".into(),
            tracks: vec![],
        }
        .into_control_event()
        .is_none());
    }

    #[test]
    fn test_capture_error_names() {
        assert_eq!(capture_error_from_name("NotAllowedError"), CapabilityError::Denied);
        assert_eq!(
            capture_error_from_name("NotFoundError"),
            CapabilityError::Unavailable
        );
        assert_eq!(
            capture_error_from_name("NotReadableError"),
            CapabilityError::Transient("NotReadableError".into())
        );
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"type\":\"status\""));
        assert!(json.contains("\"mode\":\"idle\""));
    }

    #[test]
    fn test_notification_serialization() {
        let json = serde_json::to_string(&Notification::Widget(WidgetEvent::InputCleared)).unwrap();
        assert_eq!(json, r#"{"kind":"widget","type":"input_cleared"}"#);

        let json = serde_json::to_string(&Notification::Command(Command::StopRecognition)).unwrap();
        assert_eq!(json, r#"{"kind":"command","command":"stop_recognition"}"#);
    }
}
