//! Events module
//!
//! Two directions of traffic around the coordinator:
//! - [`ControlEvent`]: everything the coordinator reacts to, queued on one
//!   channel so that reactions never interleave
//! - [`WidgetEvent`]: what the coordinator tells the widget to render

use serde::{Deserialize, Serialize};

use crate::capability::{CapabilityError, MediaStream, RecognitionEvent};
use crate::client::{Reply, TurnError};
use crate::state::Mode;
use crate::transcript::Role;

/// Inputs to the coordinator
#[derive(Debug)]
pub enum ControlEvent {
    /// Text typed into the widget
    SubmitText(String),
    ToggleVoice,
    StartVideoCall,
    EndVideoCall,

    /// From the recognition session
    Recognition(RecognitionEvent),
    /// The synthesis voice catalog changed
    VoicesChanged,
    /// The current utterance finished playing
    SpeechEnded,
    /// The widget (re)announced which capabilities it has
    CapabilitiesChanged,
    /// The widget that hosted the capabilities disconnected
    ShellDisconnected,
    /// Capture granted
    CaptureOpened(Box<dyn MediaStream>),
    /// Capture refused or failed
    CaptureFailed(CapabilityError),

    /// Network call for the outstanding turn completed
    TurnFinished(Result<Reply, TurnError>),
    /// A debounced recognition restart is due
    RestartDue { generation: u64 },

    Shutdown,
}

/// Notifications for the widget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WidgetEvent {
    /// Render a new message bubble
    MessageAppended { role: Role, text: String },

    /// Clear the text input
    InputCleared,

    /// The voice toggle changed state
    VoiceChanged { enabled: bool },

    /// Show the local camera preview
    PreviewShown { stream_id: String },

    /// Hide the local camera preview
    PreviewHidden,

    /// Interaction mode changed
    ModeChanged { mode: Mode, previous: Mode },

    /// A turn went out to the conversation service
    TurnStarted,

    /// The outstanding turn resolved
    TurnFinished { ok: bool },

    /// A capability is missing; its controls are inert
    CapabilityUnavailable { capability: String },
}

impl std::fmt::Display for WidgetEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WidgetEvent::MessageAppended { role, .. } => write!(f, "MESSAGE_APPENDED ({})", role),
            WidgetEvent::InputCleared => write!(f, "INPUT_CLEARED"),
            WidgetEvent::VoiceChanged { enabled } => write!(f, "VOICE_CHANGED ({})", enabled),
            WidgetEvent::PreviewShown { stream_id } => {
                write!(f, "PREVIEW_SHOWN ({})", stream_id)
            }
            WidgetEvent::PreviewHidden => write!(f, "PREVIEW_HIDDEN"),
            WidgetEvent::ModeChanged { mode, previous } => {
                write!(f, "MODE_CHANGED ({} -> {})", previous, mode)
            }
            WidgetEvent::TurnStarted => write!(f, "TURN_STARTED"),
            WidgetEvent::TurnFinished { ok } => write!(f, "TURN_FINISHED (ok={})", ok),
            WidgetEvent::CapabilityUnavailable { capability } => {
                write!(f, "CAPABILITY_UNAVAILABLE ({})", capability)
            }
        }
    }
}
