//! Interaction modes and the status snapshot

use serde::{Deserialize, Serialize};

use crate::speech::InputState;

/// The three interaction modes; exactly one is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Idle,
    VoiceOnly,
    VideoCall,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Idle => write!(f, "Idle"),
            Mode::VoiceOnly => write!(f, "VoiceOnly"),
            Mode::VideoCall => write!(f, "VideoCall"),
        }
    }
}

/// Point-in-time view of the coordinator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub mode: Mode,
    /// Standalone voice toggle
    pub voice_enabled: bool,
    /// Whether speech input should currently be listening
    pub voice_desired: bool,
    pub input_state: InputState,
    /// A reply is being spoken
    pub speaking: bool,
    /// Selected synthesis voice
    pub voice: Option<String>,
    pub turn_in_flight: bool,
    pub video_call_pending: bool,
    pub transcript_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_serialization() {
        assert_eq!(serde_json::to_string(&Mode::VoiceOnly).unwrap(), "\"voice_only\"");
        assert_eq!(Mode::default(), Mode::Idle);
    }

    #[test]
    fn test_status_serialization() {
        let status = ControllerStatus {
            mode: Mode::VideoCall,
            voice_desired: true,
            input_state: InputState::Listening,
            ..Default::default()
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"mode\":\"video_call\""));
        assert!(json.contains("\"input_state\":\"listening\""));
    }
}
