//! Platform capabilities driven by the controller
//!
//! Speech recognition, speech synthesis and camera/microphone capture are
//! black boxes. The controller only issues commands through these traits;
//! everything the capability reports back arrives later as an event.

use serde::{Deserialize, Serialize};

/// Failure reported by a capability when asked to do something
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("permission denied")]
    Denied,

    #[error("capability not available on this platform")]
    Unavailable,

    #[error("capability is already active")]
    InvalidState,

    #[error("capability error: {0}")]
    Transient(String),
}

/// Kinds of error a recognition session can end with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// Microphone or recognition service permission refused
    NotAllowed,
    /// Session timed out without hearing anything
    NoSpeech,
    /// Session was aborted, usually by our own stop request
    Aborted,
    Network,
    AudioCapture,
    Other(String),
}

impl RecognitionErrorKind {
    /// Map a platform error code onto a kind
    pub fn from_code(code: &str) -> Self {
        match code {
            "not-allowed" | "service-not-allowed" => Self::NotAllowed,
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "network" => Self::Network,
            "audio-capture" => Self::AudioCapture,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_permission(&self) -> bool {
        matches!(self, Self::NotAllowed)
    }

    /// Expected during continuous listening; not counted as a failure
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::NoSpeech | Self::Aborted)
    }
}

impl std::fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAllowed => write!(f, "not-allowed"),
            Self::NoSpeech => write!(f, "no-speech"),
            Self::Aborted => write!(f, "aborted"),
            Self::Network => write!(f, "network"),
            Self::AudioCapture => write!(f, "audio-capture"),
            Self::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Events emitted by a recognition session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// The session is actually listening
    Started,
    /// Final transcript of one utterance
    Result(String),
    /// Terminal event; always the last one of a session
    End,
    Error(RecognitionErrorKind),
}

/// How recognition sessions are configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    pub locale: String,
    /// Always false: one utterance per session
    pub continuous: bool,
    /// Always false: only final results
    pub interim_results: bool,
}

impl RecognitionConfig {
    pub fn single_utterance(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            continuous: false,
            interim_results: false,
        }
    }
}

/// Speech-to-text capability
pub trait Recognizer: Send {
    /// Begin a single-shot session
    fn start(&mut self, config: &RecognitionConfig) -> Result<(), CapabilityError>;

    /// Ask the running session to end; an `End` event follows
    fn stop(&mut self);
}

/// A voice from the synthesis catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub lang: String,
    #[serde(default)]
    pub default: bool,
}

/// One utterance handed to the synthesizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<String>,
    pub lang: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// Text-to-speech capability
pub trait Synthesizer: Send {
    /// Current voice catalog; may be empty until the platform populates it
    fn voices(&self) -> Vec<Voice>;

    fn speak(&mut self, utterance: Utterance) -> Result<(), CapabilityError>;

    /// Abandon the utterance in progress, if any
    fn cancel(&mut self);
}

/// An open camera+microphone stream
pub trait MediaStream: Send + std::fmt::Debug {
    fn id(&self) -> &str;

    fn active_tracks(&self) -> usize;

    /// Stop every track. Idempotent.
    fn stop_all(&mut self);
}

/// Camera+microphone capture capability
pub trait MediaCapture: Send {
    /// Ask for combined audio+video access; the stream or the denial
    /// arrives later as an event
    fn request(&mut self) -> Result<(), CapabilityError>;
}
