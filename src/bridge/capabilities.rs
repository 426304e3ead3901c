//! Capability implementations that relay to the widget shell

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::capability::{
    CapabilityError, MediaCapture, MediaStream, RecognitionConfig, Recognizer, Synthesizer,
    Utterance, Voice,
};

/// Commands pushed to the widget shell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    StartRecognition { config: RecognitionConfig },
    StopRecognition,
    Speak { utterance: Utterance },
    CancelSpeech,
    OpenCapture,
    ReleaseCapture { stream_id: String },
}

/// What the shell has told us about itself
#[derive(Debug, Default)]
struct ShellState {
    recognition: bool,
    synthesis: bool,
    capture: bool,
    voices: Vec<Voice>,
}

/// Shared handle to the shell connection
#[derive(Clone)]
pub struct Bridge {
    commands: broadcast::Sender<Command>,
    shell: Arc<Mutex<ShellState>>,
}

impl Bridge {
    pub fn new(commands: broadcast::Sender<Command>) -> Self {
        Self {
            commands,
            shell: Arc::new(Mutex::new(ShellState::default())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Command> {
        self.commands.subscribe()
    }

    /// Record which capabilities the shell provides
    pub fn announce(&self, recognition: bool, synthesis: bool, capture: bool) {
        let mut shell = self.lock();
        shell.recognition = recognition;
        shell.synthesis = synthesis;
        shell.capture = capture;
        debug!(recognition, synthesis, capture, "shell capabilities announced");
    }

    /// The shell went away; everything is unavailable until it returns
    pub fn withdraw(&self) {
        *self.lock() = ShellState::default();
        debug!("shell capabilities withdrawn");
    }

    pub fn set_voices(&self, voices: Vec<Voice>) {
        self.lock().voices = voices;
    }

    pub fn recognizer(&self) -> ShellRecognizer {
        ShellRecognizer {
            bridge: self.clone(),
        }
    }

    pub fn synthesizer(&self) -> ShellSynthesizer {
        ShellSynthesizer {
            bridge: self.clone(),
        }
    }

    pub fn capture(&self) -> ShellCapture {
        ShellCapture {
            bridge: self.clone(),
        }
    }

    /// Handle for a stream the shell opened
    pub fn stream(&self, id: impl Into<String>, tracks: Vec<String>) -> ShellStream {
        ShellStream {
            id: id.into(),
            tracks,
            live: true,
            bridge: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ShellState> {
        self.shell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, command: Command) -> Result<(), CapabilityError> {
        self.commands.send(command).map(|_| ()).map_err(|_| {
            warn!("no shell connected to receive command");
            CapabilityError::Unavailable
        })
    }
}

pub struct ShellRecognizer {
    bridge: Bridge,
}

impl Recognizer for ShellRecognizer {
    fn start(&mut self, config: &RecognitionConfig) -> Result<(), CapabilityError> {
        if !self.bridge.lock().recognition {
            return Err(CapabilityError::Unavailable);
        }
        self.bridge.send(Command::StartRecognition {
            config: config.clone(),
        })
    }

    fn stop(&mut self) {
        let _ = self.bridge.send(Command::StopRecognition);
    }
}

pub struct ShellSynthesizer {
    bridge: Bridge,
}

impl Synthesizer for ShellSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        self.bridge.lock().voices.clone()
    }

    fn speak(&mut self, utterance: Utterance) -> Result<(), CapabilityError> {
        if !self.bridge.lock().synthesis {
            return Err(CapabilityError::Unavailable);
        }
        self.bridge.send(Command::Speak { utterance })
    }

    fn cancel(&mut self) {
        if self.bridge.lock().synthesis {
            let _ = self.bridge.send(Command::CancelSpeech);
        }
    }
}

pub struct ShellCapture {
    bridge: Bridge,
}

impl MediaCapture for ShellCapture {
    fn request(&mut self) -> Result<(), CapabilityError> {
        if !self.bridge.lock().capture {
            return Err(CapabilityError::Unavailable);
        }
        self.bridge.send(Command::OpenCapture)
    }
}

/// A stream owned by the shell, released by command
pub struct ShellStream {
    id: String,
    tracks: Vec<String>,
    live: bool,
    bridge: Bridge,
}

impl std::fmt::Debug for ShellStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks)
            .field("live", &self.live)
            .finish()
    }
}

impl MediaStream for ShellStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn active_tracks(&self) -> usize {
        if self.live {
            self.tracks.len()
        } else {
            0
        }
    }

    fn stop_all(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        if self
            .bridge
            .send(Command::ReleaseCapture {
                stream_id: self.id.clone(),
            })
            .is_err()
        {
            warn!(stream_id = %self.id, "shell gone before stream release");
        }
    }
}
