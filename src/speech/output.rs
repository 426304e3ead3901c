//! Speech output controller
//!
//! Drives text-to-speech playback. Only one utterance plays at a time and
//! the newest one wins: a new `speak` cancels whatever is still playing.

use tracing::{debug, info, warn};

use crate::capability::{CapabilityError, Synthesizer, Utterance, Voice};

/// Fixed delivery parameters
const RATE: f32 = 1.0;
const PITCH: f32 = 0.9;
const VOLUME: f32 = 1.0;

/// Ordered voice preferences: named voices first, then a language-region
/// match, then anything in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoicePreferences {
    pub names: Vec<String>,
    pub lang: String,
}

impl Default for VoicePreferences {
    fn default() -> Self {
        Self {
            names: vec![
                "Google UK English Male".to_string(),
                "Microsoft George - English (United Kingdom)".to_string(),
                "Daniel".to_string(),
            ],
            lang: "en-GB".to_string(),
        }
    }
}

impl VoicePreferences {
    /// Pick the first voice matching the preference order
    pub fn select<'a>(&self, catalog: &'a [Voice]) -> Option<&'a Voice> {
        self.names
            .iter()
            .find_map(|name| catalog.iter().find(|v| &v.name == name))
            .or_else(|| {
                catalog
                    .iter()
                    .find(|v| v.lang.replace('_', "-").eq_ignore_ascii_case(&self.lang))
            })
            .or_else(|| catalog.iter().find(|v| v.default))
            .or_else(|| catalog.first())
    }
}

pub struct SpeechOutput {
    synth: Box<dyn Synthesizer>,
    preferences: VoicePreferences,
    voice: Option<Voice>,
    speaking: bool,
    unavailable: bool,
}

impl SpeechOutput {
    pub fn new(synth: Box<dyn Synthesizer>, preferences: VoicePreferences) -> Self {
        Self {
            synth,
            preferences,
            voice: None,
            speaking: false,
            unavailable: false,
        }
    }

    /// Currently selected voice, if the catalog offered one
    pub fn voice(&self) -> Option<&Voice> {
        self.voice.as_ref()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Re-run voice selection against the current catalog
    pub fn refresh_voice(&mut self) {
        let catalog = self.synth.voices();
        let selected = self.preferences.select(&catalog).cloned();

        if selected != self.voice {
            info!(
                voice = selected.as_ref().map(|v| v.name.as_str()),
                catalog_size = catalog.len(),
                "speech voice selected"
            );
        }
        self.voice = selected;
    }

    /// Speak `text`, abandoning any utterance still in progress
    pub fn speak(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        // The catalog may have been empty at construction
        if self.voice.is_none() {
            self.refresh_voice();
        }

        self.synth.cancel();

        let utterance = Utterance {
            text: text.to_string(),
            voice: self.voice.as_ref().map(|v| v.name.clone()),
            lang: Some(
                self.voice
                    .as_ref()
                    .map(|v| v.lang.clone())
                    .unwrap_or_else(|| self.preferences.lang.clone()),
            ),
            rate: RATE,
            pitch: PITCH,
            volume: VOLUME,
        };

        match self.synth.speak(utterance) {
            Ok(()) => {
                self.speaking = true;
                debug!(chars = text.len(), "utterance started");
            }
            Err(CapabilityError::Unavailable) => {
                if !self.unavailable {
                    warn!("speech synthesis unavailable, replies will not be spoken");
                    self.unavailable = true;
                }
                self.speaking = false;
            }
            Err(e) => {
                warn!(?e, "speech synthesis failed");
                self.speaking = false;
            }
        }
    }

    /// The platform reported the utterance finished or failed
    pub fn finished(&mut self) {
        self.speaking = false;
    }

    /// The synthesizer's host went away along with its voice catalog
    pub fn host_lost(&mut self) {
        self.speaking = false;
        self.voice = None;
    }

    /// Stop playback immediately
    pub fn cancel(&mut self) {
        self.synth.cancel();
        self.speaking = false;
    }
}
