//! Speech module
//!
//! Controllers for the two speech capabilities:
//! - Input: continuous listening built on single-shot recognition sessions
//! - Output: one-at-a-time text-to-speech with voice selection

mod input;
mod output;

pub use input::{DisableReason, InputAction, InputState, RestartPolicy, SpeechInput};
pub use output::{SpeechOutput, VoicePreferences};
