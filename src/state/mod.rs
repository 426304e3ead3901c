//! State module for interaction mode management
//!
//! Provides the coordinator that owns the interaction mode:
//! - Idle: text chat only
//! - VoiceOnly: continuous listening, toggled by the user
//! - VideoCall: local camera preview, listening implied

mod machine;
mod mode;

pub use machine::ModeCoordinator;
pub use mode::{ControllerStatus, Mode};
