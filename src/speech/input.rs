//! Speech input controller
//!
//! The recognizer delivers one utterance per session and then ends. This
//! controller turns that into continuous listening: while the desired
//! state is enabled, every `End` schedules a debounced restart.
//!
//! ```text
//! Disabled -> Starting -> Listening -> Ending -> Restarting -> Starting
//!                                          \-> Disabled
//! ```
//!
//! The controller never sleeps itself. Restarts are returned to the caller
//! as [`InputAction::ScheduleRestart`] and come back via
//! [`SpeechInput::restart_due`], which re-reads the desired state and the
//! restart generation at fire time.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capability::{
    CapabilityError, RecognitionConfig, RecognitionErrorKind, RecognitionEvent, Recognizer,
};

/// Lifecycle of the recognition session as seen by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputState {
    #[default]
    Disabled,
    /// Start requested, waiting for the session to report in
    Starting,
    Listening,
    /// Session is winding down; an `End` event is expected
    Ending,
    /// A restart is scheduled
    Restarting,
}

impl std::fmt::Display for InputState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputState::Disabled => write!(f, "Disabled"),
            InputState::Starting => write!(f, "Starting"),
            InputState::Listening => write!(f, "Listening"),
            InputState::Ending => write!(f, "Ending"),
            InputState::Restarting => write!(f, "Restarting"),
        }
    }
}

/// Why the controller switched itself off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableReason {
    PermissionDenied,
    Unavailable,
    RetriesExhausted,
}

/// What the owner of the controller has to do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    None,
    /// A final transcript to submit as a turn
    Submit(String),
    /// Call [`SpeechInput::restart_due`] with `generation` after `delay`
    ScheduleRestart { generation: u64, delay: Duration },
    /// The controller turned itself off
    Disabled(DisableReason),
}

/// Debounce and backoff for restarts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive hard failures before giving up
    pub max_failures: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(5),
            max_failures: 5,
        }
    }
}

impl RestartPolicy {
    /// Delay before the next restart after `failures` consecutive failures
    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures.min(16)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

pub struct SpeechInput {
    recognizer: Box<dyn Recognizer>,
    config: RecognitionConfig,
    policy: RestartPolicy,
    state: InputState,
    desired: bool,
    /// Bumped for every scheduled restart; stale timers are ignored
    generation: u64,
    failures: u32,
    unavailable: bool,
}

impl SpeechInput {
    pub fn new(
        recognizer: Box<dyn Recognizer>,
        config: RecognitionConfig,
        policy: RestartPolicy,
    ) -> Self {
        Self {
            recognizer,
            config,
            policy,
            state: InputState::Disabled,
            desired: false,
            generation: 0,
            failures: 0,
            unavailable: false,
        }
    }

    pub fn state(&self) -> InputState {
        self.state
    }

    /// Whether the controller wants to be listening
    pub fn desired(&self) -> bool {
        self.desired
    }

    pub fn is_unavailable(&self) -> bool {
        self.unavailable
    }

    /// Reconcile with a newly computed desired state
    pub fn set_desired(&mut self, desired: bool) -> InputAction {
        if desired {
            self.enable()
        } else {
            self.disable();
            InputAction::None
        }
    }

    /// Start listening unless a session is already active or pending
    pub fn enable(&mut self) -> InputAction {
        self.desired = true;

        if self.unavailable {
            debug!("speech recognition unavailable, enable ignored");
            return InputAction::None;
        }

        match self.state {
            InputState::Disabled => self.start(),
            // Ending resolves through the End event, Restarting through
            // the timer. Both re-read `desired`.
            InputState::Starting
            | InputState::Listening
            | InputState::Ending
            | InputState::Restarting => InputAction::None,
        }
    }

    /// Stop listening. A pending restart is invalidated.
    pub fn disable(&mut self) {
        self.desired = false;

        match self.state {
            InputState::Starting | InputState::Listening => {
                self.recognizer.stop();
                self.transition_to(InputState::Ending);
            }
            InputState::Restarting => {
                self.transition_to(InputState::Disabled);
            }
            InputState::Ending | InputState::Disabled => {}
        }
    }

    /// The platform announced the capability again
    pub fn reset_availability(&mut self) -> InputAction {
        if !self.unavailable {
            return InputAction::None;
        }
        self.unavailable = false;
        if self.desired {
            self.enable()
        } else {
            InputAction::None
        }
    }

    /// The capability host went away. No `End` will arrive for the current
    /// session, so it is dropped; `desired` is kept for the next announcement.
    pub fn host_lost(&mut self) {
        if self.state != InputState::Disabled {
            info!(state = %self.state, "recognition session lost with its host");
        }
        self.unavailable = true;
        self.failures = 0;
        self.transition_to(InputState::Disabled);
    }

    /// React to an event from the recognition session
    pub fn handle(&mut self, event: RecognitionEvent) -> InputAction {
        match event {
            RecognitionEvent::Started => {
                if self.state == InputState::Starting {
                    self.transition_to(InputState::Listening);
                } else {
                    debug!(state = %self.state, "late session start ignored");
                }
                InputAction::None
            }
            RecognitionEvent::Result(transcript) => self.handle_result(transcript),
            RecognitionEvent::Error(kind) => self.handle_error(kind),
            RecognitionEvent::End => self.handle_end(),
        }
    }

    /// A scheduled restart fired
    pub fn restart_due(&mut self, generation: u64) -> InputAction {
        if self.state != InputState::Restarting || generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                state = %self.state,
                "stale restart ignored"
            );
            return InputAction::None;
        }

        if !self.desired {
            self.transition_to(InputState::Disabled);
            return InputAction::None;
        }

        self.start()
    }

    fn handle_result(&mut self, transcript: String) -> InputAction {
        self.failures = 0;

        if !self.desired {
            debug!("transcript arrived after voice was disabled, dropped");
            return InputAction::None;
        }

        let transcript = transcript.trim();
        if transcript.is_empty() {
            return InputAction::None;
        }

        info!(chars = transcript.len(), "speech transcript received");
        InputAction::Submit(transcript.to_string())
    }

    fn handle_error(&mut self, kind: RecognitionErrorKind) -> InputAction {
        if kind.is_permission() {
            warn!(error = %kind, "speech recognition permission denied");
            self.desired = false;
            self.failures = 0;
            self.mark_ending();
            return InputAction::Disabled(DisableReason::PermissionDenied);
        }

        if kind.is_benign() {
            debug!(error = %kind, "speech recognition session ended early");
            return InputAction::None;
        }

        self.failures += 1;
        warn!(
            error = %kind,
            failures = self.failures,
            "speech recognition error"
        );

        if self.failures >= self.policy.max_failures {
            warn!(failures = self.failures, "giving up on speech recognition");
            self.desired = false;
            self.failures = 0;
            self.mark_ending();
            return InputAction::Disabled(DisableReason::RetriesExhausted);
        }

        InputAction::None
    }

    fn handle_end(&mut self) -> InputAction {
        match self.state {
            InputState::Disabled | InputState::Restarting => {
                debug!(state = %self.state, "stray session end ignored");
                InputAction::None
            }
            InputState::Starting | InputState::Listening | InputState::Ending => {
                if self.desired {
                    self.schedule_restart()
                } else {
                    self.transition_to(InputState::Disabled);
                    InputAction::None
                }
            }
        }
    }

    fn schedule_restart(&mut self) -> InputAction {
        self.generation += 1;
        let delay = self.policy.delay_for(self.failures);
        self.transition_to(InputState::Restarting);

        debug!(
            generation = self.generation,
            delay_ms = delay.as_millis() as u64,
            "speech recognition restart scheduled"
        );

        InputAction::ScheduleRestart {
            generation: self.generation,
            delay,
        }
    }

    fn start(&mut self) -> InputAction {
        match self.recognizer.start(&self.config) {
            Ok(()) => {
                self.transition_to(InputState::Starting);
                InputAction::None
            }
            Err(CapabilityError::InvalidState) => {
                warn!("speech recognition already active, start rejected");
                self.transition_to(InputState::Listening);
                InputAction::None
            }
            Err(CapabilityError::Unavailable) => {
                warn!("speech recognition unavailable on this platform");
                self.unavailable = true;
                self.transition_to(InputState::Disabled);
                InputAction::Disabled(DisableReason::Unavailable)
            }
            Err(CapabilityError::Denied) => {
                warn!("speech recognition permission denied at start");
                self.desired = false;
                self.transition_to(InputState::Disabled);
                InputAction::Disabled(DisableReason::PermissionDenied)
            }
            Err(CapabilityError::Transient(reason)) => {
                self.failures += 1;
                warn!(%reason, failures = self.failures, "speech recognition failed to start");
                if self.failures >= self.policy.max_failures {
                    self.desired = false;
                    self.failures = 0;
                    self.transition_to(InputState::Disabled);
                    InputAction::Disabled(DisableReason::RetriesExhausted)
                } else {
                    self.schedule_restart()
                }
            }
        }
    }

    /// The session is terminating on its own; wait for its End
    fn mark_ending(&mut self) {
        if matches!(self.state, InputState::Starting | InputState::Listening) {
            self.transition_to(InputState::Ending);
        }
    }

    fn transition_to(&mut self, new_state: InputState) {
        if self.state != new_state {
            debug!(from = %self.state, to = %new_state, "speech input transition");
            self.state = new_state;
        }
    }
}
