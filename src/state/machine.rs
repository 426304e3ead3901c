//! Interaction mode coordinator
//!
//! Owns the mode, the transcript, the media stream and both speech
//! controllers. All inputs arrive as [`ControlEvent`]s on one channel and
//! are handled to completion one at a time. Network turns and restart
//! timers run as spawned tasks that post their outcome back onto the same
//! channel.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::capability::{CapabilityError, MediaCapture, MediaStream};
use crate::client::{ConversationService, Reply, TurnError};
use crate::events::{ControlEvent, WidgetEvent};
use crate::speech::{DisableReason, InputAction, SpeechInput, SpeechOutput};
use crate::transcript::{Entry, Transcript};

use super::mode::{ControllerStatus, Mode};

const RECOGNITION_DENIED: &str = "Microphone access denied. Voice input disabled.";
const RECOGNITION_EXHAUSTED: &str = "Voice input paused after repeated recognition errors.";
const CAPTURE_DENIED: &str = "Unable to access camera or microphone. Video call aborted.";
const CAPTURE_UNAVAILABLE: &str = "Video calls are not supported on this device.";
const CAPTURE_FAILED: &str = "Unable to start video call. Please try again.";
const CALL_ENDED: &str = "Video call ended.";

/// Video call lifecycle
#[derive(Debug)]
enum CallState {
    Inactive,
    /// Capture requested, waiting for grant or denial
    Requesting,
    Active(Box<dyn MediaStream>),
}

pub struct ModeCoordinator {
    mode: Mode,
    /// Standalone voice toggle
    voice_toggle: bool,
    /// Set after recognition was refused; cleared by a new user gesture
    voice_blocked: bool,
    call: CallState,
    mode_entered_at: Option<Instant>,

    transcript: Transcript,
    turn_in_flight: bool,

    service: Arc<dyn ConversationService>,
    input: SpeechInput,
    output: SpeechOutput,
    capture: Box<dyn MediaCapture>,

    /// For posting turn completions and restarts back to ourselves
    control_tx: mpsc::Sender<ControlEvent>,
    event_tx: broadcast::Sender<WidgetEvent>,
    status_tx: watch::Sender<ControllerStatus>,
}

impl ModeCoordinator {
    pub fn new(
        service: Arc<dyn ConversationService>,
        input: SpeechInput,
        output: SpeechOutput,
        capture: Box<dyn MediaCapture>,
        control_tx: mpsc::Sender<ControlEvent>,
        event_tx: broadcast::Sender<WidgetEvent>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ControllerStatus::default());
        Self {
            mode: Mode::Idle,
            voice_toggle: false,
            voice_blocked: false,
            call: CallState::Inactive,
            mode_entered_at: None,
            transcript: Transcript::new(),
            turn_in_flight: false,
            service,
            input,
            output,
            capture,
            control_tx,
            event_tx,
            status_tx,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Speech input should be listening
    pub fn voice_desired(&self) -> bool {
        (self.voice_toggle || self.call_active()) && !self.voice_blocked
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            mode: self.mode,
            voice_enabled: self.voice_toggle,
            voice_desired: self.voice_desired(),
            input_state: self.input.state(),
            speaking: self.output.is_speaking(),
            voice: self.output.voice().map(|v| v.name.clone()),
            turn_in_flight: self.turn_in_flight,
            video_call_pending: matches!(self.call, CallState::Requesting),
            transcript_len: self.transcript.len(),
        }
    }

    /// Receiver that always holds the latest status
    pub fn status_receiver(&self) -> watch::Receiver<ControllerStatus> {
        self.status_tx.subscribe()
    }

    /// Run the coordinator until the channel closes or `Shutdown` arrives
    pub async fn run(&mut self, mut control_rx: mpsc::Receiver<ControlEvent>) {
        info!("coordinator started in Idle mode");
        self.publish_status();

        while let Some(event) = control_rx.recv().await {
            if matches!(event, ControlEvent::Shutdown) {
                break;
            }
            self.handle(event);
        }

        self.shutdown();
        info!("coordinator stopped");
    }

    /// Handle one event to completion
    pub fn handle(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::SubmitText(text) => self.submit_text(&text),
            ControlEvent::ToggleVoice => self.toggle_voice(),
            ControlEvent::StartVideoCall => self.start_video_call(),
            ControlEvent::EndVideoCall => self.end_video_call(),
            ControlEvent::Recognition(event) => {
                let action = self.input.handle(event);
                self.apply_input(action);
            }
            ControlEvent::VoicesChanged => self.output.refresh_voice(),
            ControlEvent::SpeechEnded => self.output.finished(),
            ControlEvent::CapabilitiesChanged => {
                let action = self.input.reset_availability();
                self.apply_input(action);
            }
            ControlEvent::ShellDisconnected => self.shell_disconnected(),
            ControlEvent::CaptureOpened(stream) => self.capture_opened(stream),
            ControlEvent::CaptureFailed(err) => self.capture_failed(err),
            ControlEvent::TurnFinished(result) => self.finish_turn(result),
            ControlEvent::RestartDue { generation } => {
                let action = self.input.restart_due(generation);
                self.apply_input(action);
            }
            ControlEvent::Shutdown => self.shutdown(),
        }

        self.publish_status();
    }

    /// Release everything held for the session
    pub fn shutdown(&mut self) {
        if let CallState::Active(mut stream) = std::mem::replace(&mut self.call, CallState::Inactive)
        {
            stream.stop_all();
            info!(stream_id = stream.id(), "media stream released on shutdown");
        }
        self.input.disable();
        self.output.cancel();
        self.publish_status();
    }

    fn submit_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        if self.turn_in_flight {
            debug!("turn already in flight, submission suppressed");
            return;
        }

        // The service appends the new message to the history itself
        let history = self.transcript.snapshot();
        self.append(Entry::user(text));
        self.emit(WidgetEvent::InputCleared);

        self.turn_in_flight = true;
        self.emit(WidgetEvent::TurnStarted);
        info!(chars = text.len(), history_len = history.len(), "turn submitted");

        let service = Arc::clone(&self.service);
        let control_tx = self.control_tx.clone();
        let message = text.to_string();
        tokio::spawn(async move {
            let result = service.send(&message, history).await;
            if control_tx
                .send(ControlEvent::TurnFinished(result))
                .await
                .is_err()
            {
                debug!("coordinator gone, turn result dropped");
            }
        });
    }

    fn finish_turn(&mut self, result: Result<Reply, TurnError>) {
        if !self.turn_in_flight {
            warn!("turn result without an outstanding turn");
        }
        self.turn_in_flight = false;

        let ok = result.is_ok();
        match result {
            Ok(reply) => {
                info!(chars = reply.text.len(), "turn completed");
                self.append(Entry::assistant(reply.text.as_str()));
                self.output.speak(&reply.text);
                if let Some(history) = reply.history {
                    self.transcript.replace(history);
                }
            }
            Err(e) => {
                warn!(error = %e, "turn failed, showing fallback");
                self.append(Entry::assistant(e.fallback_text()));
            }
        }

        self.emit(WidgetEvent::TurnFinished { ok });
    }

    fn toggle_voice(&mut self) {
        self.voice_toggle = !self.voice_toggle;
        if self.voice_toggle {
            self.voice_blocked = false;
        }

        info!(
            enabled = self.voice_toggle,
            video_call = self.call_active(),
            "voice toggled"
        );
        self.emit(WidgetEvent::VoiceChanged {
            enabled: self.voice_toggle,
        });

        self.update_mode();
        self.sync_voice();
    }

    fn start_video_call(&mut self) {
        if !matches!(self.call, CallState::Inactive) {
            debug!("video call already active or pending");
            return;
        }

        match self.capture.request() {
            Ok(()) => {
                info!("camera and microphone requested");
                self.call = CallState::Requesting;
            }
            Err(e) => self.capture_failed(e),
        }
    }

    fn capture_opened(&mut self, mut stream: Box<dyn MediaStream>) {
        if !matches!(self.call, CallState::Requesting) {
            // Call was ended (or never requested) while capture was pending
            warn!(stream_id = stream.id(), "unexpected media stream released");
            stream.stop_all();
            return;
        }

        info!(
            stream_id = stream.id(),
            tracks = stream.active_tracks(),
            "video call started"
        );
        self.emit(WidgetEvent::PreviewShown {
            stream_id: stream.id().to_string(),
        });
        self.call = CallState::Active(stream);
        self.voice_blocked = false;

        self.update_mode();
        self.sync_voice();
    }

    fn capture_failed(&mut self, err: CapabilityError) {
        if matches!(self.call, CallState::Active(_)) {
            debug!(?err, "capture failure while a call is active ignored");
            return;
        }
        self.call = CallState::Inactive;

        warn!(?err, "video call could not start");
        let message = match err {
            CapabilityError::Denied => CAPTURE_DENIED,
            CapabilityError::Unavailable => {
                self.emit(WidgetEvent::CapabilityUnavailable {
                    capability: "capture".to_string(),
                });
                CAPTURE_UNAVAILABLE
            }
            CapabilityError::InvalidState | CapabilityError::Transient(_) => CAPTURE_FAILED,
        };
        self.append(Entry::assistant(message));
    }

    fn end_video_call(&mut self) {
        match std::mem::replace(&mut self.call, CallState::Inactive) {
            CallState::Active(mut stream) => {
                stream.stop_all();
                info!(
                    stream_id = stream.id(),
                    remaining_tracks = stream.active_tracks(),
                    "video call ended"
                );
                self.emit(WidgetEvent::PreviewHidden);
            }
            CallState::Requesting => {
                // The stream, if it still arrives, is released on arrival
                info!("pending video call abandoned");
                self.emit(WidgetEvent::PreviewHidden);
            }
            CallState::Inactive => {
                debug!("no video call to end");
                return;
            }
        }

        self.update_mode();
        self.sync_voice();
        self.append(Entry::assistant(CALL_ENDED));
    }

    /// The host of every capability is gone. Nothing it owned will report
    /// back, so the session and any call are torn down here.
    fn shell_disconnected(&mut self) {
        warn!(mode = %self.mode, "widget shell disconnected");
        self.input.host_lost();
        self.output.host_lost();

        if matches!(self.call, CallState::Inactive) {
            self.update_mode();
            self.sync_voice();
        } else {
            self.end_video_call();
        }
    }

    /// Push the current desired state into the speech input controller
    fn sync_voice(&mut self) {
        let action = self.input.set_desired(self.voice_desired());
        self.apply_input(action);
    }

    fn apply_input(&mut self, action: InputAction) {
        match action {
            InputAction::None => {}
            InputAction::Submit(transcript) => self.submit_text(&transcript),
            InputAction::ScheduleRestart { generation, delay } => {
                let control_tx = self.control_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = control_tx.send(ControlEvent::RestartDue { generation }).await;
                });
            }
            InputAction::Disabled(DisableReason::Unavailable) => {
                warn!("speech recognition unavailable, voice controls are inert");
                self.emit(WidgetEvent::CapabilityUnavailable {
                    capability: "speech_recognition".to_string(),
                });
            }
            InputAction::Disabled(reason) => {
                let message = match reason {
                    DisableReason::RetriesExhausted => RECOGNITION_EXHAUSTED,
                    _ => RECOGNITION_DENIED,
                };
                self.voice_blocked = true;
                if self.voice_toggle {
                    self.voice_toggle = false;
                    self.emit(WidgetEvent::VoiceChanged { enabled: false });
                }
                self.append(Entry::assistant(message));
                self.update_mode();
                self.sync_voice();
            }
        }
    }

    /// Recompute the mode from the call state and the toggle
    fn update_mode(&mut self) {
        let new_mode = if self.call_active() {
            Mode::VideoCall
        } else if self.voice_toggle {
            Mode::VoiceOnly
        } else {
            Mode::Idle
        };

        if new_mode == self.mode {
            return;
        }

        let old_mode = self.mode;
        let duration_ms = self
            .mode_entered_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        info!(
            from = %old_mode,
            to = %new_mode,
            duration_ms = duration_ms,
            "mode transition"
        );

        self.mode = new_mode;
        self.mode_entered_at = if new_mode != Mode::Idle {
            Some(Instant::now())
        } else {
            None
        };

        self.emit(WidgetEvent::ModeChanged {
            mode: new_mode,
            previous: old_mode,
        });
    }

    fn call_active(&self) -> bool {
        matches!(self.call, CallState::Active(_))
    }

    fn append(&mut self, entry: Entry) {
        self.emit(WidgetEvent::MessageAppended {
            role: entry.role.clone(),
            text: entry.text.clone(),
        });
        self.transcript.append(entry);
    }

    fn emit(&self, event: WidgetEvent) {
        debug!(%event, "emitting widget event");
        let _ = self.event_tx.send(event);
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.status());
    }
}
