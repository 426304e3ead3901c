//! chat-voice-daemon: interaction controller for a voice-enabled chat widget
//!
//! This daemon runs next to the widget shell and provides:
//! - The interaction mode state machine (text, voice, video call)
//! - Continuous speech input built on single-shot recognition sessions
//! - One request per turn to the remote conversation endpoint
//! - IPC server relaying UI and capability events from the widget shell
//!
//! Scope:
//! - The shell owns rendering and the platform capabilities
//! - No audio/video transport; the video call is a local preview
//! - Conversation history lives for the session only

mod bridge;
mod capability;
mod client;
mod config;
mod events;
mod ipc;
mod lifecycle;
mod speech;
mod state;
mod transcript;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::bridge::{Bridge, Command};
use crate::capability::RecognitionConfig;
use crate::client::HttpConversationClient;
use crate::config::Config;
use crate::events::{ControlEvent, WidgetEvent};
use crate::ipc::{Server, ServerLinks};
use crate::lifecycle::ShutdownSignal;
use crate::speech::{SpeechInput, SpeechOutput, VoicePreferences};
use crate::state::ModeCoordinator;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "chat-voice-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        endpoint = %config.endpoint,
        "configuration loaded"
    );

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Everything the coordinator reacts to
    let (control_tx, control_rx) = mpsc::channel::<ControlEvent>(64);
    // Coordinator -> widget shell
    let (widget_tx, _) = broadcast::channel::<WidgetEvent>(64);
    // Capabilities -> widget shell
    let (command_tx, _) = broadcast::channel::<Command>(64);

    let bridge = Bridge::new(command_tx);
    let client = HttpConversationClient::new(config.endpoint.clone(), config.request_timeout)?;

    let input = SpeechInput::new(
        Box::new(bridge.recognizer()),
        RecognitionConfig::single_utterance(config.recognition_locale.clone()),
        config.restart_policy(),
    );
    let output = SpeechOutput::new(Box::new(bridge.synthesizer()), VoicePreferences::default());

    let mut coordinator = ModeCoordinator::new(
        Arc::new(client),
        input,
        output,
        Box::new(bridge.capture()),
        control_tx.clone(),
        widget_tx.clone(),
    );

    let server = Server::new(
        &config.socket_path,
        ServerLinks {
            control_tx,
            widget_tx,
            status_rx: coordinator.status_receiver(),
            bridge,
        },
    )?;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        _ = coordinator.run(control_rx) => {
            info!("coordinator exited");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        signal = shutdown.wait() => {
            match signal {
                Ok(name) => info!(signal = name, "shutdown signal received"),
                Err(e) => error!(?e, "failed to register signal handlers"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    coordinator.shutdown();
    server.shutdown().await;

    info!("chat-voice-daemon stopped");

    Ok(())
}
