//! Unix domain socket server for IPC
//!
//! Relays widget shell requests into the coordinator and pushes widget
//! events and capability commands to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::bridge::{Bridge, Command};
use crate::events::{ControlEvent, WidgetEvent};
use crate::state::ControllerStatus;

use super::protocol::{DaemonStatus, Notification, Request, Response};

/// Largest accepted message body
const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Channels the server needs to reach the rest of the daemon
pub struct ServerLinks {
    pub control_tx: mpsc::Sender<ControlEvent>,
    pub widget_tx: broadcast::Sender<WidgetEvent>,
    pub status_rx: watch::Receiver<ControllerStatus>,
    pub bridge: Bridge,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<ServerState>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Shared server state
struct ServerState {
    start_time: Instant,
    links: ServerLinks,
}

/// Per-connection bookkeeping
#[derive(Default)]
struct ClientSession {
    widget_rx: Option<broadcast::Receiver<WidgetEvent>>,
    command_rx: Option<broadcast::Receiver<Command>>,
    /// This client announced shell capabilities
    announced: bool,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, links: ServerLinks) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state: Arc::new(ServerState {
                start_time: Instant::now(),
                links,
            }),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, state: Arc<ServerState>) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        let (request_tx, mut request_rx) = mpsc::channel::<Result<Request, String>>(16);

        let reader_task = tokio::spawn(async move {
            loop {
                match read_request(&mut reader).await {
                    Ok(Some(request)) => {
                        if request_tx.send(request).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("client disconnected");
                        break;
                    }
                    Err(e) => {
                        warn!(?e, "client read error");
                        break;
                    }
                }
            }
        });

        let mut session = ClientSession::default();
        let result = Self::serve(&mut writer, &mut request_rx, &state, &mut session).await;

        reader_task.abort();
        if session.announced {
            state.links.bridge.withdraw();
            if state
                .links
                .control_tx
                .send(ControlEvent::ShellDisconnected)
                .await
                .is_err()
            {
                debug!("controller gone, shell disconnect not reported");
            }
        }
        result
    }

    async fn serve(
        writer: &mut OwnedWriteHalf,
        request_rx: &mut mpsc::Receiver<Result<Request, String>>,
        state: &ServerState,
        session: &mut ClientSession,
    ) -> Result<()> {
        loop {
            tokio::select! {
                request = request_rx.recv() => {
                    let Some(request) = request else {
                        return Ok(());
                    };
                    let response = match request {
                        Ok(request) => {
                            debug!(?request, "received request");
                            Self::process_request(request, state, session).await
                        }
                        Err(message) => Response::Error {
                            code: "bad_request".to_string(),
                            message,
                        },
                    };
                    send_message(writer, &response).await?;
                }

                event = recv_subscribed(&mut session.widget_rx) => {
                    match event {
                        Ok(event) => send_message(writer, &Notification::Widget(event)).await?,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "widget event receiver lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return Ok(()),
                    }
                }

                command = recv_subscribed(&mut session.command_rx) => {
                    match command {
                        Ok(command) => send_message(writer, &Notification::Command(command)).await?,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "capability command receiver lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return Ok(()),
                    }
                }
            }
        }
    }

    /// Process a request and return a response
    async fn process_request(
        request: Request,
        state: &ServerState,
        session: &mut ClientSession,
    ) -> Response {
        let links = &state.links;

        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let controller = links.status_rx.borrow().clone();
                Response::Status(DaemonStatus {
                    uptime_secs: state.start_time.elapsed().as_secs(),
                    controller,
                    ..DaemonStatus::default()
                })
            }

            Request::Subscribe => {
                session.widget_rx = Some(links.widget_tx.subscribe());
                session.command_rx = Some(links.bridge.subscribe());
                debug!("client subscribed to notifications");
                Response::Subscribed
            }

            Request::Capabilities {
                recognition,
                synthesis,
                capture,
            } => {
                links.bridge.announce(recognition, synthesis, capture);
                session.announced = true;
                Self::forward(links, ControlEvent::CapabilitiesChanged).await
            }

            Request::VoicesChanged { voices } => {
                links.bridge.set_voices(voices);
                Self::forward(links, ControlEvent::VoicesChanged).await
            }

            Request::CaptureOpened { stream_id, tracks } => {
                let stream = links.bridge.stream(stream_id, tracks);
                Self::forward(links, ControlEvent::CaptureOpened(Box::new(stream))).await
            }

            other => match other.into_control_event() {
                Some(event) => Self::forward(links, event).await,
                None => Response::Error {
                    code: "unsupported".to_string(),
                    message: "request not handled".to_string(),
                },
            },
        }
    }

    /// Queue an event for the coordinator
    async fn forward(links: &ServerLinks, event: ControlEvent) -> Response {
        match links.control_tx.send(event).await {
            Ok(()) => Response::Accepted,
            Err(mpsc::error::SendError(event)) => {
                if let ControlEvent::CaptureOpened(mut stream) = event {
                    stream.stop_all();
                }
                Response::Error {
                    code: "unavailable".to_string(),
                    message: "controller is not running".to_string(),
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Read one length-prefixed request; `None` on clean disconnect
async fn read_request(reader: &mut OwnedReadHalf) -> Result<Option<Result<Request, String>>> {
    let mut len_buf = [0u8; 4];

    // Read message length (4-byte little-endian)
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        anyhow::bail!("message too large: {} bytes", len);
    }

    // Read message body
    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;

    Ok(Some(
        serde_json::from_slice(&msg_buf).map_err(|e| format!("failed to parse request: {}", e)),
    ))
}

/// Send a length-prefixed JSON message
async fn send_message<T: serde::Serialize>(writer: &mut OwnedWriteHalf, msg: &T) -> Result<()> {
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}

/// Receive from a subscription, or wait forever if there is none
async fn recv_subscribed<T: Clone>(
    rx: &mut Option<broadcast::Receiver<T>>,
) -> Result<T, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{
        CapabilityError, MediaCapture, RecognitionConfig, Recognizer, Synthesizer, Voice,
    };

    struct TestDaemon {
        server: Arc<Server>,
        control_rx: mpsc::Receiver<ControlEvent>,
        widget_tx: broadcast::Sender<WidgetEvent>,
        bridge: Bridge,
        _dir: PathBuf,
    }

    fn test_daemon(name: &str) -> TestDaemon {
        let dir = std::env::temp_dir().join(format!("chat-voice-test-{}-{}", name, std::process::id()));
        let (control_tx, control_rx) = mpsc::channel(16);
        let (widget_tx, _) = broadcast::channel(16);
        let (command_tx, _) = broadcast::channel(16);
        let (_status_tx, status_rx) = watch::channel(ControllerStatus::default());
        let bridge = Bridge::new(command_tx);

        let server = Server::new(
            &dir.join("daemon.sock"),
            ServerLinks {
                control_tx,
                widget_tx: widget_tx.clone(),
                status_rx,
                bridge: bridge.clone(),
            },
        )
        .unwrap();

        TestDaemon {
            server: Arc::new(server),
            control_rx,
            widget_tx,
            bridge,
            _dir: dir,
        }
    }

    async fn connect(daemon: &TestDaemon) -> UnixStream {
        let server = Arc::clone(&daemon.server);
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        UnixStream::connect(&daemon.server.socket_path).await.unwrap()
    }

    async fn request(stream: &mut UnixStream, body: serde_json::Value) -> serde_json::Value {
        let bytes = serde_json::to_vec(&body).unwrap();
        stream
            .write_all(&(bytes.len() as u32).to_le_bytes())
            .await
            .unwrap();
        stream.write_all(&bytes).await.unwrap();
        read_message(stream).await
    }

    async fn read_message(stream: &mut UnixStream) -> serde_json::Value {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        let mut buf = vec![0u8; u32::from_le_bytes(len_buf) as usize];
        stream.read_exact(&mut buf).await.unwrap();
        serde_json::from_slice(&buf).unwrap()
    }

    #[tokio::test]
    async fn test_ping_and_status() {
        let daemon = test_daemon("status");
        let mut stream = connect(&daemon).await;

        let pong = request(&mut stream, serde_json::json!({"type": "ping"})).await;
        assert_eq!(pong["type"], "pong");

        let status = request(&mut stream, serde_json::json!({"type": "get_status"})).await;
        assert_eq!(status["type"], "status");
        assert_eq!(status["mode"], "idle");
        assert_eq!(status["turn_in_flight"], false);

        daemon.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_ui_events_are_forwarded() {
        let mut daemon = test_daemon("forward");
        let mut stream = connect(&daemon).await;

        let resp = request(
            &mut stream,
            serde_json::json!({"type": "submit_text", "text": "hello"}),
        )
        .await;
        assert_eq!(resp["type"], "accepted");

        match daemon.control_rx.recv().await.unwrap() {
            ControlEvent::SubmitText(text) => assert_eq!(text, "hello"),
            other => panic!("unexpected event {:?}", other),
        }

        let resp = request(&mut stream, serde_json::json!({"type": "bogus"})).await;
        assert_eq!(resp["type"], "error");
        assert_eq!(resp["code"], "bad_request");

        daemon.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_capabilities_and_voices_update_bridge() {
        let mut daemon = test_daemon("caps");
        let mut stream = connect(&daemon).await;

        request(
            &mut stream,
            serde_json::json!({"type": "capabilities", "recognition": true, "synthesis": true, "capture": false}),
        )
        .await;
        assert!(matches!(
            daemon.control_rx.recv().await,
            Some(ControlEvent::CapabilitiesChanged)
        ));

        request(
            &mut stream,
            serde_json::json!({"type": "voices_changed", "voices": [{"name": "Daniel", "lang": "en-GB"}]}),
        )
        .await;
        assert!(matches!(
            daemon.control_rx.recv().await,
            Some(ControlEvent::VoicesChanged)
        ));

        assert_eq!(
            daemon.bridge.synthesizer().voices(),
            vec![Voice {
                name: "Daniel".into(),
                lang: "en-GB".into(),
                default: false,
            }]
        );

        daemon.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_subscribed_client_receives_pushes() {
        let daemon = test_daemon("push");
        let mut stream = connect(&daemon).await;

        let resp = request(&mut stream, serde_json::json!({"type": "subscribe"})).await;
        assert_eq!(resp["type"], "subscribed");

        daemon.widget_tx.send(WidgetEvent::InputCleared).unwrap();
        let pushed = read_message(&mut stream).await;
        assert_eq!(pushed["kind"], "widget");
        assert_eq!(pushed["type"], "input_cleared");

        daemon.bridge.announce(false, false, true);
        daemon.bridge.capture().request().unwrap();
        let pushed = read_message(&mut stream).await;
        assert_eq!(pushed["kind"], "command");
        assert_eq!(pushed["command"], "open_capture");

        daemon.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_announcing_client_disconnect_is_reported() {
        let mut daemon = test_daemon("disconnect");
        let mut stream = connect(&daemon).await;

        request(
            &mut stream,
            serde_json::json!({"type": "capabilities", "recognition": true, "synthesis": true, "capture": true}),
        )
        .await;
        assert!(matches!(
            daemon.control_rx.recv().await,
            Some(ControlEvent::CapabilitiesChanged)
        ));
        let _commands = daemon.bridge.subscribe();
        let config = RecognitionConfig::single_utterance("en-US");
        assert_eq!(daemon.bridge.recognizer().start(&config), Ok(()));

        drop(stream);
        assert!(matches!(
            daemon.control_rx.recv().await,
            Some(ControlEvent::ShellDisconnected)
        ));
        assert_eq!(
            daemon.bridge.recognizer().start(&config),
            Err(CapabilityError::Unavailable)
        );

        daemon.server.shutdown().await;
    }

    #[tokio::test]
    async fn test_silent_client_disconnect_is_not_reported() {
        let mut daemon = test_daemon("observer");
        let mut stream = connect(&daemon).await;

        let pong = request(&mut stream, serde_json::json!({"type": "ping"})).await;
        assert_eq!(pong["type"], "pong");
        drop(stream);

        let mut stream = UnixStream::connect(&daemon.server.socket_path).await.unwrap();
        request(
            &mut stream,
            serde_json::json!({"type": "submit_text", "text": "hi"}),
        )
        .await;
        assert!(matches!(
            daemon.control_rx.recv().await,
            Some(ControlEvent::SubmitText(_))
        ));

        daemon.server.shutdown().await;
    }
}
