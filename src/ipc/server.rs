//! Unix domain socket server for IPC
//!
//! Accepts UI client connections, forwards their requests to the session
//! machine, and pushes session event notifications to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::events::SessionEvent;
use crate::session::{Phase, SessionCommand};

use super::protocol::{DaemonStatus, Notification, Request, Response, SessionPhase};

/// Encode a message as a length-prefixed JSON frame
fn encode_frame<T: serde::Serialize>(msg: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(msg)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    /// Channel into the session machine
    command_tx: mpsc::Sender<SessionCommand>,
    /// Session events, subscribed per client on request
    event_tx: broadcast::Sender<SessionEvent>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        command_tx: mpsc::Sender<SessionCommand>,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Result<Self> {
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

        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            shutdown_tx,
            command_tx,
            event_tx,
        })
    }

    /// Update the status snapshot reported to clients
    pub async fn set_phase(&self, phase: Phase, has_text: bool) {
        let mut state = self.state.write().await;
        let old = state.status.phase;
        let new = SessionPhase::from(phase);
        state.status.phase = new;
        state.status.has_text = has_text;

        if old != new {
            info!(from = ?old, to = ?new, "IPC server: phase updated");
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let command_tx = self.command_tx.clone();
                    let event_tx = self.event_tx.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, command_tx, event_tx) => {
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
    async fn handle_client(
        stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        command_tx: mpsc::Sender<SessionCommand>,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        // One writer task per client keeps responses and pushed
        // notifications from interleaving mid-frame.
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(32);
        let writer_task = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if writer.write_all(&frame).await.is_err() {
                    break;
                }
            }
        });

        let mut forwarder: Option<JoinHandle<()>> = None;
        let result = Self::serve_requests(
            &mut reader,
            &state,
            &command_tx,
            &event_tx,
            &out_tx,
            &mut forwarder,
        )
        .await;

        if let Some(task) = forwarder {
            task.abort();
        }
        drop(out_tx);
        let _ = writer_task.await;

        result
    }

    /// Read and answer requests until the client disconnects
    async fn serve_requests(
        reader: &mut OwnedReadHalf,
        state: &Arc<RwLock<ServerState>>,
        command_tx: &mpsc::Sender<SessionCommand>,
        event_tx: &broadcast::Sender<SessionEvent>,
        out_tx: &mpsc::Sender<Vec<u8>>,
        forwarder: &mut Option<JoinHandle<()>>,
    ) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match reader.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > 1024 * 1024 {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            reader.read_exact(&mut msg_buf).await?;

            // Parse request
            let request: Request =
                serde_json::from_slice(&msg_buf).context("failed to parse request")?;

            debug!(?request, "received request");

            let response = match request {
                Request::Subscribe => {
                    if forwarder.is_none() {
                        *forwarder =
                            Some(Self::spawn_forwarder(event_tx.subscribe(), out_tx.clone()));
                        debug!("client subscribed to notifications");
                    }
                    Response::Subscribed
                }
                other => Self::process_request(other, state, command_tx).await,
            };

            out_tx
                .send(encode_frame(&response)?)
                .await
                .context("client writer closed")?;
        }
    }

    /// Push session events to one subscribed client
    fn spawn_forwarder(
        mut event_rx: broadcast::Receiver<SessionEvent>,
        out_tx: mpsc::Sender<Vec<u8>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match event_rx.recv().await {
                    Ok(event) => {
                        let notification = Notification::from(event);
                        match encode_frame(&notification) {
                            Ok(frame) => {
                                if out_tx.send(frame).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(?e, "failed to encode notification"),
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "notification receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Process a request and return a response
    async fn process_request(
        request: Request,
        state: &Arc<RwLock<ServerState>>,
        command_tx: &mpsc::Sender<SessionCommand>,
    ) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let mut state = state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                Response::Status(state.status.clone())
            }

            Request::SelectImage { path } => {
                Self::forward(command_tx, SessionCommand::SelectImage { path }).await
            }
            Request::Play => Self::forward(command_tx, SessionCommand::Play).await,
            Request::Stop => Self::forward(command_tx, SessionCommand::Stop).await,
            Request::Clear => Self::forward(command_tx, SessionCommand::Clear).await,

            // Handled by the caller before dispatch
            Request::Subscribe => Response::Subscribed,
        }
    }

    async fn forward(
        command_tx: &mpsc::Sender<SessionCommand>,
        command: SessionCommand,
    ) -> Response {
        match command_tx.send(command).await {
            Ok(()) => Response::Accepted,
            Err(_) => Response::Error {
                code: "unavailable".to_string(),
                message: "session machine is not running".to_string(),
            },
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

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_socket_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "scanspeak-test-{}-{}.sock",
            name,
            std::process::id()
        ))
    }

    async fn read_message<T: serde::de::DeserializeOwned>(stream: &mut UnixStream) -> T {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await.unwrap();
        serde_json::from_slice(&buf).unwrap()
    }

    async fn send_request(stream: &mut UnixStream, request: &Request) -> Response {
        let frame = encode_frame(request).unwrap();
        stream.write_all(&frame).await.unwrap();
        read_message(stream).await
    }

    #[test]
    fn test_encode_frame_layout() {
        let frame = encode_frame(&Request::Ping).unwrap();
        let len = u32::from_le_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(len, frame.len() - 4);
        let request: Request = serde_json::from_slice(&frame[4..]).unwrap();
        assert!(matches!(request, Request::Ping));
    }

    #[tokio::test]
    async fn test_ping_and_command_forwarding() {
        let path = temp_socket_path("forward");
        let (command_tx, mut command_rx) = mpsc::channel(8);
        let (event_tx, _) = broadcast::channel(8);
        let server = Server::new(&path, command_tx, event_tx).unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut stream = UnixStream::connect(&path).await.unwrap();

        let resp = send_request(&mut stream, &Request::Ping).await;
        assert!(matches!(resp, Response::Pong));

        let resp = send_request(&mut stream, &Request::Play).await;
        assert!(matches!(resp, Response::Accepted));
        assert!(matches!(command_rx.recv().await, Some(SessionCommand::Play)));

        let resp = send_request(&mut stream, &Request::GetStatus).await;
        match resp {
            Response::Status(status) => assert_eq!(status.phase, SessionPhase::Empty),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscription_receives_notifications() {
        let path = temp_socket_path("subscribe");
        let (command_tx, _command_rx) = mpsc::channel(8);
        let (event_tx, _) = broadcast::channel(8);
        let server = Server::new(&path, command_tx, event_tx.clone()).unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut stream = UnixStream::connect(&path).await.unwrap();
        let resp = send_request(&mut stream, &Request::Subscribe).await;
        assert!(matches!(resp, Response::Subscribed));

        event_tx.send(SessionEvent::Cleared).unwrap();

        let Notification::Session {
            event,
            announcement,
        } = read_message(&mut stream).await;
        assert!(matches!(event, SessionEvent::Cleared));
        assert_eq!(announcement, "Content cleared");
    }
}
