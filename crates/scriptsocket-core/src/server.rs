//! Listening server with a single active session
//!
//! ```text
//! Stopped --start--> Listening <--> Connected --stop--> Stopped
//! ```
//!
//! `Listening` and `Connected` both mean the server is up. A peer that
//! disconnects or fails only drops the server back to `Listening`.
//!
//! When a new peer connects while another session is active, the prior
//! session is closed and the new one takes its place (last writer wins).
//! The slot is swapped under one lock, so two sessions are never active at
//! the same time.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{validate_port, ServerConfig};
use crate::error::{BindError, SessionError, StagingError};
use crate::log::{LogKind, LogSink};
use crate::message::Message;
use crate::session::{Direction, Session};
use crate::staging::StagingStore;

/// Pause after a failed accept so a persistent fault does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// ----------------------------------------------------------------------------
// Public Types
// ----------------------------------------------------------------------------

/// Externally visible server state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Listening { addr: SocketAddr },
    Connected { addr: SocketAddr, peer: SocketAddr },
}

impl ServerState {
    /// Whether the server is accepting connections
    pub fn is_up(&self) -> bool {
        !matches!(self, ServerState::Stopped)
    }
}

/// Returned by a successful [`Server::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListeningHandle {
    local_addr: SocketAddr,
}

impl ListeningHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }
}

// ----------------------------------------------------------------------------
// Internal State
// ----------------------------------------------------------------------------

struct ActiveSession {
    id: Uuid,
    peer: SocketAddr,
    listen_addr: SocketAddr,
    close_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ActiveSession {
    /// Ask the session task to close and wait for it, aborting it if the
    /// wait runs past `grace`
    async fn shutdown(self, grace: Duration) {
        let ActiveSession { id, close_tx, mut task, .. } = self;
        let _ = close_tx.send(());

        if tokio::time::timeout(grace, &mut task).await.is_err() {
            warn!(session = %id, "Session did not close in time, aborting");
            task.abort();
        }
    }
}

struct Running {
    addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    accept_task: JoinHandle<()>,
}

enum SessionEnd {
    ClosedByServer,
    PeerDisconnected,
    Failed(SessionError),
}

struct Shared {
    config: ServerConfig,
    staging: Arc<StagingStore>,
    log: Arc<dyn LogSink>,
    state_tx: watch::Sender<ServerState>,
    active: Mutex<Option<ActiveSession>>,
}

// ----------------------------------------------------------------------------
// Server
// ----------------------------------------------------------------------------

/// Receives payloads from one peer at a time and stages content for the host
pub struct Server {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl Server {
    pub fn new(config: ServerConfig, staging: Arc<StagingStore>, log: Arc<dyn LogSink>) -> Self {
        let (state_tx, _) = watch::channel(ServerState::Stopped);
        Self {
            shared: Arc::new(Shared {
                config,
                staging,
                log,
                state_tx,
                active: Mutex::new(None),
            }),
            running: Mutex::new(None),
        }
    }

    /// Current state
    pub fn state(&self) -> ServerState {
        self.shared.state_tx.borrow().clone()
    }

    /// Observe every state transition
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.shared.state_tx.subscribe()
    }

    pub fn staging(&self) -> &Arc<StagingStore> {
        &self.shared.staging
    }

    /// Address of the peer owning the active session, if any
    pub async fn active_peer(&self) -> Option<SocketAddr> {
        self.shared.active.lock().await.as_ref().map(|active| active.peer)
    }

    /// Bind `port` and start accepting connections.
    ///
    /// Port `0` binds any free port; the chosen one is in the returned
    /// handle. A failed bind leaves the server stopped with no socket open.
    #[instrument(skip(self), fields(bind_host = %self.shared.config.bind_host))]
    pub async fn start(&self, port: i64) -> Result<ListeningHandle, BindError> {
        let port = validate_port(port)?;

        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            return Err(BindError::AlreadyListening { addr: current.addr });
        }

        let listener = TcpListener::bind((self.shared.config.bind_host.as_str(), port))
            .await
            .map_err(|source| match source.kind() {
                io::ErrorKind::AddrInUse => BindError::PortInUse { port },
                _ => BindError::Io { port, source },
            })?;
        let addr = listener
            .local_addr()
            .map_err(|source| BindError::Io { port, source })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let accept_task = tokio::spawn(accept_loop(
            Arc::clone(&self.shared),
            listener,
            addr,
            shutdown_rx,
        ));

        *running = Some(Running {
            addr,
            shutdown_tx,
            accept_task,
        });

        self.shared.state_tx.send_replace(ServerState::Listening { addr });
        info!(%addr, "Server listening");
        self.shared
            .log
            .log(LogKind::Status, &format!("Server listening on {}", addr));

        Ok(ListeningHandle { local_addr: addr })
    }

    /// Close the active session and the listener. Stopping a stopped server
    /// does nothing.
    pub async fn stop(&self) {
        let mut slot = self.running.lock().await;
        let Some(running) = slot.take() else {
            debug!("Stop requested while already stopped");
            return;
        };

        // Listener first, so nothing new is accepted while the session closes.
        let _ = running.shutdown_tx.send(());
        if let Err(e) = running.accept_task.await {
            warn!(error = %e, "Accept loop ended abnormally");
        }

        let prior = self.shared.active.lock().await.take();
        if let Some(prior) = prior {
            info!(session = %prior.id, peer = %prior.peer, "Closing active session");
            prior.shutdown(self.shared.close_grace()).await;
        }

        self.shared.state_tx.send_replace(ServerState::Stopped);
        info!(addr = %running.addr, "Server stopped");
        self.shared.log.log(LogKind::Status, "Server stopped");
    }
}

// ----------------------------------------------------------------------------
// Accept and Receive Path
// ----------------------------------------------------------------------------

async fn accept_loop(
    shared: Arc<Shared>,
    listener: TcpListener,
    addr: SocketAddr,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!(%addr, "Accept loop shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => shared.install_session(stream, peer, addr).await,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    shared.log.log(LogKind::Error, &format!("Accept failed: {}", e));
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

impl Shared {
    fn close_grace(&self) -> Duration {
        self.config.flush_timeout * 2
    }

    async fn install_session(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr, addr: SocketAddr) {
        let session = match Session::new(stream, Direction::Inbound) {
            Ok(session) => session
                .with_flush_timeout(self.config.flush_timeout)
                .with_max_frame_len(self.config.max_frame_len),
            Err(e) => {
                warn!(%peer, error = %e, "Dropping connection that could not be set up");
                return;
            }
        };
        let id = session.id();

        let prior = {
            let mut active = self.active.lock().await;
            let prior = active.take();

            let (close_tx, close_rx) = oneshot::channel();
            let task = tokio::spawn(run_session(Arc::clone(self), session, close_rx));
            *active = Some(ActiveSession {
                id,
                peer,
                listen_addr: addr,
                close_tx,
                task,
            });

            self.state_tx.send_replace(ServerState::Connected { addr, peer });
            prior
        };

        if let Some(prior) = prior {
            info!(session = %prior.id, old_peer = %prior.peer, new_peer = %peer, "Superseding active session");
            self.log.log(
                LogKind::Status,
                &format!("Connection from {} replaces session with {}", peer, prior.peer),
            );
            prior.shutdown(self.close_grace()).await;
        }

        info!(session = %id, %peer, "Client connected");
        self.log
            .log(LogKind::Status, &format!("Client connected: {}", peer));
    }

    /// Clear the slot if it still holds session `id`
    async fn release(&self, id: Uuid, peer: SocketAddr) {
        let mut active = self.active.lock().await;
        if active.as_ref().map(|a| a.id) != Some(id) {
            return;
        }

        if let Some(released) = active.take() {
            self.state_tx.send_replace(ServerState::Listening {
                addr: released.listen_addr,
            });
        }
        drop(active);

        self.log
            .log(LogKind::Status, &format!("Client disconnected: {}", peer));
    }

    async fn handle_frame(&self, session: &mut Session, frame: Vec<u8>) -> Result<(), SessionError> {
        let message = match Message::from_bytes(&frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(session = %session.id(), error = %e, "Discarding malformed message");
                self.log.log(
                    LogKind::Error,
                    &format!("Discarded malformed message from {}: {}", session.peer_addr(), e),
                );
                return Ok(());
            }
        };

        debug!(session = %session.id(), kind = ?message.kind(), len = frame.len(), "Message received");

        match message {
            Message::Test => {
                info!(session = %session.id(), "Test message received");
                self.log.log(
                    LogKind::Received,
                    &format!("Test message from {}", session.peer_addr()),
                );
                session.send_message(&Message::Ack).await
            }
            Message::Content(text) => {
                let len = text.len();
                self.log.log(
                    LogKind::Received,
                    &format!("Content from {} ({} bytes)", session.peer_addr(), len),
                );

                match self.stage(text.into_bytes()).await {
                    Ok(()) => {
                        let path = self.staging.path().display();
                        info!(session = %session.id(), len, path = %path, "Content staged");
                        self.log
                            .log(LogKind::Output, &format!("Staged {} bytes at {}", len, path));
                        session.send_message(&Message::Ack).await
                    }
                    Err(e) => {
                        // No acknowledgment: the sender sees a timeout.
                        error!(session = %session.id(), error = %e, "Staging failed");
                        self.log.log(LogKind::Error, &e.to_string());
                        Ok(())
                    }
                }
            }
            Message::Ack => {
                debug!(session = %session.id(), "Ignoring unsolicited acknowledgment");
                Ok(())
            }
        }
    }

    async fn stage(&self, content: Vec<u8>) -> Result<(), StagingError> {
        let staging = Arc::clone(&self.staging);
        match tokio::task::spawn_blocking(move || staging.write(&content)).await {
            Ok(result) => result,
            Err(join) => Err(StagingError::WriteFailure {
                path: self.staging.path().to_path_buf(),
                source: io::Error::new(io::ErrorKind::Other, join.to_string()),
            }),
        }
    }
}

async fn run_session(shared: Arc<Shared>, mut session: Session, mut close_rx: oneshot::Receiver<()>) {
    let id = session.id();
    let peer = session.peer_addr();

    let end = loop {
        tokio::select! {
            biased;
            _ = &mut close_rx => break SessionEnd::ClosedByServer,
            received = session.recv() => match received {
                Ok(Some(frame)) => {
                    if let Err(e) = shared.handle_frame(&mut session, frame).await {
                        break SessionEnd::Failed(e);
                    }
                }
                Ok(None) => break SessionEnd::PeerDisconnected,
                Err(e) => break SessionEnd::Failed(e),
            }
        }
    };

    session.close().await;

    match end {
        SessionEnd::ClosedByServer => debug!(session = %id, %peer, "Session closed by server"),
        SessionEnd::PeerDisconnected => {
            info!(session = %id, %peer, "Peer disconnected");
            shared.release(id, peer).await;
        }
        SessionEnd::Failed(e) => {
            warn!(session = %id, %peer, error = %e, "Session failed");
            shared
                .log
                .log(LogKind::Error, &format!("Connection with {} failed: {}", peer, e));
            shared.release(id, peer).await;
        }
    }
}
