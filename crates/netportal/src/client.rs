//! The client side of the connection lifecycle.
//!
//! ```text
//! Idle ──start_client──→ Connecting ──ConnectResult(Success)──→ Connected
//!                            │                                      │
//!                            └─ConnectResult(other)─→ Rejected     lost, not at main menu
//!                                                                   ▼
//!                     Idle ←──scene_loaded(main menu)──────────  Reverting
//! ```
//!
//! A driver task owns the socket. It reads the server's control messages
//! into the shared state, forwards scene changes, and turns a lost
//! connection into exactly one [`PortalEvent`].

use std::sync::Arc;
use std::time::Duration;

use netportal_protocol::{Codec, ConnectStatus, ControlMessage, Envelope, SceneIndex};
use netportal_transport::{Connection, WebSocketConnection};
use tokio::sync::{broadcast, mpsc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::DisconnectReason;

/// How many portal events a slow subscriber may fall behind by.
const EVENT_CAPACITY: usize = 16;

/// Where the local client is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientState {
    /// Not connected and not trying to be.
    #[default]
    Idle,
    /// Connection data sent, waiting for the server's result.
    Connecting,
    /// Admitted (or hosting).
    Connected,
    /// The server answered with a non-success status.
    Rejected(ConnectStatus),
    /// Connection lost mid-game; waiting for the main menu to load.
    Reverting,
}

/// What the presentation layer is told about the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalEvent {
    /// The server's authoritative answer to a connection attempt.
    ConnectFinished(ConnectStatus),
    /// The connection went away while at the main menu.
    NetworkTimedOut,
    /// The connection went away elsewhere; load the main menu and show
    /// `reason`.
    ReturnToMainMenu { reason: ConnectStatus },
}

#[derive(Debug)]
pub(crate) struct SharedState {
    pub(crate) client: ClientState,
    pub(crate) reason: DisconnectReason,
    pub(crate) active_scene: SceneIndex,
}

/// State shared between the [`GamePortal`](crate::GamePortal) and its
/// client driver.
#[derive(Debug)]
pub(crate) struct PortalShared {
    state: Mutex<SharedState>,
    events: broadcast::Sender<PortalEvent>,
    main_menu_scene: SceneIndex,
}

impl PortalShared {
    pub(crate) fn new(main_menu_scene: SceneIndex) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(SharedState {
                client: ClientState::Idle,
                reason: DisconnectReason::new(),
                active_scene: main_menu_scene,
            }),
            events,
            main_menu_scene,
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().await
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<PortalEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: PortalEvent) {
        tracing::debug!(?event, "portal event");
        let _ = self.events.send(event);
    }

    pub(crate) fn main_menu_scene(&self) -> SceneIndex {
        self.main_menu_scene
    }
}

/// Requests from the portal to its client driver.
#[derive(Debug)]
pub(crate) enum ClientCommand {
    SceneChanged(SceneIndex),
    Disconnect,
}

struct ClientDriver<C: Codec> {
    conn: WebSocketConnection,
    shared: Arc<PortalShared>,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    codec: Arc<C>,
    connect_timeout: Duration,
    /// Last scene the server was told about.
    reported_scene: SceneIndex,
    seq: u64,
}

/// Starts the driver for a connection whose payload has already been sent.
pub(crate) fn spawn_client<C: Codec>(
    conn: WebSocketConnection,
    shared: Arc<PortalShared>,
    codec: Arc<C>,
    connect_timeout: Duration,
    reported_scene: SceneIndex,
) -> (mpsc::UnboundedSender<ClientCommand>, JoinHandle<()>) {
    let (tx, commands) = mpsc::unbounded_channel();
    let driver = ClientDriver {
        conn,
        shared,
        commands,
        codec,
        connect_timeout,
        reported_scene,
        seq: 0,
    };
    (tx, tokio::spawn(driver.run()))
}

impl<C: Codec> ClientDriver<C> {
    async fn run(mut self) {
        let conn_id = self.conn.id();
        tracing::info!(%conn_id, "client connecting");

        let deadline = tokio::time::sleep(self.connect_timeout);
        tokio::pin!(deadline);
        let mut got_result = false;

        loop {
            tokio::select! {
                _ = &mut deadline, if !got_result => {
                    tracing::warn!(%conn_id, "no connect result before timeout");
                    let _ = self.conn.close().await;
                    self.connection_lost().await;
                    return;
                }

                command = self.commands.recv() => match command {
                    Some(ClientCommand::SceneChanged(scene)) => {
                        if self.shared.lock().await.client == ClientState::Connected {
                            self.report_scene(scene).await;
                        }
                    }
                    Some(ClientCommand::Disconnect) | None => {
                        self.user_disconnect().await;
                        return;
                    }
                },

                incoming = self.conn.recv() => match incoming {
                    Ok(Some(data)) => {
                        got_result |= self.handle_message(&data).await;
                    }
                    Ok(None) => {
                        tracing::info!(%conn_id, "server closed the connection");
                        self.connection_lost().await;
                        return;
                    }
                    Err(e) => {
                        tracing::info!(%conn_id, error = %e, "connection lost");
                        self.connection_lost().await;
                        return;
                    }
                },
            }
        }
    }

    /// Applies one server message. Returns `true` for the connect result.
    async fn handle_message(&mut self, data: &[u8]) -> bool {
        let envelope: Envelope = match self.codec.decode(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(error = %e, "failed to decode envelope");
                return false;
            }
        };

        match envelope.message {
            ControlMessage::ServerToClientConnectResult { status } => {
                tracing::info!(seq = envelope.seq, %status, "connect result");
                let catch_up = {
                    let mut state = self.shared.lock().await;
                    if status.is_success() {
                        state.client = ClientState::Connected;
                        (state.active_scene != self.reported_scene)
                            .then_some(state.active_scene)
                    } else {
                        // Readable from the ConnectFinished handler.
                        state.client = ClientState::Rejected(status);
                        state.reason.set(status);
                        None
                    }
                };
                self.shared.emit(PortalEvent::ConnectFinished(status));

                // The scene changed while we were waiting for approval.
                if let Some(scene) = catch_up {
                    self.report_scene(scene).await;
                }
                true
            }
            ControlMessage::ServerToClientSetDisconnectReason { status } => {
                tracing::info!(seq = envelope.seq, %status, "disconnect reason received");
                self.shared.lock().await.reason.set(status);
                false
            }
            other => {
                tracing::debug!(message = other.name(), "unexpected message from server");
                false
            }
        }
    }

    async fn report_scene(&mut self, scene: SceneIndex) {
        self.seq += 1;
        let envelope = Envelope {
            seq: self.seq,
            message: ControlMessage::ClientToServerSceneChanged { scene_index: scene },
        };
        let sent = match self.codec.encode(&envelope) {
            Ok(bytes) => self.conn.send(&bytes).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match sent {
            Ok(()) => self.reported_scene = scene,
            // A dead socket shows up on the recv side next.
            Err(error) => tracing::debug!(%scene, %error, "scene report not sent"),
        }
    }

    /// The connection went away without the user asking for it.
    async fn connection_lost(&mut self) {
        let event = {
            let mut state = self.shared.lock().await;
            if state.active_scene == self.shared.main_menu_scene() {
                if !matches!(state.client, ClientState::Rejected(_)) {
                    state.client = ClientState::Idle;
                }
                PortalEvent::NetworkTimedOut
            } else {
                if !state.reason.has_transition_reason() {
                    state.reason.set(ConnectStatus::GenericDisconnect);
                }
                state.client = ClientState::Reverting;
                PortalEvent::ReturnToMainMenu {
                    reason: state.reason.reason(),
                }
            }
        };
        self.shared.emit(event);
    }

    /// The user left on purpose. No event: the caller is already heading
    /// for the main menu.
    async fn user_disconnect(&mut self) {
        {
            let mut state = self.shared.lock().await;
            state.reason.set(ConnectStatus::UserRequestedDisconnect);
            state.client = ClientState::Idle;
        }
        let _ = self.conn.close().await;
        tracing::info!(conn_id = %self.conn.id(), "client disconnected by request");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_portal_shared_starts_idle_at_main_menu() {
        let shared = PortalShared::new(SceneIndex(3));
        let state = shared.lock().await;

        assert_eq!(state.client, ClientState::Idle);
        assert_eq!(state.active_scene, SceneIndex(3));
        assert!(!state.reason.has_transition_reason());
    }

    #[tokio::test]
    async fn test_portal_shared_emit_reaches_subscribers() {
        let shared = PortalShared::new(SceneIndex(0));
        let mut events = shared.subscribe();

        shared.emit(PortalEvent::NetworkTimedOut);

        assert_eq!(events.recv().await.unwrap(), PortalEvent::NetworkTimedOut);
    }
}
