//! The server coordinator: one actor task that owns every piece of session
//! state, and the accept loop that feeds it connections.
//!
//! ```text
//!  accept loop ──spawn──→ handler task (one per connection)
//!                              │  Approve / SceneChanged / ConnectionLost
//!                              ▼
//!                        ServerActor  ──Outbound──→ handler task ──→ socket
//!                              │  ▲
//!              DeferredTask ───┘  └── BootClient (after the grace delay)
//! ```
//!
//! Everything that touches the [`SessionDirectory`] goes through the
//! actor's command channel, so approval, scene reports, timers and
//! disconnects are processed one at a time in arrival order.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use netportal_protocol::{
    ClientGuid, Codec, ConnectStatus, ControlMessage, JsonCodec, SceneIndex,
};
use netportal_session::{PlayerRecord, SessionConfig, SessionDirectory};
use netportal_transport::{ConnectionId, Transport, WebSocketTransport};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::deferred::DeferredTask;
use crate::handler::handle_connection;
use crate::{PortalConfig, PortalError};

/// How many server events a slow subscriber may fall behind by.
const EVENT_CAPACITY: usize = 64;

/// What the actor asks a connection's handler task to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outbound {
    /// Encode and send a control message.
    Message(ControlMessage),
    /// Close the connection.
    Close,
}

/// Per-connection queue from the actor to the handler task. Messages and
/// the close request share it, so a reason always goes out before the
/// close it explains.
pub(crate) type OutboundSender = mpsc::UnboundedSender<Outbound>;

/// Something that happened on the server, for observers such as the game
/// layer (which spawns and despawns player avatars) or a lobby UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A client passed approval.
    ClientAdmitted {
        conn_id: ConnectionId,
        client_guid: ClientGuid,
        player_name: String,
    },

    /// A connection was forcibly closed after being told why. Any in-world
    /// representation of it should be despawned.
    ClientBooted {
        conn_id: ConnectionId,
        reason: ConnectStatus,
    },

    /// An admitted client's connection went away.
    ClientDisconnected {
        conn_id: ConnectionId,
        client_guid: ClientGuid,
    },

    /// An admitted connection reported a new scene.
    SceneChanged {
        conn_id: ConnectionId,
        scene: SceneIndex,
    },

    /// The server stopped. Every connection has been closed.
    ServerStopped,
}

/// Commands sent to the server actor.
///
/// Variants with a `reply` are request/response: the caller waits on the
/// `oneshot` for the answer.
pub(crate) enum ServerCommand {
    /// Phase one of approval: decide and answer admit/refuse.
    Approve {
        conn_id: ConnectionId,
        data: Vec<u8>,
        outbound: OutboundSender,
        reply: oneshot::Sender<bool>,
    },

    /// A connection reported a scene (or the host loaded one).
    SceneChanged {
        conn_id: ConnectionId,
        scene: SceneIndex,
    },

    /// A connection's handler exited.
    ConnectionLost { conn_id: ConnectionId },

    /// A deferred disconnect is due.
    BootClient {
        conn_id: ConnectionId,
        reason: ConnectStatus,
    },

    /// The host loaded a new gameplay scene.
    SetServerScene { scene: SceneIndex },
    /// The scene the server is currently in.
    ServerScene { reply: oneshot::Sender<SceneIndex> },
    /// Whether every tracked connection reports the server's scene.
    AllInServerScene { reply: oneshot::Sender<bool> },
    /// Whether one connection reports the server's scene.
    IsClientInServerScene {
        conn_id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
    /// The directory record for a connection.
    PlayerData {
        conn_id: ConnectionId,
        reply: oneshot::Sender<Option<PlayerRecord>>,
    },
    /// A connection's display name, or `Player{n}` when unknown.
    PlayerName {
        conn_id: ConnectionId,
        player_num: usize,
        reply: oneshot::Sender<String>,
    },
    /// Number of records in the directory, host included.
    PlayerCount { reply: oneshot::Sender<usize> },

    /// Close everything and exit.
    Stop,
}

// ---------------------------------------------------------------------------
// ServerHandle
// ---------------------------------------------------------------------------

/// Handle to a running server actor.
///
/// Cheap to clone. Every method fails with
/// [`PortalError::ServerUnavailable`] once the server has stopped.
#[derive(Clone)]
pub struct ServerHandle {
    commands: mpsc::UnboundedSender<ServerCommand>,
    events: broadcast::Sender<ServerEvent>,
}

impl ServerHandle {
    fn send(&self, cmd: ServerCommand) -> Result<(), PortalError> {
        self.commands
            .send(cmd)
            .map_err(|_| PortalError::ServerUnavailable)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ServerCommand,
    ) -> Result<T, PortalError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make(reply_tx))?;
        reply_rx.await.map_err(|_| PortalError::ServerUnavailable)
    }

    /// Subscribes to [`ServerEvent`]s from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// `true` until the actor has exited.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Runs approval for a new connection. `true` admits it at the
    /// transport level; the real status has already been queued on
    /// `outbound` by then.
    pub(crate) async fn approve(
        &self,
        conn_id: ConnectionId,
        data: Vec<u8>,
        outbound: OutboundSender,
    ) -> Result<bool, PortalError> {
        self.request(|reply| ServerCommand::Approve {
            conn_id,
            data,
            outbound,
            reply,
        })
        .await
    }

    pub(crate) fn connection_lost(&self, conn_id: ConnectionId) -> Result<(), PortalError> {
        self.send(ServerCommand::ConnectionLost { conn_id })
    }

    /// Records that `conn_id` is now in `scene`. Used directly for the host's
    /// own player; remote clients arrive here through their handler.
    pub fn scene_changed(&self, conn_id: ConnectionId, scene: SceneIndex) -> Result<(), PortalError> {
        self.send(ServerCommand::SceneChanged { conn_id, scene })
    }

    /// Sets the scene the server itself is in.
    pub fn set_server_scene(&self, scene: SceneIndex) -> Result<(), PortalError> {
        self.send(ServerCommand::SetServerScene { scene })
    }

    pub async fn server_scene(&self) -> Result<SceneIndex, PortalError> {
        self.request(|reply| ServerCommand::ServerScene { reply }).await
    }

    /// `true` if every admitted connection is in the server's scene.
    pub async fn all_in_server_scene(&self) -> Result<bool, PortalError> {
        self.request(|reply| ServerCommand::AllInServerScene { reply })
            .await
    }

    pub async fn is_client_in_server_scene(
        &self,
        conn_id: ConnectionId,
    ) -> Result<bool, PortalError> {
        self.request(|reply| ServerCommand::IsClientInServerScene {
            conn_id,
            reply,
        })
        .await
    }

    pub async fn player_data(
        &self,
        conn_id: ConnectionId,
    ) -> Result<Option<PlayerRecord>, PortalError> {
        self.request(|reply| ServerCommand::PlayerData { conn_id, reply })
            .await
    }

    /// The player's name, or `Player{player_num}` for unknown connections.
    pub async fn player_name(
        &self,
        conn_id: ConnectionId,
        player_num: usize,
    ) -> Result<String, PortalError> {
        self.request(|reply| ServerCommand::PlayerName {
            conn_id,
            player_num,
            reply,
        })
        .await
    }

    /// Admitted players, host included.
    pub async fn player_count(&self) -> Result<usize, PortalError> {
        self.request(|reply| ServerCommand::PlayerCount { reply }).await
    }

    /// Stops the server: every connection is closed and the directory
    /// cleared.
    pub fn stop(&self) -> Result<(), PortalError> {
        self.send(ServerCommand::Stop)
    }

    /// Waits until the actor has exited.
    pub async fn stopped(&self) {
        self.commands.closed().await;
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("running", &self.is_running())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ServerActor
// ---------------------------------------------------------------------------

/// The host's own player, registered directly without approval.
#[derive(Debug, Clone)]
pub(crate) struct HostPlayer {
    pub(crate) player_name: String,
    pub(crate) scene: SceneIndex,
}

struct ServerActor<C: Codec> {
    directory: SessionDirectory,
    codec: Arc<C>,
    /// Outbound queues of every connection that passed phase one,
    /// including ones waiting to be booted.
    outbound: HashMap<ConnectionId, OutboundSender>,
    /// Pending delayed disconnects. Dropping an entry cancels it.
    pending_boots: HashMap<ConnectionId, DeferredTask>,
    server_scene: SceneIndex,
    boot_delay: Duration,
    events: broadcast::Sender<ServerEvent>,
    /// For deferred tasks to send `BootClient` back. Weak so the actor
    /// doesn't keep its own channel open.
    self_tx: mpsc::WeakUnboundedSender<ServerCommand>,
    receiver: mpsc::UnboundedReceiver<ServerCommand>,
    shutdown: watch::Sender<bool>,
}

impl<C: Codec> ServerActor<C> {
    async fn run(mut self) {
        tracing::info!(
            max_players = self.directory.config().max_players,
            "server actor started"
        );

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                ServerCommand::Approve {
                    conn_id,
                    data,
                    outbound,
                    reply,
                } => {
                    let admitted = self.handle_approve(conn_id, &data, outbound);
                    let _ = reply.send(admitted);
                }
                ServerCommand::SceneChanged { conn_id, scene } => {
                    self.handle_scene_changed(conn_id, scene);
                }
                ServerCommand::ConnectionLost { conn_id } if conn_id.is_local() => {
                    tracing::info!("host connection lost");
                    break;
                }
                ServerCommand::ConnectionLost { conn_id } => {
                    self.handle_connection_lost(conn_id);
                }
                ServerCommand::BootClient { conn_id, reason } => {
                    self.handle_boot(conn_id, reason);
                }
                ServerCommand::SetServerScene { scene } => {
                    tracing::debug!(%scene, "server scene set");
                    self.server_scene = scene;
                }
                ServerCommand::ServerScene { reply } => {
                    let _ = reply.send(self.server_scene);
                }
                ServerCommand::AllInServerScene { reply } => {
                    let _ = reply.send(
                        self.directory.presence().all_in_scene(self.server_scene),
                    );
                }
                ServerCommand::IsClientInServerScene { conn_id, reply } => {
                    let _ = reply.send(
                        self.directory
                            .presence()
                            .is_in_scene(conn_id, self.server_scene),
                    );
                }
                ServerCommand::PlayerData { conn_id, reply } => {
                    let record = self.directory.lookup(conn_id).cloned();
                    if record.is_none() {
                        tracing::debug!(%conn_id, "no player data for connection");
                    }
                    let _ = reply.send(record);
                }
                ServerCommand::PlayerName {
                    conn_id,
                    player_num,
                    reply,
                } => {
                    let _ = reply.send(self.directory.player_name(conn_id, player_num));
                }
                ServerCommand::PlayerCount { reply } => {
                    let _ = reply.send(self.directory.len());
                }
                ServerCommand::Stop => {
                    tracing::info!("server stop requested");
                    break;
                }
            }
        }

        self.stop();
        tracing::info!("server actor stopped");
    }

    /// Phase one. Anything that fails the size or decode check is refused
    /// outright and told nothing. Everything else is admitted at the
    /// transport level and sent its real status.
    fn handle_approve(
        &mut self,
        conn_id: ConnectionId,
        data: &[u8],
        outbound: OutboundSender,
    ) -> bool {
        let outcome = match self.directory.admit(self.codec.as_ref(), conn_id, data) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::info!(%conn_id, error = %e, "connection refused");
                return false;
            }
        };

        let status = outcome.status;
        // The receiver is still held by the handler waiting on our reply.
        let _ = outbound.send(Outbound::Message(
            ControlMessage::ServerToClientConnectResult { status },
        ));
        self.outbound.insert(conn_id, outbound);

        if status.is_success() {
            let player_name = self.directory.player_name(conn_id, 0);
            let _ = self.events.send(ServerEvent::ClientAdmitted {
                conn_id,
                client_guid: outcome.client_guid,
                player_name,
            });
            if let Some(old) = outcome.evicted {
                self.boot(old, ConnectStatus::LoggedInAgain);
            }
        } else {
            self.boot(conn_id, status);
        }

        true
    }

    /// Sends the reason now and schedules the close for later.
    fn boot(&mut self, conn_id: ConnectionId, reason: ConnectStatus) {
        let Some(outbound) = self.outbound.get(&conn_id) else {
            tracing::debug!(%conn_id, "boot: connection already gone");
            return;
        };
        let _ = outbound.send(Outbound::Message(
            ControlMessage::ServerToClientSetDisconnectReason { status: reason },
        ));

        let Some(commands) = self.self_tx.upgrade() else {
            return;
        };
        tracing::debug!(%conn_id, %reason, "disconnect scheduled");
        let task = DeferredTask::spawn(self.boot_delay, async move {
            let _ = commands.send(ServerCommand::BootClient { conn_id, reason });
        });
        self.pending_boots.insert(conn_id, task);
    }

    /// The grace delay is over. A connection that already left is a no-op.
    fn handle_boot(&mut self, conn_id: ConnectionId, reason: ConnectStatus) {
        self.pending_boots.remove(&conn_id);

        let Some(outbound) = self.outbound.remove(&conn_id) else {
            tracing::debug!(%conn_id, "late boot for unknown connection");
            return;
        };
        let _ = outbound.send(Outbound::Close);

        tracing::info!(%conn_id, %reason, "client booted");
        let _ = self.events.send(ServerEvent::ClientBooted { conn_id, reason });
    }

    fn handle_scene_changed(&mut self, conn_id: ConnectionId, scene: SceneIndex) {
        if self.directory.set_scene(conn_id, scene) {
            tracing::debug!(%conn_id, %scene, "client scene changed");
            let _ = self.events.send(ServerEvent::SceneChanged { conn_id, scene });
        }
    }

    fn handle_connection_lost(&mut self, conn_id: ConnectionId) {
        self.pending_boots.remove(&conn_id);
        self.outbound.remove(&conn_id);

        let client_guid = self.directory.client_guid(conn_id).cloned();
        self.directory.remove(conn_id);

        if let Some(client_guid) = client_guid {
            let _ = self.events.send(ServerEvent::ClientDisconnected {
                conn_id,
                client_guid,
            });
        }
    }

    fn stop(&mut self) {
        self.pending_boots.clear();
        for (conn_id, outbound) in self.outbound.drain() {
            tracing::debug!(%conn_id, "closing connection");
            let _ = outbound.send(Outbound::Close);
        }
        self.directory.clear();
        let _ = self.shutdown.send(true);
        let _ = self.events.send(ServerEvent::ServerStopped);
    }
}

/// Starts the actor task.
pub(crate) fn spawn_actor<C: Codec>(
    session_config: SessionConfig,
    codec: Arc<C>,
    boot_delay: Duration,
    host: Option<HostPlayer>,
) -> (ServerHandle, watch::Receiver<bool>) {
    let (tx, receiver) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let (shutdown, shutdown_rx) = watch::channel(false);

    let mut directory = SessionDirectory::new(session_config);
    let mut server_scene = SceneIndex::UNKNOWN;
    if let Some(host) = host {
        directory.register_host(ConnectionId::LOCAL, host.player_name, host.scene);
        server_scene = host.scene;
    }

    let actor = ServerActor {
        directory,
        codec,
        outbound: HashMap::new(),
        pending_boots: HashMap::new(),
        server_scene,
        boot_delay,
        events: events.clone(),
        self_tx: tx.downgrade(),
        receiver,
        shutdown,
    };
    tokio::spawn(actor.run());

    (ServerHandle { commands: tx, events }, shutdown_rx)
}

// ---------------------------------------------------------------------------
// PortalServer
// ---------------------------------------------------------------------------

/// Builder for a [`PortalServer`].
///
/// # Example
///
/// ```rust,no_run
/// use netportal::prelude::*;
///
/// # async fn run() -> Result<(), PortalError> {
/// let server = PortalServer::builder()
///     .bind("0.0.0.0:7777")
///     .max_players(4)
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct PortalServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    approval_timeout: Duration,
    boot_delay: Duration,
    host: Option<HostPlayer>,
}

impl PortalServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::from_config(&PortalConfig::default())
    }

    /// Starts from the server-side parts of a [`PortalConfig`].
    pub fn from_config(config: &PortalConfig) -> Self {
        Self {
            bind_addr: "127.0.0.1:7777".to_string(),
            session_config: config.session.clone(),
            approval_timeout: config.server.approval_timeout(),
            boot_delay: config.server.boot_delay(),
            host: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the admission configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Shorthand for the lobby capacity.
    pub fn max_players(mut self, max_players: usize) -> Self {
        self.session_config.max_players = max_players;
        self
    }

    /// How long a new connection has to send its payload.
    pub fn approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    /// Extra delay between a disconnect reason and the close.
    pub fn boot_delay(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }

    /// Registers a local player, making this a host instead of a dedicated
    /// server.
    pub(crate) fn host(mut self, player_name: String, scene: SceneIndex) -> Self {
        self.host = Some(HostPlayer { player_name, scene });
        self
    }

    /// Binds the listener and starts the actor.
    pub async fn build(self) -> Result<PortalServer, PortalError> {
        self.build_with_codec(JsonCodec).await
    }

    /// Like [`build`](Self::build) with a custom wire codec.
    pub async fn build_with_codec<C: Codec>(
        self,
        codec: C,
    ) -> Result<PortalServer<C>, PortalError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let codec = Arc::new(codec);
        let (handle, shutdown) = spawn_actor(
            self.session_config,
            Arc::clone(&codec),
            self.boot_delay,
            self.host,
        );

        Ok(PortalServer {
            transport,
            handle,
            codec,
            approval_timeout: self.approval_timeout,
            shutdown,
        })
    }
}

impl Default for PortalServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound server, ready to accept connections.
///
/// Call [`run()`](Self::run) (or [`spawn()`](Self::spawn)) to start
/// accepting. Use [`handle()`](Self::handle) to query or stop it.
pub struct PortalServer<C: Codec = JsonCodec> {
    transport: WebSocketTransport,
    handle: ServerHandle,
    codec: Arc<C>,
    approval_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl PortalServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> PortalServerBuilder {
        PortalServerBuilder::new()
    }
}

impl<C: Codec> PortalServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle to the server actor.
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Runs the accept loop until the server is stopped.
    ///
    /// Each accepted connection gets its own handler task.
    pub async fn run(mut self) -> Result<(), PortalError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "portal server running");

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let handle = self.handle.clone();
                        let codec = Arc::clone(&self.codec);
                        let approval_timeout = self.approval_timeout;
                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(conn, handle, codec, approval_timeout).await
                            {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("portal server stopped accepting");
        Ok(())
    }

    /// Runs the accept loop on a new task.
    pub fn spawn(self) -> JoinHandle<Result<(), PortalError>> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use netportal_protocol::ConnectionPayload;

    use super::*;

    fn payload(guid: &str, scene: i32) -> Vec<u8> {
        ConnectionPayload {
            client_guid: ClientGuid::from(guid),
            client_scene: SceneIndex(scene),
            player_name: format!("{guid}-name"),
        }
        .to_connection_data(&JsonCodec, 1024)
        .unwrap()
    }

    fn start(max_players: usize, host: bool) -> ServerHandle {
        let host = host.then(|| HostPlayer {
            player_name: "Host".into(),
            scene: SceneIndex(1),
        });
        let config = SessionConfig {
            max_players,
            ..SessionConfig::default()
        };
        spawn_actor(config, Arc::new(JsonCodec), Duration::ZERO, host).0
    }

    async fn approve(
        handle: &ServerHandle,
        id: u64,
        data: Vec<u8>,
    ) -> (bool, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let admitted = handle
            .approve(ConnectionId::new(id), data, tx)
            .await
            .unwrap();
        (admitted, rx)
    }

    fn connect_result(status: ConnectStatus) -> Outbound {
        Outbound::Message(ControlMessage::ServerToClientConnectResult { status })
    }

    fn reason(status: ConnectStatus) -> Outbound {
        Outbound::Message(ControlMessage::ServerToClientSetDisconnectReason { status })
    }

    #[tokio::test]
    async fn test_approve_success_queues_connect_result() {
        let handle = start(8, true);

        let (admitted, mut rx) = approve(&handle, 1, payload("a", 1)).await;

        assert!(admitted);
        assert_eq!(rx.recv().await, Some(connect_result(ConnectStatus::Success)));
        assert_eq!(handle.player_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_approve_oversized_refused_without_messages() {
        let handle = start(8, false);

        let (admitted, mut rx) = approve(&handle, 1, vec![b'x'; 2048]).await;

        assert!(!admitted);
        // The actor dropped our sender, so the queue is closed and empty.
        assert_eq!(rx.recv().await, None);
        assert_eq!(handle.player_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_approve_server_full_sends_reason_then_close() {
        let handle = start(1, true);
        let mut events = handle.subscribe();

        let (admitted, mut rx) = approve(&handle, 1, payload("a", 0)).await;

        assert!(admitted);
        assert_eq!(rx.recv().await, Some(connect_result(ConnectStatus::ServerFull)));
        assert_eq!(rx.recv().await, Some(reason(ConnectStatus::ServerFull)));
        assert_eq!(rx.recv().await, Some(Outbound::Close));
        assert_eq!(
            events.recv().await.unwrap(),
            ServerEvent::ClientBooted {
                conn_id: ConnectionId::new(1),
                reason: ConnectStatus::ServerFull,
            }
        );
        assert_eq!(handle.player_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_approve_duplicate_boots_old_connection() {
        let handle = start(8, false);
        let (_, mut old_rx) = approve(&handle, 5, payload("abc", 0)).await;
        assert_eq!(old_rx.recv().await, Some(connect_result(ConnectStatus::Success)));

        let (admitted, mut new_rx) = approve(&handle, 9, payload("abc", 0)).await;

        assert!(admitted);
        assert_eq!(new_rx.recv().await, Some(connect_result(ConnectStatus::Success)));
        assert_eq!(old_rx.recv().await, Some(reason(ConnectStatus::LoggedInAgain)));
        assert_eq!(old_rx.recv().await, Some(Outbound::Close));

        let record = handle.player_data(ConnectionId::new(9)).await.unwrap();
        assert_eq!(record.unwrap().connection_id, ConnectionId::new(9));
        assert!(handle.player_data(ConnectionId::new(5)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connection_lost_cancels_pending_boot() {
        let config = SessionConfig {
            max_players: 0,
            ..SessionConfig::default()
        };
        let (handle, _) = spawn_actor(
            config,
            Arc::new(JsonCodec),
            Duration::from_secs(3600),
            None,
        );
        let mut events = handle.subscribe();
        let (_, mut rx) = approve(&handle, 1, payload("a", 0)).await;
        assert_eq!(rx.recv().await, Some(connect_result(ConnectStatus::ServerFull)));
        assert_eq!(rx.recv().await, Some(reason(ConnectStatus::ServerFull)));

        handle.connection_lost(ConnectionId::new(1)).unwrap();
        handle.stop().unwrap();

        // Stop would close anything still queued; the lost connection's
        // queue is gone, so no Close reaches it.
        assert_eq!(rx.recv().await, None);
        assert_eq!(events.recv().await.unwrap(), ServerEvent::ServerStopped);
    }

    #[tokio::test]
    async fn test_late_boot_for_unknown_connection_is_noop() {
        let handle = start(8, false);
        let mut events = handle.subscribe();

        handle
            .send(ServerCommand::BootClient {
                conn_id: ConnectionId::new(77),
                reason: ConnectStatus::ServerFull,
            })
            .unwrap();
        handle.stop().unwrap();

        assert_eq!(events.recv().await.unwrap(), ServerEvent::ServerStopped);
    }

    #[tokio::test]
    async fn test_scene_tracking_against_server_scene() {
        let handle = start(8, true);
        let (_, _rx) = approve(&handle, 1, payload("a", 0)).await;
        let client = ConnectionId::new(1);

        assert!(!handle.all_in_server_scene().await.unwrap());
        assert!(!handle.is_client_in_server_scene(client).await.unwrap());

        handle.scene_changed(client, SceneIndex(1)).unwrap();

        assert!(handle.is_client_in_server_scene(client).await.unwrap());
        assert!(handle.all_in_server_scene().await.unwrap());

        handle.set_server_scene(SceneIndex(2)).unwrap();
        handle.scene_changed(ConnectionId::LOCAL, SceneIndex(2)).unwrap();

        assert_eq!(handle.server_scene().await.unwrap(), SceneIndex(2));
        assert!(!handle.all_in_server_scene().await.unwrap());
    }

    #[tokio::test]
    async fn test_scene_change_from_unknown_connection_ignored() {
        let handle = start(8, true);

        handle.scene_changed(ConnectionId::new(42), SceneIndex(3)).unwrap();

        assert!(handle.all_in_server_scene().await.unwrap());
        assert!(!handle
            .is_client_in_server_scene(ConnectionId::new(42))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_connection_lost_removes_player_and_emits_event() {
        let handle = start(8, false);
        let (_, _rx) = approve(&handle, 3, payload("zed", 0)).await;
        let mut events = handle.subscribe();

        handle.connection_lost(ConnectionId::new(3)).unwrap();
        handle.connection_lost(ConnectionId::new(3)).unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            ServerEvent::ClientDisconnected {
                conn_id: ConnectionId::new(3),
                client_guid: ClientGuid::from("zed"),
            }
        );
        assert_eq!(handle.player_count().await.unwrap(), 0);
        assert_eq!(handle.player_name(ConnectionId::new(3), 2).await.unwrap(), "Player2");
    }

    #[tokio::test]
    async fn test_host_connection_lost_stops_server() {
        let handle = start(8, true);
        let (_, mut rx) = approve(&handle, 1, payload("a", 1)).await;
        assert_eq!(rx.recv().await, Some(connect_result(ConnectStatus::Success)));

        handle.connection_lost(ConnectionId::LOCAL).unwrap();
        handle.stopped().await;

        assert_eq!(rx.recv().await, Some(Outbound::Close));
        assert!(!handle.is_running());
        assert!(matches!(
            handle.player_count().await,
            Err(PortalError::ServerUnavailable)
        ));
    }
}
