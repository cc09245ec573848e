//! `GamePortal`: the game's single entry point for hosting, joining and
//! leaving a session.
//!
//! The presentation layer drives the portal (`start_host`, `start_client`,
//! `scene_loaded`, `request_disconnect`) and listens to its
//! [`PortalEvent`]s. The portal plays at most one role at a time: host
//! (server plus local player) or remote client.

use std::net::SocketAddr;
use std::sync::Arc;

use netportal_protocol::{ConnectStatus, ConnectionPayload, JsonCodec, SceneIndex};
use netportal_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::client::{spawn_client, ClientCommand, PortalShared};
use crate::server::PortalServerBuilder;
use crate::{
    ClientState, DisconnectReason, IdentityStore, PortalConfig, PortalError,
    PortalEvent, ServerHandle,
};

enum Role {
    Idle,
    Host {
        server: ServerHandle,
        accept: JoinHandle<Result<(), PortalError>>,
    },
    Client {
        commands: mpsc::UnboundedSender<ClientCommand>,
        driver: JoinHandle<()>,
    },
}

/// Connection lifecycle for one game instance.
///
/// # Example
///
/// ```rust,no_run
/// use netportal::prelude::*;
///
/// # async fn run() -> Result<(), PortalError> {
/// let identity = IdentityStore::open("prefs.json")?;
/// let mut portal = GamePortal::new(PortalConfig::default(), identity);
/// let mut events = portal.subscribe();
///
/// portal.start_client("127.0.0.1", 7777).await?;
/// if let Ok(PortalEvent::ConnectFinished(status)) = events.recv().await {
///     println!("connect result: {status}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct GamePortal {
    config: PortalConfig,
    identity: IdentityStore,
    shared: Arc<PortalShared>,
    role: Role,
}

impl GamePortal {
    /// Creates an idle portal. The game is assumed to start at the main
    /// menu scene.
    pub fn new(config: PortalConfig, identity: IdentityStore) -> Self {
        let shared = Arc::new(PortalShared::new(config.client.main_menu_scene));
        Self {
            config,
            identity,
            shared,
            role: Role::Idle,
        }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.identity
    }

    /// Stores the display name sent with the next connection.
    pub fn set_player_name(&mut self, name: &str) -> Result<(), PortalError> {
        Ok(self.identity.set_client_name(name)?)
    }

    /// Subscribes to [`PortalEvent`]s from now on. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<PortalEvent> {
        self.shared.subscribe()
    }

    /// `true` while hosting or while a client connection is alive.
    pub fn is_running(&self) -> bool {
        match &self.role {
            Role::Idle => false,
            Role::Host { server, .. } => server.is_running(),
            Role::Client { driver, .. } => !driver.is_finished(),
        }
    }

    /// `true` while hosting.
    pub fn is_host(&self) -> bool {
        matches!(&self.role, Role::Host { server, .. } if server.is_running())
    }

    /// The server this portal hosts, if any. Gameplay code uses it for
    /// player data and scene presence.
    pub fn server(&self) -> Option<&ServerHandle> {
        match &self.role {
            Role::Host { server, .. } => Some(server),
            _ => None,
        }
    }

    pub async fn state(&self) -> ClientState {
        self.shared.lock().await.client
    }

    pub async fn active_scene(&self) -> SceneIndex {
        self.shared.lock().await.active_scene
    }

    /// The last disconnect reason, without consuming it.
    pub async fn disconnect_reason(&self) -> DisconnectReason {
        self.shared.lock().await.reason
    }

    pub async fn clear_disconnect_reason(&self) {
        self.shared.lock().await.reason.clear();
    }

    /// Reads the disconnect reason and clears it.
    pub async fn take_disconnect_reason(&self) -> Option<ConnectStatus> {
        self.shared.lock().await.reason.take()
    }

    /// Starts a server on `address:port` with the local player already in
    /// it. Port 0 picks a free port; the bound address is returned.
    ///
    /// # Errors
    /// [`PortalError::AlreadyRunning`] if a session is active, or the bind
    /// error.
    pub async fn start_host(&mut self, address: &str, port: u16) -> Result<SocketAddr, PortalError> {
        if self.is_running() {
            return Err(PortalError::AlreadyRunning);
        }

        let player_name = self.identity.client_name()?;
        let scene = self.shared.lock().await.active_scene;

        let server = PortalServerBuilder::from_config(&self.config)
            .bind(&format!("{address}:{port}"))
            .host(player_name, scene)
            .build()
            .await?;
        let local_addr = server.local_addr()?;
        let handle = server.handle();
        handle.set_server_scene(scene)?;
        let accept = server.spawn();

        {
            let mut state = self.shared.lock().await;
            state.client = ClientState::Connected;
            state.reason.clear();
        }
        self.role = Role::Host {
            server: handle,
            accept,
        };
        tracing::info!(%local_addr, "hosting");
        self.shared.emit(PortalEvent::ConnectFinished(ConnectStatus::Success));

        Ok(local_addr)
    }

    /// Connects to a server at `address:port` and sends the connection
    /// payload. The outcome arrives later as
    /// [`PortalEvent::ConnectFinished`].
    ///
    /// # Errors
    /// [`PortalError::AlreadyRunning`] if a session is active; identity,
    /// payload-size or connect errors otherwise. On error the portal is
    /// left idle.
    pub async fn start_client(&mut self, address: &str, port: u16) -> Result<(), PortalError> {
        if self.is_running() {
            return Err(PortalError::AlreadyRunning);
        }

        let client_scene = self.shared.lock().await.active_scene;
        let payload = ConnectionPayload {
            client_guid: self.identity.client_guid()?,
            client_scene,
            player_name: self.identity.client_name()?,
        };
        let data = payload
            .to_connection_data(&JsonCodec, self.config.session.max_connect_payload)?;

        {
            let mut state = self.shared.lock().await;
            state.client = ClientState::Connecting;
            state.reason.clear();
        }

        let conn = match connect(&format!("{address}:{port}"), &data).await {
            Ok(conn) => conn,
            Err(e) => {
                self.shared.lock().await.client = ClientState::Idle;
                return Err(e);
            }
        };

        let (commands, driver) = spawn_client(
            conn,
            Arc::clone(&self.shared),
            Arc::new(JsonCodec),
            self.config.client.connect_timeout(),
            client_scene,
        );
        self.role = Role::Client { commands, driver };
        Ok(())
    }

    /// The local game finished loading `scene`.
    ///
    /// Hosts update the server's scene and their own presence directly;
    /// clients report it to the server. Reaching the main menu completes a
    /// return to the main menu.
    pub async fn scene_loaded(&mut self, scene: SceneIndex) -> Result<(), PortalError> {
        {
            let mut state = self.shared.lock().await;
            state.active_scene = scene;
            if state.client == ClientState::Reverting && scene == self.shared.main_menu_scene() {
                state.client = ClientState::Idle;
            }
        }

        match &self.role {
            Role::Host { server, .. } if server.is_running() => {
                server.set_server_scene(scene)?;
                server.scene_changed(ConnectionId::LOCAL, scene)?;
            }
            Role::Client { commands, driver } if !driver.is_finished() => {
                let _ = commands.send(ClientCommand::SceneChanged(scene));
            }
            _ => {}
        }
        Ok(())
    }

    /// Leaves the session on purpose.
    ///
    /// A host stops its server, which closes every client. A client
    /// records `UserRequestedDisconnect` and closes its connection; no
    /// return-to-menu event is emitted.
    pub async fn request_disconnect(&mut self) -> Result<(), PortalError> {
        match std::mem::replace(&mut self.role, Role::Idle) {
            Role::Idle => Ok(()),
            Role::Host { server, accept } => {
                // Already stopped is fine.
                let _ = server.stop();
                server.stopped().await;
                self.shared.lock().await.client = ClientState::Idle;
                match accept.await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept loop panicked");
                        Ok(())
                    }
                }
            }
            Role::Client { commands, driver } => {
                let _ = commands.send(ClientCommand::Disconnect);
                if let Err(e) = driver.await {
                    tracing::warn!(error = %e, "client driver panicked");
                }
                Ok(())
            }
        }
    }

    /// Stops whatever role is active. Used on process shutdown.
    pub async fn shutdown(&mut self) -> Result<(), PortalError> {
        if matches!(self.role, Role::Idle) {
            return Ok(());
        }
        tracing::info!("portal shutting down");
        self.request_disconnect().await
    }
}

impl std::fmt::Debug for GamePortal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let role = match &self.role {
            Role::Idle => "idle",
            Role::Host { .. } => "host",
            Role::Client { .. } => "client",
        };
        f.debug_struct("GamePortal").field("role", &role).finish()
    }
}

async fn connect(addr: &str, data: &[u8]) -> Result<WebSocketConnection, PortalError> {
    let conn = WebSocketConnection::connect(addr).await?;
    conn.send(data).await?;
    tracing::debug!(conn_id = %conn.id(), %addr, "connection data sent");
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portal() -> GamePortal {
        GamePortal::new(PortalConfig::default(), IdentityStore::in_memory())
    }

    #[tokio::test]
    async fn test_new_portal_is_idle() {
        let portal = portal();

        assert!(!portal.is_running());
        assert!(portal.server().is_none());
        assert_eq!(portal.state().await, ClientState::Idle);
        assert_eq!(portal.active_scene().await, SceneIndex(0));
    }

    #[tokio::test]
    async fn test_start_host_twice_is_already_running() {
        let mut portal = portal();
        portal.start_host("127.0.0.1", 0).await.unwrap();

        let result = portal.start_host("127.0.0.1", 0).await;

        assert!(matches!(result, Err(PortalError::AlreadyRunning)));
        portal.request_disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_host_registers_local_player() {
        let mut portal = portal();
        portal.set_player_name("Hosty").unwrap();
        let mut events = portal.subscribe();

        portal.start_host("127.0.0.1", 0).await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            PortalEvent::ConnectFinished(ConnectStatus::Success)
        );
        let server = portal.server().unwrap();
        assert_eq!(server.player_count().await.unwrap(), 1);
        assert_eq!(
            server.player_name(ConnectionId::LOCAL, 0).await.unwrap(),
            "Hosty"
        );
        assert!(portal.is_host());
        portal.request_disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_host_scene_loaded_moves_server_scene() {
        let mut portal = portal();
        portal.start_host("127.0.0.1", 0).await.unwrap();

        portal.scene_loaded(SceneIndex(4)).await.unwrap();

        let server = portal.server().unwrap();
        assert_eq!(server.server_scene().await.unwrap(), SceneIndex(4));
        assert!(server
            .is_client_in_server_scene(ConnectionId::LOCAL)
            .await
            .unwrap());
        portal.request_disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_host_request_disconnect_stops_server() {
        let mut portal = portal();
        portal.start_host("127.0.0.1", 0).await.unwrap();
        let server = portal.server().unwrap().clone();

        portal.request_disconnect().await.unwrap();

        assert!(!server.is_running());
        assert!(!portal.is_running());
        assert_eq!(portal.state().await, ClientState::Idle);
    }

    #[tokio::test]
    async fn test_start_client_unreachable_leaves_portal_idle() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let mut portal = portal();

        let result = portal.start_client("127.0.0.1", port).await;

        assert!(matches!(result, Err(PortalError::Transport(_))));
        assert!(!portal.is_running());
        assert_eq!(portal.state().await, ClientState::Idle);
    }

    #[tokio::test]
    async fn test_start_client_oversized_name_is_rejected_locally() {
        let mut portal = portal();
        portal.set_player_name(&"x".repeat(2000)).unwrap();

        let result = portal.start_client("127.0.0.1", 1).await;

        assert!(matches!(result, Err(PortalError::Protocol(_))));
        assert_eq!(portal.state().await, ClientState::Idle);
    }

    #[tokio::test]
    async fn test_reverting_becomes_idle_at_main_menu() {
        let mut portal = portal();
        portal.shared.lock().await.client = ClientState::Reverting;

        portal.scene_loaded(SceneIndex(2)).await.unwrap();
        assert_eq!(portal.state().await, ClientState::Reverting);

        portal.scene_loaded(SceneIndex(0)).await.unwrap();
        assert_eq!(portal.state().await, ClientState::Idle);
    }
}
