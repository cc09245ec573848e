//! A command-line lobby: host a game, join one, or run a dedicated server,
//! and watch the connection lifecycle happen.
//!
//! ```text
//! lobby host   [ADDR] [PORT]
//! lobby join   ADDR PORT [NAME]
//! lobby server [ADDR:PORT] [MAX_PLAYERS]
//! lobby --help
//! ```
//!
//! `NETPORTAL_CONFIG` points at an optional TOML config, `LOBBY_PREFS` at
//! the identity file (default `lobby-prefs.json`). Ctrl-C leaves cleanly.

use clap::{Parser, Subcommand};
use netportal::prelude::*;
use netportal::PortalServerBuilder;
use tokio::sync::broadcast::error::RecvError;

/// Scene indices the demo pretends to load.
const MAIN_MENU: SceneIndex = SceneIndex(0);
const LOBBY: SceneIndex = SceneIndex(1);

/// Host a game, join one, or run a dedicated server.
#[derive(Debug, Parser)]
#[command(name = "lobby", version, about = "netportal connection lifecycle demo")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Host a game with a local player.
    Host {
        /// Address to listen on.
        #[arg(default_value = "0.0.0.0")]
        addr: String,
        /// Port to listen on.
        #[arg(default_value_t = 7777)]
        port: u16,
    },
    /// Join a hosted game.
    Join {
        /// Host address.
        addr: String,
        /// Host port.
        port: u16,
        /// Display name to use instead of the stored one.
        name: Option<String>,
    },
    /// Run a dedicated server without a local player.
    Server {
        /// Socket address to bind.
        #[arg(default_value = "0.0.0.0:7777")]
        bind: String,
        /// Overrides the configured player capacity.
        max_players: Option<usize>,
    },
}

/// The lobby screen's state object. It persists, so re-entering the lobby
/// scene doesn't replace it.
struct LobbyScreen;

impl GameStateBehaviour for LobbyScreen {
    fn active_state(&self) -> GameState {
        GameState::GameMenu
    }

    fn persists(&self) -> bool {
        true
    }

    fn on_destroy(&mut self) {
        tracing::info!("lobby screen closed");
    }
}

fn load_config() -> Result<PortalConfig, PortalError> {
    match std::env::var("NETPORTAL_CONFIG") {
        Ok(path) => Ok(PortalConfig::load(path)?),
        Err(_) => Ok(PortalConfig::default()),
    }
}

async fn host(portal: &mut GamePortal, addr: &str, port: u16) -> Result<(), PortalError> {
    let local = portal.start_host(addr, port).await?;
    println!("hosting on {local}");

    let Some(server) = portal.server().cloned() else {
        return Ok(());
    };
    portal.scene_loaded(LOBBY).await?;
    let mut events = server.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            event = events.recv() => match event {
                Ok(ServerEvent::ClientAdmitted { conn_id, player_name, .. }) => {
                    println!("{player_name} joined ({conn_id})");
                }
                Ok(ServerEvent::ClientBooted { conn_id, reason }) => {
                    println!("{conn_id} booted: {reason}");
                }
                Ok(ServerEvent::ClientDisconnected { conn_id, .. }) => {
                    println!("{conn_id} left");
                }
                Ok(ServerEvent::SceneChanged { .. }) => {
                    if server.all_in_server_scene().await? {
                        println!("everyone is in the lobby ({} players)", server.player_count().await?);
                    }
                }
                Ok(ServerEvent::ServerStopped) | Err(RecvError::Closed) => return Ok(()),
                Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "server events dropped"),
            },
        }
    }
}

async fn join(portal: &mut GamePortal, addr: &str, port: u16) -> Result<(), PortalError> {
    let mut events = portal.subscribe();
    portal.start_client(addr, port).await?;
    println!("connecting to {addr}:{port}");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            event = events.recv() => match event {
                Ok(PortalEvent::ConnectFinished(ConnectStatus::Success)) => {
                    println!("connected");
                    portal.scene_loaded(LOBBY).await?;
                }
                Ok(PortalEvent::ConnectFinished(status)) => {
                    println!("connection refused: {status}");
                }
                Ok(PortalEvent::NetworkTimedOut) => {
                    let reason = portal.take_disconnect_reason().await;
                    println!("connection lost (reason: {reason:?})");
                    return Ok(());
                }
                Ok(PortalEvent::ReturnToMainMenu { reason }) => {
                    println!("disconnected: {reason}");
                    portal.scene_loaded(MAIN_MENU).await?;
                    return Ok(());
                }
                Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "portal events dropped"),
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

async fn dedicated(config: &PortalConfig, bind: &str, max_players: Option<usize>) -> Result<(), PortalError> {
    let mut builder = PortalServerBuilder::from_config(config).bind(bind);
    if let Some(max) = max_players {
        builder = builder.max_players(max);
    }
    let server = builder.build().await?;
    println!("dedicated server on {}", server.local_addr()?);

    let handle = server.handle();
    let accept = server.spawn();
    let _ = tokio::signal::ctrl_c().await;
    handle.stop()?;
    match accept.await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(error = %e, "accept loop panicked");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    netportal::logging::init("netportal=info,lobby=info");

    let command = Cli::parse().command;
    let config = load_config()?;

    if let Command::Server { bind, max_players } = &command {
        dedicated(&config, bind, *max_players).await?;
        return Ok(());
    }

    let prefs = std::env::var("LOBBY_PREFS").unwrap_or_else(|_| "lobby-prefs.json".into());
    let mut portal = GamePortal::new(config, IdentityStore::open(prefs)?);
    let mut lifecycle = GameStateLifecycle::new();
    lifecycle.activate(StateId::next(), Box::new(LobbyScreen));

    match command {
        Command::Host { addr, port } => host(&mut portal, &addr, port).await?,
        Command::Join { addr, port, name } => {
            if let Some(name) = name {
                portal.set_player_name(&name)?;
            }
            join(&mut portal, &addr, port).await?;
        }
        Command::Server { .. } => {}
    }

    lifecycle.shutdown(&mut portal).await?;
    Ok(())
}
