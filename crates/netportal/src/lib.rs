//! # netportal
//!
//! Connection lifecycle for client/server multiplayer games.
//!
//! netportal sits between a game and its network transport and handles
//! everything about *being connected*: approving or refusing a joining
//! client, telling it why when it's refused or kicked, noticing the same
//! install logging in twice, and tracking which scene every client is in so
//! the server knows when everyone has arrived.
//!
//! ## Layers
//!
//! ```text
//! GamePortal / PortalServer   (this crate: coordinator, identity, lifecycle)
//!         ↕
//! netportal-session           (directory + scene presence)
//!         ↕
//! netportal-protocol          (payload, statuses, control messages)
//!         ↕
//! netportal-transport         (WebSocket connections)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netportal::prelude::*;
//!
//! # async fn run() -> Result<(), PortalError> {
//! let mut portal = GamePortal::new(
//!     PortalConfig::default(),
//!     IdentityStore::open("prefs.json")?,
//! );
//! let addr = portal.start_host("0.0.0.0", 7777).await?;
//! println!("hosting on {addr}");
//!
//! // ...later, once the gameplay scene has loaded:
//! portal.scene_loaded(SceneIndex(1)).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod deferred;
mod error;
mod handler;
mod identity;
mod lifecycle;
pub mod logging;
mod portal;
mod reason;
mod server;

pub use client::{ClientState, PortalEvent};
pub use config::{ClientSettings, ConfigError, PortalConfig, ServerSettings};
pub use deferred::DeferredTask;
pub use error::PortalError;
pub use identity::{random_name, IdentityError, IdentityStore};
pub use lifecycle::{Activation, GameState, GameStateBehaviour, GameStateLifecycle, StateId};
pub use portal::GamePortal;
pub use reason::DisconnectReason;
pub use server::{PortalServer, PortalServerBuilder, ServerEvent, ServerHandle};

pub use netportal_protocol::{ClientGuid, ConnectStatus, ConnectionPayload, SceneIndex};
pub use netportal_session::{DuplicateLoginPolicy, PlayerRecord, SessionConfig};
pub use netportal_transport::ConnectionId;

/// Everything a game needs in one import.
pub mod prelude {
    pub use crate::{
        Activation, ClientGuid, ClientState, ConnectStatus, ConnectionId,
        DisconnectReason, DuplicateLoginPolicy, GamePortal, GameState,
        GameStateBehaviour, GameStateLifecycle, IdentityStore, PlayerRecord,
        PortalConfig, PortalError, PortalEvent, PortalServer, SceneIndex,
        ServerEvent, ServerHandle, SessionConfig, StateId,
    };
}
