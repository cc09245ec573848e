//! Portal configuration, loadable from a TOML file.
//!
//! ```toml
//! [session]
//! max_players = 8
//! duplicate_login = "strict"   # or "permissive"
//!
//! [server]
//! approval_timeout_ms = 10000
//! boot_delay_ms = 0
//!
//! [client]
//! connect_timeout_ms = 10000
//! main_menu_scene = 0
//! ```
//!
//! Every field has a default, so an empty file (or no file) is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use netportal_protocol::SceneIndex;
use netportal_session::SessionConfig;
use serde::{Deserialize, Serialize};

/// Errors from loading a [`PortalConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file couldn't be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file isn't valid TOML for this schema.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Everything a [`GamePortal`](crate::GamePortal) or
/// [`PortalServer`](crate::PortalServer) can be tuned with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Admission rules (capacity, duplicate logins, payload cap).
    pub session: SessionConfig,

    /// Server-side timings.
    pub server: ServerSettings,

    /// Client-side timings and the main-menu scene.
    pub client: ClientSettings,
}

/// Server-side timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// How long a new connection has to send its payload.
    pub approval_timeout_ms: u64,

    /// Extra wait between sending a disconnect reason and closing the
    /// connection. The close always waits at least one scheduler tick,
    /// even at 0.
    pub boot_delay_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            approval_timeout_ms: 10_000,
            boot_delay_ms: 0,
        }
    }
}

impl ServerSettings {
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_millis(self.approval_timeout_ms)
    }

    pub fn boot_delay(&self) -> Duration {
        Duration::from_millis(self.boot_delay_ms)
    }
}

/// Client-side timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// How long to wait for the server's connect result before treating
    /// the connection as lost.
    pub connect_timeout_ms: u64,

    /// The scene index of the main menu. A connection lost while the
    /// client is here is reported as a timeout instead of a return to the
    /// main menu.
    pub main_menu_scene: SceneIndex,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            main_menu_scene: SceneIndex(0),
        }
    }
}

impl ClientSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl PortalConfig {
    /// Parses a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }
}
