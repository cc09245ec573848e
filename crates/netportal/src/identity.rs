//! Per-install client identity, persisted as a small JSON preferences file.
//!
//! The GUID is created the first time it's asked for and never changes
//! afterwards. The server uses it to recognise the same install logging in
//! twice, so it must survive restarts.

use std::path::{Path, PathBuf};

use netportal_protocol::ClientGuid;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

/// Errors from reading or writing the preferences file.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("identity store is corrupt: {0}")]
    Format(#[from] serde_json::Error),
}

/// What's on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Prefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_guid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    player_name: Option<String>,
}

/// Durable client GUID and display name.
#[derive(Debug)]
pub struct IdentityStore {
    /// `None` for an in-memory store that is never written.
    path: Option<PathBuf>,
    prefs: Prefs,
}

impl IdentityStore {
    /// Opens the store at `path`, or starts an empty one if the file
    /// doesn't exist yet. Nothing is written until a value is created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, IdentityError> {
        let path = path.into();
        let prefs = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Prefs::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path),
            prefs,
        })
    }

    /// A store that lives only as long as this value.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            prefs: Prefs::default(),
        }
    }

    /// Where the store is persisted, if anywhere.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The install's GUID. Generated (UUID v4) and persisted on first call.
    pub fn client_guid(&mut self) -> Result<ClientGuid, IdentityError> {
        if let Some(guid) = &self.prefs.client_guid {
            return Ok(ClientGuid::from(guid.as_str()));
        }

        let guid = uuid::Uuid::new_v4().to_string();
        self.prefs.client_guid = Some(guid.clone());
        self.save()?;
        tracing::info!(client_guid = %guid, "client guid created");
        Ok(ClientGuid::from(guid))
    }

    /// The stored display name. A random one is generated and persisted if
    /// none is stored yet.
    pub fn client_name(&mut self) -> Result<String, IdentityError> {
        if let Some(name) = &self.prefs.player_name {
            return Ok(name.clone());
        }

        let name = random_name();
        self.prefs.player_name = Some(name.clone());
        self.save()?;
        Ok(name)
    }

    /// Stores a new display name. Empty (or all-whitespace) names are
    /// ignored.
    pub fn set_client_name(&mut self, name: &str) -> Result<(), IdentityError> {
        let name = name.trim();
        if name.is_empty() {
            tracing::debug!("ignoring empty player name");
            return Ok(());
        }
        self.prefs.player_name = Some(name.to_owned());
        self.save()
    }

    fn save(&self) -> Result<(), IdentityError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&self.prefs)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

const ADJECTIVES: &[&str] = &[
    "Brave", "Clever", "Fuzzy", "Golden", "Jolly", "Lucky", "Mighty",
    "Nimble", "Quiet", "Rusty", "Swift", "Wily",
];

const NOUNS: &[&str] = &[
    "Badger", "Comet", "Falcon", "Gecko", "Lynx", "Otter", "Panda",
    "Raven", "Squid", "Tiger", "Walrus", "Yak",
];

/// A two-word display name such as `"Nimble Otter"`.
pub fn random_name() -> String {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Brave");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("Badger");
    format!("{adjective} {noun}")
}
