//! Session types: configuration and the per-player record.

use netportal_transport::ConnectionId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// What to do when a GUID that is already logged in connects again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateLoginPolicy {
    /// Development mode: rename the newcomer's GUID with a suffix and let
    /// both in. Handy for running several clients from one install.
    Permissive,

    /// Admit the newcomer and kick the older session with
    /// `LoggedInAgain`.
    #[default]
    Strict,
}

/// Configuration for admission decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Lobby capacity, counting the host's own record. A connection that
    /// would add a record beyond this is answered with `ServerFull`.
    ///
    /// Default: 8.
    pub max_players: usize,

    /// Duplicate login handling. Default: strict.
    pub duplicate_login: DuplicateLoginPolicy,

    /// Largest connection payload in bytes. Anything bigger is refused at
    /// the transport without a reply.
    ///
    /// Default: 1024.
    pub max_connect_payload: usize,

    /// How many suffixes the permissive policy tries before giving up on
    /// finding a free GUID.
    ///
    /// Default: 16.
    pub max_rename_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_players: 8,
            duplicate_login: DuplicateLoginPolicy::default(),
            max_connect_payload: netportal_protocol::MAX_CONNECT_PAYLOAD,
            max_rename_attempts: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// PlayerRecord
// ---------------------------------------------------------------------------

/// The server's record of an admitted player, keyed by client GUID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    /// Display name from the connection payload.
    pub player_name: String,

    /// The live connection this record belongs to. When the same GUID logs
    /// in again, this moves to the new connection.
    pub connection_id: ConnectionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.max_players, 8);
        assert_eq!(config.duplicate_login, DuplicateLoginPolicy::Strict);
        assert_eq!(config.max_connect_payload, 1024);
        assert_eq!(config.max_rename_attempts, 16);
    }
}
