//! The session directory: who is connected, and should this newcomer be let in?
//!
//! The directory keeps two maps that must agree with each other:
//!
//! - **forward**: client GUID → [`PlayerRecord`] (name + live connection)
//! - **reverse**: connection id → client GUID
//!
//! GUIDs are durable across reconnects, connection ids are not. The
//! reverse map is what lets a disconnect (which only knows the connection
//! id) find the player's record.
//!
//! # Concurrency note
//!
//! `SessionDirectory` uses plain `HashMap`s and is owned by the server
//! actor. All mutation goes through that one task, so the two maps never
//! need a lock to stay in step.

use std::collections::HashMap;

use netportal_protocol::{
    ClientGuid, Codec, ConnectStatus, ConnectionPayload, SceneIndex,
};
use netportal_transport::ConnectionId;

use crate::{
    DuplicateLoginPolicy, PlayerRecord, ScenePresence, SessionConfig,
    SessionError,
};

/// GUID the host registers itself under.
pub const HOST_GUID: &str = "host_guid";

/// Suffix the permissive policy appends to a GUID that's already taken.
const RENAME_SUFFIX: &str = "_Secondary";

/// The result of an admission decision.
///
/// Every decoded payload gets an outcome. A non-success status still means
/// the connection is let in at the transport level, so the client can be
/// told why before it's disconnected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalOutcome {
    /// What the client will be told.
    pub status: ConnectStatus,

    /// The GUID the client was admitted under. Differs from the payload's
    /// GUID when the permissive policy had to rename it.
    pub client_guid: ClientGuid,

    /// An older connection with the same GUID that must now be booted
    /// with `LoggedInAgain`.
    pub evicted: Option<ConnectionId>,
}

impl ApprovalOutcome {
    fn rejected(status: ConnectStatus, client_guid: ClientGuid) -> Self {
        Self {
            status,
            client_guid,
            evicted: None,
        }
    }
}

/// Server-side registry of admitted players and their scenes.
///
/// ## Lifecycle
///
/// ```text
/// admit()/approve() ──→ [forward + reverse + presence]
///        │                         │
///        │ same GUID again         │ connection lost
///        ▼                         ▼
///  old conn detached          remove() ──→ gone
///  (booted by caller)
/// ```
#[derive(Debug)]
pub struct SessionDirectory {
    /// Admitted players keyed by GUID.
    players: HashMap<ClientGuid, PlayerRecord>,

    /// Live connection ids back to their GUID. Kept in sync with `players`:
    /// every entry here points at a record whose `connection_id` is the key.
    connections: HashMap<ConnectionId, ClientGuid>,

    presence: ScenePresence,
    config: SessionConfig,
}

impl SessionDirectory {
    /// Creates an empty directory.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            players: HashMap::new(),
            connections: HashMap::new(),
            presence: ScenePresence::new(),
            config,
        }
    }

    /// The admission settings this directory was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Decodes raw connection data and runs [`approve`](Self::approve) on it.
    ///
    /// # Errors
    /// - [`SessionError::PayloadTooLarge`] if `data` exceeds
    ///   `max_connect_payload`. The size is checked before decoding.
    /// - [`SessionError::MalformedPayload`] if `data` isn't a payload.
    ///
    /// Either way nothing about the directory changes, and the caller
    /// should drop the connection without sending anything.
    pub fn admit<C: Codec>(
        &mut self,
        codec: &C,
        conn_id: ConnectionId,
        data: &[u8],
    ) -> Result<ApprovalOutcome, SessionError> {
        let max = self.config.max_connect_payload;
        if data.len() > max {
            tracing::warn!(
                %conn_id,
                size = data.len(),
                max,
                "connection payload too large"
            );
            return Err(SessionError::PayloadTooLarge {
                size: data.len(),
                max,
            });
        }

        let payload: ConnectionPayload = codec.decode(data).map_err(|e| {
            tracing::warn!(%conn_id, error = %e, "malformed connection payload");
            SessionError::MalformedPayload(e)
        })?;

        Ok(self.approve(conn_id, payload))
    }

    /// Decides whether a decoded payload is admitted, and records it if so.
    ///
    /// Rules, in order:
    ///
    /// 1. If the GUID is already taken, apply the duplicate-login policy.
    ///    Permissive renames the newcomer; strict keeps the GUID and marks
    ///    the older connection for eviction. A client never displaces the
    ///    host's own record: that case is renamed under either policy.
    /// 2. If admitting would add a record and the lobby already holds
    ///    `max_players`, answer `ServerFull`. A strict re-login replaces a
    ///    record instead of adding one, so it isn't subject to this check.
    /// 3. Otherwise store the record, the reverse entry, and the client's
    ///    reported scene, and answer `Success`.
    ///
    /// On a non-success outcome nothing is stored and `evicted` is `None`.
    pub fn approve(
        &mut self,
        conn_id: ConnectionId,
        payload: ConnectionPayload,
    ) -> ApprovalOutcome {
        let ConnectionPayload {
            client_guid,
            client_scene,
            player_name,
        } = payload;

        let mut guid = client_guid;
        let mut evicted = None;

        if let Some(existing) = self.players.get(&guid) {
            let rename = existing.connection_id.is_local()
                || self.config.duplicate_login == DuplicateLoginPolicy::Permissive;

            if rename {
                match self.free_guid(&guid) {
                    Some(renamed) => {
                        tracing::debug!(
                            %conn_id,
                            from = %guid,
                            to = %renamed,
                            "duplicate GUID renamed"
                        );
                        guid = renamed;
                    }
                    None => {
                        tracing::warn!(
                            %conn_id,
                            client_guid = %guid,
                            "no free GUID after rename attempts"
                        );
                        return ApprovalOutcome::rejected(
                            ConnectStatus::GenericDisconnect,
                            guid,
                        );
                    }
                }
            } else if existing.connection_id != conn_id {
                evicted = Some(existing.connection_id);
            }
        }

        let adds_record = !self.players.contains_key(&guid);
        if adds_record && self.players.len() >= self.config.max_players {
            tracing::info!(
                %conn_id,
                client_guid = %guid,
                max_players = self.config.max_players,
                "lobby full"
            );
            return ApprovalOutcome::rejected(ConnectStatus::ServerFull, guid);
        }

        if let Some(old) = evicted {
            // The old connection stays open until it's booted, but it no
            // longer owns anything in the directory.
            self.connections.remove(&old);
            self.presence.remove(old);
            tracing::info!(
                %conn_id,
                evicted = %old,
                client_guid = %guid,
                "client logged in again"
            );
        }

        self.players.insert(
            guid.clone(),
            PlayerRecord {
                player_name,
                connection_id: conn_id,
            },
        );
        self.connections.insert(conn_id, guid.clone());
        self.presence.set_scene(conn_id, client_scene);

        tracing::info!(%conn_id, client_guid = %guid, "client approved");

        ApprovalOutcome {
            status: ConnectStatus::Success,
            client_guid: guid,
            evicted,
        }
    }

    /// Registers the host's own player under [`HOST_GUID`].
    ///
    /// The host never goes through approval. It always counts towards
    /// capacity and its presence starts at `scene`.
    pub fn register_host(
        &mut self,
        conn_id: ConnectionId,
        player_name: impl Into<String>,
        scene: SceneIndex,
    ) {
        let guid = ClientGuid::from(HOST_GUID);
        if let Some(previous) = self.players.insert(
            guid.clone(),
            PlayerRecord {
                player_name: player_name.into(),
                connection_id: conn_id,
            },
        ) {
            self.connections.remove(&previous.connection_id);
            self.presence.remove(previous.connection_id);
        }
        self.connections.insert(conn_id, guid);
        self.presence.set_scene(conn_id, scene);

        tracing::debug!(%conn_id, "host registered");
    }

    /// Forgets a connection. Returns the removed record, if any.
    ///
    /// The forward record is only deleted when it still belongs to
    /// `conn_id`. A record that has moved to a newer connection is left
    /// alone. Unknown ids are a no-op, so this is safe to call twice.
    pub fn remove(&mut self, conn_id: ConnectionId) -> Option<PlayerRecord> {
        self.presence.remove(conn_id);

        let Some(guid) = self.connections.remove(&conn_id) else {
            tracing::debug!(%conn_id, "remove: connection not in directory");
            return None;
        };

        let owned = self
            .players
            .get(&guid)
            .is_some_and(|record| record.connection_id == conn_id);
        if !owned {
            tracing::debug!(%conn_id, client_guid = %guid, "stale reverse entry");
            return None;
        }

        let record = self.players.remove(&guid);
        tracing::info!(%conn_id, client_guid = %guid, "client removed");
        record
    }

    /// Finds the record for a live connection.
    ///
    /// Returns `None` for unknown connections and for reverse entries whose
    /// record no longer names `conn_id`.
    pub fn lookup(&self, conn_id: ConnectionId) -> Option<&PlayerRecord> {
        let guid = self.connections.get(&conn_id)?;
        self.players
            .get(guid)
            .filter(|record| record.connection_id == conn_id)
    }

    /// The GUID a connection was admitted under.
    pub fn client_guid(&self, conn_id: ConnectionId) -> Option<&ClientGuid> {
        self.lookup(conn_id)?;
        self.connections.get(&conn_id)
    }

    /// The player's name, or `Player{player_num}` if the connection is
    /// unknown.
    pub fn player_name(&self, conn_id: ConnectionId, player_num: usize) -> String {
        match self.lookup(conn_id) {
            Some(record) => record.player_name.clone(),
            None => format!("Player{player_num}"),
        }
    }

    /// Records a scene report for an admitted connection.
    ///
    /// Reports from connections the directory doesn't know are ignored and
    /// `false` is returned.
    pub fn set_scene(&mut self, conn_id: ConnectionId, scene: SceneIndex) -> bool {
        if self.lookup(conn_id).is_none() {
            tracing::debug!(%conn_id, %scene, "scene report from unknown connection");
            return false;
        }
        self.presence.set_scene(conn_id, scene);
        true
    }

    /// Scene presence for every admitted connection.
    pub fn presence(&self) -> &ScenePresence {
        &self.presence
    }

    /// Number of admitted players, host included.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Returns `true` if nobody is admitted.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Forgets everyone. Used when the server stops.
    pub fn clear(&mut self) {
        self.players.clear();
        self.connections.clear();
        self.presence.clear();
    }

    /// Appends [`RENAME_SUFFIX`] until the GUID is free, up to
    /// `max_rename_attempts` times.
    fn free_guid(&self, guid: &ClientGuid) -> Option<ClientGuid> {
        let mut candidate = guid.as_str().to_owned();
        for _ in 0..self.config.max_rename_attempts {
            candidate.push_str(RENAME_SUFFIX);
            let renamed = ClientGuid::from(candidate.as_str());
            if !self.players.contains_key(&renamed) {
                return Some(renamed);
            }
        }
        None
    }
}

impl Default for SessionDirectory {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
