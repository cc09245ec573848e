//! Scene presence: which scene each connection last reported.

use std::collections::HashMap;

use netportal_protocol::SceneIndex;
use netportal_transport::ConnectionId;

/// Tracks the last scene index reported by every connection.
///
/// Entries appear on admission, on the host's self-registration, or on the
/// first scene-change report, and disappear when the connection is removed
/// from the [`SessionDirectory`](crate::SessionDirectory).
#[derive(Debug, Default, Clone)]
pub struct ScenePresence {
    scenes: HashMap<ConnectionId, SceneIndex>,
}

impl ScenePresence {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `scene` as the connection's current scene (insert or update).
    pub fn set_scene(&mut self, conn_id: ConnectionId, scene: SceneIndex) {
        let previous = self.scenes.insert(conn_id, scene);
        tracing::trace!(%conn_id, %scene, ?previous, "scene updated");
    }

    /// Forgets a connection. Unknown ids are ignored.
    pub fn remove(&mut self, conn_id: ConnectionId) -> Option<SceneIndex> {
        self.scenes.remove(&conn_id)
    }

    /// `true` if every tracked connection is in `target`.
    ///
    /// Vacuously `true` when nothing is tracked.
    pub fn all_in_scene(&self, target: SceneIndex) -> bool {
        self.scenes.values().all(|scene| *scene == target)
    }

    /// `true` if `conn_id` is tracked and its last scene is `target`.
    pub fn is_in_scene(&self, conn_id: ConnectionId, target: SceneIndex) -> bool {
        self.scenes.get(&conn_id) == Some(&target)
    }

    /// The last scene `conn_id` reported, if it's tracked.
    pub fn scene_of(&self, conn_id: ConnectionId) -> Option<SceneIndex> {
        self.scenes.get(&conn_id).copied()
    }

    /// Number of tracked connections.
    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    /// Returns `true` if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// Forgets every connection.
    pub fn clear(&mut self) {
        self.scenes.clear();
    }
}
