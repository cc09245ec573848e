//! Game-state lifecycle: at most one live state object at a time.
//!
//! Each scene (main menu, lobby, gameplay, results) installs a state object
//! when it loads. The lifecycle decides whether the newcomer takes the slot
//! or is thrown away, and tears down the previous occupant.
//!
//! ```text
//! activate(new) ──┬─ same id as occupant ─────────────→ AlreadyActive
//!                 ├─ occupant persists, same GameState → Discarded (new destroyed)
//!                 └─ otherwise ─→ occupant destroyed ─→ Installed
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{GamePortal, PortalError};

/// Which kind of screen a state object drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameState {
    MainMenu,
    GameMenu,
    InGame,
    PostGame,
}

/// A scene's state object.
pub trait GameStateBehaviour: Send {
    /// The kind of state this object represents.
    fn active_state(&self) -> GameState;

    /// If `true`, the object survives scene unloads and blocks newcomers
    /// of the same kind.
    fn persists(&self) -> bool {
        false
    }

    /// Called exactly once when the object is torn down.
    fn on_destroy(&mut self) {}
}

/// Identity of a state object, so re-activating the same one is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(u64);

impl StateId {
    /// Allocates a fresh id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// What [`GameStateLifecycle::activate`] did with the newcomer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The newcomer now holds the slot.
    Installed,
    /// The newcomer already held the slot.
    AlreadyActive,
    /// A persisting occupant of the same kind kept the slot; the newcomer
    /// was destroyed.
    Discarded,
}

struct Occupant {
    id: StateId,
    behaviour: Box<dyn GameStateBehaviour>,
}

impl Occupant {
    fn destroy(mut self) {
        tracing::debug!(state = ?self.behaviour.active_state(), "game state destroyed");
        self.behaviour.on_destroy();
    }
}

/// Owner of the single active state slot.
#[derive(Default)]
pub struct GameStateLifecycle {
    active: Option<Occupant>,
}

impl GameStateLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers a state object the slot.
    pub fn activate(
        &mut self,
        id: StateId,
        mut behaviour: Box<dyn GameStateBehaviour>,
    ) -> Activation {
        if let Some(current) = &self.active {
            if current.id == id {
                return Activation::AlreadyActive;
            }
            if current.behaviour.persists()
                && current.behaviour.active_state() == behaviour.active_state()
            {
                tracing::debug!(
                    state = ?behaviour.active_state(),
                    "persisting state already active, discarding newcomer"
                );
                behaviour.on_destroy();
                return Activation::Discarded;
            }
        }

        if let Some(previous) = self.active.take() {
            previous.destroy();
        }

        tracing::debug!(state = ?behaviour.active_state(), "game state installed");
        self.active = Some(Occupant { id, behaviour });
        Activation::Installed
    }

    /// Tears down the occupant if it is `id`. Returns whether it was.
    ///
    /// A state object that was discarded (or already replaced) never
    /// clears the slot of whoever holds it now.
    pub fn deactivate(&mut self, id: StateId) -> bool {
        if self.active.as_ref().is_some_and(|o| o.id == id) {
            if let Some(occupant) = self.active.take() {
                occupant.destroy();
            }
            true
        } else {
            false
        }
    }

    /// Scene unloaded: tears down a non-persisting occupant.
    pub fn scene_unloaded(&mut self) {
        if self.active.as_ref().is_some_and(|o| !o.behaviour.persists()) {
            if let Some(occupant) = self.active.take() {
                occupant.destroy();
            }
        }
    }

    /// The occupant's id and kind.
    pub fn active(&self) -> Option<(StateId, GameState)> {
        self.active
            .as_ref()
            .map(|o| (o.id, o.behaviour.active_state()))
    }

    /// Process shutdown: if a state object is live, stop whatever role the
    /// portal is playing (host, client or server), then tear it down.
    pub async fn shutdown(&mut self, portal: &mut GamePortal) -> Result<(), PortalError> {
        let Some(occupant) = self.active.take() else {
            return Ok(());
        };
        let result = portal.shutdown().await;
        occupant.destroy();
        result
    }
}

impl std::fmt::Debug for GameStateLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameStateLifecycle")
            .field("active", &self.active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use super::*;

    struct Probe {
        state: GameState,
        persists: bool,
        destroyed: Arc<AtomicUsize>,
    }

    impl GameStateBehaviour for Probe {
        fn active_state(&self) -> GameState {
            self.state
        }

        fn persists(&self) -> bool {
            self.persists
        }

        fn on_destroy(&mut self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn probe(state: GameState, persists: bool) -> (Box<Probe>, Arc<AtomicUsize>) {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let probe = Box::new(Probe {
            state,
            persists,
            destroyed: Arc::clone(&destroyed),
        });
        (probe, destroyed)
    }

    #[test]
    fn test_activate_empty_installs() {
        let mut lifecycle = GameStateLifecycle::new();
        let id = StateId::next();
        let (menu, _) = probe(GameState::MainMenu, false);

        assert_eq!(lifecycle.activate(id, menu), Activation::Installed);
        assert_eq!(lifecycle.active(), Some((id, GameState::MainMenu)));
    }

    #[test]
    fn test_activate_same_id_is_noop() {
        let mut lifecycle = GameStateLifecycle::new();
        let id = StateId::next();
        let (first, destroyed) = probe(GameState::InGame, false);
        let (again, _) = probe(GameState::InGame, false);
        lifecycle.activate(id, first);

        assert_eq!(lifecycle.activate(id, again), Activation::AlreadyActive);
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_activate_replaces_and_destroys_incumbent() {
        let mut lifecycle = GameStateLifecycle::new();
        let (menu, menu_destroyed) = probe(GameState::MainMenu, false);
        let (game, _) = probe(GameState::InGame, false);
        lifecycle.activate(StateId::next(), menu);

        let game_id = StateId::next();
        assert_eq!(lifecycle.activate(game_id, game), Activation::Installed);

        assert_eq!(menu_destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.active(), Some((game_id, GameState::InGame)));
    }

    #[test]
    fn test_activate_persisting_same_kind_discards_newcomer() {
        let mut lifecycle = GameStateLifecycle::new();
        let lobby_id = StateId::next();
        let (lobby, lobby_destroyed) = probe(GameState::GameMenu, true);
        let (newcomer, newcomer_destroyed) = probe(GameState::GameMenu, false);
        lifecycle.activate(lobby_id, lobby);

        let newcomer_id = StateId::next();
        assert_eq!(
            lifecycle.activate(newcomer_id, newcomer),
            Activation::Discarded
        );
        assert_eq!(newcomer_destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(lobby_destroyed.load(Ordering::SeqCst), 0);

        // The discarded object's own teardown must not clear the slot.
        assert!(!lifecycle.deactivate(newcomer_id));
        assert_eq!(lifecycle.active(), Some((lobby_id, GameState::GameMenu)));
    }

    #[test]
    fn test_activate_persisting_other_kind_is_replaced() {
        let mut lifecycle = GameStateLifecycle::new();
        let (lobby, lobby_destroyed) = probe(GameState::GameMenu, true);
        let (game, _) = probe(GameState::InGame, false);
        lifecycle.activate(StateId::next(), lobby);

        assert_eq!(
            lifecycle.activate(StateId::next(), game),
            Activation::Installed
        );
        assert_eq!(lobby_destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deactivate_occupant_clears_slot() {
        let mut lifecycle = GameStateLifecycle::new();
        let id = StateId::next();
        let (game, destroyed) = probe(GameState::InGame, true);
        lifecycle.activate(id, game);

        assert!(lifecycle.deactivate(id));
        assert!(lifecycle.active().is_none());
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scene_unloaded_keeps_persisting_occupant() {
        let mut lifecycle = GameStateLifecycle::new();
        let (lobby, destroyed) = probe(GameState::GameMenu, true);
        lifecycle.activate(StateId::next(), lobby);

        lifecycle.scene_unloaded();

        assert!(lifecycle.active().is_some());
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_scene_unloaded_tears_down_transient_occupant() {
        let mut lifecycle = GameStateLifecycle::new();
        let (results, destroyed) = probe(GameState::PostGame, false);
        lifecycle.activate(StateId::next(), results);

        lifecycle.scene_unloaded();

        assert!(lifecycle.active().is_none());
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_state_ids_are_unique() {
        assert_ne!(StateId::next(), StateId::next());
    }

    #[tokio::test]
    async fn test_shutdown_with_no_occupant_leaves_portal_alone() {
        let mut lifecycle = GameStateLifecycle::new();
        let mut portal = GamePortal::new(
            crate::PortalConfig::default(),
            crate::IdentityStore::in_memory(),
        );

        lifecycle.shutdown(&mut portal).await.unwrap();

        assert!(!portal.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_stops_host_and_destroys_occupant() {
        let mut lifecycle = GameStateLifecycle::new();
        let mut portal = GamePortal::new(
            crate::PortalConfig::default(),
            crate::IdentityStore::in_memory(),
        );
        portal.start_host("127.0.0.1", 0).await.unwrap();
        let (game, destroyed) = probe(GameState::InGame, true);
        lifecycle.activate(StateId::next(), game);

        lifecycle.shutdown(&mut portal).await.unwrap();

        assert!(!portal.is_running());
        assert!(lifecycle.active().is_none());
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }
}
