//! The seam between the engine and the hosting platform.
//!
//! Gauntlet doesn't know how inventories or health are stored on the host;
//! that belongs to whatever server embeds it. Instead it defines the
//! [`PlayerHost`] trait and calls it whenever a player's live state has to
//! be read, cleared, replaced or moved.
//!
//! All methods are synchronous: the host is in-process and these calls are
//! expected to be cheap. Anything slow (database lookups, network) belongs
//! behind the persistence collaborator instead.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use gauntlet_protocol::{Location, PlayerId};

use crate::{HostError, PlayerState};

/// Reads and writes a player's live state on the hosting platform.
///
/// `Send + Sync + 'static` because one host is shared by every arena and
/// lives as long as the engine.
///
/// # Contract
///
/// [`apply`](Self::apply) must be all-or-nothing: either the full state is
/// in place afterwards or the call returns an error. The engine never
/// patches individual fields.
pub trait PlayerHost: Send + Sync + 'static {
    /// Reads the player's current live state.
    fn capture(&self, player: PlayerId) -> Result<PlayerState, HostError>;

    /// Replaces the player's live state with `state` (clear, then apply).
    fn apply(&self, player: PlayerId, state: &PlayerState) -> Result<(), HostError>;

    /// Last-resort reset: empty inventory, no effects, `health` hit points,
    /// full hunger, survival mode. Used when [`apply`](Self::apply) fails.
    fn reset(&self, player: PlayerId, health: f64) -> Result<(), HostError>;

    /// Moves the player without touching anything else.
    fn teleport(&self, player: PlayerId, to: &Location) -> Result<(), HostError>;
}

// ---------------------------------------------------------------------------
// MemoryHost
// ---------------------------------------------------------------------------

/// A [`PlayerHost`] that keeps every player's state in a map.
///
/// Used by the demo binary and by tests. Individual players can be marked
/// so their next `apply` fails, to exercise the fallback path.
#[derive(Debug, Default)]
pub struct MemoryHost {
    players: Mutex<HashMap<PlayerId, PlayerState>>,
    failing_applies: Mutex<HashSet<PlayerId>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts a player online with the given state.
    pub fn insert(&self, player: PlayerId, state: PlayerState) {
        lock(&self.players).insert(player, state);
    }

    /// Takes a player offline.
    pub fn remove(&self, player: PlayerId) -> Option<PlayerState> {
        lock(&self.players).remove(&player)
    }

    /// Current state of a player, if online.
    pub fn state(&self, player: PlayerId) -> Option<PlayerState> {
        lock(&self.players).get(&player).cloned()
    }

    /// Makes the next `apply` for `player` fail with `HostError::Rejected`.
    pub fn fail_next_apply(&self, player: PlayerId) {
        lock(&self.failing_applies).insert(player);
    }
}

impl PlayerHost for MemoryHost {
    fn capture(&self, player: PlayerId) -> Result<PlayerState, HostError> {
        self.state(player).ok_or(HostError::Offline(player))
    }

    fn apply(&self, player: PlayerId, state: &PlayerState) -> Result<(), HostError> {
        if lock(&self.failing_applies).remove(&player) {
            return Err(HostError::Rejected("injected apply failure".into()));
        }
        let mut players = lock(&self.players);
        let slot = players.get_mut(&player).ok_or(HostError::Offline(player))?;
        *slot = state.clone();
        Ok(())
    }

    fn reset(&self, player: PlayerId, health: f64) -> Result<(), HostError> {
        let mut players = lock(&self.players);
        let slot = players.get_mut(&player).ok_or(HostError::Offline(player))?;
        *slot = PlayerState::competition(slot.location.clone(), health);
        Ok(())
    }

    fn teleport(&self, player: PlayerId, to: &Location) -> Result<(), HostError> {
        let mut players = lock(&self.players);
        let slot = players.get_mut(&player).ok_or(HostError::Offline(player))?;
        slot.location = to.clone();
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
