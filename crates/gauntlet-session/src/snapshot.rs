//! Session snapshots: the capture/restore unit for a player's pre-game state.
//!
//! ```text
//! capture() ──→ [held by the arena] ──→ seal() ──→ restore()
//!     │                                               │
//!     ▼                                               ▼
//! live state cleared                       full state replayed
//! for competition                          (or fallback reset)
//! ```
//!
//! `restore` takes the snapshot by value, so each capture can be replayed
//! at most once. When neither the replay nor the fallback reset reaches the
//! player, the snapshot comes back inside [`RestoreOutcome::Failed`] so the
//! caller can hold it until the player is reachable again.

use gauntlet_protocol::PlayerId;
use tracing::{error, warn};

use crate::{HealthBounds, HostError, PlayerHost, PlayerState, SessionError};

/// An immutable capture of a player's state, taken when they joined.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    player: PlayerId,
    state: PlayerState,
    sealed: bool,
}

/// What happened when a snapshot was replayed.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    /// The captured state is back in place.
    Restored,
    /// Replaying failed; the player was reset to full health and a clean
    /// inventory instead.
    FellBack(SessionError),
    /// Both the replay and the fallback reset failed, typically because the
    /// player is offline. The player's state is untouched and the snapshot
    /// is handed back for a later attempt.
    Failed {
        restore: SessionError,
        reset: HostError,
        snapshot: Box<SessionSnapshot>,
    },
}

impl RestoreOutcome {
    /// `true` only when the original state was replayed.
    pub fn is_restored(&self) -> bool {
        matches!(self, Self::Restored)
    }

    /// The snapshot to retry later, if nothing reached the player.
    pub fn into_unrestored(self) -> Option<SessionSnapshot> {
        match self {
            Self::Failed { snapshot, .. } => Some(*snapshot),
            _ => None,
        }
    }

    /// The replay error, if the replay did not succeed.
    pub fn error(&self) -> Option<&SessionError> {
        match self {
            Self::Restored => None,
            Self::FellBack(err) => Some(err),
            Self::Failed { restore, .. } => Some(restore),
        }
    }
}

impl SessionSnapshot {
    /// Captures the player's live state and clears it for competition.
    ///
    /// Atomic from the caller's view: if clearing fails the host still holds
    /// the original state and no snapshot is returned.
    ///
    /// # Errors
    /// [`SessionError::CaptureFailed`] if the host can't read or clear the
    /// player.
    pub fn capture(
        host: &dyn PlayerHost,
        player: PlayerId,
        bounds: &HealthBounds,
    ) -> Result<Self, SessionError> {
        let state = host
            .capture(player)
            .map_err(|source| SessionError::CaptureFailed { player, source })?;

        let blank = PlayerState::competition(state.location.clone(), bounds.max);
        host.apply(player, &blank)
            .map_err(|source| SessionError::CaptureFailed { player, source })?;

        Ok(Self {
            player,
            state,
            sealed: false,
        })
    }

    /// The player this snapshot belongs to.
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// The captured state.
    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    /// Marks the snapshot final. Called when the round goes live; after
    /// that the arena never re-captures this player for the round.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Replays the captured state onto the player.
    ///
    /// Health is clamped into `bounds` first. If the replay fails the
    /// player is reset to `bounds.max` health as a fallback, so nobody is
    /// left in the stripped competition state. Never panics and never
    /// returns early without attempting both steps.
    pub fn restore(self, host: &dyn PlayerHost, bounds: &HealthBounds) -> RestoreOutcome {
        let player = self.player;
        let mut state = self.state.clone();
        state.health = bounds.clamp(state.health);

        let source = match host.apply(player, &state) {
            Ok(()) => return RestoreOutcome::Restored,
            Err(source) => source,
        };
        let restore = SessionError::RestoreFailed { player, source };
        warn!(%player, error = %restore, "snapshot replay failed, resetting player");

        match host.reset(player, bounds.max) {
            Ok(()) => RestoreOutcome::FellBack(restore),
            Err(reset) => {
                error!(%player, error = %reset, "fallback reset failed");
                RestoreOutcome::Failed {
                    restore,
                    reset,
                    snapshot: Box::new(self),
                }
            }
        }
    }
}
