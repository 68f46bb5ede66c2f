//! Collaborators an arena talks to while it runs.
//!
//! Arenas are driven synchronously from the heartbeat, so nothing here may
//! block it:
//!
//! - [`PlayerHost`] calls are in-process and cheap.
//! - [`ArenaWorld`] and [`ArenaObserver`] are fire-and-forget notifications.
//! - Statistics go through [`StatsRecorder`], an unbounded outbox drained
//!   by a writer task; the arena never waits on persistence.

use std::collections::HashMap;
use std::ops::AddAssign;
use std::sync::Arc;

use gauntlet_protocol::{ArenaKey, BlockPos, Location, PlayerId};
use gauntlet_session::PlayerHost;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{ArenaStage, TeamId};

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// A player's lifetime statistics. Also used as an additive delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerStats {
    pub games_played: u64,
    pub wins: u64,
    pub losses: u64,
    /// Times this player was knocked out.
    pub deaths: u64,
    /// Opponents this player knocked out.
    pub eliminations: u64,
    pub blocks_broken: u64,
    pub projectile_hits: u64,
}

impl PlayerStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn death() -> Self {
        Self { deaths: 1, ..Self::default() }
    }

    pub fn elimination() -> Self {
        Self { eliminations: 1, ..Self::default() }
    }
}

impl AddAssign for PlayerStats {
    fn add_assign(&mut self, rhs: Self) {
        self.games_played += rhs.games_played;
        self.wins += rhs.wins;
        self.losses += rhs.losses;
        self.deaths += rhs.deaths;
        self.eliminations += rhs.eliminations;
        self.blocks_broken += rhs.blocks_broken;
        self.projectile_hits += rhs.projectile_hits;
    }
}

/// A statistics delta queued for persistence.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsUpdate {
    /// One player's delta, e.g. an elimination.
    Single(PlayerId, PlayerStats),
    /// Every participant's delta at the end of a round.
    Batch(HashMap<PlayerId, PlayerStats>),
}

/// Sending half of the statistics outbox.
///
/// Recording never blocks and never fails from the arena's point of view:
/// if the writer is gone the update is dropped with a warning.
#[derive(Debug, Clone, Default)]
pub struct StatsRecorder {
    tx: Option<mpsc::UnboundedSender<StatsUpdate>>,
}

impl StatsRecorder {
    /// Creates a recorder and the receiver its writer task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StatsUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A recorder that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn record(&self, player: PlayerId, delta: PlayerStats) {
        if delta.is_empty() {
            return;
        }
        self.send(StatsUpdate::Single(player, delta));
    }

    pub fn record_all(&self, batch: HashMap<PlayerId, PlayerStats>) {
        if batch.is_empty() {
            return;
        }
        self.send(StatsUpdate::Batch(batch));
    }

    fn send(&self, update: StatsUpdate) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(update).is_err() {
            tracing::warn!("stats writer has stopped, dropping update");
        }
    }
}

// ---------------------------------------------------------------------------
// World and presentation
// ---------------------------------------------------------------------------

/// The arena's physical map on the host.
pub trait ArenaWorld: Send + Sync + 'static {
    /// Removes one block, e.g. a decayed floor tile.
    fn remove_block(&self, arena: &ArenaKey, pos: BlockPos);

    /// Schedules the map to be rebuilt around `anchor`. Must return
    /// immediately; the rebuild finishes on the host's own time.
    fn regenerate(&self, arena: &ArenaKey, anchor: &Location);
}

/// A world that ignores every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticWorld;

impl ArenaWorld for StaticWorld {
    fn remove_block(&self, _arena: &ArenaKey, _pos: BlockPos) {}
    fn regenerate(&self, _arena: &ArenaKey, _anchor: &Location) {}
}

/// One-way notifications for scoreboards, chat and titles.
///
/// Every method defaults to a no-op so presentation layers override only
/// what they display.
pub trait ArenaObserver: Send + Sync + 'static {
    fn stage_changed(&self, _arena: &ArenaKey, _from: ArenaStage, _to: ArenaStage) {}

    /// Whole seconds left on the countdown, sent each time the number
    /// changes.
    fn countdown(&self, _arena: &ArenaKey, _seconds_left: u64) {}

    fn player_joined(&self, _arena: &ArenaKey, _player: PlayerId, _team: TeamId) {}

    fn player_left(&self, _arena: &ArenaKey, _player: PlayerId) {}

    fn player_eliminated(&self, _arena: &ArenaKey, _player: PlayerId, _by: Option<PlayerId>) {}

    fn round_ended(&self, _arena: &ArenaKey, _winner: Option<TeamId>, _winners: &[PlayerId]) {}
}

/// An observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ArenaObserver for NoopObserver {}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Everything an arena needs from the outside world, shared by all arenas.
#[derive(Clone)]
pub struct Services {
    pub host: Arc<dyn PlayerHost>,
    pub world: Arc<dyn ArenaWorld>,
    pub observer: Arc<dyn ArenaObserver>,
    pub stats: StatsRecorder,
}

impl Services {
    /// Services with a no-op world and observer and no statistics.
    pub fn new(host: Arc<dyn PlayerHost>) -> Self {
        Self {
            host,
            world: Arc::new(StaticWorld),
            observer: Arc::new(NoopObserver),
            stats: StatsRecorder::disabled(),
        }
    }

    pub fn with_world(mut self, world: Arc<dyn ArenaWorld>) -> Self {
        self.world = world;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ArenaObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_stats(mut self, stats: StatsRecorder) -> Self {
        self.stats = stats;
        self
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").field("stats", &self.stats).finish_non_exhaustive()
    }
}
