//! Statistics persistence.
//!
//! Arenas push [`StatsUpdate`] deltas into an outbox and move on. A writer
//! task owned by the server drains it, folds each delta into the player's
//! running total and hands the total to a [`StatsStore`]. The heartbeat
//! never waits for any of this.
//!
//! ```text
//! Arena ──StatsRecorder──→ outbox ──→ writer task ──→ StatsStore
//!                                          │
//!                                          └──→ StatsCache (read side)
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use gauntlet_arena::{PlayerStats, StatsUpdate};
use gauntlet_protocol::PlayerId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Errors a [`StatsStore`] can report.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// The backing store can't be reached.
    #[error("stats store unavailable: {0}")]
    Unavailable(String),

    /// A stored profile could not be read back.
    #[error("stored profile for player {0} is corrupt")]
    Corrupt(PlayerId),
}

/// Where player profiles live between restarts.
///
/// Implementations own their I/O. The writer task calls them one at a
/// time, so they don't need to order concurrent writes themselves.
pub trait StatsStore: Send + Sync + 'static {
    /// Reads one player's totals. `None` for a player never seen before.
    fn load(
        &self,
        player: PlayerId,
    ) -> impl Future<Output = Result<Option<PlayerStats>, StoreError>> + Send;

    /// Replaces one player's totals.
    fn write(
        &self,
        player: PlayerId,
        stats: PlayerStats,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Replaces several players' totals at once.
    fn write_all(
        &self,
        profiles: HashMap<PlayerId, PlayerStats>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Forgets a player.
    fn delete(&self, player: PlayerId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Loads every stored profile into `cache`. Returns how many were loaded.
    fn cache_all(&self, cache: &StatsCache) -> impl Future<Output = Result<usize, StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// StatsCache
// ---------------------------------------------------------------------------

/// Running totals the writer has seen, readable from any thread.
#[derive(Debug, Clone, Default)]
pub struct StatsCache {
    profiles: Arc<DashMap<PlayerId, PlayerStats>>,
}

impl StatsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, player: PlayerId) -> Option<PlayerStats> {
        self.profiles.get(&player).map(|entry| *entry.value())
    }

    pub fn insert(&self, player: PlayerId, stats: PlayerStats) {
        self.profiles.insert(player, stats);
    }

    pub fn remove(&self, player: PlayerId) -> Option<PlayerStats> {
        self.profiles.remove(&player).map(|(_, stats)| stats)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

// ---------------------------------------------------------------------------
// MemoryStatsStore
// ---------------------------------------------------------------------------

/// A [`StatsStore`] that keeps everything in memory.
///
/// Used by tests and the demo. Writes can be made to fail on demand to
/// exercise the writer's error path.
#[derive(Debug, Default)]
pub struct MemoryStatsStore {
    profiles: DashMap<PlayerId, PlayerStats>,
    failing: AtomicBool,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with profiles.
    pub fn with_profiles(profiles: impl IntoIterator<Item = (PlayerId, PlayerStats)>) -> Self {
        let store = Self::new();
        for (player, stats) in profiles {
            store.profiles.insert(player, stats);
        }
        store
    }

    /// What is stored for a player right now.
    pub fn get(&self, player: PlayerId) -> Option<PlayerStats> {
        self.profiles.get(&player).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// While set, every operation returns [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail".into()));
        }
        Ok(())
    }
}

impl StatsStore for MemoryStatsStore {
    fn load(
        &self,
        player: PlayerId,
    ) -> impl Future<Output = Result<Option<PlayerStats>, StoreError>> + Send {
        let result = self.check().map(|()| self.get(player));
        async move { result }
    }

    fn write(
        &self,
        player: PlayerId,
        stats: PlayerStats,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let result = self.check().map(|()| {
            self.profiles.insert(player, stats);
        });
        async move { result }
    }

    fn write_all(
        &self,
        profiles: HashMap<PlayerId, PlayerStats>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let result = self.check().map(|()| {
            for (player, stats) in profiles {
                self.profiles.insert(player, stats);
            }
        });
        async move { result }
    }

    fn delete(&self, player: PlayerId) -> impl Future<Output = Result<(), StoreError>> + Send {
        let result = self.check().map(|()| {
            self.profiles.remove(&player);
        });
        async move { result }
    }

    fn cache_all(&self, cache: &StatsCache) -> impl Future<Output = Result<usize, StoreError>> + Send {
        let result = self.check().map(|()| {
            for entry in self.profiles.iter() {
                cache.insert(*entry.key(), *entry.value());
            }
            self.profiles.len()
        });
        async move { result }
    }
}

// ---------------------------------------------------------------------------
// Writer task
// ---------------------------------------------------------------------------

/// Spawns the task that drains the statistics outbox into `store`.
///
/// The task ends once every [`StatsRecorder`](gauntlet_arena::StatsRecorder)
/// feeding `rx` has been dropped and the outbox is empty.
pub fn spawn_stats_writer<S: StatsStore>(
    store: Arc<S>,
    cache: StatsCache,
    rx: mpsc::UnboundedReceiver<StatsUpdate>,
) -> JoinHandle<()> {
    let writer = StatsWriter { store, cache, rx };
    tokio::spawn(writer.run())
}

struct StatsWriter<S> {
    store: Arc<S>,
    cache: StatsCache,
    rx: mpsc::UnboundedReceiver<StatsUpdate>,
}

impl<S: StatsStore> StatsWriter<S> {
    async fn run(mut self) {
        debug!("stats writer started");
        while let Some(update) = self.rx.recv().await {
            match update {
                StatsUpdate::Single(player, delta) => {
                    let Some(total) = self.merge(player, delta).await else {
                        continue;
                    };
                    if let Err(err) = self.store.write(player, total).await {
                        warn!(%player, error = %err, "stats write failed");
                    }
                }
                StatsUpdate::Batch(deltas) => {
                    let mut totals = HashMap::with_capacity(deltas.len());
                    for (player, delta) in deltas {
                        if let Some(total) = self.merge(player, delta).await {
                            totals.insert(player, total);
                        }
                    }
                    let count = totals.len();
                    if let Err(err) = self.store.write_all(totals).await {
                        warn!(players = count, error = %err, "stats batch write failed");
                    }
                }
            }
        }
        info!("stats writer stopped");
    }

    /// Adds `delta` to the player's total and returns the new total. `None`
    /// if the current total can't be read; the delta is dropped rather than
    /// written over a profile we never saw.
    async fn merge(&self, player: PlayerId, delta: PlayerStats) -> Option<PlayerStats> {
        let mut total = match self.cache.get(player) {
            Some(cached) => cached,
            None => match self.store.load(player).await {
                Ok(stored) => stored.unwrap_or_default(),
                Err(err) => {
                    warn!(%player, error = %err, "could not load stats, dropping delta");
                    return None;
                }
            },
        };
        total += delta;
        self.cache.insert(player, total);
        Some(total)
    }
}
