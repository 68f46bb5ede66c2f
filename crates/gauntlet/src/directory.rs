//! Read-side view of the registry for other threads.

use std::sync::Arc;

use dashmap::DashMap;
use gauntlet_arena::{ArenaRegistry, ArenaStatus};
use gauntlet_protocol::{ArenaKey, PlayerId};

/// Lock-free lookups of arena status and player seats.
///
/// Only the heartbeat writes here: after every heartbeat, and right after
/// a structural change or a seat change so a caller that awaited the reply
/// sees its own write. Readers on any thread get values at most one
/// heartbeat old. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ArenaDirectory {
    arenas: Arc<DashMap<ArenaKey, ArenaStatus>>,
    seats: Arc<DashMap<PlayerId, ArenaKey>>,
}

impl ArenaDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, key: &ArenaKey) -> Option<ArenaStatus> {
        self.arenas.get(key).map(|entry| entry.value().clone())
    }

    /// Every arena's status, in key order.
    pub fn statuses(&self) -> Vec<ArenaStatus> {
        let mut all: Vec<_> = self.arenas.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    /// The arena a player is seated in.
    pub fn arena_of(&self, player: PlayerId) -> Option<ArenaKey> {
        self.seats.get(&player).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &ArenaKey) -> bool {
        self.arenas.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.arenas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arenas.is_empty()
    }

    /// Mirrors the registry. Entries are upserted and stale ones removed
    /// one by one, so readers never see an empty directory mid-update.
    pub(crate) fn publish(&self, registry: &ArenaRegistry) {
        self.arenas.retain(|key, _| registry.contains(key));
        for arena in registry.arenas() {
            self.arenas.insert(arena.key().clone(), arena.status());
        }

        self.seats.retain(|player, key| registry.arena_of(*player) == Some(&*key));
        for (player, key) in registry.seats() {
            self.seats.insert(player, key.clone());
        }
    }

    pub(crate) fn seat(&self, player: PlayerId, key: ArenaKey) {
        self.seats.insert(player, key);
    }

    pub(crate) fn unseat(&self, player: PlayerId) {
        self.seats.remove(&player);
    }
}
