//! Arena registry: owns every arena and knows which player sits where.

use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};

use gauntlet_protocol::{ArenaKey, PlayerId};
use gauntlet_session::{RestoreOutcome, SessionSnapshot};

use crate::variant::panic_message;
use crate::{
    Arena, ArenaConfig, ArenaError, ArenaStatus, EngineConfig, ModeCatalog, ModeEvent, Services,
    TeamId, Variant,
};

/// All arenas in the process, keyed by [`ArenaKey`].
///
/// This is the single owner of arena state. It is not shared: the engine
/// holds it and mutates it from the heartbeat only. A `BTreeMap` keeps the
/// per-heartbeat tick order stable.
///
/// A player can be seated in at most ONE arena at a time (key invariant).
///
/// Snapshots an arena could not replay (the player was offline) are held
/// here, keyed by player, until the player reconnects or joins again.
#[derive(Debug)]
pub struct ArenaRegistry {
    arenas: BTreeMap<ArenaKey, Arena>,
    seats: HashMap<PlayerId, ArenaKey>,
    pending_restores: HashMap<PlayerId, (ArenaKey, SessionSnapshot)>,
    services: Services,
    engine: EngineConfig,
    modes: ModeCatalog,
}

impl ArenaRegistry {
    pub fn new(engine: EngineConfig, services: Services) -> Self {
        Self {
            arenas: BTreeMap::new(),
            seats: HashMap::new(),
            pending_restores: HashMap::new(),
            services,
            engine: engine.validated(),
            modes: ModeCatalog::new(),
        }
    }

    /// Custom modes that catalogue entries can refer to by name.
    pub fn with_modes(mut self, modes: ModeCatalog) -> Self {
        self.modes = modes;
        self
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine
    }

    // -- Structure ----------------------------------------------------------

    /// Creates an arena running the mode its config names.
    ///
    /// # Errors
    /// - [`ArenaError::DuplicateArena`]: the key is taken
    /// - [`ArenaError::InvalidConfig`]: bad config or unknown custom mode
    pub fn create(&mut self, config: ArenaConfig) -> Result<&Arena, ArenaError> {
        let variant = Variant::from_spec(&config.variant, &self.modes)?;
        self.create_with(config, variant)
    }

    /// Creates an arena running the given mode.
    ///
    /// # Errors
    /// Same as [`create`](Self::create).
    pub fn create_with(&mut self, config: ArenaConfig, variant: Variant) -> Result<&Arena, ArenaError> {
        if self.arenas.contains_key(&config.key) {
            return Err(ArenaError::DuplicateArena(config.key));
        }
        let rules = config.rules(&self.engine);
        let arena = Arena::new(config, rules, variant)?;
        let key = arena.key().clone();
        tracing::info!(arena = %key, mode = arena.variant().name(), "arena created");
        Ok(self.arenas.entry(key).or_insert(arena))
    }

    /// Restores everyone seated in the arena, then drops it.
    ///
    /// # Errors
    /// [`ArenaError::UnknownArena`] if no such arena exists.
    pub fn delete(&mut self, key: &ArenaKey) -> Result<ArenaConfig, ArenaError> {
        let mut arena = self
            .arenas
            .remove(key)
            .ok_or_else(|| ArenaError::UnknownArena(key.clone()))?;
        arena.shutdown(&self.services);
        self.hold_unrestored(key, arena.take_unrestored());
        self.seats.retain(|_, k| k != key);
        tracing::info!(arena = %key, "arena deleted");
        Ok(arena.config().clone())
    }

    // -- Player operations --------------------------------------------------

    /// Seats a player in an arena.
    ///
    /// # Errors
    /// - [`ArenaError::AlreadyInGame`]: seated somewhere already
    /// - [`ArenaError::UnknownArena`]: no such arena
    /// - [`ArenaError::SnapshotRestoreFailure`]: a snapshot held from an
    ///   earlier round still can't be replayed; it stays held
    /// - anything [`Arena::join`] returns
    pub fn join(&mut self, key: &ArenaKey, player: PlayerId) -> Result<TeamId, ArenaError> {
        if let Some(current) = self.seats.get(&player) {
            return Err(ArenaError::AlreadyInGame(player, current.clone()));
        }
        if !self.arenas.contains_key(key) {
            return Err(ArenaError::UnknownArena(key.clone()));
        }
        // A held snapshot goes back before a new one is captured.
        self.replay_held(player)?;

        let Some(arena) = self.arenas.get_mut(key) else {
            return Err(ArenaError::UnknownArena(key.clone()));
        };
        let result = arena.join(&self.services, player);
        let unrestored = arena.take_unrestored();
        self.hold_unrestored(key, unrestored);
        let team = result?;
        self.seats.insert(player, key.clone());
        Ok(team)
    }

    /// Unseats a player from whichever arena they're in.
    ///
    /// # Errors
    /// [`ArenaError::NotInGame`] if the player isn't seated anywhere.
    pub fn leave(&mut self, player: PlayerId) -> Result<ArenaKey, ArenaError> {
        let key = self.seat_of(player)?;
        if let Some(arena) = self.arenas.get_mut(&key) {
            arena.leave(&self.services, player)?;
        }
        self.sync_seats(&key);
        Ok(key)
    }

    /// Starts a seated player's grace window.
    ///
    /// # Errors
    /// [`ArenaError::NotInGame`] if the player isn't seated anywhere.
    pub fn disconnect(&mut self, player: PlayerId) -> Result<(), ArenaError> {
        let key = self.seat_of(player)?;
        match self.arenas.get_mut(&key) {
            Some(arena) => arena.disconnect(player),
            None => Err(ArenaError::NotInGame(player)),
        }
    }

    /// Ends a player's grace window.
    ///
    /// A player whose window already ran out has been removed. If their
    /// snapshot couldn't be replayed at the time, it is replayed now;
    /// otherwise the late reconnect is logged and ignored. Their next join
    /// is a fresh one.
    pub fn reconnect(&mut self, player: PlayerId) -> Result<(), ArenaError> {
        let Some(key) = self.seats.get(&player).cloned() else {
            match self.replay_held(player) {
                Ok(true) => {}
                Ok(false) => tracing::warn!(%player, "reconnect after grace window, player was already removed"),
                Err(err) => tracing::warn!(%player, error = %err, "held snapshot still can't be replayed"),
            }
            return Ok(());
        };
        match self.arenas.get_mut(&key) {
            Some(arena) => arena.reconnect(player),
            None => Ok(()),
        }
    }

    /// Delivers a mode event to an arena.
    ///
    /// # Errors
    /// [`ArenaError::UnknownArena`] if no such arena exists.
    pub fn mode_event(&mut self, key: &ArenaKey, event: &ModeEvent) -> Result<(), ArenaError> {
        let arena = self
            .arenas
            .get_mut(key)
            .ok_or_else(|| ArenaError::UnknownArena(key.clone()))?;
        arena.on_mode_event(&self.services, event);
        self.sync_seats(key);
        Ok(())
    }

    // -- Admin operations ---------------------------------------------------

    /// # Errors
    /// [`ArenaError::UnknownArena`], or anything [`Arena::force_start`]
    /// returns.
    pub fn force_start(&mut self, key: &ArenaKey) -> Result<(), ArenaError> {
        let arena = self
            .arenas
            .get_mut(key)
            .ok_or_else(|| ArenaError::UnknownArena(key.clone()))?;
        arena.force_start(&self.services)
    }

    /// # Errors
    /// [`ArenaError::UnknownArena`] if no such arena exists.
    pub fn force_end(&mut self, key: &ArenaKey) -> Result<(), ArenaError> {
        let arena = self
            .arenas
            .get_mut(key)
            .ok_or_else(|| ArenaError::UnknownArena(key.clone()))?;
        arena.force_end(&self.services);
        self.sync_seats(key);
        Ok(())
    }

    // -- Heartbeat ----------------------------------------------------------

    /// Ticks every arena once, in key order.
    ///
    /// A panic inside one arena is caught: that arena is recovered to a
    /// clean WAITING state and the others still tick.
    pub fn tick_all(&mut self, elapsed: u64) {
        let services = &self.services;
        for (key, arena) in self.arenas.iter_mut() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| arena.tick(services, elapsed)));
            if let Err(payload) = result {
                tracing::error!(
                    arena = %key,
                    panic = %panic_message(payload.as_ref()),
                    "arena tick panicked"
                );
                arena.recover(services);
            }
            for player in arena.take_departed() {
                if self.seats.get(&player) == Some(key) {
                    self.seats.remove(&player);
                }
            }
            for snapshot in arena.take_unrestored() {
                self.pending_restores.insert(snapshot.player(), (key.clone(), snapshot));
            }
        }
    }

    /// Restores every seated player in every arena. The arenas stay
    /// registered.
    pub fn shutdown(&mut self) {
        for (key, arena) in self.arenas.iter_mut() {
            arena.shutdown(&self.services);
            arena.take_departed();
            for snapshot in arena.take_unrestored() {
                self.pending_restores.insert(snapshot.player(), (key.clone(), snapshot));
            }
        }
        self.seats.clear();
        tracing::info!(
            arenas = self.arenas.len(),
            unrestored = self.pending_restores.len(),
            "all arenas evacuated"
        );
    }

    // -- Queries ------------------------------------------------------------

    pub fn get(&self, key: &ArenaKey) -> Option<&Arena> {
        self.arenas.get(key)
    }

    pub fn arenas(&self) -> impl Iterator<Item = &Arena> + '_ {
        self.arenas.values()
    }

    pub fn contains(&self, key: &ArenaKey) -> bool {
        self.arenas.contains_key(key)
    }

    /// The arena a player is seated in.
    pub fn arena_of(&self, player: PlayerId) -> Option<&ArenaKey> {
        self.seats.get(&player)
    }

    /// # Errors
    /// [`ArenaError::UnknownArena`] if no such arena exists.
    pub fn status(&self, key: &ArenaKey) -> Result<ArenaStatus, ArenaError> {
        self.arenas
            .get(key)
            .map(Arena::status)
            .ok_or_else(|| ArenaError::UnknownArena(key.clone()))
    }

    pub fn statuses(&self) -> Vec<ArenaStatus> {
        self.arenas.values().map(Arena::status).collect()
    }

    /// Every arena's configuration, for writing the catalogue.
    pub fn configs(&self) -> Vec<ArenaConfig> {
        self.arenas.values().map(|a| a.config().clone()).collect()
    }

    /// Players whose snapshot is held until they come back.
    pub fn pending_restores(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.pending_restores.keys().copied()
    }

    pub fn has_pending_restore(&self, player: PlayerId) -> bool {
        self.pending_restores.contains_key(&player)
    }

    /// Players seated right now, across all arenas.
    pub fn seats(&self) -> impl Iterator<Item = (PlayerId, &ArenaKey)> + '_ {
        self.seats.iter().map(|(p, k)| (*p, k))
    }

    pub fn len(&self) -> usize {
        self.arenas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arenas.is_empty()
    }

    // -- Internals ----------------------------------------------------------

    fn seat_of(&self, player: PlayerId) -> Result<ArenaKey, ArenaError> {
        self.seats
            .get(&player)
            .cloned()
            .ok_or(ArenaError::NotInGame(player))
    }

    /// Drops seats for players the arena removed on its own and takes over
    /// any snapshot it couldn't replay.
    fn sync_seats(&mut self, key: &ArenaKey) {
        let Some(arena) = self.arenas.get_mut(key) else {
            return;
        };
        for player in arena.take_departed() {
            if self.seats.get(&player) == Some(key) {
                self.seats.remove(&player);
            }
        }
        let unrestored = arena.take_unrestored();
        self.hold_unrestored(key, unrestored);
    }

    fn hold_unrestored(&mut self, key: &ArenaKey, snapshots: Vec<SessionSnapshot>) {
        for snapshot in snapshots {
            tracing::info!(arena = %key, player = %snapshot.player(), "holding snapshot until player returns");
            self.pending_restores.insert(snapshot.player(), (key.clone(), snapshot));
        }
    }

    /// Replays the snapshot held for `player`, if there is one. Returns
    /// whether one was replayed.
    fn replay_held(&mut self, player: PlayerId) -> Result<bool, ArenaError> {
        let Some((key, snapshot)) = self.pending_restores.remove(&player) else {
            return Ok(false);
        };
        match snapshot.restore(self.services.host.as_ref(), &self.engine.health) {
            RestoreOutcome::Failed { restore, snapshot, .. } => {
                self.pending_restores.insert(player, (key.clone(), *snapshot));
                Err(ArenaError::SnapshotRestoreFailure { key, source: restore })
            }
            RestoreOutcome::FellBack(err) => {
                tracing::warn!(arena = %key, %player, error = %err, "held snapshot replay failed, player was reset");
                Ok(true)
            }
            RestoreOutcome::Restored => {
                tracing::info!(arena = %key, %player, "held snapshot restored");
                Ok(true)
            }
        }
    }
}
