//! The heartbeat loop and its producer-side handle.
//!
//! [`Engine`] owns the [`ArenaRegistry`] outright. Nothing else can reach
//! arena state: producers talk to it through an [`EngineHandle`], which
//! only enqueues [`Command`]s, and read from an [`ArenaDirectory`].
//!
//! # One heartbeat
//!
//! ```text
//! 1. apply the commands queued so far (FIFO), replying to each
//! 2. tick every arena once, in key order
//! 3. publish statuses and seats to the directory
//! ```

use std::future::Future;

use gauntlet_arena::{
    Arena, ArenaConfig, ArenaError, ArenaRegistry, ArenaStatus, EngineConfig, ModeCatalog,
    ModeEvent, Services, TeamId, Variant,
};
use gauntlet_protocol::{ArenaKey, PlayerId};
use gauntlet_tick::TickScheduler;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::catalog::{CatalogFile, CatalogWriter};
use crate::command::{Command, Pending};
use crate::ArenaDirectory;

/// The single owner of all arena state.
pub struct Engine {
    registry: ArenaRegistry,
    queue: mpsc::UnboundedReceiver<Command>,
    tx: mpsc::UnboundedSender<Command>,
    directory: ArenaDirectory,
    catalog: Option<CatalogWriter>,
}

impl Engine {
    /// Creates an engine with no arenas, and the handle producers use to
    /// reach it.
    pub fn new(config: EngineConfig, services: Services) -> (Self, EngineHandle) {
        let (tx, queue) = mpsc::unbounded_channel();
        let directory = ArenaDirectory::new();
        let engine = Self {
            registry: ArenaRegistry::new(config, services),
            queue,
            tx: tx.clone(),
            directory: directory.clone(),
            catalog: None,
        };
        (engine, EngineHandle { tx, directory })
    }

    /// Custom modes that arenas can name in their config.
    pub fn with_modes(mut self, modes: ModeCatalog) -> Self {
        self.registry = self.registry.with_modes(modes);
        self
    }

    /// Persists the catalogue through `writer` on every create and delete.
    pub fn with_catalog(mut self, writer: CatalogWriter) -> Self {
        self.catalog = Some(writer);
        self
    }

    /// Creates every arena in a loaded catalogue. Entries that fail are
    /// logged and skipped. Returns how many were created.
    pub fn load_catalog(&mut self, file: CatalogFile) -> usize {
        let mut created = 0;
        for config in file.arenas {
            let key = config.key.clone();
            match self.registry.create(config) {
                Ok(_) => created += 1,
                Err(err) => warn!(arena = %key, error = %err, "skipping catalogue entry"),
            }
        }
        self.directory.publish(&self.registry);
        info!(arenas = created, "catalogue applied");
        created
    }

    /// Another handle onto this engine's queue.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.tx.clone(),
            directory: self.directory.clone(),
        }
    }

    pub fn directory(&self) -> &ArenaDirectory {
        &self.directory
    }

    pub fn registry(&self) -> &ArenaRegistry {
        &self.registry
    }

    // -- Heartbeat ----------------------------------------------------------

    /// Runs one heartbeat representing `elapsed` ticks of game time.
    ///
    /// Every command queued before this call is applied before any arena
    /// ticks. Commands enqueued while these are dispatched wait for the
    /// next heartbeat.
    pub fn heartbeat(&mut self, elapsed: u64) {
        let queued = self.queue.len();
        let mut applied = 0usize;
        while applied < queued {
            let Ok(command) = self.queue.try_recv() else {
                break;
            };
            self.dispatch(command);
            applied += 1;
        }
        self.registry.tick_all(elapsed);
        self.directory.publish(&self.registry);
        trace!(elapsed, commands = applied, "heartbeat");
    }

    /// Drives heartbeats at the configured rate until `shutdown` resolves,
    /// then restores every seated player.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        let mut scheduler = TickScheduler::new(self.registry.engine_config().tick.clone());
        tokio::pin!(shutdown);
        info!(
            rate_hz = scheduler.tick_rate_hz(),
            arenas = self.registry.len(),
            "engine running"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                info = scheduler.wait_for_tick() => {
                    self.heartbeat(info.elapsed_ticks());
                    scheduler.record_tick_end();
                }
            }
        }

        self.stop();
        info!(ticks = scheduler.tick_count(), "engine stopped");
    }

    /// Refuses further commands, drops the ones still queued (their callers
    /// see [`ArenaError::Unavailable`]) and restores every seated player.
    pub fn stop(&mut self) {
        self.queue.close();
        let mut dropped = 0usize;
        while self.queue.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(commands = dropped, "engine stopping, dropped queued commands");
        }
        self.registry.shutdown();
        self.directory.publish(&self.registry);
    }

    fn dispatch(&mut self, command: Command) {
        trace!(?command, "dispatching");
        match command {
            Command::Join { key, player, reply } => {
                let result = self.registry.join(&key, player);
                if result.is_ok() {
                    self.directory.seat(player, key);
                }
                let _ = reply.send(result);
            }
            Command::Leave { player, reply } => {
                let result = self.registry.leave(player);
                if result.is_ok() {
                    self.directory.unseat(player);
                }
                let _ = reply.send(result);
            }
            Command::Disconnect { player, reply } => {
                let _ = reply.send(self.registry.disconnect(player));
            }
            Command::Reconnect { player, reply } => {
                let _ = reply.send(self.registry.reconnect(player));
            }
            Command::ModeEvent { key, event } => {
                if let Err(err) = self.registry.mode_event(&key, &event) {
                    debug!(arena = %key, error = %err, "mode event dropped");
                }
            }
            Command::CreateArena { config, variant, reply } => {
                let result = match variant {
                    Some(variant) => self.registry.create_with(config, variant),
                    None => self.registry.create(config),
                }
                .map(Arena::status);
                if result.is_ok() {
                    self.structure_changed();
                }
                let _ = reply.send(result);
            }
            Command::DeleteArena { key, reply } => {
                let result = self.registry.delete(&key);
                if result.is_ok() {
                    self.structure_changed();
                }
                let _ = reply.send(result);
            }
            Command::ForceStart { key, reply } => {
                let _ = reply.send(self.registry.force_start(&key));
            }
            Command::ForceEnd { key, reply } => {
                let result = self.registry.force_end(&key);
                let _ = reply.send(result);
            }
        }
    }

    fn structure_changed(&mut self) {
        self.directory.publish(&self.registry);
        if let Some(catalog) = &self.catalog {
            catalog.submit(CatalogFile::new(self.registry.configs()));
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("arenas", &self.registry.len())
            .field("catalog", &self.catalog.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EngineHandle
// ---------------------------------------------------------------------------

/// Producer-side access to the engine. Cheap to clone; safe to use from
/// any thread or task.
///
/// Every method enqueues immediately and never waits. The returned
/// [`Pending`] resolves once the heartbeat has applied the command.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Command>,
    directory: ArenaDirectory,
}

impl EngineHandle {
    /// Seats `player` in arena `key`. Resolves to the team they were
    /// placed on.
    pub fn join(&self, key: impl Into<ArenaKey>, player: PlayerId) -> Pending<TeamId> {
        let key = key.into();
        self.request(|reply| Command::Join { key, player, reply })
    }

    /// Unseats `player`. Resolves to the arena they left.
    pub fn leave(&self, player: PlayerId) -> Pending<ArenaKey> {
        self.request(|reply| Command::Leave { player, reply })
    }

    /// Starts `player`'s reconnect grace window.
    pub fn disconnect(&self, player: PlayerId) -> Pending<()> {
        self.request(|reply| Command::Disconnect { player, reply })
    }

    pub fn reconnect(&self, player: PlayerId) -> Pending<()> {
        self.request(|reply| Command::Reconnect { player, reply })
    }

    /// Delivers a mode event. Fire-and-forget.
    pub fn mode_event(&self, key: impl Into<ArenaKey>, event: ModeEvent) {
        let command = Command::ModeEvent { key: key.into(), event };
        if self.tx.send(command).is_err() {
            debug!("engine stopped, mode event dropped");
        }
    }

    /// Registers a new arena running the mode its config names.
    pub fn create_arena(&self, config: ArenaConfig) -> Pending<ArenaStatus> {
        self.request(|reply| Command::CreateArena { config, variant: None, reply })
    }

    /// Registers a new arena running `variant`, whatever the config names.
    pub fn create_arena_with(&self, config: ArenaConfig, variant: Variant) -> Pending<ArenaStatus> {
        self.request(|reply| Command::CreateArena {
            config,
            variant: Some(variant),
            reply,
        })
    }

    /// Restores everyone in the arena and drops it. Resolves to the
    /// removed config.
    pub fn delete_arena(&self, key: impl Into<ArenaKey>) -> Pending<ArenaConfig> {
        let key = key.into();
        self.request(|reply| Command::DeleteArena { key, reply })
    }

    pub fn force_start(&self, key: impl Into<ArenaKey>) -> Pending<()> {
        let key = key.into();
        self.request(|reply| Command::ForceStart { key, reply })
    }

    pub fn force_end(&self, key: impl Into<ArenaKey>) -> Pending<()> {
        let key = key.into();
        self.request(|reply| Command::ForceEnd { key, reply })
    }

    /// Read-only arena lookups.
    pub fn directory(&self) -> &ArenaDirectory {
        &self.directory
    }

    /// `false` once the engine has stopped.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    fn request<T>(
        &self,
        build: impl FnOnce(tokio::sync::oneshot::Sender<Result<T, ArenaError>>) -> Command,
    ) -> Pending<T> {
        let (reply, pending) = Pending::channel();
        // A refused send drops the reply sender, so `pending` resolves to
        // `Unavailable`.
        let _ = self.tx.send(build(reply));
        pending
    }
}
