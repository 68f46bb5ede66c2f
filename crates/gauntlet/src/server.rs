//! `GauntletServer` builder and run loop.
//!
//! This is the entry point for hosting the engine. It wires every layer
//! together: statistics store → stats writer, catalogue file → registry,
//! host + collaborators → services, and starts the heartbeat.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gauntlet_arena::{
    ArenaObserver, ArenaWorld, EngineConfig, ModeCatalog, ModePolicy, Services, StatsRecorder,
};
use gauntlet_protocol::{Codec, JsonCodec};
use gauntlet_session::PlayerHost;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::catalog::{JsonCatalog, spawn_catalog_writer};
use crate::stats::{StatsCache, StatsStore, spawn_stats_writer};
use crate::{ArenaDirectory, Engine, EngineHandle, GauntletError};

/// Reads an [`EngineConfig`] from a JSON file. Missing fields take their
/// defaults.
///
/// # Errors
/// I/O failures or malformed JSON.
pub async fn load_engine_config(path: impl AsRef<Path>) -> Result<EngineConfig, GauntletError> {
    let bytes = tokio::fs::read(path.as_ref()).await?;
    let config: EngineConfig = JsonCodec.decode(&bytes)?;
    Ok(config.validated())
}

/// Builder for configuring and starting a Gauntlet server.
///
/// # Example
///
/// ```rust,ignore
/// use gauntlet::prelude::*;
///
/// let server = GauntletServer::builder()
///     .catalog("arenas.json")
///     .observer(Arc::new(Scoreboards::new()))
///     .build(host, Arc::new(MemoryStatsStore::new()))
///     .await?;
/// let handle = server.handle();
/// server.run(async {
///     let _ = tokio::signal::ctrl_c().await;
/// })
/// .await;
/// ```
pub struct GauntletServerBuilder {
    config: EngineConfig,
    catalog: Option<PathBuf>,
    modes: ModeCatalog,
    world: Option<Arc<dyn ArenaWorld>>,
    observer: Option<Arc<dyn ArenaObserver>>,
}

impl GauntletServerBuilder {
    /// Creates a new builder with default settings and no catalogue file.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            catalog: None,
            modes: ModeCatalog::new(),
            world: None,
            observer: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Loads arenas from, and persists changes to, this JSON file.
    pub fn catalog(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog = Some(path.into());
        self
    }

    /// Makes a custom mode available to catalogue entries by name.
    pub fn mode<F, P>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: ModePolicy,
    {
        self.modes.register(name, factory);
        self
    }

    pub fn world(mut self, world: Arc<dyn ArenaWorld>) -> Self {
        self.world = Some(world);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ArenaObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Warms the stats cache, loads the catalogue and spawns the
    /// background writers. The heartbeat starts with [`GauntletServer::run`].
    ///
    /// # Errors
    /// The stats store can't be read, or the catalogue file can't be read
    /// or parsed.
    pub async fn build<S: StatsStore>(
        self,
        host: Arc<dyn PlayerHost>,
        store: Arc<S>,
    ) -> Result<GauntletServer, GauntletError> {
        let stats = StatsCache::new();
        let cached = store.cache_all(&stats).await?;
        info!(profiles = cached, "stats cache warmed");

        let (recorder, outbox) = StatsRecorder::channel();
        let mut tasks = vec![spawn_stats_writer(store, stats.clone(), outbox)];

        let mut services = Services::new(host).with_stats(recorder);
        if let Some(world) = self.world {
            services = services.with_world(world);
        }
        if let Some(observer) = self.observer {
            services = services.with_observer(observer);
        }

        let (mut engine, handle) = Engine::new(self.config, services);
        engine = engine.with_modes(self.modes);

        if let Some(path) = self.catalog {
            let catalog = JsonCatalog::new(path);
            let file = catalog.load().await?;
            engine.load_catalog(file);
            let (writer, task) = spawn_catalog_writer(catalog);
            engine = engine.with_catalog(writer);
            tasks.push(task);
        }

        Ok(GauntletServer {
            engine,
            handle,
            stats,
            tasks,
        })
    }
}

impl Default for GauntletServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured server, ready to run.
pub struct GauntletServer {
    engine: Engine,
    handle: EngineHandle,
    stats: StatsCache,
    tasks: Vec<JoinHandle<()>>,
}

impl GauntletServer {
    pub fn builder() -> GauntletServerBuilder {
        GauntletServerBuilder::new()
    }

    /// A handle producers use to queue commands.
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn directory(&self) -> ArenaDirectory {
        self.handle.directory().clone()
    }

    /// Running statistics totals, kept current by the stats writer.
    pub fn stats(&self) -> StatsCache {
        self.stats.clone()
    }

    /// Runs the heartbeat until `shutdown` resolves, restores everyone,
    /// then waits for the background writers to flush.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        info!("gauntlet server running");
        self.engine.run(shutdown).await;

        for task in self.tasks {
            if let Err(err) = task.await {
                error!(error = %err, "background writer failed");
            }
        }
        info!("gauntlet server stopped");
    }
}
