//! # Gauntlet
//!
//! Arena lifecycle engine for minigame servers.
//!
//! Gauntlet runs many independent arenas in one process. Each arena cycles
//! through WAITING → COUNTDOWN → ACTIVE → ENDING, snapshots every player on
//! the way in and restores them on the way out. A single heartbeat owns
//! all arena state; everything else talks to it through a queue.
//!
//! ## Layers
//!
//! | Crate | Role |
//! |---|---|
//! | `gauntlet-protocol` | identifiers, geometry, codecs |
//! | `gauntlet-session` | player snapshots, reconnect grace |
//! | `gauntlet-tick` | fixed-rate heartbeat |
//! | `gauntlet-arena` | stage machine, teams, mode policies, registry |
//! | `gauntlet` (this crate) | event queue, engine loop, persistence |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gauntlet::prelude::*;
//!
//! # async fn demo() -> Result<(), GauntletError> {
//! gauntlet::init_tracing();
//!
//! let host = Arc::new(MemoryHost::new());
//! let server = GauntletServer::builder()
//!     .catalog("arenas.json")
//!     .build(host, Arc::new(MemoryStatsStore::new()))
//!     .await?;
//!
//! let handle = server.handle();
//! tokio::spawn(async move {
//!     let team = handle.join("sky", PlayerId(1)).await;
//!     println!("joined: {team:?}");
//! });
//!
//! server
//!     .run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await;
//! # Ok(())
//! # }
//! ```

mod catalog;
mod command;
mod directory;
mod engine;
mod error;
mod server;
mod stats;

pub use catalog::{CatalogFile, CatalogWriter, JsonCatalog, spawn_catalog_writer};
pub use command::Pending;
pub use directory::ArenaDirectory;
pub use engine::{Engine, EngineHandle};
pub use error::GauntletError;
pub use server::{GauntletServer, GauntletServerBuilder, load_engine_config};
pub use stats::{MemoryStatsStore, StatsCache, StatsStore, StoreError, spawn_stats_writer};

pub use gauntlet_arena as arena;
pub use gauntlet_protocol as protocol;
pub use gauntlet_session as session;
pub use gauntlet_tick as tick;

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber that honours `RUST_LOG` and defaults to
/// `info`. Calling it more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Everything a host integration usually needs.
pub mod prelude {
    pub use crate::{
        ArenaDirectory, CatalogFile, Engine, EngineHandle, GauntletError, GauntletServer,
        JsonCatalog, MemoryStatsStore, Pending, StatsCache, StatsStore,
    };
    pub use gauntlet_arena::{
        ArenaConfig, ArenaError, ArenaObserver, ArenaStage, ArenaStatus, ArenaWorld,
        EngineConfig, ErrorKind, ModeEvent, ModePolicy, PlayerStats, TeamId, TeamPool, Variant,
        VariantContext, VariantError, VariantSpec,
    };
    pub use gauntlet_protocol::{ArenaKey, ArenaKind, BlockPos, Location, PlayerId, TeamColor};
    pub use gauntlet_session::{HealthBounds, MemoryHost, PlayerHost, PlayerState};
    pub use gauntlet_tick::TickConfig;
}
