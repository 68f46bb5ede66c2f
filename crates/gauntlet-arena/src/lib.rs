//! Arena layer for Gauntlet.
//!
//! This crate is the engine's core. It owns:
//!
//! 1. **Stage machine** ([`Arena`]): WAITING → COUNTDOWN → ACTIVE → ENDING,
//!    driven one heartbeat at a time.
//! 2. **Team pool** ([`TeamPool`]): rosters, balancing and who is still alive.
//! 3. **Mode policies**: [`ModePolicy`] and the built-in [`Variant`]s.
//! 4. **Registry** ([`ArenaRegistry`]): every arena, plus the one-seat-per-player
//!    index.
//! 5. **Collaborator seams**: [`ArenaWorld`], [`ArenaObserver`] and the
//!    [`StatsRecorder`] outbox.
//!
//! # How it fits in the stack
//!
//! ```text
//! Facade (above)  ← event queue, heartbeat loop, directory, persistence
//!     ↕
//! Arena Layer (this crate)
//!     ↕
//! Session Layer (below)  ← snapshots, presence
//! ```
//!
//! Nothing here spawns tasks or takes locks. Everything is mutated from the
//! heartbeat through `&mut`.

mod arena;
mod config;
mod error;
mod registry;
mod services;
mod team;
pub mod variant;

pub use arena::{Arena, ArenaPlayer, ArenaStatus, TeamStatus};
pub use config::{ArenaConfig, ArenaStage, EngineConfig, RoundRules, VariantSpec};
pub use error::{ArenaError, ErrorKind};
pub use registry::ArenaRegistry;
pub use services::{
    ArenaObserver, ArenaWorld, NoopObserver, PlayerStats, Services, StaticWorld, StatsRecorder,
    StatsUpdate,
};
pub use team::{Team, TeamId, TeamPool};
pub use variant::{
    BlockDecay, LastStanding, ModeCatalog, ModeEvent, ModeFactory, ModePolicy, ProjectileDuel,
    Variant, VariantContext, VariantError,
};
