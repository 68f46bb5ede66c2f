//! Player session handling for Gauntlet.
//!
//! This crate owns everything about a participant that must survive the
//! trip into an arena and back out again:
//!
//! 1. **Live state model** ([`PlayerState`]): inventory, armor, effects,
//!    experience, vitals, position, game mode and flight flags.
//! 2. **Host seam**: the [`PlayerHost`] trait through which the engine
//!    reads and writes a player's live state on the hosting platform.
//! 3. **Snapshots** ([`SessionSnapshot`]): captured atomically at join,
//!    replayed atomically at leave, with a fallback reset if replay fails.
//! 4. **Presence** ([`PresenceTracker`]): the reconnect grace window for
//!    players who drop mid-round, counted in heartbeat ticks.
//!
//! # How it fits in the stack
//!
//! ```text
//! Arena Layer (above)  ← takes/restores snapshots, tracks detached players
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol Layer (below)  ← PlayerId, Location
//! ```

mod error;
mod host;
mod presence;
mod snapshot;
mod state;

pub use error::{HostError, SessionError};
pub use host::{MemoryHost, PlayerHost};
pub use presence::{Presence, PresenceTracker};
pub use snapshot::{RestoreOutcome, SessionSnapshot};
pub use state::{GameMode, HealthBounds, ItemStack, PlayerState, StatusEffect};
