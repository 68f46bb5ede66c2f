//! Shared vocabulary for Gauntlet.
//!
//! Every other crate in the workspace speaks in these types:
//!
//! - **Identity** ([`PlayerId`], [`ArenaKey`]): who and where.
//! - **Geometry** ([`Location`], [`BlockPos`]): points in the host world.
//! - **Arena shape** ([`ArenaKind`], [`TeamColor`]): how players are grouped.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how persisted documents
//!   are converted to/from bytes.
//!
//! This crate has no behavior of its own. It doesn't know about stages,
//! teams or ticks; it only names things.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{ArenaKey, ArenaKind, BlockPos, Location, PlayerId, TeamColor};
