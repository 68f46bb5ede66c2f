//! Error types for the arena layer.

use gauntlet_protocol::{ArenaKey, PlayerId};
use gauntlet_session::SessionError;

use crate::{ArenaStage, VariantError};

/// Errors that can occur during arena operations.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    /// Every seat, or every team slot, is taken.
    #[error("arena {0} is full")]
    ArenaFull(ArenaKey),

    /// The player is already seated in an arena.
    #[error("player {0} already in arena {1}")]
    AlreadyInGame(PlayerId, ArenaKey),

    /// The player is not seated anywhere.
    #[error("player {0} is not in a game")]
    NotInGame(PlayerId),

    /// A forced start was requested without enough players.
    #[error("arena {key} needs {required} players to start, has {current}")]
    BelowMinimumPlayers {
        key: ArenaKey,
        required: usize,
        current: usize,
    },

    /// No arena is registered under this key.
    #[error("arena {0} not found")]
    UnknownArena(ArenaKey),

    /// The arena's stage doesn't allow this operation, e.g. joining a
    /// round that is already running.
    #[error("arena {key} is {stage}, operation not allowed")]
    NotJoinable { key: ArenaKey, stage: ArenaStage },

    /// An arena with this key is already registered.
    #[error("arena {0} already exists")]
    DuplicateArena(ArenaKey),

    /// The arena configuration can never run.
    #[error("invalid arena config: {0}")]
    InvalidConfig(String),

    /// The arena's mode policy failed; the round was ended without a winner.
    #[error("mode policy failed in arena {key}: {source}")]
    VariantFailure {
        key: ArenaKey,
        #[source]
        source: VariantError,
    },

    /// Replaying a player's snapshot failed. The fallback reset was applied.
    #[error("snapshot restore failed in arena {key}: {source}")]
    SnapshotRestoreFailure {
        key: ArenaKey,
        #[source]
        source: SessionError,
    },

    /// Capturing or tracking a player's session failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The engine has shut down and no longer accepts commands.
    #[error("engine is unavailable")]
    Unavailable,
}

/// The category of an [`ArenaError`], for callers that map failures to
/// player-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ArenaFull,
    AlreadyInGame,
    NotInGame,
    BelowMinimumPlayers,
    UnknownArena,
    NotJoinable,
    DuplicateArena,
    InvalidConfig,
    VariantFailure,
    SnapshotRestoreFailure,
    Session,
    Unavailable,
}

impl ArenaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArenaFull(_) => ErrorKind::ArenaFull,
            Self::AlreadyInGame(..) => ErrorKind::AlreadyInGame,
            Self::NotInGame(_) => ErrorKind::NotInGame,
            Self::BelowMinimumPlayers { .. } => ErrorKind::BelowMinimumPlayers,
            Self::UnknownArena(_) => ErrorKind::UnknownArena,
            Self::NotJoinable { .. } => ErrorKind::NotJoinable,
            Self::DuplicateArena(_) => ErrorKind::DuplicateArena,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::VariantFailure { .. } => ErrorKind::VariantFailure,
            Self::SnapshotRestoreFailure { .. } => ErrorKind::SnapshotRestoreFailure,
            Self::Session(_) => ErrorKind::Session,
            Self::Unavailable => ErrorKind::Unavailable,
        }
    }
}
