//! Error types for the session layer.

use gauntlet_protocol::PlayerId;

/// Errors reported by a [`PlayerHost`](crate::PlayerHost) implementation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
    /// The player is not online on the host.
    #[error("player {0} is offline")]
    Offline(PlayerId),

    /// The host refused or failed the operation.
    #[error("host rejected operation: {0}")]
    Rejected(String),
}

/// Errors that can occur while snapshotting or tracking a player.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// Reading or clearing the player's live state failed at join time.
    /// Nothing was changed on the host.
    #[error("could not capture session for player {player}: {source}")]
    CaptureFailed {
        player: PlayerId,
        #[source]
        source: HostError,
    },

    /// Replaying a snapshot failed. The fallback reset has already run
    /// (or been attempted) by the time a caller sees this.
    #[error("could not restore session for player {player}: {source}")]
    RestoreFailed {
        player: PlayerId,
        #[source]
        source: HostError,
    },

    /// No presence record exists for the player.
    #[error("no session for player {0}")]
    NotFound(PlayerId),

    /// The player is already attached (never disconnected).
    #[error("player {0} is already attached")]
    AlreadyAttached(PlayerId),

    /// The reconnect grace window for the player has elapsed.
    #[error("grace window expired for player {0}")]
    Expired(PlayerId),
}
