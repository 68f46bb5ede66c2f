//! Unified error type for Gauntlet.

use gauntlet_arena::ArenaError;
use gauntlet_protocol::ProtocolError;
use gauntlet_session::SessionError;

use crate::StoreError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `gauntlet` facade you deal with this single error type
/// instead of importing errors from each layer. `?` converts layer errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum GauntletError {
    /// A catalogue document could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A snapshot or presence operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// An arena operation was rejected.
    #[error(transparent)]
    Arena(#[from] ArenaError),

    /// The statistics store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Reading or writing the catalogue file failed.
    #[error("catalogue i/o: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_protocol::{ArenaKey, PlayerId};

    #[test]
    fn test_from_arena_error_keeps_message() {
        let err: GauntletError = ArenaError::ArenaFull(ArenaKey::new("sky")).into();
        assert!(matches!(err, GauntletError::Arena(_)));
        assert!(err.to_string().contains("sky"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: GauntletError = ProtocolError::InvalidDocument("empty".into()).into();
        assert!(matches!(err, GauntletError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err: GauntletError = SessionError::NotFound(PlayerId(3)).into();
        assert!(matches!(err, GauntletError::Session(_)));
    }

    #[test]
    fn test_from_io_error() {
        let err: GauntletError = std::io::Error::other("disk gone").into();
        assert!(err.to_string().contains("disk gone"));
    }
}
