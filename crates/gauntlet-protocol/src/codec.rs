//! Codec trait and implementations for persisted documents.
//!
//! The arena catalogue and any other on-disk document go through a
//! [`Codec`]. The rest of the workspace never calls `serde_json` directly,
//! so a binary format can be swapped in without touching callers.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` so one codec can be shared by the heartbeat and
/// the background writer tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`, pretty-printed so catalogue files
/// stay diffable when operators edit them by hand.
///
/// ```rust
/// use gauntlet_protocol::{Codec, JsonCodec, Location};
///
/// let codec = JsonCodec;
/// let spawn = Location::new("world", 10.5, 64.0, -3.0);
///
/// let bytes = codec.encode(&spawn).unwrap();
/// let decoded: Location = codec.decode(&bytes).unwrap();
/// assert_eq!(spawn, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec_pretty(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ArenaKey, TeamColor};

    #[test]
    fn test_decode_malformed_returns_decode_error() {
        let result: Result<ArenaKey, _> = JsonCodec.decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_is_pretty_printed() {
        let bytes = JsonCodec.encode(&vec![TeamColor::Red, TeamColor::Blue]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains('\n'), "expected multi-line output: {text}");
        assert!(text.contains("\"red\""));
    }
}
