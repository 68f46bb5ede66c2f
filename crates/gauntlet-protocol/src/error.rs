//! Error types for the protocol layer.
//!
//! Each crate in Gauntlet defines its own error enum. A `ProtocolError`
//! always means a document could not be turned into bytes or back, never
//! a gameplay problem.

/// Errors that can occur while encoding or decoding documents.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed input, missing fields, wrong types.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The document parsed but violates a structural rule, e.g. an empty
    /// arena key.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}
