//! Error types for the protocol layer.

/// Errors that can occur in the protocol layer.
///
/// When you see a `ProtocolError`, the problem is in turning messages into
/// bytes or back, never in networking or session bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, or a
    /// control message with an unknown `type` tag.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A status code on the wire that doesn't name a [`ConnectStatus`].
    ///
    /// [`ConnectStatus`]: crate::ConnectStatus
    #[error("unknown connect status {0}")]
    UnknownStatus(i32),

    /// An encoded connection payload is larger than the server accepts.
    #[error("connection payload is {size} bytes, limit is {max}")]
    PayloadTooLarge { size: usize, max: usize },
}
