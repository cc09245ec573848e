//! Error types for the session layer.

use netportal_protocol::ProtocolError;

/// Why a connection was refused before any session state was created.
///
/// These are the only failures the directory reports. Everything past the
/// payload check (full lobby, duplicate login) is an admission with a
/// non-success [`ConnectStatus`](netportal_protocol::ConnectStatus), and
/// lookups of unknown connections simply come back empty.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The connection data is bigger than the configured cap.
    #[error("connection payload is {size} bytes, limit is {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// The connection data could not be decoded as a payload.
    #[error("malformed connection payload: {0}")]
    MalformedPayload(#[from] ProtocolError),
}
