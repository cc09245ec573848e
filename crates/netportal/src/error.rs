//! Unified error type for netportal.

use netportal_protocol::ProtocolError;
use netportal_session::SessionError;
use netportal_transport::TransportError;

use crate::config::ConfigError;
use crate::identity::IdentityError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `netportal` crate you deal with this single error type
/// instead of importing errors from each layer. The `#[from]` attribute on
/// each variant generates the `From` impls, so `?` converts layer errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection payload was refused before approval.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The local identity store couldn't be read or written.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The configuration file couldn't be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A socket-level error outside the transport layer (e.g. reading the
    /// bound address).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The server actor has stopped and no longer takes commands.
    #[error("server is not running")]
    ServerUnavailable,

    /// A host or client session is already active on this portal.
    #[error("a session is already running")]
    AlreadyRunning,
}
