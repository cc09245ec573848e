//! Wire protocol for netportal.
//!
//! This crate defines what travels between a client and the server while
//! a session is being established and maintained:
//!
//! - **Types** ([`ConnectionPayload`], [`ControlMessage`], [`Envelope`],
//!   [`ConnectStatus`]): the handshake payload and the named control
//!   messages.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those are turned
//!   into bytes and back.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Two-phase approval
//!
//! The transport can only accept or refuse a connection. The real outcome
//! of an approval is carried afterwards by
//! [`ControlMessage::ServerToClientConnectResult`], and a refusal is
//! explained by [`ControlMessage::ServerToClientSetDisconnectReason`]
//! before the server closes the connection.
//!
//! ```text
//! client ── ConnectionPayload ──▶ server   (phase 1: admit / refuse)
//! client ◀── ConnectResult ────── server   (phase 2: real status)
//! client ◀── SetDisconnectReason ─ server  (only when status != Success)
//! client ◀── close ─────────────── server
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientGuid, ConnectStatus, ConnectionPayload, ControlMessage, Envelope,
    SceneIndex,
};

/// Largest connection payload, in bytes, a server will look at.
pub const MAX_CONNECT_PAYLOAD: usize = 1024;
