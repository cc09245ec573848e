//! Server-side session bookkeeping for netportal.
//!
//! This crate answers two questions for the connection coordinator:
//!
//! 1. **Who is connected?**: [`SessionDirectory`] maps a client's durable
//!    GUID to its [`PlayerRecord`] and each live connection back to its
//!    GUID, and decides whether a new connection is admitted (capacity,
//!    duplicate logins).
//! 2. **Where are they?**: [`ScenePresence`] remembers the last scene each
//!    connection reported, so the server can tell when everyone has
//!    reached the scene it expects.
//!
//! # How it fits in the stack
//!
//! ```text
//! Coordinator (above)  ← turns outcomes into messages and disconnects
//!     ↕
//! Session Layer (this crate)  ← directory + presence, no I/O
//!     ↕
//! Protocol Layer (below)  ← ConnectionPayload, ConnectStatus
//! ```
//!
//! Nothing here does I/O or locking. The directory is owned by a single
//! task on the server, which keeps the forward and reverse maps consistent
//! without synchronization.

mod directory;
mod error;
mod presence;
mod session;

pub use directory::{ApprovalOutcome, SessionDirectory, HOST_GUID};
pub use error::SessionError;
pub use presence::ScenePresence;
pub use session::{DuplicateLoginPolicy, PlayerRecord, SessionConfig};
