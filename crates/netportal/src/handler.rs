//! Per-connection handler: approval, then message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive the connection payload (first frame) within the approval
//!      timeout.
//!   2. Ask the server actor to approve it. Refused → close, say nothing.
//!   3. Loop: forward queued control messages to the socket, and pass
//!      scene reports from the client to the actor, until either side
//!      closes.

use std::sync::Arc;
use std::time::Duration;

use netportal_protocol::{Codec, ControlMessage, Envelope};
use netportal_transport::{Connection, ConnectionId, TransportError, WebSocketConnection};
use tokio::sync::mpsc;

use crate::server::{Outbound, ServerHandle};
use crate::PortalError;

/// Drop guard that reports the connection as lost when the handler exits.
///
/// This ensures cleanup happens on every exit path, including errors and
/// panics. The command channel is unbounded, so reporting is synchronous.
struct ConnectionGuard {
    conn_id: ConnectionId,
    server: ServerHandle,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        // Fails only if the server already stopped, which cleans up anyway.
        let _ = self.server.connection_lost(self.conn_id);
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    server: ServerHandle,
    codec: Arc<C>,
    approval_timeout: Duration,
) -> Result<(), PortalError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    // --- Step 1: connection data ---
    let data = match tokio::time::timeout(approval_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            tracing::debug!(%conn_id, "closed before sending connection data");
            return Ok(());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            tracing::info!(%conn_id, "no connection data before approval timeout");
            let _ = conn.close().await;
            return Ok(());
        }
    };

    // --- Step 2: approval ---
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let admitted = match server.approve(conn_id, data, outbound_tx).await {
        Ok(admitted) => admitted,
        Err(e) => {
            let _ = conn.close().await;
            return Err(e);
        }
    };
    if !admitted {
        let _ = conn.close().await;
        return Ok(());
    }

    // From here on the actor knows this connection, so it must hear about
    // the connection going away.
    let _guard = ConnectionGuard {
        conn_id,
        server: server.clone(),
    };

    // --- Step 3: message loop ---
    let mut seq: u64 = 0;

    loop {
        tokio::select! {
            // Drain our own queue first so a reason and its close go out
            // in the order they were queued.
            biased;

            outbound = outbound_rx.recv() => match outbound {
                Some(Outbound::Message(message)) => {
                    seq += 1;
                    tracing::debug!(%conn_id, seq, message = message.name(), "sending");
                    let bytes = codec.encode(&Envelope { seq, message })?;
                    conn.send(&bytes).await?;
                }
                Some(Outbound::Close) | None => {
                    tracing::debug!(%conn_id, "closing connection");
                    let _ = conn.close().await;
                    break;
                }
            },

            incoming = conn.recv() => match incoming {
                Ok(Some(data)) => handle_incoming(&server, codec.as_ref(), conn_id, &data)?,
                Ok(None) => {
                    tracing::info!(%conn_id, "connection closed by client");
                    break;
                }
                Err(TransportError::ConnectionClosed(reason)) => {
                    tracing::info!(%conn_id, %reason, "connection dropped");
                    break;
                }
                Err(e) => {
                    tracing::debug!(%conn_id, error = %e, "recv error");
                    break;
                }
            },
        }
    }

    // _guard drops here → ConnectionLost reaches the actor.
    Ok(())
}

fn handle_incoming<C: Codec>(
    server: &ServerHandle,
    codec: &C,
    conn_id: ConnectionId,
    data: &[u8],
) -> Result<(), PortalError> {
    let envelope: Envelope = match codec.decode(data) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(%conn_id, error = %e, "failed to decode envelope");
            return Ok(());
        }
    };

    match envelope.message {
        ControlMessage::ClientToServerSceneChanged { scene_index } => {
            server.scene_changed(conn_id, scene_index)
        }
        other => {
            tracing::debug!(%conn_id, message = other.name(), "unexpected message from client");
            Ok(())
        }
    }
}
