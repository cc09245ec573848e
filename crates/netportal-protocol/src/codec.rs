//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The coordinator doesn't care HOW messages are serialized, only that
//! something implements [`Codec`]. [`JsonCodec`] is the default: the
//! handshake payload is JSON text, which keeps it inspectable and matches
//! what existing game clients send.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by the
/// server actor and every connection task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use netportal_protocol::{
///     Codec, ConnectStatus, ControlMessage, Envelope, JsonCodec,
/// };
///
/// let codec = JsonCodec;
///
/// let envelope = Envelope {
///     seq: 1,
///     message: ControlMessage::ServerToClientConnectResult {
///         status: ConnectStatus::Success,
///     },
/// };
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientGuid, ConnectionPayload, SceneIndex};

    #[test]
    fn test_json_codec_decodes_connection_payload_text() {
        // What a client actually puts on the wire as connection data.
        let raw = br#"{"ClientGuid":"abc","ClientScene":2,"PlayerName":"Ada"}"#;

        let payload: ConnectionPayload = JsonCodec.decode(raw).unwrap();

        assert_eq!(payload.client_guid, ClientGuid::from("abc"));
        assert_eq!(payload.client_scene, SceneIndex(2));
        assert_eq!(payload.player_name, "Ada");
    }

    #[test]
    fn test_json_codec_decode_error_is_decode_variant() {
        let result: Result<ConnectionPayload, _> = JsonCodec.decode(b"{");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
