//! Core protocol types: identities, the handshake payload, and the named
//! control messages.
//!
//! Everything here is serialized and sent between client and server, so
//! the serde attributes are part of the wire format. The tests at the
//! bottom pin the exact JSON shapes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Codec, ProtocolError};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Durable per-install client identifier.
///
/// Generated once by the client's identity store and persisted, so it
/// survives restarts and reconnects. Unlike a connection id, the server
/// uses it to recognise the *same* client logging in twice.
///
/// `#[serde(transparent)]` serializes it as a plain string.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClientGuid(pub String);

impl ClientGuid {
    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientGuid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ClientGuid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Build index of a scene (menu, lobby, gameplay level...).
///
/// `-1` ([`SceneIndex::UNKNOWN`]) means the client didn't report one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SceneIndex(pub i32);

impl SceneIndex {
    /// No scene reported.
    pub const UNKNOWN: SceneIndex = SceneIndex(-1);
}

impl Default for SceneIndex {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for SceneIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ConnectStatus
// ---------------------------------------------------------------------------

/// Outcome of a connection attempt, and explanation of a disconnect.
///
/// On the wire this is the `i32` discriminant (declaration order), so the
/// variant order is part of the protocol and must not change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(into = "i32", try_from = "i32")]
pub enum ConnectStatus {
    /// No status known yet.
    #[default]
    Undefined,
    /// The client is connected.
    Success,
    /// The server is already at capacity.
    ServerFull,
    /// The same client logged in again elsewhere; this session is kicked.
    LoggedInAgain,
    /// The user chose to disconnect.
    UserRequestedDisconnect,
    /// Disconnected with no more specific reason.
    GenericDisconnect,
}

impl ConnectStatus {
    /// Returns `true` for [`ConnectStatus::Success`].
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl From<ConnectStatus> for i32 {
    fn from(status: ConnectStatus) -> Self {
        status as i32
    }
}

impl TryFrom<i32> for ConnectStatus {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Undefined,
            1 => Self::Success,
            2 => Self::ServerFull,
            3 => Self::LoggedInAgain,
            4 => Self::UserRequestedDisconnect,
            5 => Self::GenericDisconnect,
            other => return Err(ProtocolError::UnknownStatus(other)),
        })
    }
}

impl fmt::Display for ConnectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Undefined => "Undefined",
            Self::Success => "Success",
            Self::ServerFull => "ServerFull",
            Self::LoggedInAgain => "LoggedInAgain",
            Self::UserRequestedDisconnect => "UserRequestedDisconnect",
            Self::GenericDisconnect => "GenericDisconnect",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// ConnectionPayload
// ---------------------------------------------------------------------------

/// What a client sends as connection data when it opens a connection.
///
/// It's the very first frame on a new connection, and the only one the
/// server reads before deciding whether to admit the client.
///
/// The JSON keys are PascalCase (`ClientGuid`, `ClientScene`,
/// `PlayerName`) and `ClientScene` may be omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectionPayload {
    /// The client's durable install identifier.
    pub client_guid: ClientGuid,

    /// The scene the client is in while connecting.
    #[serde(default)]
    pub client_scene: SceneIndex,

    /// Display name the player picked.
    pub player_name: String,
}

impl ConnectionPayload {
    /// Encodes the payload, refusing to produce more than `max_len` bytes.
    ///
    /// A server drops oversized payloads without a word, so the client
    /// checks before sending rather than waiting for a silent close.
    pub fn to_connection_data<C: Codec>(
        &self,
        codec: &C,
        max_len: usize,
    ) -> Result<Vec<u8>, ProtocolError> {
        let data = codec.encode(self)?;
        if data.len() > max_len {
            return Err(ProtocolError::PayloadTooLarge {
                size: data.len(),
                max: max_len,
            });
        }
        Ok(data)
    }
}

// ---------------------------------------------------------------------------
// ControlMessage / Envelope
// ---------------------------------------------------------------------------

/// Named control messages exchanged once a connection exists.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON:
///   `{ "type": "ServerToClientConnectResult", "status": 1 }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Server → Client: the authoritative result of the approval.
    /// Always the first message a client receives.
    ServerToClientConnectResult { status: ConnectStatus },

    /// Server → Client: why the server is about to close this connection.
    ServerToClientSetDisconnectReason { status: ConnectStatus },

    /// Client → Server: "I just finished loading this scene."
    ClientToServerSceneChanged { scene_index: SceneIndex },
}

impl ControlMessage {
    /// The message's wire name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ServerToClientConnectResult { .. } => {
                "ServerToClientConnectResult"
            }
            Self::ServerToClientSetDisconnectReason { .. } => {
                "ServerToClientSetDisconnectReason"
            }
            Self::ClientToServerSceneChanged { .. } => {
                "ClientToServerSceneChanged"
            }
        }
    }
}

/// The top-level frame for control messages.
///
/// `seq` is a per-sender counter. Frames are already ordered by the
/// transport; the counter makes the ordering visible in logs and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-sender sequence number, starting at 1.
    pub seq: u64,

    /// The control message.
    pub message: ControlMessage,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_client_guid_serializes_as_plain_string() {
        let json = serde_json::to_string(&ClientGuid::from("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }

    #[test]
    fn test_scene_index_default_is_unknown() {
        assert_eq!(SceneIndex::default(), SceneIndex(-1));
        assert_eq!(SceneIndex(3).to_string(), "scene-3");
    }

    // =====================================================================
    // ConnectStatus
    // =====================================================================

    #[test]
    fn test_connect_status_wire_values_follow_declaration_order() {
        let all = [
            ConnectStatus::Undefined,
            ConnectStatus::Success,
            ConnectStatus::ServerFull,
            ConnectStatus::LoggedInAgain,
            ConnectStatus::UserRequestedDisconnect,
            ConnectStatus::GenericDisconnect,
        ];
        for (expected, status) in all.into_iter().enumerate() {
            assert_eq!(i32::from(status), expected as i32);
            assert_eq!(ConnectStatus::try_from(expected as i32).unwrap(), status);
        }
    }

    #[test]
    fn test_connect_status_serializes_as_number() {
        let json = serde_json::to_string(&ConnectStatus::ServerFull).unwrap();
        assert_eq!(json, "2");
    }

    #[test]
    fn test_connect_status_unknown_value_is_rejected() {
        assert!(matches!(
            ConnectStatus::try_from(42),
            Err(ProtocolError::UnknownStatus(42))
        ));
        let result: Result<ConnectStatus, _> = serde_json::from_str("-1");
        assert!(result.is_err());
    }

    #[test]
    fn test_connect_status_default_is_undefined() {
        assert_eq!(ConnectStatus::default(), ConnectStatus::Undefined);
        assert!(!ConnectStatus::default().is_success());
        assert!(ConnectStatus::Success.is_success());
    }

    // =====================================================================
    // ConnectionPayload
    // =====================================================================

    #[test]
    fn test_connection_payload_json_uses_pascal_case_keys() {
        let payload = ConnectionPayload {
            client_guid: ClientGuid::from("abc"),
            client_scene: SceneIndex(1),
            player_name: "Ada".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["ClientGuid"], "abc");
        assert_eq!(json["ClientScene"], 1);
        assert_eq!(json["PlayerName"], "Ada");
    }

    #[test]
    fn test_connection_payload_missing_scene_defaults_to_unknown() {
        let json = r#"{"ClientGuid":"abc","PlayerName":"Ada"}"#;
        let payload: ConnectionPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.client_scene, SceneIndex::UNKNOWN);
    }

    #[test]
    fn test_connection_payload_missing_guid_is_rejected() {
        let json = r#"{"ClientScene":0,"PlayerName":"Ada"}"#;
        let result: Result<ConnectionPayload, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_to_connection_data_enforces_limit() {
        let payload = ConnectionPayload {
            client_guid: ClientGuid::from("abc"),
            client_scene: SceneIndex(0),
            player_name: "x".repeat(2000),
        };

        let result =
            payload.to_connection_data(&crate::JsonCodec, crate::MAX_CONNECT_PAYLOAD);

        assert!(matches!(
            result,
            Err(ProtocolError::PayloadTooLarge { max: 1024, .. })
        ));
    }

    #[test]
    fn test_to_connection_data_small_payload_fits() {
        let payload = ConnectionPayload {
            client_guid: ClientGuid::from("abc"),
            client_scene: SceneIndex(0),
            player_name: "Ada".into(),
        };
        let data = payload
            .to_connection_data(&crate::JsonCodec, crate::MAX_CONNECT_PAYLOAD)
            .unwrap();
        assert!(data.len() <= crate::MAX_CONNECT_PAYLOAD);
    }

    // =====================================================================
    // ControlMessage / Envelope
    // =====================================================================

    #[test]
    fn test_connect_result_json_format() {
        let msg = ControlMessage::ServerToClientConnectResult {
            status: ConnectStatus::Success,
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "ServerToClientConnectResult");
        assert_eq!(json["status"], 1);
    }

    #[test]
    fn test_set_disconnect_reason_json_format() {
        let msg = ControlMessage::ServerToClientSetDisconnectReason {
            status: ConnectStatus::LoggedInAgain,
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "ServerToClientSetDisconnectReason");
        assert_eq!(json["status"], 3);
    }

    #[test]
    fn test_scene_changed_json_format() {
        let msg = ControlMessage::ClientToServerSceneChanged {
            scene_index: SceneIndex(4),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "ClientToServerSceneChanged");
        assert_eq!(json["scene_index"], 4);
        assert_eq!(msg.name(), "ClientToServerSceneChanged");
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = Envelope {
            seq: 7,
            message: ControlMessage::ServerToClientSetDisconnectReason {
                status: ConnectStatus::ServerFull,
            },
        };
        let bytes = serde_json::to_vec(&envelope).unwrap();
        let decoded: Envelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope, decoded);
    }

    #[test]
    fn test_decode_unknown_message_type_returns_error() {
        let unknown = r#"{"seq":1,"message":{"type":"FlyToMoon"}}"#;
        let result: Result<Envelope, _> = serde_json::from_str(unknown);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_garbage_returns_error() {
        let result: Result<Envelope, _> = serde_json::from_slice(b"not json");
        assert!(result.is_err());
    }
}
