use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol version expected in `Packet::Connect`.
pub const PROTOCOL_VERSION: u32 = 1;
/// Maximum accepted display-name length in characters.
pub const MAX_NAME_LEN: usize = 16;
/// Length of a generated room id token.
pub const ROOM_ID_LEN: usize = 8;
/// Bounded retry count for room-id generation before giving up.
pub const ID_GENERATION_ATTEMPTS: u32 = 10;
/// Default room capacity (players per room).
pub const DEFAULT_ROOM_CAPACITY: usize = 8;

/// Connection ids are assigned by the server, starting from 1.
pub type ConnectionId = u32;

/// All messages exchanged between client and server, bincode-encoded
/// one per datagram.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // client -> server
    Connect {
        client_version: u32,
    },
    Disconnect,
    SetNameRequest {
        name: String,
    },
    InputRequest {
        frame: InputFrame,
    },
    CreateRoomRequest {
        quickplay: bool,
    },
    JoinRoomRequest {
        target: JoinTarget,
    },
    LeaveRoomRequest,

    // server -> client
    Connected {
        connection_id: ConnectionId,
    },
    Error {
        code: ErrorCode,
    },
    SetNameResponse {
        name: String,
    },
    JoinRoomResponse {
        outcome: Result<String, ErrorCode>,
    },
    LeaveRoomResponse {
        left: bool,
    },
    PlayerJoinedBroadcast {
        name: String,
    },
    PlayerLeftBroadcast {
        name: String,
    },
    Disconnected {
        reason: String,
    },
}

/// Target of a join request: a concrete room id, or quickplay matchmaking.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum JoinTarget {
    Room(String),
    Quickplay,
}

/// One input submission. The `data` bytes are opaque to the server and are
/// handed unmodified to the host simulation at the next tick.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct InputFrame {
    pub sequence: u32,
    pub timestamp: u64,
    pub data: Vec<u8>,
}

/// Request-level failure codes carried on the generic error channel and in
/// join responses.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidData,
    InvalidName,
    IdGenerationFailed,
    InvalidRoomId,
    RoomFull,
}

impl ErrorCode {
    /// The wire-level string code for this error, as used by clients of the
    /// original protocol.
    pub fn as_code(&self) -> &'static str {
        match self {
            ErrorCode::InvalidData => "error_invalid_data",
            ErrorCode::InvalidName => "error_player_invalid_name",
            ErrorCode::IdGenerationFailed => "error_room_id_generation_failed",
            ErrorCode::InvalidRoomId => "error_room_invalid_id",
            ErrorCode::RoomFull => "error_room_full",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_strings() {
        assert_eq!(ErrorCode::InvalidData.as_code(), "error_invalid_data");
        assert_eq!(ErrorCode::InvalidName.as_code(), "error_player_invalid_name");
        assert_eq!(
            ErrorCode::IdGenerationFailed.as_code(),
            "error_room_id_generation_failed"
        );
        assert_eq!(ErrorCode::InvalidRoomId.as_code(), "error_room_invalid_id");
        assert_eq!(ErrorCode::RoomFull.as_code(), "error_room_full");
    }

    #[test]
    fn test_error_code_display_matches_code() {
        for code in [
            ErrorCode::InvalidData,
            ErrorCode::InvalidName,
            ErrorCode::IdGenerationFailed,
            ErrorCode::InvalidRoomId,
            ErrorCode::RoomFull,
        ] {
            assert_eq!(code.to_string(), code.as_code());
        }
    }

    #[test]
    fn test_packet_serialization_connect() {
        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Connect { client_version } => assert_eq!(client_version, PROTOCOL_VERSION),
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_join_request() {
        let packet = Packet::JoinRoomRequest {
            target: JoinTarget::Room("a3f09c21".to_string()),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::JoinRoomRequest { target } => {
                assert_eq!(target, JoinTarget::Room("a3f09c21".to_string()));
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_quickplay_target() {
        let packet = Packet::JoinRoomRequest {
            target: JoinTarget::Quickplay,
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::JoinRoomRequest { target } => assert_eq!(target, JoinTarget::Quickplay),
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_join_response_error() {
        let packet = Packet::JoinRoomResponse {
            outcome: Err(ErrorCode::RoomFull),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::JoinRoomResponse { outcome } => {
                assert_eq!(outcome, Err(ErrorCode::RoomFull));
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_input() {
        let packet = Packet::InputRequest {
            frame: InputFrame {
                sequence: 123,
                timestamp: 456789,
                data: vec![0x01, 0x02, 0xff],
            },
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::InputRequest { frame } => {
                assert_eq!(frame.sequence, 123);
                assert_eq!(frame.timestamp, 456789);
                assert_eq!(frame.data, vec![0x01, 0x02, 0xff]);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_input_frame_preserves_opaque_bytes() {
        let frame = InputFrame {
            sequence: 7,
            timestamp: 1,
            data: (0u8..=255).collect(),
        };
        let serialized = bincode::serialize(&frame).unwrap();
        let roundtrip: InputFrame = bincode::deserialize(&serialized).unwrap();
        assert_eq!(roundtrip, frame);
    }
}
