//! Packet definitions and state-keyed deserialization.

pub mod handshake;
pub mod login;
pub mod play;
pub mod status;

pub use handshake::{Handshake, NextState};
pub use login::{LoginDisconnect, LoginStart, LoginSuccess};
pub use play::{
    ChatBroadcast, ChatMessage, DiggingStatus, KeepAlive, PlayDisconnect, PlayerDigging,
    PlayerPosition, TeleportConfirm,
};
pub use status::{
    Description, PingRequest, PlayerSample, PlayersInfo, PongResponse, StatusDocument,
    StatusRequest, StatusResponse, VersionInfo,
};

use tracing::trace;

use crate::codec::ProtoDecode;
use crate::error::ProtoError;
use crate::state::ConnectionState;
use crate::types::VarInt;

/// Serverbound packet ids, grouped by connection state.
pub mod id {
    pub mod handshake {
        pub const HANDSHAKE: u32 = 0x00;
    }

    pub mod status {
        pub const STATUS_REQUEST: u32 = 0x00;
        pub const PING_REQUEST: u32 = 0x01;
    }

    pub mod login {
        pub const LOGIN_START: u32 = 0x00;
    }

    pub mod play {
        pub const TELEPORT_CONFIRM: u32 = 0x00;
        pub const CHAT_MESSAGE: u32 = 0x03;
        pub const KEEP_ALIVE: u32 = 0x0F;
        pub const PLAYER_POSITION: u32 = 0x11;
        pub const PLAYER_DIGGING: u32 = 0x1A;
    }
}

/// Protocol version spoken by this server (Java Edition 1.18.2).
pub const PROTOCOL_VERSION: i32 = 758;

/// Game version string shown in the server list.
pub const GAME_VERSION: &str = "1.18.2";

/// A decoded serverbound packet. Each variant belongs to exactly one state.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerboundPacket {
    Handshake(Handshake),
    StatusRequest(StatusRequest),
    PingRequest(PingRequest),
    LoginStart(LoginStart),
    TeleportConfirm(TeleportConfirm),
    ChatMessage(ChatMessage),
    KeepAlive(KeepAlive),
    PlayerPosition(PlayerPosition),
    PlayerDigging(PlayerDigging),
}

impl ServerboundPacket {
    /// The state this packet was parsed under.
    pub fn state(&self) -> ConnectionState {
        match self {
            ServerboundPacket::Handshake(_) => ConnectionState::Handshake,
            ServerboundPacket::StatusRequest(_) | ServerboundPacket::PingRequest(_) => {
                ConnectionState::Status
            }
            ServerboundPacket::LoginStart(_) => ConnectionState::Login,
            ServerboundPacket::TeleportConfirm(_)
            | ServerboundPacket::ChatMessage(_)
            | ServerboundPacket::KeepAlive(_)
            | ServerboundPacket::PlayerPosition(_)
            | ServerboundPacket::PlayerDigging(_) => ConnectionState::Play,
        }
    }

    /// Wire id of this packet within its state.
    pub fn id(&self) -> u32 {
        match self {
            ServerboundPacket::Handshake(_) => id::handshake::HANDSHAKE,
            ServerboundPacket::StatusRequest(_) => id::status::STATUS_REQUEST,
            ServerboundPacket::PingRequest(_) => id::status::PING_REQUEST,
            ServerboundPacket::LoginStart(_) => id::login::LOGIN_START,
            ServerboundPacket::TeleportConfirm(_) => id::play::TELEPORT_CONFIRM,
            ServerboundPacket::ChatMessage(_) => id::play::CHAT_MESSAGE,
            ServerboundPacket::KeepAlive(_) => id::play::KEEP_ALIVE,
            ServerboundPacket::PlayerPosition(_) => id::play::PLAYER_POSITION,
            ServerboundPacket::PlayerDigging(_) => id::play::PLAYER_DIGGING,
        }
    }
}

/// Parses a packet body (everything after the id) into a typed packet.
type Schema = fn(&mut &[u8]) -> Result<ServerboundPacket, ProtoError>;

/// Look up the schema for `id` in `state`.
fn schema(state: ConnectionState, packet_id: u32) -> Option<Schema> {
    let schema: Schema = match (state, packet_id) {
        (ConnectionState::Handshake, id::handshake::HANDSHAKE) => {
            |b| Handshake::proto_decode(b).map(ServerboundPacket::Handshake)
        }
        (ConnectionState::Status, id::status::STATUS_REQUEST) => {
            |b| StatusRequest::proto_decode(b).map(ServerboundPacket::StatusRequest)
        }
        (ConnectionState::Status, id::status::PING_REQUEST) => {
            |b| PingRequest::proto_decode(b).map(ServerboundPacket::PingRequest)
        }
        (ConnectionState::Login, id::login::LOGIN_START) => {
            |b| LoginStart::proto_decode(b).map(ServerboundPacket::LoginStart)
        }
        (ConnectionState::Play, id::play::TELEPORT_CONFIRM) => {
            |b| TeleportConfirm::proto_decode(b).map(ServerboundPacket::TeleportConfirm)
        }
        (ConnectionState::Play, id::play::CHAT_MESSAGE) => {
            |b| ChatMessage::proto_decode(b).map(ServerboundPacket::ChatMessage)
        }
        (ConnectionState::Play, id::play::KEEP_ALIVE) => {
            |b| KeepAlive::proto_decode(b).map(ServerboundPacket::KeepAlive)
        }
        (ConnectionState::Play, id::play::PLAYER_POSITION) => {
            |b| PlayerPosition::proto_decode(b).map(ServerboundPacket::PlayerPosition)
        }
        (ConnectionState::Play, id::play::PLAYER_DIGGING) => {
            |b| PlayerDigging::proto_decode(b).map(ServerboundPacket::PlayerDigging)
        }
        _ => return None,
    };
    Some(schema)
}

/// Decode one frame payload (`VarInt id` + fields) under `state`.
///
/// Short reads inside the body surface as `SchemaMismatch`; an id with no
/// schema in `state` is `UnknownPacket`. Touches no shared state.
pub fn deserialize(raw: &[u8], state: ConnectionState) -> Result<ServerboundPacket, ProtoError> {
    let mut cursor = raw;
    let packet_id = VarInt::proto_decode(&mut cursor)
        .map_err(ProtoError::into_schema_error)?
        .0;
    let decode = schema(state, packet_id).ok_or(ProtoError::UnknownPacket {
        state,
        id: packet_id,
    })?;
    let packet = decode(&mut cursor).map_err(ProtoError::into_schema_error)?;
    if !cursor.is_empty() {
        trace!(
            "Ignoring {} trailing bytes after packet 0x{packet_id:02X} ({state})",
            cursor.len()
        );
    }
    Ok(packet)
}
