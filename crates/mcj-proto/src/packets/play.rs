//! Play-state packets used by the tick handler.

use bytes::{Buf, BufMut};

use crate::codec::{self, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::types::{Position, Uuid, VarInt};

/// Longest chat message a client may send.
pub const MAX_CHAT_LEN: usize = 256;

/// Teleport Confirm (0x00) — Client → Server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeleportConfirm {
    pub teleport_id: i32,
}

impl ProtoDecode for TeleportConfirm {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            teleport_id: VarInt::proto_decode(buf)?.as_i32(),
        })
    }
}

/// Chat Message (0x03) — Client → Server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub message: String,
}

impl ProtoDecode for ChatMessage {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            message: codec::read_bounded_string(buf, MAX_CHAT_LEN)?,
        })
    }
}

/// Keep Alive (0x0F) — Client → Server, echoing the server's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    pub id: i64,
}

impl ProtoDecode for KeepAlive {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        codec::ensure_remaining(buf, 8)?;
        Ok(Self { id: buf.get_i64() })
    }
}

/// Player Position (0x11) — Client → Server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPosition {
    pub x: f64,
    /// Feet position.
    pub y: f64,
    pub z: f64,
    pub on_ground: bool,
}

impl ProtoDecode for PlayerPosition {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        codec::ensure_remaining(buf, 25)?;
        Ok(Self {
            x: buf.get_f64(),
            y: buf.get_f64(),
            z: buf.get_f64(),
            on_ground: buf.get_u8() != 0,
        })
    }
}

/// Action field of [`PlayerDigging`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiggingStatus {
    Started,
    Cancelled,
    Finished,
    DropItemStack,
    DropItem,
    ShootArrowOrFinishEating,
    SwapItemInHand,
    Unknown(i32),
}

impl From<i32> for DiggingStatus {
    fn from(v: i32) -> Self {
        match v {
            0 => DiggingStatus::Started,
            1 => DiggingStatus::Cancelled,
            2 => DiggingStatus::Finished,
            3 => DiggingStatus::DropItemStack,
            4 => DiggingStatus::DropItem,
            5 => DiggingStatus::ShootArrowOrFinishEating,
            6 => DiggingStatus::SwapItemInHand,
            other => DiggingStatus::Unknown(other),
        }
    }
}

/// Player Digging (0x1A) — Client → Server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerDigging {
    pub status: DiggingStatus,
    pub location: Position,
    /// Block face (0 = bottom … 5 = east).
    pub face: i8,
}

impl ProtoDecode for PlayerDigging {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        let status = DiggingStatus::from(VarInt::proto_decode(buf)?.as_i32());
        let location = Position::proto_decode(buf)?;
        codec::ensure_remaining(buf, 1)?;
        Ok(Self {
            status,
            location,
            face: buf.get_i8(),
        })
    }
}

/// Disconnect (0x1A) — Server → Client, play state.
#[derive(Debug, Clone)]
pub struct PlayDisconnect {
    /// Chat component JSON.
    pub reason: String,
}

impl PlayDisconnect {
    pub const ID: u32 = 0x1A;

    pub fn with_message(message: &str) -> Self {
        Self {
            reason: super::login::text_component(message),
        }
    }
}

impl ProtoEncode for PlayDisconnect {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        codec::write_string(buf, &self.reason);
    }
}

/// Chat Message (0x0F) — Server → Client.
#[derive(Debug, Clone)]
pub struct ChatBroadcast {
    /// Chat component JSON.
    pub message: String,
    /// 0 = chat box, 1 = system message, 2 = action bar.
    pub position: u8,
    pub sender: Uuid,
}

impl ChatBroadcast {
    pub const ID: u32 = 0x0F;

    /// A player chat line rendered as `<name> text`.
    pub fn from_player(name: &str, sender: Uuid, text: &str) -> Self {
        Self {
            message: super::login::text_component(&format!("<{name}> {text}")),
            position: 0,
            sender,
        }
    }
}

impl ProtoEncode for ChatBroadcast {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        codec::write_string(buf, &self.message);
        buf.put_u8(self.position);
        self.sender.proto_encode(buf);
    }
}
