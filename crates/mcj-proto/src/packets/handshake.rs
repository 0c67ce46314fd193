//! Handshake (0x00) — Client → Server, handshake state.

use bytes::Buf;

use crate::codec::{self, ProtoDecode};
use crate::error::ProtoError;
use crate::state::ConnectionState;
use crate::types::VarInt;

/// Longest server address a client may send.
pub const MAX_ADDRESS_LEN: usize = 255;

/// State requested by the last field of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    Status,
    Login,
}

impl NextState {
    pub fn from_i32(v: i32) -> Result<Self, ProtoError> {
        match v {
            1 => Ok(NextState::Status),
            2 => Ok(NextState::Login),
            other => Err(ProtoError::InvalidNextState(other)),
        }
    }

    pub fn connection_state(self) -> ConnectionState {
        match self {
            NextState::Status => ConnectionState::Status,
            NextState::Login => ConnectionState::Login,
        }
    }
}

/// First packet of every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Client protocol version (signed VarInt).
    pub protocol_version: i32,
    /// Host name the client used to connect.
    pub server_address: String,
    pub server_port: u16,
    pub next_state: NextState,
}

impl ProtoDecode for Handshake {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        let protocol_version = VarInt::proto_decode(buf)?.as_i32();
        let server_address = codec::read_bounded_string(buf, MAX_ADDRESS_LEN)?;
        codec::ensure_remaining(buf, 2)?;
        let server_port = buf.get_u16();
        let next_state = NextState::from_i32(VarInt::proto_decode(buf)?.as_i32())?;
        Ok(Self {
            protocol_version,
            server_address,
            server_port,
            next_state,
        })
    }
}
