//! Login-state packets.

use bytes::{Buf, BufMut};

use crate::codec::{self, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;
use crate::types::Uuid;

/// Longest username the client may send.
pub const MAX_USERNAME_LEN: usize = 16;

/// Login Start (0x00) — Client → Server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStart {
    pub username: String,
}

impl ProtoDecode for LoginStart {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        Ok(Self {
            username: codec::read_bounded_string(buf, MAX_USERNAME_LEN)?,
        })
    }
}

/// Disconnect (0x00) — Server → Client, login state.
#[derive(Debug, Clone)]
pub struct LoginDisconnect {
    /// Chat component JSON.
    pub reason: String,
}

impl LoginDisconnect {
    pub const ID: u32 = 0x00;

    pub fn with_message(message: &str) -> Self {
        Self {
            reason: text_component(message),
        }
    }
}

impl ProtoEncode for LoginDisconnect {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        codec::write_string(buf, &self.reason);
    }
}

/// Login Success (0x02) — Server → Client. Switches the client to play.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub uuid: Uuid,
    pub username: String,
}

impl LoginSuccess {
    pub const ID: u32 = 0x02;
}

impl ProtoEncode for LoginSuccess {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        self.uuid.proto_encode(buf);
        codec::write_string(buf, &self.username);
    }
}

/// Plain-text chat component: `{"text": message}`.
pub fn text_component(message: &str) -> String {
    serde_json::json!({ "text": message }).to_string()
}
