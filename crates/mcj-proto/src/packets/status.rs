//! Status-state packets and the server list status document.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::codec::{self, ProtoDecode, ProtoEncode};
use crate::error::ProtoError;

/// Status Request (0x00) — Client → Server. Any trailing content is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRequest;

impl ProtoDecode for StatusRequest {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        buf.advance(buf.remaining());
        Ok(StatusRequest)
    }
}

/// Ping Request (0x01) — Client → Server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRequest {
    pub payload: i64,
}

impl ProtoDecode for PingRequest {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        codec::ensure_remaining(buf, 8)?;
        Ok(Self {
            payload: buf.get_i64(),
        })
    }
}

/// Status Response (0x00) — Server → Client.
#[derive(Debug, Clone)]
pub struct StatusResponse {
    pub json: String,
}

impl StatusResponse {
    pub const ID: u32 = 0x00;
}

impl ProtoEncode for StatusResponse {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        codec::write_string(buf, &self.json);
    }
}

/// Pong Response (0x01) — Server → Client.
#[derive(Debug, Clone, Copy)]
pub struct PongResponse {
    pub payload: i64,
}

impl PongResponse {
    pub const ID: u32 = 0x01;
}

impl ProtoEncode for PongResponse {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_i64(self.payload);
    }
}

// ---------------------------------------------------------------------------
// Status document
// ---------------------------------------------------------------------------

/// JSON body of a Status Response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDocument {
    pub version: VersionInfo,
    pub players: PlayersInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Description>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub protocol: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayersInfo {
    pub max: u32,
    pub online: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<Vec<PlayerSample>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSample {
    /// Hyphenated UUID string, serialized under `id` as clients expect.
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    pub text: String,
}

impl StatusDocument {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Wrap PNG bytes in the `data:` URI the client expects for a favicon.
pub fn favicon_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}
