//! Length-prefixed framing (`[VarInt length][payload]`).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::ProtoEncode;
use crate::error::ProtoError;
use crate::types::VarInt;

/// Largest payload length a client may declare (three-byte VarInt maximum).
pub const MAX_FRAME_LEN: usize = 2_097_151;

/// First byte of a pre-Netty server list ping.
pub const LEGACY_PING: u8 = 0xFE;

/// Split one complete frame off the front of `buf`.
///
/// Returns `Ok(None)` while the length prefix or the payload is still
/// incomplete; `buf` is left untouched in that case so the caller can read
/// more bytes and retry. On success the prefix and payload are consumed and
/// the payload (packet id + fields) is returned.
pub fn split_frame(buf: &mut BytesMut) -> Result<Option<Bytes>, ProtoError> {
    let (len, prefix) = match VarInt::decode(buf) {
        Ok(decoded) => decoded,
        Err(ProtoError::VarIntTruncated) => return Ok(None),
        Err(e) => return Err(e),
    };
    let len = len.0 as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtoError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    if buf.len() - prefix < len {
        return Ok(None);
    }
    buf.advance(prefix);
    Ok(Some(buf.split_to(len).freeze()))
}

/// Prefix `payload` with its VarInt length.
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(VarInt::MAX_BYTES + payload.len());
    VarInt(payload.len() as u32).proto_encode(&mut out);
    out.put_slice(payload);
    out.freeze()
}

/// Encode `VarInt(id) + body` and frame it.
pub fn encode_packet(id: u32, body: &impl ProtoEncode) -> Bytes {
    let mut payload = BytesMut::new();
    VarInt(id).proto_encode(&mut payload);
    body.proto_encode(&mut payload);
    encode_frame(&payload)
}

/// Whether the first bytes of a fresh connection are a legacy (1.6 and
/// older) server list ping, which this server does not answer.
pub fn is_legacy_ping(buf: &[u8]) -> bool {
    buf.first() == Some(&LEGACY_PING)
}
