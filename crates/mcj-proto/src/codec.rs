//! Protocol encoding/decoding traits and helpers.

use bytes::{Buf, BufMut};

use crate::error::ProtoError;
use crate::types::VarInt;

/// Encode a value onto a buffer.
pub trait ProtoEncode {
    fn proto_encode(&self, buf: &mut impl BufMut);
}

/// Decode a value from a buffer.
pub trait ProtoDecode: Sized {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError>;
}

/// Write a protocol string (VarInt byte length + UTF-8).
pub fn write_string(buf: &mut impl BufMut, s: &str) {
    VarInt(s.len() as u32).proto_encode(buf);
    buf.put_slice(s.as_bytes());
}

/// Read a protocol string (VarInt byte length + UTF-8).
pub fn read_string(buf: &mut impl Buf) -> Result<String, ProtoError> {
    let len = VarInt::proto_decode(buf)?.0 as usize;
    if buf.remaining() < len {
        return Err(ProtoError::Truncated {
            needed: len,
            remaining: buf.remaining(),
        });
    }
    let data = buf.copy_to_bytes(len);
    String::from_utf8(data.to_vec()).map_err(|_| ProtoError::InvalidEncoding)
}

/// Read a string and enforce the protocol's per-field character limit.
pub fn read_bounded_string(buf: &mut impl Buf, max_chars: usize) -> Result<String, ProtoError> {
    let s = read_string(buf)?;
    let len = s.chars().count();
    if len > max_chars {
        return Err(ProtoError::StringTooLong {
            len,
            max: max_chars,
        });
    }
    Ok(s)
}

/// Decode a string from the start of `buf`, returning it with the number of
/// bytes consumed (prefix width + byte length).
pub fn decode_string(buf: &[u8]) -> Result<(String, usize), ProtoError> {
    let (len, prefix) = VarInt::decode(buf)?;
    let len = len.0 as usize;
    let body = &buf[prefix..];
    if body.len() < len {
        return Err(ProtoError::Truncated {
            needed: len,
            remaining: body.len(),
        });
    }
    let s = std::str::from_utf8(&body[..len]).map_err(|_| ProtoError::InvalidEncoding)?;
    Ok((s.to_owned(), prefix + len))
}

/// Fail with `Truncated` unless at least `needed` bytes remain.
pub(crate) fn ensure_remaining(buf: &impl Buf, needed: usize) -> Result<(), ProtoError> {
    if buf.remaining() < needed {
        return Err(ProtoError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}
