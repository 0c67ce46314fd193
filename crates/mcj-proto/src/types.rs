//! Base data types used throughout the Java Edition protocol.

use std::fmt;

use bytes::{Buf, BufMut};

use crate::codec::{ProtoDecode, ProtoEncode};
use crate::error::ProtoError;

// ---------------------------------------------------------------------------
// VarInt (u32, LEB128)
// ---------------------------------------------------------------------------

/// Unsigned variable-length 32-bit integer.
///
/// Used for frame lengths, packet ids, string lengths and most integer
/// fields. Signed fields reinterpret the bits with [`VarInt::as_i32`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarInt(pub u32);

impl VarInt {
    /// Maximum bytes a VarInt can occupy.
    pub const MAX_BYTES: usize = 5;

    /// Encode into the provided buffer and return the number of bytes written.
    pub fn encode(&self, buf: &mut Vec<u8>) -> usize {
        let mut value = self.0;
        let mut written = 0;
        loop {
            written += 1;
            if value & !0x7F == 0 {
                buf.push(value as u8);
                return written;
            }
            buf.push((value & 0x7F | 0x80) as u8);
            value >>= 7;
        }
    }

    /// Decode from a byte slice. Returns the value and the number of bytes consumed.
    ///
    /// Bits of a fifth byte that fall beyond bit 31 are discarded.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), ProtoError> {
        let mut result: u32 = 0;
        for (i, &byte) in buf.iter().enumerate() {
            if i >= Self::MAX_BYTES {
                return Err(ProtoError::VarIntOverflow {
                    max_bytes: Self::MAX_BYTES,
                });
            }
            result |= ((byte & 0x7F) as u32).wrapping_shl(7 * i as u32);
            if byte & 0x80 == 0 {
                return Ok((VarInt(result), i + 1));
            }
        }
        if buf.len() >= Self::MAX_BYTES {
            // Five continuation bytes and nothing after them.
            return Err(ProtoError::VarIntOverflow {
                max_bytes: Self::MAX_BYTES,
            });
        }
        Err(ProtoError::VarIntTruncated)
    }

    /// Number of bytes `value` occupies on the wire.
    pub fn encoded_len(value: u32) -> usize {
        match value {
            0..=0x7F => 1,
            0x80..=0x3FFF => 2,
            0x4000..=0x1F_FFFF => 3,
            0x20_0000..=0xFFF_FFFF => 4,
            _ => 5,
        }
    }

    /// The raw bits as a two's-complement signed integer.
    pub fn as_i32(&self) -> i32 {
        self.0 as i32
    }
}

impl ProtoEncode for VarInt {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        let mut value = self.0;
        loop {
            if value & !0x7F == 0 {
                buf.put_u8(value as u8);
                return;
            }
            buf.put_u8((value & 0x7F | 0x80) as u8);
            value >>= 7;
        }
    }
}

impl ProtoDecode for VarInt {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        let mut result: u32 = 0;
        for i in 0..Self::MAX_BYTES {
            if !buf.has_remaining() {
                return Err(ProtoError::VarIntTruncated);
            }
            let byte = buf.get_u8();
            result |= ((byte & 0x7F) as u32).wrapping_shl(7 * i as u32);
            if byte & 0x80 == 0 {
                return Ok(VarInt(result));
            }
        }
        Err(ProtoError::VarIntOverflow {
            max_bytes: Self::MAX_BYTES,
        })
    }
}

impl fmt::Debug for VarInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VarInt({})", self.0)
    }
}

impl fmt::Display for VarInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Position (packed i26 x, i26 z, i12 y)
// ---------------------------------------------------------------------------

const XZ_BITS: u32 = 26;
const Y_BITS: u32 = 12;
const XZ_MASK: u64 = (1 << XZ_BITS) - 1;
const Y_MASK: u64 = (1 << Y_BITS) - 1;
const X_SHIFT: u32 = 38;
const Z_SHIFT: u32 = 12;

/// A block coordinate packed into one big-endian `u64` on the wire.
///
/// Layout, most significant bit first: x (26 bits), z (26 bits), y (12 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub const MIN_XZ: i32 = -(1 << (XZ_BITS - 1));
    pub const MAX_XZ: i32 = (1 << (XZ_BITS - 1)) - 1;
    pub const MIN_Y: i32 = -(1 << (Y_BITS - 1));
    pub const MAX_Y: i32 = (1 << (Y_BITS - 1)) - 1;

    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Whether every component fits its field width.
    pub fn in_range(&self) -> bool {
        (Self::MIN_XZ..=Self::MAX_XZ).contains(&self.x)
            && (Self::MIN_XZ..=Self::MAX_XZ).contains(&self.z)
            && (Self::MIN_Y..=Self::MAX_Y).contains(&self.y)
    }

    /// Pack into the 64-bit wire word.
    ///
    /// Out-of-range components are rejected rather than truncated.
    pub fn pack(&self) -> Result<u64, ProtoError> {
        if !self.in_range() {
            return Err(ProtoError::PositionOutOfRange {
                x: self.x,
                y: self.y,
                z: self.z,
            });
        }
        let x = self.x as i64 as u64 & XZ_MASK;
        let z = self.z as i64 as u64 & XZ_MASK;
        let y = self.y as i64 as u64 & Y_MASK;
        Ok(x << X_SHIFT | z << Z_SHIFT | y)
    }

    /// Unpack a 64-bit wire word. Every word maps to an in-range position.
    pub fn unpack(word: u64) -> Self {
        let raw_x = word >> X_SHIFT;
        let raw_z = (word >> Z_SHIFT) & XZ_MASK;
        let raw_y = word & Y_MASK;
        Self {
            x: sign_extend(raw_x, XZ_BITS),
            y: sign_extend(raw_y, Y_BITS),
            z: sign_extend(raw_z, XZ_BITS),
        }
    }

    /// Write the packed big-endian word.
    pub fn write(&self, buf: &mut impl BufMut) -> Result<(), ProtoError> {
        buf.put_u64(self.pack()?);
        Ok(())
    }
}

/// Two's-complement interpretation of the low `bits` bits of `raw`.
fn sign_extend(raw: u64, bits: u32) -> i32 {
    let threshold = 1u64 << (bits - 1);
    if raw < threshold {
        raw as i32
    } else {
        (raw as i64 - (1i64 << bits)) as i32
    }
}

impl ProtoDecode for Position {
    fn proto_decode(buf: &mut impl Buf) -> Result<Self, ProtoError> {
        if buf.remaining() < 8 {
            return Err(ProtoError::Truncated {
                needed: 8,
                remaining: buf.remaining(),
            });
        }
        Ok(Self::unpack(buf.get_u64()))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Uuid (two big-endian u64)
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Uuid(pub u128);

impl Uuid {
    /// Build a random (version 4, RFC 4122 variant) UUID from raw bits.
    pub fn v4_from_bits(bits: u128) -> Self {
        let bits = bits & !(0xF << 76) | (0x4 << 76);
        let bits = bits & !(0x3 << 62) | (0x2 << 62);
        Uuid(bits)
    }
}

impl ProtoEncode for Uuid {
    fn proto_encode(&self, buf: &mut impl BufMut) {
        buf.put_u128(self.0);
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11], b[12],
            b[13], b[14], b[15]
        )
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uuid({self})")
    }
}

// ===========================================================================
// Tests
// ===========================================================================
