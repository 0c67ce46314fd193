//! Protocol-level errors.

use thiserror::Error;

use crate::state::ConnectionState;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtoError {
    #[error("VarInt is too long (more than {max_bytes} bytes)")]
    VarIntOverflow { max_bytes: usize },

    #[error("buffer ended before VarInt terminated")]
    VarIntTruncated,

    #[error("invalid UTF-8 string")]
    InvalidEncoding,

    #[error("buffer too short: need {needed} bytes, have {remaining}")]
    Truncated { needed: usize, remaining: usize },

    #[error("packet body too short for schema: need {needed} more bytes, have {remaining}")]
    SchemaMismatch { needed: usize, remaining: usize },

    #[error("unknown packet id 0x{id:02X} in state {state}")]
    UnknownPacket { state: ConnectionState, id: u32 },

    #[error("frame length {len} exceeds maximum of {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("position ({x}, {y}, {z}) outside packable range")]
    PositionOutOfRange { x: i32, y: i32, z: i32 },

    #[error("string of {len} characters exceeds limit of {max}")]
    StringTooLong { len: usize, max: usize },

    #[error("invalid handshake next state: {0}")]
    InvalidNextState(i32),
}

impl ProtoError {
    /// Re-tag a short read inside a packet body as a schema mismatch.
    ///
    /// Field decoders report `Truncated`/`VarIntTruncated`; once they are
    /// running on behalf of a packet schema the caller only cares that the
    /// body did not satisfy the schema.
    pub(crate) fn into_schema_error(self) -> Self {
        match self {
            ProtoError::Truncated { needed, remaining } => {
                ProtoError::SchemaMismatch { needed, remaining }
            }
            ProtoError::VarIntTruncated => ProtoError::SchemaMismatch {
                needed: 1,
                remaining: 0,
            },
            other => other,
        }
    }
}
