//! Server-level errors.

use std::time::Duration;

use mcj_proto::{ConnectionState, ProtoError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Proto(#[from] ProtoError),

    #[error("server is full ({capacity} slots)")]
    CapacityExceeded { capacity: usize },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("no data received for {0:?}")]
    Timeout(Duration),

    #[error("illegal state transition {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("unexpected packet 0x{id:02X} in state {state}")]
    UnexpectedPacket { state: ConnectionState, id: u32 },

    #[error("client speaks protocol {client}")]
    ProtocolMismatch { client: i32 },

    #[error("legacy server list ping")]
    LegacyPing,

    #[error("outbound queue full")]
    OutboundFull,

    #[error("handler error: {0}")]
    Handler(String),
}
