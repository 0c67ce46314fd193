//! Minecraft Java Edition protocol types, framing and packet definitions.

pub mod codec;
pub mod error;
pub mod frame;
pub mod packets;
pub mod state;
pub mod types;

pub use error::ProtoError;
pub use packets::{deserialize, ServerboundPacket};
pub use state::ConnectionState;
