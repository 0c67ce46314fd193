//! Per-connection handle stored in the slot registry.

use std::net::SocketAddr;

use bytes::Bytes;
use mcj_proto::codec::ProtoEncode;
use mcj_proto::frame;
use mcj_proto::packets::{LoginDisconnect, PlayDisconnect};
use mcj_proto::types::Uuid;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::error::ServerError;

/// Frames buffered per connection before sends start failing.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Last position reported by the client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPos {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub on_ground: bool,
}

/// What the tick loop knows about one admitted connection.
///
/// Outbound frames go through a bounded channel drained by the
/// connection's writer task, so sending never blocks the tick.
#[derive(Debug)]
pub struct PlayerHandle {
    pub connection_id: u64,
    pub peer: SocketAddr,
    pub username: String,
    pub uuid: Uuid,
    /// Set once Login Success has been queued.
    pub logged_in: bool,
    pub position: Option<PlayerPos>,
    pub last_keep_alive: Option<i64>,
    outbound: mpsc::Sender<Bytes>,
    close_tx: watch::Sender<bool>,
}

impl PlayerHandle {
    pub fn new(
        connection_id: u64,
        peer: SocketAddr,
        username: String,
        outbound: mpsc::Sender<Bytes>,
        close_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            connection_id,
            peer,
            username,
            uuid: Uuid::default(),
            logged_in: false,
            position: None,
            last_keep_alive: None,
            outbound,
            close_tx,
        }
    }

    /// Queue an already framed packet.
    pub fn send(&self, frame: Bytes) -> Result<(), ServerError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ServerError::OutboundFull,
            mpsc::error::TrySendError::Closed(_) => ServerError::ConnectionClosed,
        })
    }

    pub fn send_packet(&self, id: u32, body: &impl ProtoEncode) -> Result<(), ServerError> {
        self.send(frame::encode_packet(id, body))
    }

    /// Send the disconnect packet matching the client's state, then close.
    pub fn disconnect(&self, reason: &str) {
        let sent = if self.logged_in {
            self.send_packet(PlayDisconnect::ID, &PlayDisconnect::with_message(reason))
        } else {
            self.send_packet(LoginDisconnect::ID, &LoginDisconnect::with_message(reason))
        };
        if let Err(e) = sent {
            debug!("Disconnect for {} not delivered: {e}", self.username);
        }
        self.close();
    }

    /// Signal the connection task to stop reading and release its slot.
    pub fn close(&self) {
        self.close_tx.send_replace(true);
    }

    pub fn is_closing(&self) -> bool {
        *self.close_tx.borrow()
    }
}
