//! Connection protocol states.

use std::fmt;

/// Which packet table a connection's inbound bytes are parsed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Fresh connection, expecting the Handshake packet.
    Handshake,
    /// Server list ping. Terminal: the connection closes after the pong.
    Status,
    /// Expecting Login Start.
    Login,
    /// Player is in game.
    Play,
}

impl ConnectionState {
    /// Whether a connection in `self` may move to `next`.
    ///
    /// States only move forward: Handshake to Status or Login, Login to Play.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        matches!(
            (self, next),
            (ConnectionState::Handshake, ConnectionState::Status)
                | (ConnectionState::Handshake, ConnectionState::Login)
                | (ConnectionState::Login, ConnectionState::Play)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Handshake => "handshake",
            ConnectionState::Status => "status",
            ConnectionState::Login => "login",
            ConnectionState::Play => "play",
        };
        f.write_str(name)
    }
}
