//! Per-packet game logic run by the tick loop.

use mcj_proto::packets::{
    ChatBroadcast, ChatMessage, LoginStart, LoginSuccess, PlayerDigging, PlayerPosition,
};
use mcj_proto::types::Uuid;
use mcj_proto::{ConnectionState, ServerboundPacket};
use tracing::{debug, info, trace, warn};

use crate::error::ServerError;
use crate::player::{PlayerHandle, PlayerPos};
use crate::registry::SlotRegistry;

/// Processes one drained packet against the registry.
///
/// Runs while the tick loop holds the registry lock, so implementations
/// must not block. An `Err` drops the sending connection.
pub trait PacketHandler: Send + 'static {
    fn handle(
        &mut self,
        players: &mut SlotRegistry<PlayerHandle>,
        slot: usize,
        packet: ServerboundPacket,
    ) -> Result<(), ServerError>;
}

/// Offline-mode login, chat relay and movement tracking.
#[derive(Debug, Default)]
pub struct GameHandler;

impl PacketHandler for GameHandler {
    fn handle(
        &mut self,
        players: &mut SlotRegistry<PlayerHandle>,
        slot: usize,
        packet: ServerboundPacket,
    ) -> Result<(), ServerError> {
        match packet {
            ServerboundPacket::LoginStart(login) => handle_login(players, slot, login),
            ServerboundPacket::ChatMessage(chat) => handle_chat(players, slot, chat),
            ServerboundPacket::KeepAlive(keep_alive) => {
                let player = in_play(players, slot, ServerboundPacket::KeepAlive(keep_alive))?;
                player.last_keep_alive = Some(keep_alive.id);
                Ok(())
            }
            ServerboundPacket::PlayerPosition(pos) => handle_position(players, slot, pos),
            ServerboundPacket::PlayerDigging(dig) => handle_digging(players, slot, dig),
            ServerboundPacket::TeleportConfirm(confirm) => {
                trace!("Slot {slot} confirmed teleport {}", confirm.teleport_id);
                Ok(())
            }
            other @ (ServerboundPacket::Handshake(_)
            | ServerboundPacket::StatusRequest(_)
            | ServerboundPacket::PingRequest(_)) => Err(ServerError::UnexpectedPacket {
                state: other.state(),
                id: other.id(),
            }),
        }
    }
}

/// Look up a player that has completed login.
fn in_play<'a>(
    players: &'a mut SlotRegistry<PlayerHandle>,
    slot: usize,
    packet: ServerboundPacket,
) -> Result<&'a mut PlayerHandle, ServerError> {
    let player = players.get_mut(slot).ok_or(ServerError::ConnectionClosed)?;
    if !player.logged_in {
        return Err(ServerError::UnexpectedPacket {
            state: packet.state(),
            id: packet.id(),
        });
    }
    Ok(player)
}

fn handle_login(
    players: &mut SlotRegistry<PlayerHandle>,
    slot: usize,
    login: LoginStart,
) -> Result<(), ServerError> {
    let player = players.get_mut(slot).ok_or(ServerError::ConnectionClosed)?;
    if player.logged_in {
        return Err(ServerError::InvalidTransition {
            from: ConnectionState::Play,
            to: ConnectionState::Login,
        });
    }
    player.uuid = Uuid::v4_from_bits(rand::random());
    player.send_packet(
        LoginSuccess::ID,
        &LoginSuccess {
            uuid: player.uuid,
            username: login.username,
        },
    )?;
    player.logged_in = true;
    info!(
        "{} joined from {} (slot {slot}, uuid {})",
        player.username, player.peer, player.uuid
    );
    Ok(())
}

fn handle_chat(
    players: &mut SlotRegistry<PlayerHandle>,
    slot: usize,
    chat: ChatMessage,
) -> Result<(), ServerError> {
    let sender = in_play(players, slot, ServerboundPacket::ChatMessage(chat.clone()))?;
    let text = chat.message.trim();
    if text.is_empty() {
        return Ok(());
    }
    info!("<{}> {text}", sender.username);
    let frame = mcj_proto::frame::encode_packet(
        ChatBroadcast::ID,
        &ChatBroadcast::from_player(&sender.username, sender.uuid, text),
    );
    for (other, player) in players.iter().filter(|(_, p)| p.logged_in) {
        // A slow recipient must not drop the sender.
        if let Err(e) = player.send(frame.clone()) {
            warn!("Chat to slot {other} ({}) dropped: {e}", player.username);
        }
    }
    Ok(())
}

fn handle_position(
    players: &mut SlotRegistry<PlayerHandle>,
    slot: usize,
    pos: PlayerPosition,
) -> Result<(), ServerError> {
    let player = in_play(players, slot, ServerboundPacket::PlayerPosition(pos))?;
    if !(pos.x.is_finite() && pos.y.is_finite() && pos.z.is_finite()) {
        return Err(ServerError::Handler(format!(
            "non-finite position ({}, {}, {})",
            pos.x, pos.y, pos.z
        )));
    }
    player.position = Some(PlayerPos {
        x: pos.x,
        y: pos.y,
        z: pos.z,
        on_ground: pos.on_ground,
    });
    Ok(())
}

fn handle_digging(
    players: &mut SlotRegistry<PlayerHandle>,
    slot: usize,
    dig: PlayerDigging,
) -> Result<(), ServerError> {
    let player = in_play(players, slot, ServerboundPacket::PlayerDigging(dig))?;
    debug!(
        "{} digging {:?} at {} (face {})",
        player.username, dig.status, dig.location, dig.face
    );
    Ok(())
}
