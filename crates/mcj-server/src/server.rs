//! Shared server state and the TCP accept loop.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mcj_proto::packets::status::favicon_data_uri;
use mcj_proto::packets::{
    Description, PlayerSample, PlayersInfo, StatusDocument, VersionInfo, GAME_VERSION,
    PROTOCOL_VERSION,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection;
use crate::error::ServerError;
use crate::player::PlayerHandle;
use crate::queue::ConnectionQueue;
use crate::registry::SlotRegistry;

/// Most players listed in a status response sample.
pub const STATUS_SAMPLE_LIMIT: usize = 12;

/// State shared by the accept loop, every connection task and the tick loop.
pub struct Shared {
    pub config: ServerConfig,
    pub queue: ConnectionQueue,
    players: Mutex<SlotRegistry<PlayerHandle>>,
    favicon: Option<String>,
    next_connection_id: AtomicU64,
}

impl Shared {
    pub fn new(config: ServerConfig, favicon: Option<String>) -> Self {
        let capacity = config.server.max_players as usize;
        Self {
            config,
            queue: ConnectionQueue::new(),
            players: Mutex::new(SlotRegistry::with_capacity(capacity)),
            favicon,
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Lock the registry. Never hold the guard across an `.await`.
    pub fn players(&self) -> MutexGuard<'_, SlotRegistry<PlayerHandle>> {
        self.players.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Give a logging-in connection a slot.
    pub fn admit(&self, handle: PlayerHandle) -> Result<usize, ServerError> {
        let mut players = self.players();
        let slot = players.allocate(handle)?;
        debug!("Slot {slot} allocated ({}/{})", players.len(), players.capacity());
        Ok(slot)
    }

    /// Free `slot` if it still belongs to `connection_id`.
    pub fn release(&self, slot: usize, connection_id: u64) -> bool {
        let mut players = self.players();
        if players
            .get(slot)
            .is_some_and(|p| p.connection_id == connection_id)
        {
            if let Some(player) = players.free(slot) {
                if player.logged_in {
                    info!("{} left (slot {slot})", player.username);
                }
                if let Some(pos) = player.position {
                    debug!(
                        "{} last at ({:.1}, {:.1}, {:.1}), on ground: {}, last keep-alive: {:?}",
                        player.username,
                        pos.x,
                        pos.y,
                        pos.z,
                        pos.on_ground,
                        player.last_keep_alive
                    );
                }
                return true;
            }
        }
        false
    }

    /// Build the server list document from the live registry.
    pub fn status_document(&self) -> StatusDocument {
        let players = self.players();
        let sample: Vec<PlayerSample> = players
            .iter()
            .filter(|(_, p)| p.logged_in)
            .take(STATUS_SAMPLE_LIMIT)
            .map(|(_, p)| PlayerSample {
                id: p.uuid.to_string(),
                name: p.username.clone(),
            })
            .collect();
        StatusDocument {
            version: VersionInfo {
                name: GAME_VERSION.into(),
                protocol: PROTOCOL_VERSION,
            },
            players: PlayersInfo {
                max: self.config.server.max_players,
                online: players.len() as u32,
                sample: (!sample.is_empty()).then_some(sample),
            },
            description: Some(Description {
                text: self.config.server.motd.clone(),
            }),
            favicon: self.favicon.clone(),
        }
    }
}

/// Read a PNG from disk and turn it into a status favicon.
pub fn load_favicon<P: AsRef<Path>>(path: P) -> Result<String, ServerError> {
    let png = std::fs::read(path)?;
    Ok(favicon_data_uri(&png))
}

/// Accept connections until `shutdown` flips to true.
pub async fn run_listener(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on {addr}");
    }
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Connection from {peer}");
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("set_nodelay failed for {peer}: {e}");
                    }
                    let shared = shared.clone();
                    tokio::spawn(async move {
                        if let Err(e) = connection::handle(stream, peer, shared).await {
                            debug!("Connection {peer} closed: {e}");
                        }
                    });
                }
                Err(e) => {
                    warn!("Accept error: {e}");
                }
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("Listener stopped");
}
