//! Fixed-rate loop that drains the connection queue and runs the handler.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::handler::PacketHandler;
use crate::queue::QueueEntry;
use crate::server::Shared;

/// Ticks between periodic summaries at debug level.
const SUMMARY_INTERVAL: u64 = 1200;

/// Outcome of one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Entries taken from the queue.
    pub drained: usize,
    /// Entries the handler accepted.
    pub processed: usize,
    /// Entries whose handler call failed. Each dropped its connection.
    pub failed: usize,
    /// Entries for connections that were gone or closing.
    pub stale: usize,
}

pub struct TickLoop<H> {
    shared: Arc<Shared>,
    handler: H,
    tick: u64,
}

impl<H: PacketHandler> TickLoop<H> {
    pub fn new(shared: Arc<Shared>, handler: H) -> Self {
        Self {
            shared,
            handler,
            tick: 0,
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Drain the queue and dispatch every entry before returning.
    pub async fn tick(&mut self) -> TickReport {
        let entries = self.shared.queue.drain_all().await;
        let report = self.dispatch(entries);
        self.tick += 1;
        report
    }

    fn dispatch(&mut self, entries: Vec<QueueEntry>) -> TickReport {
        let mut report = TickReport {
            drained: entries.len(),
            ..TickReport::default()
        };
        if entries.is_empty() {
            return report;
        }
        let mut players = self.shared.players();
        for entry in entries {
            let live = players.get(entry.slot).is_some_and(|p| {
                p.connection_id == entry.connection_id && !p.is_closing()
            });
            if !live {
                trace!(
                    "Skipping packet 0x{:02X} for departed slot {}",
                    entry.packet.id(),
                    entry.slot
                );
                report.stale += 1;
                continue;
            }

            let id = entry.packet.id();
            match self.handler.handle(&mut players, entry.slot, entry.packet) {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        "Dropping slot {} after packet 0x{id:02X} failed: {e}",
                        entry.slot
                    );
                    if let Some(player) = players.get(entry.slot) {
                        player.disconnect(&e.to_string());
                    }
                }
            }
        }
        report
    }

    /// Tick until `shutdown` flips to true, then disconnect everyone.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let period = self.shared.config.network.tick_interval();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Tick loop started ({period:?} per tick)");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick().await;
                    if report.drained > 0 {
                        trace!(
                            "Tick {}: drained {}, processed {}, failed {}, stale {}",
                            self.tick,
                            report.drained,
                            report.processed,
                            report.failed,
                            report.stale
                        );
                    }
                    if self.tick % SUMMARY_INTERVAL == 0 {
                        let queued = self.shared.queue.len().await;
                        let online = self.shared.players().len();
                        debug!("Tick {}: {online} online, {queued} queued", self.tick);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        {
            let players = self.shared.players();
            if !players.is_empty() {
                info!("Disconnecting {} connection(s)", players.len());
            }
            for (_, player) in players.iter() {
                player.disconnect("Server closed");
            }
        }
        info!("Tick loop stopped after {} ticks", self.current_tick());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcj_proto::packets::{ChatMessage, KeepAlive, LoginStart, PlayerPosition};
    use mcj_proto::ServerboundPacket;

    use crate::config::ServerConfig;
    use crate::error::ServerError;
    use crate::handler::GameHandler;
    use crate::player::tests::{open_frame, test_handle};
    use crate::player::PlayerHandle;
    use crate::registry::SlotRegistry;

    fn shared() -> Arc<Shared> {
        Arc::new(Shared::new(ServerConfig::default(), None))
    }

    fn entry(slot: usize, connection_id: u64, packet: ServerboundPacket) -> QueueEntry {
        QueueEntry {
            slot,
            connection_id,
            packet,
        }
    }

    /// Records every packet it sees, failing on a chosen keep-alive id.
    #[derive(Default)]
    struct Recorder {
        seen: Vec<(usize, ServerboundPacket)>,
        fail_on: Option<i64>,
    }

    impl PacketHandler for Recorder {
        fn handle(
            &mut self,
            _players: &mut SlotRegistry<PlayerHandle>,
            slot: usize,
            packet: ServerboundPacket,
        ) -> Result<(), ServerError> {
            let fail = matches!(
                (&packet, self.fail_on),
                (ServerboundPacket::KeepAlive(k), Some(id)) if k.id == id
            );
            self.seen.push((slot, packet));
            if fail {
                return Err(ServerError::Handler("boom".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn tick_dispatches_in_drain_order() {
        let shared = shared();
        let (a, _rx_a, _c_a) = test_handle(10, "a", 8);
        let (b, _rx_b, _c_b) = test_handle(11, "b", 8);
        let slot_a = shared.admit(a).unwrap();
        let slot_b = shared.admit(b).unwrap();

        for (slot, conn, id) in [(slot_a, 10, 1), (slot_b, 11, 2), (slot_a, 10, 3)] {
            shared
                .queue
                .enqueue(entry(
                    slot,
                    conn,
                    ServerboundPacket::KeepAlive(KeepAlive { id }),
                ))
                .await;
        }

        let mut tick = TickLoop::new(shared.clone(), Recorder::default());
        let report = tick.tick().await;
        assert_eq!(
            report,
            TickReport {
                drained: 3,
                processed: 3,
                failed: 0,
                stale: 0
            }
        );
        let order: Vec<_> = tick
            .handler
            .seen
            .iter()
            .map(|(slot, p)| match p {
                ServerboundPacket::KeepAlive(k) => (*slot, k.id),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(order, vec![(slot_a, 1), (slot_b, 2), (slot_a, 3)]);
        assert_eq!(tick.current_tick(), 1);

        let empty = tick.tick().await;
        assert_eq!(empty, TickReport::default());
    }

    #[tokio::test]
    async fn failing_handler_drops_only_that_connection() {
        let shared = shared();
        let (a, mut rx_a, close_a) = test_handle(1, "a", 8);
        let (b, _rx_b, close_b) = test_handle(2, "b", 8);
        let slot_a = shared.admit(a).unwrap();
        let slot_b = shared.admit(b).unwrap();

        for (slot, conn, id) in [(slot_a, 1, 13), (slot_a, 1, 14), (slot_b, 2, 15)] {
            shared
                .queue
                .enqueue(entry(
                    slot,
                    conn,
                    ServerboundPacket::KeepAlive(KeepAlive { id }),
                ))
                .await;
        }

        let mut tick = TickLoop::new(
            shared.clone(),
            Recorder {
                fail_on: Some(13),
                ..Recorder::default()
            },
        );
        let report = tick.tick().await;
        assert_eq!(report.failed, 1);
        // The second packet from the dropped connection is skipped.
        assert_eq!(report.stale, 1);
        assert_eq!(report.processed, 1);

        assert!(*close_a.borrow());
        assert!(!*close_b.borrow());
        let (id, _) = open_frame(&rx_a.try_recv().unwrap());
        assert_eq!(id, mcj_proto::packets::LoginDisconnect::ID);
    }

    #[tokio::test]
    async fn entries_for_reused_slot_are_stale() {
        let shared = shared();
        let (old, _rx, _c) = test_handle(1, "old", 8);
        let slot = shared.admit(old).unwrap();
        shared
            .queue
            .enqueue(entry(
                slot,
                1,
                ServerboundPacket::KeepAlive(KeepAlive { id: 1 }),
            ))
            .await;
        assert!(shared.release(slot, 1));
        let (new, _rx2, _c2) = test_handle(2, "new", 8);
        assert_eq!(shared.admit(new).unwrap(), slot);

        let mut tick = TickLoop::new(shared.clone(), Recorder::default());
        let report = tick.tick().await;
        assert_eq!(report.stale, 1);
        assert!(tick.handler.seen.is_empty());
    }

    #[tokio::test]
    async fn game_handler_login_then_play() {
        let shared = shared();
        let (p, mut rx, close) = test_handle(5, "Alex", 8);
        let slot = shared.admit(p).unwrap();
        let packets = [
            ServerboundPacket::LoginStart(LoginStart {
                username: "Alex".into(),
            }),
            ServerboundPacket::PlayerPosition(PlayerPosition {
                x: 0.5,
                y: 70.0,
                z: 0.5,
                on_ground: true,
            }),
            ServerboundPacket::ChatMessage(ChatMessage {
                message: "hi".into(),
            }),
        ];
        for packet in packets {
            shared.queue.enqueue(entry(slot, 5, packet)).await;
        }

        let mut tick = TickLoop::new(shared.clone(), GameHandler);
        let report = tick.tick().await;
        assert_eq!(report.processed, 3);
        assert!(!*close.borrow());

        let (first, _) = open_frame(&rx.try_recv().unwrap());
        let (second, _) = open_frame(&rx.try_recv().unwrap());
        assert_eq!(first, mcj_proto::packets::LoginSuccess::ID);
        assert_eq!(second, mcj_proto::packets::ChatBroadcast::ID);
        assert!(shared.players().get(slot).unwrap().position.is_some());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_and_disconnects() {
        let shared = shared();
        let (p, mut rx, close) = test_handle(1, "a", 8);
        shared.admit(p).unwrap();

        let (tx, shutdown) = watch::channel(false);
        let task = tokio::spawn(TickLoop::new(shared.clone(), GameHandler).run(shutdown));
        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        assert!(*close.borrow());
        let (id, _) = open_frame(&rx.try_recv().unwrap());
        assert_eq!(id, mcj_proto::packets::LoginDisconnect::ID);
    }
}
