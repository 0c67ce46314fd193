//! Mutex-guarded FIFO between connection tasks and the tick loop.

use mcj_proto::ServerboundPacket;
use tokio::sync::Mutex;

/// A decoded packet waiting for the next tick.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    /// Registry slot of the sending connection.
    pub slot: usize,
    /// Identity of the connection that held `slot` at enqueue time.
    pub connection_id: u64,
    pub packet: ServerboundPacket,
}

/// Funnels packets from every connection into batches drained once per tick.
///
/// Both operations take the lock only for the push or the swap. tokio's
/// mutex queues waiters in FIFO order, so concurrent callers are served in
/// the order they started waiting.
#[derive(Debug, Default)]
pub struct ConnectionQueue {
    buffer: Mutex<Vec<QueueEntry>>,
}

impl ConnectionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, entry: QueueEntry) {
        self.buffer.lock().await.push(entry);
    }

    /// Take everything enqueued so far, leaving the buffer empty.
    pub async fn drain_all(&self) -> Vec<QueueEntry> {
        let mut buffer = self.buffer.lock().await;
        std::mem::take(&mut *buffer)
    }

    pub async fn len(&self) -> usize {
        self.buffer.lock().await.len()
    }
}
