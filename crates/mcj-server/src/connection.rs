//! Per-socket task: framing, the connection state machine and the writer.
//!
//! A connection reads its handshake, then either answers a server list
//! ping inline or logs in and feeds decoded play packets into the shared
//! queue. Game logic never runs here; it runs on the tick loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use mcj_proto::frame::{self, encode_frame, encode_packet};
use mcj_proto::packets::{LoginDisconnect, StatusResponse, GAME_VERSION, PROTOCOL_VERSION};
use mcj_proto::{deserialize, ConnectionState, ProtoError, ServerboundPacket};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::error::ServerError;
use crate::player::{PlayerHandle, OUTBOUND_CAPACITY};
use crate::queue::QueueEntry;
use crate::server::Shared;

/// How long the writer may keep flushing after the reader has stopped.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Splits an inbound byte stream into frames.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    timeout: Option<Duration>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, timeout: Option<Duration>) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(4096),
            timeout,
        }
    }

    /// Next complete frame payload, or `None` on a clean end of stream.
    ///
    /// Cancel safe: bytes already read stay buffered for the next call.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>, ServerError> {
        loop {
            if let Some(payload) = frame::split_frame(&mut self.buf)? {
                return Ok(Some(payload));
            }
            if self.fill().await? == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(ServerError::ConnectionClosed)
                };
            }
        }
    }

    /// Whether the first byte on the wire opens a legacy server list ping.
    pub async fn starts_with_legacy_ping(&mut self) -> Result<bool, ServerError> {
        if self.buf.is_empty() && self.fill().await? == 0 {
            return Err(ServerError::ConnectionClosed);
        }
        Ok(frame::is_legacy_ping(&self.buf))
    }

    async fn fill(&mut self) -> Result<usize, ServerError> {
        let read = self.inner.read_buf(&mut self.buf);
        let n = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| ServerError::Timeout(limit))??,
            None => read.await?,
        };
        Ok(n)
    }
}

/// Move `state` to `next`, refusing anything but a forward transition.
fn advance(state: &mut ConnectionState, next: ConnectionState) -> Result<(), ServerError> {
    if !state.can_transition_to(next) {
        return Err(ServerError::InvalidTransition {
            from: *state,
            to: next,
        });
    }
    trace!("State {state} -> {next}");
    *state = next;
    Ok(())
}

fn unexpected(packet: &ServerboundPacket) -> ServerError {
    ServerError::UnexpectedPacket {
        state: packet.state(),
        id: packet.id(),
    }
}

/// Drive one accepted TCP connection to completion.
pub async fn handle(
    stream: TcpStream,
    peer: SocketAddr,
    shared: Arc<Shared>,
) -> Result<(), ServerError> {
    let (read_half, write_half) = stream.into_split();
    serve(read_half, write_half, peer, shared).await
}

/// Connection state machine over any reader/writer pair.
pub async fn serve<R, W>(
    reader: R,
    mut writer: W,
    peer: SocketAddr,
    shared: Arc<Shared>,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut reader = FrameReader::new(reader, shared.config.network.read_timeout());
    if reader.starts_with_legacy_ping().await? {
        return Err(ServerError::LegacyPing);
    }

    let mut state = ConnectionState::Handshake;
    let Some(payload) = reader.next_frame().await? else {
        return Ok(());
    };
    let handshake = match deserialize(&payload, state)? {
        ServerboundPacket::Handshake(h) => h,
        other => return Err(unexpected(&other)),
    };
    debug!(
        "{peer} handshake: protocol {}, {}:{}, next {:?}",
        handshake.protocol_version,
        handshake.server_address,
        handshake.server_port,
        handshake.next_state
    );
    advance(&mut state, handshake.next_state.connection_state())?;

    match state {
        ConnectionState::Status => serve_status(&mut reader, &mut writer, &shared).await,
        ConnectionState::Login => {
            if handshake.protocol_version != PROTOCOL_VERSION {
                let reason = format!("Outdated client! Please use {GAME_VERSION}");
                let reject = LoginDisconnect::with_message(&reason);
                writer
                    .write_all(&encode_packet(LoginDisconnect::ID, &reject))
                    .await?;
                writer.shutdown().await?;
                return Err(ServerError::ProtocolMismatch {
                    client: handshake.protocol_version,
                });
            }
            serve_login(reader, writer, peer, shared, state).await
        }
        other => Err(ServerError::InvalidTransition {
            from: ConnectionState::Handshake,
            to: other,
        }),
    }
}

/// Answer one status request, echo the ping frame and close.
async fn serve_status<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut W,
    shared: &Shared,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let payload = reader
        .next_frame()
        .await?
        .ok_or(ServerError::ConnectionClosed)?;
    match deserialize(&payload, ConnectionState::Status)? {
        ServerboundPacket::StatusRequest(_) => {}
        other => return Err(unexpected(&other)),
    }

    let json = shared
        .status_document()
        .to_json()
        .map_err(|e| ServerError::Handler(e.to_string()))?;
    writer
        .write_all(&encode_packet(StatusResponse::ID, &StatusResponse { json }))
        .await?;

    if let Some(ping) = reader.next_frame().await? {
        writer.write_all(&encode_frame(&ping)).await?;
    }
    writer.shutdown().await?;
    Ok(())
}

/// Admit the player, start the writer and pump play packets into the queue.
async fn serve_login<R, W>(
    mut reader: FrameReader<R>,
    mut writer: W,
    peer: SocketAddr,
    shared: Arc<Shared>,
    mut state: ConnectionState,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let payload = reader
        .next_frame()
        .await?
        .ok_or(ServerError::ConnectionClosed)?;
    let login = match deserialize(&payload, state)? {
        ServerboundPacket::LoginStart(login) => login,
        other => return Err(unexpected(&other)),
    };

    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let (close_tx, close_rx) = watch::channel(false);
    let connection_id = shared.next_connection_id();
    let handle = PlayerHandle::new(
        connection_id,
        peer,
        login.username.clone(),
        out_tx,
        close_tx,
    );
    let slot = match shared.admit(handle) {
        Ok(slot) => slot,
        Err(e @ ServerError::CapacityExceeded { .. }) => {
            info!("Rejected {} from {peer}: {e}", login.username);
            let reject = LoginDisconnect::with_message("server is full");
            writer
                .write_all(&encode_packet(LoginDisconnect::ID, &reject))
                .await?;
            writer.shutdown().await?;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    let mut writer_task = tokio::spawn(write_outbound(writer, out_rx));

    advance(&mut state, ConnectionState::Play)?;
    shared
        .queue
        .enqueue(QueueEntry {
            slot,
            connection_id,
            packet: ServerboundPacket::LoginStart(login),
        })
        .await;

    let result = read_play(&mut reader, &shared, slot, connection_id, close_rx).await;

    // Dropping the handle closes the outbound channel, letting the writer finish.
    shared.release(slot, connection_id);
    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => debug!("Writer for {peer} failed: {e}"),
        Ok(Err(e)) => warn!("Writer task for {peer} panicked: {e}"),
        Err(_) => {
            debug!("Writer for {peer} did not drain in time");
            writer_task.abort();
        }
    }
    result
}

/// Decode play frames until the stream ends or the tick loop closes us.
async fn read_play<R>(
    reader: &mut FrameReader<R>,
    shared: &Shared,
    slot: usize,
    connection_id: u64,
    mut close_rx: watch::Receiver<bool>,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let payload = tokio::select! {
            payload = reader.next_frame() => payload?,
            _ = close_rx.changed() => return Ok(()),
        };
        let Some(payload) = payload else {
            return Ok(());
        };
        match deserialize(&payload, ConnectionState::Play) {
            Ok(packet) => {
                shared
                    .queue
                    .enqueue(QueueEntry {
                        slot,
                        connection_id,
                        packet,
                    })
                    .await;
            }
            Err(ProtoError::UnknownPacket { id, .. }) => {
                trace!("Ignoring play packet 0x{id:02X} from slot {slot}");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn write_outbound<W>(mut writer: W, mut rx: mpsc::Receiver<Bytes>) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        writer.write_all(&frame).await?;
    }
    writer.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Buf, BufMut};
    use mcj_proto::codec::{self, ProtoEncode};
    use mcj_proto::packets::{id, LoginSuccess, PlayDisconnect, PongResponse};
    use mcj_proto::types::VarInt;
    use tokio::net::TcpListener;

    use crate::config::ServerConfig;
    use crate::handler::GameHandler;
    use crate::server::run_listener;
    use crate::tick::TickLoop;

    fn handshake(next_state: u32) -> Bytes {
        handshake_with(758, next_state)
    }

    fn handshake_with(protocol: u32, next_state: u32) -> Bytes {
        let mut body = BytesMut::new();
        VarInt(id::handshake::HANDSHAKE).proto_encode(&mut body);
        VarInt(protocol).proto_encode(&mut body);
        codec::write_string(&mut body, "localhost");
        body.put_u16(25565);
        VarInt(next_state).proto_encode(&mut body);
        encode_frame(&body)
    }

    fn packet(id: u32, fill: impl FnOnce(&mut BytesMut)) -> Bytes {
        let mut body = BytesMut::new();
        VarInt(id).proto_encode(&mut body);
        fill(&mut body);
        encode_frame(&body)
    }

    fn login_start(name: &str) -> Bytes {
        packet(id::login::LOGIN_START, |b| codec::write_string(b, name))
    }

    /// Read one frame from a client socket and split off its id.
    async fn read_packet(stream: &mut TcpStream, buf: &mut BytesMut) -> (u32, Bytes) {
        loop {
            if let Some(payload) = frame::split_frame(buf).unwrap() {
                let (id, n) = VarInt::decode(&payload).unwrap();
                return (id.0, payload.slice(n..));
            }
            let n = stream.read_buf(buf).await.unwrap();
            assert!(n > 0, "server closed the connection early");
        }
    }

    async fn start(max_players: u32) -> (SocketAddr, Arc<Shared>, watch::Sender<bool>) {
        let mut config = ServerConfig::default();
        config.server.max_players = max_players;
        config.server.motd = "Loopback".into();
        config.network.tick_interval_ms = 5;
        let shared = Arc::new(Shared::new(config, None));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(run_listener(listener, shared.clone(), shutdown_rx.clone()));
        tokio::spawn(TickLoop::new(shared.clone(), GameHandler).run(shutdown_rx));
        (addr, shared, shutdown_tx)
    }

    #[tokio::test]
    async fn status_ping_over_loopback() {
        let (addr, _shared, _shutdown) = start(5).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&handshake(1)).await.unwrap();
        client
            .write_all(&packet(id::status::STATUS_REQUEST, |_| {}))
            .await
            .unwrap();

        let mut buf = BytesMut::new();
        let (response_id, mut body) = read_packet(&mut client, &mut buf).await;
        assert_eq!(response_id, StatusResponse::ID);
        let json = codec::read_string(&mut body).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(doc["version"]["protocol"], 758);
        assert_eq!(doc["players"]["max"], 5);
        assert_eq!(doc["players"]["online"], 0);
        assert_eq!(doc["description"]["text"], "Loopback");

        let ping = packet(id::status::PING_REQUEST, |b| b.put_i64(0x1234_5678));
        client.write_all(&ping).await.unwrap();
        let (pong_id, mut pong) = read_packet(&mut client, &mut buf).await;
        assert_eq!(pong_id, PongResponse::ID);
        assert_eq!(pong.get_i64(), 0x1234_5678);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn login_then_full_server_rejects() {
        let (addr, shared, _shutdown) = start(1).await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        first.write_all(&handshake(2)).await.unwrap();
        first.write_all(&login_start("Alex")).await.unwrap();
        let mut buf = BytesMut::new();
        let (success_id, mut body) = read_packet(&mut first, &mut buf).await;
        assert_eq!(success_id, LoginSuccess::ID);
        let _uuid = body.get_u128();
        assert_eq!(codec::read_string(&mut body).unwrap(), "Alex");
        assert_eq!(shared.players().len(), 1);

        let mut second = TcpStream::connect(addr).await.unwrap();
        second.write_all(&handshake(2)).await.unwrap();
        second.write_all(&login_start("Steve")).await.unwrap();
        let mut buf2 = BytesMut::new();
        let (reject_id, mut body) = read_packet(&mut second, &mut buf2).await;
        assert_eq!(reject_id, LoginDisconnect::ID);
        assert!(codec::read_string(&mut body)
            .unwrap()
            .contains("server is full"));
        assert_eq!(shared.players().len(), 1);

        // The first player is unaffected and can still chat.
        let chat = packet(id::play::CHAT_MESSAGE, |b| codec::write_string(b, "still here"));
        first.write_all(&chat).await.unwrap();
        let (chat_id, _) = read_packet(&mut first, &mut buf).await;
        assert_eq!(chat_id, mcj_proto::packets::ChatBroadcast::ID);

        drop(first);
        for _ in 0..100 {
            if shared.players().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(shared.players().is_empty());
    }

    #[tokio::test]
    async fn handler_error_kicks_player() {
        let (addr, shared, _shutdown) = start(2).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&handshake(2)).await.unwrap();
        client.write_all(&login_start("Alex")).await.unwrap();
        let mut buf = BytesMut::new();
        let (success_id, _) = read_packet(&mut client, &mut buf).await;
        assert_eq!(success_id, LoginSuccess::ID);

        let bad = packet(id::play::PLAYER_POSITION, |b| {
            b.put_f64(f64::NAN);
            b.put_f64(64.0);
            b.put_f64(0.0);
            b.put_u8(1);
        });
        client.write_all(&bad).await.unwrap();
        let (kick_id, _) = read_packet(&mut client, &mut buf).await;
        assert_eq!(kick_id, PlayDisconnect::ID);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert!(shared.players().is_empty());
    }

    #[tokio::test]
    async fn unknown_handshake_packet_drops_connection() {
        let (reader, mut client) = tokio::io::duplex(256);
        let (server_read, server_write) = tokio::io::split(reader);
        let shared = Arc::new(Shared::new(ServerConfig::default(), None));
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let task = tokio::spawn(serve(server_read, server_write, peer, shared));

        client.write_all(&packet(0x05, |_| {})).await.unwrap();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ServerError::Proto(ProtoError::UnknownPacket {
                state: ConnectionState::Handshake,
                id: 0x05
            })
        ));
    }

    #[tokio::test]
    async fn outdated_client_rejected_at_login() {
        let (addr, shared, _shutdown) = start(2).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&handshake_with(757, 2)).await.unwrap();
        let mut buf = BytesMut::new();
        let (id, mut body) = read_packet(&mut client, &mut buf).await;
        assert_eq!(id, LoginDisconnect::ID);
        assert!(codec::read_string(&mut body).unwrap().contains("1.18.2"));
        assert!(shared.players().is_empty());
    }

    #[tokio::test]
    async fn legacy_ping_is_dropped() {
        let (reader, mut client) = tokio::io::duplex(64);
        let (server_read, server_write) = tokio::io::split(reader);
        let shared = Arc::new(Shared::new(ServerConfig::default(), None));
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let task = tokio::spawn(serve(server_read, server_write, peer, shared));

        client.write_all(&[0xFE, 0x01]).await.unwrap();
        assert!(matches!(
            task.await.unwrap(),
            Err(ServerError::LegacyPing)
        ));
    }

    #[tokio::test]
    async fn frame_reader_handles_split_writes() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(server, None);
        let frame = login_start("Alex");
        let (head, tail) = frame.split_at(3);
        client.write_all(head).await.unwrap();
        let tail = tail.to_vec();
        let writer = tokio::spawn(async move {
            tokio::task::yield_now().await;
            client.write_all(&tail).await.unwrap();
            client
        });
        let payload = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(payload[..], frame[1..]);
        drop(writer.await.unwrap());
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn frame_reader_truncated_stream_is_closed() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(server, None);
        client.write_all(&[0x05, 0x00, 0x01]).await.unwrap();
        drop(client);
        assert!(matches!(
            reader.next_frame().await,
            Err(ServerError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn frame_reader_times_out() {
        let (_client, server) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(server, Some(Duration::from_millis(20)));
        assert!(matches!(
            reader.next_frame().await,
            Err(ServerError::Timeout(_))
        ));
    }

    #[test]
    fn transitions_only_forward() {
        let mut state = ConnectionState::Handshake;
        advance(&mut state, ConnectionState::Login).unwrap();
        advance(&mut state, ConnectionState::Play).unwrap();
        assert!(matches!(
            advance(&mut state, ConnectionState::Status),
            Err(ServerError::InvalidTransition {
                from: ConnectionState::Play,
                to: ConnectionState::Status
            })
        ));
        assert_eq!(state, ConnectionState::Play);
    }
}
