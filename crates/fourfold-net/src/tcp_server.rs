//! TCP listener that turns client connections into [`ConnectionEvent`]s.
//!
//! Each accepted socket gets a reader loop (frames → [`ClientMessage`]s) and a
//! writer task draining a bounded outbound queue. The server never interprets
//! messages; it forwards them to whoever owns the event receiver. The
//! lifecycle of a connection as seen by that owner is always
//! `Opened → Message* → Closed`, with `Closed` sent exactly once.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};

use crate::framing::{FrameConfig, FrameError, FrameReader, FrameWriter};
use crate::messages::{ClientMessage, ServerMessage, decode_client_message, encode_server_message};

/// How long a connection's writer may take to flush its queue on shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_millis(500);

/// Unique identifier for a TCP connection within a server run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// Atomic generator for monotonically increasing [`ConnectionId`]s.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Return the next unique [`ConnectionId`].
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Outbound queue
// ---------------------------------------------------------------------------

/// Why a notification could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendFailure {
    /// The connection's queue is at capacity.
    #[error("outbound queue full")]
    Full,
    /// The connection's writer has gone away.
    #[error("connection closed")]
    Closed,
}

/// Sending side of a connection's bounded outbound queue.
///
/// Sending never waits: a full queue refuses the message instead.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<ServerMessage>,
}

impl Outbound {
    /// Create a queue of `capacity` messages. The receiver feeds a writer.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue `msg` without waiting.
    pub fn try_send(&self, msg: ServerMessage) -> Result<(), SendFailure> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendFailure::Full,
            mpsc::error::TrySendError::Closed(_) => SendFailure::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// What the server reports about its connections.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A socket was accepted. `outbound` delivers notifications to it.
    Opened {
        id: ConnectionId,
        peer: SocketAddr,
        outbound: Outbound,
    },
    /// A well-formed message arrived.
    Message {
        id: ConnectionId,
        message: ClientMessage,
    },
    /// The connection ended (EOF, I/O error, write failure, or shutdown).
    Closed { id: ConnectionId },
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Configuration for [`GameServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections; extra sockets are closed at once.
    pub max_connections: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_queue: usize,
    /// Framing limits.
    pub frame: FrameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1024,
            outbound_queue: 256,
            frame: FrameConfig::default(),
        }
    }
}

/// Decrements the live-connection count when a connection task ends.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// TCP game server feeding connection events into a channel.
pub struct GameServer {
    config: ServerConfig,
    events: mpsc::Sender<ConnectionEvent>,
    live: Arc<AtomicUsize>,
    id_gen: Arc<IdGenerator>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GameServer {
    /// Create a server that reports to `events`.
    pub fn new(config: ServerConfig, events: mpsc::Sender<ConnectionEvent>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            events,
            live: Arc::new(AtomicUsize::new(0)),
            id_gen: Arc::new(IdGenerator::new()),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Number of connections currently being served.
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Bind to the configured address and run the accept loop.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("Game server listening on {}", listener.local_addr()?);
        self.run_with_listener(listener).await
    }

    /// Run the accept loop on a pre-bound listener (useful for tests).
    pub async fn run_with_listener(&self, listener: TcpListener) -> std::io::Result<()> {
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("Accept failed: {e}");
                            continue;
                        }
                    };
                    if self.live.load(Ordering::SeqCst) >= self.config.max_connections {
                        tracing::warn!("Connection limit reached, rejecting {peer}");
                        drop(stream);
                        continue;
                    }
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!("Could not set TCP_NODELAY for {peer}: {e}");
                    }

                    self.live.fetch_add(1, Ordering::SeqCst);
                    let guard = LiveGuard(Arc::clone(&self.live));
                    let id = self.id_gen.next_id();
                    let (reader, writer) = stream.into_split();
                    let (outbound, outbound_rx) = Outbound::channel(self.config.outbound_queue);

                    if self
                        .events
                        .send(ConnectionEvent::Opened { id, peer, outbound })
                        .await
                        .is_err()
                    {
                        tracing::warn!("Event receiver gone, stopping accept loop");
                        break;
                    }
                    tracing::info!("Accepted connection {id:?} from {peer}");

                    let events = self.events.clone();
                    let frame = self.config.frame.clone();
                    let task_shutdown = self.shutdown_rx.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        Self::handle_connection(id, reader, writer, outbound_rx, events, frame, task_shutdown)
                            .await;
                        tracing::info!("Connection {id:?} closed");
                    });
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Game server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Signal the accept loop and every connection to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Drive one connection until it ends, then report `Closed`.
    async fn handle_connection(
        id: ConnectionId,
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        outbound_rx: mpsc::Receiver<ServerMessage>,
        events: mpsc::Sender<ConnectionEvent>,
        frame: FrameConfig,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut frames = FrameReader::new(reader, &frame);
        let mut write_task = tokio::spawn(Self::write_loop(
            id,
            FrameWriter::new(writer, &frame),
            outbound_rx,
            shutdown_rx.clone(),
        ));
        let mut shutting_down = false;

        loop {
            tokio::select! {
                result = frames.next_frame() => {
                    match result {
                        Ok(Some(payload)) => match decode_client_message(&payload) {
                            Ok(message) => {
                                if events.send(ConnectionEvent::Message { id, message }).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!("Discarding malformed message from {id:?}: {e}");
                            }
                        },
                        Ok(None) => break,
                        Err(FrameError::Io(e)) => {
                            tracing::debug!("Read error on {id:?}: {e}");
                            break;
                        }
                        Err(e @ FrameError::PayloadTooLarge { .. }) => {
                            tracing::warn!("Skipped frame from {id:?}: {e}");
                        }
                        Err(e) => {
                            tracing::warn!("Framing error on {id:?}: {e}");
                            break;
                        }
                    }
                }
                _ = &mut write_task => {
                    tracing::debug!("Writer for {id:?} stopped");
                    break;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        shutting_down = true;
                        break;
                    }
                }
            }
        }

        if shutting_down
            && tokio::time::timeout(SHUTDOWN_DRAIN, &mut write_task)
                .await
                .is_err()
        {
            tracing::debug!("Writer for {id:?} did not drain before shutdown");
        }
        write_task.abort();
        let _ = events.send(ConnectionEvent::Closed { id }).await;
    }

    /// Drain the outbound queue onto the socket. Returns on write failure,
    /// when every [`Outbound`] handle has been dropped, or on shutdown once
    /// the messages already queued are written.
    async fn write_loop(
        id: ConnectionId,
        mut writer: FrameWriter<OwnedWriteHalf>,
        mut outbound_rx: mpsc::Receiver<ServerMessage>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            let msg = tokio::select! {
                biased;
                msg = outbound_rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_ok() && !*shutdown_rx.borrow() {
                        continue;
                    }
                    outbound_rx.close();
                    while let Ok(msg) = outbound_rx.try_recv() {
                        if !Self::write_message(id, &mut writer, &msg).await {
                            return;
                        }
                    }
                    break;
                }
            };
            if !Self::write_message(id, &mut writer, &msg).await {
                return;
            }
        }
        let _ = writer.close().await;
    }

    /// Encode and write one message. `false` means the socket is unusable.
    async fn write_message(
        id: ConnectionId,
        writer: &mut FrameWriter<OwnedWriteHalf>,
        msg: &ServerMessage,
    ) -> bool {
        let payload = match encode_server_message(msg) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Could not encode {} for {id:?}: {e}", msg.kind());
                return true;
            }
        };
        match writer.send(&payload).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Write error on {id:?}: {e}");
                false
            }
        }
    }
}
