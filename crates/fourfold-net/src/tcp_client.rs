//! TCP client for talking to a Fourfold server.
//!
//! Used by the integration tests and by anything that wants to drive a game
//! from Rust. A background task decodes incoming frames into a channel, and
//! the connection state is published through a [`watch`] channel so callers
//! can notice the server hanging up without polling.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};

use crate::framing::{FrameConfig, FrameError, FrameReader, FrameWriter};
use crate::messages::{
    ClientMessage, MessageError, ServerMessage, decode_server_message, encode_client_message,
};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// The server closed the stream or a read failed.
    Disconnected,
}

/// Errors surfaced by [`GameClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("timed out waiting for a server message")]
    Timeout,

    #[error("connection closed")]
    Closed,
}

/// A connected player.
pub struct GameClient {
    writer: FrameWriter<OwnedWriteHalf>,
    incoming: mpsc::UnboundedReceiver<ServerMessage>,
    state: watch::Receiver<ConnectionState>,
}

impl GameClient {
    /// Connect to the server at `addr` using default framing limits.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        Self::connect_with(addr, &FrameConfig::default()).await
    }

    pub async fn connect_with(addr: SocketAddr, frame: &FrameConfig) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::read_loop(
            FrameReader::new(reader, frame),
            incoming_tx,
            state_tx,
        ));

        Ok(Self {
            writer: FrameWriter::new(writer, frame),
            incoming: incoming_rx,
            state: state_rx,
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub async fn send(&mut self, msg: &ClientMessage) -> Result<(), ClientError> {
        let payload = encode_client_message(msg)?;
        self.writer.send(&payload).await?;
        Ok(())
    }

    /// Send raw bytes as one frame, bypassing message encoding.
    pub async fn send_raw(&mut self, payload: &[u8]) -> Result<(), ClientError> {
        self.writer.send(payload).await?;
        Ok(())
    }

    /// Wait for the next server message.
    pub async fn recv(&mut self) -> Result<ServerMessage, ClientError> {
        self.incoming.recv().await.ok_or(ClientError::Closed)
    }

    /// Wait at most `limit` for the next server message.
    pub async fn recv_timeout(&mut self, limit: Duration) -> Result<ServerMessage, ClientError> {
        tokio::time::timeout(limit, self.recv())
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    /// Take a message that has already arrived, if any.
    pub fn try_recv(&mut self) -> Option<ServerMessage> {
        self.incoming.try_recv().ok()
    }

    /// Close the write side; the server sees a clean end of stream.
    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        self.writer.close().await?;
        Ok(())
    }

    async fn read_loop(
        mut frames: FrameReader<OwnedReadHalf>,
        incoming: mpsc::UnboundedSender<ServerMessage>,
        state: watch::Sender<ConnectionState>,
    ) {
        loop {
            match frames.next_frame().await {
                Ok(Some(payload)) => match decode_server_message(&payload) {
                    Ok(msg) => {
                        if incoming.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Ignoring undecodable server message: {e}"),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("Client read ended: {e}");
                    break;
                }
            }
        }
        let _ = state.send(ConnectionState::Disconnected);
    }
}
