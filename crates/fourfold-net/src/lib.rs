//! Networking for Fourfold: length-prefixed framing, the JSON wire
//! protocol, and the TCP server/client that carry it.

pub mod framing;
pub mod messages;
pub mod tcp_client;
pub mod tcp_server;

pub use framing::{DEFAULT_MAX_PAYLOAD, FrameConfig, FrameError, FrameReader, FrameWriter};
pub use messages::{
    ClientMessage, ErrorMessage, GameMoveEvent, GameResultEvent, GameStart, MessageError,
    MoveRequest, Register, Rejoin, ServerMessage, decode_client_message, decode_server_message,
    encode_client_message, encode_server_message,
};
pub use tcp_client::{ClientError, ConnectionState, GameClient};
pub use tcp_server::{
    ConnectionEvent, ConnectionId, GameServer, IdGenerator, Outbound, SendFailure, ServerConfig,
};
