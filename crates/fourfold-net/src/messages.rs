//! Wire protocol messages and their JSON encoding.
//!
//! Every message is a JSON object `{"type": <name>, "payload": {...}}`.
//! Type names are snake_case, payload fields camelCase. Use the
//! `encode_*`/`decode_*` helpers rather than calling `serde_json` directly.

use fourfold_game::{Grid, SessionId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Message sent by a player's client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Assert a username and ask to be matched.
    Register(Register),
    /// Drop a disc in the bound session.
    GameMove(MoveRequest),
    /// Bind this connection to an existing session.
    Rejoin(Rejoin),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Register {
    pub username: String,
}

/// Column choice. Signed so that negative input reaches validation instead
/// of failing to parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveRequest {
    pub column: i64,
}

/// Rebind to a session. `username` lets a fresh connection assert its
/// identity in the same message; otherwise the one from `register` is used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rejoin {
    pub game_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Notification pushed to a connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A session was created (or rejoined) for this connection.
    GameStart(GameStart),
    /// A disc was placed; carries the authoritative grid.
    GameMove(GameMoveEvent),
    /// The session finished.
    GameResult(GameResultEvent),
    /// A request from this connection was refused.
    Error(ErrorMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameStart {
    pub game_id: SessionId,
    pub player1: String,
    pub player2: String,
    pub is_bot: bool,
    /// True when the receiving connection moves next.
    pub your_turn: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameMoveEvent {
    pub game_id: SessionId,
    pub column: usize,
    pub row: usize,
    /// Seat code of the mover: `1` or `2`.
    pub player: u8,
    pub board: Grid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameResultEvent {
    pub game_id: SessionId,
    /// Winner username, `"Bot"`, or `"draw"`.
    pub winner: String,
    /// Row of the winning disc; absent for draws and forfeits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win_row: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win_col: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorMessage {
    pub message: String,
}

impl ServerMessage {
    /// Shorthand for an [`ServerMessage::Error`] notification.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorMessage {
            message: message.into(),
        })
    }

    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::GameStart(_) => "game_start",
            ServerMessage::GameMove(_) => "game_move",
            ServerMessage::GameResult(_) => "game_result",
            ServerMessage::Error(_) => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A payload that could not be turned into a message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("empty payload")]
    EmptyPayload,

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, MessageError> {
    Ok(serde_json::to_vec(msg)?)
}

pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, MessageError> {
    if data.is_empty() {
        return Err(MessageError::EmptyPayload);
    }
    Ok(serde_json::from_slice(data)?)
}

pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, MessageError> {
    Ok(serde_json::to_vec(msg)?)
}

pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, MessageError> {
    if data.is_empty() {
        return Err(MessageError::EmptyPayload);
    }
    Ok(serde_json::from_slice(data)?)
}
