//! Errors reported back to the connection that caused them.

use fourfold_game::{BoardError, MoveError};

/// A request that was refused without changing any state.
///
/// The `Display` text is what the client sees in `error{message}`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Game not found")]
    UnknownSession,

    #[error("Not in a game")]
    NotInGame,

    #[error("Game is already finished")]
    Finished,

    #[error("Not your turn")]
    NotYourTurn,

    #[error("Invalid column")]
    ColumnOutOfRange,

    #[error("Column is full")]
    ColumnFull,

    #[error("You are not a player in this game")]
    NotParticipant,

    #[error("Username is required")]
    UsernameMissing,

    #[error("Username is reserved")]
    UsernameReserved,

    #[error("Already in an active game")]
    AlreadyInGame,
}

impl From<MoveError> for ValidationError {
    fn from(err: MoveError) -> Self {
        match err {
            MoveError::Finished => ValidationError::Finished,
            MoveError::NotYourTurn => ValidationError::NotYourTurn,
            MoveError::Board(BoardError::ColumnOutOfRange(_)) => ValidationError::ColumnOutOfRange,
            MoveError::Board(BoardError::ColumnFull(_)) => ValidationError::ColumnFull,
        }
    }
}
