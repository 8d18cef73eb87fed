//! Game rules for Fourfold: the gravity-drop board, the automated opponent,
//! and the per-game session state machine.
//!
//! Everything here is synchronous and free of I/O. The server crate owns the
//! sessions and decides when rules are applied.

pub mod board;
pub mod bot;
pub mod session;

pub use board::{AXES, Board, BoardError, COLS, Cell, Grid, ROWS, Slot, WIN_LENGTH};
pub use bot::{BLOCK_SCORE, BOT_NAME, WIN_SCORE, score_move, select_move};
pub use session::{
    DRAW_LABEL, FinishReason, GameResult, Move, MoveError, MoveOutcome, Progress, Session,
    SessionId, SessionView, Status,
};
