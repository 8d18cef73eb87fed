//! One game instance: players, board, turn, and the `Active → Finished`
//! lifecycle.
//!
//! A [`Session`] only changes through [`Session::apply_move`] and
//! [`Session::forfeit`]. Once finished it is frozen: every further call is
//! rejected and leaves board, turn, and result untouched.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::board::{Board, BoardError, Grid, Slot};
use crate::bot::BOT_NAME;

/// Result label used when a session ends without a winner.
pub const DRAW_LABEL: &str = "draw";

// ---------------------------------------------------------------------------
// Identifiers and state enums
// ---------------------------------------------------------------------------

/// Opaque unique session identifier (UUID v4 text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    Finished,
}

/// Terminal result of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    PlayerAWins,
    PlayerBWins,
    Draw,
}

impl GameResult {
    fn win_for(slot: Slot) -> Self {
        match slot {
            Slot::A => GameResult::PlayerAWins,
            Slot::B => GameResult::PlayerBWins,
        }
    }

    /// Winning seat, if any.
    pub fn winner(self) -> Option<Slot> {
        match self {
            GameResult::PlayerAWins => Some(Slot::A),
            GameResult::PlayerBWins => Some(Slot::B),
            GameResult::Draw => None,
        }
    }
}

/// Why a session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    FourInARow,
    BoardFull,
    Forfeit,
}

/// A disc placed during play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub slot: Slot,
    pub column: usize,
    pub row: usize,
}

/// Where a session stands after an accepted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Play continues; `next` is to move.
    Continue { next: Slot },
    /// The mover completed a line.
    Won,
    /// The board filled up without a line.
    Draw,
}

/// An accepted move and its consequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub mv: Move,
    pub progress: Progress,
}

/// Reasons a move is refused. The session is never mutated on error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("Game is already finished")]
    Finished,
    #[error("Not your turn")]
    NotYourTurn,
    #[error(transparent)]
    Board(#[from] BoardError),
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Mutable state of one game.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    player_a: String,
    player_b: String,
    is_bot: bool,
    board: Board,
    turn: Slot,
    status: Status,
    result: Option<GameResult>,
    finish_reason: Option<FinishReason>,
    last_move: Option<Move>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    /// Start a human-vs-human session. `player_a` moves first.
    pub fn new(id: SessionId, player_a: String, player_b: String, now: DateTime<Utc>) -> Self {
        Self::build(id, player_a, player_b, false, now)
    }

    /// Start a session against the automated opponent, which takes slot B.
    pub fn against_bot(id: SessionId, player: String, now: DateTime<Utc>) -> Self {
        Self::build(id, player, BOT_NAME.to_string(), true, now)
    }

    fn build(
        id: SessionId,
        player_a: String,
        player_b: String,
        is_bot: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            player_a,
            player_b,
            is_bot,
            board: Board::new(),
            turn: Slot::A,
            status: Status::Active,
            result: None,
            finish_reason: None,
            last_move: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn turn(&self) -> Slot {
        self.turn
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    pub fn is_bot(&self) -> bool {
        self.is_bot
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    pub fn last_move(&self) -> Option<Move> {
        self.last_move
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Username seated in `slot`.
    pub fn player(&self, slot: Slot) -> &str {
        match slot {
            Slot::A => &self.player_a,
            Slot::B => &self.player_b,
        }
    }

    /// Seat held by a human `username`. The bot seat never matches.
    pub fn slot_of(&self, username: &str) -> Option<Slot> {
        if self.player_a == username {
            Some(Slot::A)
        } else if !self.is_bot && self.player_b == username {
            Some(Slot::B)
        } else {
            None
        }
    }

    /// True when `slot` is played by the automated opponent.
    pub fn is_bot_slot(&self, slot: Slot) -> bool {
        self.is_bot && slot == Slot::B
    }

    /// Winner username, `"draw"`, or `None` while active.
    pub fn result_label(&self) -> Option<&str> {
        self.result.map(|result| match result.winner() {
            Some(slot) => self.player(slot),
            None => DRAW_LABEL,
        })
    }

    /// Whole seconds between creation and the last update.
    pub fn duration_secs(&self) -> i64 {
        (self.updated_at - self.created_at).num_seconds()
    }

    /// Play a disc for `slot` in `column`.
    pub fn apply_move(
        &mut self,
        slot: Slot,
        column: usize,
        now: DateTime<Utc>,
    ) -> Result<MoveOutcome, MoveError> {
        if self.status == Status::Finished {
            return Err(MoveError::Finished);
        }
        if slot != self.turn {
            return Err(MoveError::NotYourTurn);
        }
        let row = self.board.drop(column, slot)?;
        let mv = Move { slot, column, row };
        self.last_move = Some(mv);
        self.updated_at = now;

        let progress = if self.board.check_win(row, column, slot) {
            self.finish(GameResult::win_for(slot), FinishReason::FourInARow);
            Progress::Won
        } else if self.board.is_full() {
            self.finish(GameResult::Draw, FinishReason::BoardFull);
            Progress::Draw
        } else {
            self.turn = slot.other();
            Progress::Continue { next: self.turn }
        };
        Ok(MoveOutcome { mv, progress })
    }

    /// Resolve the session as a forfeit by `leaver`. The other seat wins.
    ///
    /// Returns `false` without touching anything if already finished.
    pub fn forfeit(&mut self, leaver: Slot, now: DateTime<Utc>) -> bool {
        if self.status == Status::Finished {
            return false;
        }
        self.updated_at = now;
        self.finish(GameResult::win_for(leaver.other()), FinishReason::Forfeit);
        true
    }

    fn finish(&mut self, result: GameResult, reason: FinishReason) {
        self.status = Status::Finished;
        self.result = Some(result);
        self.finish_reason = Some(reason);
    }

    /// Serializable snapshot for read-only queries.
    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id.clone(),
            player1: self.player_a.clone(),
            player2: self.player_b.clone(),
            is_bot: self.is_bot,
            board: self.board.grid(),
            current_player: self.turn.code(),
            status: self.status,
            winner: self.result_label().map(str::to_string),
            finish_reason: self.finish_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Point-in-time copy of a session, safe to hand outside the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: SessionId,
    pub player1: String,
    pub player2: String,
    pub is_bot: bool,
    pub board: Grid,
    pub current_player: u8,
    pub status: Status,
    pub winner: Option<String>,
    pub finish_reason: Option<FinishReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{COLS, ROWS};
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn human_session() -> Session {
        Session::new(SessionId::from("g1"), "alice".into(), "bob".into(), t0())
    }

    #[test]
    fn test_new_session_starts_active_with_a_to_move() {
        let session = human_session();
        assert!(session.is_active());
        assert_eq!(session.turn(), Slot::A);
        assert_eq!(session.result(), None);
        assert_eq!(session.result_label(), None);
        assert_eq!(session.player(Slot::A), "alice");
        assert_eq!(session.player(Slot::B), "bob");
    }

    #[test]
    fn test_turn_alternates_after_each_move() {
        let mut session = human_session();
        let outcome = session.apply_move(Slot::A, 3, t0()).unwrap();
        assert_eq!(outcome.progress, Progress::Continue { next: Slot::B });
        assert_eq!(session.turn(), Slot::B);

        assert_eq!(
            session.apply_move(Slot::A, 3, t0()),
            Err(MoveError::NotYourTurn)
        );

        session.apply_move(Slot::B, 4, t0()).unwrap();
        assert_eq!(session.turn(), Slot::A);
    }

    #[test]
    fn test_winning_move_finishes_session() {
        let mut session = human_session();
        for _ in 0..3 {
            session.apply_move(Slot::A, 3, t0()).unwrap();
            session.apply_move(Slot::B, 4, t0()).unwrap();
        }
        let later = t0() + Duration::seconds(42);
        let outcome = session.apply_move(Slot::A, 3, later).unwrap();
        assert_eq!(outcome.progress, Progress::Won);
        assert_eq!(outcome.mv, Move { slot: Slot::A, column: 3, row: 2 });
        assert_eq!(session.status(), Status::Finished);
        assert_eq!(session.result(), Some(GameResult::PlayerAWins));
        assert_eq!(session.finish_reason(), Some(FinishReason::FourInARow));
        assert_eq!(session.result_label(), Some("alice"));
        assert_eq!(session.duration_secs(), 42);
    }

    #[test]
    fn test_finished_session_rejects_moves_without_mutation() {
        let mut session = human_session();
        for _ in 0..3 {
            session.apply_move(Slot::A, 0, t0()).unwrap();
            session.apply_move(Slot::B, 1, t0()).unwrap();
        }
        session.apply_move(Slot::A, 0, t0()).unwrap();
        let board = *session.board();
        let turn = session.turn();

        for slot in [Slot::A, Slot::B] {
            for col in 0..COLS {
                assert_eq!(
                    session.apply_move(slot, col, t0()),
                    Err(MoveError::Finished)
                );
            }
        }
        assert_eq!(*session.board(), board);
        assert_eq!(session.turn(), turn);
        assert_eq!(session.result(), Some(GameResult::PlayerAWins));
    }

    #[test]
    fn test_full_board_without_line_is_draw() {
        // Column pairs (0,1), (2,3), (4,5) are filled in a pattern whose
        // rows alternate in blocks of two; column 6 finishes the board.
        let mut session = human_session();
        let order: [usize; 42] = [
            0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 0, 1, //
            2, 3, 2, 3, 3, 2, 3, 2, 2, 3, 2, 3, //
            4, 5, 4, 5, 5, 4, 5, 4, 4, 5, 4, 5, //
            6, 6, 6, 6, 6, 6,
        ];
        let mut last = None;
        for (i, &col) in order.iter().enumerate() {
            let slot = if i % 2 == 0 { Slot::A } else { Slot::B };
            let outcome = session.apply_move(slot, col, t0()).unwrap();
            last = Some(outcome.progress);
            if i + 1 < order.len() {
                assert!(
                    matches!(outcome.progress, Progress::Continue { .. }),
                    "unexpected end at move {i}"
                );
            }
        }
        assert_eq!(last, Some(Progress::Draw));
        assert_eq!(session.result(), Some(GameResult::Draw));
        assert_eq!(session.result_label(), Some(DRAW_LABEL));
        assert!(session.board().is_full());
        assert_eq!(session.board().disc_count(), ROWS * COLS);
    }

    #[test]
    fn test_full_column_rejected_without_turn_change() {
        let mut session = human_session();
        for i in 0..ROWS {
            let slot = if i % 2 == 0 { Slot::A } else { Slot::B };
            session.apply_move(slot, 2, t0()).unwrap();
        }
        assert_eq!(
            session.apply_move(Slot::A, 2, t0()),
            Err(MoveError::Board(BoardError::ColumnFull(2)))
        );
        assert_eq!(session.turn(), Slot::A);
    }

    #[test]
    fn test_forfeit_awards_other_player() {
        let mut session = human_session();
        assert!(session.forfeit(Slot::A, t0()));
        assert_eq!(session.result(), Some(GameResult::PlayerBWins));
        assert_eq!(session.result_label(), Some("bob"));
        assert_eq!(session.finish_reason(), Some(FinishReason::Forfeit));
        assert!(!session.forfeit(Slot::B, t0()));
        assert_eq!(session.result(), Some(GameResult::PlayerBWins));
    }

    #[test]
    fn test_bot_session_seats_and_forfeit() {
        let mut session = Session::against_bot(SessionId::from("g2"), "carol".into(), t0());
        assert!(session.is_bot());
        assert_eq!(session.player(Slot::B), BOT_NAME);
        assert_eq!(session.slot_of("carol"), Some(Slot::A));
        assert_eq!(session.slot_of(BOT_NAME), None);
        assert!(session.is_bot_slot(Slot::B));
        assert!(session.forfeit(Slot::A, t0()));
        assert_eq!(session.result_label(), Some(BOT_NAME));
    }

    #[test]
    fn test_view_serializes_camel_case() {
        let mut session = human_session();
        session.apply_move(Slot::A, 0, t0()).unwrap();
        let json = serde_json::to_value(session.view()).unwrap();
        assert_eq!(json["player1"], "alice");
        assert_eq!(json["isBot"], false);
        assert_eq!(json["currentPlayer"], 2);
        assert_eq!(json["status"], "active");
        assert_eq!(json["board"][ROWS - 1][0], 1);
    }
}
