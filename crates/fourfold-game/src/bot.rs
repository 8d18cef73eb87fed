//! Automated opponent: a single-ply heuristic move selector.
//!
//! Every valid column is scored independently, then the strictly highest
//! score wins with ties going to the leftmost column. There is no lookahead
//! and no randomness, so the same board always yields the same column.

use crate::board::{Board, COLS, Slot};

/// Display name used for the automated opponent in sessions and results.
pub const BOT_NAME: &str = "Bot";

/// Score for a move that wins immediately.
pub const WIN_SCORE: i32 = 10_000;
/// Score for a move that occupies the opponent's immediate winning cell.
pub const BLOCK_SCORE: i32 = 9_000;

const CENTER_WEIGHT: i32 = 10;
const OWN_ADJACENT_WEIGHT: i32 = 50;
const OTHER_ADJACENT_WEIGHT: i32 = 40;

/// Pick the column the bot plays for `me` against `other`.
///
/// Returns `None` when the board has no valid column.
pub fn select_move(board: &Board, me: Slot, other: Slot) -> Option<usize> {
    let mut best: Option<(usize, i32)> = None;
    for column in board.valid_moves() {
        let Some(score) = score_move(board, column, me, other) else {
            continue;
        };
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((column, score));
        }
    }
    best.map(|(column, _)| column)
}

/// Score a single candidate column, or `None` if it cannot take a disc.
pub fn score_move(board: &Board, column: usize, me: Slot, other: Slot) -> Option<i32> {
    let mut mine = board.snapshot();
    let row = mine.drop(column, me).ok()?;
    if mine.check_win(row, column, me) {
        return Some(WIN_SCORE);
    }

    let mut theirs = board.snapshot();
    if let Ok(their_row) = theirs.drop(column, other)
        && theirs.check_win(their_row, column, other)
    {
        return Some(BLOCK_SCORE);
    }

    Some(positional_score(&mine, row, column, me, other))
}

/// Centre bias plus neighbouring discs of both players around the landing
/// cell, measured on the board after `me` has dropped.
fn positional_score(board: &Board, row: usize, column: usize, me: Slot, other: Slot) -> i32 {
    let cols = COLS as i32;
    let center_distance = (column as i32 - cols / 2).abs();
    let own = board.adjacent_count(row, column, me) as i32;
    let theirs = board.adjacent_count(row, column, other) as i32;
    (cols - center_distance) * CENTER_WEIGHT
        + own * OWN_ADJACENT_WEIGHT
        + theirs * OTHER_ADJACENT_WEIGHT
}
