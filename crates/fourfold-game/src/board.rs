//! The 6×7 playing grid: gravity-drop placement and four-in-a-row detection.
//!
//! Row 0 is the top of the board and row [`ROWS`]` - 1` the bottom. Discs only
//! enter through [`Board::drop`], so the occupied cells of every column stay
//! contiguous from the bottom row upward.

use serde::{Deserialize, Serialize};

/// Number of rows on the board.
pub const ROWS: usize = 6;
/// Number of columns on the board.
pub const COLS: usize = 7;
/// Length of a winning line.
pub const WIN_LENGTH: usize = 4;

/// The four axes through a cell: horizontal, vertical, and both diagonals.
/// Each is walked in both directions.
pub const AXES: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

// ---------------------------------------------------------------------------
// Slot / Cell
// ---------------------------------------------------------------------------

/// One of the two player seats in a session. Slot A always moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    /// The opposing seat.
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    /// Numeric code used on the wire (`1` for A, `2` for B).
    pub fn code(self) -> u8 {
        match self {
            Slot::A => 1,
            Slot::B => 2,
        }
    }

    fn cell(self) -> Cell {
        match self {
            Slot::A => Cell::A,
            Slot::B => Cell::B,
        }
    }
}

/// State of a single grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Empty,
    A,
    B,
}

impl Cell {
    /// Numeric code used on the wire (`0` empty, `1` A, `2` B).
    pub fn code(self) -> u8 {
        match self {
            Cell::Empty => 0,
            Cell::A => 1,
            Cell::B => 2,
        }
    }
}

/// Wire representation of the board: one numeric code per cell, top row first.
pub type Grid = [[u8; COLS]; ROWS];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a drop can be refused. The board is never mutated on error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// The column index is not on the board.
    #[error("column {0} is out of range")]
    ColumnOutOfRange(usize),
    /// The column has no empty cell left.
    #[error("column {0} is full")]
    ColumnFull(usize),
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// Fixed-size game board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Board {
    cells: [[Cell; COLS]; ROWS],
}

impl Board {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell at `(row, col)`, or `None` when off the board.
    pub fn get(&self, row: usize, col: usize) -> Option<Cell> {
        self.cells.get(row).and_then(|r| r.get(col)).copied()
    }

    /// True iff `column` is on the board and its top cell is empty.
    pub fn can_drop(&self, column: usize) -> bool {
        column < COLS && self.cells[0][column] == Cell::Empty
    }

    /// Drop a disc for `slot` into `column` and return the landing row.
    pub fn drop(&mut self, column: usize, slot: Slot) -> Result<usize, BoardError> {
        if column >= COLS {
            return Err(BoardError::ColumnOutOfRange(column));
        }
        let row = (0..ROWS)
            .rev()
            .find(|&row| self.cells[row][column] == Cell::Empty)
            .ok_or(BoardError::ColumnFull(column))?;
        self.cells[row][column] = slot.cell();
        Ok(row)
    }

    /// True iff a line of at least [`WIN_LENGTH`] discs of `slot` passes
    /// through `(row, column)`.
    ///
    /// Only lines through the given cell are inspected; callers pass the
    /// most recently placed disc.
    pub fn check_win(&self, row: usize, column: usize, slot: Slot) -> bool {
        if self.get(row, column) != Some(slot.cell()) {
            return false;
        }
        AXES.iter().any(|&(dr, dc)| {
            1 + self.run_length(row, column, slot, dr, dc)
                + self.run_length(row, column, slot, -dr, -dc)
                >= WIN_LENGTH
        })
    }

    /// Number of contiguous `slot` discs extending outward from
    /// `(row, column)` along all four axes in both directions. The cell
    /// itself is not counted.
    pub fn adjacent_count(&self, row: usize, column: usize, slot: Slot) -> usize {
        AXES.iter()
            .map(|&(dr, dc)| {
                self.run_length(row, column, slot, dr, dc)
                    + self.run_length(row, column, slot, -dr, -dc)
            })
            .sum()
    }

    /// True iff every column's top cell is occupied.
    pub fn is_full(&self) -> bool {
        (0..COLS).all(|col| !self.can_drop(col))
    }

    /// Columns that still accept a disc, ascending.
    pub fn valid_moves(&self) -> Vec<usize> {
        (0..COLS).filter(|&col| self.can_drop(col)).collect()
    }

    /// Independent copy for speculative evaluation.
    pub fn snapshot(&self) -> Board {
        *self
    }

    /// Number of discs on the board.
    pub fn disc_count(&self) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|&&cell| cell != Cell::Empty)
            .count()
    }

    /// Numeric grid for serialization.
    pub fn grid(&self) -> Grid {
        let mut grid = [[0u8; COLS]; ROWS];
        for (row, cells) in self.cells.iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                grid[row][col] = cell.code();
            }
        }
        grid
    }

    /// Count `slot` discs starting one step away from `(row, column)` in
    /// direction `(dr, dc)` until the first non-matching cell or the edge.
    fn run_length(&self, row: usize, column: usize, slot: Slot, dr: isize, dc: isize) -> usize {
        let target = slot.cell();
        let mut count = 0;
        let mut r = row as isize + dr;
        let mut c = column as isize + dc;
        while r >= 0 && c >= 0 && self.get(r as usize, c as usize) == Some(target) {
            count += 1;
            r += dr;
            c += dc;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a board by dropping `(column, slot)` pairs in order.
    fn board_from(moves: &[(usize, Slot)]) -> Board {
        let mut board = Board::new();
        for &(col, slot) in moves {
            board.drop(col, slot).unwrap();
        }
        board
    }

    #[test]
    fn test_new_board_is_empty() {
        let board = Board::new();
        assert_eq!(board.disc_count(), 0);
        assert_eq!(board.valid_moves(), vec![0, 1, 2, 3, 4, 5, 6]);
        assert!(!board.is_full());
    }

    #[test]
    fn test_drop_lands_on_bottom_then_stacks() {
        let mut board = Board::new();
        assert_eq!(board.drop(3, Slot::A), Ok(5));
        assert_eq!(board.drop(3, Slot::B), Ok(4));
        assert_eq!(board.get(5, 3), Some(Cell::A));
        assert_eq!(board.get(4, 3), Some(Cell::B));
    }

    #[test]
    fn test_drop_into_full_column_fails_without_mutation() {
        let mut board = Board::new();
        for i in 0..ROWS {
            let slot = if i % 2 == 0 { Slot::A } else { Slot::B };
            board.drop(0, slot).unwrap();
        }
        let before = board;
        assert!(!board.can_drop(0));
        assert_eq!(board.drop(0, Slot::A), Err(BoardError::ColumnFull(0)));
        assert_eq!(board, before);
    }

    #[test]
    fn test_drop_out_of_range_fails() {
        let mut board = Board::new();
        assert_eq!(
            board.drop(COLS, Slot::A),
            Err(BoardError::ColumnOutOfRange(COLS))
        );
        assert!(!board.can_drop(COLS));
        assert_eq!(board.disc_count(), 0);
    }

    #[test]
    fn test_gravity_invariant_holds() {
        let board = board_from(&[(2, Slot::A), (2, Slot::B), (5, Slot::A), (2, Slot::A)]);
        for col in 0..COLS {
            let mut seen_disc = false;
            for row in 0..ROWS {
                let occupied = board.get(row, col) != Some(Cell::Empty);
                if seen_disc {
                    assert!(occupied, "gap below a disc at ({row}, {col})");
                }
                seen_disc |= occupied;
            }
        }
    }

    #[test]
    fn test_horizontal_win_at_every_offset() {
        for start in 0..=COLS - WIN_LENGTH {
            let mut board = Board::new();
            for col in start..start + WIN_LENGTH {
                board.drop(col, Slot::A).unwrap();
            }
            for col in start..start + WIN_LENGTH {
                assert!(board.check_win(ROWS - 1, col, Slot::A), "start {start}, col {col}");
            }
        }
    }

    #[test]
    fn test_three_in_a_row_is_not_a_win() {
        let board = board_from(&[(0, Slot::A), (1, Slot::A), (2, Slot::A)]);
        for col in 0..3 {
            assert!(!board.check_win(ROWS - 1, col, Slot::A));
        }
    }

    #[test]
    fn test_vertical_win_in_edge_and_centre_columns() {
        for col in [0, 3, COLS - 1] {
            let mut board = Board::new();
            let mut last = 0;
            for _ in 0..WIN_LENGTH {
                last = board.drop(col, Slot::B).unwrap();
            }
            assert_eq!(last, ROWS - WIN_LENGTH);
            assert!(board.check_win(last, col, Slot::B));
            assert!(!board.check_win(last, col, Slot::A));
        }
    }

    #[test]
    fn test_vertical_win_at_top_of_column() {
        let mut board = board_from(&[(6, Slot::A), (6, Slot::A)]);
        let mut last = 0;
        for _ in 0..WIN_LENGTH {
            last = board.drop(6, Slot::B).unwrap();
        }
        assert_eq!(last, 0);
        assert!(board.check_win(0, 6, Slot::B));
    }

    #[test]
    fn test_rising_diagonal_win_from_bottom_left_corner() {
        // Staircase: column c needs c filler discs before the winning disc.
        let mut board = Board::new();
        for col in 0..WIN_LENGTH {
            for _ in 0..col {
                board.drop(col, Slot::B).unwrap();
            }
        }
        let mut cells = Vec::new();
        for col in 0..WIN_LENGTH {
            cells.push((board.drop(col, Slot::A).unwrap(), col));
        }
        for &(row, col) in &cells {
            assert!(board.check_win(row, col, Slot::A), "({row}, {col})");
        }
    }

    #[test]
    fn test_falling_diagonal_win_at_right_edge() {
        // Mirror staircase ending in the bottom-right corner.
        let mut board = Board::new();
        let cols: Vec<usize> = (COLS - WIN_LENGTH..COLS).collect();
        for (i, &col) in cols.iter().enumerate() {
            for _ in 0..(WIN_LENGTH - 1 - i) {
                board.drop(col, Slot::A).unwrap();
            }
        }
        let mut cells = Vec::new();
        for &col in &cols {
            cells.push((board.drop(col, Slot::B).unwrap(), col));
        }
        assert_eq!(cells.last(), Some(&(ROWS - 1, COLS - 1)));
        for &(row, col) in &cells {
            assert!(board.check_win(row, col, Slot::B), "({row}, {col})");
        }
    }

    #[test]
    fn test_diagonal_win_through_centre_from_middle_disc() {
        // Rising diagonal in columns 2..=5, completed by the disc at column 3.
        let mut board = Board::new();
        for (col, fillers) in [(2usize, 0usize), (3, 1), (4, 2), (5, 3)] {
            for _ in 0..fillers {
                board.drop(col, Slot::B).unwrap();
            }
        }
        board.drop(2, Slot::A).unwrap();
        board.drop(4, Slot::A).unwrap();
        board.drop(5, Slot::A).unwrap();
        let row = board.drop(3, Slot::A).unwrap();
        assert_eq!(row, ROWS - 2);
        assert!(board.check_win(row, 3, Slot::A));
    }

    #[test]
    fn test_broken_line_is_not_a_win() {
        let board = board_from(&[(0, Slot::A), (1, Slot::A), (2, Slot::B), (3, Slot::A), (4, Slot::A)]);
        assert!(!board.check_win(ROWS - 1, 4, Slot::A));
        assert!(!board.check_win(ROWS - 1, 0, Slot::A));
    }

    #[test]
    fn test_check_win_rejects_foreign_or_empty_cell() {
        let board = board_from(&[(0, Slot::A), (1, Slot::A), (2, Slot::A), (3, Slot::A)]);
        assert!(!board.check_win(ROWS - 1, 0, Slot::B));
        assert!(!board.check_win(0, 0, Slot::A));
        assert!(!board.check_win(ROWS, 0, Slot::A));
        assert!(!board.check_win(0, COLS, Slot::A));
    }

    #[test]
    fn test_full_board_detection() {
        let mut board = Board::new();
        for col in 0..COLS {
            for row in 0..ROWS {
                let slot = if (row / 2 + col) % 2 == 0 { Slot::A } else { Slot::B };
                board.drop(col, slot).unwrap();
            }
        }
        assert!(board.is_full());
        assert!(board.valid_moves().is_empty());
        assert_eq!(board.disc_count(), ROWS * COLS);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let board = board_from(&[(3, Slot::A)]);
        let mut copy = board.snapshot();
        copy.drop(3, Slot::B).unwrap();
        assert_eq!(board.disc_count(), 1);
        assert_eq!(copy.disc_count(), 2);
    }

    #[test]
    fn test_adjacent_count_is_uncapped_and_bidirectional() {
        // A A _ A A on the bottom row: landing in column 2 touches four discs.
        let mut board = board_from(&[(0, Slot::A), (1, Slot::A), (3, Slot::A), (4, Slot::A)]);
        let row = board.drop(2, Slot::B).unwrap();
        assert_eq!(board.adjacent_count(row, 2, Slot::A), 4);
        assert_eq!(board.adjacent_count(row, 2, Slot::B), 0);
    }

    #[test]
    fn test_grid_codes() {
        let board = board_from(&[(0, Slot::A), (6, Slot::B)]);
        let grid = board.grid();
        assert_eq!(grid[ROWS - 1][0], 1);
        assert_eq!(grid[ROWS - 1][6], 2);
        assert_eq!(grid[0][0], 0);
    }
}
