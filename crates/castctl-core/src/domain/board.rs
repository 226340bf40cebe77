//! Local copy of the tic-tac-toe board and move selection.
//!
//! The receiver application owns the authoritative board.  The game client
//! keeps a copy that it seeds from the `board_layout_response` event and
//! updates from each `moved` event, so it can pick a legal move without a
//! round-trip.
//!
//! # Move selection
//!
//! [`Board::choose_move`] is a uniform random choice over the cells that are
//! currently empty.  Only the distribution is specified; two runs over the
//! same board may pick different cells.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of rows and columns.
pub const SIDE: usize = 3;

/// Total number of cells.
pub const CELLS: usize = SIDE * SIDE;

/// Errors raised while building or updating a board.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BoardError {
    /// A layout did not contain exactly [`CELLS`] entries.
    #[error("board layout must have {CELLS} cells, got {0}")]
    WrongSize(usize),
    /// A layout entry was not 0 (empty), 1 (X) or 2 (O).
    #[error("invalid cell value {value} at index {index}")]
    InvalidCell { index: usize, value: u8 },
    /// A row or column was outside `0..3`.
    #[error("cell ({row}, {column}) is outside the board")]
    OutOfRange { row: usize, column: usize },
}

/// The two player tokens.  `X` always moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    X,
    O,
}

impl Player {
    /// `true` for the token that makes the opening move.
    pub fn moves_first(self) -> bool {
        self == Player::X
    }
}

/// A board position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub row: usize,
    pub column: usize,
}

impl Cell {
    /// Validates `row` and `column`.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::OutOfRange`] if either coordinate is 3 or more.
    pub fn new(row: usize, column: usize) -> Result<Self, BoardError> {
        if row >= SIDE || column >= SIDE {
            return Err(BoardError::OutOfRange { row, column });
        }
        Ok(Self { row, column })
    }

    fn from_index(index: usize) -> Self {
        Self {
            row: index / SIDE,
            column: index % SIDE,
        }
    }

    pub fn index(self) -> usize {
        self.row * SIDE + self.column
    }
}

/// A 3×3 board, row-major.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Board {
    cells: [Option<Player>; CELLS],
}

impl Board {
    /// An empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a board from the receiver's layout encoding
    /// (`0` empty, `1` X, `2` O; row-major).
    ///
    /// # Errors
    ///
    /// Returns [`BoardError`] if the layout has the wrong length or an
    /// unknown cell value.
    pub fn from_layout(layout: &[u8]) -> Result<Self, BoardError> {
        if layout.len() != CELLS {
            return Err(BoardError::WrongSize(layout.len()));
        }
        let mut board = Board::new();
        for (index, &value) in layout.iter().enumerate() {
            board.cells[index] = match value {
                0 => None,
                1 => Some(Player::X),
                2 => Some(Player::O),
                _ => return Err(BoardError::InvalidCell { index, value }),
            };
        }
        Ok(board)
    }

    pub fn get(&self, cell: Cell) -> Option<Player> {
        self.cells[cell.index()]
    }

    /// Records `player` at `cell`, overwriting whatever was there.
    ///
    /// The receiver is authoritative, so a reported move is applied as-is.
    pub fn set(&mut self, cell: Cell, player: Player) {
        self.cells[cell.index()] = Some(player);
    }

    /// Every empty cell, in row-major order.
    pub fn unoccupied(&self) -> Vec<Cell> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_none())
            .map(|(i, _)| Cell::from_index(i))
            .collect()
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Picks an empty cell uniformly at random.
    ///
    /// Returns `None` when the board is full; callers must not send a move
    /// in that case.
    pub fn choose_move<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Cell> {
        self.unoccupied().choose(rng).copied()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
