use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::OnceLock;

/// A direction to move/merge tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Move {
    Up,
    Down,
    Left,
    Right,
}

impl Move {
    /// All four directions, in the order used to break ties.
    pub const ALL: [Move; 4] = [Move::Up, Move::Down, Move::Left, Move::Right];

    /// Position of this direction in [`Move::ALL`].
    #[inline]
    pub fn index(self) -> usize { self as usize }

    pub fn name(self) -> &'static str {
        match self {
            Move::Up => "UP",
            Move::Down => "DOWN",
            Move::Left => "LEFT",
            Move::Right => "RIGHT",
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoveParseError {
    #[error("direction code {0} out of range (expected 0..=3)")]
    Code(u8),
    #[error("unrecognized direction {0:?}")]
    Name(String),
}

impl TryFrom<u8> for Move {
    type Error = MoveParseError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Move::Up),
            1 => Ok(Move::Down),
            2 => Ok(Move::Left),
            3 => Ok(Move::Right),
            other => Err(MoveParseError::Code(other)),
        }
    }
}

impl FromStr for Move {
    type Err = MoveParseError;

    /// Accepts full names and WASD keys, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "w" => Ok(Move::Up),
            "down" | "s" => Ok(Move::Down),
            "left" | "a" => Ok(Move::Left),
            "right" | "d" => Ok(Move::Right),
            _ => Err(MoveParseError::Name(s.to_string())),
        }
    }
}

const LINE_TABLE_SIZE: usize = 0x1_0000; // 65,536 possible 16-bit lines

/// Largest exponent a 4-bit cell can hold (2^15 = 32768), so the largest
/// tile this board can represent. The game rules themselves have no cap;
/// here two 32768 tiles stay side by side instead of merging.
pub const MAX_EXPONENT: u8 = 15;

/// Probability that a spawned tile is a 2.
pub const SPAWN_TWO_PROB: f64 = 0.9;
/// Probability that a spawned tile is a 4.
pub const SPAWN_FOUR_PROB: f64 = 0.1;

type BoardRaw = u64;
type Line = u64;
type Score = u64;

struct Stores {
    shift_left: Box<[u64]>,
    shift_right: Box<[u64]>,
    shift_up: Box<[u64]>,
    shift_down: Box<[u64]>,
    // Merge reward does not depend on the direction a line is compacted in.
    reward: Box<[u32]>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("cell ({row}, {col}) holds {value}, expected 0 or a power of two in 2..=32768")]
    InvalidTile { row: usize, col: usize, value: u32 },
}

/// Packed 4x4 2048 board as 16 4-bit exponents in a `u64`.
///
/// Cell 0 (top-left) lives in the highest nibble; cells run row-major. An
/// exponent of 0 is an empty cell, `e > 0` is the tile `2^e`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Board(BoardRaw);

/// Result of sliding a board in one direction, before any tile spawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub board: Board,
    /// Sum of the tiles created by merges in this move.
    pub reward: u64,
    /// False when the move leaves every cell untouched, i.e. it is not legal.
    pub changed: bool,
}

impl Board {
    /// A constant empty board (all zeros).
    pub const EMPTY: Board = Board(0);

    /// Construct a `Board` from its raw packed representation.
    #[inline]
    pub fn from_raw(raw: BoardRaw) -> Self { Board(raw) }

    /// Consume this `Board`, returning the raw packed `u64`.
    #[inline]
    pub fn into_raw(self) -> BoardRaw { self.0 }

    /// Borrow the raw packed `u64` for this `Board`.
    #[inline]
    pub fn raw(&self) -> BoardRaw { self.0 }

    /// Build a board from tile values laid out as rows.
    ///
    /// ```
    /// use ai_2048_expectimax::engine::{Board, Move};
    /// let b = Board::from_rows([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]).unwrap();
    /// let out = b.apply_move(Move::Left);
    /// assert_eq!(out.board.to_rows()[0], [4, 0, 0, 0]);
    /// assert_eq!(out.reward, 4);
    /// assert!(out.changed);
    /// ```
    pub fn from_rows(rows: [[u32; 4]; 4]) -> Result<Self, BoardError> {
        let mut board = Board::EMPTY;
        for (row, cells) in rows.iter().enumerate() {
            for (col, &value) in cells.iter().enumerate() {
                let exp = exponent_of(value).ok_or(BoardError::InvalidTile { row, col, value })?;
                board = board.with_exponent(row * 4 + col, exp);
            }
        }
        Ok(board)
    }

    /// Tile values laid out as rows (0 for empty cells).
    pub fn to_rows(self) -> [[u32; 4]; 4] {
        let mut rows = [[0u32; 4]; 4];
        for (idx, cell) in rows.iter_mut().flatten().enumerate() {
            *cell = self.tile_value(idx);
        }
        rows
    }

    /// Slide and merge in `dir`, reporting the reward and whether anything moved.
    #[inline]
    pub fn apply_move(self, dir: Move) -> MoveOutcome {
        let s = stores();
        let (board, reward) = match dir {
            Move::Left => shift_rows(self, &s.shift_left, &s.reward),
            Move::Right => shift_rows(self, &s.shift_right, &s.reward),
            Move::Up => shift_cols(self, &s.shift_up, &s.reward),
            Move::Down => shift_cols(self, &s.shift_down, &s.reward),
        };
        MoveOutcome { board, reward, changed: board != self }
    }

    /// Return the board resulting from sliding/merging tiles in `dir` (no random insert).
    #[inline]
    pub fn shift(self, dir: Move) -> Self { self.apply_move(dir).board }

    /// Directions that change this board, with their outcomes, in [`Move::ALL`] order.
    pub fn legal_moves(self) -> impl Iterator<Item = (Move, MoveOutcome)> {
        Move::ALL
            .into_iter()
            .map(move |dir| (dir, self.apply_move(dir)))
            .filter(|(_, outcome)| outcome.changed)
    }

    /// Insert a random 2 (90%) or 4 (10%) tile into a uniformly random empty cell.
    ///
    /// A full board is returned unchanged.
    ///
    /// ```
    /// use ai_2048_expectimax::engine::Board;
    /// use rand::{SeedableRng, rngs::StdRng};
    /// let mut rng = StdRng::seed_from_u64(123);
    /// let b = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    /// assert_eq!(b.count_empty(), 14);
    /// ```
    pub fn with_random_tile<R: Rng + ?Sized>(self, rng: &mut R) -> Self {
        let empty = self.empty_cells();
        if empty.is_empty() {
            return self;
        }
        let idx = empty[rng.gen_range(0..empty.len())];
        self.with_exponent(idx as usize, generate_random_tile(rng))
    }

    /// True iff the board is full and no direction changes it.
    #[inline]
    pub fn is_game_over(self) -> bool {
        self.count_empty() == 0 && Move::ALL.iter().all(|&dir| !self.apply_move(dir).changed)
    }

    /// Return the highest tile value (e.g., 2048) present on the board, 0 when empty.
    pub fn highest_tile(self) -> u32 {
        let max_exp = (0..16).map(|idx| self.exponent(idx)).max().unwrap_or(0);
        exponent_value(max_exp)
    }

    /// Count the number of empty cells on the board.
    #[inline]
    pub fn count_empty(self) -> u32 { 16 - count_non_empty(self) }

    /// Indices (row-major, 0..16) of the empty cells.
    pub fn empty_cells(self) -> CellList {
        let mut cells = CellList::new();
        for idx in 0..16 {
            if self.exponent(idx) == 0 {
                cells.push(idx as u8);
            }
        }
        cells
    }

    /// Raw exponent stored at `idx` (row-major, 0..16).
    #[inline]
    pub fn exponent(self, idx: usize) -> u8 { ((self.0 >> (60 - 4 * idx)) & 0xf) as u8 }

    /// Tile value at `idx` (row-major, 0..16), 0 when empty.
    #[inline]
    pub fn tile_value(self, idx: usize) -> u32 { exponent_value(self.exponent(idx)) }

    /// Tile value at (`row`, `col`), 0 when empty.
    #[inline]
    pub fn cell(self, row: usize, col: usize) -> u32 { self.tile_value(row * 4 + col) }

    /// Copy of this board with the cell at `idx` set to exponent `exp`.
    #[inline]
    pub fn with_exponent(self, idx: usize, exp: u8) -> Self {
        let shift = 60 - 4 * idx;
        Board((self.0 & !(0xf << shift)) | (((exp & 0xf) as u64) << shift))
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Board({:#018x})", self.0)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "+------+------+------+------+")?;
        for row in self.to_rows() {
            for value in row {
                if value == 0 {
                    write!(f, "|      ")?;
                } else {
                    write!(f, "|{:>6}", value)?;
                }
            }
            writeln!(f, "|")?;
            writeln!(f, "+------+------+------+------+")?;
        }
        Ok(())
    }
}

impl From<BoardRaw> for Board { fn from(v: BoardRaw) -> Self { Board::from_raw(v) } }
impl From<Board> for BoardRaw { fn from(b: Board) -> Self { b.into_raw() } }

/// Fixed-capacity list of cell indices, so chance nodes can enumerate
/// empty cells without allocating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellList {
    cells: [u8; 16],
    len: usize,
}

impl CellList {
    pub(crate) fn new() -> Self { CellList { cells: [0; 16], len: 0 } }

    #[inline]
    pub(crate) fn push(&mut self, idx: u8) {
        self.cells[self.len] = idx;
        self.len += 1;
    }
}

impl Deref for CellList {
    type Target = [u8];

    fn deref(&self) -> &[u8] { &self.cells[..self.len] }
}

/// Slide/merge `board` in `dir`. Free-function form of [`Board::apply_move`].
#[inline]
pub fn apply_move(board: Board, dir: Move) -> MoveOutcome { board.apply_move(dir) }

/// Build the line lookup tables now instead of on first use. Safe to call multiple times.
pub fn warm() {
    let _ = stores();
}

static STORES: OnceLock<Stores> = OnceLock::new();

#[inline(always)]
fn stores() -> &'static Stores { STORES.get_or_init(create_stores) }

fn create_stores() -> Stores {
    // Allocate on the heap to avoid large stack frames
    let mut shift_left = vec![0u64; LINE_TABLE_SIZE];
    let mut shift_right = vec![0u64; LINE_TABLE_SIZE];
    let mut shift_up = vec![0u64; LINE_TABLE_SIZE];
    let mut shift_down = vec![0u64; LINE_TABLE_SIZE];
    let mut reward = vec![0u32; LINE_TABLE_SIZE];

    for val in 0..LINE_TABLE_SIZE {
        let tiles = line_tiles(val as Line);
        let (forward, gain) = slide_line(tiles);
        let backward = slide_line_reversed(tiles);
        shift_left[val] = tiles_to_row(forward);
        shift_right[val] = tiles_to_row(backward);
        shift_up[val] = tiles_to_col(forward);
        shift_down[val] = tiles_to_col(backward);
        reward[val] = gain as u32;
    }

    Stores {
        shift_left: shift_left.into_boxed_slice(),
        shift_right: shift_right.into_boxed_slice(),
        shift_up: shift_up.into_boxed_slice(),
        shift_down: shift_down.into_boxed_slice(),
        reward: reward.into_boxed_slice(),
    }
}

/// Compact a line towards index 0, merging the first equal adjacent pair
/// of each run. Returns the new line and the merge reward.
pub(crate) fn slide_line(tiles: [u8; 4]) -> ([u8; 4], Score) {
    let mut out = [0u8; 4];
    let mut len = 0;
    let mut reward = 0;
    // Last placed tile, while it is still allowed to absorb its neighbour.
    let mut open: Option<u8> = None;
    for tile in tiles.into_iter().filter(|&t| t != 0) {
        match open {
            Some(prev) if prev == tile && tile < MAX_EXPONENT => {
                out[len - 1] = tile + 1;
                reward += 1u64 << (tile + 1);
                open = None;
            }
            _ => {
                out[len] = tile;
                len += 1;
                open = Some(tile);
            }
        }
    }
    (out, reward)
}

fn slide_line_reversed(tiles: [u8; 4]) -> [u8; 4] {
    let [a, b, c, d] = tiles;
    let ([w, x, y, z], _) = slide_line([d, c, b, a]);
    [z, y, x, w]
}

fn tiles_to_row(tiles: [u8; 4]) -> Line {
    let [a, b, c, d] = tiles.map(Line::from);
    a << 12 | b << 8 | c << 4 | d
}

fn tiles_to_col(tiles: [u8; 4]) -> Line {
    let [a, b, c, d] = tiles.map(Line::from);
    a << 48 | b << 32 | c << 16 | d
}

pub(crate) fn line_tiles(line: Line) -> [u8; 4] {
    [0, 1, 2, 3].map(|tile_idx| ((line >> ((3 - tile_idx) * 4)) & 0xf) as u8)
}

fn shift_rows(board: Board, table: &[u64], rewards: &[u32]) -> (Board, Score) {
    let (raw, reward) = (0..4).fold((0, 0), |(raw, reward), row_idx| {
        let row = extract_line(board.0, row_idx) as usize;
        (raw | (table[row] << (48 - 16 * row_idx)), reward + rewards[row] as Score)
    });
    (Board(raw), reward)
}

fn shift_cols(board: Board, table: &[u64], rewards: &[u32]) -> (Board, Score) {
    let transposed = transpose(board.0);
    let (raw, reward) = (0..4).fold((0, 0), |(raw, reward), col_idx| {
        let col = extract_line(transposed, col_idx) as usize;
        (raw | (table[col] << (12 - 4 * col_idx)), reward + rewards[col] as Score)
    });
    (Board(raw), reward)
}

// Credit to Nneonneo
pub(crate) fn transpose(x: BoardRaw) -> BoardRaw {
    let a1 = x & 0xF0F00F0FF0F00F0F;
    let a2 = x & 0x0000F0F00000F0F0;
    let a3 = x & 0x0F0F00000F0F0000;
    let a = a1 | (a2 << 12) | (a3 >> 12);
    let b1 = a & 0xFF00FF0000FF00FF;
    let b2 = a & 0x00FF00FF00000000;
    let b3 = a & 0x00000000FF00FF00;
    b1 | (b2 >> 24) | (b3 << 24)
}

/// Row `line_idx` of a raw board (or column, on a transposed board), top/left tile first.
#[inline]
pub(crate) fn extract_line(board: BoardRaw, line_idx: u64) -> Line {
    (board >> ((3 - line_idx) * 16)) & 0xffff
}

#[inline]
pub(crate) fn exponent_value(exp: u8) -> u32 {
    if exp == 0 { 0 } else { 1 << exp }
}

fn exponent_of(value: u32) -> Option<u8> {
    match value {
        0 => Some(0),
        v if v >= 2 && v.is_power_of_two() && v.trailing_zeros() <= MAX_EXPONENT as u32 => {
            Some(v.trailing_zeros() as u8)
        }
        _ => None,
    }
}

fn generate_random_tile<R: Rng + ?Sized>(rng: &mut R) -> u8 { if rng.gen_range(0..10) < 9 { 1 } else { 2 } }

// https://stackoverflow.com/questions/38225571/count-number-of-zero-nibbles-in-an-unsigned-64-bit-integer
fn count_non_empty(board: Board) -> u32 {
    let mut board_copy = board.0;
    board_copy |= board_copy >> 1;
    board_copy |= board_copy >> 2;
    board_copy &= 0x1111111111111111;
    board_copy.count_ones()
}
