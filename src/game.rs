//! Authoritative game state: board, score and the seeded tile-spawn stream.
//!
//! Search code never touches a [`GameState`] directly; it works on detached
//! [`Board`] copies. Only [`GameState::step`] and [`GameState::reset`] advance
//! the game, and they are the only consumers of the spawn RNG, so two states
//! built from the same seed and fed the same moves stay bit-for-bit identical.

use std::fmt;

use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use tracing::trace;

use crate::engine::{Board, Move, MoveOutcome};

/// Flags describing what a [`GameState::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepInfo {
    pub changed: bool,
    /// The requested move did not change the board; nothing was applied.
    pub invalid: bool,
}

/// Result of a single [`GameState::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    #[serde(serialize_with = "serialize_board")]
    pub board: Board,
    pub reward: u64,
    pub done: bool,
    pub info: StepInfo,
}

fn serialize_board<S: serde::Serializer>(board: &Board, s: S) -> Result<S::Ok, S::Error> {
    board.to_rows().serialize(s)
}

#[derive(Clone)]
pub struct GameState {
    board: Board,
    score: u64,
    seed: Option<u64>,
    rng: StdRng,
}

impl GameState {
    /// Start a new game with two spawned tiles. `None` draws the spawn
    /// stream from OS entropy.
    ///
    /// ```
    /// use ai_2048_expectimax::engine::Move;
    /// use ai_2048_expectimax::game::GameState;
    ///
    /// let mut game = GameState::new(Some(42));
    /// assert_eq!(game.board().count_empty(), 14);
    /// let legal = game.legal_moves();
    /// let out = game.step(legal[0]);
    /// assert!(out.info.changed && !out.info.invalid);
    /// ```
    pub fn new(seed: Option<u64>) -> Self {
        let mut game = GameState { board: Board::EMPTY, score: 0, seed, rng: make_rng(seed) };
        game.spawn_initial_tiles();
        game
    }

    /// Wrap an existing position, e.g. one loaded by an external harness.
    /// The score starts at 0.
    pub fn from_board(board: Board, seed: Option<u64>) -> Self {
        GameState { board, score: 0, seed, rng: make_rng(seed) }
    }

    /// Clear the board and score and spawn two fresh tiles.
    ///
    /// `Some(seed)` restarts the spawn stream from that seed; `None` keeps
    /// drawing from the current stream.
    pub fn reset(&mut self, seed: Option<u64>) -> Board {
        if let Some(seed) = seed {
            self.seed = Some(seed);
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.board = Board::EMPTY;
        self.score = 0;
        self.spawn_initial_tiles();
        self.board
    }

    /// Replace the board without touching the score or the spawn stream.
    pub fn set_board(&mut self, board: Board) { self.board = board; }

    #[inline]
    pub fn board(&self) -> Board { self.board }

    #[inline]
    pub fn score(&self) -> u64 { self.score }

    #[inline]
    pub fn seed(&self) -> Option<u64> { self.seed }

    #[inline]
    pub fn max_tile(&self) -> u32 { self.board.highest_tile() }

    /// Directions that change the board, in `UP, DOWN, LEFT, RIGHT` order.
    pub fn legal_moves(&self) -> Vec<Move> { self.board.legal_moves().map(|(dir, _)| dir).collect() }

    /// What `dir` would do to the current board, without spawning or scoring.
    #[inline]
    pub fn peek(&self, dir: Move) -> MoveOutcome { self.board.apply_move(dir) }

    #[inline]
    pub fn is_game_over(&self) -> bool { self.board.is_game_over() }

    /// Apply `dir`, add its reward to the score and spawn one tile.
    ///
    /// A move that does not change the board is reported through
    /// `info.invalid` and leaves the state untouched.
    pub fn step(&mut self, dir: Move) -> StepOutcome {
        let outcome = self.board.apply_move(dir);
        if !outcome.changed {
            return StepOutcome {
                board: self.board,
                reward: 0,
                done: self.is_game_over(),
                info: StepInfo { changed: false, invalid: true },
            };
        }

        self.score += outcome.reward;
        self.board = outcome.board.with_random_tile(&mut self.rng);
        trace!(%dir, reward = outcome.reward, board = ?self.board, "step");
        StepOutcome {
            board: self.board,
            reward: outcome.reward,
            done: self.is_game_over(),
            info: StepInfo { changed: true, invalid: false },
        }
    }

    fn spawn_initial_tiles(&mut self) {
        self.board = self.board.with_random_tile(&mut self.rng).with_random_tile(&mut self.rng);
    }
}

impl fmt::Debug for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameState")
            .field("board", &self.board)
            .field("score", &self.score)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.board)?;
        writeln!(f, "Score: {}", self.score)
    }
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard() -> Board {
        Board::from_rows([[2, 4, 2, 4], [4, 2, 4, 2], [2, 4, 2, 4], [4, 2, 4, 2]]).unwrap()
    }

    #[test]
    fn new_game_has_two_small_tiles() {
        for seed in 0..50 {
            let game = GameState::new(Some(seed));
            let b = game.board();
            assert_eq!(b.count_empty(), 14);
            assert!((0..16).all(|idx| matches!(b.tile_value(idx), 0 | 2 | 4)));
            assert_eq!(game.score(), 0);
            assert!(!game.is_game_over());
        }
    }

    #[test]
    fn same_seed_same_moves_same_game() {
        let mut a = GameState::new(Some(7));
        let mut b = GameState::new(Some(7));
        assert_eq!(a.board(), b.board());
        for i in 0..300 {
            let dir = Move::ALL[i % 4];
            let oa = a.step(dir);
            let ob = b.step(dir);
            assert_eq!(oa, ob);
            assert_eq!(a.board(), b.board());
            assert_eq!(a.score(), b.score());
        }
    }

    #[test]
    fn reset_with_seed_replays_the_stream() {
        let mut game = GameState::new(Some(3));
        let first = game.board();
        game.step(Move::Left);
        game.step(Move::Up);
        assert_eq!(game.reset(Some(3)), first);
        assert_eq!(game.score(), 0);
        assert_eq!(game.seed(), Some(3));
    }

    #[test]
    fn legal_step_scores_and_spawns_once() {
        let start = Board::from_rows([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]).unwrap();
        let mut game = GameState::from_board(start, Some(1));
        let out = game.step(Move::Left);
        assert_eq!(out.reward, 4);
        assert_eq!(game.score(), 4);
        assert!(out.info.changed && !out.info.invalid);
        assert!(!out.done);
        // the merged 4 plus exactly one spawned tile
        assert_eq!(game.board().count_empty(), 14);
        assert_eq!(game.board().cell(0, 0), 4);
        assert_eq!(out.board, game.board());
    }

    #[test]
    fn invalid_step_leaves_state_untouched() {
        let start = Board::from_rows([[2, 0, 0, 0], [0; 4], [0; 4], [0; 4]]).unwrap();
        let mut game = GameState::from_board(start, Some(1));
        let out = game.step(Move::Left);
        assert!(out.info.invalid && !out.info.changed);
        assert_eq!(out.reward, 0);
        assert!(!out.done);
        assert_eq!(game.board(), start);
        assert_eq!(game.legal_moves(), vec![Move::Down, Move::Right]);
    }

    #[test]
    fn terminal_board_reports_done_and_invalid() {
        let mut game = GameState::from_board(checkerboard(), Some(0));
        assert!(game.is_game_over());
        assert!(game.legal_moves().is_empty());
        for dir in Move::ALL {
            let out = game.step(dir);
            assert!(out.done);
            assert!(out.info.invalid);
            assert_eq!(out.reward, 0);
        }
        assert_eq!(game.board(), checkerboard());
    }

    #[test]
    fn score_never_decreases() {
        let mut game = GameState::new(Some(99));
        let mut last = 0;
        let mut i = 0;
        while !game.is_game_over() && i < 2_000 {
            let legal = game.legal_moves();
            game.step(legal[i % legal.len()]);
            assert!(game.score() >= last);
            last = game.score();
            i += 1;
        }
        assert!(game.max_tile() >= 4);
    }
}
