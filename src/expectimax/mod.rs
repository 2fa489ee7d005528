//! Expectimax search policies for 2048.
//!
//! This module provides two policy implementations:
//! - [`Expectimax`]: fixed-depth expectimax with one transposition cache per
//!   move selection.
//! - [`TimedExpectimax`]: iterative deepening under a wall-clock budget, with
//!   a fresh cache per depth and move ordering at every max node.
//!
//! Both alternate max nodes (the player picks a direction) and chance nodes
//! (a 2 or 4 spawns in an empty cell) and score leaves with
//! [`heuristic_score`](crate::heuristic::heuristic_score). Chance nodes with
//! more empty cells than `empty_cell_cap` evaluate a random subset drawn
//! from the searcher's own seedable RNG.
//!
//! Quick start
//! ```
//! use std::time::Duration;
//! use ai_2048_expectimax::expectimax::{Expectimax, ExpectimaxConfig, TimedConfig, TimedExpectimax};
//! use ai_2048_expectimax::game::GameState;
//!
//! let game = GameState::new(Some(123));
//!
//! let mut fixed = Expectimax::with_config(ExpectimaxConfig { depth: 2, seed: Some(1), ..Default::default() });
//! assert!(fixed.best_move(game.board()).is_some());
//!
//! let mut timed = TimedExpectimax::with_config(TimedConfig {
//!     budget: Duration::from_millis(20),
//!     seed: Some(1),
//!     ..Default::default()
//! });
//! let report = timed.search(game.board());
//! assert!(report.best_move.is_some());
//! ```

use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::engine::{self, CellList, Move};
use crate::heuristic::{self, HeuristicWeights};

mod cache;
mod depth_limited;
mod timed;
mod timer;

pub use depth_limited::Expectimax;
pub use timed::{SearchReport, TimedExpectimax};
pub use timer::SearchTimer;

/// Direction returned when a board has no legal move.
pub const DEFAULT_MOVE: Move = Move::Up;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum NodeKind {
    Max,
    Chance,
}

/// Knobs for the fixed-depth [`Expectimax`].
///
/// - `depth`: number of player moves searched from the root.
/// - `empty_cell_cap`: chance nodes with more empty cells sample this many
///   (0 disables sampling).
/// - `gamma`: discount applied to the value after each move.
/// - `seed`: seed for the sampling RNG (`None` draws from entropy).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpectimaxConfig {
    pub depth: u32,
    pub empty_cell_cap: usize,
    pub gamma: f64,
    pub seed: Option<u64>,
    pub weights: HeuristicWeights,
}

impl Default for ExpectimaxConfig {
    fn default() -> Self {
        Self { depth: 3, empty_cell_cap: 6, gamma: 1.0, seed: None, weights: HeuristicWeights::default() }
    }
}

/// Knobs for the anytime [`TimedExpectimax`].
///
/// `max_depth` stops deepening early even if time remains; `None` deepens
/// until the budget runs out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimedConfig {
    pub budget: Duration,
    pub empty_cell_cap: usize,
    pub gamma: f64,
    pub seed: Option<u64>,
    pub max_depth: Option<u32>,
    pub weights: HeuristicWeights,
}

impl Default for TimedConfig {
    fn default() -> Self {
        Self {
            budget: Duration::from_millis(50),
            empty_cell_cap: 8,
            gamma: 1.0,
            seed: None,
            max_depth: None,
            weights: HeuristicWeights::default(),
        }
    }
}

/// Per-branch expected value at the root.
///
/// - `ev` is the value of taking `dir` from the current board (reward included).
/// - `legal` is false when the move is a no-op for the current board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchEval {
    pub dir: Move,
    pub ev: f64,
    pub legal: bool,
}

/// Counters for a single move selection. Reset at the start of every call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub nodes: u64,
    /// Deepest ply (player moves below the root) any node was visited at.
    pub max_depth_reached: u32,
    pub cache_hits: u64,
    pub cache_puts: u64,
    /// Deepest iteration that finished before the deadline (timed search only).
    pub completed_depth: u32,
}

impl SearchStats {
    #[inline]
    pub(crate) fn visit(&mut self, ply: u32) {
        self.nodes += 1;
        self.max_depth_reached = self.max_depth_reached.max(ply);
    }
}

/// Constructors call this so the first search does not pay for table setup.
fn warm_engine_and_heuristics() {
    engine::warm();
    heuristic::warm();
}

fn search_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Cells a chance node expands: all of `empty`, or `cap` of them chosen
/// uniformly without replacement when there are more than `cap`.
pub(crate) fn sample_cells<R: Rng + ?Sized>(empty: &CellList, cap: usize, rng: &mut R) -> CellList {
    if cap == 0 || empty.len() <= cap {
        return *empty;
    }
    let mut sampled = CellList::new();
    for i in rand::seq::index::sample(rng, empty.len(), cap).iter() {
        sampled.push(empty[i]);
    }
    sampled
}

/// Expected value of a chance node from the spawn-weighted branch sum.
///
/// The sum is rescaled by `empty_count / sampled` and then averaged over
/// `empty_count` cells, which makes a sampled node the mean of its sample.
/// When a deadline cuts the branch loop short, the sum still covers fewer
/// cells than `sampled`; the rescale is applied unchanged.
#[inline]
pub(crate) fn chance_mean(sum: f64, empty_count: usize, sampled: usize) -> f64 {
    if sampled == 0 {
        return 0.0;
    }
    let scaled = sum * (empty_count as f64 / sampled as f64);
    scaled / empty_count as f64
}
