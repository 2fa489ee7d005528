//! Move-selection policies behind one trait.
//!
//! [`Expectimax`] and [`TimedExpectimax`] implement [`Agent`] directly; the
//! two baselines here exist to put their scores in context.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::engine::{Board, Move};
use crate::expectimax::{Expectimax, TimedExpectimax};
use crate::game::GameState;

/// A policy that picks the next direction for a game.
pub trait Agent {
    fn select_action(&mut self, state: &GameState) -> Move;

    fn name(&self) -> &str;
}

impl<A: Agent + ?Sized> Agent for Box<A> {
    fn select_action(&mut self, state: &GameState) -> Move { (**self).select_action(state) }

    fn name(&self) -> &str { (**self).name() }
}

impl Agent for Expectimax {
    fn select_action(&mut self, state: &GameState) -> Move { self.select_move(state.board()) }

    fn name(&self) -> &str { "expectimax" }
}

impl Agent for TimedExpectimax {
    fn select_action(&mut self, state: &GameState) -> Move { self.select_move(state.board()) }

    fn name(&self) -> &str { "timed-expectimax" }
}

/// Uniformly random legal move; `Left` when stuck.
pub struct RandomAgent {
    rng: StdRng,
}

impl RandomAgent {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        RandomAgent { rng }
    }
}

impl Agent for RandomAgent {
    fn select_action(&mut self, state: &GameState) -> Move {
        state.legal_moves().choose(&mut self.rng).copied().unwrap_or(Move::Left)
    }

    fn name(&self) -> &str { "random" }
}

/// One-ply greedy policy.
///
/// Ranks legal moves by `(merge reward, empty cells, largest tile in a
/// corner)` compared lexicographically on the resulting board; the first
/// direction wins ties. `Left` when stuck.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyAgent;

impl GreedyAgent {
    fn rank(board: Board, reward: u64) -> (u64, u32, bool) {
        let top = board.highest_tile();
        let cornered = [0, 3, 12, 15].iter().any(|&i| board.tile_value(i) == top);
        (reward, board.count_empty(), cornered)
    }
}

impl Agent for GreedyAgent {
    fn select_action(&mut self, state: &GameState) -> Move {
        let mut best: Option<(Move, (u64, u32, bool))> = None;
        for (dir, outcome) in state.board().legal_moves() {
            let key = Self::rank(outcome.board, outcome.reward);
            if best.map_or(true, |(_, k)| key > k) {
                best = Some((dir, key));
            }
        }
        best.map_or(Move::Left, |(dir, _)| dir)
    }

    fn name(&self) -> &str { "greedy" }
}
