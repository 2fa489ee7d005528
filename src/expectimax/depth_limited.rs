use rand::rngs::StdRng;
use tracing::trace;

use crate::engine::{Board, Move, MoveOutcome, SPAWN_FOUR_PROB, SPAWN_TWO_PROB};
use crate::heuristic::heuristic_score;

use super::cache::{NodeKey, TranspositionCache};
use super::{
    chance_mean, sample_cells, search_rng, warm_engine_and_heuristics, BranchEval, ExpectimaxConfig, NodeKind,
    SearchStats, DEFAULT_MOVE,
};

/// Fixed-depth expectimax search.
///
/// `depth` counts player moves: the root max node searches `depth` moves
/// ahead, each chance node hands its spawned boards to max nodes at the same
/// depth, and every max node below the root spends one unit. The
/// transposition cache lives for exactly one call.
pub struct Expectimax {
    cfg: ExpectimaxConfig,
    rng: StdRng,
    cache: TranspositionCache,
    stats: SearchStats,
    root_depth: u32,
}

impl Default for Expectimax {
    fn default() -> Self { Self::new() }
}

impl Expectimax {
    pub fn new() -> Self { Self::with_config(ExpectimaxConfig::default()) }

    pub fn with_config(cfg: ExpectimaxConfig) -> Self {
        warm_engine_and_heuristics();
        Self {
            rng: search_rng(cfg.seed),
            cfg,
            cache: TranspositionCache::new(),
            stats: SearchStats::default(),
            root_depth: cfg.depth,
        }
    }

    #[inline]
    pub fn config(&self) -> &ExpectimaxConfig { &self.cfg }

    /// Best direction for `board`, or `None` when no move changes it.
    ///
    /// Ties go to the first direction in `UP, DOWN, LEFT, RIGHT` order.
    ///
    /// Example
    /// ```
    /// use ai_2048_expectimax::engine::Board;
    /// use ai_2048_expectimax::expectimax::{Expectimax, ExpectimaxConfig};
    /// use rand::{SeedableRng, rngs::StdRng};
    /// let mut rng = StdRng::seed_from_u64(7);
    /// let b = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    /// let mut ex = Expectimax::with_config(ExpectimaxConfig { depth: 2, seed: Some(7), ..Default::default() });
    /// assert!(ex.best_move(b).is_some());
    /// ```
    pub fn best_move(&mut self, board: Board) -> Option<Move> {
        self.begin_search();
        let mut best: Option<(Move, f64)> = None;
        for (dir, outcome) in board.legal_moves() {
            let value = self.root_branch(outcome);
            if best.map_or(true, |(_, v)| value > v) {
                best = Some((dir, value));
            }
        }
        trace!(?best, nodes = self.stats.nodes, cache_puts = self.stats.cache_puts, "expectimax selection");
        best.map(|(dir, _)| dir)
    }

    /// [`Self::best_move`], falling back to [`DEFAULT_MOVE`] on a stuck board.
    #[inline]
    pub fn select_move(&mut self, board: Board) -> Move { self.best_move(board).unwrap_or(DEFAULT_MOVE) }

    /// Value of each root branch in `[Up, Down, Left, Right]` order.
    /// Illegal moves are marked `legal=false` with `ev = 0`.
    ///
    /// Example
    /// ```
    /// use ai_2048_expectimax::engine::Board;
    /// use ai_2048_expectimax::expectimax::{BranchEval, Expectimax};
    /// let b = Board::from_rows([[2, 0, 0, 0], [0; 4], [0; 4], [0; 4]]).unwrap();
    /// let mut ex = Expectimax::new();
    /// let branches: [BranchEval; 4] = ex.branch_evals(b);
    /// assert_eq!(branches.iter().filter(|e| e.legal).count(), 2);
    /// ```
    pub fn branch_evals(&mut self, board: Board) -> [BranchEval; 4] {
        self.begin_search();
        Move::ALL.map(|dir| {
            let outcome = board.apply_move(dir);
            if outcome.changed {
                BranchEval { dir, ev: self.root_branch(outcome), legal: true }
            } else {
                BranchEval { dir, ev: 0.0, legal: false }
            }
        })
    }

    /// Value of `board` as a max node at the configured depth.
    pub fn state_value(&mut self, board: Board) -> f64 {
        self.begin_search();
        self.max_value(board, self.cfg.depth)
    }

    /// Statistics collected from the last call to [`Self::best_move`],
    /// [`Self::branch_evals`] or [`Self::state_value`].
    #[inline]
    pub fn last_stats(&self) -> SearchStats { self.stats }

    fn begin_search(&mut self) {
        self.cache.clear();
        self.stats = SearchStats::default();
        self.root_depth = self.cfg.depth;
    }

    #[inline]
    fn leaf(&self, board: Board) -> f64 { heuristic_score(board, &self.cfg.weights) }

    #[inline]
    fn ply(&self, depth: u32) -> u32 { self.root_depth.saturating_sub(depth) }

    fn root_branch(&mut self, outcome: MoveOutcome) -> f64 {
        let depth = self.cfg.depth.saturating_sub(1);
        outcome.reward as f64 + self.cfg.gamma * self.chance_value(outcome.board, depth)
    }

    fn max_value(&mut self, board: Board, depth: u32) -> f64 {
        self.stats.visit(self.ply(depth));
        let key = NodeKey::new(board, NodeKind::Max, depth);
        if let Some(value) = self.cache.get(&key) {
            self.stats.cache_hits += 1;
            return value;
        }

        let value = if depth == 0 {
            self.leaf(board)
        } else {
            let mut best: Option<f64> = None;
            for (_, outcome) in board.legal_moves() {
                let v = outcome.reward as f64 + self.cfg.gamma * self.chance_value(outcome.board, depth - 1);
                best = Some(best.map_or(v, |b| b.max(v)));
            }
            match best {
                Some(v) => v,
                None => self.leaf(board),
            }
        };
        self.store(key, value)
    }

    fn chance_value(&mut self, board: Board, depth: u32) -> f64 {
        self.stats.visit(self.ply(depth));
        let key = NodeKey::new(board, NodeKind::Chance, depth);
        if let Some(value) = self.cache.get(&key) {
            self.stats.cache_hits += 1;
            return value;
        }

        let value = if depth == 0 {
            self.leaf(board)
        } else {
            let empty = board.empty_cells();
            if empty.is_empty() {
                self.max_value(board, depth)
            } else {
                let cells = sample_cells(&empty, self.cfg.empty_cell_cap, &mut self.rng);
                let mut sum = 0.0;
                for &idx in cells.iter() {
                    let idx = idx as usize;
                    sum += SPAWN_TWO_PROB * self.max_value(board.with_exponent(idx, 1), depth)
                        + SPAWN_FOUR_PROB * self.max_value(board.with_exponent(idx, 2), depth);
                }
                chance_mean(sum, empty.len(), cells.len())
            }
        };
        self.store(key, value)
    }

    #[inline]
    fn store(&mut self, key: NodeKey, value: f64) -> f64 {
        self.cache.insert(key, value);
        self.stats.cache_puts += 1;
        value
    }
}
