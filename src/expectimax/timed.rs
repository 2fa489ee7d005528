use std::time::Duration;

use rand::rngs::StdRng;
use tracing::debug;

use crate::engine::{Board, Move, SPAWN_FOUR_PROB, SPAWN_TWO_PROB};
use crate::heuristic::heuristic_score;
use crate::ordering::{scored_moves, MoveList};

use super::cache::{NodeKey, TranspositionCache};
use super::timer::SearchTimer;
use super::{
    chance_mean, sample_cells, search_rng, warm_engine_and_heuristics, NodeKind, SearchStats, TimedConfig,
    DEFAULT_MOVE,
};

/// Outcome of one [`TimedExpectimax::search`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchReport {
    /// `None` only when the board has no legal move.
    pub best_move: Option<Move>,
    /// Root value of `best_move` at `completed_depth`. Depth 0 is
    /// `reward + gamma * heuristic(child)`.
    pub value: f64,
    pub completed_depth: u32,
    pub elapsed: Duration,
}

/// Anytime expectimax: deepens one ply at a time until the budget expires.
///
/// The answer from the deepest iteration that finished in time is kept.
/// Before any iteration runs, every legal move is scored at depth 0, so a
/// budget too small for depth 1 still yields a reasoned choice. Each
/// iteration has its own cache, and max nodes try children best first
/// according to [`scored_moves`].
pub struct TimedExpectimax {
    cfg: TimedConfig,
    rng: StdRng,
    stats: SearchStats,
    root_depth: u32,
    reached_horizon: bool,
}

impl Default for TimedExpectimax {
    fn default() -> Self { Self::new() }
}

impl TimedExpectimax {
    pub fn new() -> Self { Self::with_config(TimedConfig::default()) }

    pub fn with_config(cfg: TimedConfig) -> Self {
        warm_engine_and_heuristics();
        Self { rng: search_rng(cfg.seed), cfg, stats: SearchStats::default(), root_depth: 0, reached_horizon: false }
    }

    #[inline]
    pub fn config(&self) -> &TimedConfig { &self.cfg }

    #[inline]
    pub fn last_stats(&self) -> SearchStats { self.stats }

    /// Direction chosen within the budget, or [`DEFAULT_MOVE`] on a stuck board.
    #[inline]
    pub fn select_move(&mut self, board: Board) -> Move { self.search(board).best_move.unwrap_or(DEFAULT_MOVE) }

    pub fn search(&mut self, board: Board) -> SearchReport {
        let timer = SearchTimer::start(self.cfg.budget);
        self.stats = SearchStats::default();

        let ordered = scored_moves(board, &self.cfg.weights);
        let Some(first) = Move::ALL.into_iter().find(|d| ordered.iter().any(|m| m.dir == *d)) else {
            debug!("no legal moves");
            return SearchReport { best_move: None, value: f64::NEG_INFINITY, completed_depth: 0, elapsed: timer.elapsed() };
        };

        // Depth 0 runs regardless of the deadline.
        let mut best_move = first;
        let mut best_value = f64::NEG_INFINITY;
        for m in &ordered {
            let v = m.outcome.reward as f64 + self.cfg.gamma * self.leaf(m.outcome.board);
            if v > best_value {
                best_move = m.dir;
                best_value = v;
            }
        }

        let mut completed_depth = 0;
        for depth in 1u32.. {
            if self.cfg.max_depth.is_some_and(|max| depth > max) || timer.expired() {
                break;
            }
            self.root_depth = depth;
            self.reached_horizon = false;
            let mut cache = TranspositionCache::new();
            let result = self.search_root(&ordered, depth, &mut cache, &timer);
            if timer.expired() {
                debug!(depth, elapsed = ?timer.elapsed(), "deadline hit, discarding unfinished depth");
                break;
            }
            let Some((dir, value)) = result else { break };
            best_move = dir;
            best_value = value;
            completed_depth = depth;
            debug!(depth, %dir, value, nodes = self.stats.nodes, cache_hits = self.stats.cache_hits, "depth complete");
            if !self.reached_horizon {
                debug!(depth, "search tree exhausted");
                break;
            }
        }

        self.stats.completed_depth = completed_depth;
        SearchReport { best_move: Some(best_move), value: best_value, completed_depth, elapsed: timer.elapsed() }
    }

    #[inline]
    fn leaf(&self, board: Board) -> f64 { heuristic_score(board, &self.cfg.weights) }

    #[inline]
    fn ply(&self, depth: u32) -> u32 { self.root_depth.saturating_sub(depth) }

    fn search_root(
        &mut self,
        ordered: &MoveList,
        depth: u32,
        cache: &mut TranspositionCache,
        timer: &SearchTimer,
    ) -> Option<(Move, f64)> {
        let mut best: Option<(Move, f64)> = None;
        for m in ordered {
            if timer.expired() {
                break;
            }
            let v = m.outcome.reward as f64 + self.cfg.gamma * self.chance_value(m.outcome.board, depth - 1, cache, timer);
            if best.map_or(true, |(_, b)| v > b) {
                best = Some((m.dir, v));
            }
        }
        best
    }

    fn max_value(&mut self, board: Board, depth: u32, cache: &mut TranspositionCache, timer: &SearchTimer) -> f64 {
        self.stats.visit(self.ply(depth));
        if depth == 0 {
            self.reached_horizon = true;
            return self.leaf(board);
        }
        if timer.expired() {
            return self.leaf(board);
        }
        let key = NodeKey::new(board, NodeKind::Max, depth);
        if let Some(value) = cache.get(&key) {
            self.stats.cache_hits += 1;
            return value;
        }

        let moves = scored_moves(board, &self.cfg.weights);
        let mut best: Option<f64> = None;
        for m in &moves {
            if timer.expired() {
                break;
            }
            let v = m.outcome.reward as f64 + self.cfg.gamma * self.chance_value(m.outcome.board, depth - 1, cache, timer);
            best = Some(best.map_or(v, |b| b.max(v)));
        }
        let value = match best {
            Some(v) => v,
            None => self.leaf(board),
        };
        cache.insert(key, value);
        self.stats.cache_puts += 1;
        value
    }

    fn chance_value(&mut self, board: Board, depth: u32, cache: &mut TranspositionCache, timer: &SearchTimer) -> f64 {
        self.stats.visit(self.ply(depth));
        if depth == 0 {
            self.reached_horizon = true;
            return self.leaf(board);
        }
        if timer.expired() {
            return self.leaf(board);
        }
        let key = NodeKey::new(board, NodeKind::Chance, depth);
        if let Some(value) = cache.get(&key) {
            self.stats.cache_hits += 1;
            return value;
        }

        let empty = board.empty_cells();
        let value = if empty.is_empty() {
            self.max_value(board, depth, cache, timer)
        } else {
            let cells = sample_cells(&empty, self.cfg.empty_cell_cap, &mut self.rng);
            let mut sum = 0.0;
            for &idx in cells.iter() {
                if timer.expired() {
                    break;
                }
                let idx = idx as usize;
                sum += SPAWN_TWO_PROB * self.max_value(board.with_exponent(idx, 1), depth, cache, timer)
                    + SPAWN_FOUR_PROB * self.max_value(board.with_exponent(idx, 2), depth, cache, timer);
            }
            chance_mean(sum, empty.len(), cells.len())
        };
        cache.insert(key, value);
        self.stats.cache_puts += 1;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectimax::{Expectimax, ExpectimaxConfig};
    use crate::heuristic::HeuristicWeights;

    fn sample_board() -> Board {
        Board::from_rows([[2, 4, 8, 16], [0, 2, 4, 0], [0, 0, 2, 2], [4, 0, 0, 8]]).unwrap()
    }

    fn timed(budget: Duration, max_depth: Option<u32>) -> TimedExpectimax {
        TimedExpectimax::with_config(TimedConfig {
            budget,
            max_depth,
            empty_cell_cap: 0,
            seed: Some(11),
            ..Default::default()
        })
    }

    #[test]
    fn zero_budget_returns_the_depth_zero_choice() {
        let b = sample_board();
        let w = HeuristicWeights::default();
        let mut ex = timed(Duration::ZERO, None);
        let report = ex.search(b);
        assert_eq!(report.completed_depth, 0);
        assert_eq!(ex.last_stats().nodes, 0);

        let (dir, value) = b
            .legal_moves()
            .map(|(d, o)| (d, o.reward as f64 + heuristic_score(o.board, &w)))
            .fold(None::<(Move, f64)>, |acc, (d, v)| match acc {
                Some((_, bv)) if bv >= v => acc,
                _ => Some((d, v)),
            })
            .unwrap();
        assert_eq!(report.best_move, Some(dir));
        assert_eq!(report.value, value);
    }

    #[test]
    fn finished_depths_match_fixed_depth_search() {
        let b = sample_board();
        for depth in 1..=2 {
            let mut ex = timed(Duration::from_secs(60), Some(depth));
            let report = ex.search(b);
            assert_eq!(report.completed_depth, depth);
            assert_eq!(ex.last_stats().completed_depth, depth);

            let mut fixed =
                Expectimax::with_config(ExpectimaxConfig { depth, empty_cell_cap: 0, seed: Some(0), ..Default::default() });
            let best = fixed
                .branch_evals(b)
                .into_iter()
                .filter(|e| e.legal)
                .map(|e| e.ev)
                .fold(f64::NEG_INFINITY, f64::max);
            assert!((report.value - best).abs() < 1e-6 * best.abs(), "depth {depth}: {} vs {best}", report.value);
            assert_eq!(report.best_move, fixed.best_move(b));
        }
    }

    #[test]
    fn max_depth_caps_deepening() {
        let mut ex = timed(Duration::from_secs(60), Some(1));
        let report = ex.search(sample_board());
        assert_eq!(report.completed_depth, 1);
        assert_eq!(ex.last_stats().max_depth_reached, 1);
    }

    #[test]
    fn expiry_mid_depth_keeps_the_last_finished_depth() {
        let b = Board::from_rows([[2, 0, 0, 0], [0, 4, 0, 0], [0; 4], [0, 0, 0, 2]]).unwrap();
        let mut committed = 0;
        for ms in (1..=34).step_by(3) {
            let mut ex = timed(Duration::from_millis(ms), None);
            let report = ex.search(b);
            assert!(report.elapsed >= Duration::from_millis(ms), "{ms} ms: returned before the deadline");
            if report.completed_depth == 0 {
                continue;
            }
            committed += 1;
            let mut fixed = Expectimax::with_config(ExpectimaxConfig {
                depth: report.completed_depth,
                empty_cell_cap: 0,
                seed: Some(0),
                ..Default::default()
            });
            let best = fixed
                .branch_evals(b)
                .into_iter()
                .filter(|e| e.legal)
                .map(|e| e.ev)
                .fold(f64::NEG_INFINITY, f64::max);
            assert!(
                (report.value - best).abs() < 1e-6 * best.abs(),
                "{ms} ms, depth {}: {} vs {best}",
                report.completed_depth,
                report.value
            );
        }
        assert!(committed > 0, "no budget finished depth 1");
    }

    #[test]
    fn short_budget_still_answers() {
        let b = sample_board();
        let mut ex = TimedExpectimax::with_config(TimedConfig {
            budget: Duration::from_millis(5),
            seed: Some(2),
            ..Default::default()
        });
        let report = ex.search(b);
        let dir = report.best_move.expect("legal moves exist");
        assert!(b.apply_move(dir).changed);
        assert!(report.value.is_finite());
    }

    #[test]
    fn stuck_board_defaults_to_up() {
        let over = Board::from_rows([[2, 4, 2, 4], [4, 2, 4, 2], [2, 4, 2, 4], [4, 2, 4, 2]]).unwrap();
        let mut ex = timed(Duration::from_millis(10), None);
        let report = ex.search(over);
        assert_eq!(report.best_move, None);
        assert_eq!(report.completed_depth, 0);
        assert_eq!(ex.select_move(over), Move::Up);
    }
}
