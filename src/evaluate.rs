//! Game loop and batch statistics for comparing agents.

use std::collections::BTreeMap;
use std::fmt;

use indicatif::ProgressBar;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::agent::Agent;
use crate::engine::Move;
use crate::expectimax::{Expectimax, ExpectimaxConfig};
use crate::game::{GameState, StepOutcome};
use crate::heuristic::{HeuristicWeights, WeightKey};

/// Tile that counts a game as won.
pub const WIN_TILE: u32 = 2048;

/// Upper bound (exclusive) of the per-game seeds drawn by [`game_seeds`].
const SEED_RANGE: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GameResult {
    pub seed: u64,
    pub score: u64,
    pub max_tile: u32,
    pub moves: u32,
}

/// Aggregate over a batch of games.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalSummary {
    pub agent: String,
    pub games: usize,
    pub avg_score: f64,
    pub median_score: f64,
    pub best_score: u64,
    pub win_rate_2048: f64,
    pub avg_moves: f64,
    /// Final highest tile -> number of games.
    pub best_tile_hist: BTreeMap<u32, usize>,
}

impl EvalSummary {
    pub fn from_results(agent: &str, results: &[GameResult]) -> Self {
        let games = results.len();
        let n = games.max(1) as f64;
        let mut scores: Vec<u64> = results.iter().map(|r| r.score).collect();
        scores.sort_unstable();
        let median_score = match games {
            0 => 0.0,
            g if g % 2 == 1 => scores[g / 2] as f64,
            g => (scores[g / 2 - 1] + scores[g / 2]) as f64 / 2.0,
        };
        let mut best_tile_hist = BTreeMap::new();
        for r in results {
            *best_tile_hist.entry(r.max_tile).or_insert(0) += 1;
        }
        EvalSummary {
            agent: agent.to_string(),
            games,
            avg_score: scores.iter().sum::<u64>() as f64 / n,
            median_score,
            best_score: scores.last().copied().unwrap_or(0),
            win_rate_2048: results.iter().filter(|r| r.max_tile >= WIN_TILE).count() as f64 / n,
            avg_moves: results.iter().map(|r| r.moves as f64).sum::<f64>() / n,
            best_tile_hist,
        }
    }
}

impl fmt::Display for EvalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} ===", self.agent)?;
        writeln!(f, "Games:          {}", self.games)?;
        writeln!(f, "Avg score:      {:.1}", self.avg_score)?;
        writeln!(f, "Median score:   {:.1}", self.median_score)?;
        writeln!(f, "Best score:     {}", self.best_score)?;
        writeln!(f, "Win rate 2048:  {:.2}%", self.win_rate_2048 * 100.0)?;
        writeln!(f, "Avg moves:      {:.1}", self.avg_moves)?;
        write!(f, "Best tile hist: {:?}", self.best_tile_hist)
    }
}

/// Play one game to completion from `seed`.
pub fn play_one_game<A: Agent + ?Sized>(agent: &mut A, seed: u64) -> GameResult {
    play_game_with(agent, seed, |_, _, _| {})
}

/// [`play_one_game`] with a callback after every applied move.
///
/// The game also stops if the agent picks a move that does not change the
/// board, since replaying it would loop forever.
pub fn play_game_with<A, F>(agent: &mut A, seed: u64, mut on_step: F) -> GameResult
where
    A: Agent + ?Sized,
    F: FnMut(&GameState, Move, &StepOutcome),
{
    let mut game = GameState::new(Some(seed));
    let mut moves = 0u32;
    while !game.is_game_over() {
        let dir = agent.select_action(&game);
        let out = game.step(dir);
        if out.info.invalid {
            warn!(agent = agent.name(), %dir, seed, moves, "agent chose a move that does not change the board");
            break;
        }
        moves += 1;
        on_step(&game, dir, &out);
        if out.done {
            break;
        }
    }
    GameResult { seed, score: game.score(), max_tile: game.max_tile(), moves }
}

/// Per-game seeds for a batch, derived from one master seed.
pub fn game_seeds(n_games: usize, seed: u64) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n_games).map(|_| rng.gen_range(0..SEED_RANGE)).collect()
}

/// Play every seed in order with one agent instance.
pub fn run_games<A: Agent + ?Sized>(agent: &mut A, seeds: &[u64], progress: Option<&ProgressBar>) -> Vec<GameResult> {
    let mut results = Vec::with_capacity(seeds.len());
    for &seed in seeds {
        let result = play_one_game(&mut *agent, seed);
        info!(agent = agent.name(), seed, score = result.score, max_tile = result.max_tile, "game finished");
        if let Some(pb) = progress {
            pb.inc(1);
        }
        results.push(result);
    }
    results
}

/// Evaluate `agent` over `n_games` games seeded from `seed`.
pub fn evaluate_agent<A: Agent + ?Sized>(
    agent: &mut A,
    n_games: usize,
    seed: u64,
    progress: Option<&ProgressBar>,
) -> EvalSummary {
    let results = run_games(agent, &game_seeds(n_games, seed), progress);
    EvalSummary::from_results(agent.name(), &results)
}

/// Like [`evaluate_agent`], with games spread over the rayon pool.
///
/// Each game gets a fresh agent from `make_agent`, so agents never share
/// caches or RNGs across threads. For deterministic agents the summary is
/// identical to the sequential one.
pub fn evaluate_parallel<A, F>(make_agent: F, n_games: usize, seed: u64, progress: Option<&ProgressBar>) -> EvalSummary
where
    A: Agent,
    F: Fn() -> A + Sync,
{
    let name = make_agent().name().to_string();
    let results: Vec<GameResult> = game_seeds(n_games, seed)
        .par_iter()
        .map(|&s| {
            let mut agent = make_agent();
            let result = play_one_game(&mut agent, s);
            if let Some(pb) = progress {
                pb.inc(1);
            }
            result
        })
        .collect();
    EvalSummary::from_results(&name, &results)
}

/// One labelled row of an ablation table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AblationRun {
    pub label: String,
    #[serde(flatten)]
    pub summary: EvalSummary,
}

impl fmt::Display for AblationRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.summary;
        write!(
            f,
            "{}: avg={:.1}, median={:.1}, best={}, win2048={:.2}",
            self.label, s.avg_score, s.median_score, s.best_score, s.win_rate_2048
        )
    }
}

fn ablation_run(label: String, cfg: ExpectimaxConfig, n_games: usize, seed: u64) -> AblationRun {
    let mut agent = Expectimax::with_config(cfg);
    let summary = evaluate_agent(&mut agent, n_games, seed, None);
    info!(label = %label, avg_score = summary.avg_score, "ablation run finished");
    AblationRun { label, summary }
}

/// Fixed-depth expectimax once per entry of `depths`; every other knob comes from `base`.
pub fn depth_ablation(base: &ExpectimaxConfig, depths: &[u32], n_games: usize, seed: u64) -> Vec<AblationRun> {
    depths
        .iter()
        .map(|&depth| ablation_run(format!("depth {depth}"), ExpectimaxConfig { depth, ..*base }, n_games, seed))
        .collect()
}

/// Expectimax scored by a single heuristic feature at a time, each at its
/// default weight, in [`WeightKey::ALL`] order.
pub fn heuristic_ablation(base: &ExpectimaxConfig, n_games: usize, seed: u64) -> Vec<AblationRun> {
    WeightKey::ALL
        .iter()
        .map(|&key| {
            let cfg = ExpectimaxConfig { weights: HeuristicWeights::only(key), ..*base };
            ablation_run(format!("{key}_only"), cfg, n_games, seed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{GreedyAgent, RandomAgent};

    fn result(score: u64, max_tile: u32) -> GameResult { GameResult { seed: 0, score, max_tile, moves: 10 } }

    #[test]
    fn summary_statistics() {
        let results = [result(100, 256), result(300, 2048), result(200, 512), result(1000, 4096)];
        let s = EvalSummary::from_results("test", &results);
        assert_eq!(s.games, 4);
        assert_eq!(s.avg_score, 400.0);
        assert_eq!(s.median_score, 250.0);
        assert_eq!(s.best_score, 1000);
        assert_eq!(s.win_rate_2048, 0.5);
        assert_eq!(s.avg_moves, 10.0);
        assert_eq!(s.best_tile_hist.get(&2048), Some(&1));
        assert_eq!(s.best_tile_hist.len(), 4);

        let odd = EvalSummary::from_results("test", &results[..3]);
        assert_eq!(odd.median_score, 200.0);
    }

    #[test]
    fn empty_batch_is_all_zero() {
        let s = EvalSummary::from_results("none", &[]);
        assert_eq!(s.games, 0);
        assert_eq!(s.avg_score, 0.0);
        assert_eq!(s.median_score, 0.0);
        assert_eq!(s.best_score, 0);
        assert!(s.best_tile_hist.is_empty());
    }

    #[test]
    fn seeds_are_reproducible() {
        let a = game_seeds(20, 7);
        assert_eq!(a, game_seeds(20, 7));
        assert_ne!(a, game_seeds(20, 8));
        assert!(a.iter().all(|&s| s < SEED_RANGE));
    }

    #[test]
    fn a_game_runs_to_the_end() {
        let mut greedy = GreedyAgent;
        let r = play_one_game(&mut greedy, 42);
        assert!(r.moves > 0);
        assert!(r.score > 0);
        assert!(r.max_tile >= 8);
        assert_eq!(play_one_game(&mut greedy, 42), r);
    }

    #[test]
    fn callback_sees_every_move() {
        let mut agent = RandomAgent::new(Some(3));
        let mut seen = 0u32;
        let mut score = 0u64;
        let r = play_game_with(&mut agent, 9, |game, _, out| {
            seen += 1;
            score += out.reward;
            assert_eq!(game.score(), score);
        });
        assert_eq!(seen, r.moves);
        assert_eq!(score, r.score);
    }

    #[test]
    fn parallel_matches_sequential_for_deterministic_agents() {
        let sequential = evaluate_agent(&mut GreedyAgent, 6, 5, None);
        let parallel = evaluate_parallel(|| GreedyAgent, 6, 5, None);
        assert_eq!(sequential, parallel);
        assert_eq!(parallel.agent, "greedy");
        let json = serde_json::to_string(&parallel).unwrap();
        assert!(json.contains("\"win_rate_2048\""));
    }

    fn ablation_base() -> ExpectimaxConfig {
        ExpectimaxConfig { depth: 1, empty_cell_cap: 4, seed: Some(3), ..Default::default() }
    }

    #[test]
    fn depth_ablation_runs_each_depth() {
        let runs = depth_ablation(&ablation_base(), &[1, 2], 1, 10);
        let labels: Vec<&str> = runs.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["depth 1", "depth 2"]);

        let mut depth_one = Expectimax::with_config(ablation_base());
        assert_eq!(runs[0].summary, evaluate_agent(&mut depth_one, 1, 10, None));
        assert_eq!(runs[1].summary.games, 1);
        assert!(runs[1].to_string().starts_with("depth 2: avg="));
    }

    #[test]
    fn heuristic_ablation_isolates_each_feature() {
        let runs = heuristic_ablation(&ablation_base(), 1, 5);
        let labels: Vec<&str> = runs.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["empty_only", "mono_only", "smooth_only", "corner_only", "pos_only"]);

        let mut corner = Expectimax::with_config(ExpectimaxConfig {
            weights: HeuristicWeights::only(WeightKey::Corner),
            ..ablation_base()
        });
        assert_eq!(runs[3].summary, evaluate_agent(&mut corner, 1, 5, None));

        let json = serde_json::to_string(&runs[0]).unwrap();
        assert!(json.contains("\"label\":\"empty_only\""));
        assert!(json.contains("\"avg_score\""));
    }
}
