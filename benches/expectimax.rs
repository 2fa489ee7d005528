use std::time::Duration;

use ai_2048_expectimax::agent::{Agent, GreedyAgent};
use ai_2048_expectimax::engine::{Board, Move};
use ai_2048_expectimax::evaluate::evaluate_parallel;
use ai_2048_expectimax::expectimax::{Expectimax, ExpectimaxConfig, TimedConfig, TimedExpectimax};
use ai_2048_expectimax::game::GameState;
use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use rayon::ThreadPoolBuilder;
use std::hint::black_box;

fn corpus() -> Vec<Board> {
    let mut rng = StdRng::seed_from_u64(4242);
    let mut b = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    let mut boards = vec![b];
    for i in 0..64 {
        let out = b.apply_move(Move::ALL[i % 4]);
        if out.changed {
            b = out.board.with_random_tile(&mut rng);
        }
        boards.push(b);
    }
    boards
}

fn bench_depth_limited(c: &mut Criterion) {
    let boards = corpus();
    let mut ex = Expectimax::with_config(ExpectimaxConfig { depth: 2, seed: Some(1), ..Default::default() });

    c.bench_function("expectimax/branch_evals_d2", |bch| {
        bch.iter(|| {
            let mut acc = 0.0;
            for &bd in &boards {
                for be in ex.branch_evals(bd) {
                    if be.legal {
                        acc += be.ev;
                    }
                }
            }
            black_box(acc)
        })
    });

    c.bench_function("expectimax/best_move_d2", |bch| {
        bch.iter(|| {
            let mut acc = 0usize;
            for &bd in &boards {
                acc ^= ex.best_move(bd).map_or(0, |m| m.index());
            }
            black_box(acc)
        })
    });
}

fn bench_timed(c: &mut Criterion) {
    let boards = corpus();
    // Fixed depth keeps the measurement independent of the machine.
    let mut ex = TimedExpectimax::with_config(TimedConfig {
        budget: Duration::from_secs(10),
        max_depth: Some(2),
        seed: Some(1),
        ..Default::default()
    });
    c.bench_function("timed/search_to_depth_2", |bch| {
        bch.iter(|| {
            let mut acc = 0.0;
            for &bd in &boards {
                acc += ex.search(bd).value;
            }
            black_box(acc)
        })
    });
}

fn bench_e2e(c: &mut Criterion) {
    let mut ex = Expectimax::with_config(ExpectimaxConfig { depth: 2, seed: Some(7), ..Default::default() });
    c.bench_function("e2e/32_moves_d2", |bch| {
        bch.iter(|| {
            let mut game = GameState::new(Some(7));
            let mut steps = 0;
            while steps < 32 && !game.is_game_over() {
                let dir = ex.select_action(&game);
                game.step(dir);
                steps += 1;
            }
            black_box((game.board().raw(), steps))
        })
    });
}

fn bench_parallel_eval(c: &mut Criterion) {
    // Pin a small pool for stability
    let pool = ThreadPoolBuilder::new().num_threads(4).build().expect("thread pool");
    c.bench_function("evaluate/greedy_parallel_8", |bch| {
        bch.iter(|| pool.install(|| black_box(evaluate_parallel(|| GreedyAgent, 8, 3, None).avg_score)))
    });
}

criterion_group!(expectimax_benches, bench_depth_limited, bench_timed, bench_e2e, bench_parallel_eval);
criterion_main!(expectimax_benches);
