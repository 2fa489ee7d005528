use ai_2048_expectimax::engine::{Board, Move};
use ai_2048_expectimax::heuristic::{self, heuristic_score, value_features, HeuristicWeights};
use ai_2048_expectimax::ordering::scored_moves;
use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use std::hint::black_box;

fn corpus() -> Vec<Board> {
    let mut rng = StdRng::seed_from_u64(1337);
    let mut boards = vec![Board::EMPTY];
    let mut b = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    boards.push(b);
    for i in 0..24 {
        let out = b.apply_move(Move::ALL[i % 4]);
        if out.changed {
            b = out.board.with_random_tile(&mut rng);
        }
        boards.push(b);
    }
    boards
}

fn bench_heuristic(c: &mut Criterion) {
    heuristic::warm();
    let boards = corpus();
    let w = HeuristicWeights::default();
    c.bench_function("heuristic/score", |bch| {
        bch.iter(|| {
            let mut acc = 0f64;
            for &bd in &boards {
                acc = acc.mul_add(1.000_000_1, heuristic_score(bd, &w));
            }
            black_box(acc)
        })
    });
    c.bench_function("heuristic/value_features", |bch| {
        bch.iter(|| {
            let mut acc = 0f64;
            for &bd in &boards {
                acc += value_features(bd)[0];
            }
            black_box(acc)
        })
    });
    c.bench_function("ordering/scored_moves", |bch| {
        bch.iter(|| {
            let mut acc = 0usize;
            for &bd in &boards {
                acc += scored_moves(bd, &w).len();
            }
            black_box(acc)
        })
    });
}

criterion_group!(heuristic_benches, bench_heuristic);
criterion_main!(heuristic_benches);
