use ai_2048_expectimax::engine::{self, Board, Move};
use ai_2048_expectimax::game::GameState;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use std::hint::black_box;

fn corpus() -> Vec<Board> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut boards = vec![Board::EMPTY];
    let mut b = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    boards.push(b);
    for i in 0..20 {
        let out = b.apply_move(Move::ALL[i % 4]);
        if out.changed {
            b = out.board.with_random_tile(&mut rng);
        }
        boards.push(b);
    }
    boards
}

fn bench_apply_move(c: &mut Criterion) {
    engine::warm();
    let boards = corpus();
    for dir in Move::ALL {
        c.bench_function(&format!("apply_move/{}", dir.name().to_lowercase()), |bch| {
            bch.iter(|| {
                let mut acc = 0u64;
                for &bd in &boards {
                    let out = bd.apply_move(dir);
                    acc ^= out.board.raw().wrapping_add(out.reward);
                }
                black_box(acc)
            })
        });
    }
}

fn bench_queries(c: &mut Criterion) {
    engine::warm();
    let boards = corpus();
    c.bench_function("query/legal_moves", |bch| {
        bch.iter(|| {
            let mut acc = 0usize;
            for &bd in &boards {
                acc += bd.legal_moves().count();
            }
            black_box(acc)
        })
    });
    c.bench_function("query/empty_cells", |bch| {
        bch.iter(|| {
            let mut acc = 0usize;
            for &bd in &boards {
                acc += bd.empty_cells().len();
            }
            black_box(acc)
        })
    });
    c.bench_function("query/is_game_over", |bch| {
        bch.iter(|| boards.iter().filter(|bd| bd.is_game_over()).count())
    });
}

fn bench_step(c: &mut Criterion) {
    engine::warm();
    c.bench_function("game/step_cycle", |bch| {
        bch.iter_batched(
            || GameState::new(Some(9)),
            |mut game| {
                for i in 0..64 {
                    game.step(Move::ALL[i % 4]);
                }
                black_box(game.score())
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(engine_ops, bench_apply_move, bench_queries, bench_step);
criterion_main!(engine_ops);
