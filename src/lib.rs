//! ai-2048-expectimax: a 2048 game engine plus expectimax agents
//!
//! This crate provides:
//! - A packed `Board` with table-driven moves (`engine` module)
//! - A seeded `GameState` that owns score and tile spawns (`game` module)
//! - A weighted heuristic and move ordering (`heuristic`, `ordering`)
//! - Depth-limited and time-budgeted expectimax searches (`expectimax` module)
//! - An `Agent` trait with baseline policies and a batch evaluator (`agent`, `evaluate`)
//!
//! Quick start:
//! ```
//! use ai_2048_expectimax::agent::Agent;
//! use ai_2048_expectimax::expectimax::{Expectimax, ExpectimaxConfig};
//! use ai_2048_expectimax::game::GameState;
//!
//! let mut game = GameState::new(Some(42));
//! let mut agent = Expectimax::with_config(ExpectimaxConfig { depth: 2, seed: Some(42), ..Default::default() });
//!
//! // A few moves keep the doctest fast.
//! for _ in 0..4 {
//!     if game.is_game_over() {
//!         break;
//!     }
//!     let dir = agent.select_action(&game);
//!     let out = game.step(dir);
//!     assert!(!out.info.invalid);
//! }
//! assert!(game.score() > 0 || game.board().count_empty() < 14);
//! ```
pub mod agent;
pub mod engine;
pub mod evaluate;
pub mod expectimax;
pub mod game;
pub mod heuristic;
pub mod ordering;
