//! Move ordering for the anytime search.

use smallvec::SmallVec;

use crate::engine::{Board, Move, MoveOutcome};
use crate::heuristic::{heuristic_score, HeuristicWeights};

/// Scale applied to the child's heuristic when ranking moves.
pub const HEURISTIC_SCALE: f64 = 0.2;

/// A legal move together with its outcome and ranking priority.
#[derive(Debug, Clone, Copy)]
pub struct ScoredMove {
    pub dir: Move,
    pub outcome: MoveOutcome,
    pub priority: f64,
}

pub type MoveList = SmallVec<[ScoredMove; 4]>;

/// Legal moves of `board`, best first by `reward + 0.2 * heuristic(child)`.
///
/// The sort is stable, so equal priorities keep `UP, DOWN, LEFT, RIGHT` order.
pub fn scored_moves(board: Board, weights: &HeuristicWeights) -> MoveList {
    let mut moves: MoveList = board
        .legal_moves()
        .map(|(dir, outcome)| ScoredMove {
            dir,
            outcome,
            priority: outcome.reward as f64 + HEURISTIC_SCALE * heuristic_score(outcome.board, weights),
        })
        .collect();
    moves.sort_by(|a, b| b.priority.total_cmp(&a.priority));
    moves
}

/// Directions of [`scored_moves`], without the bookkeeping.
///
/// ```
/// use ai_2048_expectimax::engine::{Board, Move};
/// use ai_2048_expectimax::heuristic::HeuristicWeights;
/// use ai_2048_expectimax::ordering::order_moves;
/// let b = Board::from_rows([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]).unwrap();
/// let moves = order_moves(b, &HeuristicWeights::default());
/// assert_eq!(moves.len(), 3);
/// assert!(!moves.contains(&Move::Up));
/// ```
pub fn order_moves(board: Board, weights: &HeuristicWeights) -> Vec<Move> {
    scored_moves(board, weights).into_iter().map(|m| m.dir).collect()
}
