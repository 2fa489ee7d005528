use std::collections::HashMap;

use ahash::RandomState as AHasher;

use crate::engine::Board;

use super::NodeKind;

/// Identity of a search node. Two nodes with equal keys have equal values
/// within one search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeKey {
    board: u64,
    kind: NodeKind,
    depth: u32,
}

impl NodeKey {
    #[inline]
    pub(crate) fn new(board: Board, kind: NodeKind, depth: u32) -> Self {
        NodeKey { board: board.raw(), kind, depth }
    }
}

/// Memo table scoped to one move selection (or one deepening iteration).
/// Dropped wholesale afterwards; entries are never carried across boards.
#[derive(Default)]
pub(crate) struct TranspositionCache {
    map: HashMap<NodeKey, f64, AHasher>,
}

impl TranspositionCache {
    pub(crate) fn new() -> Self { Self::default() }

    #[inline]
    pub(crate) fn get(&self, key: &NodeKey) -> Option<f64> { self.map.get(key).copied() }

    #[inline]
    pub(crate) fn insert(&mut self, key: NodeKey, value: f64) { self.map.insert(key, value); }

    pub(crate) fn clear(&mut self) { self.map.clear(); }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize { self.map.len() }
}
