//! Composite leaf evaluator.
//!
//! The score is a weighted sum of five board features. Empty cells,
//! monotonicity and smoothness decompose over rows and columns, so they are
//! read from a lazily built per-line table; the corner and positional terms
//! are computed per board.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::engine::{self, Board};

/// Weight mask favouring a snake-shaped gradient anchored at the top-left corner.
pub const POSITION_MASK: [[f64; 4]; 4] = [
    [16.0, 15.0, 14.0, 13.0],
    [9.0, 10.0, 11.0, 12.0],
    [8.0, 7.0, 6.0, 5.0],
    [1.0, 2.0, 3.0, 4.0],
];

/// Length of the vector returned by [`value_features`].
pub const VALUE_FEATURE_LEN: usize = 33;

const CORNERS: [usize; 4] = [0, 3, 12, 15];

/// Per-feature weights. Field names double as the override keys.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeuristicWeights {
    pub empty: f64,
    pub mono: f64,
    pub smooth: f64,
    pub corner: f64,
    pub pos: f64,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        Self { empty: 250.0, mono: 2.0, smooth: 0.1, corner: 50.0, pos: 0.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeightKey {
    Empty,
    Mono,
    Smooth,
    Corner,
    Pos,
}

impl WeightKey {
    pub const ALL: [WeightKey; 5] =
        [WeightKey::Empty, WeightKey::Mono, WeightKey::Smooth, WeightKey::Corner, WeightKey::Pos];

    pub fn name(self) -> &'static str {
        match self {
            WeightKey::Empty => "empty",
            WeightKey::Mono => "mono",
            WeightKey::Smooth => "smooth",
            WeightKey::Corner => "corner",
            WeightKey::Pos => "pos",
        }
    }
}

impl fmt::Display for WeightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WeightsError {
    #[error("unknown heuristic weight {0:?} (expected one of empty, mono, smooth, corner, pos)")]
    UnknownKey(String),
    #[error("weight override {0:?} is not of the form key=value")]
    Malformed(String),
    #[error("weight {key} has non-numeric value {value:?}")]
    InvalidValue { key: WeightKey, value: String },
}

impl FromStr for WeightKey {
    type Err = WeightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WeightKey::ALL
            .into_iter()
            .find(|key| key.name() == s.trim())
            .ok_or_else(|| WeightsError::UnknownKey(s.to_string()))
    }
}

/// A single `key=value` weight override, as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightOverride {
    pub key: WeightKey,
    pub value: f64,
}

impl FromStr for WeightOverride {
    type Err = WeightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s.split_once('=').ok_or_else(|| WeightsError::Malformed(s.to_string()))?;
        let key: WeightKey = key.parse()?;
        let value = value
            .trim()
            .parse()
            .map_err(|_| WeightsError::InvalidValue { key, value: value.to_string() })?;
        Ok(WeightOverride { key, value })
    }
}

impl HeuristicWeights {
    pub fn get(&self, key: WeightKey) -> f64 {
        match key {
            WeightKey::Empty => self.empty,
            WeightKey::Mono => self.mono,
            WeightKey::Smooth => self.smooth,
            WeightKey::Corner => self.corner,
            WeightKey::Pos => self.pos,
        }
    }

    pub fn set(&mut self, key: WeightKey, value: f64) {
        match key {
            WeightKey::Empty => self.empty = value,
            WeightKey::Mono => self.mono = value,
            WeightKey::Smooth => self.smooth = value,
            WeightKey::Corner => self.corner = value,
            WeightKey::Pos => self.pos = value,
        }
    }

    /// Copy with the weight named `key` replaced.
    ///
    /// ```
    /// use ai_2048_expectimax::heuristic::HeuristicWeights;
    /// let w = HeuristicWeights::default().with_override("corner", 0.0).unwrap();
    /// assert_eq!(w.corner, 0.0);
    /// assert!(HeuristicWeights::default().with_override("speed", 1.0).is_err());
    /// ```
    pub fn with_override(mut self, key: &str, value: f64) -> Result<Self, WeightsError> {
        self.set(key.parse()?, value);
        Ok(self)
    }

    /// Apply a list of overrides in order.
    pub fn with_overrides<'a, I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = &'a WeightOverride>,
    {
        for o in overrides {
            self.set(o.key, o.value);
        }
        self
    }

    /// Default weight for `key`, every other weight zeroed. Used for ablations.
    pub fn only(key: WeightKey) -> Self {
        let mut weights = HeuristicWeights { empty: 0.0, mono: 0.0, smooth: 0.0, corner: 0.0, pos: 0.0 };
        weights.set(key, HeuristicWeights::default().get(key));
        weights
    }
}

/// The five raw (unweighted) heuristic features of a board.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BoardFeatures {
    /// Number of empty cells.
    pub empty: f64,
    /// Adjacent pairs satisfying `<=` plus pairs satisfying `>=`, over rows and columns.
    pub monotonicity: f64,
    /// Negated sum of absolute differences between neighbouring tile values.
    pub smoothness: f64,
    /// 1 when the maximum tile sits in a corner.
    pub corner: f64,
    /// Dot product of tile values with [`POSITION_MASK`].
    pub positional: f64,
}

impl BoardFeatures {
    pub fn of(board: Board) -> Self {
        let table = line_features();
        let raw = board.raw();
        let transposed = engine::transpose(raw);
        let mut features = BoardFeatures::default();
        for line_idx in 0..4 {
            let row = &table[engine::extract_line(raw, line_idx) as usize];
            let col = &table[engine::extract_line(transposed, line_idx) as usize];
            features.empty += row.empty;
            features.monotonicity += row.mono + col.mono;
            features.smoothness += row.smooth + col.smooth;
        }
        features.corner = corner_bonus(board);
        features.positional = positional_score(board);
        features
    }

    #[inline]
    pub fn weighted(&self, w: &HeuristicWeights) -> f64 {
        w.empty * self.empty
            + w.mono * self.monotonicity
            + w.smooth * self.smoothness
            + w.corner * self.corner
            + w.pos * self.positional
    }
}

/// Heuristic value of `board` under `weights`.
///
/// ```
/// use ai_2048_expectimax::engine::Board;
/// use ai_2048_expectimax::heuristic::{heuristic_score, HeuristicWeights};
/// let b = Board::from_rows([[4, 2, 0, 0], [0; 4], [0; 4], [0; 4]]).unwrap();
/// let w = HeuristicWeights::default();
/// assert!(heuristic_score(b, &w) > heuristic_score(b.shift(ai_2048_expectimax::engine::Move::Right), &w));
/// ```
#[inline]
pub fn heuristic_score(board: Board, weights: &HeuristicWeights) -> f64 { BoardFeatures::of(board).weighted(weights) }

/// Input vector for a learned value model: 16 tile values, 16 `log2`
/// exponents (0 for empty cells), and the empty-cell count.
pub fn value_features(board: Board) -> [f64; VALUE_FEATURE_LEN] {
    let mut out = [0.0; VALUE_FEATURE_LEN];
    for idx in 0..16 {
        out[idx] = board.tile_value(idx) as f64;
        out[16 + idx] = board.exponent(idx) as f64;
    }
    out[32] = board.count_empty() as f64;
    out
}

fn corner_bonus(board: Board) -> f64 {
    let max_exp = (0..16).map(|idx| board.exponent(idx)).max().unwrap_or(0);
    if CORNERS.iter().any(|&idx| board.exponent(idx) == max_exp) { 1.0 } else { 0.0 }
}

fn positional_score(board: Board) -> f64 {
    POSITION_MASK
        .iter()
        .flatten()
        .enumerate()
        .map(|(idx, &weight)| weight * board.tile_value(idx) as f64)
        .sum()
}

#[derive(Debug, Clone, Copy, Default)]
struct LineFeatures {
    empty: f64,
    mono: f64,
    smooth: f64,
}

static LINE_FEATURES: OnceLock<Box<[LineFeatures]>> = OnceLock::new();

/// Build the per-line feature table now instead of on first use.
pub fn warm() {
    let _ = line_features();
}

fn line_features() -> &'static [LineFeatures] {
    LINE_FEATURES
        .get_or_init(|| (0..0x1_0000u64).map(calc_line_features).collect())
        .as_ref()
}

fn calc_line_features(line: u64) -> LineFeatures {
    let tiles = engine::line_tiles(line);
    let empty = tiles.iter().filter(|&&t| t == 0).count() as f64;
    let mono = tiles
        .windows(2)
        .map(|pair| u8::from(pair[0] <= pair[1]) + u8::from(pair[0] >= pair[1]))
        .sum::<u8>() as f64;
    let smooth = -tiles
        .windows(2)
        .map(|pair| {
            let (a, b) = (engine::exponent_value(pair[0]) as f64, engine::exponent_value(pair[1]) as f64);
            (a - b).abs()
        })
        .sum::<f64>();
    LineFeatures { empty, mono, smooth }
}
