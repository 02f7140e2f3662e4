//! Per-day prediction records supplied by the upstream model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use daybreak_core::domain::Side;
use daybreak_core::time::EntryUtc;

/// Tolerance on the probability triple summing to one.
pub const PROBABILITY_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictionError {
    #[error("prediction at {entry}: min_move must be finite and positive, got {value}")]
    InvalidMinMove { entry: EntryUtc, value: f64 },
    #[error("prediction at {entry}: degenerate probabilities (down={down}, flat={flat}, up={up})")]
    DegenerateProbabilities {
        entry: EntryUtc,
        down: f64,
        flat: f64,
        up: f64,
    },
    #[error("predictions not strictly ascending at index {index}: {previous} then {current}")]
    Unordered {
        index: usize,
        previous: EntryUtc,
        current: EntryUtc,
    },
}

/// Three-way direction class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Down,
    Flat,
    Up,
}

impl Direction {
    /// Position side the class implies; flat days are not traded.
    pub fn side(self) -> Option<Side> {
        match self {
            Direction::Down => Some(Side::Short),
            Direction::Flat => None,
            Direction::Up => Some(Side::Long),
        }
    }
}

/// Calibrated class probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub down: f64,
    pub flat: f64,
    pub up: f64,
}

impl ClassProbabilities {
    pub fn of(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Down => self.down,
            Direction::Flat => self.flat,
            Direction::Up => self.up,
        }
    }

    /// Finite, non-negative, and summing to one.
    pub fn is_valid(&self) -> bool {
        let parts = [self.down, self.flat, self.up];
        parts.iter().all(|p| p.is_finite() && *p >= 0.0)
            && (parts.iter().sum::<f64>() - 1.0).abs() <= PROBABILITY_SUM_TOLERANCE
    }
}

/// One trading day's model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub entry: EntryUtc,
    pub direction: Direction,
    /// Optional finer-grained direction from a secondary model.
    #[serde(default)]
    pub micro_direction: Option<Direction>,
    pub probabilities: ClassProbabilities,
    pub min_move: f64,
    pub strong_signal: bool,
}

impl PredictionRecord {
    pub fn validate(&self) -> Result<(), PredictionError> {
        if !self.min_move.is_finite() || self.min_move <= 0.0 {
            return Err(PredictionError::InvalidMinMove {
                entry: self.entry,
                value: self.min_move,
            });
        }
        if !self.probabilities.is_valid() {
            return Err(PredictionError::DegenerateProbabilities {
                entry: self.entry,
                down: self.probabilities.down,
                flat: self.probabilities.flat,
                up: self.probabilities.up,
            });
        }
        Ok(())
    }

    pub fn side(&self) -> Option<Side> {
        self.direction.side()
    }

    /// Probability the model assigns to its own call.
    pub fn confidence(&self) -> f64 {
        self.probabilities.of(self.direction)
    }

    /// The refinement model disagrees with the main call.
    pub fn is_risk_day(&self) -> bool {
        self.micro_direction
            .is_some_and(|micro| micro != self.direction)
    }
}

/// Validate every record and require strictly ascending entries.
pub fn validate_stream(records: &[PredictionRecord]) -> Result<(), PredictionError> {
    for (index, pair) in records.windows(2).enumerate() {
        if pair[1].entry <= pair[0].entry {
            return Err(PredictionError::Unordered {
                index: index + 1,
                previous: pair[0].entry,
                current: pair[1].entry,
            });
        }
    }
    records.iter().try_for_each(PredictionRecord::validate)
}
