//! Trade outcome evaluator — first-touch walk of a price path.
//!
//! For a long, the stop triggers when `low <= stop` and the target when
//! `high >= target`; shorts mirror this. A bar satisfying both is
//! [`TradeOutcome::Ambiguous`]: bar data cannot tell which came first, so the
//! walk stops there.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::brackets::{BracketLevels, Brackets, ExitTables, StopLoss};
use crate::domain::{Candle, PriceSeries, Side};
use crate::time::{BaselineWindow, UtcInstant};

/// Result of walking a path against a target and a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOutcome {
    /// Nothing touched (or the day was not tradable).
    None,
    TakeProfitFirst,
    StopLossFirst,
    Ambiguous,
}

/// Contract violations raised by the evaluators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("entry price must be finite and positive, got {0}")]
    InvalidEntryPrice(f64),
    #[error("min_move must be finite and positive, got {0}")]
    InvalidMinMove(f64),
    #[error("delay factor must be finite and non-negative, got {0}")]
    InvalidDelayFactor(f64),
    #[error("delay budget must be positive, got {0} minutes")]
    InvalidDelayBudget(i64),
    #[error("exit tables contain a non-positive or non-finite entry")]
    InvalidTables,
}

/// What a trade is, independent of where its path comes from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeSetup {
    pub side: Side,
    pub entry_price: f64,
    /// Per-day volatility-scaled magnitude supplied upstream.
    pub min_move: f64,
    pub strong_signal: bool,
}

impl TradeSetup {
    pub fn validate(&self) -> Result<(), EvalError> {
        if !self.entry_price.is_finite() || self.entry_price <= 0.0 {
            return Err(EvalError::InvalidEntryPrice(self.entry_price));
        }
        if !self.min_move.is_finite() || self.min_move <= 0.0 {
            return Err(EvalError::InvalidMinMove(self.min_move));
        }
        Ok(())
    }
}

/// The bar that decided the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Touch {
    /// Index into the walked slice.
    pub index: usize,
    pub at: UtcInstant,
}

/// Outcome of a walk plus the deciding bar, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathWalk {
    pub outcome: TradeOutcome,
    pub touch: Option<Touch>,
}

/// Full evaluator result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub outcome: TradeOutcome,
    /// `None` when the day was below the tradability threshold.
    pub brackets: Option<Brackets>,
    pub touch: Option<Touch>,
}

impl Evaluation {
    pub fn is_tradable(&self) -> bool {
        self.brackets.is_some()
    }

    fn untradable() -> Self {
        Self {
            outcome: TradeOutcome::None,
            brackets: None,
            touch: None,
        }
    }
}

/// Walk `bars` in order and report the first touch.
pub fn walk_path(bars: &[Candle], side: Side, levels: &BracketLevels) -> PathWalk {
    for (index, bar) in bars.iter().enumerate() {
        let (hit_tp, hit_sl) = match side {
            Side::Long => (
                bar.high >= levels.take_profit,
                levels.stop_loss.is_some_and(|sl| bar.low <= sl),
            ),
            Side::Short => (
                bar.low <= levels.take_profit,
                levels.stop_loss.is_some_and(|sl| bar.high >= sl),
            ),
        };
        let outcome = match (hit_tp, hit_sl) {
            (true, true) => TradeOutcome::Ambiguous,
            (true, false) => TradeOutcome::TakeProfitFirst,
            (false, true) => TradeOutcome::StopLossFirst,
            (false, false) => continue,
        };
        return PathWalk {
            outcome,
            touch: Some(Touch {
                index,
                at: bar.open_time,
            }),
        };
    }
    PathWalk {
        outcome: TradeOutcome::None,
        touch: None,
    }
}

/// Stateless evaluator carrying only its tables and stop mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeEvaluator {
    tables: ExitTables,
    stop: StopLoss,
}

impl TradeEvaluator {
    pub fn new(tables: ExitTables) -> Result<Self, EvalError> {
        if !tables.is_valid() {
            return Err(EvalError::InvalidTables);
        }
        Ok(Self {
            tables,
            stop: StopLoss::Enabled,
        })
    }

    pub fn with_stop_loss(mut self, stop: StopLoss) -> Self {
        self.stop = stop;
        self
    }

    pub fn tables(&self) -> &ExitTables {
        &self.tables
    }

    pub fn stop_loss(&self) -> StopLoss {
        self.stop
    }

    /// Brackets anchored at `anchor`, or `None` for an untradable day.
    pub fn brackets(&self, setup: &TradeSetup, anchor: f64) -> Option<Brackets> {
        let pcts = self.tables.percentages(setup.min_move, setup.strong_signal)?;
        Some(Brackets {
            anchor_price: anchor,
            pcts,
            levels: BracketLevels::from_pcts(setup.side, anchor, pcts, self.stop),
        })
    }

    /// Evaluate the bars strictly inside `window`.
    pub fn evaluate(
        &self,
        path: &PriceSeries,
        window: &BaselineWindow,
        setup: &TradeSetup,
    ) -> Result<Evaluation, EvalError> {
        setup.validate()?;
        let Some(brackets) = self.brackets(setup, setup.entry_price) else {
            return Ok(Evaluation::untradable());
        };
        let walk = walk_path(path.window(window), setup.side, &brackets.levels);
        Ok(Evaluation {
            outcome: walk.outcome,
            brackets: Some(brackets),
            touch: walk.touch,
        })
    }
}
