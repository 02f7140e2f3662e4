//! Delayed-entry evaluator.
//!
//! Instead of entering at the window's opening price, wait up to a bounded
//! delay for a pullback to a discounted price:
//! `fill = entry * (1 - delay_factor * min_move)` for longs, `(1 + ...)` for
//! shorts. Most days never fill; that is an ordinary outcome. Once filled, the
//! brackets are re-derived at the fill price and the same first-touch walk
//! runs from the fill bar onward.
//!
//! The outcomes double as ground-truth labels for a downstream "should we
//! wait" model.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::path::{walk_path, EvalError, Evaluation, TradeEvaluator, TradeSetup, Touch};
use crate::domain::{PriceSeries, Side};
use crate::time::{BaselineWindow, UtcInstant};

/// Delay parameters for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDelayParams")]
pub struct DelayParams {
    /// Discount in units of `min_move`.
    delay_factor: f64,
    max_delay_minutes: i64,
}

impl DelayParams {
    pub fn new(delay_factor: f64, max_delay: Duration) -> Result<Self, EvalError> {
        if !delay_factor.is_finite() || delay_factor < 0.0 {
            return Err(EvalError::InvalidDelayFactor(delay_factor));
        }
        let minutes = max_delay.num_minutes();
        if minutes <= 0 {
            return Err(EvalError::InvalidDelayBudget(minutes));
        }
        Ok(Self {
            delay_factor,
            max_delay_minutes: minutes,
        })
    }

    pub fn delay_factor(&self) -> f64 {
        self.delay_factor
    }

    pub fn max_delay(&self) -> Duration {
        Duration::minutes(self.max_delay_minutes)
    }

    /// Discounted limit price a delayed entry waits for.
    pub fn fill_price(&self, side: Side, entry_price: f64, min_move: f64) -> f64 {
        entry_price * (1.0 - side.sign() * self.delay_factor() * min_move)
    }
}

#[derive(Deserialize)]
struct RawDelayParams {
    delay_factor: f64,
    max_delay_minutes: i64,
}

impl TryFrom<RawDelayParams> for DelayParams {
    type Error = EvalError;

    fn try_from(raw: RawDelayParams) -> Result<Self, Self::Error> {
        Self::new(raw.delay_factor, Duration::minutes(raw.max_delay_minutes))
    }
}

/// The executed part of a delayed entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayedFill {
    pub fill_price: f64,
    pub filled_at: UtcInstant,
    /// Index of the fill bar within the window slice.
    pub fill_index: usize,
    /// Walk from the fill bar; touch indices are relative to the window slice.
    pub evaluation: Evaluation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DelayedOutcome {
    /// `min_move` below the tradability threshold.
    NotTradable,
    /// No bar reached the discounted price inside the delay budget.
    NotExecuted,
    Executed(DelayedFill),
}

impl DelayedOutcome {
    pub fn fill(&self) -> Option<&DelayedFill> {
        match self {
            DelayedOutcome::Executed(fill) => Some(fill),
            _ => None,
        }
    }
}

/// Wraps a [`TradeEvaluator`] so delayed and immediate entries share tables and stop mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayedEvaluator {
    inner: TradeEvaluator,
}

impl DelayedEvaluator {
    pub fn new(inner: TradeEvaluator) -> Self {
        Self { inner }
    }

    /// `setup.entry_price` is the undiscounted window-open price.
    pub fn evaluate(
        &self,
        path: &PriceSeries,
        window: &BaselineWindow,
        setup: &TradeSetup,
        params: DelayParams,
    ) -> Result<DelayedOutcome, EvalError> {
        setup.validate()?;
        if !self.inner.tables().is_tradable(setup.min_move) {
            return Ok(DelayedOutcome::NotTradable);
        }

        let fill_price = params.fill_price(setup.side, setup.entry_price, setup.min_move);
        let deadline = window.entry().as_datetime() + params.max_delay();
        let bars = path.window(window);

        let fill_index = bars
            .iter()
            .take_while(|bar| bar.open_time.as_datetime() < deadline)
            .position(|bar| match setup.side {
                Side::Long => bar.low <= fill_price,
                Side::Short => bar.high >= fill_price,
            });
        let Some(fill_index) = fill_index else {
            return Ok(DelayedOutcome::NotExecuted);
        };

        let Some(brackets) = self.inner.brackets(setup, fill_price) else {
            return Ok(DelayedOutcome::NotTradable);
        };
        let walk = walk_path(&bars[fill_index..], setup.side, &brackets.levels);
        let touch = walk.touch.map(|t| Touch {
            index: t.index + fill_index,
            at: t.at,
        });

        Ok(DelayedOutcome::Executed(DelayedFill {
            fill_price,
            filled_at: bars[fill_index].open_time,
            fill_index,
            evaluation: Evaluation {
                outcome: walk.outcome,
                brackets: Some(brackets),
                touch,
            },
        }))
    }
}
