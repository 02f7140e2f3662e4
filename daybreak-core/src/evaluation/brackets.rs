//! Take-profit / stop-loss derivation from the daily minimum-move magnitude.

use serde::{Deserialize, Serialize};

use crate::domain::Side;

/// Multiplier/floor pair for one signal strength.
///
/// `tp = max(tp_floor, min_move * tp_mul)`, `sl = max(sl_floor, min_move * sl_mul)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BracketTable {
    pub tp_mul: f64,
    pub tp_floor: f64,
    pub sl_mul: f64,
    pub sl_floor: f64,
}

impl BracketTable {
    pub fn percentages(&self, min_move: f64) -> BracketPcts {
        BracketPcts {
            take_profit: self.tp_floor.max(min_move * self.tp_mul),
            stop_loss: self.sl_floor.max(min_move * self.sl_mul),
        }
    }

    fn is_valid(&self) -> bool {
        [self.tp_mul, self.tp_floor, self.sl_mul, self.sl_floor]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}

/// Strong and weak tables plus the tradability threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitTables {
    pub strong: BracketTable,
    pub weak: BracketTable,
    /// Days with `min_move` below this are too quiet to trade.
    pub min_tradable_move: f64,
}

impl Default for ExitTables {
    fn default() -> Self {
        Self {
            strong: BracketTable {
                tp_mul: 1.0,
                tp_floor: 0.008,
                sl_mul: 1.25,
                sl_floor: 0.010,
            },
            weak: BracketTable {
                tp_mul: 0.6,
                tp_floor: 0.005,
                sl_mul: 0.9,
                sl_floor: 0.007,
            },
            min_tradable_move: 0.003,
        }
    }
}

impl ExitTables {
    pub fn table(&self, strong_signal: bool) -> &BracketTable {
        if strong_signal {
            &self.strong
        } else {
            &self.weak
        }
    }

    pub fn is_tradable(&self, min_move: f64) -> bool {
        min_move >= self.min_tradable_move
    }

    /// Percentages for a tradable day, `None` when the day is too quiet.
    pub fn percentages(&self, min_move: f64, strong_signal: bool) -> Option<BracketPcts> {
        if !self.is_tradable(min_move) {
            return None;
        }
        Some(self.table(strong_signal).percentages(min_move))
    }

    /// Every multiplier and floor positive and finite, threshold non-negative.
    pub fn is_valid(&self) -> bool {
        self.strong.is_valid()
            && self.weak.is_valid()
            && self.min_tradable_move.is_finite()
            && self.min_tradable_move >= 0.0
    }
}

/// Take-profit and stop-loss distances as fractions of the anchor price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BracketPcts {
    pub take_profit: f64,
    pub stop_loss: f64,
}

/// Whether the walk watches the stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopLoss {
    Enabled,
    Disabled,
}

impl std::fmt::Display for StopLoss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopLoss::Enabled => write!(f, "sl"),
            StopLoss::Disabled => write!(f, "no_sl"),
        }
    }
}

/// Absolute target and stop prices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BracketLevels {
    pub take_profit: f64,
    /// `None` when the stop is disabled.
    pub stop_loss: Option<f64>,
}

impl BracketLevels {
    pub fn from_pcts(side: Side, anchor: f64, pcts: BracketPcts, stop: StopLoss) -> Self {
        let take_profit = anchor * (1.0 + side.sign() * pcts.take_profit);
        let stop_loss = match stop {
            StopLoss::Enabled => Some(anchor * (1.0 - side.sign() * pcts.stop_loss)),
            StopLoss::Disabled => None,
        };
        Self {
            take_profit,
            stop_loss,
        }
    }
}

/// Percentages together with the levels they produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Brackets {
    pub anchor_price: f64,
    pub pcts: BracketPcts,
    pub levels: BracketLevels,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floors_apply_on_quiet_days() {
        let tables = ExitTables::default();
        let pcts = tables.percentages(0.004, false).unwrap();
        assert_eq!(pcts.take_profit, 0.005);
        assert_eq!(pcts.stop_loss, 0.007);
    }

    #[test]
    fn multipliers_apply_on_volatile_days() {
        let tables = ExitTables::default();
        let pcts = tables.percentages(0.04, true).unwrap();
        assert!((pcts.take_profit - 0.04).abs() < 1e-12);
        assert!((pcts.stop_loss - 0.05).abs() < 1e-12);
    }

    #[test]
    fn strong_brackets_are_wider_than_weak() {
        let tables = ExitTables::default();
        for mm in [0.003, 0.01, 0.02, 0.05] {
            let strong = tables.percentages(mm, true).unwrap();
            let weak = tables.percentages(mm, false).unwrap();
            assert!(strong.take_profit > weak.take_profit);
            assert!(strong.stop_loss > weak.stop_loss);
        }
    }

    #[test]
    fn below_threshold_is_untradable() {
        let tables = ExitTables::default();
        assert_eq!(tables.percentages(0.001, true), None);
    }

    #[test]
    fn levels_mirror_for_short() {
        let pcts = BracketPcts {
            take_profit: 0.03,
            stop_loss: 0.05,
        };
        let long = BracketLevels::from_pcts(Side::Long, 100.0, pcts, StopLoss::Enabled);
        assert!((long.take_profit - 103.0).abs() < 1e-9);
        assert!((long.stop_loss.unwrap() - 95.0).abs() < 1e-9);

        let short = BracketLevels::from_pcts(Side::Short, 100.0, pcts, StopLoss::Enabled);
        assert!((short.take_profit - 97.0).abs() < 1e-9);
        assert!((short.stop_loss.unwrap() - 105.0).abs() < 1e-9);

        let no_stop = BracketLevels::from_pcts(Side::Long, 100.0, pcts, StopLoss::Disabled);
        assert_eq!(no_stop.stop_loss, None);
    }
}
