//! Bucket state: one independent capital pool inside the ledger.

use serde::{Deserialize, Serialize};

/// Margin regime shared by every bucket of a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    /// Buckets share fate: a price liquidation anywhere ends the whole account.
    Cross,
    /// Each bucket's liquidation stays inside that bucket.
    Isolated,
}

impl std::fmt::Display for MarginMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarginMode::Cross => write!(f, "cross"),
            MarginMode::Isolated => write!(f, "isolated"),
        }
    }
}

/// Name and starting capital of a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub name: String,
    pub base_capital: f64,
}

impl BucketSpec {
    pub fn new(name: impl Into<String>, base_capital: f64) -> Self {
        Self {
            name: name.into(),
            base_capital,
        }
    }
}

/// Mutable state of one bucket. Only the ledger writes to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketState {
    name: String,
    base_capital: f64,
    equity: f64,
    peak_visible: f64,
    max_drawdown: f64,
    withdrawn: f64,
    dead: bool,
    trade_count: usize,
}

impl BucketState {
    pub(crate) fn new(spec: &BucketSpec) -> Self {
        Self {
            name: spec.name.clone(),
            base_capital: spec.base_capital,
            equity: spec.base_capital,
            peak_visible: spec.base_capital,
            max_drawdown: 0.0,
            withdrawn: 0.0,
            dead: false,
            trade_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_capital(&self) -> f64 {
        self.base_capital
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    pub fn withdrawn(&self) -> f64 {
        self.withdrawn
    }

    /// Equity plus everything paid out: what the bucket is worth to its owner.
    pub fn visible_equity(&self) -> f64 {
        self.equity + self.withdrawn
    }

    pub fn peak_visible(&self) -> f64 {
        self.peak_visible
    }

    /// Largest `(peak - visible) / peak` seen so far, as a fraction.
    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn trade_count(&self) -> usize {
        self.trade_count
    }

    pub fn snapshot(&self) -> BucketSnapshot {
        BucketSnapshot {
            name: self.name.clone(),
            base_capital: self.base_capital,
            equity: self.equity,
            withdrawn: self.withdrawn,
            visible_equity: self.visible_equity(),
            peak_visible: self.peak_visible,
            max_drawdown_pct: self.max_drawdown * 100.0,
            pnl_pct: (self.visible_equity() - self.base_capital) / self.base_capital * 100.0,
            dead: self.dead,
            trade_count: self.trade_count,
        }
    }

    pub(crate) fn set_equity(&mut self, equity: f64) {
        self.equity = equity.max(0.0);
    }

    /// Pay out everything above base capital.
    pub(crate) fn withdraw_excess(&mut self) -> f64 {
        if self.equity <= self.base_capital {
            return 0.0;
        }
        let excess = self.equity - self.base_capital;
        self.withdrawn += excess;
        self.equity = self.base_capital;
        excess
    }

    pub(crate) fn kill(&mut self) {
        self.dead = true;
    }

    pub(crate) fn record_trade(&mut self) {
        self.trade_count += 1;
        let visible = self.visible_equity();
        if visible > self.peak_visible {
            self.peak_visible = visible;
        }
        if self.peak_visible > 0.0 {
            let drawdown = (self.peak_visible - visible) / self.peak_visible;
            if drawdown > self.max_drawdown {
                self.max_drawdown = drawdown;
            }
        }
    }
}

/// Immutable per-bucket view for reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSnapshot {
    pub name: String,
    pub base_capital: f64,
    pub equity: f64,
    pub withdrawn: f64,
    pub visible_equity: f64,
    pub peak_visible: f64,
    pub max_drawdown_pct: f64,
    pub pnl_pct: f64,
    pub dead: bool,
    pub trade_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn withdraw_excess_clamps_to_base() {
        let mut bucket = BucketState::new(&BucketSpec::new("daily", 1000.0));
        bucket.set_equity(1200.0);
        assert_eq!(bucket.withdraw_excess(), 200.0);
        assert_eq!(bucket.equity(), 1000.0);
        assert_eq!(bucket.withdrawn(), 200.0);
        assert_eq!(bucket.withdraw_excess(), 0.0);
    }

    #[test]
    fn drawdown_tracks_visible_equity() {
        let mut bucket = BucketState::new(&BucketSpec::new("daily", 1000.0));
        bucket.set_equity(1200.0);
        bucket.withdraw_excess();
        bucket.record_trade();
        assert_eq!(bucket.peak_visible(), 1200.0);

        bucket.set_equity(700.0);
        bucket.record_trade();
        assert!((bucket.max_drawdown() - 300.0 / 1200.0).abs() < 1e-12);

        let snap = bucket.snapshot();
        assert_eq!(snap.visible_equity, 900.0);
        assert!((snap.pnl_pct + 10.0).abs() < 1e-9);
        assert_eq!(snap.trade_count, 2);
    }

    #[test]
    fn equity_is_floored_at_zero() {
        let mut bucket = BucketState::new(&BucketSpec::new("delayed", 500.0));
        bucket.set_equity(-20.0);
        assert_eq!(bucket.equity(), 0.0);
    }
}
