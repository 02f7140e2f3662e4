//! Per-combination results and the aggregate report.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use daybreak_core::evaluation::StopLoss;
use daybreak_core::ledger::{BucketSnapshot, EquityPoint, Ledger, MarginMode, PnlTrade, SkipReason};

use crate::config::Fingerprint;
use crate::policy::DayOverlay;

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

/// One point in the policy × margin × stop × overlay grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyKey {
    pub policy: String,
    pub margin: MarginMode,
    pub stop_loss: StopLoss,
    pub overlay: DayOverlay,
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.policy, self.margin, self.stop_loss, self.overlay
        )
    }
}

/// How each evaluated bucket-day resolved before reaching the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub take_profit: usize,
    pub stop_loss: usize,
    pub ambiguous: usize,
    pub window_close: usize,
    /// `min_move` below the tradability threshold.
    pub not_tradable: usize,
    /// Delayed entry never reached its fill price.
    pub not_filled: usize,
}

impl OutcomeCounts {
    pub fn planned(&self) -> usize {
        self.take_profit + self.stop_loss + self.ambiguous + self.window_close
    }
}

/// Day-level filtering before any evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCounts {
    /// Days the overlay admitted.
    pub admitted: usize,
    /// Days the overlay filtered out.
    pub overlay_filtered: usize,
    /// Flat direction, nothing to trade.
    pub flat: usize,
    /// Policy returned zero or negative leverage.
    pub zero_leverage: usize,
}

/// Aggregated output for one combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyResult {
    pub key: PolicyKey,
    pub fingerprint: Fingerprint,
    pub trades: Vec<PnlTrade>,
    pub total_pnl_pct: f64,
    /// Account-level max drawdown of visible equity.
    pub max_drawdown_pct: f64,
    pub max_bucket_drawdown_pct: f64,
    pub buckets: Vec<BucketSnapshot>,
    pub liquidated: bool,
    pub account_dead: bool,
    pub trades_by_source: BTreeMap<String, usize>,
    pub outcomes: OutcomeCounts,
    pub days: DayCounts,
    pub skipped: BTreeMap<SkipReason, usize>,
    pub win_rate: f64,
    pub total_commission: f64,
    pub total_withdrawn: f64,
    pub equity_curve: Vec<EquityPoint>,
}

impl PolicyResult {
    pub fn from_ledger(
        key: PolicyKey,
        fingerprint: Fingerprint,
        ledger: Ledger,
        outcomes: OutcomeCounts,
        days: DayCounts,
        skipped: BTreeMap<SkipReason, usize>,
    ) -> Self {
        let total_pnl_pct = ledger.total_pnl_pct();
        let max_drawdown_pct = ledger.account_max_drawdown_pct();
        let max_bucket_drawdown_pct = ledger.max_bucket_drawdown_pct();
        let buckets = ledger.snapshots();
        let liquidated = ledger.any_liquidation();
        let account_dead = ledger.is_account_dead();
        let total_commission = ledger.total_commission();
        let total_withdrawn = ledger.total_withdrawn();
        let equity_curve = ledger.equity_curve().to_vec();
        let trades = ledger.into_trades();

        let mut trades_by_source = BTreeMap::new();
        for trade in &trades {
            *trades_by_source.entry(trade.source.clone()).or_insert(0) += 1;
        }
        let win_rate = if trades.is_empty() {
            0.0
        } else {
            trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
        };

        Self {
            key,
            fingerprint,
            trades,
            total_pnl_pct,
            max_drawdown_pct,
            max_bucket_drawdown_pct,
            buckets,
            liquidated,
            account_dead,
            trades_by_source,
            outcomes,
            days,
            skipped,
            win_rate,
            total_commission,
            total_withdrawn,
            equity_curve,
        }
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }
}

/// Entry-stream preparation shared by every combination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparationStats {
    pub predictions: usize,
    /// Weekend entries: no baseline window.
    pub excluded_weekend: usize,
    /// Entries whose exit day falls inside the training range.
    pub train_skipped: usize,
    /// Eligible days without price bars inside their window.
    pub days_without_path: usize,
    pub prepared_days: usize,
}

/// A combination that failed; the rest of the batch is unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyFailure {
    pub key: PolicyKey,
    pub error: String,
}

/// Everything one `PolicyRunner::run` produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub fingerprint: Fingerprint,
    pub preparation: PreparationStats,
    pub results: Vec<PolicyResult>,
    pub failures: Vec<PolicyFailure>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl PolicyReport {
    pub fn result(&self, key: &PolicyKey) -> Option<&PolicyResult> {
        self.results.iter().find(|r| &r.key == key)
    }

    /// Highest total PnL among combinations whose account survived.
    pub fn best_surviving(&self) -> Option<&PolicyResult> {
        self.results
            .iter()
            .filter(|r| !r.account_dead)
            .max_by(|a, b| a.total_pnl_pct.total_cmp(&b.total_pnl_pct))
    }
}
