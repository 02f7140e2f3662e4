//! The multi-bucket ledger: a strict left-to-right fold over realised trades.
//!
//! [`Ledger::register_trade`] is the only write path into bucket state. Each
//! call applies, in order:
//!
//! 1. stream checks (known bucket, finite prices, non-decreasing exit time);
//! 2. no-op skips (dead account or bucket, zero leverage or fraction, empty bucket);
//! 3. a liquidation scan at `1 / leverage` adverse excursion over the path;
//! 4. the margin-mode rules (cross: shared fate and payout above base capital;
//!    isolated: contained liquidation and compounding);
//! 5. drawdown bookkeeping and an immutable [`PnlTrade`].

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, warn};

use super::bucket::{BucketSnapshot, BucketSpec, BucketState, MarginMode};
use super::trade::{EquityPoint, LiquidationKind, PnlTrade, Registration, SkipReason, TradeRequest};
use crate::domain::{Candle, Side};
use crate::time::UtcInstant;

/// Slack on the liquidation comparison so an excursion of exactly `1 / leverage` liquidates.
const LIQUIDATION_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("ledger needs at least one bucket")]
    NoBuckets,
    #[error("duplicate bucket name '{0}'")]
    DuplicateBucket(String),
    #[error("bucket '{bucket}' base capital must be finite and positive, got {value}")]
    InvalidBaseCapital { bucket: String, value: f64 },
    #[error("commission rate must be finite and non-negative, got {0}")]
    InvalidCommissionRate(f64),
    #[error("unknown bucket '{0}'")]
    UnknownBucket(String),
    #[error("{field} must be finite and positive, got {value}")]
    InvalidPrice { field: &'static str, value: f64 },
    #[error("leverage must be finite, got {0}")]
    InvalidLeverage(f64),
    #[error("position fraction must be finite and at most 1, got {0}")]
    InvalidFraction(f64),
    #[error("exit {exit} precedes entry {entry}")]
    ExitBeforeEntry { entry: UtcInstant, exit: UtcInstant },
    #[error("trade exiting at {current} registered after one exiting at {previous}")]
    OutOfOrder {
        previous: UtcInstant,
        current: UtcInstant,
    },
}

/// Bucket states plus the account-wide dead flag, trade log and equity curve.
#[derive(Debug, Clone)]
pub struct Ledger {
    mode: MarginMode,
    commission_rate: f64,
    buckets: Vec<BucketState>,
    account_dead: bool,
    last_exit: Option<UtcInstant>,
    trades: Vec<PnlTrade>,
    curve: Vec<EquityPoint>,
    account_peak: f64,
    account_max_drawdown: f64,
    total_commission: f64,
}

impl Ledger {
    /// `commission_rate` is per side; a round trip pays it twice on the notional.
    pub fn new(
        mode: MarginMode,
        commission_rate: f64,
        specs: Vec<BucketSpec>,
    ) -> Result<Self, LedgerError> {
        if specs.is_empty() {
            return Err(LedgerError::NoBuckets);
        }
        if !commission_rate.is_finite() || commission_rate < 0.0 {
            return Err(LedgerError::InvalidCommissionRate(commission_rate));
        }
        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(LedgerError::DuplicateBucket(spec.name.clone()));
            }
            if !spec.base_capital.is_finite() || spec.base_capital <= 0.0 {
                return Err(LedgerError::InvalidBaseCapital {
                    bucket: spec.name.clone(),
                    value: spec.base_capital,
                });
            }
        }

        let buckets: Vec<BucketState> = specs.iter().map(BucketState::new).collect();
        let account_peak = buckets.iter().map(BucketState::base_capital).sum();
        Ok(Self {
            mode,
            commission_rate,
            buckets,
            account_dead: false,
            last_exit: None,
            trades: Vec::new(),
            curve: Vec::new(),
            account_peak,
            account_max_drawdown: 0.0,
            total_commission: 0.0,
        })
    }

    pub fn mode(&self) -> MarginMode {
        self.mode
    }

    pub fn commission_rate(&self) -> f64 {
        self.commission_rate
    }

    pub fn buckets(&self) -> &[BucketState] {
        &self.buckets
    }

    pub fn bucket(&self, name: &str) -> Option<&BucketState> {
        self.buckets.iter().find(|b| b.name() == name)
    }

    pub fn is_account_dead(&self) -> bool {
        self.account_dead
    }

    pub fn trades(&self) -> &[PnlTrade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.curve
    }

    pub fn total_commission(&self) -> f64 {
        self.total_commission
    }

    pub fn total_base_capital(&self) -> f64 {
        self.buckets.iter().map(BucketState::base_capital).sum()
    }

    pub fn total_visible_equity(&self) -> f64 {
        self.buckets.iter().map(BucketState::visible_equity).sum()
    }

    pub fn total_withdrawn(&self) -> f64 {
        self.buckets.iter().map(BucketState::withdrawn).sum()
    }

    /// Account PnL as a percentage of total base capital, withdrawals included.
    pub fn total_pnl_pct(&self) -> f64 {
        let base = self.total_base_capital();
        (self.total_visible_equity() - base) / base * 100.0
    }

    /// Largest account-level drawdown of visible equity, as a percentage.
    pub fn account_max_drawdown_pct(&self) -> f64 {
        self.account_max_drawdown * 100.0
    }

    /// Worst per-bucket drawdown, as a percentage.
    pub fn max_bucket_drawdown_pct(&self) -> f64 {
        self.buckets
            .iter()
            .map(|b| b.max_drawdown() * 100.0)
            .fold(0.0, f64::max)
    }

    pub fn any_liquidation(&self) -> bool {
        self.trades.iter().any(PnlTrade::is_liquidated)
    }

    pub fn snapshots(&self) -> Vec<BucketSnapshot> {
        self.buckets.iter().map(BucketState::snapshot).collect()
    }

    pub fn into_trades(self) -> Vec<PnlTrade> {
        self.trades
    }

    /// Fold one trade into the ledger.
    ///
    /// Skips are ordinary values; malformed requests are errors and leave the
    /// ledger untouched.
    pub fn register_trade(&mut self, req: &TradeRequest<'_>) -> Result<Registration, LedgerError> {
        let index = self
            .buckets
            .iter()
            .position(|b| b.name() == req.bucket)
            .ok_or_else(|| LedgerError::UnknownBucket(req.bucket.to_string()))?;
        validate_request(req)?;
        if let Some(previous) = self.last_exit {
            if req.exit_time < previous {
                return Err(LedgerError::OutOfOrder {
                    previous,
                    current: req.exit_time,
                });
            }
        }
        self.last_exit = Some(req.exit_time);

        if let Some(reason) = self.skip_reason(index, req) {
            debug!(bucket = req.bucket, ?reason, exit = %req.exit_time, "registration skipped");
            return Ok(Registration::Skipped(reason));
        }

        let liquidation_price = scan_liquidation(req.path, req.side, req.entry_price, req.leverage);
        let exit_price = liquidation_price.unwrap_or(req.exit_price_raw);

        let bucket = &self.buckets[index];
        let equity_before = bucket.equity();
        let visible_before = bucket.visible_equity();
        let position_base = equity_before * req.position_fraction;
        let notional = position_base * req.leverage;
        let gross_return = req.side.relative_move(req.entry_price, exit_price) * req.leverage;
        let gross_pnl = gross_return * position_base;
        let commission = notional * self.commission_rate * 2.0;

        let (liquidation, withdrawn) = match self.mode {
            MarginMode::Cross => {
                self.apply_cross(index, liquidation_price.is_some(), gross_pnl, commission)
            }
            MarginMode::Isolated => self.apply_isolated(
                index,
                liquidation_price.is_some(),
                position_base,
                gross_pnl,
                commission,
            ),
        };

        let bucket = &mut self.buckets[index];
        bucket.record_trade();
        let net_pnl = bucket.visible_equity() - visible_before;
        let trade = PnlTrade {
            bucket: req.bucket.to_string(),
            source: req.source.to_string(),
            side: req.side,
            entry_time: req.entry_time,
            exit_time: req.exit_time,
            entry_price: req.entry_price,
            exit_price_raw: req.exit_price_raw,
            exit_price,
            leverage: req.leverage,
            position_base,
            notional,
            gross_return,
            gross_pnl,
            commission,
            net_pnl,
            net_return: net_pnl / position_base,
            equity_before,
            equity_after: bucket.equity(),
            withdrawn,
            liquidation,
        };

        if let Some(kind) = liquidation {
            warn!(
                bucket = req.bucket,
                mode = %self.mode,
                ?kind,
                leverage = req.leverage,
                exit = %req.exit_time,
                "bucket liquidated"
            );
        }

        self.total_commission += commission;
        self.record_account_point(req.exit_time);
        self.trades.push(trade.clone());
        Ok(Registration::Recorded(trade))
    }

    fn skip_reason(&self, index: usize, req: &TradeRequest<'_>) -> Option<SkipReason> {
        let bucket = &self.buckets[index];
        if self.account_dead {
            Some(SkipReason::AccountDead)
        } else if bucket.is_dead() {
            Some(SkipReason::BucketDead)
        } else if req.leverage <= 0.0 {
            Some(SkipReason::ZeroLeverage)
        } else if req.position_fraction <= 0.0 {
            Some(SkipReason::ZeroFraction)
        } else if bucket.equity() <= 0.0 {
            Some(SkipReason::NoEquity)
        } else {
            None
        }
    }

    // ─── Margin rules ────────────────────────────────────────────────

    fn apply_cross(
        &mut self,
        index: usize,
        price_liquidated: bool,
        gross_pnl: f64,
        commission: f64,
    ) -> (Option<LiquidationKind>, f64) {
        if price_liquidated {
            self.buckets[index].set_equity(0.0);
            for bucket in &mut self.buckets {
                bucket.kill();
            }
            self.account_dead = true;
            return (Some(LiquidationKind::Price), 0.0);
        }
        let bucket = &mut self.buckets[index];
        bucket.set_equity(bucket.equity() + gross_pnl - commission);
        let withdrawn = bucket.withdraw_excess();
        (None, withdrawn)
    }

    fn apply_isolated(
        &mut self,
        index: usize,
        price_liquidated: bool,
        position_base: f64,
        gross_pnl: f64,
        commission: f64,
    ) -> (Option<LiquidationKind>, f64) {
        let bucket = &mut self.buckets[index];
        if price_liquidated {
            bucket.set_equity(bucket.equity() - position_base - commission);
            bucket.kill();
            return (Some(LiquidationKind::Price), 0.0);
        }
        let equity = bucket.equity() + gross_pnl - commission;
        if equity <= 0.0 {
            bucket.set_equity(0.0);
            bucket.kill();
            return (Some(LiquidationKind::EquityExhausted), 0.0);
        }
        bucket.set_equity(equity);
        (None, 0.0)
    }

    fn record_account_point(&mut self, at: UtcInstant) {
        let visible = self.total_visible_equity();
        if visible > self.account_peak {
            self.account_peak = visible;
        }
        if self.account_peak > 0.0 {
            let drawdown = (self.account_peak - visible) / self.account_peak;
            if drawdown > self.account_max_drawdown {
                self.account_max_drawdown = drawdown;
            }
        }
        self.curve.push(EquityPoint {
            at,
            visible_equity: visible,
        });
    }
}

fn validate_request(req: &TradeRequest<'_>) -> Result<(), LedgerError> {
    if !req.entry_price.is_finite() || req.entry_price <= 0.0 {
        return Err(LedgerError::InvalidPrice {
            field: "entry_price",
            value: req.entry_price,
        });
    }
    if !req.exit_price_raw.is_finite() || req.exit_price_raw <= 0.0 {
        return Err(LedgerError::InvalidPrice {
            field: "exit_price_raw",
            value: req.exit_price_raw,
        });
    }
    if !req.leverage.is_finite() {
        return Err(LedgerError::InvalidLeverage(req.leverage));
    }
    if !req.position_fraction.is_finite() || req.position_fraction > 1.0 {
        return Err(LedgerError::InvalidFraction(req.position_fraction));
    }
    if req.exit_time < req.entry_time {
        return Err(LedgerError::ExitBeforeEntry {
            entry: req.entry_time,
            exit: req.exit_time,
        });
    }
    Ok(())
}

/// Liquidation price if any bar's adverse excursion reaches `1 / leverage`.
pub fn scan_liquidation(
    path: &[Candle],
    side: Side,
    entry_price: f64,
    leverage: f64,
) -> Option<f64> {
    if leverage <= 0.0 {
        return None;
    }
    let tolerance = 1.0 / leverage;
    let breached = path.iter().any(|bar| {
        let adverse = match side {
            Side::Long => (entry_price - bar.low) / entry_price,
            Side::Short => (bar.high - entry_price) / entry_price,
        };
        adverse + LIQUIDATION_EPSILON >= tolerance
    });
    breached.then(|| entry_price * (1.0 - side.sign() * tolerance))
}
