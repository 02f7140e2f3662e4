//! Trade requests going into the ledger and the records coming out.

use serde::{Deserialize, Serialize};

use crate::domain::{Candle, Side};
use crate::time::UtcInstant;

/// Everything the ledger needs to realise one trade.
#[derive(Debug, Clone, Copy)]
pub struct TradeRequest<'a> {
    pub bucket: &'a str,
    /// Free-form origin tag (e.g. "daily", "delayed") carried onto the record.
    pub source: &'a str,
    pub side: Side,
    pub entry_time: UtcInstant,
    pub exit_time: UtcInstant,
    pub entry_price: f64,
    /// Exit price before any liquidation clamp.
    pub exit_price_raw: f64,
    pub leverage: f64,
    /// Share of current bucket equity committed, in `(0, 1]`.
    pub position_fraction: f64,
    /// Bars the position lived through, scanned for liquidation.
    pub path: &'a [Candle],
}

/// How a trade was liquidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidationKind {
    /// Adverse excursion reached `1 / leverage` on the path.
    Price,
    /// Isolated bucket driven to zero by an ordinary loss.
    EquityExhausted,
}

/// One realised trade. Created only by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlTrade {
    pub bucket: String,
    pub source: String,
    pub side: Side,
    pub entry_time: UtcInstant,
    pub exit_time: UtcInstant,
    pub entry_price: f64,
    pub exit_price_raw: f64,
    /// Exit price after the liquidation clamp.
    pub exit_price: f64,
    pub leverage: f64,
    pub position_base: f64,
    pub notional: f64,
    /// Leveraged return on the position base, before commission.
    pub gross_return: f64,
    pub gross_pnl: f64,
    pub commission: f64,
    /// Change in visible equity caused by this trade.
    pub net_pnl: f64,
    pub net_return: f64,
    pub equity_before: f64,
    pub equity_after: f64,
    /// Amount paid out by this trade.
    pub withdrawn: f64,
    pub liquidation: Option<LiquidationKind>,
}

impl PnlTrade {
    pub fn is_liquidated(&self) -> bool {
        self.liquidation.is_some()
    }

    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }
}

/// Why a registration was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ZeroLeverage,
    ZeroFraction,
    BucketDead,
    AccountDead,
    NoEquity,
}

/// Result of a registration attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Recorded(PnlTrade),
    Skipped(SkipReason),
}

impl Registration {
    pub fn trade(&self) -> Option<&PnlTrade> {
        match self {
            Registration::Recorded(trade) => Some(trade),
            Registration::Skipped(_) => None,
        }
    }
}

/// Account-level visible equity after a registration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub at: UtcInstant,
    pub visible_equity: f64,
}
