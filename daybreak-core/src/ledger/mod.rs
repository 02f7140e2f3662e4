//! Multi-bucket PnL ledger with cross and isolated margin.

pub mod book;
pub mod bucket;
pub mod trade;

pub use book::{scan_liquidation, Ledger, LedgerError};
pub use bucket::{BucketSnapshot, BucketSpec, BucketState, MarginMode};
pub use trade::{EquityPoint, LiquidationKind, PnlTrade, Registration, SkipReason, TradeRequest};
