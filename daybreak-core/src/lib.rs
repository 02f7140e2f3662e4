//! Daybreak Core — causal time windows, path evaluators and the multi-bucket ledger.
//!
//! This crate is the pure, I/O-free part of the backtester:
//! - Validated UTC time keys (instants, entry/exit day keys, baseline windows)
//! - New York trading-window engine (morning hour, next-business-day exit)
//! - Causal train / out-of-sample split keyed on baseline-exit day
//! - Ascending price series with half-open window slicing
//! - First-touch take-profit / stop-loss evaluator and its delayed-entry variant
//! - Multi-bucket PnL ledger with cross and isolated margin

pub mod domain;
pub mod evaluation;
pub mod ledger;
pub mod split;
pub mod time;
