//! Daybreak Runner — policy sweeps over a prediction stream.
//!
//! This crate builds on `daybreak-core` to provide:
//! - Run configuration (TOML) with a BLAKE3 fingerprint
//! - Prediction records and CSV loading for predictions and price bars
//! - Leverage policies and the risk-day overlay
//! - The policy runner: one independent ledger per policy × margin × stop × overlay
//! - Per-combination summaries and JSON / CSV / Markdown export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod policy;
pub mod prediction;
pub mod runner;
pub mod summary;

pub use config::{
    BucketConfig, ConfigError, DelayedConfig, Fingerprint, LeveragePolicyConfig, RunConfig,
    SourceKind,
};
pub use data_loader::{load_candles, load_predictions, read_candles, read_predictions, LoadError};
pub use export::{export_json, import_json, load_report, save_report};
pub use policy::{
    build_policy, ConfidenceScaled, DayOverlay, FixedLeverage, LeveragePolicy, SignalScaled,
};
pub use prediction::{ClassProbabilities, Direction, PredictionError, PredictionRecord};
pub use runner::{MarketData, PolicyRunner, PreparedDay, RunError};
pub use summary::{
    DayCounts, OutcomeCounts, PolicyFailure, PolicyKey, PolicyReport, PolicyResult,
    PreparationStats, SCHEMA_VERSION,
};
