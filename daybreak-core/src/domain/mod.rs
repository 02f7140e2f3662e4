//! Domain types shared by the evaluators and the ledger.

pub mod candle;
pub mod side;

pub use candle::{Candle, PriceSeries, Resolution, SeriesError};
pub use side::Side;
