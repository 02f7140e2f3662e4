//! Candles and validated price series.
//!
//! Ordering is checked once, at ingestion. Evaluators receive a
//! [`PriceSeries`] and never re-verify it.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::{BaselineWindow, UtcInstant};

/// One OHLC bar, keyed by its open time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: UtcInstant,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    /// Finite, positive prices with `low <= open, close <= high`.
    pub fn is_sane(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}

/// Bar resolution of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Minute,
    Hour,
}

impl Resolution {
    pub fn bar_duration(self) -> Duration {
        match self {
            Resolution::Minute => Duration::minutes(1),
            Resolution::Hour => Duration::hours(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("candle {index} at {at} is not strictly after its predecessor")]
    Unsorted { index: usize, at: UtcInstant },
    #[error("candle {index} at {at} has invalid prices (o={open} h={high} l={low} c={close})")]
    InsaneCandle {
        index: usize,
        at: UtcInstant,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// Strictly ascending, sanity-checked candles. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    resolution: Resolution,
    candles: Vec<Candle>,
}

impl PriceSeries {
    pub fn new(resolution: Resolution, candles: Vec<Candle>) -> Result<Self, SeriesError> {
        for (index, candle) in candles.iter().enumerate() {
            if !candle.is_sane() {
                return Err(SeriesError::InsaneCandle {
                    index,
                    at: candle.open_time,
                    open: candle.open,
                    high: candle.high,
                    low: candle.low,
                    close: candle.close,
                });
            }
            if index > 0 && candle.open_time <= candles[index - 1].open_time {
                return Err(SeriesError::Unsorted {
                    index,
                    at: candle.open_time,
                });
            }
        }
        Ok(Self {
            resolution,
            candles,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Candles whose open time lies in `[from, until)`.
    pub fn range(&self, from: UtcInstant, until: UtcInstant) -> &[Candle] {
        let lo = self.candles.partition_point(|c| c.open_time < from);
        let hi = self.candles.partition_point(|c| c.open_time < until);
        if hi <= lo {
            return &[];
        }
        &self.candles[lo..hi]
    }

    /// Candles that open at or after the entry and close by the exit.
    ///
    /// A bar that opens inside the window but closes after the exit is left
    /// out: with hour bars the 11:00Z bar would otherwise carry prices from
    /// the next day's entry instant.
    pub fn window(&self, window: &BaselineWindow) -> &[Candle] {
        let bar = self.resolution.bar_duration();
        let exit = window.exit().as_datetime();
        let opened = self.range(window.entry().instant(), window.exit().instant());
        let closed = opened.partition_point(|c| c.open_time.as_datetime() + bar <= exit);
        &opened[..closed]
    }

    /// Last candle inside the window; its close is the fallback exit price.
    pub fn window_close(&self, window: &BaselineWindow) -> Option<&Candle> {
        self.window(window).last()
    }
}

impl<'de> Deserialize<'de> for PriceSeries {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            resolution: Resolution,
            candles: Vec<Candle>,
        }
        let raw = Raw::deserialize(deserializer)?;
        PriceSeries::new(raw.resolution, raw.candles).map_err(serde::de::Error::custom)
    }
}
