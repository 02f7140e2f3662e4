//! CSV ingestion for price bars and prediction records.
//!
//! Candles: `open_time,open,high,low,close` with RFC 3339 UTC times.
//! Predictions: `entry,direction,micro_direction,p_down,p_flat,p_up,min_move,strong_signal`;
//! `micro_direction` may be empty.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use daybreak_core::domain::{Candle, PriceSeries, Resolution, SeriesError};
use daybreak_core::time::{EntryUtc, TimeKeyError, UtcInstant};

use crate::prediction::{validate_stream, ClassProbabilities, Direction, PredictionError, PredictionRecord};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: {source}")]
    Time {
        row: usize,
        #[source]
        source: TimeKeyError,
    },
    #[error("invalid price series: {0}")]
    Series(#[from] SeriesError),
    #[error("invalid predictions: {0}")]
    Prediction(#[from] PredictionError),
}

#[derive(Debug, Deserialize)]
struct CandleRow {
    open_time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

#[derive(Debug, Deserialize)]
struct PredictionRow {
    entry: String,
    direction: Direction,
    micro_direction: Option<Direction>,
    p_down: f64,
    p_flat: f64,
    p_up: f64,
    min_move: f64,
    strong_signal: bool,
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a sorted candle series. Rows must already be in time order.
pub fn read_candles<R: Read>(reader: R, resolution: Resolution) -> Result<PriceSeries, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut candles = Vec::new();
    for (i, row) in rdr.deserialize::<CandleRow>().enumerate() {
        let row = row?;
        let open_time = UtcInstant::parse_rfc3339(&row.open_time)
            .map_err(|source| LoadError::Time { row: i + 1, source })?;
        candles.push(Candle {
            open_time,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
        });
    }
    debug!(bars = candles.len(), ?resolution, "candles read");
    Ok(PriceSeries::new(resolution, candles)?)
}

pub fn load_candles(path: &Path, resolution: Resolution) -> Result<PriceSeries, LoadError> {
    read_candles(open(path)?, resolution)
}

/// Read and validate a prediction stream.
pub fn read_predictions<R: Read>(reader: R) -> Result<Vec<PredictionRecord>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut records = Vec::new();
    for (i, row) in rdr.deserialize::<PredictionRow>().enumerate() {
        let row = row?;
        let entry = EntryUtc::parse_rfc3339(&row.entry)
            .map_err(|source| LoadError::Time { row: i + 1, source })?;
        records.push(PredictionRecord {
            entry,
            direction: row.direction,
            micro_direction: row.micro_direction,
            probabilities: ClassProbabilities {
                down: row.p_down,
                flat: row.p_flat,
                up: row.p_up,
            },
            min_move: row.min_move,
            strong_signal: row.strong_signal,
        });
    }
    validate_stream(&records)?;
    debug!(predictions = records.len(), "predictions read");
    Ok(records)
}

pub fn load_predictions(path: &Path) -> Result<Vec<PredictionRecord>, LoadError> {
    read_predictions(open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANDLES: &str = "\
open_time,open,high,low,close
2024-01-08T12:00:00Z,100.0,101.0,99.5,100.5
2024-01-08T13:00:00Z,100.5,102.5,100.0,102.0
";

    const PREDICTIONS: &str = "\
entry,direction,micro_direction,p_down,p_flat,p_up,min_move,strong_signal
2024-01-08T12:00:00Z,up,,0.2,0.2,0.6,0.02,true
2024-01-09T12:00:00Z,down,up,0.5,0.3,0.2,0.015,false
";

    #[test]
    fn reads_candles() {
        let series = read_candles(CANDLES.as_bytes(), Resolution::Hour).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.resolution(), Resolution::Hour);
        assert_eq!(series.candles()[1].high, 102.5);
    }

    #[test]
    fn reads_predictions_with_optional_micro_direction() {
        let records = read_predictions(PREDICTIONS.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].micro_direction, None);
        assert_eq!(records[1].micro_direction, Some(Direction::Up));
        assert!(records[1].is_risk_day());
        assert!(!records[1].strong_signal);
    }

    #[test]
    fn non_utc_time_is_rejected_with_row() {
        let csv = "open_time,open,high,low,close\n2024-01-08T07:00:00-05:00,1,1,1,1\n";
        let err = read_candles(csv.as_bytes(), Resolution::Minute).unwrap_err();
        assert!(matches!(err, LoadError::Time { row: 1, .. }));
    }

    #[test]
    fn insane_candle_is_rejected() {
        let csv = "open_time,open,high,low,close\n2024-01-08T12:00:00Z,100,99,98,100\n";
        assert!(matches!(
            read_candles(csv.as_bytes(), Resolution::Minute),
            Err(LoadError::Series(_))
        ));
    }

    #[test]
    fn bad_probabilities_fail_the_stream() {
        let csv = "entry,direction,micro_direction,p_down,p_flat,p_up,min_move,strong_signal\n\
                   2024-01-08T12:00:00Z,up,,0.5,0.5,0.5,0.02,true\n";
        assert!(matches!(
            read_predictions(csv.as_bytes()),
            Err(LoadError::Prediction(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_predictions(Path::new("/nonexistent/predictions.csv")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/predictions.csv"));
    }
}
