//! Causal train/OOS split.
//!
//! An entry belongs to training only if its trade could have been observed
//! closed by the training boundary. The boundary is a baseline-exit day key,
//! so classification always goes through the window engine: an entry on day D
//! resolves on D+1, or D+3 across a weekend, and the entry's own day key is
//! never consulted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::{
    resolve_window, EntryUtc, ExitDayKeyUtc, TrainUntilExitDayKeyUtc, WindowError,
    WindowResolution,
};

/// Which side of the boundary an entry falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    Train,
    Oos,
    /// Weekend entry: no baseline exit exists.
    Excluded,
}

/// Errors from the split engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("entries not strictly ascending at index {index}: {previous} then {current}")]
    Unordered {
        index: usize,
        previous: EntryUtc,
        current: EntryUtc,
    },
    #[error(transparent)]
    Window(#[from] WindowError),
}

/// One classified entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedEntry {
    pub entry: EntryUtc,
    pub segment: Segment,
    /// Present for every eligible (non-weekend) entry.
    pub exit_day_key: Option<ExitDayKeyUtc>,
}

/// Classify a single entry against the boundary.
pub fn classify_entry(
    entry: EntryUtc,
    train_until: TrainUntilExitDayKeyUtc,
) -> Result<ClassifiedEntry, SplitError> {
    let classified = match resolve_window(entry)? {
        WindowResolution::Weekend => ClassifiedEntry {
            entry,
            segment: Segment::Excluded,
            exit_day_key: None,
        },
        WindowResolution::Eligible(window) => {
            let exit_day = window.exit().day_key();
            let segment = if train_until.covers(exit_day) {
                Segment::Train
            } else {
                Segment::Oos
            };
            ClassifiedEntry {
                entry,
                segment,
                exit_day_key: Some(exit_day),
            }
        }
    };
    Ok(classified)
}

/// Partition of an ordered entry stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalSplit {
    pub train_until: TrainUntilExitDayKeyUtc,
    pub train: Vec<ClassifiedEntry>,
    pub oos: Vec<ClassifiedEntry>,
    pub excluded: Vec<EntryUtc>,
}

impl CausalSplit {
    pub fn eligible_count(&self) -> usize {
        self.train.len() + self.oos.len()
    }

    pub fn total_count(&self) -> usize {
        self.eligible_count() + self.excluded.len()
    }

    pub fn summary(&self) -> SplitSummary {
        SplitSummary {
            train_until: self.train_until,
            train: SegmentSummary::from_entries(&self.train),
            oos: SegmentSummary::from_entries(&self.oos),
            excluded_count: self.excluded.len(),
        }
    }
}

/// Counts and exit-day span of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub count: usize,
    pub first_exit_day: Option<ExitDayKeyUtc>,
    pub last_exit_day: Option<ExitDayKeyUtc>,
}

impl SegmentSummary {
    fn from_entries(entries: &[ClassifiedEntry]) -> Self {
        Self {
            count: entries.len(),
            first_exit_day: entries.first().and_then(|e| e.exit_day_key),
            last_exit_day: entries.last().and_then(|e| e.exit_day_key),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub train_until: TrainUntilExitDayKeyUtc,
    pub train: SegmentSummary,
    pub oos: SegmentSummary,
    pub excluded_count: usize,
}

/// Split a strictly ascending entry stream into Train / OOS / Excluded.
///
/// Empty segments are ordinary results.
pub fn split_entries(
    entries: &[EntryUtc],
    train_until: TrainUntilExitDayKeyUtc,
) -> Result<CausalSplit, SplitError> {
    for (index, pair) in entries.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(SplitError::Unordered {
                index: index + 1,
                previous: pair[0],
                current: pair[1],
            });
        }
    }

    let mut split = CausalSplit {
        train_until,
        train: Vec::new(),
        oos: Vec::new(),
        excluded: Vec::new(),
    };

    for &entry in entries {
        let classified = classify_entry(entry, train_until)?;
        match classified.segment {
            Segment::Train => split.train.push(classified),
            Segment::Oos => split.oos.push(classified),
            Segment::Excluded => split.excluded.push(entry),
        }
    }

    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(s: &str) -> EntryUtc {
        EntryUtc::parse_rfc3339(s).unwrap()
    }

    #[test]
    fn boundary_uses_exit_day_not_entry_day() {
        // Friday entry exits Monday 2024-01-08.
        let friday = entry("2024-01-05T12:00:00Z");
        let boundary = TrainUntilExitDayKeyUtc::parse("2024-01-05").unwrap();
        let classified = classify_entry(friday, boundary).unwrap();
        assert_eq!(classified.segment, Segment::Oos);
        assert_eq!(classified.exit_day_key.unwrap().to_string(), "2024-01-08");

        let boundary = TrainUntilExitDayKeyUtc::parse("2024-01-08").unwrap();
        assert_eq!(classify_entry(friday, boundary).unwrap().segment, Segment::Train);
    }

    #[test]
    fn weekend_entries_are_excluded() {
        let boundary = TrainUntilExitDayKeyUtc::parse("2024-12-31").unwrap();
        let entries = [
            entry("2024-01-05T12:00:00Z"),
            entry("2024-01-06T12:00:00Z"),
            entry("2024-01-07T12:00:00Z"),
            entry("2024-01-08T12:00:00Z"),
        ];
        let split = split_entries(&entries, boundary).unwrap();
        assert_eq!(split.excluded, vec![entries[1], entries[2]]);
        assert_eq!(split.train.len(), 2);
        assert!(split.oos.is_empty());
        assert_eq!(split.eligible_count() + split.excluded.len(), entries.len());
    }

    #[test]
    fn unordered_stream_is_rejected() {
        let boundary = TrainUntilExitDayKeyUtc::parse("2024-12-31").unwrap();
        let entries = [entry("2024-01-08T12:00:00Z"), entry("2024-01-05T12:00:00Z")];
        assert!(matches!(
            split_entries(&entries, boundary),
            Err(SplitError::Unordered { index: 1, .. })
        ));
    }

    #[test]
    fn empty_stream_gives_empty_segments() {
        let boundary = TrainUntilExitDayKeyUtc::parse("2024-12-31").unwrap();
        let split = split_entries(&[], boundary).unwrap();
        assert_eq!(split.total_count(), 0);
        let summary = split.summary();
        assert_eq!(summary.train.first_exit_day, None);
        assert_eq!(summary.oos.count, 0);
    }

    #[test]
    fn summary_reports_exit_day_span() {
        let boundary = TrainUntilExitDayKeyUtc::parse("2024-01-09").unwrap();
        let entries = [
            entry("2024-01-08T12:00:00Z"),
            entry("2024-01-09T12:00:00Z"),
            entry("2024-01-10T12:00:00Z"),
        ];
        let summary = split_entries(&entries, boundary).unwrap().summary();
        assert_eq!(summary.train.count, 1);
        assert_eq!(summary.oos.count, 2);
        assert_eq!(summary.oos.first_exit_day.unwrap().to_string(), "2024-01-10");
        assert_eq!(summary.oos.last_exit_day.unwrap().to_string(), "2024-01-11");
    }
}
