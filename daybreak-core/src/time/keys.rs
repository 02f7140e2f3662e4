//! Time keys — validated UTC instants and UTC day keys.
//!
//! Every timestamp that crosses a component boundary is one of these types.
//! The entry day key and the exit day key are distinct types so the train/OOS
//! boundary (defined on exit days) can never be compared against an entry day
//! by accident.
//!
//! None of these types implement `Default`. Construction always validates:
//! - instants must be UTC and must not fall on the epoch day (1970-01-01),
//!   which is what an uninitialised timestamp collapses to;
//! - day keys must be midnight-aligned and must not be the epoch date.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Timelike, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors raised while constructing time keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeKeyError {
    #[error("instant {0} falls on the epoch day; refusing an uninitialised timestamp")]
    DefaultInstant(DateTime<Utc>),
    #[error("timestamp '{input}' is not UTC (offset {offset_secs}s)")]
    NonUtc { input: String, offset_secs: i32 },
    #[error("cannot parse timestamp '{input}': {reason}")]
    Unparsable { input: String, reason: String },
    #[error("day key {0} is the epoch date; refusing an uninitialised day key")]
    DefaultDayKey(NaiveDate),
    #[error("day key source {0} is not midnight UTC")]
    NotMidnight(DateTime<Utc>),
    #[error("empty window: exit {exit} is not after entry {entry}")]
    EmptyWindow {
        entry: DateTime<Utc>,
        exit: DateTime<Utc>,
    },
}

fn epoch_date() -> NaiveDate {
    DateTime::<Utc>::UNIX_EPOCH.date_naive()
}

// ─── UtcInstant ──────────────────────────────────────────────────────

/// A validated point in time, always UTC, never the epoch default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcInstant(DateTime<Utc>);

impl UtcInstant {
    pub fn new(at: DateTime<Utc>) -> Result<Self, TimeKeyError> {
        if at.date_naive() == epoch_date() {
            return Err(TimeKeyError::DefaultInstant(at));
        }
        Ok(Self(at))
    }

    /// Parse an RFC 3339 timestamp. Only a zero offset (`Z` or `+00:00`) is accepted;
    /// any other offset is a contract violation, not something to convert silently.
    pub fn parse_rfc3339(input: &str) -> Result<Self, TimeKeyError> {
        let parsed =
            DateTime::parse_from_rfc3339(input.trim()).map_err(|e| TimeKeyError::Unparsable {
                input: input.to_string(),
                reason: e.to_string(),
            })?;
        let offset_secs = parsed.offset().local_minus_utc();
        if offset_secs != 0 {
            return Err(TimeKeyError::NonUtc {
                input: input.to_string(),
                offset_secs,
            });
        }
        Self::new(parsed.with_timezone(&Utc))
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// UTC calendar date of this instant.
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    /// Shift by a duration, re-validating the result.
    pub fn checked_add(&self, delta: chrono::Duration) -> Result<Self, TimeKeyError> {
        Self::new(self.0 + delta)
    }
}

impl TryFrom<DateTime<Utc>> for UtcInstant {
    type Error = TimeKeyError;

    fn try_from(at: DateTime<Utc>) -> Result<Self, Self::Error> {
        Self::new(at)
    }
}

impl From<UtcInstant> for DateTime<Utc> {
    fn from(instant: UtcInstant) -> Self {
        instant.0
    }
}

impl FromStr for UtcInstant {
    type Err = TimeKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_rfc3339(s)
    }
}

impl fmt::Display for UtcInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl Serialize for UtcInstant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UtcInstant {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_rfc3339(&raw).map_err(de::Error::custom)
    }
}

// ─── Day keys ────────────────────────────────────────────────────────

macro_rules! day_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "NaiveDate", into = "NaiveDate")]
        pub struct $name(NaiveDate);

        impl $name {
            pub fn from_date(date: NaiveDate) -> Result<Self, TimeKeyError> {
                if date == epoch_date() {
                    return Err(TimeKeyError::DefaultDayKey(date));
                }
                Ok(Self(date))
            }

            /// Build from an instant that must already sit exactly on 00:00:00 UTC.
            pub fn from_midnight(at: DateTime<Utc>) -> Result<Self, TimeKeyError> {
                if at.num_seconds_from_midnight() != 0 || at.nanosecond() != 0 {
                    return Err(TimeKeyError::NotMidnight(at));
                }
                Self::from_date(at.date_naive())
            }

            /// Parse `YYYY-MM-DD`.
            pub fn parse(input: &str) -> Result<Self, TimeKeyError> {
                let date = NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|e| {
                    TimeKeyError::Unparsable {
                        input: input.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Self::from_date(date)
            }

            pub fn date(&self) -> NaiveDate {
                self.0
            }

            /// The midnight UTC instant this key denotes.
            pub fn start_utc(&self) -> DateTime<Utc> {
                Utc.from_utc_datetime(&self.0.and_time(NaiveTime::MIN))
            }
        }

        impl TryFrom<NaiveDate> for $name {
            type Error = TimeKeyError;

            fn try_from(date: NaiveDate) -> Result<Self, Self::Error> {
                Self::from_date(date)
            }
        }

        impl From<$name> for NaiveDate {
            fn from(key: $name) -> Self {
                key.0
            }
        }

        impl FromStr for $name {
            type Err = TimeKeyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.format("%Y-%m-%d"))
            }
        }
    };
}

day_key!(
    /// UTC calendar day of an entry. Identity key for joining predictions,
    /// ground truth and aggregations built independently.
    EntryDayKeyUtc
);

day_key!(
    /// UTC calendar day of a trade's baseline exit.
    ExitDayKeyUtc
);

day_key!(
    /// Last baseline-exit day whose outcomes the model was trained on.
    /// Supplied by the training pipeline, never derived here.
    TrainUntilExitDayKeyUtc
);

impl TrainUntilExitDayKeyUtc {
    /// True when a trade exiting on `exit` was observable (closed) within training.
    pub fn covers(&self, exit: ExitDayKeyUtc) -> bool {
        exit.date() <= self.date()
    }
}

// ─── Entry / exit instants ───────────────────────────────────────────

/// The real instant a trading decision is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryUtc(UtcInstant);

impl EntryUtc {
    pub fn new(instant: UtcInstant) -> Self {
        Self(instant)
    }

    pub fn parse_rfc3339(input: &str) -> Result<Self, TimeKeyError> {
        UtcInstant::parse_rfc3339(input).map(Self)
    }

    pub fn instant(&self) -> UtcInstant {
        self.0
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0.as_datetime()
    }

    pub fn day_key(&self) -> EntryDayKeyUtc {
        // UtcInstant never sits on the epoch day, so the date is always a valid key.
        EntryDayKeyUtc(self.0.date())
    }
}

impl fmt::Display for EntryUtc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The exclusive end of a trade's baseline window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaselineExitUtc(UtcInstant);

impl BaselineExitUtc {
    pub fn new(instant: UtcInstant) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> UtcInstant {
        self.0
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0.as_datetime()
    }

    pub fn day_key(&self) -> ExitDayKeyUtc {
        ExitDayKeyUtc(self.0.date())
    }
}

impl fmt::Display for BaselineExitUtc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ─── BaselineWindow ──────────────────────────────────────────────────

/// Half-open interval `[entry, exit)` during which a trade is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawWindow", into = "RawWindow")]
pub struct BaselineWindow {
    entry: EntryUtc,
    exit: BaselineExitUtc,
}

impl BaselineWindow {
    pub fn new(entry: EntryUtc, exit: BaselineExitUtc) -> Result<Self, TimeKeyError> {
        if exit.instant() <= entry.instant() {
            return Err(TimeKeyError::EmptyWindow {
                entry: entry.as_datetime(),
                exit: exit.as_datetime(),
            });
        }
        Ok(Self { entry, exit })
    }

    pub fn entry(&self) -> EntryUtc {
        self.entry
    }

    pub fn exit(&self) -> BaselineExitUtc {
        self.exit
    }

    pub fn duration(&self) -> chrono::Duration {
        self.exit.as_datetime() - self.entry.as_datetime()
    }
}

#[derive(Serialize, Deserialize)]
struct RawWindow {
    entry: EntryUtc,
    exit: BaselineExitUtc,
}

impl TryFrom<RawWindow> for BaselineWindow {
    type Error = TimeKeyError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        Self::new(raw.entry, raw.exit)
    }
}

impl From<BaselineWindow> for RawWindow {
    fn from(window: BaselineWindow) -> Self {
        Self {
            entry: window.entry,
            exit: window.exit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_rejects_epoch_day() {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        assert_eq!(UtcInstant::new(epoch), Err(TimeKeyError::DefaultInstant(epoch)));
        let later_same_day = epoch + chrono::Duration::hours(5);
        assert!(UtcInstant::new(later_same_day).is_err());
    }

    #[test]
    fn instant_rejects_non_utc_offset() {
        let err = UtcInstant::parse_rfc3339("2024-01-08T07:00:00-05:00").unwrap_err();
        assert!(matches!(err, TimeKeyError::NonUtc { offset_secs: -18000, .. }));
    }

    #[test]
    fn instant_accepts_explicit_zero_offset() {
        let a = UtcInstant::parse_rfc3339("2024-01-08T12:00:00Z").unwrap();
        let b = UtcInstant::parse_rfc3339("2024-01-08T12:00:00+00:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "2024-01-08T12:00:00Z");
    }

    #[test]
    fn instant_serde_rejects_offsets() {
        let ok: UtcInstant = serde_json::from_str("\"2024-03-01T12:00:00Z\"").unwrap();
        assert_eq!(ok.date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert!(serde_json::from_str::<UtcInstant>("\"2024-03-01T12:00:00+01:00\"").is_err());
        assert!(serde_json::from_str::<UtcInstant>("\"1970-01-01T00:00:00Z\"").is_err());
    }

    #[test]
    fn day_key_requires_midnight() {
        let midnight = Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap();
        assert!(ExitDayKeyUtc::from_midnight(midnight).is_ok());
        let noon = Utc.with_ymd_and_hms(2024, 1, 9, 12, 0, 0).unwrap();
        assert_eq!(
            ExitDayKeyUtc::from_midnight(noon),
            Err(TimeKeyError::NotMidnight(noon))
        );
    }

    #[test]
    fn day_key_rejects_epoch_date() {
        assert!(EntryDayKeyUtc::from_date(epoch_date()).is_err());
        assert!(serde_json::from_str::<TrainUntilExitDayKeyUtc>("\"1970-01-01\"").is_err());
    }

    #[test]
    fn entry_day_key_is_utc_calendar_day() {
        let entry = EntryUtc::parse_rfc3339("2024-01-08T23:30:00Z").unwrap();
        assert_eq!(entry.day_key().to_string(), "2024-01-08");
        assert_eq!(
            entry.day_key().start_utc(),
            Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn train_until_covers_same_and_earlier_exit_days() {
        let boundary = TrainUntilExitDayKeyUtc::parse("2024-02-01").unwrap();
        assert!(boundary.covers(ExitDayKeyUtc::parse("2024-01-31").unwrap()));
        assert!(boundary.covers(ExitDayKeyUtc::parse("2024-02-01").unwrap()));
        assert!(!boundary.covers(ExitDayKeyUtc::parse("2024-02-02").unwrap()));
    }

    #[test]
    fn window_rejects_non_increasing_bounds() {
        let entry = EntryUtc::parse_rfc3339("2024-01-08T12:00:00Z").unwrap();
        let same = BaselineExitUtc::new(entry.instant());
        assert!(matches!(
            BaselineWindow::new(entry, same),
            Err(TimeKeyError::EmptyWindow { .. })
        ));
    }

    #[test]
    fn window_duration_spans_entry_to_exit() {
        let entry = EntryUtc::parse_rfc3339("2024-01-08T12:00:00Z").unwrap();
        let exit = BaselineExitUtc::new(UtcInstant::parse_rfc3339("2024-01-09T11:58:00Z").unwrap());
        let window = BaselineWindow::new(entry, exit).unwrap();
        assert_eq!(window.entry(), entry);
        assert_eq!(window.duration(), chrono::Duration::minutes(23 * 60 + 58));
    }

    #[test]
    fn window_deserialization_validates_order() {
        let bad = r#"{"entry":"2024-01-09T12:00:00Z","exit":"2024-01-08T12:00:00Z"}"#;
        assert!(serde_json::from_str::<BaselineWindow>(bad).is_err());
    }
}
