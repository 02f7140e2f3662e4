//! New York trading-window engine.
//!
//! A trading morning is a Monday–Friday instant whose America/New_York clock
//! hour is the designated morning hour: 07 while New York is on standard time,
//! 08 while it observes daylight saving (both are 12:00 UTC).
//!
//! The baseline exit of a weekday entry is the next New York business day at
//! its designated morning hour, minus a two-minute safety margin so the exit
//! never collides with the next day's feature instant. Friday rolls to Monday.
//! Weekend entries have no window.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;
use chrono_tz::{OffsetComponents, Tz};
use thiserror::Error;

use super::keys::{BaselineExitUtc, BaselineWindow, EntryUtc, TimeKeyError, UtcInstant};

/// Morning hour (New York clock) while standard time is in effect.
pub const STANDARD_MORNING_HOUR: u32 = 7;
/// Morning hour (New York clock) while daylight saving is in effect.
pub const DAYLIGHT_MORNING_HOUR: u32 = 8;
/// Gap between the baseline exit and the next designated morning.
pub const EXIT_SAFETY_MARGIN_MINUTES: i64 = 2;

/// Errors from the window engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("entry {entry} falls on a New York {weekday:?}; weekend entries have no baseline window")]
    WeekendEntry { entry: EntryUtc, weekday: Weekday },
    #[error("local time {local} does not exist unambiguously in America/New_York")]
    UnrepresentableLocalTime { local: String },
    #[error("calendar overflow while advancing from {0}")]
    CalendarOverflow(NaiveDate),
    #[error(transparent)]
    TimeKey(#[from] TimeKeyError),
}

/// Outcome of resolving an entry without treating weekends as failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowResolution {
    Eligible(BaselineWindow),
    Weekend,
}

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn observes_dst(at: &DateTime<Tz>) -> bool {
    at.offset().dst_offset() != Duration::zero()
}

/// The designated morning hour for a New York civil date.
///
/// Daylight-saving transitions happen at 02:00 local, so the offset at 17:00
/// UTC (noon or 13:00 in New York) is the offset in force at the morning hour.
pub fn designated_morning_hour(date: NaiveDate) -> u32 {
    let midday = (Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)) + Duration::hours(17))
        .with_timezone(&New_York);
    if observes_dst(&midday) {
        DAYLIGHT_MORNING_HOUR
    } else {
        STANDARD_MORNING_HOUR
    }
}

/// The first business day strictly after `date`.
pub fn next_business_day(date: NaiveDate) -> Result<NaiveDate, WindowError> {
    let mut next = date.succ_opt().ok_or(WindowError::CalendarOverflow(date))?;
    while !is_business_day(next) {
        next = next.succ_opt().ok_or(WindowError::CalendarOverflow(next))?;
    }
    Ok(next)
}

/// True only for a New York business-day instant on the designated morning hour.
pub fn is_trading_morning(entry: EntryUtc) -> bool {
    let local = entry.as_datetime().with_timezone(&New_York);
    if !is_business_day(local.date_naive()) {
        return false;
    }
    let designated = if observes_dst(&local) {
        DAYLIGHT_MORNING_HOUR
    } else {
        STANDARD_MORNING_HOUR
    };
    local.hour() == designated
}

/// Exclusive end of the trade window for a weekday entry.
///
/// Fails with [`WindowError::WeekendEntry`] when the entry is on a New York
/// Saturday or Sunday.
pub fn compute_baseline_exit_utc(entry: EntryUtc) -> Result<BaselineExitUtc, WindowError> {
    let local_date = entry.as_datetime().with_timezone(&New_York).date_naive();
    if !is_business_day(local_date) {
        return Err(WindowError::WeekendEntry {
            entry,
            weekday: local_date.weekday(),
        });
    }

    let exit_date = next_business_day(local_date)?;
    let hour = designated_morning_hour(exit_date);
    let morning = exit_date
        .and_hms_opt(hour, 0, 0)
        .ok_or(WindowError::CalendarOverflow(exit_date))?;
    let morning_ny = New_York
        .from_local_datetime(&morning)
        .single()
        .ok_or_else(|| WindowError::UnrepresentableLocalTime {
            local: morning.to_string(),
        })?;

    let exit = morning_ny.with_timezone(&Utc) - Duration::minutes(EXIT_SAFETY_MARGIN_MINUTES);
    Ok(BaselineExitUtc::new(UtcInstant::new(exit)?))
}

/// Baseline window `[entry, exit)` for a weekday entry.
pub fn baseline_window(entry: EntryUtc) -> Result<BaselineWindow, WindowError> {
    let exit = compute_baseline_exit_utc(entry)?;
    Ok(BaselineWindow::new(entry, exit)?)
}

/// Batch-friendly variant: weekends resolve to [`WindowResolution::Weekend`]
/// instead of an error. Any other failure is still an error.
pub fn resolve_window(entry: EntryUtc) -> Result<WindowResolution, WindowError> {
    match baseline_window(entry) {
        Ok(window) => Ok(WindowResolution::Eligible(window)),
        Err(WindowError::WeekendEntry { .. }) => Ok(WindowResolution::Weekend),
        Err(other) => Err(other),
    }
}
