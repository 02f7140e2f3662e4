//! Time keys and the New York trading-window engine.

pub mod keys;
pub mod window;

pub use keys::{
    BaselineExitUtc, BaselineWindow, EntryDayKeyUtc, EntryUtc, ExitDayKeyUtc, TimeKeyError,
    TrainUntilExitDayKeyUtc, UtcInstant,
};
pub use window::{
    baseline_window, compute_baseline_exit_utc, designated_morning_hour, is_business_day,
    is_trading_morning, next_business_day, resolve_window, WindowError, WindowResolution,
};
