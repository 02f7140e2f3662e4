//! Path evaluators: first-touch take-profit / stop-loss walks, immediate and delayed.

pub mod brackets;
pub mod delayed;
pub mod path;

pub use brackets::{BracketLevels, BracketPcts, BracketTable, Brackets, ExitTables, StopLoss};
pub use delayed::{DelayParams, DelayedEvaluator, DelayedFill, DelayedOutcome};
pub use path::{
    walk_path, EvalError, Evaluation, PathWalk, Touch, TradeEvaluator, TradeOutcome, TradeSetup,
};
