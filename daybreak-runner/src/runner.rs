//! Policy runner — wires windows, evaluators and the ledger per combination.
//!
//! Two phases:
//! - `prepare()`: validates the prediction stream once, resolves every
//!   baseline window, drops weekend and in-sample entries, and picks the
//!   price path for each day. The result is immutable and shared.
//! - one ledger fold per policy × margin × stop × overlay combination, each
//!   with its own evaluator and ledger. Combinations run on the rayon pool
//!   when parallelism is on; each fold is itself strictly sequential.
//!
//! A failing combination is recorded in the report and never aborts the
//! others.

use std::collections::BTreeMap;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use daybreak_core::domain::{Candle, PriceSeries, Side};
use daybreak_core::evaluation::{
    DelayParams, DelayedEvaluator, DelayedOutcome, EvalError, Evaluation, TradeEvaluator,
    TradeOutcome, TradeSetup,
};
use daybreak_core::ledger::{Ledger, LedgerError, Registration, SkipReason, TradeRequest};
use daybreak_core::split::{classify_entry, Segment, SplitError};
use daybreak_core::time::{resolve_window, BaselineWindow, UtcInstant, WindowError, WindowResolution};

use crate::config::{ConfigError, Fingerprint, RunConfig, SourceKind};
use crate::policy::{build_policy, LeveragePolicy};
use crate::prediction::{validate_stream, PredictionError, PredictionRecord};
use crate::summary::{
    DayCounts, OutcomeCounts, PolicyFailure, PolicyKey, PolicyReport, PolicyResult,
    PreparationStats, SCHEMA_VERSION,
};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("prediction error: {0}")]
    Prediction(#[from] PredictionError),
    #[error("window error: {0}")]
    Window(#[from] WindowError),
    #[error("split error: {0}")]
    Split(#[from] SplitError),
    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("policy '{policy}' returned non-finite leverage {value} for {entry}")]
    InvalidLeverage {
        policy: String,
        entry: UtcInstant,
        value: f64,
    },
    #[error("duplicate policy name '{0}'")]
    DuplicatePolicy(String),
}

/// Price paths available to the evaluators.
///
/// Minute bars are preferred; hour bars cover days the minute series misses.
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    pub minute: Option<PriceSeries>,
    pub hour: Option<PriceSeries>,
}

impl MarketData {
    pub fn new(minute: Option<PriceSeries>, hour: Option<PriceSeries>) -> Self {
        Self { minute, hour }
    }

    /// The finest series with at least one bar inside `window`.
    pub fn path_for(&self, window: &BaselineWindow) -> Option<&PriceSeries> {
        [self.minute.as_ref(), self.hour.as_ref()]
            .into_iter()
            .flatten()
            .find(|series| !series.window(window).is_empty())
    }
}

/// An eligible, out-of-sample day with its window and price path chosen.
#[derive(Debug, Clone)]
pub struct PreparedDay<'a> {
    pub prediction: &'a PredictionRecord,
    pub window: BaselineWindow,
    pub series: &'a PriceSeries,
    /// Open of the first bar inside the window.
    pub entry_price: f64,
    pub risk_day: bool,
}

/// A trade waiting to be folded into the ledger.
#[derive(Debug, Clone)]
struct PlannedTrade<'a> {
    bucket: &'a str,
    source: SourceKind,
    side: Side,
    entry_time: UtcInstant,
    exit_time: UtcInstant,
    entry_price: f64,
    exit_price: f64,
    leverage: f64,
    path: &'a [Candle],
}

/// Exit decision for an evaluated slice of bars.
struct PricedExit {
    price: f64,
    at: UtcInstant,
    /// Bars up to and including the deciding one.
    held: usize,
}

/// Price the exit of an evaluated trade.
///
/// Take-profit exits at the target, stop-loss at the stop. An ambiguous bar
/// exits at the stop. Untouched trades exit at the close of the last bar
/// inside the window, timed at the window's end.
fn price_exit(
    evaluation: &Evaluation,
    series: &PriceSeries,
    window: &BaselineWindow,
) -> Option<PricedExit> {
    let levels = evaluation.brackets?.levels;
    let touched = |price: f64| {
        evaluation.touch.map(|touch| PricedExit {
            price,
            at: touch.at,
            held: touch.index + 1,
        })
    };
    match (evaluation.outcome, levels.stop_loss) {
        (TradeOutcome::TakeProfitFirst, _) => touched(levels.take_profit),
        (TradeOutcome::StopLossFirst | TradeOutcome::Ambiguous, Some(stop)) => touched(stop),
        _ => series.window_close(window).map(|bar| PricedExit {
            price: bar.close,
            at: window.exit().instant(),
            held: series.window(window).len(),
        }),
    }
}

fn record_outcome(counts: &mut OutcomeCounts, outcome: TradeOutcome) {
    match outcome {
        TradeOutcome::TakeProfitFirst => counts.take_profit += 1,
        TradeOutcome::StopLossFirst => counts.stop_loss += 1,
        TradeOutcome::Ambiguous => counts.ambiguous += 1,
        TradeOutcome::None => counts.window_close += 1,
    }
}

/// Runs every configured combination over one entry stream.
pub struct PolicyRunner {
    config: RunConfig,
    fingerprint: Fingerprint,
    policies: Vec<Box<dyn LeveragePolicy>>,
    parallel: bool,
}

impl PolicyRunner {
    pub fn new(config: RunConfig) -> Result<Self, RunError> {
        config.validate()?;
        let fingerprint = config.fingerprint()?;
        let mut runner = Self {
            parallel: config.parallel,
            fingerprint,
            policies: Vec::new(),
            config,
        };
        let built = runner
            .config
            .policies
            .iter()
            .map(build_policy)
            .collect::<Result<Vec<_>, _>>()?;
        for policy in built {
            runner = runner.with_policy(policy)?;
        }
        Ok(runner)
    }

    /// Enables or disables parallel execution across combinations.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Add a policy beyond those built from config.
    pub fn with_policy(mut self, policy: Box<dyn LeveragePolicy>) -> Result<Self, RunError> {
        if self.policies.iter().any(|p| p.name() == policy.name()) {
            return Err(RunError::DuplicatePolicy(policy.name().to_string()));
        }
        self.policies.push(policy);
        Ok(self)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Every combination, in config order.
    pub fn combinations(&self) -> Vec<(PolicyKey, &dyn LeveragePolicy)> {
        let mut combos = Vec::new();
        for policy in &self.policies {
            for &margin in &self.config.margin_modes {
                for &stop_loss in &self.config.stop_loss_modes {
                    for &overlay in &self.config.overlays {
                        let key = PolicyKey {
                            policy: policy.name().to_string(),
                            margin,
                            stop_loss,
                            overlay,
                        };
                        combos.push((key, policy.as_ref()));
                    }
                }
            }
        }
        combos
    }

    /// Validate the stream and resolve each day's window and path.
    pub fn prepare<'a>(
        &self,
        predictions: &'a [PredictionRecord],
        market: &'a MarketData,
    ) -> Result<(Vec<PreparedDay<'a>>, PreparationStats), RunError> {
        validate_stream(predictions)?;
        let mut stats = PreparationStats {
            predictions: predictions.len(),
            ..PreparationStats::default()
        };
        let mut days = Vec::new();

        for prediction in predictions {
            let window = match resolve_window(prediction.entry)? {
                WindowResolution::Weekend => {
                    stats.excluded_weekend += 1;
                    continue;
                }
                WindowResolution::Eligible(window) => window,
            };
            if let Some(train_until) = self.config.train_until {
                if classify_entry(prediction.entry, train_until)?.segment == Segment::Train {
                    stats.train_skipped += 1;
                    continue;
                }
            }
            let Some((series, first)) = market
                .path_for(&window)
                .and_then(|series| series.window(&window).first().map(|bar| (series, bar)))
            else {
                warn!(entry = %prediction.entry, "no price bars inside window, day skipped");
                stats.days_without_path += 1;
                continue;
            };
            days.push(PreparedDay {
                prediction,
                window,
                series,
                entry_price: first.open,
                risk_day: prediction.is_risk_day(),
            });
        }

        stats.prepared_days = days.len();
        info!(
            predictions = stats.predictions,
            prepared = stats.prepared_days,
            weekend = stats.excluded_weekend,
            train_skipped = stats.train_skipped,
            without_path = stats.days_without_path,
            "entry stream prepared"
        );
        Ok((days, stats))
    }

    /// Run every combination. Only stream-level problems are errors; a
    /// failing combination lands in `PolicyReport::failures`.
    pub fn run(
        &self,
        predictions: &[PredictionRecord],
        market: &MarketData,
    ) -> Result<PolicyReport, RunError> {
        let (days, preparation) = self.prepare(predictions, market)?;
        let delay = self.config.delay_params()?;
        let combos = self.combinations();

        let outcomes: Vec<(PolicyKey, Result<PolicyResult, RunError>)> = if self.parallel {
            combos
                .par_iter()
                .map(|(key, policy)| (key.clone(), self.run_combination(key, *policy, &days, delay)))
                .collect()
        } else {
            combos
                .iter()
                .map(|(key, policy)| (key.clone(), self.run_combination(key, *policy, &days, delay)))
                .collect()
        };

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for (key, outcome) in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(err) => {
                    warn!(combination = %key, error = %err, "combination failed");
                    failures.push(PolicyFailure {
                        key,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            combinations = results.len() + failures.len(),
            failed = failures.len(),
            fingerprint = %self.fingerprint,
            "policy run complete"
        );
        Ok(PolicyReport {
            schema_version: SCHEMA_VERSION,
            fingerprint: self.fingerprint.clone(),
            preparation,
            results,
            failures,
        })
    }

    /// One full ledger fold. Shares nothing mutable with other combinations.
    pub fn run_combination(
        &self,
        key: &PolicyKey,
        policy: &dyn LeveragePolicy,
        days: &[PreparedDay<'_>],
        delay: DelayParams,
    ) -> Result<PolicyResult, RunError> {
        let evaluator = TradeEvaluator::new(self.config.exit_tables)?.with_stop_loss(key.stop_loss);
        let delayed = DelayedEvaluator::new(evaluator);

        let mut outcomes = OutcomeCounts::default();
        let mut day_counts = DayCounts::default();
        let mut planned: Vec<PlannedTrade<'_>> = Vec::new();

        for day in days {
            if !key.overlay.admits(day.risk_day) {
                day_counts.overlay_filtered += 1;
                continue;
            }
            day_counts.admitted += 1;
            let prediction = day.prediction;
            let Some(side) = prediction.side() else {
                day_counts.flat += 1;
                continue;
            };
            let leverage = policy.leverage(prediction);
            if !leverage.is_finite() {
                return Err(RunError::InvalidLeverage {
                    policy: policy.name().to_string(),
                    entry: prediction.entry.instant(),
                    value: leverage,
                });
            }
            if leverage <= 0.0 {
                day_counts.zero_leverage += 1;
                continue;
            }

            let setup = TradeSetup {
                side,
                entry_price: day.entry_price,
                min_move: prediction.min_move,
                strong_signal: prediction.strong_signal,
            };
            let bars = day.series.window(&day.window);

            for bucket in &self.config.buckets {
                match bucket.source {
                    SourceKind::Daily => {
                        let evaluation = evaluator.evaluate(day.series, &day.window, &setup)?;
                        if !evaluation.is_tradable() {
                            outcomes.not_tradable += 1;
                            continue;
                        }
                        let Some(exit) = price_exit(&evaluation, day.series, &day.window) else {
                            continue;
                        };
                        record_outcome(&mut outcomes, evaluation.outcome);
                        planned.push(PlannedTrade {
                            bucket: &bucket.name,
                            source: bucket.source,
                            side,
                            entry_time: day.window.entry().instant(),
                            exit_time: exit.at,
                            entry_price: day.entry_price,
                            exit_price: exit.price,
                            leverage,
                            path: &bars[..exit.held],
                        });
                    }
                    SourceKind::Delayed => {
                        match delayed.evaluate(day.series, &day.window, &setup, delay)? {
                            DelayedOutcome::NotTradable => outcomes.not_tradable += 1,
                            DelayedOutcome::NotExecuted => outcomes.not_filled += 1,
                            DelayedOutcome::Executed(fill) => {
                                let Some(exit) = price_exit(&fill.evaluation, day.series, &day.window)
                                else {
                                    continue;
                                };
                                record_outcome(&mut outcomes, fill.evaluation.outcome);
                                planned.push(PlannedTrade {
                                    bucket: &bucket.name,
                                    source: bucket.source,
                                    side,
                                    entry_time: fill.filled_at,
                                    exit_time: exit.at,
                                    entry_price: fill.fill_price,
                                    exit_price: exit.price,
                                    leverage,
                                    path: &bars[fill.fill_index..exit.held],
                                });
                            }
                        }
                    }
                }
            }
        }

        // Touch exits can land before an earlier day's window-close exit.
        planned.sort_by_key(|trade| trade.exit_time);

        let mut ledger = Ledger::new(
            key.margin,
            self.config.commission_rate,
            self.config.bucket_specs(),
        )?;
        let mut skipped: BTreeMap<SkipReason, usize> = BTreeMap::new();
        for trade in &planned {
            let registration = ledger.register_trade(&TradeRequest {
                bucket: trade.bucket,
                source: trade.source.as_str(),
                side: trade.side,
                entry_time: trade.entry_time,
                exit_time: trade.exit_time,
                entry_price: trade.entry_price,
                exit_price_raw: trade.exit_price,
                leverage: trade.leverage,
                position_fraction: self.config.position_fraction,
                path: trade.path,
            })?;
            if let Registration::Skipped(reason) = registration {
                *skipped.entry(reason).or_insert(0) += 1;
            }
        }

        let result = PolicyResult::from_ledger(
            key.clone(),
            self.fingerprint.clone(),
            ledger,
            outcomes,
            day_counts,
            skipped,
        );
        debug!(
            combination = %key,
            trades = result.trade_count(),
            pnl_pct = result.total_pnl_pct,
            max_dd_pct = result.max_drawdown_pct,
            liquidated = result.liquidated,
            "combination finished"
        );
        Ok(result)
    }
}

impl std::fmt::Debug for PolicyRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.policies.iter().map(|p| p.name()).collect();
        f.debug_struct("PolicyRunner")
            .field("fingerprint", &self.fingerprint)
            .field("policies", &names)
            .field("parallel", &self.parallel)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BucketConfig;
    use crate::policy::DayOverlay;
    use crate::prediction::tests::sample_prediction;
    use crate::prediction::Direction;
    use chrono::Duration;
    use daybreak_core::domain::Resolution;
    use daybreak_core::evaluation::{BracketLevels, BracketPcts, Brackets, StopLoss, Touch};
    use daybreak_core::ledger::MarginMode;
    use daybreak_core::time::{baseline_window, EntryUtc, TrainUntilExitDayKeyUtc};

    /// Hourly bars drifting by `step` per bar from `open`.
    fn hour_series(start: &str, count: i64, open: f64, step: f64) -> PriceSeries {
        let start = UtcInstant::parse_rfc3339(start).unwrap();
        let candles = (0..count)
            .map(|i| {
                let o = open + step * i as f64;
                let c = o + step;
                Candle {
                    open_time: start.checked_add(Duration::hours(i)).unwrap(),
                    open: o,
                    high: o.max(c) + 0.1,
                    low: o.min(c) - 0.1,
                    close: c,
                }
            })
            .collect();
        PriceSeries::new(Resolution::Hour, candles).unwrap()
    }

    fn sample_market() -> MarketData {
        MarketData::new(None, Some(hour_series("2024-01-08T12:00:00Z", 96, 100.0, 0.5)))
    }

    fn single_combo_config() -> RunConfig {
        RunConfig {
            commission_rate: 0.0,
            buckets: vec![BucketConfig {
                name: "daily".into(),
                allocation: 1.0,
                source: SourceKind::Daily,
            }],
            margin_modes: vec![MarginMode::Cross],
            stop_loss_modes: vec![StopLoss::Enabled],
            overlays: vec![DayOverlay::Base],
            ..RunConfig::default()
        }
    }

    struct NanPolicy;

    impl LeveragePolicy for NanPolicy {
        fn name(&self) -> &str {
            "nan"
        }

        fn leverage(&self, _prediction: &PredictionRecord) -> f64 {
            f64::NAN
        }
    }

    #[test]
    fn path_prefers_minute_bars_then_hour() {
        let window = baseline_window(EntryUtc::parse_rfc3339("2024-01-08T12:00:00Z").unwrap())
            .unwrap();
        let hour = hour_series("2024-01-08T12:00:00Z", 24, 100.0, 0.0);
        // Minute bars from a different week never cover the window.
        let stale = hour_series("2023-06-01T12:00:00Z", 3, 100.0, 0.0);
        let market = MarketData::new(Some(stale), Some(hour.clone()));
        assert_eq!(market.path_for(&window).map(|s| s.len()), Some(hour.len()));

        let market = MarketData::new(Some(hour.clone()), None);
        assert!(market.path_for(&window).is_some());
        assert!(MarketData::default().path_for(&window).is_none());
    }

    #[test]
    fn prepare_counts_weekends_and_missing_paths() {
        let runner = PolicyRunner::new(single_combo_config()).unwrap();
        let predictions = vec![
            sample_prediction("2024-01-08T12:00:00Z", Direction::Up),
            sample_prediction("2024-01-12T12:00:00Z", Direction::Up),
            sample_prediction("2024-01-13T12:00:00Z", Direction::Up),
        ];
        let market = sample_market();
        let (days, stats) = runner.prepare(&predictions, &market).unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(stats.predictions, 3);
        assert_eq!(stats.excluded_weekend, 1);
        assert_eq!(stats.days_without_path, 1);
        assert_eq!(stats.prepared_days, 1);
        assert_eq!(days[0].entry_price, 100.0);
    }

    #[test]
    fn unordered_stream_is_a_run_error() {
        let runner = PolicyRunner::new(single_combo_config()).unwrap();
        let predictions = vec![
            sample_prediction("2024-01-09T12:00:00Z", Direction::Up),
            sample_prediction("2024-01-08T12:00:00Z", Direction::Up),
        ];
        assert!(matches!(
            runner.run(&predictions, &sample_market()),
            Err(RunError::Prediction(_))
        ));
    }

    #[test]
    fn trending_day_books_take_profit() {
        let runner = PolicyRunner::new(single_combo_config()).unwrap();
        let predictions = vec![sample_prediction("2024-01-08T12:00:00Z", Direction::Up)];
        let report = runner.run(&predictions, &sample_market()).unwrap();

        assert!(report.failures.is_empty());
        let result = &report.results[0];
        assert_eq!(result.outcomes.take_profit, 1);
        assert_eq!(result.trade_count(), 1);
        let trade = &result.trades[0];
        // tp = 2% over 100; hit on the fourth bar (high 102.1).
        assert!((trade.exit_price_raw - 102.0).abs() < 1e-9);
        assert_eq!(
            trade.exit_time,
            UtcInstant::parse_rfc3339("2024-01-08T15:00:00Z").unwrap()
        );
        assert!(result.total_pnl_pct > 0.0);
        assert!(result.total_withdrawn > 0.0);
    }

    #[test]
    fn short_against_rising_market_respects_stop_mode() {
        let predictions = vec![sample_prediction("2024-01-08T12:00:00Z", Direction::Down)];
        let market = sample_market();

        let stopped = PolicyRunner::new(single_combo_config()).unwrap();
        let report = stopped.run(&predictions, &market).unwrap();
        assert_eq!(report.results[0].outcomes.stop_loss, 1);

        let config = RunConfig {
            stop_loss_modes: vec![StopLoss::Disabled],
            ..single_combo_config()
        };
        let report = PolicyRunner::new(config).unwrap().run(&predictions, &market).unwrap();
        let result = &report.results[0];
        assert_eq!(result.outcomes.window_close, 1);
        // Held to the window close, deep underwater at 1x.
        assert!(result.total_pnl_pct < 0.0);
    }

    #[test]
    fn flat_and_filtered_days_are_counted() {
        let mut risky = sample_prediction("2024-01-09T12:00:00Z", Direction::Up);
        risky.micro_direction = Some(Direction::Down);
        let predictions = vec![
            sample_prediction("2024-01-08T12:00:00Z", Direction::Flat),
            risky,
        ];
        let runner = PolicyRunner::new(single_combo_config()).unwrap();
        let report = runner.run(&predictions, &sample_market()).unwrap();
        let days = report.results[0].days;
        assert_eq!(days.flat, 1);
        assert_eq!(days.overlay_filtered, 1);
        assert_eq!(report.results[0].trade_count(), 0);
    }

    #[test]
    fn failing_policy_does_not_abort_the_batch() {
        let runner = PolicyRunner::new(single_combo_config())
            .unwrap()
            .with_policy(Box::new(NanPolicy))
            .unwrap();
        let predictions = vec![sample_prediction("2024-01-08T12:00:00Z", Direction::Up)];
        let report = runner.run(&predictions, &sample_market()).unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key.policy, "nan");
        assert!(report.failures[0].error.contains("non-finite"));
    }

    #[test]
    fn duplicate_policy_names_are_rejected() {
        let runner = PolicyRunner::new(single_combo_config()).unwrap();
        let dup = runner.with_policy(Box::new(crate::policy::FixedLeverage::new("fixed_1x", 3.0)));
        assert!(matches!(dup, Err(RunError::DuplicatePolicy(name)) if name == "fixed_1x"));
    }

    #[test]
    fn train_until_keeps_out_of_sample_days() {
        let config = RunConfig {
            train_until: Some(TrainUntilExitDayKeyUtc::parse("2024-01-09").unwrap()),
            ..single_combo_config()
        };
        let runner = PolicyRunner::new(config).unwrap();
        let predictions = vec![
            sample_prediction("2024-01-08T12:00:00Z", Direction::Up),
            sample_prediction("2024-01-09T12:00:00Z", Direction::Up),
        ];
        let market = sample_market();
        let (days, stats) = runner.prepare(&predictions, &market).unwrap();
        assert_eq!(stats.train_skipped, 1);
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].prediction.entry, predictions[1].entry);
    }

    #[test]
    fn sequential_and_parallel_runs_agree() {
        let mut risky = sample_prediction("2024-01-09T12:00:00Z", Direction::Down);
        risky.micro_direction = Some(Direction::Up);
        let predictions = vec![
            sample_prediction("2024-01-08T12:00:00Z", Direction::Up),
            risky,
            sample_prediction("2024-01-10T12:00:00Z", Direction::Up),
        ];
        let market = sample_market();
        let config = RunConfig::default();

        let parallel = PolicyRunner::new(config.clone()).unwrap().run(&predictions, &market).unwrap();
        let sequential = PolicyRunner::new(config)
            .unwrap()
            .with_parallelism(false)
            .run(&predictions, &market)
            .unwrap();
        assert_eq!(parallel, sequential);
        assert_eq!(parallel.results.len(), 8);
    }

    #[test]
    fn ambiguous_exit_prices_at_the_stop() {
        let window = baseline_window(EntryUtc::parse_rfc3339("2024-01-08T12:00:00Z").unwrap())
            .unwrap();
        let series = hour_series("2024-01-08T12:00:00Z", 4, 100.0, 0.0);
        let bars = series.window(&window);
        let pcts = BracketPcts {
            take_profit: 0.02,
            stop_loss: 0.025,
        };
        let evaluation = Evaluation {
            outcome: TradeOutcome::Ambiguous,
            brackets: Some(Brackets {
                anchor_price: 100.0,
                pcts,
                levels: BracketLevels::from_pcts(Side::Long, 100.0, pcts, StopLoss::Enabled),
            }),
            touch: Some(Touch {
                index: 1,
                at: bars[1].open_time,
            }),
        };
        let exit = price_exit(&evaluation, &series, &window).unwrap();
        assert!((exit.price - 97.5).abs() < 1e-9);
        assert_eq!(exit.held, 2);
        assert_eq!(exit.at, bars[1].open_time);
    }

    #[test]
    fn window_close_skips_hour_bar_past_exit() {
        let window = baseline_window(EntryUtc::parse_rfc3339("2024-01-08T12:00:00Z").unwrap())
            .unwrap();
        // 24 bars: the last one opens 11:00Z and closes after the 11:58Z exit.
        let series = hour_series("2024-01-08T12:00:00Z", 24, 100.0, 0.01);
        let pcts = BracketPcts {
            take_profit: 0.02,
            stop_loss: 0.025,
        };
        let evaluation = Evaluation {
            outcome: TradeOutcome::None,
            brackets: Some(Brackets {
                anchor_price: 100.0,
                pcts,
                levels: BracketLevels::from_pcts(Side::Long, 100.0, pcts, StopLoss::Enabled),
            }),
            touch: None,
        };
        let exit = price_exit(&evaluation, &series, &window).unwrap();
        assert_eq!(exit.held, 23);
        assert!((exit.price - series.candles()[22].close).abs() < 1e-12);
        assert_eq!(exit.at, window.exit().instant());
    }

    #[test]
    fn runner_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PolicyRunner>();
        assert_send_sync::<MarketData>();
    }
}
