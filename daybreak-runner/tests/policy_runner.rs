//! Integration tests for the policy runner: CSV inputs through to saved artifacts.
//!
//! Synthetic hourly bars stand in for market data; every scenario is built so
//! the expected first touch (or liquidation) can be read off the bar formula.

use std::io::Write;
use std::path::Path;

use daybreak_core::domain::Resolution;
use daybreak_core::evaluation::StopLoss;
use daybreak_core::ledger::{MarginMode, SkipReason};
use daybreak_core::time::UtcInstant;
use daybreak_runner::config::{BucketConfig, LeveragePolicyConfig, RunConfig, SourceKind};
use daybreak_runner::data_loader::{load_candles, load_predictions};
use daybreak_runner::export::{export_summary_csv, load_report, save_report};
use daybreak_runner::policy::DayOverlay;
use daybreak_runner::runner::{MarketData, PolicyRunner};

// ── Fixtures ──

/// 96 hourly bars from Monday 2024-01-08 12:00Z, drifting `step` per bar.
fn write_hour_bars(path: &Path, step: f64) {
    let mut file = std::fs::File::create(path).unwrap();
    writeln!(file, "open_time,open,high,low,close").unwrap();
    let start = chrono::DateTime::parse_from_rfc3339("2024-01-08T12:00:00Z").unwrap();
    for i in 0..96 {
        let at = (start + chrono::Duration::hours(i)).with_timezone(&chrono::Utc);
        let open = 100.0 + step * i as f64;
        let close = open + step;
        writeln!(
            file,
            "{},{open},{},{},{close}",
            at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            open.max(close) + 0.1,
            open.min(close) - 0.1,
        )
        .unwrap();
    }
}

fn write_predictions(path: &Path, rows: &[&str]) {
    let mut file = std::fs::File::create(path).unwrap();
    writeln!(
        file,
        "entry,direction,micro_direction,p_down,p_flat,p_up,min_move,strong_signal"
    )
    .unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
}

const MONDAY_UP: &str = "2024-01-08T12:00:00Z,up,,0.2,0.2,0.6,0.02,true";
const TUESDAY_UP: &str = "2024-01-09T12:00:00Z,up,,0.2,0.2,0.6,0.02,true";
const WEDNESDAY_RISKY: &str = "2024-01-10T12:00:00Z,down,up,0.5,0.2,0.3,0.02,false";
const SATURDAY_UP: &str = "2024-01-13T12:00:00Z,up,,0.2,0.2,0.6,0.02,true";

fn load_market(dir: &Path, step: f64) -> MarketData {
    let bars = dir.join("hour.csv");
    write_hour_bars(&bars, step);
    MarketData::new(None, Some(load_candles(&bars, Resolution::Hour).unwrap()))
}

fn high_leverage_config(margin: MarginMode) -> RunConfig {
    RunConfig {
        commission_rate: 0.0,
        buckets: vec![BucketConfig {
            name: "daily".into(),
            allocation: 1.0,
            source: SourceKind::Daily,
        }],
        policies: vec![LeveragePolicyConfig::Fixed {
            name: None,
            leverage: 20.0,
        }],
        margin_modes: vec![margin],
        stop_loss_modes: vec![StopLoss::Disabled],
        overlays: vec![DayOverlay::Base],
        ..RunConfig::default()
    }
}

// ── End to end ──

#[test]
fn csv_inputs_to_saved_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let market = load_market(dir.path(), 0.25);
    let preds_path = dir.path().join("predictions.csv");
    write_predictions(&preds_path, &[MONDAY_UP, TUESDAY_UP, WEDNESDAY_RISKY, SATURDAY_UP]);
    let predictions = load_predictions(&preds_path).unwrap();

    let runner = PolicyRunner::new(RunConfig::default()).unwrap();
    let report = runner.run(&predictions, &market).unwrap();

    assert_eq!(report.preparation.predictions, 4);
    assert_eq!(report.preparation.excluded_weekend, 1);
    assert_eq!(report.preparation.prepared_days, 3);
    assert_eq!(report.results.len(), 8);
    assert!(report.failures.is_empty());
    assert!(report.results.iter().all(|r| r.fingerprint == report.fingerprint));

    // The risky Wednesday is the only day the anti overlay trades.
    for result in &report.results {
        match result.key.overlay {
            DayOverlay::Base => assert_eq!(result.days.admitted, 2),
            DayOverlay::AntiDirection => assert_eq!(result.days.admitted, 1),
        }
    }

    let out = dir.path().join("out");
    let run_dir = save_report(&report, &out).unwrap();
    let loaded = load_report(&run_dir).unwrap();
    assert_eq!(loaded.fingerprint, report.fingerprint);
    assert_eq!(loaded.results.len(), report.results.len());
}

#[test]
fn reruns_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let market = load_market(dir.path(), -0.2);
    let preds_path = dir.path().join("predictions.csv");
    write_predictions(&preds_path, &[MONDAY_UP, TUESDAY_UP, WEDNESDAY_RISKY]);
    let predictions = load_predictions(&preds_path).unwrap();

    let first = PolicyRunner::new(RunConfig::default())
        .unwrap()
        .run(&predictions, &market)
        .unwrap();
    let second = PolicyRunner::new(RunConfig::default())
        .unwrap()
        .with_parallelism(false)
        .run(&predictions, &market)
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(
        export_summary_csv(&first).unwrap(),
        export_summary_csv(&second).unwrap()
    );
}

// ── Margin modes ──

#[test]
fn cross_liquidation_ends_the_account() {
    let dir = tempfile::tempdir().unwrap();
    let market = load_market(dir.path(), -0.5);
    let preds_path = dir.path().join("predictions.csv");
    write_predictions(&preds_path, &[MONDAY_UP, TUESDAY_UP]);
    let predictions = load_predictions(&preds_path).unwrap();

    let report = PolicyRunner::new(high_leverage_config(MarginMode::Cross))
        .unwrap()
        .run(&predictions, &market)
        .unwrap();
    let result = &report.results[0];

    // 20x long: liquidated once the low reaches 95, on the tenth bar.
    assert!(result.liquidated);
    assert!(result.account_dead);
    assert_eq!(result.trade_count(), 1);
    assert_eq!(result.skipped.get(&SkipReason::AccountDead), Some(&1));
    assert_eq!(result.buckets[0].equity, 0.0);
    assert!((result.total_pnl_pct + 100.0).abs() < 1e-9);
}

#[test]
fn isolated_liquidation_kills_only_the_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let market = load_market(dir.path(), -0.5);
    let preds_path = dir.path().join("predictions.csv");
    write_predictions(&preds_path, &[MONDAY_UP, TUESDAY_UP]);
    let predictions = load_predictions(&preds_path).unwrap();

    let report = PolicyRunner::new(high_leverage_config(MarginMode::Isolated))
        .unwrap()
        .run(&predictions, &market)
        .unwrap();
    let result = &report.results[0];

    assert!(result.liquidated);
    assert!(!result.account_dead);
    assert_eq!(result.skipped.get(&SkipReason::BucketDead), Some(&1));
    assert!(result.buckets[0].dead);
}

// ── Delayed entry ──

#[test]
fn delayed_bucket_enters_at_the_fill_and_stops_on_fill_brackets() {
    let dir = tempfile::tempdir().unwrap();
    let market = load_market(dir.path(), -0.4);
    let preds_path = dir.path().join("predictions.csv");
    write_predictions(&preds_path, &[MONDAY_UP]);
    let predictions = load_predictions(&preds_path).unwrap();

    let config = RunConfig {
        commission_rate: 0.0,
        buckets: vec![
            BucketConfig {
                name: "daily".into(),
                allocation: 0.5,
                source: SourceKind::Daily,
            },
            BucketConfig {
                name: "delayed".into(),
                allocation: 0.5,
                source: SourceKind::Delayed,
            },
        ],
        policies: vec![LeveragePolicyConfig::Fixed {
            name: None,
            leverage: 1.0,
        }],
        margin_modes: vec![MarginMode::Isolated],
        stop_loss_modes: vec![StopLoss::Enabled],
        overlays: vec![DayOverlay::Base],
        ..RunConfig::default()
    };
    let report = PolicyRunner::new(config).unwrap().run(&predictions, &market).unwrap();
    let result = &report.results[0];

    assert_eq!(result.trades_by_source.get("daily"), Some(&1));
    assert_eq!(result.trades_by_source.get("delayed"), Some(&1));
    assert_eq!(result.outcomes.stop_loss, 2);
    assert_eq!(result.outcomes.not_filled, 0);

    // Fill at 100 * (1 - 0.5 * 0.02) = 99: bar 2 (low 98.7) is the first to reach it.
    let delayed = result.trades.iter().find(|t| t.source == "delayed").unwrap();
    assert_eq!(delayed.bucket, "delayed");
    assert_eq!(
        delayed.entry_time,
        UtcInstant::parse_rfc3339("2024-01-08T14:00:00Z").unwrap()
    );
    assert!((delayed.entry_price - 99.0).abs() < 1e-9);

    // Strong stop of 2.5% below the fill, 96.525: first breached by bar 8 (low 96.3).
    assert!((delayed.exit_price_raw - 96.525).abs() < 1e-9);
    assert_eq!(
        delayed.exit_time,
        UtcInstant::parse_rfc3339("2024-01-08T20:00:00Z").unwrap()
    );
    assert!(delayed.liquidation.is_none());
    assert!((delayed.gross_return + 0.025).abs() < 1e-9);

    // The daily trade enters at the window open and exits first.
    let daily = &result.trades[0];
    assert_eq!(daily.source, "daily");
    assert!((daily.entry_price - 100.0).abs() < 1e-9);
    assert!(daily.exit_time < delayed.exit_time);
}

// ── Causal split ──

#[test]
fn train_until_limits_the_run_to_out_of_sample_days() {
    let dir = tempfile::tempdir().unwrap();
    let market = load_market(dir.path(), 0.25);
    let preds_path = dir.path().join("predictions.csv");
    write_predictions(&preds_path, &[MONDAY_UP, TUESDAY_UP, WEDNESDAY_RISKY]);
    let predictions = load_predictions(&preds_path).unwrap();

    let config = RunConfig::from_toml(
        r#"
train_until = "2024-01-10"
margin_modes = ["cross"]
stop_loss_modes = ["enabled"]
overlays = ["base"]
"#,
    )
    .unwrap();
    let report = PolicyRunner::new(config).unwrap().run(&predictions, &market).unwrap();

    // Monday exits Tuesday and Tuesday exits Wednesday: both in-sample.
    assert_eq!(report.preparation.train_skipped, 2);
    assert_eq!(report.preparation.prepared_days, 1);
    let result = &report.results[0];
    assert_eq!(result.days.overlay_filtered, 1);
    assert_eq!(result.trade_count(), 0);
}
