//! Daybreak CLI — window inspection, causal splits and policy runs.
//!
//! Commands:
//! - `window`: resolve the baseline trading window for one entry instant
//! - `split`: classify a prediction file into train / OOS / excluded
//! - `run`: sweep every configured policy combination and save artifacts

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use daybreak_core::domain::Resolution;
use daybreak_core::split::split_entries;
use daybreak_core::time::{is_trading_morning, resolve_window, EntryUtc, TrainUntilExitDayKeyUtc, WindowResolution};
use daybreak_runner::{
    load_candles, load_predictions, save_report, MarketData, PolicyReport, PolicyRunner, RunConfig,
};

#[derive(Parser)]
#[command(
    name = "daybreak",
    about = "Daybreak CLI: NY-morning daily-trade backtester"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the baseline window for an entry instant.
    Window {
        /// Entry instant, RFC 3339 in UTC (e.g. 2024-01-08T12:00:00Z).
        entry: String,
    },
    /// Split a prediction file at a training boundary.
    Split {
        /// Predictions CSV.
        #[arg(long)]
        predictions: PathBuf,

        /// Last baseline-exit day covered by training (YYYY-MM-DD).
        #[arg(long)]
        train_until: String,
    },
    /// Run every policy combination over a prediction file.
    Run {
        /// Path to a TOML run config. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Predictions CSV.
        #[arg(long)]
        predictions: PathBuf,

        /// Minute bars CSV.
        #[arg(long)]
        minute: Option<PathBuf>,

        /// Hour bars CSV, used where minute bars are missing.
        #[arg(long)]
        hour: Option<PathBuf>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Run combinations one at a time.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Window { entry } => run_window(&entry),
        Commands::Split {
            predictions,
            train_until,
        } => run_split(&predictions, &train_until),
        Commands::Run {
            config,
            predictions,
            minute,
            hour,
            output_dir,
            sequential,
        } => run_policies(
            config.as_deref(),
            &predictions,
            minute.as_deref(),
            hour.as_deref(),
            &output_dir,
            sequential,
        ),
    }
}

fn run_window(entry: &str) -> Result<()> {
    let entry = EntryUtc::parse_rfc3339(entry)?;
    match resolve_window(entry)? {
        WindowResolution::Weekend => {
            println!("{entry}: New York weekend, no baseline window");
        }
        WindowResolution::Eligible(window) => {
            println!("entry:       {}", window.entry());
            println!("exit:        {}", window.exit());
            println!("exit day:    {}", window.exit().day_key());
            println!("duration:    {}m", window.duration().num_minutes());
            println!("morning:     {}", is_trading_morning(entry));
        }
    }
    Ok(())
}

fn run_split(predictions: &Path, train_until: &str) -> Result<()> {
    let train_until = TrainUntilExitDayKeyUtc::parse(train_until)?;
    let records = load_predictions(predictions)?;
    let entries: Vec<EntryUtc> = records.iter().map(|r| r.entry).collect();
    let split = split_entries(&entries, train_until)?;
    let summary = serde_json::to_string_pretty(&split.summary())
        .context("failed to serialize split summary")?;
    println!("{summary}");
    Ok(())
}

fn run_policies(
    config_path: Option<&Path>,
    predictions: &Path,
    minute: Option<&Path>,
    hour: Option<&Path>,
    output_dir: &Path,
    sequential: bool,
) -> Result<()> {
    if minute.is_none() && hour.is_none() {
        bail!("at least one of --minute or --hour is required");
    }

    let config = match config_path {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    let records = load_predictions(predictions)?;
    let market = MarketData::new(
        minute
            .map(|p| load_candles(p, Resolution::Minute))
            .transpose()?,
        hour.map(|p| load_candles(p, Resolution::Hour)).transpose()?,
    );

    let mut runner = PolicyRunner::new(config)?;
    if sequential {
        runner = runner.with_parallelism(false);
    }
    info!(fingerprint = runner.fingerprint(), "starting policy run");
    let report = runner.run(&records, &market)?;

    print_summary(&report);
    let run_dir = save_report(&report, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());

    if !report.failures.is_empty() {
        bail!("{} combination(s) failed", report.failures.len());
    }
    Ok(())
}

fn print_summary(report: &PolicyReport) {
    let prep = &report.preparation;
    println!(
        "{} predictions, {} simulated ({} weekend, {} in-sample, {} without bars)",
        prep.predictions,
        prep.prepared_days,
        prep.excluded_weekend,
        prep.train_skipped,
        prep.days_without_path
    );
    println!(
        "{:<40} {:>7} {:>10} {:>10} {:>6}",
        "combination", "trades", "pnl %", "max dd %", "liq"
    );
    for r in &report.results {
        println!(
            "{:<40} {:>7} {:>10.2} {:>10.2} {:>6}",
            r.key.to_string(),
            r.trade_count(),
            r.total_pnl_pct,
            r.max_drawdown_pct,
            if r.liquidated { "yes" } else { "" }
        );
    }
    for f in &report.failures {
        eprintln!("FAILED {}: {}", f.key, f.error);
    }
    if let Some(best) = report.best_surviving() {
        println!("best surviving: {} ({:.2}%)", best.key, best.total_pnl_pct);
    }
}
