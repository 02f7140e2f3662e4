//! Reporting and export: JSON, CSV, and Markdown artifacts for a policy run.
//!
//! - **JSON**: the full `PolicyReport`, schema-versioned
//! - **CSV**: one summary row per combination, the trade tape, equity curves
//! - **Markdown**: a ranked comparison table
//!
//! Reports written by a newer schema are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use daybreak_core::ledger::LiquidationKind;

use crate::summary::{PolicyReport, PolicyResult, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(report: &PolicyReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize PolicyReport to JSON")
}

/// Deserialize a `PolicyReport`, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<PolicyReport> {
    let report: PolicyReport =
        serde_json::from_str(json).context("failed to deserialize PolicyReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One row per successful combination.
pub fn export_summary_csv(report: &PolicyReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "policy",
        "margin",
        "stop_loss",
        "overlay",
        "trades",
        "total_pnl_pct",
        "max_drawdown_pct",
        "max_bucket_drawdown_pct",
        "win_rate",
        "liquidated",
        "account_dead",
        "total_commission",
        "total_withdrawn",
    ])?;
    for r in &report.results {
        wtr.write_record([
            r.key.policy.as_str(),
            &r.key.margin.to_string(),
            &r.key.stop_loss.to_string(),
            &r.key.overlay.to_string(),
            &r.trade_count().to_string(),
            &format!("{:.4}", r.total_pnl_pct),
            &format!("{:.4}", r.max_drawdown_pct),
            &format!("{:.4}", r.max_bucket_drawdown_pct),
            &format!("{:.4}", r.win_rate),
            &r.liquidated.to_string(),
            &r.account_dead.to_string(),
            &format!("{:.2}", r.total_commission),
            &format!("{:.2}", r.total_withdrawn),
        ])?;
    }
    finish(wtr)
}

fn liquidation_label(kind: Option<LiquidationKind>) -> &'static str {
    match kind {
        None => "",
        Some(LiquidationKind::Price) => "price",
        Some(LiquidationKind::EquityExhausted) => "equity_exhausted",
    }
}

/// Trade tape across all combinations, tagged with the combination key.
pub fn export_trades_csv(results: &[PolicyResult]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "combination",
        "bucket",
        "source",
        "side",
        "entry_time",
        "exit_time",
        "entry_price",
        "exit_price",
        "leverage",
        "notional",
        "gross_pnl",
        "commission",
        "net_pnl",
        "equity_after",
        "withdrawn",
        "liquidation",
    ])?;
    for r in results {
        let combination = r.key.to_string();
        for t in &r.trades {
            wtr.write_record([
                combination.as_str(),
                &t.bucket,
                &t.source,
                &t.side.to_string(),
                &t.entry_time.to_string(),
                &t.exit_time.to_string(),
                &format!("{:.6}", t.entry_price),
                &format!("{:.6}", t.exit_price),
                &format!("{:.2}", t.leverage),
                &format!("{:.2}", t.notional),
                &format!("{:.2}", t.gross_pnl),
                &format!("{:.2}", t.commission),
                &format!("{:.2}", t.net_pnl),
                &format!("{:.2}", t.equity_after),
                &format!("{:.2}", t.withdrawn),
                liquidation_label(t.liquidation),
            ])?;
        }
    }
    finish(wtr)
}

/// Account-level visible equity after every registered trade.
pub fn export_equity_csv(results: &[PolicyResult]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["combination", "at", "visible_equity"])?;
    for r in results {
        let combination = r.key.to_string();
        for point in &r.equity_curve {
            wtr.write_record([
                combination.as_str(),
                &point.at.to_string(),
                &format!("{:.2}", point.visible_equity),
            ])?;
        }
    }
    finish(wtr)
}

// ─── Markdown report ────────────────────────────────────────────────

/// Combinations ranked by total PnL, followed by failures.
pub fn generate_report(report: &PolicyReport) -> String {
    let mut md = String::with_capacity(2048);

    md.push_str("# Policy Run Report\n\n");
    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Fingerprint | {} |\n", report.fingerprint));
    let prep = &report.preparation;
    md.push_str(&format!("| Predictions | {} |\n", prep.predictions));
    md.push_str(&format!("| Simulated days | {} |\n", prep.prepared_days));
    md.push_str(&format!("| Weekend entries | {} |\n", prep.excluded_weekend));
    md.push_str(&format!("| In-sample skipped | {} |\n", prep.train_skipped));
    md.push_str(&format!("| Days without bars | {} |\n", prep.days_without_path));
    md.push('\n');

    let mut ranked: Vec<&PolicyResult> = report.results.iter().collect();
    ranked.sort_by(|a, b| b.total_pnl_pct.total_cmp(&a.total_pnl_pct));

    md.push_str("## Results\n\n");
    md.push_str("| Combination | Trades | PnL % | Max DD % | Bucket DD % | Win Rate | Liquidated |\n");
    md.push_str("| --- | ---: | ---: | ---: | ---: | ---: | :---: |\n");
    for r in ranked {
        md.push_str(&format!(
            "| {} | {} | {:.2} | {:.2} | {:.2} | {:.1}% | {} |\n",
            r.key,
            r.trade_count(),
            r.total_pnl_pct,
            r.max_drawdown_pct,
            r.max_bucket_drawdown_pct,
            r.win_rate * 100.0,
            if r.liquidated { "yes" } else { "" },
        ));
    }
    md.push('\n');

    if !report.failures.is_empty() {
        md.push_str("## Failures\n\n");
        for f in &report.failures {
            md.push_str(&format!("- `{}`: {}\n", f.key, f.error));
        }
        md.push('\n');
    }
    md
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set under `output_dir/run_{fingerprint prefix}/`.
///
/// Writes `report.json`, `summary.csv`, `trades.csv`, `equity.csv` and
/// `report.md`. Returns the created directory.
pub fn save_report(report: &PolicyReport, output_dir: &Path) -> Result<PathBuf> {
    let prefix: String = report.fingerprint.chars().take(12).collect();
    let run_dir = output_dir.join(format!("run_{prefix}"));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let files = [
        ("report.json", export_json(report)?),
        ("summary.csv", export_summary_csv(report)?),
        ("trades.csv", export_trades_csv(&report.results)?),
        ("equity.csv", export_equity_csv(&report.results)?),
        ("report.md", generate_report(report)),
    ];
    for (name, content) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(run_dir)
}

/// Load a `PolicyReport` from an artifact directory.
pub fn load_report(dir: &Path) -> Result<PolicyReport> {
    let path = dir.join("report.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}
