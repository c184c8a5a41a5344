use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::analysis::LoopResult;

// ---------------------------------------------------------------------------
// Console report
// ---------------------------------------------------------------------------

/// Four-decimal statistic. Non-finite values print as `nan`, `inf` or `-inf`.
pub fn format_stat(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        format!("{v:.4}")
    }
}

/// The statistics block printed after the figure is saved.
pub fn format_summary(loops: &[LoopResult]) -> String {
    let mut out = String::from("\n--- Residual Statistics ---\n");
    for r in loops {
        let s = &r.stats;
        // Writing to a String cannot fail.
        let _ = write!(
            out,
            "\n{}:\n  Mean residual: {}\n  Std residual:  {}\n  Min:           {}\n  Max:           {}\n",
            r.spec.label,
            format_stat(s.mean),
            format_stat(s.std),
            format_stat(s.min),
            format_stat(s.max)
        );
    }
    out
}

// ---------------------------------------------------------------------------
// JSON export
// ---------------------------------------------------------------------------

/// One loop's statistics. Non-finite values serialize as `null`.
#[derive(Debug, Serialize)]
pub struct LoopSummary<'a> {
    pub label: &'a str,
    pub pv_column: &'a str,
    pub sp_column: &'a str,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub count: usize,
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

impl<'a> From<&'a LoopResult> for LoopSummary<'a> {
    fn from(r: &'a LoopResult) -> Self {
        LoopSummary {
            label: &r.spec.label,
            pv_column: &r.spec.pv_column,
            sp_column: &r.spec.sp_column,
            mean: finite(r.stats.mean),
            std: finite(r.stats.std),
            min: finite(r.stats.min),
            max: finite(r.stats.max),
            count: r.stats.count,
        }
    }
}

pub fn summary_json(loops: &[LoopResult]) -> Result<String> {
    let rows: Vec<LoopSummary<'_>> = loops.iter().map(LoopSummary::from).collect();
    serde_json::to_string_pretty(&rows).context("serializing summary")
}

pub fn write_summary_json(loops: &[LoopResult], path: &Path) -> Result<()> {
    let json = summary_json(loops)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    log::info!("Wrote statistics to {}", path.display());
    Ok(())
}
