//! Residual computation and standardization.
//!
//! Each loop is reduced exactly once into a [`LoopResult`]; the figure and
//! the printed summary both read from it, so plotted and printed statistics
//! cannot disagree.

use crate::config::{LoopSpec, ReportConfig};
use crate::data::model::{ProcessTable, TimeAxis};
use crate::error::ReportError;

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Summary of a raw (non-standardized) residual series.
///
/// NaN samples are skipped. `std` is the sample standard deviation
/// (ddof = 1) and is NaN with fewer than two samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

impl ResidualStats {
    pub fn from_series(values: &[f64]) -> Self {
        let valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        let n = valid.len();
        if n == 0 {
            return ResidualStats {
                mean: f64::NAN,
                std: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
                count: 0,
            };
        }

        let mean = valid.iter().sum::<f64>() / n as f64;
        let std = if n < 2 {
            f64::NAN
        } else {
            let ss: f64 = valid.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        };
        let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
        let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        ResidualStats {
            mean,
            std,
            min,
            max,
            count: n,
        }
    }
}

/// Elementwise `pv - sp`, aligned by row.
pub fn residuals(pv: &[f64], sp: &[f64]) -> Vec<f64> {
    pv.iter().zip(sp).map(|(p, s)| p - s).collect()
}

/// `(x - mean) / std` for every sample.
///
/// Zero or NaN `std` is not guarded: the result is non-finite everywhere.
pub fn standardize(values: &[f64], stats: &ResidualStats) -> Vec<f64> {
    values.iter().map(|v| (v - stats.mean) / stats.std).collect()
}

// ---------------------------------------------------------------------------
// Per-loop result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoopResult {
    pub spec: LoopSpec,
    pub residuals: Vec<f64>,
    pub stats: ResidualStats,
    pub standardized: Vec<f64>,
}

impl LoopResult {
    pub fn compute(spec: &LoopSpec, pv: &[f64], sp: &[f64]) -> Self {
        let residuals = residuals(pv, sp);
        let stats = ResidualStats::from_series(&residuals);
        if stats.count == 0 {
            log::warn!("{}: no valid residual samples", spec.label);
        } else if stats.std == 0.0 || !stats.std.is_finite() {
            log::warn!(
                "{}: residual standard deviation is {}, standardized values will be non-finite",
                spec.label,
                stats.std
            );
        }
        let standardized = standardize(&residuals, &stats);
        log::debug!(
            "{}: n={} mean={:.4} std={:.4} min={:.4} max={:.4}",
            spec.label,
            stats.count,
            stats.mean,
            stats.std,
            stats.min,
            stats.max
        );
        LoopResult {
            spec: spec.clone(),
            residuals,
            stats,
            standardized,
        }
    }
}

/// Everything the renderer and the summary need.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub time: TimeAxis,
    pub loops: Vec<LoopResult>,
}

/// Resolve every configured column, then reduce each loop.
///
/// Column lookups all happen before any computation, so a missing or
/// non-numeric column fails the run up front.
pub fn analyze(table: &ProcessTable, config: &ReportConfig) -> Result<Analysis, ReportError> {
    if table.is_empty() {
        log::warn!("input table has no rows");
    }
    let time = table.time_axis(&config.timestamp_column)?;

    let columns = config
        .loops
        .iter()
        .map(|spec| {
            let pv = table.numeric_column(&spec.pv_column)?;
            let sp = table.numeric_column(&spec.sp_column)?;
            Ok((spec, pv, sp))
        })
        .collect::<Result<Vec<_>, ReportError>>()?;

    let loops = columns
        .iter()
        .map(|(spec, pv, sp)| LoopResult::compute(spec, pv, sp))
        .collect();

    log::info!("Computed residuals for {} loops", config.loops.len());
    Ok(Analysis { time, loops })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::CellValue;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    #[test]
    fn stats_of_small_series() {
        let r = residuals(&[10.0, 12.0, 11.0], &[10.0, 10.0, 10.0]);
        assert_eq!(r, vec![0.0, 2.0, 1.0]);
        let s = ResidualStats::from_series(&r);
        assert!(approx(s.mean, 1.0));
        assert!(approx(s.std, 1.0));
        assert_eq!((s.min, s.max, s.count), (0.0, 2.0, 3));
    }

    #[test]
    fn nan_samples_are_skipped() {
        let s = ResidualStats::from_series(&[1.0, f64::NAN, 3.0]);
        assert_eq!(s.count, 2);
        assert!(approx(s.mean, 2.0));
        assert!(approx(s.std, 2f64.sqrt()));
    }

    #[test]
    fn degenerate_counts() {
        let one = ResidualStats::from_series(&[5.0]);
        assert_eq!(one.mean, 5.0);
        assert!(one.std.is_nan());

        let none = ResidualStats::from_series(&[]);
        assert_eq!(none.count, 0);
        assert!(none.mean.is_nan() && none.min.is_nan() && none.max.is_nan());
    }

    #[test]
    fn standardization_inverts() {
        let r = vec![0.3, -1.7, 2.2, 5.0, -0.4, 0.0];
        let s = ResidualStats::from_series(&r);
        let z = standardize(&r, &s);
        for (orig, zi) in r.iter().zip(&z) {
            assert!((zi * s.std + s.mean - orig).abs() < 1e-9);
        }
        let zs = ResidualStats::from_series(&z);
        assert!(approx(zs.mean, 0.0));
        assert!(approx(zs.std, 1.0));
    }

    #[test]
    fn zero_variance_is_non_finite() {
        let spec = LoopSpec::new("LT_101", "SP_LT_101", "Level 101");
        let result = LoopResult::compute(&spec, &[2.0, 2.0, 2.0], &[1.0, 1.0, 1.0]);
        assert_eq!(result.stats.std, 0.0);
        assert!(result.standardized.iter().all(|v| !v.is_finite()));
    }

    #[test]
    fn analyze_resolves_all_columns_first() {
        let table = ProcessTable::from_columns(vec![
            ("timestamp".into(), vec![CellValue::Integer(0), CellValue::Integer(1)]),
            ("TT_101".into(), vec![CellValue::Float(1.0), CellValue::Float(2.0)]),
            ("SP_TT_101".into(), vec![CellValue::Float(1.0), CellValue::Float(1.0)]),
        ]);
        let mut config = ReportConfig::default();
        config.loops.truncate(1);
        let analysis = analyze(&table, &config).unwrap();
        assert_eq!(analysis.loops.len(), 1);
        assert_eq!(analysis.loops[0].residuals, vec![0.0, 1.0]);

        let err = analyze(&table, &ReportConfig::default()).unwrap_err();
        assert!(matches!(err, ReportError::MissingColumn { column } if column == "TT_102"));
    }
}
