use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ReportError;

// ---------------------------------------------------------------------------
// Loop descriptor
// ---------------------------------------------------------------------------

/// One monitored control loop: measured value, setpoint, and panel label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSpec {
    pub pv_column: String,
    pub sp_column: String,
    pub label: String,
}

impl LoopSpec {
    pub fn new(pv: &str, sp: &str, label: &str) -> Self {
        LoopSpec {
            pv_column: pv.to_string(),
            sp_column: sp.to_string(),
            label: label.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reference lines
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineDash {
    Solid,
    Dashed,
    Dotted,
}

/// Horizontal guide line drawn on every panel, in standardized units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLine {
    pub y: f64,
    pub color: [u8; 3],
    pub dash: LineDash,
    pub alpha: f64,
}

/// Largest figure edge, in pixels, that the renderer will allocate.
pub const MAX_FIGURE_PIXELS: f64 = 32_768.0;

const RED: [u8; 3] = [214, 39, 40];
const ORANGE: [u8; 3] = [255, 127, 14];

fn sigma_bands() -> Vec<ReferenceLine> {
    let line = |y, color, dash, alpha| ReferenceLine { y, color, dash, alpha };
    vec![
        line(0.0, RED, LineDash::Dashed, 0.7),
        line(2.0, ORANGE, LineDash::Dotted, 0.5),
        line(-2.0, ORANGE, LineDash::Dotted, 0.5),
        line(3.0, RED, LineDash::Dotted, 0.5),
        line(-3.0, RED, LineDash::Dotted, 0.5),
    ]
}

// ---------------------------------------------------------------------------
// Report configuration
// ---------------------------------------------------------------------------

/// Everything a report run needs. Missing fields in a config file fall back
/// to the CSTR defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub timestamp_column: String,
    /// Loops in panel order (row-major).
    pub loops: Vec<LoopSpec>,
    pub reference_lines: Vec<ReferenceLine>,
    /// Fixed y-axis view `[low, high]`.
    pub y_limits: [f64; 2],
    /// Figure size in inches `[width, height]`.
    pub figure_size: [f64; 2],
    pub dpi: u32,
    pub grid_columns: usize,
    pub title: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("cascaded_cstr.csv"),
            output: PathBuf::from("standardized_residuals.png"),
            timestamp_column: "timestamp".to_string(),
            loops: vec![
                LoopSpec::new("TT_101", "SP_TT_101", "Temperature 101"),
                LoopSpec::new("TT_102", "SP_TT_102", "Temperature 102"),
                LoopSpec::new("LT_101", "SP_LT_101", "Level 101"),
                LoopSpec::new("LT_102", "SP_LT_102", "Level 102"),
            ],
            reference_lines: sigma_bands(),
            y_limits: [-4.0, 4.0],
            figure_size: [14.0, 10.0],
            dpi: 150,
            grid_columns: 2,
            title: "Standardized Residuals (PV - SP) for CSTR Control Loops".to_string(),
        }
    }
}

impl ReportConfig {
    /// Read a JSON config file. Any subset of fields may be given.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ReportConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Figure size in pixels at the configured DPI.
    pub fn pixel_size(&self) -> (u32, u32) {
        let dpi = self.dpi as f64;
        (
            (self.figure_size[0] * dpi).round() as u32,
            (self.figure_size[1] * dpi).round() as u32,
        )
    }

    /// Check constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ReportError> {
        let invalid =
            |msg: String| -> Result<(), ReportError> { Err(ReportError::InvalidConfig(msg)) };

        if self.loops.is_empty() {
            return invalid("at least one loop is required".into());
        }
        for (i, l) in self.loops.iter().enumerate() {
            if l.pv_column.is_empty() || l.sp_column.is_empty() {
                return invalid(format!("loops[{i}]: column names must not be empty"));
            }
        }
        if self.timestamp_column.is_empty() {
            return invalid("timestamp_column must not be empty".into());
        }
        if self.dpi == 0 {
            return invalid("dpi must be positive".into());
        }
        if !self.figure_size.iter().all(|s| s.is_finite() && *s > 0.0) {
            return invalid(format!("figure_size {:?} must be positive", self.figure_size));
        }
        if let Some(edge) = self
            .figure_size
            .iter()
            .map(|s| s * self.dpi as f64)
            .find(|px| px.round() > MAX_FIGURE_PIXELS)
        {
            return invalid(format!(
                "figure edge of {edge:.0} pixels exceeds {MAX_FIGURE_PIXELS} (figure_size {:?} at {} dpi)",
                self.figure_size, self.dpi
            ));
        }
        let [lo, hi] = self.y_limits;
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return invalid(format!("y_limits [{lo}, {hi}] must be increasing"));
        }
        if self.grid_columns == 0 {
            return invalid("grid_columns must be positive".into());
        }
        if let Some(line) = self
            .reference_lines
            .iter()
            .find(|l| !(0.0..=1.0).contains(&l.alpha) || !l.y.is_finite())
        {
            return invalid(format!("reference line at y={} has alpha {}", line.y, line.alpha));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_cstr_report() {
        let c = ReportConfig::default();
        let pvs: Vec<&str> = c.loops.iter().map(|l| l.pv_column.as_str()).collect();
        assert_eq!(pvs, vec!["TT_101", "TT_102", "LT_101", "LT_102"]);
        assert_eq!(c.loops[3].sp_column, "SP_LT_102");
        assert_eq!(c.pixel_size(), (2100, 1500));
        let ys: Vec<f64> = c.reference_lines.iter().map(|l| l.y).collect();
        assert_eq!(ys, vec![0.0, 2.0, -2.0, 3.0, -3.0]);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        std::fs::write(
            &path,
            r#"{"dpi": 72, "loops": [{"pv_column": "FT_101", "sp_column": "SP_FT_101", "label": "Flow"}],
                "reference_lines": [{"y": 1.0, "color": [0, 0, 0], "dash": "solid", "alpha": 1.0}]}"#,
        )
        .unwrap();
        let c = ReportConfig::load(&path).unwrap();
        assert_eq!(c.dpi, 72);
        assert_eq!(c.loops.len(), 1);
        assert_eq!(c.reference_lines[0].dash, LineDash::Solid);
        assert_eq!(c.output, PathBuf::from("standardized_residuals.png"));
        assert_eq!(c.y_limits, [-4.0, 4.0]);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut c = ReportConfig::default();
        c.loops.clear();
        assert!(matches!(c.validate(), Err(ReportError::InvalidConfig(_))));

        let mut c = ReportConfig::default();
        c.y_limits = [4.0, -4.0];
        assert!(c.validate().is_err());

        let mut c = ReportConfig::default();
        c.dpi = 0;
        assert!(c.validate().is_err());

        let mut c = ReportConfig::default();
        c.grid_columns = 0;
        assert!(c.validate().is_err());

        let mut c = ReportConfig::default();
        c.reference_lines[0].alpha = 1.5;
        assert!(c.validate().is_err());

        let mut c = ReportConfig::default();
        c.figure_size = [0.0, 10.0];
        assert!(c.validate().is_err());
    }

    #[test]
    fn oversized_figures_are_rejected() {
        let mut c = ReportConfig::default();
        c.figure_size = [1e12, 1e12];
        assert!(matches!(c.validate(), Err(ReportError::InvalidConfig(_))));

        let mut c = ReportConfig::default();
        c.dpi = 4_000_000_000;
        assert!(c.validate().is_err());

        let mut c = ReportConfig::default();
        c.figure_size = [MAX_FIGURE_PIXELS / 100.0, 10.0];
        c.dpi = 100;
        assert!(c.validate().is_ok());
    }
}
