use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::analysis::{analyze, Analysis};
use crate::config::ReportConfig;
use crate::data::discover::discover_loops;
use crate::data::loader::load_file;
use crate::error::ReportError;
use crate::render::save_figure;
use crate::summary::{format_summary, write_summary_json};

// ---------------------------------------------------------------------------
// Report run
// ---------------------------------------------------------------------------

/// Options that do not belong in a reusable config file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Replace the configured loops with SP_/PV pairs found in the header.
    pub discover: bool,
    /// Also write the statistics as JSON here.
    pub summary_json: Option<PathBuf>,
}

/// Load, analyze, draw, save, and return the text to print.
///
/// Nothing is written unless every column resolves.
pub fn run(mut config: ReportConfig, options: &RunOptions) -> Result<(Analysis, String)> {
    let table = load_file(&config.input)?;

    if options.discover {
        let loops = discover_loops(&table.column_names);
        if loops.is_empty() {
            return Err(ReportError::NoLoops.into());
        }
        log::info!("Discovered {} SP/PV loops", loops.len());
        config.loops = loops;
    }
    config.validate()?;

    let analysis = analyze(&table, &config)
        .with_context(|| format!("analyzing {}", config.input.display()))?;

    save_figure(&analysis, &config, &config.output)?;
    log::debug!("No interactive display available; figure written to disk only");

    if let Some(path) = &options.summary_json {
        write_summary_json(&analysis.loops, path)?;
    }

    let mut text = format!("Plot saved as '{}'\n", config.output.display());
    text.push_str(&format_summary(&analysis.loops));
    Ok((analysis, text))
}
