mod analysis;
mod color;
mod config;
mod data;
mod error;
mod render;
mod report;
mod summary;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use config::ReportConfig;
use report::RunOptions;

/// Plot standardized PV - SP residuals for process control loops.
#[derive(Parser)]
#[command(name = "cstr-residuals")]
#[command(version)]
struct Cli {
    /// JSON report config; missing fields use the CSTR defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input table (.csv, .json or .parquet)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output PNG path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output resolution
    #[arg(long)]
    dpi: Option<u32>,

    /// Build the loop list from SP_<tag>/<tag> column pairs in the input
    #[arg(long)]
    discover: bool,

    /// Also write residual statistics as JSON
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

impl Cli {
    fn report_config(&self) -> Result<ReportConfig> {
        let mut config = match &self.config {
            Some(path) => ReportConfig::load(path)?,
            None => ReportConfig::default(),
        };
        if let Some(input) = &self.input {
            config.input = input.clone();
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(dpi) = self.dpi {
            config.dpi = dpi;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.report_config()?;
    let options = RunOptions {
        discover: cli.discover,
        summary_json: cli.summary_json.clone(),
    };

    let (_, text) = report::run(config, &options)?;
    print!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from(["cstr-residuals", "-i", "plant.parquet", "--dpi", "300", "--discover"]);
        assert!(cli.discover);
        let config = cli.report_config().unwrap();
        assert_eq!(config.input, PathBuf::from("plant.parquet"));
        assert_eq!(config.dpi, 300);
        assert_eq!(config.output, PathBuf::from("standardized_residuals.png"));
    }

    #[test]
    fn no_flags_means_cstr_defaults() {
        let cli = Cli::parse_from(["cstr-residuals"]);
        assert_eq!(cli.report_config().unwrap(), ReportConfig::default());
    }
}
