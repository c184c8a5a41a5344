use thiserror::Error;

// ---------------------------------------------------------------------------
// Domain errors
// ---------------------------------------------------------------------------

/// Failures that abort a report run. I/O plumbing uses `anyhow` on top of
/// these; this enum covers the cases callers (and tests) match on.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("column '{column}' not found in input table")]
    MissingColumn { column: String },

    #[error("column '{column}', row {row}: '{value}' is not a number")]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },

    #[error("timestamp column '{column}', row {row}: cannot interpret '{value}' as a time")]
    BadTimestamp {
        column: String,
        row: usize,
        value: String,
    },

    #[error("no SP_/PV column pairs found in input table")]
    NoLoops,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("rendering failed: {0}")]
    Render(String),
}
