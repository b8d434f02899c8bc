//! Test driver for stmtflow
//!
//! Ties the pieces together:
//! - `Driver` runs structured tests (repeat, version gate, timeout, assert)
//! - `play` runs raw annotated scripts and records expected results
//! - `generate` turns an external generator's output into a script
//! - `RunReport` aggregates verdicts across spec files

pub mod diff;
pub mod discover;
pub mod driver;
pub mod generate;
pub mod play;
pub mod report;

use std::path::PathBuf;
use std::time::Duration;

pub use diff::LocalDiff;
pub use discover::{collect_files, SCRIPT_EXTENSIONS, SPEC_EXTENSIONS};
pub use driver::{Driver, DriverOptions, Verdict};
pub use generate::{generate, GenerateOptions, GeneratedCase, DEFAULT_CASE_NAME};
pub use play::{play, result_paths, PlayOptions};
pub use report::{LoadFailure, RunReport, Tally, TestRecord};

/// Errors from the driver flows
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Split(#[from] stmtflow_sql::SplitError),

    #[error(transparent)]
    Exec(#[from] stmtflow_executor::ExecError),

    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("diff command failed: {0}")]
    Diff(String),

    #[error("generator failed: {0}")]
    Generator(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DriverError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DriverError::Io {
            path: path.into(),
            source,
        }
    }
}
