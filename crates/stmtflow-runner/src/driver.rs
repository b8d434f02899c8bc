//! Per-test control loop
//!
//! Each test runs `repeat` times, every iteration on a fresh connection:
//!
//! 1. connect
//! 2. check the server version against the test's constraint
//! 3. run the statements under the configured timeout
//! 4. assert the collected history
//!
//! A version gate failure skips the test, a timeout times it out and an
//! assertion failure fails it. Any of them stops the remaining iterations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stmtflow_core::config::{DEFAULT_DIFF_CMD, DEFAULT_TIMEOUT_SECS};
use stmtflow_core::{History, TextDumpOptions};
use stmtflow_engine::{check_version, Loader, Test, VersionError};
use stmtflow_executor::{ConnectionProvider, Database, EvalOptions, Executor, SequentialExecutor};

use crate::diff::LocalDiff;
use crate::discover::{collect_files, SPEC_EXTENSIONS};
use crate::report::RunReport;
use crate::DriverError;

/// Terminal state of one test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed(String),
    Skipped(String),
    TimedOut(String),
}

impl Verdict {
    pub fn message(&self) -> Option<&str> {
        match self {
            Verdict::Passed => None,
            Verdict::Failed(msg) | Verdict::Skipped(msg) | Verdict::TimedOut(msg) => Some(msg),
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Passed => write!(f, "passed"),
            Verdict::Failed(msg) => write!(f, "failed: {}", msg),
            Verdict::Skipped(msg) => write!(f, "skipped: {}", msg),
            Verdict::TimedOut(msg) => write!(f, "timed out: {}", msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Execution timeout of one iteration
    pub timeout: Duration,

    /// List tests without running them
    pub dry_run: bool,

    /// Print a diff when a test with expected text fails
    pub diff: bool,

    /// External diff command; empty means the built-in unified diff
    pub diff_cmd: String,

    pub eval: EvalOptions,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            dry_run: false,
            diff: false,
            diff_cmd: DEFAULT_DIFF_CMD.to_string(),
            eval: EvalOptions::default(),
        }
    }
}

/// Runs structured tests against connections from a provider
pub struct Driver<'a> {
    provider: &'a dyn ConnectionProvider,
    executor: Box<dyn Executor>,
    loader: Loader,
    opts: DriverOptions,
}

impl<'a> Driver<'a> {
    pub fn new(provider: &'a dyn ConnectionProvider, loader: Loader, opts: DriverOptions) -> Self {
        Self {
            provider,
            executor: Box::new(SequentialExecutor::new()),
            loader,
            opts,
        }
    }

    /// Replace the execution engine
    pub fn with_executor(mut self, executor: Box<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Run every spec under `paths`; directories are walked for spec files
    pub async fn run_paths(&self, paths: &[PathBuf]) -> Result<RunReport, DriverError> {
        let mut report = RunReport::new();
        for path in collect_files(paths, SPEC_EXTENSIONS)? {
            self.run_spec(&path, &mut report).await;
        }
        Ok(report)
    }

    /// Run the tests of one spec file, recording verdicts in `report`
    ///
    /// A spec that fails to load is recorded as a load error; its tests are
    /// not run.
    pub async fn run_spec(&self, path: &Path, report: &mut RunReport) {
        let shown = path.display();
        tracing::info!("[{}] load tests", shown);
        let tests = match self.loader.load(path) {
            Ok(tests) => tests,
            Err(err) => {
                tracing::error!("[{}] failed to load: {}", shown, err);
                report.record_load_error(path, err);
                return;
            }
        };

        for test in &tests {
            if self.opts.dry_run {
                tracing::info!(
                    "[{}#{}] method:{} labels:{:?}",
                    shown,
                    test.name,
                    test.assert_method,
                    test.labels
                );
                continue;
            }

            let verdict = self.run_test(test).await;
            match &verdict {
                Verdict::Passed => tracing::info!("[{}#{}] passed", shown, test.name),
                Verdict::Skipped(_) => tracing::info!("[{}#{}] {}", shown, test.name, verdict),
                _ => tracing::warn!("[{}#{}] {}", shown, test.name, verdict),
            }
            report.record(path, &test.name, verdict);
        }
    }

    /// Run one test through all its iterations
    pub async fn run_test(&self, test: &Test) -> Verdict {
        for i in 0..test.repeat {
            tracing::debug!(test = %test.name, iteration = i + 1, repeat = test.repeat, "running");
            let mut db = match self.provider.connect().await {
                Ok(db) => db,
                Err(err) => return Verdict::Failed(format!("connect: {}", err)),
            };
            let verdict = self.run_once(db.as_ref(), test).await;
            if let Err(err) = db.close().await {
                tracing::debug!(test = %test.name, error = %err, "failed to close connection");
            }
            if let Some(verdict) = verdict {
                return verdict;
            }
        }
        Verdict::Passed
    }

    /// One iteration; `None` means it passed
    async fn run_once(&self, db: &dyn Database, test: &Test) -> Option<Verdict> {
        if let Err(err) = self.gate(db, test).await {
            return Some(Verdict::Skipped(err.to_string()));
        }

        let mut history = History::new();
        let outcome = tokio::time::timeout(
            self.opts.timeout,
            self.executor
                .run(db, &test.stmts, &self.opts.eval, &mut |event| history.collect(event)),
        )
        .await;
        match outcome {
            Err(_) => {
                return Some(Verdict::TimedOut(format!(
                    "execution exceeded {:?}",
                    self.opts.timeout
                )))
            }
            Ok(Err(err)) if err.is_timeout() => return Some(Verdict::TimedOut(err.to_string())),
            Ok(Err(err)) => return Some(Verdict::Failed(format!("run test: {}", err))),
            Ok(Ok(())) => {}
        }

        let err = test.assert(&history).err()?;
        if err.is_evaluation_error() {
            tracing::error!(test = %test.name, error = %err, "assertion could not be evaluated");
        } else if self.opts.diff {
            self.show_diff(test, &history).await;
        }
        Some(Verdict::Failed(err.to_string()))
    }

    async fn gate(&self, db: &dyn Database, test: &Test) -> Result<(), VersionError> {
        let Some(constraint) = test.version_constraint.as_deref() else {
            return Ok(());
        };
        let raw = db
            .server_version()
            .await
            .map_err(|e| VersionError::Unavailable(e.to_string()))?;
        check_version(&raw, Some(constraint))?;
        Ok(())
    }

    async fn show_diff(&self, test: &Test, actual: &History) {
        let Some(expected) = test.expected_text() else {
            return;
        };
        let actual = actual.to_text(TextDumpOptions::canonical());
        match LocalDiff::new(&self.opts.diff_cmd).render(&test.name, &expected, &actual).await {
            Ok(diff) => print!("{}", diff),
            Err(err) => tracing::warn!(test = %test.name, error = %err, "failed to diff"),
        }
    }
}
