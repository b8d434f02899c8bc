//! Run report generation

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::driver::Verdict;

/// Verdict counts across a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub timed_out: usize,
    pub load_errors: usize,
}

impl Tally {
    pub fn record(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::Passed => self.passed += 1,
            Verdict::Failed(_) => self.failed += 1,
            Verdict::Skipped(_) => self.skipped += 1,
            Verdict::TimedOut(_) => self.timed_out += 1,
        }
    }

    /// Tests that reached a verdict
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.timed_out
    }

    /// Skipped tests never affect success
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.timed_out == 0 && self.load_errors == 0
    }

    /// Message describing why the run failed, if it did
    pub fn failure_message(&self) -> Option<String> {
        let failed = self.failed + self.timed_out;
        let mut parts = Vec::new();
        if failed > 0 {
            parts.push(format!("{} test{} failed", failed, plural(failed)));
        }
        if self.load_errors > 0 {
            parts.push(format!(
                "{} spec file{} failed to load",
                self.load_errors,
                plural(self.load_errors)
            ));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n > 1 {
        "s"
    } else {
        ""
    }
}

impl std::fmt::Display for Tally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} skipped, {} timed out",
            self.passed, self.failed, self.skipped, self.timed_out
        )
    }
}

/// Verdict of one test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    pub spec: PathBuf,
    pub name: String,
    pub verdict: Verdict,
}

/// A spec file that could not be loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadFailure {
    pub spec: PathBuf,
    pub error: String,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Tool version
    pub version: String,

    /// When the run started
    pub timestamp: DateTime<Utc>,

    pub tally: Tally,

    /// Per-test verdicts in execution order
    pub tests: Vec<TestRecord>,

    pub load_failures: Vec<LoadFailure>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            tally: Tally::default(),
            tests: Vec::new(),
            load_failures: Vec::new(),
        }
    }

    pub fn record(&mut self, spec: &Path, name: &str, verdict: Verdict) {
        self.tally.record(&verdict);
        self.tests.push(TestRecord {
            spec: spec.to_path_buf(),
            name: name.to_string(),
            verdict,
        });
    }

    pub fn record_load_error(&mut self, spec: &Path, error: impl std::fmt::Display) {
        self.tally.load_errors += 1;
        self.load_failures.push(LoadFailure {
            spec: spec.to_path_buf(),
            error: error.to_string(),
        });
    }

    pub fn is_success(&self) -> bool {
        self.tally.is_success()
    }

    /// Print a colored summary to stdout
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60).bright_blue());
        println!("{}", "stmtflow Test Report".bold().bright_blue());
        println!("{}", "=".repeat(60).bright_blue());
        println!();

        let not_passed: Vec<&TestRecord> = self
            .tests
            .iter()
            .filter(|t| !matches!(t.verdict, Verdict::Passed))
            .collect();
        for record in &not_passed {
            let status = match record.verdict {
                Verdict::Failed(_) => "FAILED".red().bold(),
                Verdict::TimedOut(_) => "TIMEOUT".red().bold(),
                _ => "SKIPPED".yellow().bold(),
            };
            println!("  [{}] {}#{}", status, record.spec.display(), record.name);
            if let Some(message) = record.verdict.message() {
                println!("    {}", message.dimmed());
            }
        }
        for failure in &self.load_failures {
            println!("  [{}] {}", "LOAD".red().bold(), failure.spec.display());
            println!("    {}", failure.error.dimmed());
        }
        if !not_passed.is_empty() || !self.load_failures.is_empty() {
            println!();
        }

        println!("{}", "Summary:".bold());
        println!("  Passed:    {}", self.tally.passed.to_string().green());
        if self.tally.failed > 0 {
            println!("  Failed:    {}", self.tally.failed.to_string().red().bold());
        } else {
            println!("  Failed:    {}", self.tally.failed.to_string().green());
        }
        println!("  Skipped:   {}", self.tally.skipped.to_string().yellow());
        if self.tally.timed_out > 0 {
            println!("  Timed out: {}", self.tally.timed_out.to_string().red().bold());
        } else {
            println!("  Timed out: {}", self.tally.timed_out);
        }
        println!();

        if self.is_success() {
            println!("{}", "✓ All tests passed!".green().bold());
        }
        println!("{}", "=".repeat(60).bright_blue());
    }

    /// Export report as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export report as JSON to file
    pub fn save_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
