//! Local diff of expected vs. actual text output
//!
//! With a command line configured (e.g. `diff -u -N --color`) both texts are
//! written to a temporary directory and the command is run over the two
//! files. An empty command line falls back to a built-in unified diff.

use similar::TextDiff;
use tokio::process::Command;

use crate::DriverError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDiff {
    command: Vec<String>,
}

impl LocalDiff {
    /// Parse a command line; arguments are separated by whitespace
    pub fn new(command: &str) -> Self {
        Self {
            command: command.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.command.is_empty()
    }

    /// Diff `expected` against `actual`, labelling both sides with `name`
    pub async fn render(&self, name: &str, expected: &str, actual: &str) -> Result<String, DriverError> {
        match self.command.split_first() {
            None => Ok(unified_diff(name, expected, actual)),
            Some((program, args)) => external_diff(program, args, name, expected, actual).await,
        }
    }
}

fn unified_diff(name: &str, expected: &str, actual: &str) -> String {
    TextDiff::from_lines(expected, actual)
        .unified_diff()
        .context_radius(3)
        .header(&format!("{name}.expected"), &format!("{name}.actual"))
        .to_string()
}

async fn external_diff(
    program: &str,
    args: &[String],
    name: &str,
    expected: &str,
    actual: &str,
) -> Result<String, DriverError> {
    let dir = tempfile::tempdir().map_err(|e| DriverError::Diff(e.to_string()))?;
    let stem = file_stem(name);
    let expected_path = dir.path().join(format!("{stem}.expected"));
    let actual_path = dir.path().join(format!("{stem}.actual"));
    tokio::fs::write(&expected_path, expected)
        .await
        .map_err(|e| DriverError::io(&expected_path, e))?;
    tokio::fs::write(&actual_path, actual)
        .await
        .map_err(|e| DriverError::io(&actual_path, e))?;

    let output = Command::new(program)
        .args(args)
        .arg(&expected_path)
        .arg(&actual_path)
        .output()
        .await
        .map_err(|e| DriverError::Diff(format!("{program}: {e}")))?;

    // diff exits with 1 when the inputs differ
    match output.status.code() {
        Some(0) | Some(1) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
        _ => Err(DriverError::Diff(format!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ))),
    }
}

/// Test names may contain path separators
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
