//! Scripts from an external statement generator
//!
//! The generator is any command printing a JSON object with the statements
//! that prepare the schema and the statements under test:
//!
//! ```json
//! {"init": ["create table t (a int)"], "test": ["insert into t values (1)"]}
//! ```
//!
//! The case is written as a script that resets the `test` database, runs the
//! init statements and then the test statements, all on one session.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::DriverError;

const PREAMBLE: [&str; 3] = [
    "/* init */ drop database if exists test;",
    "/* init */ create database if not exists test;",
    "/* init */ use test;",
];

/// Default name of a generated case
pub const DEFAULT_CASE_NAME: &str = "sample_case";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCase {
    #[serde(default)]
    pub init: Vec<String>,

    #[serde(default)]
    pub test: Vec<String>,
}

impl GeneratedCase {
    /// Render as an annotated script
    pub fn to_script(&self) -> String {
        let mut script: String = PREAMBLE.iter().map(|line| format!("{line}\n")).collect();
        for sql in &self.init {
            script.push_str(&format!("/* init */ {};\n", sql.trim()));
        }
        for sql in &self.test {
            script.push_str(&format!("/* s1 */ {};\n", sql.trim()));
        }
        script
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Generator command line, arguments separated by whitespace
    pub generator: String,

    /// File name of the case, without extension
    pub case_name: String,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            generator: String::new(),
            case_name: DEFAULT_CASE_NAME.to_string(),
        }
    }
}

/// Run the generator and write `<dir>/<case_name>.sql`
pub async fn generate(dir: &Path, opts: &GenerateOptions) -> Result<PathBuf, DriverError> {
    let case = run_generator(&opts.generator).await?;
    tracing::debug!(init = case.init.len(), test = case.test.len(), "generated case");

    let path = dir.join(format!("{}.sql", opts.case_name));
    std::fs::write(&path, case.to_script()).map_err(|e| DriverError::io(&path, e))?;
    Ok(path)
}

async fn run_generator(command: &str) -> Result<GeneratedCase, DriverError> {
    let mut words = command.split_whitespace();
    let program = words
        .next()
        .ok_or_else(|| DriverError::Generator("no generator command configured".to_string()))?;

    let output = tokio::process::Command::new(program)
        .args(words)
        .output()
        .await
        .map_err(|e| DriverError::Generator(format!("{program}: {e}")))?;
    if !output.status.success() {
        return Err(DriverError::Generator(format!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(serde_json::from_slice(&output.stdout)?)
}
