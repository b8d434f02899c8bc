//! Running raw annotated scripts
//!
//! `play` splits a script, runs it on a fresh connection and streams the
//! text dump of every event as it happens. In write mode the run becomes
//! the script's expected result: `<script>.result` receives the text dump
//! and `<script>.result.json` the history.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use stmtflow_core::config::DEFAULT_TIMEOUT_SECS;
use stmtflow_core::{History, TextDumpOptions, TextDumper};
use stmtflow_executor::{ConnectionProvider, EvalOptions, Executor};

use crate::DriverError;

#[derive(Debug, Clone, Copy)]
pub struct PlayOptions {
    /// Write expected result files next to the script
    pub write: bool,

    pub dump: TextDumpOptions,
    pub timeout: Duration,
    pub eval: EvalOptions,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            write: false,
            dump: TextDumpOptions::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            eval: EvalOptions::default(),
        }
    }
}

/// Text and JSON result files of a script
pub fn result_paths(script: &Path) -> (PathBuf, PathBuf) {
    (script.with_extension("result"), script.with_extension("result.json"))
}

/// Run one script, streaming its text dump to `out`
pub async fn play(
    provider: &dyn ConnectionProvider,
    executor: &dyn Executor,
    script: &Path,
    opts: &PlayOptions,
    out: &mut (dyn Write + Send),
) -> Result<History, DriverError> {
    let stmts = stmtflow_sql::split_file(script)?;
    tracing::debug!(script = %script.display(), stmts = stmts.len(), "playing");

    let mut db = provider.connect().await?;
    let mut history = History::new();
    let mut dumper = TextDumper::new(out, opts.dump);
    let mut write_error = None;

    let outcome = tokio::time::timeout(
        opts.timeout,
        executor.run(db.as_ref(), &stmts, &opts.eval, &mut |event| {
            if write_error.is_none() {
                write_error = dumper.handle(&event).err();
            }
            history.collect(event);
        }),
    )
    .await;
    if let Err(err) = db.close().await {
        tracing::debug!(error = %err, "failed to close connection");
    }

    outcome.map_err(|_| DriverError::Timeout(opts.timeout))??;
    if let Some(err) = write_error {
        return Err(DriverError::io("<stdout>", err));
    }

    if opts.write {
        write_results(script, &history, opts.dump)?;
    }
    Ok(history)
}

fn write_results(script: &Path, history: &History, dump: TextDumpOptions) -> Result<(), DriverError> {
    let (text_path, json_path) = result_paths(script);
    std::fs::write(&text_path, history.to_text(dump)).map_err(|e| DriverError::io(&text_path, e))?;

    let mut json = Vec::new();
    history
        .dump_json(&mut json)
        .map_err(|e| DriverError::io(&json_path, e))?;
    std::fs::write(&json_path, json).map_err(|e| DriverError::io(&json_path, e))?;

    tracing::info!(text = %text_path.display(), json = %json_path.display(), "wrote results");
    Ok(())
}
