//! Text rendering of histories
//!
//! The verbose form is canonical: text assertions and `.result` files both
//! use it, one line per event in execution order.

use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::history::{Event, EventKind, StmtResult};

/// Options for text dumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextDumpOptions {
    /// Include result rows instead of row counts
    pub verbose: bool,

    /// Append recorded latency to returned events
    pub with_latency: bool,
}

impl Default for TextDumpOptions {
    fn default() -> Self {
        Self {
            verbose: true,
            with_latency: false,
        }
    }
}

impl TextDumpOptions {
    /// The canonical form used for comparisons
    pub fn canonical() -> Self {
        Self {
            verbose: true,
            with_latency: false,
        }
    }
}

/// Render one event as a single line (without trailing newline)
pub fn format_event(event: &Event, opts: TextDumpOptions) -> String {
    let session = event.session();
    match event.kind {
        EventKind::Invoke => event.stmt.script_text().trim_end().to_string(),
        EventKind::Blocked => format!("-- {} >> blocked", session),
        EventKind::Resumed => format!("-- {} >> resumed", session),
        EventKind::Returned => {
            let body = match &event.result {
                Some(result) => format_result(result, opts.verbose),
                None => "returned".to_string(),
            };
            match event.latency_ms {
                Some(ms) if opts.with_latency => format!("-- {} >> {} ({}ms)", session, body, ms),
                _ => format!("-- {} >> {}", session, body),
            }
        }
    }
}

/// Render a statement result on one line
pub fn format_result(result: &StmtResult, verbose: bool) -> String {
    match result {
        StmtResult::Rows { rows, .. } if !verbose => format!("{} rows", rows.len()),
        StmtResult::Rows { rows, .. } if rows.is_empty() => "rows: (empty)".to_string(),
        StmtResult::Rows { rows, .. } => {
            let rendered: Vec<String> = rows
                .iter()
                .map(|row| {
                    let cells: Vec<String> = row
                        .iter()
                        .map(|cell| match cell {
                            Some(value) => escape(value),
                            None => "NULL".to_string(),
                        })
                        .collect();
                    format!("[{}]", cells.join(", "))
                })
                .collect();
            format!("rows: {}", rendered.join(" "))
        }
        StmtResult::Affected { rows } => format!("{} rows affected", rows),
        StmtResult::Error { code: Some(code), message } => format!("E{}: {}", code, escape(message)),
        StmtResult::Error { code: None, message } => format!("error: {}", escape(message)),
    }
}

fn escape(value: &str) -> String {
    value.replace('\r', "\\r").replace('\n', "\\n")
}

/// Write one event followed by a newline
pub fn write_event(out: &mut dyn Write, event: &Event, opts: TextDumpOptions) -> std::io::Result<()> {
    writeln!(out, "{}", format_event(event, opts))
}

/// Streams events to a writer as they are produced
pub struct TextDumper<W: Write> {
    out: W,
    opts: TextDumpOptions,
}

impl<W: Write> TextDumper<W> {
    pub fn new(out: W, opts: TextDumpOptions) -> Self {
        Self { out, opts }
    }

    pub fn handle(&mut self, event: &Event) -> std::io::Result<()> {
        write_event(&mut self.out, event, self.opts)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
