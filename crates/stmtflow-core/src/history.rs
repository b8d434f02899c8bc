//! Execution history model
//!
//! A `History` is the ordered record of statement events produced by an
//! execution engine for one run of a test. Assertions compare an observed
//! history against an expected one, either as text or structurally using
//! `DigestOptions`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::Duration;

use crate::dump::{self, TextDumpOptions};
use crate::stmt::Stmt;

/// Lifecycle step of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Statement was issued
    Invoke,

    /// Statement is waiting on another session
    Blocked,

    /// Statement stopped waiting
    Resumed,

    /// Statement finished, successfully or not
    Returned,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invoke => write!(f, "invoke"),
            Self::Blocked => write!(f, "blocked"),
            Self::Resumed => write!(f, "resumed"),
            Self::Returned => write!(f, "returned"),
        }
    }
}

/// Outcome of a returned statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StmtResult {
    /// Result set; `None` cells are SQL NULL
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Option<String>>>,
    },

    /// Non-query statement
    Affected { rows: u64 },

    /// Statement failed on the server
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
        message: String,
    },
}

impl StmtResult {
    /// Build a result set from string cells
    pub fn rows<I, R, S>(columns: &[&str], rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self::Rows {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(|cell| cell.map(Into::into)).collect())
                .collect(),
        }
    }

    pub fn affected(rows: u64) -> Self {
        Self::Affected { rows }
    }

    pub fn error(code: Option<u16>, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Success class of the result
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Error { .. })
    }
}

/// One statement execution event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,

    pub stmt: Stmt,

    /// Present on `Returned` events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StmtResult>,

    /// Time between invoke and return, when recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
}

impl Event {
    fn new(kind: EventKind, stmt: Stmt, result: Option<StmtResult>) -> Self {
        Self {
            kind,
            stmt,
            result,
            latency_ms: None,
            at: None,
        }
    }

    pub fn invoke(stmt: Stmt) -> Self {
        Self::new(EventKind::Invoke, stmt, None)
    }

    pub fn blocked(stmt: Stmt) -> Self {
        Self::new(EventKind::Blocked, stmt, None)
    }

    pub fn resumed(stmt: Stmt) -> Self {
        Self::new(EventKind::Resumed, stmt, None)
    }

    pub fn returned(stmt: Stmt, result: StmtResult) -> Self {
        Self::new(EventKind::Returned, stmt, Some(result))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = Some(latency.as_millis() as u64);
        self
    }

    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }

    /// Session the event belongs to
    pub fn session(&self) -> &str {
        &self.stmt.session
    }

    /// Compare against an observed event using the given digest
    ///
    /// Returns a field-level message for the first field that differs.
    /// The event kind always participates.
    pub fn mismatch(&self, actual: &Event, opts: &DigestOptions) -> Option<String> {
        if self.kind != actual.kind {
            return Some(format!("kind: expect {}, got {}", self.kind, actual.kind));
        }
        if opts.session && self.stmt.session != actual.stmt.session {
            return Some(format!(
                "session: expect {}, got {}",
                self.stmt.session, actual.stmt.session
            ));
        }
        if opts.sql && self.stmt.sql.trim() != actual.stmt.sql.trim() {
            return Some(format!(
                "sql: expect `{}`, got `{}`",
                self.stmt.sql.trim(),
                actual.stmt.sql.trim()
            ));
        }
        let expected_ok = self.result.as_ref().map(StmtResult::is_ok);
        let actual_ok = actual.result.as_ref().map(StmtResult::is_ok);
        if opts.outcome && expected_ok != actual_ok {
            return Some(format!(
                "outcome: expect {}, got {}",
                outcome_label(expected_ok),
                outcome_label(actual_ok)
            ));
        }
        if opts.payload && self.result != actual.result {
            return Some(format!(
                "result: expect {}, got {}",
                describe(self.result.as_ref()),
                describe(actual.result.as_ref())
            ));
        }
        None
    }
}

fn outcome_label(ok: Option<bool>) -> &'static str {
    match ok {
        Some(true) => "ok",
        Some(false) => "error",
        None => "none",
    }
}

fn describe(result: Option<&StmtResult>) -> String {
    match result {
        Some(result) => dump::format_result(result, true),
        None => "nothing".to_string(),
    }
}

/// Which event fields participate in structural equality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestOptions {
    /// Compare the session label
    pub session: bool,

    /// Compare the statement text (trimmed)
    pub sql: bool,

    /// Compare the success class (ok vs error)
    pub outcome: bool,

    /// Compare the full result payload
    pub payload: bool,
}

impl Default for DigestOptions {
    fn default() -> Self {
        Self {
            session: true,
            sql: true,
            outcome: true,
            payload: true,
        }
    }
}

/// Ordered record of execution events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<Event>);

impl History {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append an event; used as the execution callback
    pub fn collect(&mut self, event: Event) {
        self.0.push(event);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.0.iter()
    }

    /// Render as text
    pub fn dump_text(&self, out: &mut dyn Write, opts: TextDumpOptions) -> std::io::Result<()> {
        for event in &self.0 {
            dump::write_event(out, event, opts)?;
        }
        Ok(())
    }

    /// Render as text into a string
    pub fn to_text(&self, opts: TextDumpOptions) -> String {
        self.0.iter().map(|event| dump::format_event(event, opts) + "\n").collect()
    }

    /// Serialize as pretty JSON
    pub fn dump_json(&self, out: &mut dyn Write) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl From<Vec<Event>> for History {
    fn from(events: Vec<Event>) -> Self {
        Self(events)
    }
}

impl FromIterator<Event> for History {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
