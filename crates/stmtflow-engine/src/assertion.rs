//! Assertion engine
//!
//! Compares an observed history against a test's baseline. There are three
//! kinds of assertion:
//! - text: the canonical verbose rendering must match, ignoring only
//!   whitespace around the whole blob
//! - history: events are compared one by one under the digest options,
//!   stopping at the first divergence
//! - script: a macro from the spec decides, returning a message on failure

use std::fmt;
use std::sync::Arc;

use stmtflow_core::{DigestOptions, History, TextDumpOptions};
use stmtflow_script::{ScriptEnv, ScriptError};

/// Why an observed history was rejected
#[derive(Debug, thiserror::Error)]
pub enum AssertError {
    #[error("no assertion")]
    NotAsserted,

    #[error("result mismatch")]
    Mismatch,

    #[error("expect {expected} events, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("event#{index} mismatch: {message}")]
    EventMismatch { index: usize, message: String },

    #[error("{0}")]
    Message(String),

    #[error("assert error: {0}")]
    Script(#[from] ScriptError),

    #[error("failed to encode history: {0}")]
    Encode(#[from] serde_json::Error),
}

impl AssertError {
    /// The assertion could not be evaluated, as opposed to being violated
    pub fn is_evaluation_error(&self) -> bool {
        matches!(self, AssertError::Script(_) | AssertError::Encode(_))
    }
}

/// Expects the canonical text rendering of the history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextAssertion {
    expect: String,
}

impl TextAssertion {
    pub fn new(expect: impl Into<String>) -> Self {
        Self {
            expect: expect.into(),
        }
    }

    pub fn assert(&self, actual: &History) -> Result<(), AssertError> {
        let rendered = actual.to_text(TextDumpOptions::canonical());
        if self.expect.trim() != rendered.trim() {
            return Err(AssertError::Mismatch);
        }
        Ok(())
    }
}

/// Expects a structurally equal history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryAssertion {
    expect: History,
    digest: DigestOptions,
}

impl HistoryAssertion {
    pub fn new(expect: History, digest: DigestOptions) -> Self {
        Self { expect, digest }
    }

    pub fn assert(&self, actual: &History) -> Result<(), AssertError> {
        if self.expect.len() != actual.len() {
            return Err(AssertError::CountMismatch {
                expected: self.expect.len(),
                actual: actual.len(),
            });
        }
        for (index, (expected, observed)) in self.expect.iter().zip(actual.iter()).enumerate() {
            if let Some(message) = expected.mismatch(observed, &self.digest) {
                return Err(AssertError::EventMismatch { index, message });
            }
        }
        Ok(())
    }
}

/// Delegates the verdict to a macro defined in the spec
#[derive(Clone)]
pub struct ScriptAssertion {
    env: Arc<ScriptEnv>,
    name: String,
}

impl fmt::Debug for ScriptAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptAssertion")
            .field("path", &self.env.path())
            .field("name", &self.name)
            .finish()
    }
}

impl ScriptAssertion {
    pub fn new(env: Arc<ScriptEnv>, name: impl Into<String>) -> Self {
        Self {
            env,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn assert(&self, actual: &History) -> Result<(), AssertError> {
        let json = actual.to_json()?;
        let message = self.env.run_assertion(&self.name, &json)?;
        if message.is_empty() {
            Ok(())
        } else {
            Err(AssertError::Message(message))
        }
    }
}

/// One way of judging an observed history
#[derive(Debug, Clone)]
pub enum Assertion {
    Text(TextAssertion),
    History(HistoryAssertion),
    Script(ScriptAssertion),
}

impl Assertion {
    /// Check the observed history
    pub fn assert(&self, actual: &History) -> Result<(), AssertError> {
        match self {
            Assertion::Text(a) => a.assert(actual),
            Assertion::History(a) => a.assert(actual),
            Assertion::Script(a) => a.assert(actual),
        }
    }

    /// Baseline text for diffing, if this assertion has one
    pub fn expected_text(&self) -> Option<String> {
        match self {
            Assertion::Text(a) => Some(a.expect.clone()),
            Assertion::History(a) => Some(a.expect.to_text(TextDumpOptions::canonical())),
            Assertion::Script(_) => None,
        }
    }

    /// Short method name for listings
    pub fn method(&self) -> &str {
        match self {
            Assertion::Text(_) => "text",
            Assertion::History(_) => "history",
            Assertion::Script(a) => a.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stmtflow_core::{Event, Stmt, StmtFlags, StmtResult};

    fn query(session: &str, sql: &str) -> Stmt {
        Stmt::new(session, sql).with_flags(StmtFlags::QUERY)
    }

    fn returned(stmt: &Stmt, value: &str) -> Event {
        Event::returned(stmt.clone(), StmtResult::rows(&["v"], [[Some(value)]]))
    }

    fn history(values: &[&str]) -> History {
        values
            .iter()
            .map(|v| returned(&query("s1", "/* s1 */ select v from t;"), v))
            .collect()
    }

    #[test]
    fn test_text_assertion_trims_blob() {
        let actual = history(&["1"]);
        let text = actual.to_text(TextDumpOptions::canonical());

        let padded = TextAssertion::new(format!("\n\n  {}  \n", text.trim()));
        assert!(padded.assert(&actual).is_ok());
    }

    #[test]
    fn test_text_assertion_internal_whitespace() {
        let stmt = query("s1", "/* s1 */ select 1;");
        let actual = History::from(vec![Event::invoke(stmt)]);

        let assertion = TextAssertion::new("/* s1 */  select 1;");
        assert!(matches!(assertion.assert(&actual), Err(AssertError::Mismatch)));
    }

    #[test]
    fn test_history_assertion_counts() {
        let assertion = HistoryAssertion::new(history(&["a", "b"]), DigestOptions::default());
        let err = assertion.assert(&history(&["a"])).unwrap_err();
        assert_eq!(err.to_string(), "expect 2 events, got 1");
    }

    #[test]
    fn test_history_assertion_stops_at_first_divergence() {
        let assertion = HistoryAssertion::new(history(&["a", "b", "c"]), DigestOptions::default());
        let err = assertion.assert(&history(&["a", "x", "y"])).unwrap_err();

        match err {
            AssertError::EventMismatch { index, ref message } => {
                assert_eq!(index, 1);
                assert!(message.contains("[b]") && message.contains("[x]"), "{message}");
                assert!(!message.contains("[y]"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_history_assertion_respects_digest() {
        let expected = History::from(vec![Event::returned(
            query("s1", "/* s1 */ select 1;"),
            StmtResult::error(Some(1205), "Lock wait timeout exceeded"),
        )]);
        let actual = History::from(vec![Event::returned(
            query("s1", "/* s1 */ select 1;"),
            StmtResult::error(Some(1205), "Lock wait timeout exceeded; try restarting"),
        )]);

        let strict = HistoryAssertion::new(expected.clone(), DigestOptions::default());
        assert!(strict.assert(&actual).is_err());

        let outcome_only = DigestOptions {
            payload: false,
            ..DigestOptions::default()
        };
        assert!(HistoryAssertion::new(expected, outcome_only).assert(&actual).is_ok());
    }

    #[test]
    fn test_expected_text() {
        let expect = history(&["1"]);
        let rendered = expect.to_text(TextDumpOptions::canonical());

        let assertion = Assertion::History(HistoryAssertion::new(expect, DigestOptions::default()));
        assert_eq!(assertion.expected_text(), Some(rendered));
        assert_eq!(assertion.method(), "history");

        let assertion = Assertion::Text(TextAssertion::new("-- s1 >> 1 rows affected"));
        assert_eq!(assertion.expected_text().as_deref(), Some("-- s1 >> 1 rows affected"));
    }

    #[test]
    fn test_evaluation_errors() {
        assert!(AssertError::Encode(serde_json::from_str::<u8>("x").unwrap_err()).is_evaluation_error());
        assert!(!AssertError::Mismatch.is_evaluation_error());
        assert!(!AssertError::Message("nope".into()).is_evaluation_error());
    }

    #[test]
    fn test_script_message_is_verbatim() {
        assert_eq!(AssertError::Message("s2 saw 0 rows".into()).to_string(), "s2 saw 0 rows");
    }
}
