//! Test model
//!
//! `TestSpec` is the JSON shape a spec renders to; `Test` is the loaded,
//! runnable form with its assertions built.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stmtflow_core::{History, Stmt};

use crate::assertion::{AssertError, Assertion};

/// Statements of a test: a list of statements or an annotated script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StmtsSpec {
    Script(String),
    Stmts(Vec<Stmt>),
}

impl Default for StmtsSpec {
    fn default() -> Self {
        StmtsSpec::Stmts(Vec::new())
    }
}

/// A test as written in a spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSpec {
    pub name: String,

    #[serde(default)]
    pub test: StmtsSpec,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Raw baseline, decoded according to `assert_method`
    #[serde(default)]
    pub expect: serde_json::Value,

    #[serde(default)]
    pub repeat: i64,

    #[serde(default)]
    pub version_constraint: String,

    /// `text`, `history`, or the name of an assertion macro
    #[serde(default)]
    pub assert_method: String,
}

/// A runnable test
#[derive(Debug, Clone)]
pub struct Test {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub stmts: Vec<Stmt>,
    pub assert_method: String,

    /// Number of runs, at least 1
    pub repeat: u32,

    pub version_constraint: Option<String>,
    pub assertions: Vec<Assertion>,
}

impl Test {
    pub fn new(name: impl Into<String>, stmts: Vec<Stmt>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            stmts,
            assert_method: String::new(),
            repeat: 1,
            version_constraint: None,
            assertions: Vec::new(),
        }
    }

    /// Add an assertion
    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        if self.assert_method.is_empty() {
            self.assert_method = assertion.method().to_string();
        }
        self.assertions.push(assertion);
        self
    }

    /// Set the number of runs; values below 1 mean 1
    pub fn with_repeat(mut self, repeat: i64) -> Self {
        self.repeat = normalize_repeat(repeat);
        self
    }

    /// Gate the test on a server version constraint
    pub fn with_version_constraint(mut self, constraint: impl Into<String>) -> Self {
        let constraint = constraint.into();
        self.version_constraint = (!constraint.trim().is_empty()).then_some(constraint);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Check an observed history against every assertion in order
    ///
    /// A test without assertions cannot pass.
    pub fn assert(&self, actual: &History) -> Result<(), AssertError> {
        if self.assertions.is_empty() {
            return Err(AssertError::NotAsserted);
        }
        for assertion in &self.assertions {
            assertion.assert(actual)?;
        }
        Ok(())
    }

    /// First baseline text among the assertions
    pub fn expected_text(&self) -> Option<String> {
        self.assertions.iter().find_map(Assertion::expected_text)
    }
}

pub(crate) fn normalize_repeat(repeat: i64) -> u32 {
    u32::try_from(repeat.max(1)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::{HistoryAssertion, TextAssertion};
    use serde_json::json;
    use stmtflow_core::{DigestOptions, Event, StmtResult};

    fn insert() -> Stmt {
        Stmt::new("s1", "/* s1 */ insert into t values (1);")
    }

    #[test]
    fn test_spec_decoding() {
        let spec: TestSpec = serde_json::from_value(json!({
            "name": "lost_update",
            "test": "/* s1 */ begin;",
            "labels": {"issue": "1234"},
            "expect": "-- s1 >> 0 rows affected",
            "versionConstraint": ">= 5.3",
            "assertMethod": "text"
        }))
        .unwrap();

        assert_eq!(spec.test, StmtsSpec::Script("/* s1 */ begin;".into()));
        assert_eq!(spec.labels["issue"], "1234");
        assert_eq!(spec.repeat, 0);
        assert_eq!(spec.version_constraint, ">= 5.3");
        assert_eq!(spec.assert_method, "text");
    }

    #[test]
    fn test_spec_with_stmt_list() {
        let spec: TestSpec = serde_json::from_value(json!({
            "name": "listed",
            "test": [{"sql": "/* s1 */ select 1;", "session": "s1", "flags": "QUERY"}]
        }))
        .unwrap();

        match spec.test {
            StmtsSpec::Stmts(stmts) => {
                assert_eq!(stmts.len(), 1);
                assert!(stmts[0].is_query());
            }
            other => panic!("unexpected statements: {other:?}"),
        }
    }

    #[test]
    fn test_repeat_normalized() {
        assert_eq!(Test::new("t", vec![]).with_repeat(0).repeat, 1);
        assert_eq!(Test::new("t", vec![]).with_repeat(-3).repeat, 1);
        assert_eq!(Test::new("t", vec![]).with_repeat(5).repeat, 5);
    }

    #[test]
    fn test_version_constraint_blank_is_none() {
        let test = Test::new("t", vec![]).with_version_constraint("  ");
        assert_eq!(test.version_constraint, None);
    }

    #[test]
    fn test_not_asserted() {
        let test = Test::new("t", vec![insert()]);
        assert!(matches!(test.assert(&History::new()), Err(AssertError::NotAsserted)));
    }

    #[test]
    fn test_all_assertions_must_hold() {
        let history = History::from(vec![
            Event::invoke(insert()),
            Event::returned(insert(), StmtResult::affected(1)),
        ]);
        let text = history.to_text(stmtflow_core::TextDumpOptions::canonical());

        let test = Test::new("t", vec![insert()])
            .with_assertion(Assertion::Text(TextAssertion::new(text.clone())))
            .with_assertion(Assertion::History(HistoryAssertion::new(
                History::from(vec![Event::invoke(insert())]),
                DigestOptions::default(),
            )));

        assert_eq!(test.assert_method, "text");
        assert!(matches!(
            test.assert(&history),
            Err(AssertError::CountMismatch { expected: 1, actual: 2 })
        ));
        assert_eq!(test.expected_text(), Some(text));
    }
}
