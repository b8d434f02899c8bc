//! Test case loader
//!
//! Renders a spec, selects tests with an optional filter and builds each
//! test's assertion from its `assertMethod` and `expect` fields:
//!
//! | `assertMethod` | `expect`                         | assertion          |
//! |----------------|----------------------------------|--------------------|
//! | `text`         | string                           | `TextAssertion`    |
//! | `history`      | array of events                  | `HistoryAssertion` |
//! | anything else  | ignored                          | `ScriptAssertion`  |
//!
//! Any decoding failure aborts the whole spec file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stmtflow_core::{DigestOptions, History};
use stmtflow_script::{ScriptEnv, ScriptError, TestFilter};
use stmtflow_sql::SplitError;

use crate::assertion::{Assertion, HistoryAssertion, ScriptAssertion, TextAssertion};
use crate::test::{normalize_repeat, StmtsSpec, Test, TestSpec};

/// Errors that abort loading a spec file
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("{} is not a JSON array of tests: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("test `{name}`: invalid {method} expectation: {source}")]
    Expect {
        name: String,
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("test `{name}`: {source}")]
    Split {
        name: String,
        #[source]
        source: SplitError,
    },
}

/// Loads tests from spec files
#[derive(Debug, Default)]
pub struct Loader {
    digest: DigestOptions,
    filter: Option<TestFilter>,
}

impl Loader {
    /// Create a loader whose history assertions compare with `digest`
    pub fn new(digest: DigestOptions) -> Self {
        Self {
            digest,
            filter: None,
        }
    }

    /// Only load tests the filter selects
    pub fn with_filter(mut self, filter: TestFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn digest(&self) -> &DigestOptions {
        &self.digest
    }

    /// Load the tests of one spec file, in spec order
    pub fn load(&self, path: &Path) -> Result<Vec<Test>, LoadError> {
        let env = Arc::new(ScriptEnv::for_spec(path)?);
        let rendered = env.render_spec()?;
        let candidates: Vec<serde_json::Value> =
            serde_json::from_str(&rendered).map_err(|source| LoadError::Decode {
                path: path.to_path_buf(),
                source,
            })?;

        let mut tests = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if let Some(filter) = &self.filter {
                if !filter.matches(&candidate)? {
                    continue;
                }
            }
            let spec: TestSpec = serde_json::from_value(candidate).map_err(|source| LoadError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
            tests.push(self.build(spec, &env)?);
        }

        tracing::debug!(path = %path.display(), count = tests.len(), "loaded tests");
        Ok(tests)
    }

    fn build(&self, spec: TestSpec, env: &Arc<ScriptEnv>) -> Result<Test, LoadError> {
        let stmts = match spec.test {
            StmtsSpec::Stmts(stmts) => stmts,
            StmtsSpec::Script(script) => stmtflow_sql::split(&script).map_err(|source| LoadError::Split {
                name: spec.name.clone(),
                source,
            })?,
        };

        let expect_error = |source| LoadError::Expect {
            name: spec.name.clone(),
            method: spec.assert_method.clone(),
            source,
        };
        let assertion = match spec.assert_method.as_str() {
            "text" => {
                let expect: String = serde_json::from_value(spec.expect.clone()).map_err(expect_error)?;
                Assertion::Text(TextAssertion::new(expect))
            }
            "history" => {
                let expect: History = serde_json::from_value(spec.expect.clone()).map_err(expect_error)?;
                Assertion::History(HistoryAssertion::new(expect, self.digest))
            }
            name => {
                env.check_assertion(name)?;
                Assertion::Script(ScriptAssertion::new(Arc::clone(env), name))
            }
        };

        let constraint = spec.version_constraint.trim();
        Ok(Test {
            name: spec.name,
            labels: spec.labels,
            stmts,
            assert_method: spec.assert_method,
            repeat: normalize_repeat(spec.repeat),
            version_constraint: (!constraint.is_empty()).then(|| constraint.to_string()),
            assertions: vec![assertion],
        })
    }
}

/// Load one spec file with an optional filter
pub fn load(path: &Path, filter: Option<TestFilter>, digest: &DigestOptions) -> Result<Vec<Test>, LoadError> {
    let mut loader = Loader::new(*digest);
    if let Some(filter) = filter {
        loader = loader.with_filter(filter);
    }
    loader.load(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use stmtflow_core::{Event, Stmt, StmtFlags, StmtResult, TextDumpOptions};
    use tempfile::TempDir;

    fn write_spec(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_text_assertion() {
        let dir = TempDir::new().unwrap();
        let path = write_spec(
            &dir,
            "text.json",
            r#"[{"name": "one", "test": "/* s1 */ select 1;\n", "repeat": 0,
                 "assertMethod": "text", "expect": "/* s1 */ select 1;\n-- s1 >> rows: [1]"}]"#,
        );

        let tests = Loader::default().load(&path).unwrap();
        assert_eq!(tests.len(), 1);

        let test = &tests[0];
        assert_eq!(test.repeat, 1);
        assert_eq!(test.version_constraint, None);
        assert_eq!(test.stmts.len(), 1);
        assert_eq!(test.stmts[0].flags, StmtFlags::QUERY);

        let stmt = test.stmts[0].clone();
        let history = History::from(vec![
            Event::invoke(stmt.clone()),
            Event::returned(stmt, StmtResult::rows(&["1"], [[Some("1")]])),
        ]);
        assert!(test.assert(&history).is_ok());
        assert!(test.expected_text().is_some());
    }

    #[test]
    fn test_load_history_assertion_uses_digest() {
        let stmt = Stmt::new("s1", "/* s1 */ update t set v = 1;");
        let expect = History::from(vec![Event::returned(stmt.clone(), StmtResult::affected(1))]);
        let spec = serde_json::json!([{
            "name": "hist",
            "test": [stmt.clone()],
            "assertMethod": "history",
            "expect": expect.clone(),
        }]);
        let dir = TempDir::new().unwrap();
        let path = write_spec(&dir, "hist.json", &spec.to_string());

        let actual = History::from(vec![Event::returned(stmt, StmtResult::affected(2))]);

        let strict = Loader::default().load(&path).unwrap();
        assert!(strict[0].assert(&actual).is_err());

        let lenient = Loader::new(DigestOptions {
            payload: false,
            ..DigestOptions::default()
        })
        .load(&path)
        .unwrap();
        assert!(lenient[0].assert(&actual).is_ok());
        assert_eq!(
            lenient[0].expected_text().unwrap(),
            expect.to_text(TextDumpOptions::canonical())
        );
    }

    #[test]
    fn test_bad_expect_aborts_file() {
        let dir = TempDir::new().unwrap();
        let path = write_spec(
            &dir,
            "bad.json",
            r#"[{"name": "ok", "assertMethod": "text", "expect": ""},
                {"name": "bad", "assertMethod": "history", "expect": "not events"}]"#,
        );

        let err = Loader::default().load(&path).unwrap_err();
        assert!(matches!(err, LoadError::Expect { ref name, .. } if name == "bad"));
    }

    #[test]
    fn test_not_an_array() {
        let dir = TempDir::new().unwrap();
        let path = write_spec(&dir, "obj.json", r#"{"name": "x"}"#);
        assert!(matches!(Loader::default().load(&path), Err(LoadError::Decode { .. })));
    }

    #[test]
    fn test_unknown_assertion_macro() {
        let dir = TempDir::new().unwrap();
        let path = write_spec(&dir, "macro.json", r#"[{"name": "x", "assertMethod": "no_such_macro"}]"#);
        assert!(matches!(
            Loader::default().load(&path),
            Err(LoadError::Script(ScriptError::UnknownAssertion { .. }))
        ));

        let path = write_spec(&dir, "empty.json", r#"[{"name": "x"}]"#);
        assert!(matches!(
            Loader::default().load(&path),
            Err(LoadError::Script(ScriptError::InvalidName(_)))
        ));
    }

    #[test]
    fn test_split_error_in_script() {
        let dir = TempDir::new().unwrap();
        let path = write_spec(
            &dir,
            "split.json",
            r#"[{"name": "broken", "test": "/* s1 select 1;", "assertMethod": "text", "expect": ""}]"#,
        );
        assert!(matches!(Loader::default().load(&path), Err(LoadError::Split { .. })));
    }

    #[test]
    fn test_filter_applies_to_raw_json() {
        let dir = TempDir::new().unwrap();
        let path = write_spec(
            &dir,
            "filter.json",
            r#"[{"name": "lock_a", "labels": {"kind": "lock"}, "assertMethod": "text", "expect": ""},
                {"name": "gc_b", "labels": {"kind": "gc"}, "assertMethod": "history", "expect": "oops"}]"#,
        );

        let filter = TestFilter::new("test.labels.kind == 'lock'").unwrap();
        let tests = load(&path, Some(filter), &DigestOptions::default()).unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].name, "lock_a");
    }
}
