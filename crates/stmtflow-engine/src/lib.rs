//! stmtflow engine
//!
//! Everything between a spec file and a verdict:
//! - Version gate (server version normalization and constraint matching)
//! - Assertion engine (text, history and script assertions)
//! - Test model and test case loader

pub mod version;
pub mod assertion;
pub mod test;
pub mod loader;

pub use version::{check as check_version, Constraint, VersionError};
pub use assertion::{AssertError, Assertion, HistoryAssertion, ScriptAssertion, TextAssertion};
pub use test::{StmtsSpec, Test, TestSpec};
pub use loader::{load, LoadError, Loader};
