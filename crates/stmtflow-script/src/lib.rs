//! Embedded expression language for structured test specs
//!
//! This crate handles:
//! - Rendering spec templates (minijinja) into a JSON array of tests
//! - Evaluating filter expressions over candidate tests
//! - Running custom assertion macros against an observed history
//! - Helper filters available to spec and assertion authors

pub mod environment;
pub mod filters;

pub use environment::{ScriptEnv, ScriptError, TestFilter};
