//! stmtflow core
//!
//! Shared domain model for statement-flow tests:
//! - `Stmt` and its routing flags
//! - `History` of execution events and the digest used to compare them
//! - Text and JSON dumping of histories
//! - `stmtflow.toml` configuration

pub mod stmt;
pub mod history;
pub mod dump;
pub mod config;

pub use stmt::{Stmt, StmtFlags};
pub use history::{Event, EventKind, StmtResult, History, DigestOptions};
pub use dump::{TextDumpOptions, TextDumper};
pub use config::{Config, ConfigError};
