//! Statement execution for stmtflow
//!
//! This crate defines the contracts between the test driver and a database:
//! connection providers, databases, sessions and the execution engine that
//! turns a statement sequence into history events.
//!
//! ## Features
//!
//! - `mysql` - MySQL / TiDB backend via mysql_async
//!
//! ## Example
//!
//! ```rust,ignore
//! use stmtflow_executor::{ConnectionProvider, EvalOptions, Executor, MockProvider, SequentialExecutor};
//!
//! let provider = MockProvider::new();
//! let db = provider.connect().await?;
//! let mut history = History::new();
//! SequentialExecutor::new()
//!     .run(db.as_ref(), &stmts, &EvalOptions::default(), &mut |e| history.collect(e))
//!     .await?;
//! ```

pub mod adapter;
pub mod sequential;
pub mod mock;
pub mod mysql;

pub use adapter::{ConnectionProvider, Database, EvalOptions, ExecError, Executor, Session};
pub use sequential::SequentialExecutor;
pub use mock::MockProvider;
pub use mysql::MySqlProvider;
