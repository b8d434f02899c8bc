//! Collaborator contracts for executing statements against a server

use std::time::Duration;

use stmtflow_core::{Event, Stmt, StmtResult};

/// Errors from connections and the execution engine
///
/// SQL errors reported by the server are not `ExecError`s; they are recorded
/// in the history as `StmtResult::Error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error("Connection failed: {0}")]
    ConnectionError(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("cancelled")]
    Cancelled,
}

impl ExecError {
    /// Whether the run was cut short rather than failing on its own
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecError::DeadlineExceeded | ExecError::Cancelled)
    }
}

/// One database session, owned by a single logical actor
#[async_trait::async_trait]
pub trait Session: Send {
    /// Execute a statement, reporting server-side errors as `StmtResult::Error`
    async fn execute(&mut self, stmt: &Stmt) -> Result<StmtResult, ExecError>;

    /// Release the session
    async fn close(&mut self) -> Result<(), ExecError> {
        Ok(())
    }
}

/// A connected database
#[async_trait::async_trait]
pub trait Database: Send + Sync {
    /// Raw version string as reported by `select version()`
    async fn server_version(&self) -> Result<String, ExecError>;

    /// Open a new session
    async fn open_session(&self) -> Result<Box<dyn Session>, ExecError>;

    /// Close the database and all idle sessions
    async fn close(&mut self) -> Result<(), ExecError> {
        Ok(())
    }
}

/// Source of fresh database connections
#[async_trait::async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Backend name (e.g., "MySQL", "Mock")
    fn name(&self) -> &'static str;

    /// Open a fresh connection
    async fn connect(&self) -> Result<Box<dyn Database>, ExecError>;
}

/// Options for one run of the execution engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalOptions {
    /// How long a `wait` statement may run before it is reported as blocked
    pub block_time: Duration,

    /// Record wall-clock timestamps on events
    pub with_timestamps: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            block_time: Duration::from_millis(500),
            with_timestamps: false,
        }
    }
}

/// Execution engine: runs statements and reports events as they happen
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    async fn run(
        &self,
        db: &dyn Database,
        stmts: &[Stmt],
        opts: &EvalOptions,
        callback: &mut (dyn FnMut(Event) + Send),
    ) -> Result<(), ExecError>;
}
