//! Mock database for testing
//!
//! Serves scripted results from memory without connecting to any server.
//! It's useful for:
//! - Unit testing the driver and assertions
//! - Simulating version gates, slow or blocked statements and outages
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stmtflow_executor::{MockProvider, ConnectionProvider};
//! use stmtflow_core::StmtResult;
//!
//! let provider = MockProvider::new()
//!     .with_version("8.0.11-TiDB-v7.5.0")
//!     .with_result("/* s1 */ select 1;", StmtResult::rows(&["1"], [[Some("1")]]));
//!
//! let db = provider.connect().await?;
//! assert_eq!(provider.connect_count(), 1);
//! ```
//!
//! Statements without a scripted result succeed with an empty result set
//! (queries) or zero affected rows.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stmtflow_core::{Stmt, StmtResult};
use tokio::sync::RwLock;

use crate::adapter::{ConnectionProvider, Database, ExecError, Session};

/// Version reported when none is configured
pub const DEFAULT_MOCK_VERSION: &str = "8.0.11-TiDB-v7.5.0";

#[derive(Debug, Clone, Default)]
struct Script {
    results: HashMap<String, StmtResult>,
    delays: HashMap<String, Duration>,
}

/// In-memory connection provider
#[derive(Debug, Clone)]
pub struct MockProvider {
    script: Arc<Script>,

    /// Every statement executed, in completion order
    executed: Arc<RwLock<Vec<String>>>,

    version: String,
    latency: Duration,
    fail_connection: bool,
    fail_session: bool,
    connects: Arc<AtomicUsize>,
    sessions: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Script::default()),
            executed: Arc::new(RwLock::new(Vec::new())),
            version: DEFAULT_MOCK_VERSION.to_string(),
            latency: Duration::ZERO,
            fail_connection: false,
            fail_session: false,
            connects: Arc::new(AtomicUsize::new(0)),
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn script_mut(&mut self) -> &mut Script {
        Arc::make_mut(&mut self.script)
    }

    /// Result returned for a statement with this SQL text
    pub fn with_result(mut self, sql: &str, result: StmtResult) -> Self {
        self.script_mut().results.insert(sql.trim().to_string(), result);
        self
    }

    /// Delay before a statement with this SQL text returns
    pub fn with_delay_for(mut self, sql: &str, delay: Duration) -> Self {
        self.script_mut().delays.insert(sql.trim().to_string(), delay);
        self
    }

    /// Raw version string reported by the server
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Delay added to every statement
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every connection attempt
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Connect successfully but fail to open sessions
    pub fn with_session_failure(mut self) -> Self {
        self.fail_session = true;
        self
    }

    /// Number of connection attempts so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of sessions opened so far
    pub fn sessions_opened(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    /// SQL of every executed statement
    pub async fn executed(&self) -> Vec<String> {
        self.executed.read().await.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ConnectionProvider for MockProvider {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn connect(&self) -> Result<Box<dyn Database>, ExecError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connection {
            return Err(ExecError::ConnectionError(
                "Simulated connection failure".to_string(),
            ));
        }
        Ok(Box::new(MockDatabase {
            provider: self.clone(),
        }))
    }
}

struct MockDatabase {
    provider: MockProvider,
}

#[async_trait::async_trait]
impl Database for MockDatabase {
    async fn server_version(&self) -> Result<String, ExecError> {
        Ok(self.provider.version.clone())
    }

    async fn open_session(&self) -> Result<Box<dyn Session>, ExecError> {
        if self.provider.fail_session {
            return Err(ExecError::ConnectionError(
                "Simulated session failure".to_string(),
            ));
        }
        self.provider.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            provider: self.provider.clone(),
        }))
    }
}

struct MockSession {
    provider: MockProvider,
}

#[async_trait::async_trait]
impl Session for MockSession {
    async fn execute(&mut self, stmt: &Stmt) -> Result<StmtResult, ExecError> {
        let key = stmt.sql.trim();
        let script = &self.provider.script;

        let delay = self.provider.latency + script.delays.get(key).copied().unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = match script.results.get(key) {
            Some(result) => result.clone(),
            None if stmt.is_query() => StmtResult::rows(&[], Vec::<Vec<Option<String>>>::new()),
            None => StmtResult::affected(0),
        };
        self.provider.executed.write().await.push(key.to_string());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stmtflow_core::StmtFlags;

    #[tokio::test]
    async fn test_scripted_results() {
        let provider = MockProvider::new()
            .with_result("/* s1 */ insert into t values (1);", StmtResult::affected(1))
            .with_result(
                "/* s1 */ insert into t values (1);\n",
                StmtResult::error(Some(1062), "Duplicate entry '1' for key 'PRIMARY'"),
            );

        let db = provider.connect().await.unwrap();
        let mut session = db.open_session().await.unwrap();

        let insert = Stmt::new("s1", "/* s1 */ insert into t values (1);");
        assert_eq!(
            session.execute(&insert).await.unwrap(),
            StmtResult::error(Some(1062), "Duplicate entry '1' for key 'PRIMARY'")
        );

        let query = Stmt::new("s1", "/* s1 */ select 1;").with_flags(StmtFlags::QUERY);
        assert!(matches!(
            session.execute(&query).await.unwrap(),
            StmtResult::Rows { ref rows, .. } if rows.is_empty()
        ));
        assert_eq!(provider.executed().await.len(), 2);
    }

    #[tokio::test]
    async fn test_version_and_counters() {
        let provider = MockProvider::new().with_version("5.7.25-TiDB-v5.3.0-nightly");
        let clone = provider.clone();

        let db = clone.connect().await.unwrap();
        assert_eq!(db.server_version().await.unwrap(), "5.7.25-TiDB-v5.3.0-nightly");
        let _ = db.open_session().await.unwrap();

        assert_eq!(provider.connect_count(), 1);
        assert_eq!(provider.sessions_opened(), 1);
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let provider = MockProvider::new().with_connection_failure();
        assert!(provider.connect().await.is_err());
        assert_eq!(provider.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_latency() {
        let provider = MockProvider::new().with_latency(Duration::from_millis(20));
        let db = provider.connect().await.unwrap();
        let mut session = db.open_session().await.unwrap();

        let start = std::time::Instant::now();
        session.execute(&Stmt::new("s1", "/* s1 */ begin;")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
