//! Reference execution engine
//!
//! Statements are issued strictly in script order, each session on its own
//! connection served by a dedicated task. A plain statement is awaited until
//! it returns. A `wait` statement is expected to block on another session:
//! if it has not returned within `block_time` a `blocked` event is emitted
//! and the script moves on. A blocked statement is reported as `resumed`
//! once it returns, and its session finishes it before issuing anything else.
//!
//! ```text
//! /* s1 */ begin;
//! /* s1 */ update t set v = 1 where id = 1;
//! /* s2:wait */ update t set v = 2 where id = 1;   -- blocked
//! /* s1 */ commit;                                -- s2 resumes
//! ```

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use stmtflow_core::{Event, Stmt, StmtResult};
use tokio::sync::{mpsc, oneshot};

use crate::adapter::{Database, EvalOptions, ExecError, Executor, Session};

type Reply = Result<StmtResult, ExecError>;

struct Request {
    stmt: Stmt,
    reply: oneshot::Sender<Reply>,
}

/// A statement that has been issued and not yet reported as returned
struct InFlight {
    stmt: Stmt,
    started: Instant,
    reply: oneshot::Receiver<Reply>,
}

impl InFlight {
    fn returned(self, result: StmtResult) -> Event {
        Event::returned(self.stmt, result).with_latency(self.started.elapsed())
    }
}

// a dropped sender means the session task died mid-statement
fn flatten(reply: Result<Reply, oneshot::error::RecvError>) -> Reply {
    reply.unwrap_or_else(|_| Err(session_lost()))
}

fn session_lost() -> ExecError {
    ExecError::ConnectionError("session task ended without a reply".to_string())
}

fn spawn_session(mut session: Box<dyn Session>, label: String) -> mpsc::UnboundedSender<Request> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Request>();
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let result = session.execute(&request.stmt).await;
            // the run may have been dropped on timeout
            let _ = request.reply.send(result);
        }
        if let Err(err) = session.close().await {
            tracing::debug!(session = %label, error = %err, "failed to close session");
        }
    });
    tx
}

/// Issues statements in script order, detecting blocked `wait` statements
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialExecutor;

impl SequentialExecutor {
    pub fn new() -> Self {
        Self
    }
}

struct Flow<'a> {
    opts: &'a EvalOptions,
    callback: &'a mut (dyn FnMut(Event) + Send),
    blocked: Vec<InFlight>,
}

impl Flow<'_> {
    fn emit(&mut self, event: Event) {
        let event = if self.opts.with_timestamps {
            event.with_timestamp(Utc::now())
        } else {
            event
        };
        (self.callback)(event);
    }

    async fn finish(&mut self, mut inflight: InFlight) -> Result<(), ExecError> {
        let result = flatten((&mut inflight.reply).await)?;
        self.emit(Event::resumed(inflight.stmt.clone()));
        self.emit(inflight.returned(result));
        Ok(())
    }

    /// Report blocked statements that returned in the meantime
    ///
    /// All of them share one `block_time` deadline.
    async fn poll_blocked(&mut self) -> Result<(), ExecError> {
        let deadline = tokio::time::Instant::now() + self.opts.block_time;
        let mut still_blocked = Vec::with_capacity(self.blocked.len());
        for mut inflight in std::mem::take(&mut self.blocked) {
            match tokio::time::timeout_at(deadline, &mut inflight.reply).await {
                Ok(reply) => {
                    let result = flatten(reply)?;
                    self.emit(Event::resumed(inflight.stmt.clone()));
                    self.emit(inflight.returned(result));
                }
                Err(_) => still_blocked.push(inflight),
            }
        }
        self.blocked = still_blocked;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Executor for SequentialExecutor {
    async fn run(
        &self,
        db: &dyn Database,
        stmts: &[Stmt],
        opts: &EvalOptions,
        callback: &mut (dyn FnMut(Event) + Send),
    ) -> Result<(), ExecError> {
        let mut sessions: HashMap<String, mpsc::UnboundedSender<Request>> = HashMap::new();
        let mut flow = Flow {
            opts,
            callback,
            blocked: Vec::new(),
        };

        for stmt in stmts {
            if let Some(pos) = flow.blocked.iter().position(|b| b.stmt.session == stmt.session) {
                let inflight = flow.blocked.remove(pos);
                flow.finish(inflight).await?;
            }

            if !sessions.contains_key(&stmt.session) {
                let session = db.open_session().await?;
                tracing::debug!(session = %stmt.session, "opened session");
                sessions.insert(stmt.session.clone(), spawn_session(session, stmt.session.clone()));
            }
            let Some(tx) = sessions.get(&stmt.session) else {
                return Err(session_lost());
            };

            let (reply, rx) = oneshot::channel();
            flow.emit(Event::invoke(stmt.clone()));
            let mut inflight = InFlight {
                stmt: stmt.clone(),
                started: Instant::now(),
                reply: rx,
            };
            tx.send(Request {
                stmt: stmt.clone(),
                reply,
            })
            .map_err(|_| session_lost())?;

            if stmt.is_wait() {
                match tokio::time::timeout(opts.block_time, &mut inflight.reply).await {
                    Ok(reply) => {
                        let result = flatten(reply)?;
                        flow.emit(inflight.returned(result));
                    }
                    Err(_) => {
                        tracing::debug!(session = %stmt.session, "statement blocked");
                        flow.emit(Event::blocked(stmt.clone()));
                        flow.blocked.push(inflight);
                        continue;
                    }
                }
            } else {
                let result = flatten((&mut inflight.reply).await)?;
                flow.emit(inflight.returned(result));
            }

            flow.poll_blocked().await?;
        }

        while !flow.blocked.is_empty() {
            let inflight = flow.blocked.remove(0);
            flow.finish(inflight).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use crate::ConnectionProvider;
    use std::time::Duration;
    use stmtflow_core::{EventKind, History, StmtFlags};

    fn stmt(session: &str, sql: &str) -> Stmt {
        Stmt::new(session, format!("/* {session} */ {sql}"))
    }

    async fn run(provider: &MockProvider, stmts: &[Stmt], opts: EvalOptions) -> Result<History, ExecError> {
        let db = provider.connect().await?;
        let mut history = History::new();
        SequentialExecutor
            .run(db.as_ref(), stmts, &opts, &mut |event| history.collect(event))
            .await?;
        Ok(history)
    }

    fn kinds(history: &History) -> Vec<(EventKind, String)> {
        history
            .iter()
            .map(|e| (e.kind, e.session().to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_script_order() {
        let insert = stmt("s1", "insert into t values (1);");
        let select = stmt("s2", "select * from t;").with_flags(StmtFlags::QUERY);
        let provider = MockProvider::new()
            .with_result(&insert.sql, StmtResult::affected(1))
            .with_result(&select.sql, StmtResult::rows(&["id"], [[Some("1")]]));

        let history = run(&provider, &[insert.clone(), select.clone()], EvalOptions::default())
            .await
            .unwrap();

        assert_eq!(history.len(), 4);
        assert_eq!(history.events()[1].result, Some(StmtResult::affected(1)));
        assert_eq!(history.events()[3].stmt, select);
        assert!(history.events()[1].latency_ms.is_some());
        assert_eq!(provider.sessions_opened(), 2);
    }

    #[tokio::test]
    async fn test_wait_statement_blocks_and_resumes() {
        let lock = stmt("s1", "select * from t for update;");
        let wait = stmt("s2", "update t set v = 2;").with_flags(StmtFlags::WAIT);
        let commit = stmt("s1", "commit;");
        let provider = MockProvider::new().with_delay_for(&wait.sql, Duration::from_millis(300));
        let opts = EvalOptions {
            block_time: Duration::from_millis(100),
            with_timestamps: true,
        };

        let history = run(&provider, &[lock, wait, commit], opts).await.unwrap();

        use EventKind::*;
        let s = |name: &str| name.to_string();
        assert_eq!(
            kinds(&history),
            vec![
                (Invoke, s("s1")),
                (Returned, s("s1")),
                (Invoke, s("s2")),
                (Blocked, s("s2")),
                (Invoke, s("s1")),
                (Returned, s("s1")),
                (Resumed, s("s2")),
                (Returned, s("s2")),
            ]
        );
        assert!(history.iter().all(|e| e.at.is_some()));
    }

    #[tokio::test]
    async fn test_fast_wait_statement_does_not_block() {
        let wait = stmt("s2", "update t set v = 2;").with_flags(StmtFlags::WAIT);
        let history = run(&MockProvider::new(), &[wait], EvalOptions::default()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.events()[1].kind, EventKind::Returned);
    }

    #[tokio::test]
    async fn test_session_finishes_blocked_statement_first() {
        let wait = stmt("s2", "update t set v = 2;").with_flags(StmtFlags::WAIT);
        let next = stmt("s2", "commit;");
        let provider = MockProvider::new().with_delay_for(&wait.sql, Duration::from_millis(200));
        let opts = EvalOptions {
            block_time: Duration::from_millis(50),
            ..EvalOptions::default()
        };

        let history = run(&provider, &[wait, next], opts).await.unwrap();

        use EventKind::*;
        let got: Vec<EventKind> = history.iter().map(|e| e.kind).collect();
        assert_eq!(got, vec![Invoke, Blocked, Resumed, Returned, Invoke, Returned]);
    }

    #[tokio::test]
    async fn test_blocked_statements_share_one_deadline() {
        let waits = [
            stmt("s2", "update t set v = 2;").with_flags(StmtFlags::WAIT),
            stmt("s3", "update t set v = 3;").with_flags(StmtFlags::WAIT),
        ];
        let mut provider = MockProvider::new();
        for wait in &waits {
            provider = provider.with_delay_for(&wait.sql, Duration::from_millis(2000));
        }
        let mut stmts = waits.to_vec();
        stmts.extend((0..8).map(|i| stmt("s1", &format!("select {i};"))));
        let opts = EvalOptions {
            block_time: Duration::from_millis(100),
            with_timestamps: true,
        };

        let history = run(&provider, &stmts, opts).await.unwrap();

        // s1 only waits one block_time per statement, not one per blocked statement
        let start = history.events()[0].at.unwrap();
        let last_s1 = history
            .iter()
            .filter(|e| e.kind == EventKind::Returned && e.session() == "s1")
            .last()
            .and_then(|e| e.at)
            .unwrap();
        let elapsed = (last_s1 - start).to_std().unwrap();
        assert!(elapsed < Duration::from_millis(1400), "{elapsed:?}");

        let resumed = history.iter().filter(|e| e.kind == EventKind::Resumed).count();
        assert_eq!(resumed, 2);
    }

    #[tokio::test]
    async fn test_dropped_reply_is_a_connection_error() {
        let (tx, rx) = oneshot::channel::<Reply>();
        drop(tx);

        let err = flatten(rx.await).unwrap_err();
        assert!(matches!(err, ExecError::ConnectionError(_)));
        assert!(!err.is_timeout());
    }

    #[tokio::test]
    async fn test_session_error_aborts_run() {
        let provider = MockProvider::new().with_session_failure();
        let err = run(&provider, &[stmt("s1", "select 1;")], EvalOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::ConnectionError(_)));
    }
}
