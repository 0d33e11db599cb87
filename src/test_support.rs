//! In-memory driver double and the test configuration hook.
//!
//! [`ScriptedConnector`] opens [`ScriptedSession`]s that record every
//! statement and answer from a shared script. Tests keep a
//! [`ScriptHandle`] to queue results and inspect what ran.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{Error, ErrorKind, Result};
use crate::provider::ProviderServicesBuilder;
use crate::storage::{Connector, Session, SessionPool, Statement, StatementResult};

/// Test configuration hook. Leaves the builder unchanged.
pub fn apply_configuration(builder: ProviderServicesBuilder) -> ProviderServicesBuilder {
    builder
}

/// A pool of `size` scripted sessions plus the handle driving them.
pub fn scripted_pool(size: usize) -> (Arc<SessionPool>, ScriptHandle) {
    let connector = ScriptedConnector::new();
    let handle = connector.handle();
    (Arc::new(SessionPool::new(Box::new(connector), size)), handle)
}

#[derive(Debug)]
enum Reply {
    Ok(StatementResult),
    Fail(ErrorKind),
}

#[derive(Default)]
struct Script {
    connects: usize,
    failing_connects: usize,
    dead: HashSet<usize>,
    replies: VecDeque<Reply>,
    control_failures: VecDeque<(String, ErrorKind)>,
    executed: Vec<Statement>,
    timeouts: Vec<Option<Duration>>,
    control: Vec<String>,
    /// Everything sent, control statements included
    log: Vec<String>,
}

/// Shared view of the script behind every session of a connector.
#[derive(Clone, Default)]
pub struct ScriptHandle {
    script: Arc<Mutex<Script>>,
}

impl ScriptHandle {
    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sessions opened so far.
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    /// Make the next `n` connection attempts fail.
    pub fn fail_connects(&self, n: usize) {
        self.lock().failing_connects += n;
    }

    /// Mark every session opened so far as dead.
    pub fn kill_sessions(&self) {
        let mut script = self.lock();
        let opened = script.connects;
        script.dead.extend(0..opened);
    }

    /// Queue the answer for the next statement.
    pub fn push_ok(&self, result: StatementResult) {
        self.lock().replies.push_back(Reply::Ok(result));
    }

    /// Queue a failure for the next statement. `ConnectionLost` also kills
    /// the session that runs it.
    pub fn push_failure(&self, kind: ErrorKind) {
        self.lock().replies.push_back(Reply::Fail(kind));
    }

    /// Fail the next control statement equal to `sql` (`BEGIN`, `COMMIT`, ...).
    pub fn fail_control(&self, sql: &str, kind: ErrorKind) {
        self.lock().control_failures.push_back((sql.to_string(), kind));
    }

    /// SQL of every statement sent through `execute`, in order.
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.iter().map(|s| s.sql.clone()).collect()
    }

    /// Every statement sent through `execute`, with parameters.
    pub fn statements(&self) -> Vec<Statement> {
        self.lock().executed.clone()
    }

    /// Timeout handed to the driver for each executed statement.
    pub fn timeouts(&self) -> Vec<Option<Duration>> {
        self.lock().timeouts.clone()
    }

    /// Control statements, in order.
    pub fn control(&self) -> Vec<String> {
        self.lock().control.clone()
    }

    /// Everything the sessions were asked to run, in order.
    pub fn log(&self) -> Vec<String> {
        self.lock().log.clone()
    }
}

/// [`Connector`] producing [`ScriptedSession`]s.
#[derive(Default)]
pub struct ScriptedConnector {
    handle: ScriptHandle,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> ScriptHandle {
        self.handle.clone()
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, _timeout: Duration) -> Result<Box<dyn Session>> {
        let mut script = self.handle.lock();
        if script.failing_connects > 0 {
            script.failing_connects -= 1;
            return Err(Error::ConnectionUnavailable("scripted connect failure".into()));
        }
        let id = script.connects;
        script.connects += 1;
        Ok(Box::new(ScriptedSession {
            id,
            handle: self.handle.clone(),
        }))
    }
}

/// Session answering from the shared script. Unscripted statements affect
/// one row and return nothing.
pub struct ScriptedSession {
    id: usize,
    handle: ScriptHandle,
}

impl Session for ScriptedSession {
    fn execute(&mut self, statement: &Statement, timeout: Option<Duration>) -> Result<StatementResult> {
        let mut script = self.handle.lock();
        script.executed.push(statement.clone());
        script.timeouts.push(timeout);
        script.log.push(statement.sql.clone());
        if script.dead.contains(&self.id) {
            return Err(Error::ConnectionLost("session is closed".into()));
        }
        match script.replies.pop_front() {
            Some(Reply::Ok(result)) => Ok(result),
            Some(Reply::Fail(kind)) => {
                if kind == ErrorKind::ConnectionLost {
                    script.dead.insert(self.id);
                }
                Err(Error::from_kind(kind, format!("scripted failure: {}", statement.sql)))
            }
            None => Ok(StatementResult::affected(1)),
        }
    }

    fn batch_execute(&mut self, sql: &str) -> Result<()> {
        let mut script = self.handle.lock();
        script.control.push(sql.to_string());
        script.log.push(sql.to_string());
        if script.dead.contains(&self.id) {
            return Err(Error::ConnectionLost("session is closed".into()));
        }
        let failing = script
            .control_failures
            .iter()
            .position(|(pending, _)| pending == sql);
        if let Some(kind) = failing.and_then(|i| script.control_failures.remove(i)).map(|(_, k)| k) {
            if kind == ErrorKind::ConnectionLost {
                script.dead.insert(self.id);
            }
            return Err(Error::from_kind(kind, format!("scripted failure: {}", sql)));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.handle.lock().dead.contains(&self.id)
    }
}
