use log::debug;
use r2d2::{ManageConnection, PooledConnection};
use std::time::Duration;

use super::{ConnectionPool, Session, Statement, StatementResult};
use crate::error::{Error, Result};

/// How long a single connection attempt may take unless configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Opens new physical sessions for a [`SessionPool`].
pub trait Connector: Send + Sync {
    fn connect(&self, timeout: Duration) -> Result<Box<dyn Session>>;
}

/// A session as the pool keeps it.
pub struct ManagedSession {
    session: Box<dyn Session>,
    retired: bool,
}

/// `r2d2` manager opening sessions through a [`Connector`].
pub struct SessionManager {
    connector: Box<dyn Connector>,
    connect_timeout: Duration,
}

impl ManageConnection for SessionManager {
    type Connection = ManagedSession;
    type Error = Error;

    fn connect(&self) -> Result<ManagedSession> {
        let session = self.connector.connect(self.connect_timeout)?;
        debug!("opened new session");
        Ok(ManagedSession {
            session,
            retired: false,
        })
    }

    fn is_valid(&self, conn: &mut ManagedSession) -> Result<()> {
        if conn.session.is_closed() {
            return Err(Error::ConnectionLost("pooled session is closed".into()));
        }
        Ok(())
    }

    fn has_broken(&self, conn: &mut ManagedSession) -> bool {
        conn.retired || conn.session.is_closed()
    }
}

/// Fixed-size pool: at most `size` sessions exist at once and each is
/// owned by exactly one checkout. Sessions are opened on demand.
pub struct SessionPool {
    inner: r2d2::Pool<SessionManager>,
}

impl SessionPool {
    pub fn new(connector: Box<dyn Connector>, size: usize) -> Self {
        Self::with_connect_timeout(connector, size, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_connect_timeout(
        connector: Box<dyn Connector>,
        size: usize,
        connect_timeout: Duration,
    ) -> Self {
        let size = u32::try_from(size.max(1)).unwrap_or(u32::MAX);
        let manager = SessionManager {
            connector,
            connect_timeout,
        };
        let inner = r2d2::Pool::builder()
            .max_size(size)
            .min_idle(Some(0))
            .test_on_check_out(true)
            .connection_timeout(connect_timeout.max(Duration::from_millis(1)))
            .build_unchecked(manager);
        Self { inner }
    }

    pub fn size(&self) -> usize {
        self.inner.max_size() as usize
    }

    /// Number of idle sessions kept for reuse.
    pub fn idle(&self) -> usize {
        self.inner.state().idle_connections as usize
    }

    /// Number of sessions in existence.
    pub fn open(&self) -> usize {
        self.inner.state().connections as usize
    }
}

impl ConnectionPool for SessionPool {
    fn checkout(&self, timeout: Duration) -> Result<Box<dyn Session>> {
        let conn = self.inner.get_timeout(timeout).map_err(|e| {
            Error::ConnectionUnavailable(format!(
                "no session within {:?} (pool of {}): {}",
                timeout,
                self.size(),
                e
            ))
        })?;
        Ok(Box::new(PooledSession(conn)))
    }
}

/// Checked-out session; returns to the pool when dropped.
struct PooledSession(PooledConnection<SessionManager>);

impl Session for PooledSession {
    fn execute(&mut self, statement: &Statement, timeout: Option<Duration>) -> Result<StatementResult> {
        self.0.session.execute(statement, timeout)
    }

    fn batch_execute(&mut self, sql: &str) -> Result<()> {
        self.0.session.batch_execute(sql)
    }

    fn is_closed(&self) -> bool {
        self.0.session.is_closed()
    }

    fn retire(&mut self) {
        self.0.retired = true;
    }
}
