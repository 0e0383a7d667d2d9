//! SQLite persistence for the Switchboard pipeline.
//!
//! The [`Store`] owns a single `parking_lot::Mutex<Connection>`; every
//! multi-row mutation runs inside one transaction while the lock is held, so
//! all repository operations observe a consistent snapshot. In-memory
//! representations are value copies of the persisted rows.
//!
//! Repository operations are grouped by entity:
//!
//! - [`events`] - event rows and lifecycle updates
//! - [`queue`] - the durable work queue (lease, retry, cancel, reap)
//! - [`platforms`] - platform definitions and routing rules
//! - [`registries`] - bot identifiers and the email validation cache
//! - [`misc`] - revenue, relationships, processing log, daily counters

mod events;
mod misc;
mod platforms;
mod queue;
mod registries;
mod schema;

pub use misc::ProcessingLogEntry;

use std::path::Path;

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;

use crate::error::Result;

/// SQLite-backed store for all persistent pipeline state.
///
/// Thread-safe: share via `Arc<Store>`.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        tracing::info!("Opening store at {}", path.display());
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Create an in-memory store (for tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(schema::CREATE_TABLES)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    pub(crate) fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Current Unix time in seconds.
    pub(crate) fn now() -> i64 {
        Utc::now().timestamp()
    }

    /// Cheap liveness probe for the health endpoint.
    pub fn ping(&self) -> Result<()> {
        let conn = self.lock_conn();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// Reclaim space and refresh the query planner's statistics.
    pub fn optimize(&self) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute_batch("VACUUM; ANALYZE;")?;
        Ok(())
    }
}
