//! `SQLite` issue store.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so readers never wait for the single writer
//! - `synchronous = NORMAL`
//! - `busy_timeout` equal to the write-lock timeout, so a lock lost to the OS
//!   shows up as a bounded SQL wait instead of a hang
//!
//! Reads run directly on the connection. Every write goes through
//! [`Database::mutate`], which holds the [`WriteLock`] and an IMMEDIATE
//! transaction for the whole closure. Logged operations append their journal
//! row inside the same closure, so the entity write and its action-log row
//! commit or roll back together.

pub mod action_log;
pub mod boards;
pub mod cascade;
pub mod issues;
pub mod links;
pub mod logs;
pub mod migrations;
pub mod notes;
pub mod query;
pub mod replay;
pub mod schema;
pub mod sessions;
pub mod stats;
pub mod sync_state;

use crate::config::{self, ProjectConfig};
use crate::error::{Error, Result, is_unique_violation};
use crate::lock::WriteLock;
use crate::model::ActionType;
use crate::timestamp::{format_timestamp, parse_timestamp};
use crate::{DB_FILE, TODOS_DIR};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Attempts made with fresh random ids before giving up on an insert.
pub const ID_ATTEMPTS: usize = 3;

/// Handle on a project's issue database.
///
/// The handle owns the only connection this process uses for the project.
/// Methods take `&self`; writes serialize on the cross-process write lock.
pub struct Database {
    conn: Connection,
    base_dir: PathBuf,
    lock_timeout: Duration,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("base_dir", &self.base_dir)
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

/// Path of the database file for `base_dir`.
#[must_use]
pub fn db_path(base_dir: &Path) -> PathBuf {
    base_dir.join(TODOS_DIR).join(DB_FILE)
}

impl Database {
    /// Open an existing project database and bring its schema up to date.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] when `.todos/issues.db` does not exist, or
    /// any config, lock, or `SQLite` failure while opening and migrating.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let config = config::load_project_config(base_dir)?;
        Self::open_with_config(base_dir, &config)
    }

    /// Like [`Database::open`] with an explicit config.
    ///
    /// # Errors
    ///
    /// See [`Database::open`].
    pub fn open_with_config(base_dir: impl AsRef<Path>, config: &ProjectConfig) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let path = db_path(base_dir);
        if !path.exists() {
            return Err(Error::NotInitialized { path });
        }
        Self::connect(base_dir, &path, config.lock.timeout())
    }

    /// Create `.todos/` and the database when missing, then open it.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created or
    /// migrated.
    pub fn initialize(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        std::fs::create_dir_all(base_dir.join(TODOS_DIR))?;
        let config = config::load_project_config(base_dir)?;
        Self::connect(base_dir, &db_path(base_dir), config.lock.timeout())
    }

    fn connect(base_dir: &Path, path: &Path, lock_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        configure_connection(&conn, lock_timeout)?;
        conn.execute_batch(schema::BASE_SCHEMA_SQL)?;

        let db = Self {
            conn,
            base_dir: base_dir.to_path_buf(),
            lock_timeout,
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Apply pending migrations under the write lock. Returns how many ran.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken or a migration fails.
    pub fn run_migrations(&self) -> Result<usize> {
        if migrations::current_version(&self.conn)? >= schema::SCHEMA_VERSION {
            return Ok(0);
        }

        let lock = WriteLock::acquire(&self.base_dir, self.lock_timeout)?;
        // Another process may have migrated while we waited.
        let applied = migrations::run_migrations(&self.conn)?;
        lock.release();
        Ok(applied)
    }

    /// Recorded schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if `schema_info` cannot be read.
    pub fn schema_version(&self) -> Result<u32> {
        migrations::current_version(&self.conn)
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// The underlying connection, for reads.
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` holding the write lock inside one IMMEDIATE transaction.
    ///
    /// The transaction commits when `f` returns `Ok`; any error rolls it back.
    /// The lock is released on every path.
    pub(crate) fn mutate<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let lock = WriteLock::acquire(&self.base_dir, self.lock_timeout)?;
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let value = f(&*tx)?;
        tx.commit()?;
        debug!(held_ms = lock.held_for().as_millis(), "mutation committed");
        lock.release();
        Ok(value)
    }
}

fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

/// Journal instruction for the logged half of a mutation. `None` at a call
/// site means the write is not journaled.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Journal<'a> {
    pub session_id: &'a str,
    pub action_type: ActionType,
}

impl<'a> Journal<'a> {
    pub(crate) const fn new(session_id: &'a str, action_type: ActionType) -> Self {
        Self {
            session_id,
            action_type,
        }
    }
}

/// Run `insert` with fresh ids from `generate` until it stops hitting a
/// UNIQUE constraint, up to [`ID_ATTEMPTS`] times. Returns the id used.
pub(crate) fn insert_with_fresh_id(
    entity: &'static str,
    generate: fn() -> String,
    mut insert: impl FnMut(&str) -> rusqlite::Result<()>,
) -> Result<String> {
    for _ in 0..ID_ATTEMPTS {
        let id = generate();
        match insert(&id) {
            Ok(()) => return Ok(id),
            Err(err) if is_unique_violation(&err) => {
                debug!(entity, id, "id collision, retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(Error::IdExhausted { entity })
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

/// Stored text for a timestamp column.
pub(crate) fn ts_text(ts: &DateTime<Utc>) -> String {
    format_timestamp(ts)
}

pub(crate) fn opt_ts_text(ts: Option<&DateTime<Utc>>) -> Option<String> {
    ts.map(format_timestamp)
}

/// Read a required timestamp column. Accepts canonical text and raw `SQLite`
/// `DATETIME` text.
pub(crate) fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    opt_ts_col(row, idx)?.ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(idx, "timestamp".to_string(), Type::Null)
    })
}

pub(crate) fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let Some(raw) = row.get::<_, Option<String>>(idx)? else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    parse_timestamp(&raw).map(Some).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unparseable timestamp '{raw}'").into(),
        )
    })
}

/// Nullable text that reads empty strings as absent.
pub(crate) fn opt_text_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .filter(|value| !value.is_empty()))
}

/// Text column where NULL reads as empty.
pub(crate) fn text_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

/// Empty strings become NULL on write.
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}


#[cfg(test)]
mod tests {
    use super::test_support::temp_db;
    use super::{Database, insert_with_fresh_id, schema};
    use crate::error::Error;
    use crate::lock::WriteLock;
    use std::time::Duration;

    #[test]
    fn open_requires_existing_db() {
        let dir = tempfile::tempdir().unwrap();
        let err = Database::open(dir.path()).unwrap_err();
        assert!(matches!(err, Error::NotInitialized { .. }));
        assert!(err.to_string().contains("database not found"));
    }

    #[test]
    fn initialize_sets_pragmas() {
        let (_dir, db) = temp_db();
        let mode: String = db
            .conn()
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_ascii_lowercase(), "wal");

        let busy: u64 = db
            .conn()
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(u128::from(busy), db.lock_timeout().as_millis());

        let sync: i64 = db
            .conn()
            .pragma_query_value(None, "synchronous", |row| row.get(0))
            .unwrap();
        assert_eq!(sync, 1);
    }

    #[test]
    fn reopen_runs_nothing() {
        let (dir, db) = temp_db();
        assert_eq!(db.schema_version().unwrap(), schema::SCHEMA_VERSION);
        drop(db);

        let db = Database::open(dir.path()).unwrap();
        assert_eq!(db.run_migrations().unwrap(), 0);
    }

    #[test]
    fn reads_do_not_take_the_lock() {
        let (dir, db) = temp_db();
        let _held = WriteLock::acquire(dir.path(), Duration::from_millis(100)).unwrap();
        assert!(db.schema_version().is_ok());
    }

    #[test]
    fn mutate_rolls_back_on_error() {
        let (_dir, db) = temp_db();
        let result: crate::Result<()> = db.mutate(|conn| {
            conn.execute(
                "INSERT INTO comments (issue_id, text, created_at) VALUES ('td-1', 'x', 'now')",
                [],
            )?;
            Err(Error::invalid("abort"))
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn fresh_id_retries_then_gives_up() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id TEXT PRIMARY KEY)").unwrap();
        conn.execute("INSERT INTO t VALUES ('fixed')", []).unwrap();

        let err = insert_with_fresh_id(
            "thing",
            || "fixed".to_string(),
            |id| conn.execute("INSERT INTO t VALUES (?1)", [id]).map(|_| ()),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "failed to generate unique thing ID");

        let mut calls = 0;
        let id = insert_with_fresh_id("thing", crate::ids::generate_id, |id| {
            calls += 1;
            conn.execute("INSERT INTO t VALUES (?1)", [id]).map(|_| ())
        })
        .unwrap();
        assert!(id.starts_with("td-"));
        assert_eq!(calls, 1);
    }
}
