//! Append-only action journal.
//!
//! Rows are appended by logged mutations inside their own transaction. After
//! insert only two columns ever change: `undone`, flipped by undo, and the
//! `synced_at`/`server_seq` pair, stamped by the sync pusher.

use super::{Database, Journal, insert_with_fresh_id};
use crate::error::{Error, Result};
use crate::ids::generate_action_id;
use crate::model::{ActionLog, EntityType, SyncConflict};
use crate::timestamp::action_log_timestamp_now;
use rusqlite::{Connection, OptionalExtension, Row, params};

const ACTION_COLUMNS: &str = "rowid, id, session_id, action_type, entity_type, entity_id, \
     previous_data, new_data, timestamp, undone, synced_at, server_seq";

fn action_from_row(row: &Row<'_>) -> rusqlite::Result<ActionLog> {
    Ok(ActionLog {
        seq: row.get(0)?,
        id: row.get(1)?,
        session_id: super::text_col(row, 2)?,
        action_type: row.get(3)?,
        entity_type: row.get(4)?,
        entity_id: row.get(5)?,
        previous_data: super::text_col(row, 6)?,
        new_data: super::text_col(row, 7)?,
        timestamp: row.get(8)?,
        undone: row.get::<_, i64>(9)? != 0,
        synced_at: super::opt_text_col(row, 10)?,
        server_seq: row.get(11)?,
    })
}

/// Append one journal row. Returns the new action id.
pub(crate) fn append_action(
    conn: &Connection,
    journal: Journal<'_>,
    entity_type: EntityType,
    entity_id: &str,
    previous_data: &str,
    new_data: &str,
) -> Result<String> {
    let timestamp = action_log_timestamp_now();
    insert_with_fresh_id("action", generate_action_id, |id| {
        conn.execute(
            "INSERT INTO action_log (id, session_id, action_type, entity_type, entity_id, \
             previous_data, new_data, timestamp, undone) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
            params![
                id,
                journal.session_id,
                journal.action_type,
                entity_type,
                entity_id,
                previous_data,
                new_data,
                timestamp,
            ],
        )
        .map(|_| ())
    })
}

/// Append a journal row when `journal` is set; no-op otherwise.
pub(crate) fn journal_if(
    conn: &Connection,
    journal: Option<Journal<'_>>,
    entity_type: EntityType,
    entity_id: &str,
    previous_data: &str,
    new_data: &str,
) -> Result<()> {
    if let Some(journal) = journal {
        append_action(conn, journal, entity_type, entity_id, previous_data, new_data)?;
    }
    Ok(())
}

fn collect_actions(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<ActionLog>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, action_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

impl Database {
    /// Latest action of `session_id` that has not been undone.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_last_action(&self, session_id: &str) -> Result<Option<ActionLog>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {ACTION_COLUMNS} FROM action_log \
                     WHERE session_id = ?1 AND undone = 0 ORDER BY rowid DESC LIMIT 1"
                ),
                [session_id],
                action_from_row,
            )
            .optional()?)
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] when no row has this id.
    pub fn get_action(&self, id: &str) -> Result<ActionLog> {
        self.conn()
            .query_row(
                &format!("SELECT {ACTION_COLUMNS} FROM action_log WHERE id = ?1"),
                [id],
                action_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("action", id))
    }

    /// Flag an action as undone. The caller has already applied the inverse.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no row has this id.
    pub fn mark_action_undone(&self, id: &str) -> Result<()> {
        self.mutate(|conn| {
            let changed = conn.execute("UPDATE action_log SET undone = 1 WHERE id = ?1", [id])?;
            if changed == 0 {
                return Err(Error::not_found("action", id));
            }
            Ok(())
        })
    }

    /// Most recent actions first, optionally restricted to one session.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_recent_actions(
        &self,
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ActionLog>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        match session_id {
            Some(session) => collect_actions(
                self.conn(),
                &format!(
                    "SELECT {ACTION_COLUMNS} FROM action_log WHERE session_id = ?1 \
                     ORDER BY rowid DESC LIMIT ?2"
                ),
                params![session, limit],
            ),
            None => collect_actions(
                self.conn(),
                &format!("SELECT {ACTION_COLUMNS} FROM action_log ORDER BY rowid DESC LIMIT ?1"),
                params![limit],
            ),
        }
    }

    /// Every journal row that touched `entity_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_actions_for_entity(&self, entity_id: &str) -> Result<Vec<ActionLog>> {
        collect_actions(
            self.conn(),
            &format!(
                "SELECT {ACTION_COLUMNS} FROM action_log WHERE entity_id = ?1 ORDER BY rowid"
            ),
            [entity_id],
        )
    }

    /// Pending rows (unsynced, not undone) with `seq > after`, in journal
    /// order. This is what the sync pusher sends next.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_actions_after(&self, after: i64, limit: usize) -> Result<Vec<ActionLog>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        collect_actions(
            self.conn(),
            &format!(
                "SELECT {ACTION_COLUMNS} FROM action_log \
                 WHERE rowid > ?1 AND synced_at IS NULL AND undone = 0 \
                 ORDER BY rowid LIMIT ?2"
            ),
            params![after, limit],
        )
    }

    /// Number of rows still waiting to be pushed.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_pending_events(&self) -> Result<i64> {
        Ok(self.conn().query_row(
            "SELECT COUNT(*) FROM action_log WHERE synced_at IS NULL AND undone = 0",
            [],
            |row| row.get(0),
        )?)
    }

    /// Stamp pushed rows with the server's sequence numbers.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or update fails.
    pub fn mark_actions_synced(&self, acknowledged: &[(String, i64)]) -> Result<usize> {
        if acknowledged.is_empty() {
            return Ok(0);
        }
        self.mutate(|conn| {
            let synced_at = action_log_timestamp_now();
            let mut stmt = conn
                .prepare("UPDATE action_log SET synced_at = ?1, server_seq = ?2 WHERE id = ?3")?;
            let mut updated = 0;
            for (id, server_seq) in acknowledged {
                updated += stmt.execute(params![synced_at, server_seq, id])?;
            }
            Ok(updated)
        })
    }

    /// Forget push state on every row, e.g. after pointing at a new server.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or update fails.
    pub fn clear_action_log_sync_state(&self) -> Result<usize> {
        self.mutate(|conn| {
            Ok(conn.execute(
                "UPDATE action_log SET synced_at = NULL, server_seq = NULL \
                 WHERE synced_at IS NOT NULL OR server_seq IS NOT NULL",
                [],
            )?)
        })
    }

    /// Remember that a pulled event overwrote local state.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or insert fails.
    pub fn record_sync_conflict(
        &self,
        entity_type: &str,
        entity_id: &str,
        server_seq: i64,
        local_data: &str,
        remote_data: &str,
    ) -> Result<i64> {
        self.mutate(|conn| {
            conn.execute(
                "INSERT INTO sync_conflicts \
                 (entity_type, entity_id, server_seq, local_data, remote_data, overwritten_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entity_type,
                    entity_id,
                    server_seq,
                    local_data,
                    remote_data,
                    action_log_timestamp_now()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_recent_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn().prepare(
            "SELECT id, entity_type, entity_id, server_seq, local_data, remote_data, overwritten_at \
             FROM sync_conflicts ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            Ok(SyncConflict {
                id: row.get(0)?,
                entity_type: row.get(1)?,
                entity_id: row.get(2)?,
                server_seq: row.get(3)?,
                local_data: super::text_col(row, 4)?,
                remote_data: super::text_col(row, 5)?,
                overwritten_at: super::ts_col(row, 6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}
