//! Single-row sync cursor (`sync_state.id = 1`).

use super::{Database, opt_ts_col, opt_ts_text, ts_text};
use crate::error::{Error, Result};
use crate::model::SyncState;
use crate::timestamp;
use rusqlite::{OptionalExtension, params};

impl Database {
    /// The sync cursor, or `None` when the project was never linked.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_sync_state(&self) -> Result<Option<SyncState>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT project_id, last_pushed_action_id, last_pulled_server_seq, \
                 last_sync_at, sync_disabled FROM sync_state WHERE id = 1",
                [],
                |row| {
                    Ok(SyncState {
                        project_id: row.get(0)?,
                        last_pushed_action_id: row.get(1)?,
                        last_pulled_server_seq: row.get(2)?,
                        last_sync_at: opt_ts_col(row, 3)?,
                        sync_disabled: row.get::<_, i64>(4)? != 0,
                    })
                },
            )
            .optional()?)
    }

    /// Replace the cursor.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for an empty project id.
    pub fn set_sync_state(&self, state: &SyncState) -> Result<()> {
        if state.project_id.trim().is_empty() {
            return Err(Error::invalid("sync state needs a project id"));
        }
        self.mutate(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO sync_state (id, project_id, last_pushed_action_id, \
                 last_pulled_server_seq, last_sync_at, sync_disabled) \
                 VALUES (1, ?1, ?2, ?3, ?4, ?5)",
                params![
                    state.project_id,
                    state.last_pushed_action_id,
                    state.last_pulled_server_seq,
                    opt_ts_text(state.last_sync_at.as_ref()),
                    state.sync_disabled,
                ],
            )?;
            Ok(())
        })
    }

    /// Advance the push cursor and stamp `last_sync_at`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no cursor exists.
    pub fn update_last_pushed(&self, action_seq: i64) -> Result<()> {
        self.update_cursor("last_pushed_action_id", action_seq)
    }

    /// Advance the pull cursor and stamp `last_sync_at`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no cursor exists.
    pub fn update_last_pulled(&self, server_seq: i64) -> Result<()> {
        self.update_cursor("last_pulled_server_seq", server_seq)
    }

    fn update_cursor(&self, column: &str, value: i64) -> Result<()> {
        self.mutate(|conn| {
            let changed = conn.execute(
                &format!("UPDATE sync_state SET {column} = ?1, last_sync_at = ?2 WHERE id = 1"),
                params![value, ts_text(&timestamp::now())],
            )?;
            if changed == 0 {
                return Err(Error::not_found("sync state", "1"));
            }
            Ok(())
        })
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] when no cursor exists.
    pub fn set_sync_disabled(&self, disabled: bool) -> Result<()> {
        self.mutate(|conn| {
            let changed = conn.execute(
                "UPDATE sync_state SET sync_disabled = ?1 WHERE id = 1",
                [disabled],
            )?;
            if changed == 0 {
                return Err(Error::not_found("sync state", "1"));
            }
            Ok(())
        })
    }

    /// Forget the cursor. The journal's sync stamps are left alone; see
    /// [`Database::clear_action_log_sync_state`].
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or delete fails.
    pub fn clear_sync_state(&self) -> Result<()> {
        self.mutate(|conn| {
            conn.execute("DELETE FROM sync_state", [])?;
            Ok(())
        })
    }
}
