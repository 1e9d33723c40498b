//! Work sessions (named spans grouping issues) and agent sessions.

use super::{Database, insert_with_fresh_id, opt_text_col, opt_ts_col, opt_ts_text, text_col, ts_col, ts_text};
use crate::error::{Error, Result};
use crate::ids::{generate_ws_id, normalize_issue_id};
use crate::model::{Session, WorkSession};
use crate::timestamp;
use rusqlite::{OptionalExtension, Row, params};

const WORK_SESSION_COLUMNS: &str = "id, name, session_id, started_at, ended_at, start_sha, end_sha";
const SESSION_COLUMNS: &str = "id, name, branch, agent_type, agent_pid, context_id, \
     previous_session_id, started_at, ended_at, last_activity";

fn work_session_from_row(row: &Row<'_>) -> rusqlite::Result<WorkSession> {
    Ok(WorkSession {
        id: row.get(0)?,
        name: text_col(row, 1)?,
        session_id: text_col(row, 2)?,
        started_at: ts_col(row, 3)?,
        ended_at: opt_ts_col(row, 4)?,
        start_sha: text_col(row, 5)?,
        end_sha: text_col(row, 6)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        name: text_col(row, 1)?,
        branch: text_col(row, 2)?,
        agent_type: text_col(row, 3)?,
        agent_pid: row.get(4)?,
        context_id: text_col(row, 5)?,
        previous_session_id: opt_text_col(row, 6)?,
        started_at: ts_col(row, 7)?,
        ended_at: opt_ts_col(row, 8)?,
        last_activity: opt_ts_col(row, 9)?,
    })
}

impl Database {
    /// Start a work session with a fresh `ws-` id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or insert fails, or every id collides.
    pub fn create_work_session(
        &self,
        name: &str,
        session_id: &str,
        start_sha: &str,
    ) -> Result<WorkSession> {
        let started_at = timestamp::now();
        let id = self.mutate(|conn| {
            insert_with_fresh_id("work session", generate_ws_id, |id| {
                conn.execute(
                    &format!(
                        "INSERT INTO work_sessions ({WORK_SESSION_COLUMNS}) \
                         VALUES (?1, ?2, ?3, ?4, NULL, ?5, '')"
                    ),
                    params![id, name, session_id, ts_text(&started_at), start_sha],
                )
                .map(|_| ())
            })
        })?;
        Ok(WorkSession {
            id,
            name: name.to_string(),
            session_id: session_id.to_string(),
            started_at,
            ended_at: None,
            start_sha: start_sha.to_string(),
            end_sha: String::new(),
        })
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn get_work_session(&self, id: &str) -> Result<WorkSession> {
        self.conn()
            .query_row(
                &format!("SELECT {WORK_SESSION_COLUMNS} FROM work_sessions WHERE id = ?1"),
                [id],
                work_session_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("work session", id))
    }

    /// Save name, end time, and end commit.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn update_work_session(&self, ws: &WorkSession) -> Result<()> {
        self.mutate(|conn| {
            let changed = conn.execute(
                "UPDATE work_sessions SET name = ?2, ended_at = ?3, end_sha = ?4 WHERE id = ?1",
                params![ws.id, ws.name, opt_ts_text(ws.ended_at.as_ref()), ws.end_sha],
            )?;
            if changed == 0 {
                return Err(Error::not_found("work session", &ws.id));
            }
            Ok(())
        })
    }

    /// Newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_work_sessions(&self, limit: usize) -> Result<Vec<WorkSession>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {WORK_SESSION_COLUMNS} FROM work_sessions \
             ORDER BY started_at DESC, id LIMIT ?1"
        ))?;
        let rows = stmt.query_map(
            [i64::try_from(limit).unwrap_or(i64::MAX)],
            work_session_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// # Errors
    ///
    /// Returns an error if the lock or insert fails.
    pub fn tag_issue_to_work_session(&self, work_session_id: &str, issue_id: &str) -> Result<()> {
        let issue_id = normalize_issue_id(issue_id);
        self.mutate(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO work_session_issues (work_session_id, issue_id, tagged_at) \
                 VALUES (?1, ?2, ?3)",
                params![work_session_id, issue_id, ts_text(&timestamp::now())],
            )?;
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns an error if the lock or delete fails.
    pub fn untag_issue_from_work_session(
        &self,
        work_session_id: &str,
        issue_id: &str,
    ) -> Result<()> {
        let issue_id = normalize_issue_id(issue_id);
        self.mutate(|conn| {
            conn.execute(
                "DELETE FROM work_session_issues WHERE work_session_id = ?1 AND issue_id = ?2",
                params![work_session_id, issue_id],
            )?;
            Ok(())
        })
    }

    /// Issue ids tagged to a work session, in tagging order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_work_session_issues(&self, work_session_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT issue_id FROM work_session_issues WHERE work_session_id = ?1 \
             ORDER BY tagged_at, issue_id",
        )?;
        let rows = stmt.query_map([work_session_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Insert or replace an agent session row. The caller owns the id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or write fails.
    pub fn upsert_session(&self, session: &Session) -> Result<()> {
        self.mutate(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO sessions ({SESSION_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
                     ON CONFLICT(id) DO UPDATE SET name = excluded.name, \
                     branch = excluded.branch, agent_type = excluded.agent_type, \
                     agent_pid = excluded.agent_pid, context_id = excluded.context_id, \
                     previous_session_id = excluded.previous_session_id, \
                     ended_at = excluded.ended_at, last_activity = excluded.last_activity"
                ),
                params![
                    session.id,
                    session.name,
                    session.branch,
                    session.agent_type,
                    session.agent_pid,
                    session.context_id,
                    session.previous_session_id,
                    ts_text(&session.started_at),
                    opt_ts_text(session.ended_at.as_ref()),
                    opt_ts_text(session.last_activity.as_ref()),
                ],
            )?;
            Ok(())
        })
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn get_session(&self, id: &str) -> Result<Session> {
        self.conn()
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                [id],
                session_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("session", id))
    }

    /// Sessions by most recent activity; never-active sessions last.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             ORDER BY last_activity IS NULL, last_activity DESC, started_at DESC"
        ))?;
        let rows = stmt.query_map([], session_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Stamp `last_activity` with the canonical current time.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn update_session_activity(&self, id: &str) -> Result<()> {
        self.touch_session(id, "last_activity")
    }

    /// Stamp `ended_at` with the canonical current time.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn end_session(&self, id: &str) -> Result<()> {
        self.touch_session(id, "ended_at")
    }

    fn touch_session(&self, id: &str, column: &str) -> Result<()> {
        self.mutate(|conn| {
            let changed = conn.execute(
                &format!("UPDATE sessions SET {column} = ?2 WHERE id = ?1"),
                params![id, ts_text(&timestamp::now())],
            )?;
            if changed == 0 {
                return Err(Error::not_found("session", id));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::temp_db;
    use crate::model::Session;

    #[test]
    fn work_session_lifecycle() {
        let (_dir, db) = temp_db();
        let mut ws = db.create_work_session("refactor", "s1", "abc").unwrap();
        assert!(ws.id.starts_with("ws-"));
        assert_eq!(ws.id.len(), 7);

        db.tag_issue_to_work_session(&ws.id, "aaaa0001").unwrap();
        db.tag_issue_to_work_session(&ws.id, "td-aaaa0002").unwrap();
        db.tag_issue_to_work_session(&ws.id, "td-aaaa0002").unwrap();
        assert_eq!(
            db.get_work_session_issues(&ws.id).unwrap(),
            vec!["td-aaaa0001", "td-aaaa0002"]
        );
        db.untag_issue_from_work_session(&ws.id, "td-aaaa0001").unwrap();
        assert_eq!(db.get_work_session_issues(&ws.id).unwrap().len(), 1);

        ws.ended_at = Some(crate::timestamp::now());
        ws.end_sha = "def".into();
        db.update_work_session(&ws).unwrap();
        let loaded = db.get_work_session(&ws.id).unwrap();
        assert_eq!(loaded.end_sha, "def");
        assert_eq!(loaded.ended_at, ws.ended_at);
        assert_eq!(db.list_work_sessions(10).unwrap().len(), 1);
    }

    #[test]
    fn session_activity_uses_canonical_timestamps() {
        let (_dir, db) = temp_db();
        db.upsert_session(&Session {
            id: "ses_1".into(),
            name: "agent".into(),
            started_at: crate::timestamp::now(),
            ..Session::default()
        })
        .unwrap();
        db.upsert_session(&Session {
            id: "ses_2".into(),
            started_at: crate::timestamp::now(),
            ..Session::default()
        })
        .unwrap();

        db.update_session_activity("ses_2").unwrap();
        let raw: String = db
            .conn()
            .query_row(
                "SELECT last_activity FROM sessions WHERE id = 'ses_2'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(raw.contains('T') && raw.ends_with('Z'));

        let sessions = db.list_sessions().unwrap();
        assert_eq!(sessions[0].id, "ses_2");
        assert!(db.update_session_activity("ses_missing").unwrap_err().is_not_found());

        db.end_session("ses_1").unwrap();
        assert!(db.get_session("ses_1").unwrap().ended_at.is_some());
    }
}
