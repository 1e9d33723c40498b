//! Activity attached to issues: progress logs, handoffs, git snapshots, and
//! comments. None of these are journaled.

use super::{Database, insert_with_fresh_id, non_empty, opt_text_col, text_col, ts_col, ts_text};
use crate::error::{Error, Result};
use crate::ids::{generate_log_id, normalize_issue_id};
use crate::model::{Comment, GitSnapshot, Handoff, Log, SnapshotEvent};
use crate::timestamp;
use rusqlite::{Connection, OptionalExtension, Row, params};

const LOG_COLUMNS: &str = "id, issue_id, session_id, work_session_id, message, type, timestamp";
const HANDOFF_COLUMNS: &str =
    "id, issue_id, session_id, done, remaining, decisions, uncertain, timestamp";
const SNAPSHOT_COLUMNS: &str = "id, issue_id, event, commit_sha, branch, dirty_files, timestamp";

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<Log> {
    Ok(Log {
        id: row.get(0)?,
        issue_id: text_col(row, 1)?,
        session_id: text_col(row, 2)?,
        work_session_id: opt_text_col(row, 3)?,
        message: row.get(4)?,
        log_type: row.get(5)?,
        timestamp: ts_col(row, 6)?,
    })
}

/// Handoff columns as stored; the lists are decoded afterwards so a bad
/// payload surfaces as [`Error::Unmarshal`].
struct RawHandoff {
    id: i64,
    issue_id: String,
    session_id: String,
    lists: [String; 4],
    timestamp: chrono::DateTime<chrono::Utc>,
}

fn raw_handoff(row: &Row<'_>) -> rusqlite::Result<RawHandoff> {
    Ok(RawHandoff {
        id: row.get(0)?,
        issue_id: row.get(1)?,
        session_id: text_col(row, 2)?,
        lists: [
            text_col(row, 3)?,
            text_col(row, 4)?,
            text_col(row, 5)?,
            text_col(row, 6)?,
        ],
        timestamp: ts_col(row, 7)?,
    })
}

fn decode_list(raw: &str, field: &'static str) -> Result<Vec<String>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|source| Error::Unmarshal { field, source })
}

impl TryFrom<RawHandoff> for Handoff {
    type Error = Error;

    fn try_from(raw: RawHandoff) -> Result<Self> {
        let [done, remaining, decisions, uncertain] = raw.lists;
        Ok(Self {
            id: raw.id,
            issue_id: raw.issue_id,
            session_id: raw.session_id,
            done: decode_list(&done, "done")?,
            remaining: decode_list(&remaining, "remaining")?,
            decisions: decode_list(&decisions, "decisions")?,
            uncertain: decode_list(&uncertain, "uncertain")?,
            timestamp: raw.timestamp,
        })
    }
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<GitSnapshot> {
    Ok(GitSnapshot {
        id: row.get(0)?,
        issue_id: row.get(1)?,
        event: row.get(2)?,
        commit_sha: text_col(row, 3)?,
        branch: text_col(row, 4)?,
        dirty_files: row.get::<_, Option<i64>>(5)?.unwrap_or_default(),
        timestamp: ts_col(row, 6)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        issue_id: row.get(1)?,
        session_id: text_col(row, 2)?,
        text: row.get(3)?,
        created_at: ts_col(row, 4)?,
    })
}

pub(crate) fn add_log_in(conn: &Connection, draft: Log) -> Result<Log> {
    let mut log = draft;
    log.issue_id = normalize_issue_id(&log.issue_id);
    log.timestamp = timestamp::now();
    let id = insert_with_fresh_id("log", generate_log_id, |id| {
        conn.execute(
            &format!("INSERT INTO logs ({LOG_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                id,
                log.issue_id,
                log.session_id,
                non_empty(log.work_session_id.as_deref()),
                log.message,
                log.log_type,
                ts_text(&log.timestamp),
            ],
        )
        .map(|_| ())
    })?;
    log.id = id;
    Ok(log)
}

fn collect_logs(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Log>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, log_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

impl Database {
    /// Append a log line. The id and timestamp are assigned here.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or insert fails.
    pub fn add_log(&self, draft: Log) -> Result<Log> {
        self.mutate(|conn| add_log_in(conn, draft))
    }

    /// Logs of an issue in insertion order. With `limit`, only the most
    /// recent `limit` entries, still oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_logs(&self, issue_id: &str, limit: Option<usize>) -> Result<Vec<Log>> {
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        collect_logs(
            self.conn(),
            &format!(
                "SELECT {LOG_COLUMNS} FROM (SELECT rowid AS seq, {LOG_COLUMNS} FROM logs \
                 WHERE issue_id = ?1 ORDER BY rowid DESC LIMIT ?2) ORDER BY seq"
            ),
            params![normalize_issue_id(issue_id), limit],
        )
    }

    /// Logs tagged with a work session, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_logs_for_work_session(&self, work_session_id: &str) -> Result<Vec<Log>> {
        collect_logs(
            self.conn(),
            &format!("SELECT {LOG_COLUMNS} FROM logs WHERE work_session_id = ?1 ORDER BY rowid"),
            [work_session_id],
        )
    }

    /// # Errors
    ///
    /// Returns an error if the lock, encoding, or insert fails.
    pub fn add_handoff(&self, draft: Handoff) -> Result<Handoff> {
        let mut handoff = draft;
        handoff.issue_id = normalize_issue_id(&handoff.issue_id);
        handoff.timestamp = timestamp::now();
        let lists = [
            serde_json::to_string(&handoff.done)?,
            serde_json::to_string(&handoff.remaining)?,
            serde_json::to_string(&handoff.decisions)?,
            serde_json::to_string(&handoff.uncertain)?,
        ];
        handoff.id = self.mutate(|conn| {
            conn.execute(
                "INSERT INTO handoffs (issue_id, session_id, done, remaining, decisions, \
                 uncertain, timestamp) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    handoff.issue_id,
                    handoff.session_id,
                    lists[0],
                    lists[1],
                    lists[2],
                    lists[3],
                    ts_text(&handoff.timestamp),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(handoff)
    }

    /// Most recent handoff for an issue.
    ///
    /// # Errors
    ///
    /// [`Error::Unmarshal`] when a stored list is not a JSON string array.
    pub fn get_latest_handoff(&self, issue_id: &str) -> Result<Option<Handoff>> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {HANDOFF_COLUMNS} FROM handoffs WHERE issue_id = ?1 \
                     ORDER BY id DESC LIMIT 1"
                ),
                [normalize_issue_id(issue_id)],
                raw_handoff,
            )
            .optional()?
            .map(Handoff::try_from)
            .transpose()
    }

    /// All handoffs for an issue, oldest first.
    ///
    /// # Errors
    ///
    /// [`Error::Unmarshal`] when a stored list is not a JSON string array.
    pub fn get_handoffs(&self, issue_id: &str) -> Result<Vec<Handoff>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {HANDOFF_COLUMNS} FROM handoffs WHERE issue_id = ?1 ORDER BY id"
        ))?;
        let raw = stmt
            .query_map([normalize_issue_id(issue_id)], raw_handoff)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(Handoff::try_from).collect()
    }

    /// # Errors
    ///
    /// Returns an error if the lock or insert fails.
    pub fn add_git_snapshot(&self, draft: GitSnapshot) -> Result<GitSnapshot> {
        let mut snapshot = draft;
        snapshot.issue_id = normalize_issue_id(&snapshot.issue_id);
        snapshot.timestamp = timestamp::now();
        snapshot.id = self.mutate(|conn| {
            conn.execute(
                "INSERT INTO git_snapshots (issue_id, event, commit_sha, branch, dirty_files, \
                 timestamp) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    snapshot.issue_id,
                    snapshot.event,
                    snapshot.commit_sha,
                    snapshot.branch,
                    snapshot.dirty_files,
                    ts_text(&snapshot.timestamp),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(snapshot)
    }

    /// The latest `start` snapshot for an issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_start_snapshot(&self, issue_id: &str) -> Result<Option<GitSnapshot>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM git_snapshots \
                     WHERE issue_id = ?1 AND event = ?2 ORDER BY id DESC LIMIT 1"
                ),
                params![normalize_issue_id(issue_id), SnapshotEvent::Start],
                snapshot_from_row,
            )
            .optional()?)
    }

    /// # Errors
    ///
    /// Returns an error if the lock or insert fails.
    pub fn add_comment(&self, issue_id: &str, session_id: &str, text: &str) -> Result<Comment> {
        let issue_id = normalize_issue_id(issue_id);
        let created_at = timestamp::now();
        let id = self.mutate(|conn| {
            conn.execute(
                "INSERT INTO comments (issue_id, session_id, text, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![issue_id, session_id, text, ts_text(&created_at)],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(Comment {
            id,
            issue_id,
            session_id: session_id.to_string(),
            text: text.to_string(),
            created_at,
        })
    }

    /// Comments on an issue, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, issue_id, session_id, text, created_at FROM comments \
             WHERE issue_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([normalize_issue_id(issue_id)], comment_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}
