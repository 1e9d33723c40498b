//! Dashboard statistics in three round trips.

use super::{Database, ts_text};
use super::issues::{ISSUE_COLUMNS, issue_from_row_at};
use crate::error::Result;
use crate::model::Issue;
use crate::timestamp;
use rusqlite::params;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtendedStats {
    pub total: i64,
    pub deleted: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_type: BTreeMap<String, i64>,
    pub by_priority: BTreeMap<String, i64>,
    pub total_points: i64,
    pub completed_points: i64,
    pub created_today: i64,
    pub closed_today: i64,
    pub total_logs: i64,
    pub total_handoffs: i64,
    pub total_comments: i64,
    pub pending_actions: i64,
    pub oldest_open: Option<Issue>,
    pub newest: Option<Issue>,
    pub last_closed: Option<Issue>,
}

impl ExtendedStats {
    /// Share of points on closed issues, in percent.
    #[must_use]
    pub fn completion_rate(&self) -> f64 {
        if self.total_points == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.completed_points as f64 * 100.0 / self.total_points as f64;
        rate
    }
}

const SCALAR_SQL: &str = "SELECT
    COALESCE(SUM(CASE WHEN deleted_at IS NULL THEN 1 ELSE 0 END), 0),
    COALESCE(SUM(CASE WHEN deleted_at IS NOT NULL THEN 1 ELSE 0 END), 0),
    COALESCE(SUM(CASE WHEN deleted_at IS NULL THEN points ELSE 0 END), 0),
    COALESCE(SUM(CASE WHEN deleted_at IS NULL AND status = 'closed' THEN points ELSE 0 END), 0),
    COALESCE(SUM(CASE WHEN deleted_at IS NULL AND replace(created_at, ' ', 'T') >= ?1
        AND replace(created_at, ' ', 'T') < ?2 THEN 1 ELSE 0 END), 0),
    COALESCE(SUM(CASE WHEN deleted_at IS NULL AND replace(closed_at, ' ', 'T') >= ?1
        AND replace(closed_at, ' ', 'T') < ?2 THEN 1 ELSE 0 END), 0),
    (SELECT COUNT(*) FROM logs),
    (SELECT COUNT(*) FROM handoffs),
    (SELECT COUNT(*) FROM comments),
    (SELECT COUNT(*) FROM action_log WHERE synced_at IS NULL AND undone = 0)
FROM issues";

const GROUPED_SQL: &str = "
    SELECT 'status', status, COUNT(*) FROM issues WHERE deleted_at IS NULL GROUP BY status
    UNION ALL
    SELECT 'type', type, COUNT(*) FROM issues WHERE deleted_at IS NULL GROUP BY type
    UNION ALL
    SELECT 'priority', priority, COUNT(*) FROM issues WHERE deleted_at IS NULL GROUP BY priority";

fn sample_sql() -> String {
    format!(
        "SELECT * FROM (SELECT 'oldest_open', {ISSUE_COLUMNS} FROM issues
             WHERE deleted_at IS NULL AND status != 'closed' ORDER BY created_at, id LIMIT 1)
         UNION ALL
         SELECT * FROM (SELECT 'newest', {ISSUE_COLUMNS} FROM issues
             WHERE deleted_at IS NULL ORDER BY created_at DESC, id DESC LIMIT 1)
         UNION ALL
         SELECT * FROM (SELECT 'last_closed', {ISSUE_COLUMNS} FROM issues
             WHERE deleted_at IS NULL AND status = 'closed' ORDER BY closed_at DESC, id DESC LIMIT 1)"
    )
}

impl Database {
    /// Counts, point totals, and a few representative issues.
    ///
    /// `created_today` and `closed_today` count rows stamped between the
    /// local midnights that bound today.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fails.
    pub fn get_extended_stats(&self) -> Result<ExtendedStats> {
        let conn = self.conn();
        let (day_start, day_end) = timestamp::local_day_bounds();
        let (day_start, day_end) = (ts_text(&day_start), ts_text(&day_end));
        let mut stats = conn.query_row(SCALAR_SQL, params![day_start, day_end], |row| {
            Ok(ExtendedStats {
                total: row.get(0)?,
                deleted: row.get(1)?,
                total_points: row.get(2)?,
                completed_points: row.get(3)?,
                created_today: row.get(4)?,
                closed_today: row.get(5)?,
                total_logs: row.get(6)?,
                total_handoffs: row.get(7)?,
                total_comments: row.get(8)?,
                pending_actions: row.get(9)?,
                ..ExtendedStats::default()
            })
        })?;

        let mut stmt = conn.prepare(GROUPED_SQL)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        for row in rows {
            let (dimension, key, count) = row?;
            let bucket = match dimension.as_str() {
                "status" => &mut stats.by_status,
                "type" => &mut stats.by_type,
                _ => &mut stats.by_priority,
            };
            bucket.insert(key, count);
        }

        let mut stmt = conn.prepare(&sample_sql())?;
        let rows = stmt.query_map([], |row| {
            let kind: String = row.get(0)?;
            let issue = issue_from_row_at(row, 1)?;
            Ok((kind, issue))
        })?;
        for row in rows {
            let (kind, issue) = row?;
            match kind.as_str() {
                "oldest_open" => stats.oldest_open = Some(issue),
                "newest" => stats.newest = Some(issue),
                _ => stats.last_closed = Some(issue),
            }
        }

        Ok(stats)
    }
}
