//! Issue rows: create, update, soft-delete, restore, hierarchy, and the
//! per-session history that feeds review rules.
//!
//! Every write comes in two flavours. The unlogged one is what a sync
//! receiver uses for events that are already on the wire; the `_logged` one
//! also appends the journal row. Both share one routine so they cannot drift.

use super::action_log::journal_if;
use super::{
    Database, Journal, insert_with_fresh_id, non_empty, opt_text_col, opt_ts_col, opt_ts_text,
    text_col, ts_col, ts_text,
};
use crate::error::{Error, Result};
use crate::ids::{generate_id, normalize_issue_id};
use crate::model::issue::{join_labels, split_labels};
use crate::model::{ActionType, EntityType, Issue, IssueSessionHistory, Status};
use crate::timestamp;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::{HashSet, VecDeque};

/// Column list shared by every issue read, including the pre-image read of
/// logged mutations, so journal payloads match what the getters return.
pub(crate) const ISSUE_COLUMNS: &str = "id, title, description, status, type, priority, points, \
     labels, parent_id, acceptance, sprint, implementer_session, creator_session, \
     reviewer_session, created_branch, minor, created_at, updated_at, closed_at, deleted_at, \
     defer_until, due_date, defer_count";

pub(crate) fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    issue_from_row_at(row, 0)
}

/// Map the issue columns starting at column `at`.
pub(crate) fn issue_from_row_at(row: &Row<'_>, at: usize) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: row.get(at)?,
        title: row.get(at + 1)?,
        description: text_col(row, at + 2)?,
        status: row.get(at + 3)?,
        issue_type: row.get(at + 4)?,
        priority: row.get(at + 5)?,
        points: row.get::<_, Option<i64>>(at + 6)?.unwrap_or_default(),
        labels: split_labels(&text_col(row, at + 7)?),
        parent_id: opt_text_col(row, at + 8)?,
        acceptance: text_col(row, at + 9)?,
        sprint: text_col(row, at + 10)?,
        implementer_session: opt_text_col(row, at + 11)?,
        creator_session: opt_text_col(row, at + 12)?,
        reviewer_session: opt_text_col(row, at + 13)?,
        created_branch: text_col(row, at + 14)?,
        minor: row.get::<_, Option<i64>>(at + 15)?.unwrap_or_default() != 0,
        created_at: ts_col(row, at + 16)?,
        updated_at: ts_col(row, at + 17)?,
        closed_at: opt_ts_col(row, at + 18)?,
        deleted_at: opt_ts_col(row, at + 19)?,
        defer_until: opt_text_col(row, at + 20)?,
        due_date: opt_text_col(row, at + 21)?,
        defer_count: row.get::<_, Option<i64>>(at + 22)?.unwrap_or_default(),
    })
}

/// Read one issue with the canonical column set.
pub(crate) fn load_issue(
    conn: &Connection,
    id: &str,
    include_deleted: bool,
) -> Result<Option<Issue>> {
    let filter = if include_deleted {
        ""
    } else {
        " AND deleted_at IS NULL"
    };
    Ok(conn
        .query_row(
            &format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1{filter}"),
            [id],
            issue_from_row,
        )
        .optional()?)
}

fn require_issue(conn: &Connection, id: &str) -> Result<Issue> {
    load_issue(conn, id, true)?.ok_or_else(|| Error::not_found("issue", id))
}

pub(crate) fn issue_json(issue: &Issue) -> Result<String> {
    Ok(serde_json::to_string(issue)?)
}

fn normalize(issue: &mut Issue) {
    issue.id = normalize_issue_id(&issue.id);
    issue.parent_id = issue
        .parent_id
        .as_deref()
        .map(normalize_issue_id)
        .filter(|p| !p.is_empty());
    if issue.status == Status::Closed && issue.closed_at.is_none() {
        issue.closed_at = Some(issue.updated_at);
    }
}

/// Write every column of `issue` as a new row, or overwrite the row with the
/// same id when `upsert` is set.
fn write_issue_row(conn: &Connection, id: &str, issue: &Issue, upsert: bool) -> rusqlite::Result<()> {
    let conflict = if upsert {
        " ON CONFLICT(id) DO UPDATE SET title = excluded.title, \
         description = excluded.description, status = excluded.status, type = excluded.type, \
         priority = excluded.priority, points = excluded.points, labels = excluded.labels, \
         parent_id = excluded.parent_id, acceptance = excluded.acceptance, \
         sprint = excluded.sprint, implementer_session = excluded.implementer_session, \
         creator_session = excluded.creator_session, \
         reviewer_session = excluded.reviewer_session, \
         created_branch = excluded.created_branch, minor = excluded.minor, \
         created_at = excluded.created_at, updated_at = excluded.updated_at, \
         closed_at = excluded.closed_at, deleted_at = excluded.deleted_at, \
         defer_until = excluded.defer_until, due_date = excluded.due_date, \
         defer_count = excluded.defer_count"
    } else {
        ""
    };
    conn.execute(
        &format!(
            "INSERT INTO issues ({ISSUE_COLUMNS}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
              ?17, ?18, ?19, ?20, ?21, ?22, ?23){conflict}"
        ),
        params![
            id,
            issue.title,
            issue.description,
            issue.status,
            issue.issue_type,
            issue.priority,
            issue.points,
            join_labels(&issue.labels),
            non_empty(issue.parent_id.as_deref()),
            issue.acceptance,
            issue.sprint,
            non_empty(issue.implementer_session.as_deref()),
            non_empty(issue.creator_session.as_deref()),
            non_empty(issue.reviewer_session.as_deref()),
            issue.created_branch,
            i64::from(issue.minor),
            ts_text(&issue.created_at),
            ts_text(&issue.updated_at),
            opt_ts_text(issue.closed_at.as_ref()),
            opt_ts_text(issue.deleted_at.as_ref()),
            non_empty(issue.defer_until.as_deref()),
            non_empty(issue.due_date.as_deref()),
            issue.defer_count,
        ],
    )?;
    Ok(())
}

fn update_issue_row(conn: &Connection, issue: &Issue) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE issues SET title = ?2, description = ?3, status = ?4, type = ?5, \
         priority = ?6, points = ?7, labels = ?8, parent_id = ?9, acceptance = ?10, \
         sprint = ?11, implementer_session = ?12, creator_session = ?13, \
         reviewer_session = ?14, created_branch = ?15, minor = ?16, updated_at = ?17, \
         closed_at = ?18, defer_until = ?19, due_date = ?20, defer_count = ?21 \
         WHERE id = ?1",
        params![
            issue.id,
            issue.title,
            issue.description,
            issue.status,
            issue.issue_type,
            issue.priority,
            issue.points,
            join_labels(&issue.labels),
            non_empty(issue.parent_id.as_deref()),
            issue.acceptance,
            issue.sprint,
            non_empty(issue.implementer_session.as_deref()),
            non_empty(issue.creator_session.as_deref()),
            non_empty(issue.reviewer_session.as_deref()),
            issue.created_branch,
            i64::from(issue.minor),
            ts_text(&issue.updated_at),
            opt_ts_text(issue.closed_at.as_ref()),
            non_empty(issue.defer_until.as_deref()),
            non_empty(issue.due_date.as_deref()),
            issue.defer_count,
        ],
    )
}

// ---------------------------------------------------------------------------
// Shared write routines
// ---------------------------------------------------------------------------

pub(crate) fn create_issue_in(
    conn: &Connection,
    draft: Issue,
    journal: Option<Journal<'_>>,
) -> Result<Issue> {
    let mut issue = draft;
    let now = timestamp::now();
    issue.created_at = now;
    issue.updated_at = now;
    issue.deleted_at = None;
    normalize(&mut issue);

    let id = if issue.id.is_empty() {
        insert_with_fresh_id("issue", generate_id, |id| {
            write_issue_row(conn, id, &issue, false)
        })?
    } else {
        write_issue_row(conn, &issue.id, &issue, false)?;
        issue.id.clone()
    };

    let stored = require_issue(conn, &id)?;
    journal_if(
        conn,
        journal,
        EntityType::Issue,
        &id,
        "",
        &issue_json(&stored)?,
    )?;
    Ok(stored)
}

pub(crate) fn update_issue_in(
    conn: &Connection,
    issue: &Issue,
    journal: Option<Journal<'_>>,
) -> Result<Issue> {
    let id = normalize_issue_id(&issue.id);
    let previous = require_issue(conn, &id)?;

    let mut next = issue.clone();
    next.id.clone_from(&id);
    next.updated_at = timestamp::now();
    normalize(&mut next);
    update_issue_row(conn, &next)?;

    let stored = require_issue(conn, &id)?;
    journal_if(
        conn,
        journal,
        EntityType::Issue,
        &id,
        &issue_json(&previous)?,
        &issue_json(&stored)?,
    )?;
    Ok(stored)
}

fn delete_issue_in(conn: &Connection, id: &str, journal: Option<Journal<'_>>) -> Result<()> {
    let id = normalize_issue_id(id);
    let previous = require_issue(conn, &id)?;
    let now = ts_text(&timestamp::now());
    conn.execute(
        "UPDATE issues SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1",
        params![id, now],
    )?;
    journal_if(
        conn,
        journal,
        EntityType::Issue,
        &id,
        &issue_json(&previous)?,
        "",
    )
}

fn restore_issue_in(conn: &Connection, id: &str, journal: Option<Journal<'_>>) -> Result<Issue> {
    let id = normalize_issue_id(id);
    let previous = require_issue(conn, &id)?;
    conn.execute(
        "UPDATE issues SET deleted_at = NULL, updated_at = ?2 WHERE id = ?1",
        params![id, ts_text(&timestamp::now())],
    )?;
    let stored = require_issue(conn, &id)?;
    journal_if(
        conn,
        journal,
        EntityType::Issue,
        &id,
        &issue_json(&previous)?,
        &issue_json(&stored)?,
    )?;
    Ok(stored)
}

/// Ids of every issue below `root`, breadth first. Cycles in `parent_id`
/// are tolerated; each id appears once and `root` never does.
pub(crate) fn descendant_ids(conn: &Connection, root: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT id FROM issues WHERE parent_id = ?1 AND deleted_at IS NULL ORDER BY id")?;
    let mut visited: HashSet<String> = HashSet::from([root.to_string()]);
    let mut queue: VecDeque<String> = VecDeque::from([root.to_string()]);
    let mut out = Vec::new();

    while let Some(current) = queue.pop_front() {
        let children = stmt
            .query_map([&current], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for child in children {
            if visited.insert(child.clone()) {
                out.push(child.clone());
                queue.push_back(child);
            }
        }
    }
    Ok(out)
}

pub(crate) fn children_of(conn: &Connection, parent_id: &str) -> Result<Vec<Issue>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ISSUE_COLUMNS} FROM issues WHERE parent_id = ?1 AND deleted_at IS NULL \
         ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map([parent_id], issue_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl Database {
    /// Insert a new issue without journaling. A blank id gets a fresh `td-`
    /// id; timestamps are stamped now.
    ///
    /// # Errors
    ///
    /// Lock, constraint, or id-exhaustion failures.
    pub fn create_issue(&self, draft: Issue) -> Result<Issue> {
        self.mutate(|conn| create_issue_in(conn, draft, None))
    }

    /// Insert a new issue and journal a `create` row whose `new_data` is the
    /// stored issue.
    ///
    /// # Errors
    ///
    /// See [`Database::create_issue`].
    pub fn create_issue_logged(&self, draft: Issue, session_id: &str) -> Result<Issue> {
        self.mutate(|conn| {
            create_issue_in(
                conn,
                draft,
                Some(Journal::new(session_id, ActionType::Create)),
            )
        })
    }

    /// Load a live issue.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown or soft-deleted.
    pub fn get_issue(&self, id: &str) -> Result<Issue> {
        let id = normalize_issue_id(id);
        load_issue(self.conn(), &id, false)?.ok_or_else(|| Error::not_found("issue", id))
    }

    /// Load an issue whether or not it is soft-deleted.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn get_issue_including_deleted(&self, id: &str) -> Result<Issue> {
        require_issue(self.conn(), &normalize_issue_id(id))
    }

    /// Overwrite the mutable columns of an existing issue.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn update_issue(&self, issue: &Issue) -> Result<Issue> {
        self.mutate(|conn| update_issue_in(conn, issue, None))
    }

    /// Update and journal with `action_type` (`update`, `start`, `review`,
    /// ...). `previous_data` is the row as it was before the write.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn update_issue_logged(
        &self,
        issue: &Issue,
        session_id: &str,
        action_type: ActionType,
    ) -> Result<Issue> {
        self.mutate(|conn| {
            update_issue_in(conn, issue, Some(Journal::new(session_id, action_type)))
        })
    }

    /// Soft-delete: stamp `deleted_at`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn delete_issue(&self, id: &str) -> Result<()> {
        self.mutate(|conn| delete_issue_in(conn, id, None))
    }

    /// Soft-delete and journal a `delete` row with empty `new_data`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn delete_issue_logged(&self, id: &str, session_id: &str) -> Result<()> {
        self.mutate(|conn| {
            delete_issue_in(conn, id, Some(Journal::new(session_id, ActionType::Delete)))
        })
    }

    /// Clear `deleted_at`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn restore_issue(&self, id: &str) -> Result<Issue> {
        self.mutate(|conn| restore_issue_in(conn, id, None))
    }

    /// Clear `deleted_at` and journal a `restore` row.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn restore_issue_logged(&self, id: &str, session_id: &str) -> Result<Issue> {
        self.mutate(|conn| {
            restore_issue_in(conn, id, Some(Journal::new(session_id, ActionType::Restore)))
        })
    }

    /// Insert or overwrite an issue exactly as given, timestamps included.
    /// Used when replaying journal payloads; never journals.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or write fails.
    pub fn upsert_issue(&self, issue: &Issue) -> Result<()> {
        self.mutate(|conn| upsert_issue_in(conn, issue))
    }

    /// Live direct children, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_children(&self, parent_id: &str) -> Result<Vec<Issue>> {
        children_of(self.conn(), &normalize_issue_id(parent_id))
    }

    /// Ids of all live descendants of `id`, breadth first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_descendants(&self, id: &str) -> Result<Vec<String>> {
        descendant_ids(self.conn(), &normalize_issue_id(id))
    }

    /// Note that `session_id` performed `action` on an issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or insert fails.
    pub fn record_session_action(&self, issue_id: &str, session_id: &str, action: &str) -> Result<()> {
        let issue_id = normalize_issue_id(issue_id);
        self.mutate(|conn| {
            conn.execute(
                "INSERT INTO issue_session_history (issue_id, session_id, action, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![issue_id, session_id, action, ts_text(&timestamp::now())],
            )?;
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_session_history(&self, issue_id: &str) -> Result<Vec<IssueSessionHistory>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, issue_id, session_id, action, created_at FROM issue_session_history \
             WHERE issue_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([normalize_issue_id(issue_id)], |row| {
            Ok(IssueSessionHistory {
                id: row.get(0)?,
                issue_id: row.get(1)?,
                session_id: row.get(2)?,
                action: row.get(3)?,
                created_at: ts_col(row, 4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Whether `session_id` has any history row for the issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn was_session_involved(&self, issue_id: &str, session_id: &str) -> Result<bool> {
        Ok(self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM issue_session_history \
             WHERE issue_id = ?1 AND session_id = ?2)",
            params![normalize_issue_id(issue_id), session_id],
            |row| row.get(0),
        )?)
    }
}

pub(crate) fn upsert_issue_in(conn: &Connection, issue: &Issue) -> Result<()> {
    let mut issue = issue.clone();
    issue.id = normalize_issue_id(&issue.id);
    if issue.id.is_empty() {
        return Err(Error::invalid("cannot upsert an issue without an id"));
    }
    issue.parent_id = issue
        .parent_id
        .as_deref()
        .map(normalize_issue_id)
        .filter(|p| !p.is_empty());
    write_issue_row(conn, &issue.id, &issue, true)?;
    Ok(())
}

/// Soft-delete without journaling; missing or already deleted rows are left
/// as they are.
pub(crate) fn soft_delete_issue_row(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE issues SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
        params![normalize_issue_id(id), ts_text(&timestamp::now())],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::temp_db;
    use crate::model::{ActionType, Issue, IssueType, Priority, Status};

    fn action_count(db: &crate::Database) -> i64 {
        db.conn()
            .query_row("SELECT COUNT(*) FROM action_log", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn create_applies_defaults() {
        let (_dir, db) = temp_db();
        let issue = db.create_issue(Issue::new("defaults")).unwrap();

        assert!(issue.id.starts_with("td-"));
        assert_eq!(issue.id.len(), 11);
        assert_eq!(issue.status, Status::Open);
        assert_eq!(issue.issue_type, IssueType::Task);
        assert_eq!(issue.priority, Priority::P2);
        assert_eq!(issue.created_at, issue.updated_at);
        assert!(issue.closed_at.is_none());
    }

    #[test]
    fn bare_hex_ids_are_normalized() {
        let (_dir, db) = temp_db();
        let parent = db.create_issue(Issue::new("parent")).unwrap();
        let bare = parent.id.trim_start_matches("td-").to_string();

        let mut child = Issue::new("child");
        child.parent_id = Some(bare.clone());
        let child = db.create_issue(child).unwrap();

        assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
        assert_eq!(db.get_issue(&bare).unwrap().id, parent.id);
    }

    #[test]
    fn round_trips_every_column() {
        let (_dir, db) = temp_db();
        let mut draft = Issue::new("full");
        draft.description = "body".into();
        draft.issue_type = IssueType::Bug;
        draft.priority = Priority::P0;
        draft.points = 5;
        draft.labels = vec!["api".into(), "urgent".into()];
        draft.acceptance = "works".into();
        draft.sprint = "s7".into();
        draft.implementer_session = Some("ses-1".into());
        draft.creator_session = Some("ses-0".into());
        draft.created_branch = "main".into();
        draft.minor = true;
        draft.defer_until = Some("2030-01-01".into());
        draft.due_date = Some("2030-02-01".into());
        draft.defer_count = 2;

        let stored = db.create_issue(draft.clone()).unwrap();
        let loaded = db.get_issue(&stored.id).unwrap();
        assert_eq!(loaded, stored);
        assert_eq!(loaded.labels, draft.labels);
        assert!(loaded.minor);
        assert_eq!(loaded.defer_until.as_deref(), Some("2030-01-01"));
    }

    #[test]
    fn closing_stamps_closed_at() {
        let (_dir, db) = temp_db();
        let mut issue = db.create_issue(Issue::new("close me")).unwrap();
        issue.status = Status::Closed;
        let closed = db.update_issue(&issue).unwrap();
        assert!(closed.closed_at.is_some());
        assert!(closed.updated_at > closed.created_at);
    }

    #[test]
    fn update_unknown_issue_is_not_found() {
        let (_dir, db) = temp_db();
        let mut ghost = Issue::new("ghost");
        ghost.id = "td-00000000".into();
        let err = db.update_issue(&ghost).unwrap_err();
        assert_eq!(err.to_string(), "issue not found: td-00000000");
    }

    #[test]
    fn delete_and_restore() {
        let (_dir, db) = temp_db();
        let issue = db.create_issue(Issue::new("x")).unwrap();

        db.delete_issue(&issue.id).unwrap();
        assert!(db.get_issue(&issue.id).unwrap_err().is_not_found());
        assert!(db.get_issue_including_deleted(&issue.id).unwrap().is_deleted());

        let restored = db.restore_issue_logged(&issue.id, "s1").unwrap();
        assert!(!restored.is_deleted());

        let last = db.get_last_action("s1").unwrap().unwrap();
        assert_eq!(last.action_type, ActionType::Restore);
        let before: Issue = last.previous().unwrap().unwrap();
        assert!(before.is_deleted());
        let after: Issue = last.new_image().unwrap().unwrap();
        assert!(!after.is_deleted());
    }

    #[test]
    fn unlogged_writes_leave_journal_empty() {
        let (_dir, db) = temp_db();
        let mut issue = db.create_issue(Issue::new("quiet")).unwrap();
        issue.title = "still quiet".into();
        db.update_issue(&issue).unwrap();
        db.delete_issue(&issue.id).unwrap();
        db.restore_issue(&issue.id).unwrap();
        assert_eq!(action_count(&db), 0);
    }

    #[test]
    fn upsert_preserves_payload() {
        let (_dir, db) = temp_db();
        let original = db.create_issue(Issue::new("source")).unwrap();

        let mut copy = original.clone();
        copy.title = "replayed".into();
        db.upsert_issue(&copy).unwrap();
        let loaded = db.get_issue(&original.id).unwrap();
        assert_eq!(loaded.title, "replayed");
        assert_eq!(loaded.updated_at, original.updated_at);

        let mut fresh = original;
        fresh.id = "td-abcdef01".into();
        db.upsert_issue(&fresh).unwrap();
        assert!(db.get_issue("td-abcdef01").is_ok());
    }

    #[test]
    fn descendants_tolerate_cycles() {
        let (_dir, db) = temp_db();
        let root = db.create_issue(Issue::new("root")).unwrap();
        let mut child = Issue::new("child");
        child.parent_id = Some(root.id.clone());
        let child = db.create_issue(child).unwrap();
        let mut grandchild = Issue::new("grandchild");
        grandchild.parent_id = Some(child.id.clone());
        let grandchild = db.create_issue(grandchild).unwrap();

        // Close the loop: root becomes a child of the grandchild.
        let mut looped = root.clone();
        looped.parent_id = Some(grandchild.id.clone());
        db.update_issue(&looped).unwrap();

        let descendants = db.get_descendants(&root.id).unwrap();
        assert_eq!(descendants, vec![child.id.clone(), grandchild.id]);
        assert_eq!(db.get_children(&root.id).unwrap().len(), 1);
    }

    #[test]
    fn session_history() {
        let (_dir, db) = temp_db();
        let issue = db.create_issue(Issue::new("h")).unwrap();
        assert!(!db.was_session_involved(&issue.id, "s1").unwrap());

        db.record_session_action(&issue.id, "s1", "started").unwrap();
        assert!(db.was_session_involved(&issue.id, "s1").unwrap());
        assert!(!db.was_session_involved(&issue.id, "s2").unwrap());

        let history = db.get_session_history(&issue.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, "started");
    }
}
