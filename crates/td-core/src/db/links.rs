//! Dependency edges and file links.
//!
//! Both tables are keyed by a composite id of their natural key, so a journal
//! row keeps addressing the same edge after it has been removed and re-added
//! on another machine.

use super::action_log::journal_if;
use super::{Database, Journal, text_col, ts_col, ts_text};
use crate::error::{Error, Result};
use crate::ids::{self, DEFAULT_RELATION, normalize_file_path_for_id, normalize_issue_id};
use crate::model::{ActionType, Dependency, EntityType, FileRole, IssueFile};
use crate::timestamp;
use rusqlite::{Connection, OptionalExtension, Row, params};

const DEPENDENCY_COLUMNS: &str = "id, issue_id, depends_on_id, relation_type";
const FILE_COLUMNS: &str = "id, issue_id, file_path, role, linked_sha, linked_at";

fn dependency_from_row(row: &Row<'_>) -> rusqlite::Result<Dependency> {
    Ok(Dependency {
        id: row.get(0)?,
        issue_id: row.get(1)?,
        depends_on_id: row.get(2)?,
        relation_type: row.get(3)?,
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<IssueFile> {
    Ok(IssueFile {
        id: row.get(0)?,
        issue_id: row.get(1)?,
        file_path: row.get(2)?,
        role: row.get(3)?,
        linked_sha: text_col(row, 4)?,
        linked_at: ts_col(row, 5)?,
    })
}

fn relation_or_default(relation: &str) -> &str {
    let relation = relation.trim();
    if relation.is_empty() {
        DEFAULT_RELATION
    } else {
        relation
    }
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

pub(crate) fn add_dependency_in(
    conn: &Connection,
    issue_id: &str,
    depends_on_id: &str,
    relation: &str,
    journal: Option<Journal<'_>>,
) -> Result<Dependency> {
    let issue_id = normalize_issue_id(issue_id);
    let depends_on_id = normalize_issue_id(depends_on_id);
    if issue_id.is_empty() || depends_on_id.is_empty() {
        return Err(Error::invalid("dependency needs both issue ids"));
    }
    if issue_id == depends_on_id {
        return Err(Error::invalid(format!("{issue_id} cannot depend on itself")));
    }

    let dependency = Dependency {
        id: ids::dependency_id(&issue_id, &depends_on_id, relation),
        relation_type: relation_or_default(relation).to_string(),
        issue_id,
        depends_on_id,
    };
    conn.execute(
        &format!("INSERT OR IGNORE INTO issue_dependencies ({DEPENDENCY_COLUMNS}) VALUES (?1, ?2, ?3, ?4)"),
        params![
            dependency.id,
            dependency.issue_id,
            dependency.depends_on_id,
            dependency.relation_type
        ],
    )?;
    journal_if(
        conn,
        journal,
        EntityType::Dependency,
        &dependency.id,
        "",
        &serde_json::to_string(&dependency)?,
    )?;
    Ok(dependency)
}

pub(crate) fn remove_dependency_in(
    conn: &Connection,
    issue_id: &str,
    depends_on_id: &str,
    relation: &str,
    journal: Option<Journal<'_>>,
) -> Result<bool> {
    let id = ids::dependency_id(issue_id, depends_on_id, relation);
    remove_dependency_by_id(conn, &id, journal)
}

pub(crate) fn remove_dependency_by_id(
    conn: &Connection,
    id: &str,
    journal: Option<Journal<'_>>,
) -> Result<bool> {
    let existing = conn
        .query_row(
            &format!("SELECT {DEPENDENCY_COLUMNS} FROM issue_dependencies WHERE id = ?1"),
            [id],
            dependency_from_row,
        )
        .optional()?;
    let Some(existing) = existing else {
        return Ok(false);
    };
    conn.execute("DELETE FROM issue_dependencies WHERE id = ?1", [id])?;
    journal_if(
        conn,
        journal,
        EntityType::Dependency,
        id,
        &serde_json::to_string(&existing)?,
        "",
    )?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// File links
// ---------------------------------------------------------------------------

pub(crate) fn link_file_in(
    conn: &Connection,
    issue_id: &str,
    file_path: &str,
    role: FileRole,
    linked_sha: &str,
    journal: Option<Journal<'_>>,
) -> Result<IssueFile> {
    let issue_id = normalize_issue_id(issue_id);
    let file_path = normalize_file_path_for_id(file_path);
    let id = ids::issue_file_id(&issue_id, &file_path);
    let previous = conn
        .query_row(
            &format!("SELECT {FILE_COLUMNS} FROM issue_files WHERE id = ?1"),
            [&id],
            file_from_row,
        )
        .optional()?;

    conn.execute(
        &format!(
            "INSERT INTO issue_files ({FILE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(id) DO UPDATE SET role = excluded.role, \
             linked_sha = excluded.linked_sha, linked_at = excluded.linked_at"
        ),
        params![
            id,
            issue_id,
            file_path,
            role,
            linked_sha,
            ts_text(&timestamp::now())
        ],
    )?;
    let stored = conn.query_row(
        &format!("SELECT {FILE_COLUMNS} FROM issue_files WHERE id = ?1"),
        [&id],
        file_from_row,
    )?;

    let previous_data = previous
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?
        .unwrap_or_default();
    journal_if(
        conn,
        journal,
        EntityType::FileLink,
        &id,
        &previous_data,
        &serde_json::to_string(&stored)?,
    )?;
    Ok(stored)
}

pub(crate) fn unlink_file_by_id(
    conn: &Connection,
    id: &str,
    journal: Option<Journal<'_>>,
) -> Result<bool> {
    let existing = conn
        .query_row(
            &format!("SELECT {FILE_COLUMNS} FROM issue_files WHERE id = ?1"),
            [id],
            file_from_row,
        )
        .optional()?;
    let Some(existing) = existing else {
        return Ok(false);
    };
    conn.execute("DELETE FROM issue_files WHERE id = ?1", [id])?;
    journal_if(
        conn,
        journal,
        EntityType::FileLink,
        id,
        &serde_json::to_string(&existing)?,
        "",
    )?;
    Ok(true)
}

/// Write a file link exactly as given, keyed by its composite id.
pub(crate) fn upsert_file_link_in(conn: &Connection, link: &IssueFile) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO issue_files ({FILE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(id) DO UPDATE SET role = excluded.role, \
             linked_sha = excluded.linked_sha, linked_at = excluded.linked_at"
        ),
        params![
            link.id,
            link.issue_id,
            link.file_path,
            link.role,
            link.linked_sha,
            ts_text(&link.linked_at)
        ],
    )?;
    Ok(())
}

impl Database {
    /// Record that `issue_id` depends on `depends_on_id`. Adding an existing
    /// edge is a no-op write that returns the edge.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for blank or self-referencing ids.
    pub fn add_dependency(
        &self,
        issue_id: &str,
        depends_on_id: &str,
        relation: &str,
    ) -> Result<Dependency> {
        self.mutate(|conn| add_dependency_in(conn, issue_id, depends_on_id, relation, None))
    }

    /// Add a dependency and journal `add_dependency`.
    ///
    /// # Errors
    ///
    /// See [`Database::add_dependency`].
    pub fn add_dependency_logged(
        &self,
        issue_id: &str,
        depends_on_id: &str,
        relation: &str,
        session_id: &str,
    ) -> Result<Dependency> {
        self.mutate(|conn| {
            add_dependency_in(
                conn,
                issue_id,
                depends_on_id,
                relation,
                Some(Journal::new(session_id, ActionType::AddDependency)),
            )
        })
    }

    /// Remove an edge. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or delete fails.
    pub fn remove_dependency(
        &self,
        issue_id: &str,
        depends_on_id: &str,
        relation: &str,
    ) -> Result<bool> {
        self.mutate(|conn| remove_dependency_in(conn, issue_id, depends_on_id, relation, None))
    }

    /// Remove an edge and journal `remove_dependency` when it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or delete fails.
    pub fn remove_dependency_logged(
        &self,
        issue_id: &str,
        depends_on_id: &str,
        relation: &str,
        session_id: &str,
    ) -> Result<bool> {
        self.mutate(|conn| {
            remove_dependency_in(
                conn,
                issue_id,
                depends_on_id,
                relation,
                Some(Journal::new(session_id, ActionType::RemoveDependency)),
            )
        })
    }

    /// Edges out of `issue_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_dependencies(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        self.dependency_query("issue_id", issue_id)
    }

    /// Edges into `issue_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_dependents(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        self.dependency_query("depends_on_id", issue_id)
    }

    fn dependency_query(&self, column: &str, issue_id: &str) -> Result<Vec<Dependency>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {DEPENDENCY_COLUMNS} FROM issue_dependencies WHERE {column} = ?1 \
             ORDER BY issue_id, depends_on_id, relation_type"
        ))?;
        let rows = stmt.query_map([normalize_issue_id(issue_id)], dependency_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Link a file to an issue. Relinking updates role, sha, and time.
    ///
    /// `file_path` should already be repo-relative (see
    /// [`crate::ids::to_repo_relative`]); it is normalized to `/` separators.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or write fails.
    pub fn link_file(
        &self,
        issue_id: &str,
        file_path: &str,
        role: FileRole,
        linked_sha: &str,
    ) -> Result<IssueFile> {
        self.mutate(|conn| link_file_in(conn, issue_id, file_path, role, linked_sha, None))
    }

    /// Link a file and journal `link_file`.
    ///
    /// # Errors
    ///
    /// See [`Database::link_file`].
    pub fn link_file_logged(
        &self,
        issue_id: &str,
        file_path: &str,
        role: FileRole,
        linked_sha: &str,
        session_id: &str,
    ) -> Result<IssueFile> {
        self.mutate(|conn| {
            link_file_in(
                conn,
                issue_id,
                file_path,
                role,
                linked_sha,
                Some(Journal::new(session_id, ActionType::LinkFile)),
            )
        })
    }

    /// Remove a file link. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or delete fails.
    pub fn unlink_file(&self, issue_id: &str, file_path: &str) -> Result<bool> {
        let id = ids::issue_file_id(issue_id, file_path);
        self.mutate(|conn| unlink_file_by_id(conn, &id, None))
    }

    /// Remove a file link and journal `unlink_file` when it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or delete fails.
    pub fn unlink_file_logged(
        &self,
        issue_id: &str,
        file_path: &str,
        session_id: &str,
    ) -> Result<bool> {
        let id = ids::issue_file_id(issue_id, file_path);
        self.mutate(|conn| {
            unlink_file_by_id(
                conn,
                &id,
                Some(Journal::new(session_id, ActionType::UnlinkFile)),
            )
        })
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_linked_files(&self, issue_id: &str) -> Result<Vec<IssueFile>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM issue_files WHERE issue_id = ?1 ORDER BY role, file_path"
        ))?;
        let rows = stmt.query_map([normalize_issue_id(issue_id)], file_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::temp_db;
    use crate::ids;
    use crate::model::{ActionType, Dependency, EntityType, FileRole};

    #[test]
    fn dependency_ids_are_composite() {
        let (_dir, db) = temp_db();
        let dep = db.add_dependency("td-a", "b", "").unwrap();
        assert_eq!(dep.depends_on_id, "td-b");
        assert_eq!(dep.relation_type, "depends_on");
        assert_eq!(dep.id, ids::dependency_id("td-a", "td-b", "depends_on"));

        // Adding again keeps a single row.
        db.add_dependency("td-a", "td-b", "depends_on").unwrap();
        assert_eq!(db.get_dependencies("td-a").unwrap().len(), 1);
        assert_eq!(db.get_dependents("td-b").unwrap(), vec![dep]);
    }

    #[test]
    fn self_dependency_rejected() {
        let (_dir, db) = temp_db();
        let err = db.add_dependency("td-a", "td-a", "").unwrap_err();
        assert!(err.to_string().contains("cannot depend on itself"));
    }

    #[test]
    fn logged_dependency_round_trip() {
        let (_dir, db) = temp_db();
        let dep = db
            .add_dependency_logged("td-a", "td-b", "", "s1")
            .unwrap();
        assert!(
            db.remove_dependency_logged("td-a", "td-b", "", "s1")
                .unwrap()
        );
        assert!(
            !db.remove_dependency_logged("td-a", "td-b", "", "s1")
                .unwrap()
        );

        let actions = db.get_actions_for_entity(&dep.id).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action_type, ActionType::AddDependency);
        assert_eq!(actions[0].entity_type, EntityType::Dependency);
        assert!(actions[0].previous_data.is_empty());
        let added: Dependency = actions[0].new_image().unwrap().unwrap();
        assert_eq!(added.id, dep.id);
        assert_eq!(actions[1].action_type, ActionType::RemoveDependency);
        assert!(actions[1].new_data.is_empty());
    }

    #[test]
    fn file_links_normalize_paths() {
        let (_dir, db) = temp_db();
        let linked = db
            .link_file("td-a", "src\\lib.rs", FileRole::Implementation, "abc")
            .unwrap();
        assert_eq!(linked.file_path, "src/lib.rs");
        assert_eq!(linked.id, ids::issue_file_id("td-a", "src/lib.rs"));

        let relinked = db
            .link_file("td-a", "src/./lib.rs", FileRole::Test, "def")
            .unwrap();
        assert_eq!(relinked.id, linked.id);
        assert_eq!(relinked.role, FileRole::Test);
        assert_eq!(db.get_linked_files("td-a").unwrap().len(), 1);

        assert!(db.unlink_file("td-a", "src/x/../lib.rs").unwrap());
        assert!(db.get_linked_files("td-a").unwrap().is_empty());
    }

    #[test]
    fn unlogged_links_are_silent() {
        let (_dir, db) = temp_db();
        db.add_dependency("td-a", "td-b", "").unwrap();
        db.remove_dependency("td-a", "td-b", "").unwrap();
        db.link_file("td-a", "a.rs", FileRole::Test, "").unwrap();
        db.unlink_file("td-a", "a.rs").unwrap();
        assert_eq!(db.count_pending_events().unwrap(), 0);
    }
}
