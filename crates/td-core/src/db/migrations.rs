//! Versioned migrations on top of the base schema.
//!
//! The current version lives in `schema_info(key = 'version')`; a missing row
//! means version 0. Each migration runs in its own IMMEDIATE transaction and
//! records its version before committing, so an interrupted chain resumes at
//! the first unapplied step.
//!
//! Column additions probe `PRAGMA table_info` first. A database whose schema
//! was patched by hand therefore only gets its version bumped.

use super::schema;
use crate::error::Result;
use crate::ids;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use tracing::{debug, info};

/// One unit of work inside a migration.
pub enum Step {
    Sql(&'static str),
    AddColumn {
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    },
    Rust(fn(&Connection) -> rusqlite::Result<()>),
}

pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub steps: &'static [Step],
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 2,
        description: "action log",
        steps: &[Step::Sql(schema::MIGRATION_V2_ACTION_LOG_SQL)],
    },
    Migration {
        version: 3,
        description: "issue session history",
        steps: &[Step::Sql(schema::MIGRATION_V3_SESSION_HISTORY_SQL)],
    },
    Migration {
        version: 4,
        description: "minor flag",
        steps: &[Step::AddColumn {
            table: "issues",
            column: "minor",
            definition: "INTEGER NOT NULL DEFAULT 0",
        }],
    },
    Migration {
        version: 5,
        description: "created branch",
        steps: &[Step::AddColumn {
            table: "issues",
            column: "created_branch",
            definition: "TEXT NOT NULL DEFAULT ''",
        }],
    },
    Migration {
        version: 6,
        description: "creator session",
        steps: &[Step::AddColumn {
            table: "issues",
            column: "creator_session",
            definition: "TEXT",
        }],
    },
    Migration {
        version: 7,
        description: "boards",
        steps: &[Step::Sql(schema::MIGRATION_V7_BOARDS_SQL)],
    },
    Migration {
        version: 8,
        description: "sessions",
        steps: &[Step::Sql(schema::MIGRATION_V8_SESSIONS_SQL)],
    },
    Migration {
        version: 9,
        description: "defer and due dates",
        steps: &[
            Step::AddColumn {
                table: "issues",
                column: "defer_until",
                definition: "TEXT",
            },
            Step::AddColumn {
                table: "issues",
                column: "due_date",
                definition: "TEXT",
            },
            Step::AddColumn {
                table: "issues",
                column: "defer_count",
                definition: "INTEGER NOT NULL DEFAULT 0",
            },
        ],
    },
    Migration {
        version: 10,
        description: "sync state",
        steps: &[
            Step::Sql(schema::MIGRATION_V10_SYNC_SQL),
            Step::AddColumn {
                table: "action_log",
                column: "synced_at",
                definition: "TEXT",
            },
            Step::AddColumn {
                table: "action_log",
                column: "server_seq",
                definition: "INTEGER",
            },
        ],
    },
    Migration {
        version: 11,
        description: "indexes",
        steps: &[Step::Sql(schema::MIGRATION_V11_INDEXES_SQL)],
    },
    Migration {
        version: 12,
        description: "composite ids",
        steps: &[
            Step::Rust(rewrite_composite_ids),
            Step::Sql(schema::MIGRATION_V11_INDEXES_SQL),
        ],
    },
    Migration {
        version: 13,
        description: "notes",
        steps: &[Step::Sql(schema::MIGRATION_V13_NOTES_SQL)],
    },
    Migration {
        version: 14,
        description: "sprint",
        steps: &[Step::AddColumn {
            table: "issues",
            column: "sprint",
            definition: "TEXT NOT NULL DEFAULT ''",
        }],
    },
];

/// Read the recorded schema version; 0 when none is recorded.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn current_version(conn: &Connection) -> Result<u32> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_info WHERE key = 'version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0))
}

fn set_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO schema_info (key, value) VALUES ('version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [version.to_string()],
    )?;
    Ok(())
}

/// Whether `table` has a column named `column`.
///
/// # Errors
///
/// Returns an error if the pragma cannot be read.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for row in rows {
        if row?.eq_ignore_ascii_case(column) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Apply every migration newer than the recorded version. Returns how many
/// ran. The caller holds the write lock.
///
/// # Errors
///
/// Returns an error if any step fails; earlier migrations stay committed.
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    let mut current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }

        debug!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        for step in migration.steps {
            apply_step(&tx, step)?;
        }
        set_version(&tx, migration.version)?;
        tx.commit()?;

        current = migration.version;
        applied += 1;
    }

    if applied > 0 {
        info!(applied, version = current, "schema migrated");
    }
    Ok(applied)
}

fn apply_step(conn: &Connection, step: &Step) -> rusqlite::Result<()> {
    match step {
        Step::Sql(sql) => conn.execute_batch(sql),
        Step::AddColumn {
            table,
            column,
            definition,
        } => {
            if column_exists(conn, table, column)? {
                debug!(table, column, "column already present, skipping");
                return Ok(());
            }
            conn.execute_batch(&format!(
                "ALTER TABLE {table} ADD COLUMN {column} {definition}"
            ))
        }
        Step::Rust(run) => run(conn),
    }
}

// ---------------------------------------------------------------------------
// Version 12: composite ids
// ---------------------------------------------------------------------------

/// Re-key dependencies, file links, and board positions by the hash of their
/// natural key, then point matching journal rows at the new ids. Older
/// journals stored the natural key joined with `:` as `entity_id`.
fn rewrite_composite_ids(conn: &Connection) -> rusqlite::Result<()> {
    rekey_table(
        conn,
        "issue_dependencies",
        schema::COMPOSITE_DEPENDENCIES_SQL,
        "SELECT issue_id, depends_on_id, relation_type FROM issue_dependencies",
        |row| {
            let issue: String = row.get(0)?;
            let depends_on: String = row.get(1)?;
            let relation: String = row.get::<_, Option<String>>(2)?.unwrap_or_default();
            let relation = if relation.is_empty() {
                ids::DEFAULT_RELATION.to_string()
            } else {
                relation
            };
            let issue = ids::normalize_issue_id(&issue);
            let depends_on = ids::normalize_issue_id(&depends_on);
            Ok(vec![
                ids::dependency_id(&issue, &depends_on, &relation),
                issue,
                depends_on,
                relation,
            ])
        },
        "INSERT OR IGNORE INTO issue_dependencies_next (id, issue_id, depends_on_id, relation_type)
         VALUES (?1, ?2, ?3, ?4)",
    )?;

    rekey_table(
        conn,
        "issue_files",
        schema::COMPOSITE_FILES_SQL,
        "SELECT issue_id, file_path, role, COALESCE(linked_sha, ''), linked_at FROM issue_files",
        |row| {
            let issue = ids::normalize_issue_id(&row.get::<_, String>(0)?);
            let path = ids::normalize_file_path_for_id(&row.get::<_, String>(1)?);
            Ok(vec![
                ids::issue_file_id(&issue, &path),
                issue,
                path,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ])
        },
        "INSERT OR IGNORE INTO issue_files_next (id, issue_id, file_path, role, linked_sha, linked_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;

    rekey_table(
        conn,
        "board_issue_positions",
        schema::COMPOSITE_POSITIONS_SQL,
        "SELECT board_id, issue_id, position, added_at FROM board_issue_positions",
        |row| {
            let board: String = row.get(0)?;
            let issue = ids::normalize_issue_id(&row.get::<_, String>(1)?);
            let position: i64 = row.get(2)?;
            Ok(vec![
                ids::board_issue_pos_id(&board, &issue),
                board,
                issue,
                position.to_string(),
                row.get(3)?,
            ])
        },
        "INSERT OR IGNORE INTO board_issue_positions_next (id, board_id, issue_id, position, added_at)
         VALUES (?1, ?2, ?3, CAST(?4 AS INTEGER), ?5)",
    )?;

    rewrite_journal_entity_ids(conn)
}

fn rekey_table(
    conn: &Connection,
    table: &str,
    create_next: &str,
    select: &str,
    map: impl Fn(&rusqlite::Row<'_>) -> rusqlite::Result<Vec<String>>,
    insert: &str,
) -> rusqlite::Result<()> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {table}_next"))?;
    conn.execute_batch(create_next)?;

    let rows = {
        let mut stmt = conn.prepare(select)?;
        let mapped = stmt.query_map([], |row| map(row))?;
        mapped.collect::<rusqlite::Result<Vec<_>>>()?
    };

    let mut insert = conn.prepare(insert)?;
    for values in &rows {
        insert.execute(rusqlite::params_from_iter(values.iter()))?;
    }
    drop(insert);

    conn.execute_batch(&format!(
        "DROP TABLE {table}; ALTER TABLE {table}_next RENAME TO {table};"
    ))?;
    debug!(table, rows = rows.len(), "rekeyed composite ids");
    Ok(())
}

fn rewrite_journal_entity_ids(conn: &Connection) -> rusqlite::Result<()> {
    let legacy: Vec<(i64, String, String)> = {
        let mut stmt = conn.prepare(
            "SELECT rowid, entity_type, entity_id FROM action_log
             WHERE entity_type IN ('dependency', 'file_link', 'board_position')
               AND instr(entity_id, ':') > 0",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut update = conn.prepare("UPDATE action_log SET entity_id = ?1 WHERE rowid = ?2")?;
    for (rowid, entity_type, entity_id) in legacy {
        if let Some(hashed) = legacy_entity_id(&entity_type, &entity_id) {
            update.execute(params![hashed, rowid])?;
        }
    }
    Ok(())
}

/// Map a colon-joined natural key to its composite id.
pub(crate) fn legacy_entity_id(entity_type: &str, entity_id: &str) -> Option<String> {
    match entity_type {
        "dependency" => {
            let mut parts = entity_id.splitn(3, ':');
            let issue = parts.next()?;
            let depends_on = parts.next()?;
            let relation = parts.next().unwrap_or(ids::DEFAULT_RELATION);
            Some(ids::dependency_id(issue, depends_on, relation))
        }
        "file_link" => {
            let (issue, path) = entity_id.split_once(':')?;
            Some(ids::issue_file_id(issue, path))
        }
        "board_position" => {
            let (board, issue) = entity_id.split_once(':')?;
            Some(ids::board_issue_pos_id(board, issue))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{MIGRATIONS, column_exists, current_version, legacy_entity_id, run_migrations};
    use crate::db::schema::{self, SCHEMA_VERSION};
    use crate::ids;
    use rusqlite::{Connection, params};

    fn base_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(schema::BASE_SCHEMA_SQL).unwrap();
        conn
    }

    fn object_exists(conn: &Connection, kind: &str, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2)",
            params![kind, name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn schema_version_matches_last_migration() {
        let last = MIGRATIONS.last().map(|m| m.version);
        assert_eq!(last, Some(SCHEMA_VERSION));
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
    }

    #[test]
    fn fresh_db_runs_whole_chain() {
        let conn = base_db();
        assert_eq!(current_version(&conn).unwrap(), 0);

        let applied = run_migrations(&conn).unwrap();
        assert_eq!(applied, MIGRATIONS.len());
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);

        for table in ["action_log", "boards", "sessions", "notes", "sync_state"] {
            assert!(object_exists(&conn, "table", table), "missing {table}");
        }
        for index in schema::REQUIRED_INDEXES {
            assert!(object_exists(&conn, "index", index), "missing {index}");
        }
        for column in ["minor", "created_branch", "sprint", "defer_count"] {
            assert!(column_exists(&conn, "issues", column).unwrap());
        }
    }

    #[test]
    fn second_run_is_noop() {
        let conn = base_db();
        run_migrations(&conn).unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 0);
    }

    #[test]
    fn builtin_board_inserted_once() {
        let conn = base_db();
        run_migrations(&conn).unwrap();
        conn.execute("DELETE FROM schema_info", []).unwrap();
        run_migrations(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM boards WHERE is_builtin = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn manual_column_is_tolerated() {
        let conn = base_db();
        conn.execute_batch("ALTER TABLE issues ADD COLUMN minor INTEGER NOT NULL DEFAULT 0")
            .unwrap();

        let applied = run_migrations(&conn).unwrap();
        assert_eq!(applied, MIGRATIONS.len());
        assert!(column_exists(&conn, "issues", "minor").unwrap());
    }

    #[test]
    fn composite_rewrite_rekeys_rows_and_journal() {
        let conn = base_db();
        // Stop just before version 12.
        for migration in MIGRATIONS.iter().filter(|m| m.version < 12) {
            for step in migration.steps {
                super::apply_step(&conn, step).unwrap();
            }
        }
        super::set_version(&conn, 11).unwrap();

        conn.execute(
            "INSERT INTO issue_dependencies (issue_id, depends_on_id, relation_type)
             VALUES ('td-a', 'td-b', 'depends_on')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO issue_files (issue_id, file_path, role, linked_at)
             VALUES ('td-a', 'src/./main.rs', 'implementation', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO action_log (id, action_type, entity_type, entity_id, timestamp)
             VALUES ('al-1', 'add_dependency', 'dependency', 'td-a:td-b', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        assert_eq!(run_migrations(&conn).unwrap(), 3);

        let dep_id: String = conn
            .query_row("SELECT id FROM issue_dependencies", [], |row| row.get(0))
            .unwrap();
        assert_eq!(dep_id, ids::dependency_id("td-a", "td-b", "depends_on"));

        let (file_id, path): (String, String) = conn
            .query_row("SELECT id, file_path FROM issue_files", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(path, "src/main.rs");
        assert_eq!(file_id, ids::issue_file_id("td-a", "src/main.rs"));

        let journal_id: String = conn
            .query_row("SELECT entity_id FROM action_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_id, dep_id);
        assert!(object_exists(&conn, "index", "idx_board_positions_board"));
    }

    #[test]
    fn legacy_ids_map_to_hashes() {
        assert_eq!(
            legacy_entity_id("board_position", "bd-1:td-2"),
            Some(ids::board_issue_pos_id("bd-1", "td-2"))
        );
        assert_eq!(
            legacy_entity_id("dependency", "td-a:td-b:blocks"),
            Some(ids::dependency_id("td-a", "td-b", "blocks"))
        );
        assert_eq!(legacy_entity_id("issue", "td-a:x"), None);
    }
}
