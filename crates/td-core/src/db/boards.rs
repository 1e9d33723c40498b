//! Boards and their explicit issue ordering.
//!
//! Positions on a board always form a dense run `0..n`. Inserting at `p`
//! moves every row at `p` or later up by one; removing closes the gap. The
//! `(board_id, position)` UNIQUE constraint is checked per row during an
//! `UPDATE`, so every shift first parks the affected rows above
//! [`PARK_OFFSET`] and then brings them down to their final slot.

use super::action_log::journal_if;
use super::{Database, Journal, insert_with_fresh_id, opt_ts_col, opt_ts_text, ts_col, ts_text};
use crate::error::{Error, Result};
use crate::ids::{board_issue_pos_id, generate_board_id, normalize_issue_id};
use crate::model::{ActionType, Board, BoardIssuePosition, EntityType, ViewMode};
use crate::timestamp;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::sync::{PoisonError, RwLock};

const BOARD_COLUMNS: &str =
    "id, name, query, is_builtin, view_mode, last_viewed_at, created_at, updated_at";
const POSITION_COLUMNS: &str = "id, board_id, issue_id, position, added_at";

/// Positions are assumed to stay below this while a shift is in flight.
const PARK_OFFSET: i64 = 1_000_000;

type QueryValidator = Box<dyn Fn(&str) -> std::result::Result<(), String> + Send + Sync>;

static QUERY_VALIDATOR: RwLock<Option<QueryValidator>> = RwLock::new(None);

/// Install the process-wide board query validator. Replaces any previous one.
pub fn set_query_validator<F>(validator: F)
where
    F: Fn(&str) -> std::result::Result<(), String> + Send + Sync + 'static,
{
    let mut slot = QUERY_VALIDATOR
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    *slot = Some(Box::new(validator));
}

/// Check a board query. An empty query means "every issue" and always
/// passes; anything else passes when no validator is installed.
///
/// # Errors
///
/// [`Error::InvalidInput`] carrying the validator's message.
pub fn validate_board_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Ok(());
    }
    let slot = QUERY_VALIDATOR
        .read()
        .unwrap_or_else(PoisonError::into_inner);
    match slot.as_ref() {
        Some(validator) => {
            validator(query).map_err(|message| Error::invalid(format!("board query: {message}")))
        }
        None => Ok(()),
    }
}

fn board_from_row(row: &Row<'_>) -> rusqlite::Result<Board> {
    Ok(Board {
        id: row.get(0)?,
        name: row.get(1)?,
        query: super::text_col(row, 2)?,
        is_builtin: row.get::<_, i64>(3)? != 0,
        view_mode: row.get(4)?,
        last_viewed_at: opt_ts_col(row, 5)?,
        created_at: ts_col(row, 6)?,
        updated_at: ts_col(row, 7)?,
    })
}

fn position_from_row(row: &Row<'_>) -> rusqlite::Result<BoardIssuePosition> {
    Ok(BoardIssuePosition {
        id: row.get(0)?,
        board_id: row.get(1)?,
        issue_id: row.get(2)?,
        position: row.get(3)?,
        added_at: ts_col(row, 4)?,
    })
}

fn load_board(conn: &Connection, id: &str) -> Result<Option<Board>> {
    Ok(conn
        .query_row(
            &format!("SELECT {BOARD_COLUMNS} FROM boards WHERE id = ?1"),
            [id],
            board_from_row,
        )
        .optional()?)
}

fn require_board(conn: &Connection, id: &str) -> Result<Board> {
    load_board(conn, id)?.ok_or_else(|| Error::not_found("board", id))
}

fn board_by_name(conn: &Connection, name: &str) -> Result<Option<Board>> {
    Ok(conn
        .query_row(
            &format!("SELECT {BOARD_COLUMNS} FROM boards WHERE name = ?1 COLLATE NOCASE"),
            [name.trim()],
            board_from_row,
        )
        .optional()?)
}

fn ensure_name_free(conn: &Connection, name: &str, except_id: Option<&str>) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid("board name cannot be empty"));
    }
    match board_by_name(conn, name)? {
        Some(other) if Some(other.id.as_str()) != except_id => Err(Error::invalid(format!(
            "board name already in use: {}",
            other.name
        ))),
        _ => Ok(()),
    }
}

fn load_position(
    conn: &Connection,
    board_id: &str,
    issue_id: &str,
) -> Result<Option<BoardIssuePosition>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {POSITION_COLUMNS} FROM board_issue_positions \
                 WHERE board_id = ?1 AND issue_id = ?2"
            ),
            params![board_id, issue_id],
            position_from_row,
        )
        .optional()?)
}

/// Move every row at `from` or later by `delta`, in two passes.
fn shift_positions(conn: &Connection, board_id: &str, from: i64, delta: i64) -> Result<()> {
    conn.execute(
        "UPDATE board_issue_positions SET position = position + ?3 \
         WHERE board_id = ?1 AND position >= ?2",
        params![board_id, from, PARK_OFFSET],
    )?;
    conn.execute(
        "UPDATE board_issue_positions SET position = position - ?2 + ?3 \
         WHERE board_id = ?1 AND position >= ?2",
        params![board_id, PARK_OFFSET, delta],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared write routines
// ---------------------------------------------------------------------------

fn create_board_in(
    conn: &Connection,
    name: &str,
    query: &str,
    view_mode: ViewMode,
    journal: Option<Journal<'_>>,
) -> Result<Board> {
    let name = name.trim();
    ensure_name_free(conn, name, None)?;
    validate_board_query(query)?;

    let now = ts_text(&timestamp::now());
    let id = insert_with_fresh_id("board", generate_board_id, |id| {
        conn.execute(
            &format!(
                "INSERT INTO boards ({BOARD_COLUMNS}) VALUES (?1, ?2, ?3, 0, ?4, NULL, ?5, ?5)"
            ),
            params![id, name, query, view_mode, now],
        )
        .map(|_| ())
    })?;

    let stored = require_board(conn, &id)?;
    journal_if(
        conn,
        journal,
        EntityType::Board,
        &id,
        "",
        &serde_json::to_string(&stored)?,
    )?;
    Ok(stored)
}

fn update_board_in(conn: &Connection, board: &Board, journal: Option<Journal<'_>>) -> Result<Board> {
    let previous = require_board(conn, &board.id)?;
    if previous.is_builtin {
        return Err(Error::Immutable {
            entity: "board",
            id: previous.id,
        });
    }
    ensure_name_free(conn, &board.name, Some(&board.id))?;
    validate_board_query(&board.query)?;

    conn.execute(
        "UPDATE boards SET name = ?2, query = ?3, view_mode = ?4, updated_at = ?5 WHERE id = ?1",
        params![
            board.id,
            board.name.trim(),
            board.query,
            board.view_mode,
            ts_text(&timestamp::now())
        ],
    )?;
    let stored = require_board(conn, &board.id)?;
    journal_if(
        conn,
        journal,
        EntityType::Board,
        &board.id,
        &serde_json::to_string(&previous)?,
        &serde_json::to_string(&stored)?,
    )?;
    Ok(stored)
}

fn delete_board_in(conn: &Connection, id: &str, journal: Option<Journal<'_>>) -> Result<()> {
    let previous = require_board(conn, id)?;
    if previous.is_builtin {
        return Err(Error::Immutable {
            entity: "board",
            id: previous.id,
        });
    }
    delete_board_rows(conn, id)?;
    journal_if(
        conn,
        journal,
        EntityType::Board,
        id,
        &serde_json::to_string(&previous)?,
        "",
    )
}

pub(crate) fn delete_board_rows(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM board_issue_positions WHERE board_id = ?1", [id])?;
    conn.execute("DELETE FROM boards WHERE id = ?1 AND is_builtin = 0", [id])?;
    Ok(())
}

/// Write a board exactly as given. Builtin rows are left alone.
pub(crate) fn upsert_board_in(conn: &Connection, board: &Board) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO boards ({BOARD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, query = excluded.query, \
             view_mode = excluded.view_mode, last_viewed_at = excluded.last_viewed_at, \
             updated_at = excluded.updated_at WHERE boards.is_builtin = 0"
        ),
        params![
            board.id,
            board.name,
            board.query,
            board.is_builtin,
            board.view_mode,
            opt_ts_text(board.last_viewed_at.as_ref()),
            ts_text(&board.created_at),
            ts_text(&board.updated_at),
        ],
    )?;
    Ok(())
}

pub(crate) fn set_issue_position_in(
    conn: &Connection,
    board_id: &str,
    issue_id: &str,
    position: i64,
    journal: Option<Journal<'_>>,
) -> Result<BoardIssuePosition> {
    if position < 0 {
        return Err(Error::invalid(format!("position must be >= 0, got {position}")));
    }
    require_board(conn, board_id)?;
    let issue_id = normalize_issue_id(issue_id);
    let previous = load_position(conn, board_id, &issue_id)?;

    if let Some(old) = &previous {
        conn.execute("DELETE FROM board_issue_positions WHERE id = ?1", [&old.id])?;
        shift_positions(conn, board_id, old.position + 1, -1)?;
    }

    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM board_issue_positions WHERE board_id = ?1",
        [board_id],
        |row| row.get(0),
    )?;
    let position = position.min(count);
    shift_positions(conn, board_id, position, 1)?;

    let stored = BoardIssuePosition {
        id: board_issue_pos_id(board_id, &issue_id),
        board_id: board_id.to_string(),
        issue_id,
        position,
        added_at: previous
            .as_ref()
            .map_or_else(timestamp::now, |old| old.added_at),
    };
    conn.execute(
        &format!("INSERT INTO board_issue_positions ({POSITION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
        params![
            stored.id,
            stored.board_id,
            stored.issue_id,
            stored.position,
            ts_text(&stored.added_at)
        ],
    )?;

    let previous_data = previous
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?
        .unwrap_or_default();
    journal_if(
        conn,
        journal,
        EntityType::BoardPosition,
        &stored.id,
        &previous_data,
        &serde_json::to_string(&stored)?,
    )?;
    Ok(stored)
}

pub(crate) fn remove_issue_position_in(
    conn: &Connection,
    board_id: &str,
    issue_id: &str,
    journal: Option<Journal<'_>>,
) -> Result<bool> {
    let issue_id = normalize_issue_id(issue_id);
    let Some(existing) = load_position(conn, board_id, &issue_id)? else {
        return Ok(false);
    };
    conn.execute("DELETE FROM board_issue_positions WHERE id = ?1", [&existing.id])?;
    shift_positions(conn, board_id, existing.position + 1, -1)?;
    journal_if(
        conn,
        journal,
        EntityType::BoardPosition,
        &existing.id,
        &serde_json::to_string(&existing)?,
        "",
    )?;
    Ok(true)
}

fn swap_issue_positions_in(
    conn: &Connection,
    board_id: &str,
    first: &str,
    second: &str,
    journal: Option<Journal<'_>>,
) -> Result<()> {
    let first = normalize_issue_id(first);
    let second = normalize_issue_id(second);
    let a = load_position(conn, board_id, &first)?
        .ok_or_else(|| Error::not_found("board position", &first))?;
    let b = load_position(conn, board_id, &second)?
        .ok_or_else(|| Error::not_found("board position", &second))?;
    if a.id == b.id {
        return Ok(());
    }
    let set = "UPDATE board_issue_positions SET position = ?2 WHERE id = ?1";
    conn.execute(set, params![a.id, -1])?;
    conn.execute(set, params![b.id, a.position])?;
    conn.execute(set, params![a.id, b.position])?;

    for old in [&a, &b] {
        let stored = load_position(conn, board_id, &old.issue_id)?
            .ok_or_else(|| Error::not_found("board position", &old.issue_id))?;
        journal_if(
            conn,
            journal,
            EntityType::BoardPosition,
            &stored.id,
            &serde_json::to_string(old)?,
            &serde_json::to_string(&stored)?,
        )?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl Database {
    /// Create a board with a fresh `bd-` id.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for an empty or taken name, or a query the
    /// installed validator rejects.
    pub fn create_board(&self, name: &str, query: &str, view_mode: ViewMode) -> Result<Board> {
        self.mutate(|conn| create_board_in(conn, name, query, view_mode, None))
    }

    /// Create a board and journal `create`.
    ///
    /// # Errors
    ///
    /// See [`Database::create_board`].
    pub fn create_board_logged(
        &self,
        name: &str,
        query: &str,
        view_mode: ViewMode,
        session_id: &str,
    ) -> Result<Board> {
        self.mutate(|conn| {
            create_board_in(
                conn,
                name,
                query,
                view_mode,
                Some(Journal::new(session_id, ActionType::Create)),
            )
        })
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn get_board(&self, id: &str) -> Result<Board> {
        require_board(self.conn(), id)
    }

    /// Case-insensitive name lookup.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no board has that name.
    pub fn get_board_by_name(&self, name: &str) -> Result<Board> {
        board_by_name(self.conn(), name)?.ok_or_else(|| Error::not_found("board", name.trim()))
    }

    /// Resolve a user-supplied reference: an exact id first, then a name.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when neither matches.
    pub fn resolve_board_ref(&self, reference: &str) -> Result<Board> {
        let reference = reference.trim();
        if let Some(board) = load_board(self.conn(), reference)? {
            return Ok(board);
        }
        self.get_board_by_name(reference)
    }

    /// Recently viewed first; never-viewed boards last, by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_boards(&self) -> Result<Vec<Board>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {BOARD_COLUMNS} FROM boards \
             ORDER BY last_viewed_at IS NULL, last_viewed_at DESC, name COLLATE NOCASE"
        ))?;
        let rows = stmt.query_map([], board_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Save name, query, and view mode.
    ///
    /// # Errors
    ///
    /// [`Error::Immutable`] for builtin boards, [`Error::NotFound`] for
    /// unknown ids, [`Error::InvalidInput`] as for create.
    pub fn update_board(&self, board: &Board) -> Result<Board> {
        self.mutate(|conn| update_board_in(conn, board, None))
    }

    /// Update and journal `update`.
    ///
    /// # Errors
    ///
    /// See [`Database::update_board`]. Nothing is journaled on failure.
    pub fn update_board_logged(&self, board: &Board, session_id: &str) -> Result<Board> {
        self.mutate(|conn| {
            update_board_in(conn, board, Some(Journal::new(session_id, ActionType::Update)))
        })
    }

    /// Delete a board and its positions.
    ///
    /// # Errors
    ///
    /// [`Error::Immutable`] for builtin boards, [`Error::NotFound`] for
    /// unknown ids.
    pub fn delete_board(&self, id: &str) -> Result<()> {
        self.mutate(|conn| delete_board_in(conn, id, None))
    }

    /// Delete and journal `delete` with an empty `new_data`.
    ///
    /// # Errors
    ///
    /// See [`Database::delete_board`].
    pub fn delete_board_logged(&self, id: &str, session_id: &str) -> Result<()> {
        self.mutate(|conn| {
            delete_board_in(conn, id, Some(Journal::new(session_id, ActionType::Delete)))
        })
    }

    /// Stamp `last_viewed_at`. Allowed on builtin boards; never journaled.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn update_board_last_viewed(&self, id: &str) -> Result<()> {
        self.mutate(|conn| {
            let changed = conn.execute(
                "UPDATE boards SET last_viewed_at = ?2 WHERE id = ?1",
                params![id, ts_text(&timestamp::now())],
            )?;
            if changed == 0 {
                return Err(Error::not_found("board", id));
            }
            Ok(())
        })
    }

    /// Place `issue_id` at `position`, moving later rows down one slot.
    /// An issue already on the board is moved; a position past the end
    /// appends.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for a negative position, [`Error::NotFound`]
    /// for an unknown board.
    pub fn set_issue_position(
        &self,
        board_id: &str,
        issue_id: &str,
        position: i64,
    ) -> Result<BoardIssuePosition> {
        self.mutate(|conn| set_issue_position_in(conn, board_id, issue_id, position, None))
    }

    /// Position and journal `board_set_position`.
    ///
    /// # Errors
    ///
    /// See [`Database::set_issue_position`].
    pub fn set_issue_position_logged(
        &self,
        board_id: &str,
        issue_id: &str,
        position: i64,
        session_id: &str,
    ) -> Result<BoardIssuePosition> {
        self.mutate(|conn| {
            set_issue_position_in(
                conn,
                board_id,
                issue_id,
                position,
                Some(Journal::new(session_id, ActionType::BoardSetPosition)),
            )
        })
    }

    /// Drop an issue's explicit slot. Returns whether it had one.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or write fails.
    pub fn remove_issue_position(&self, board_id: &str, issue_id: &str) -> Result<bool> {
        self.mutate(|conn| remove_issue_position_in(conn, board_id, issue_id, None))
    }

    /// Remove and journal `board_unposition` when a slot existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock or write fails.
    pub fn remove_issue_position_logged(
        &self,
        board_id: &str,
        issue_id: &str,
        session_id: &str,
    ) -> Result<bool> {
        self.mutate(|conn| {
            remove_issue_position_in(
                conn,
                board_id,
                issue_id,
                Some(Journal::new(session_id, ActionType::BoardUnposition)),
            )
        })
    }

    /// Exchange the slots of two positioned issues.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when either issue has no slot on the board.
    pub fn swap_issue_positions(&self, board_id: &str, first: &str, second: &str) -> Result<()> {
        self.mutate(|conn| swap_issue_positions_in(conn, board_id, first, second, None))
    }

    /// Swap two slots and journal both rows as `board_set_position`, first
    /// the row taking the second slot, then the other.
    ///
    /// # Errors
    ///
    /// See [`Database::swap_issue_positions`].
    pub fn swap_issue_positions_logged(
        &self,
        board_id: &str,
        first: &str,
        second: &str,
        session_id: &str,
    ) -> Result<()> {
        self.mutate(|conn| {
            swap_issue_positions_in(
                conn,
                board_id,
                first,
                second,
                Some(Journal::new(session_id, ActionType::BoardSetPosition)),
            )
        })
    }

    /// Slots of a board in position order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_board_issue_positions(&self, board_id: &str) -> Result<Vec<BoardIssuePosition>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {POSITION_COLUMNS} FROM board_issue_positions \
             WHERE board_id = ?1 ORDER BY position"
        ))?;
        let rows = stmt.query_map([board_id], position_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}
