//! Free-standing notes. Every user-facing mutation is journaled; the
//! unlogged forms exist for replaying remote actions.

use super::action_log::journal_if;
use super::{Database, Journal, insert_with_fresh_id, opt_ts_col, opt_ts_text, ts_col, ts_text};
use crate::error::{Error, Result};
use crate::ids::generate_note_id;
use crate::model::{ActionType, EntityType, Note};
use crate::timestamp;
use rusqlite::{Connection, OptionalExtension, Row, params};

const NOTE_COLUMNS: &str = "id, title, content, pinned, created_at, updated_at, deleted_at";

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        title: row.get(1)?,
        content: super::text_col(row, 2)?,
        pinned: row.get::<_, i64>(3)? != 0,
        created_at: ts_col(row, 4)?,
        updated_at: ts_col(row, 5)?,
        deleted_at: opt_ts_col(row, 6)?,
    })
}

fn load_note(conn: &Connection, id: &str) -> Result<Option<Note>> {
    Ok(conn
        .query_row(
            &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
            [id],
            note_from_row,
        )
        .optional()?)
}

fn require_note(conn: &Connection, id: &str) -> Result<Note> {
    load_note(conn, id)?.ok_or_else(|| Error::not_found("note", id))
}

fn write_note_row(conn: &Connection, id: &str, note: &Note) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO notes ({NOTE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
        params![
            id,
            note.title,
            note.content,
            note.pinned,
            ts_text(&note.created_at),
            ts_text(&note.updated_at),
            opt_ts_text(note.deleted_at.as_ref()),
        ],
    )
    .map(|_| ())
}

fn create_note_in(conn: &Connection, draft: Note, journal: Option<Journal<'_>>) -> Result<Note> {
    let mut note = draft;
    if note.title.trim().is_empty() {
        return Err(Error::invalid("note title cannot be empty"));
    }
    let now = timestamp::now();
    note.created_at = now;
    note.updated_at = now;
    note.deleted_at = None;

    let id = if note.id.is_empty() {
        insert_with_fresh_id("note", generate_note_id, |id| write_note_row(conn, id, &note))?
    } else {
        write_note_row(conn, &note.id, &note)?;
        note.id.clone()
    };
    let stored = require_note(conn, &id)?;
    journal_if(
        conn,
        journal,
        EntityType::Note,
        &id,
        "",
        &serde_json::to_string(&stored)?,
    )?;
    Ok(stored)
}

fn update_note_in(conn: &Connection, note: &Note, journal: Option<Journal<'_>>) -> Result<Note> {
    let previous = require_note(conn, &note.id)?;
    conn.execute(
        "UPDATE notes SET title = ?2, content = ?3, pinned = ?4, updated_at = ?5 WHERE id = ?1",
        params![
            note.id,
            note.title,
            note.content,
            note.pinned,
            ts_text(&timestamp::now())
        ],
    )?;
    let stored = require_note(conn, &note.id)?;
    journal_if(
        conn,
        journal,
        EntityType::Note,
        &note.id,
        &serde_json::to_string(&previous)?,
        &serde_json::to_string(&stored)?,
    )?;
    Ok(stored)
}

fn delete_note_in(conn: &Connection, id: &str, journal: Option<Journal<'_>>) -> Result<()> {
    let previous = require_note(conn, id)?;
    let now = ts_text(&timestamp::now());
    conn.execute(
        "UPDATE notes SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1",
        params![id, now],
    )?;
    journal_if(
        conn,
        journal,
        EntityType::Note,
        id,
        &serde_json::to_string(&previous)?,
        "",
    )
}

/// Write a note image exactly as given.
pub(crate) fn upsert_note_in(conn: &Connection, note: &Note) -> Result<()> {
    if note.id.is_empty() {
        return Err(Error::invalid("cannot upsert a note without an id"));
    }
    conn.execute(
        &format!(
            "INSERT INTO notes ({NOTE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(id) DO UPDATE SET title = excluded.title, content = excluded.content, \
             pinned = excluded.pinned, created_at = excluded.created_at, \
             updated_at = excluded.updated_at, deleted_at = excluded.deleted_at"
        ),
        params![
            note.id,
            note.title,
            note.content,
            note.pinned,
            ts_text(&note.created_at),
            ts_text(&note.updated_at),
            opt_ts_text(note.deleted_at.as_ref()),
        ],
    )?;
    Ok(())
}

/// Soft-delete without journaling; a missing note is not an error.
pub(crate) fn soft_delete_note_row(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE notes SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
        params![id, ts_text(&timestamp::now())],
    )?;
    Ok(())
}

impl Database {
    /// Insert a note without journaling. A blank id gets a fresh `nt-` id.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for an empty title.
    pub fn create_note(&self, draft: Note) -> Result<Note> {
        self.mutate(|conn| create_note_in(conn, draft, None))
    }

    /// Insert a note and journal `create`.
    ///
    /// # Errors
    ///
    /// See [`Database::create_note`].
    pub fn create_note_logged(&self, draft: Note, session_id: &str) -> Result<Note> {
        self.mutate(|conn| {
            create_note_in(conn, draft, Some(Journal::new(session_id, ActionType::Create)))
        })
    }

    /// Fetch a note, soft-deleted or not.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn get_note(&self, id: &str) -> Result<Note> {
        require_note(self.conn(), id)
    }

    /// Live notes, pinned first, then most recently updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_notes(&self) -> Result<Vec<Note>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE deleted_at IS NULL \
             ORDER BY pinned DESC, updated_at DESC, id"
        ))?;
        let rows = stmt.query_map([], note_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Save title, content, and pin state without journaling.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn update_note(&self, note: &Note) -> Result<Note> {
        self.mutate(|conn| update_note_in(conn, note, None))
    }

    /// Update and journal `update`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn update_note_logged(&self, note: &Note, session_id: &str) -> Result<Note> {
        self.mutate(|conn| {
            update_note_in(conn, note, Some(Journal::new(session_id, ActionType::Update)))
        })
    }

    /// Soft-delete without journaling.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn delete_note(&self, id: &str) -> Result<()> {
        self.mutate(|conn| delete_note_in(conn, id, None))
    }

    /// Soft-delete and journal `delete` with an empty `new_data`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the id is unknown.
    pub fn delete_note_logged(&self, id: &str, session_id: &str) -> Result<()> {
        self.mutate(|conn| {
            delete_note_in(conn, id, Some(Journal::new(session_id, ActionType::Delete)))
        })
    }
}
