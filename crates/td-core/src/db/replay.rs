//! Applying remote journal rows locally.
//!
//! Replay runs through the unlogged write routines, so applying a pulled
//! event never appends to the local journal. A non-empty `new_data` is the
//! row image to store; an empty one means the entity was removed.

use super::boards::{delete_board_rows, remove_issue_position_in, set_issue_position_in, upsert_board_in};
use super::issues::{soft_delete_issue_row, upsert_issue_in};
use super::links::{add_dependency_in, remove_dependency_by_id, unlink_file_by_id, upsert_file_link_in};
use super::notes::{soft_delete_note_row, upsert_note_in};
use super::Database;
use crate::error::{Error, Result};
use crate::model::{
    ActionLog, Board, BoardIssuePosition, Dependency, EntityType, Issue, IssueFile, Note,
};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A journal row as received from another node. `entity_type` stays text so
/// that types this build does not know can be skipped instead of rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayEvent {
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub previous_data: String,
    #[serde(default)]
    pub new_data: String,
}

impl From<&ActionLog> for ReplayEvent {
    fn from(action: &ActionLog) -> Self {
        Self {
            entity_type: action.entity_type.as_str().to_string(),
            entity_id: action.entity_id.clone(),
            previous_data: action.previous_data.clone(),
            new_data: action.new_data.clone(),
        }
    }
}

fn image<T: DeserializeOwned>(raw: &str, field: &'static str) -> Result<Option<T>> {
    if raw.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|source| Error::Unmarshal { field, source })
}

fn apply_in(conn: &Connection, entity_type: EntityType, event: &ReplayEvent) -> Result<()> {
    let id = event.entity_id.as_str();
    match entity_type {
        EntityType::Issue => match image::<Issue>(&event.new_data, "new_data")? {
            Some(issue) => upsert_issue_in(conn, &issue),
            None => soft_delete_issue_row(conn, id),
        },
        EntityType::Dependency => match image::<Dependency>(&event.new_data, "new_data")? {
            Some(dep) => add_dependency_in(
                conn,
                &dep.issue_id,
                &dep.depends_on_id,
                &dep.relation_type,
                None,
            )
            .map(|_| ()),
            None => remove_dependency_by_id(conn, id, None).map(|_| ()),
        },
        EntityType::FileLink => match image::<IssueFile>(&event.new_data, "new_data")? {
            Some(link) => upsert_file_link_in(conn, &link),
            None => unlink_file_by_id(conn, id, None).map(|_| ()),
        },
        EntityType::Note => match image::<Note>(&event.new_data, "new_data")? {
            Some(note) => upsert_note_in(conn, &note),
            None => soft_delete_note_row(conn, id),
        },
        EntityType::Board => match image::<Board>(&event.new_data, "new_data")? {
            Some(board) => upsert_board_in(conn, &board),
            None => delete_board_rows(conn, id),
        },
        EntityType::BoardPosition => {
            if let Some(slot) = image::<BoardIssuePosition>(&event.new_data, "new_data")? {
                set_issue_position_in(conn, &slot.board_id, &slot.issue_id, slot.position, None)
                    .map(|_| ())
            } else if let Some(slot) =
                image::<BoardIssuePosition>(&event.previous_data, "previous_data")?
            {
                remove_issue_position_in(conn, &slot.board_id, &slot.issue_id, None).map(|_| ())
            } else {
                debug!(entity_id = id, "board position removal without image");
                Ok(())
            }
        }
    }
}

impl Database {
    /// Apply one journal row from another node. Returns `false` when the row
    /// was skipped.
    ///
    /// # Errors
    ///
    /// [`Error::Unmarshal`] for undecodable images, otherwise whatever the
    /// underlying write returns.
    pub fn apply_action(&self, action: &ActionLog) -> Result<bool> {
        self.apply_event(&ReplayEvent::from(action))
    }

    /// Apply a remote event. Entity types this build does not know are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// See [`Database::apply_action`].
    pub fn apply_event(&self, event: &ReplayEvent) -> Result<bool> {
        let Ok(entity_type) = event.entity_type.parse::<EntityType>() else {
            warn!(
                entity_type = %event.entity_type,
                entity_id = %event.entity_id,
                "skipping replay of unknown entity type"
            );
            return Ok(false);
        };
        self.mutate(|conn| apply_in(conn, entity_type, event))?;
        debug!(%entity_type, entity_id = %event.entity_id, "replayed action");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::ReplayEvent;
    use crate::db::test_support::temp_db;
    use crate::model::Issue;

    #[test]
    fn unknown_entity_types_are_skipped() {
        let (_dir, db) = temp_db();
        let event = ReplayEvent {
            entity_type: "widget".into(),
            entity_id: "w-1".into(),
            previous_data: String::new(),
            new_data: "{}".into(),
        };
        assert!(!db.apply_event(&event).unwrap());
    }

    #[test]
    fn replay_does_not_journal() {
        let (_source_dir, source) = temp_db();
        let issue = source
            .create_issue_logged(Issue::new("replicated"), "s1")
            .unwrap();
        let action = source.get_last_action("s1").unwrap().unwrap();

        let (_dir, target) = temp_db();
        assert!(target.apply_action(&action).unwrap());
        assert_eq!(target.get_issue(&issue.id).unwrap(), issue);
        assert!(target.get_recent_actions(None, 10).unwrap().is_empty());
    }

    #[test]
    fn bad_images_fail_to_unmarshal() {
        let (_dir, db) = temp_db();
        let event = ReplayEvent {
            entity_type: "issue".into(),
            entity_id: "td-1".into(),
            previous_data: String::new(),
            new_data: "{not json".into(),
        };
        let err = db.apply_event(&event).unwrap_err();
        assert!(err.to_string().starts_with("failed to unmarshal new_data"));
    }
}
