use super::text_enum;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

text_enum! {
    /// What a journaled mutation did. Status transitions on issues carry
    /// their own tag so that undo can explain itself.
    ActionType {
        Create => "create",
        Update => "update",
        Delete => "delete",
        Restore => "restore",
        Start => "start",
        Review => "review",
        Approve => "approve",
        Reject => "reject",
        Block => "block",
        Unblock => "unblock",
        Reopen => "reopen",
        Close => "close",
        AddDependency => "add_dependency",
        RemoveDependency => "remove_dependency",
        LinkFile => "link_file",
        UnlinkFile => "unlink_file",
        BoardSetPosition => "board_set_position",
        BoardUnposition => "board_unposition",
    }
}

text_enum! {
    EntityType {
        Issue => "issue",
        Dependency => "dependency",
        FileLink => "file_link",
        Note => "note",
        Board => "board",
        BoardPosition => "board_position",
    }
}

/// One journal row.
///
/// `seq` is the SQLite rowid and gives the append order. `previous_data` and
/// `new_data` are JSON text or empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLog {
    pub seq: i64,
    pub id: String,
    pub session_id: String,
    pub action_type: ActionType,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub previous_data: String,
    pub new_data: String,
    pub timestamp: String,
    pub undone: bool,
    pub synced_at: Option<String>,
    pub server_seq: Option<i64>,
}

impl ActionLog {
    /// Decode `previous_data`; `None` when the column is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unmarshal`] when the payload is not valid JSON for `T`.
    pub fn previous<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        decode_payload(&self.previous_data, "previous_data")
    }

    /// Decode `new_data`; `None` when the column is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unmarshal`] when the payload is not valid JSON for `T`.
    pub fn new_image<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        decode_payload(&self.new_data, "new_data")
    }
}

fn decode_payload<T: DeserializeOwned>(raw: &str, field: &'static str) -> Result<Option<T>> {
    if raw.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|source| Error::Unmarshal { field, source })
}

/// Singleton row describing the link to a sync server. Absent means unlinked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub project_id: String,
    /// Journal `seq` of the last row accepted by the server.
    pub last_pushed_action_id: i64,
    pub last_pulled_server_seq: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_disabled: bool,
}

/// A local row that a pulled remote event overwrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub server_seq: i64,
    pub local_data: String,
    pub remote_data: String,
    pub overwritten_at: DateTime<Utc>,
}
