use super::text_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

text_enum! {
    ViewMode {
        Swimlanes => "swimlanes",
        Backlog => "backlog",
    }
}

impl Default for ViewMode {
    fn default() -> Self {
        Self::Swimlanes
    }
}

/// A named view over issues. `query` is TDQ text, opaque to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub name: String,
    pub query: String,
    pub is_builtin: bool,
    pub view_mode: ViewMode,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Explicit slot of an issue within a board's ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardIssuePosition {
    pub id: String,
    pub board_id: String,
    pub issue_id: String,
    pub position: i64,
    pub added_at: DateTime<Utc>,
}
