use super::text_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

text_enum! {
    LogType {
        Progress => "progress",
        Blocker => "blocker",
        Decision => "decision",
        Hypothesis => "hypothesis",
        Tried => "tried",
        Result => "result",
        Orchestration => "orchestration",
        Security => "security",
    }
}

impl Default for LogType {
    fn default() -> Self {
        Self::Progress
    }
}

/// A free-form log line attached to an issue, a work session, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub id: String,
    /// Empty when the entry belongs only to a work session.
    pub issue_id: String,
    pub session_id: String,
    pub work_session_id: Option<String>,
    pub message: String,
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub timestamp: DateTime<Utc>,
}

impl Log {
    #[must_use]
    pub fn new(issue_id: &str, session_id: &str, message: &str, log_type: LogType) -> Self {
        Self {
            issue_id: issue_id.to_string(),
            session_id: session_id.to_string(),
            message: message.to_string(),
            log_type,
            ..Self::default()
        }
    }
}

/// Session hand-off notes. Each list is stored as a JSON array column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    pub id: i64,
    pub issue_id: String,
    pub session_id: String,
    pub done: Vec<String>,
    pub remaining: Vec<String>,
    pub decisions: Vec<String>,
    pub uncertain: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

text_enum! {
    SnapshotEvent {
        Start => "start",
        End => "end",
        Checkpoint => "checkpoint",
    }
}

/// Repository state captured when work on an issue starts or ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSnapshot {
    pub id: i64,
    pub issue_id: String,
    pub event: SnapshotEvent,
    pub commit_sha: String,
    pub branch: String,
    pub dirty_files: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub issue_id: String,
    pub session_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
