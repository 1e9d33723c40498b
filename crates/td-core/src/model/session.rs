use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named span of work that groups several issues and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSession {
    pub id: String,
    pub name: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub start_sha: String,
    pub end_sha: String,
}

/// An agent session. Ids are supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub branch: String,
    pub agent_type: String,
    pub agent_pid: Option<i64>,
    pub context_id: String,
    pub previous_session_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// One row per session that touched an issue; feeds the review rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSessionHistory {
    pub id: i64,
    pub issue_id: String,
    pub session_id: String,
    pub action: String,
    pub created_at: DateTime<Utc>,
}
