//! `.todos/agent_errors.jsonl`: failed commands, for agents to learn from.
//! Always on; `TD_ANALYTICS` does not apply.

use super::{append_jsonl, read_jsonl, redact_args};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const AGENT_ERRORS_FILE: &str = "agent_errors.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentErrorEvent {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default)]
    pub session_id: String,
}

impl AgentErrorEvent {
    #[must_use]
    pub fn new(command: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            timestamp: crate::timestamp::now(),
            command: command.into(),
            args: Vec::new(),
            error: error.into(),
            error_code: None,
            session_id: String::new(),
        }
    }
}

/// Record a failure with redacted arguments. Write failures are dropped.
pub fn log_agent_error(base_dir: &Path, event: &AgentErrorEvent) {
    let mut event = event.clone();
    event.args = redact_args(&event.args);
    if let Err(err) = append_jsonl(base_dir, AGENT_ERRORS_FILE, &event) {
        debug!(error = %err, "dropping agent error event");
    }
}

/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_agent_errors(base_dir: &Path) -> Result<Vec<AgentErrorEvent>> {
    read_jsonl(base_dir, AGENT_ERRORS_FILE)
}
