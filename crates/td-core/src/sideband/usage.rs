//! `.todos/command_usage.jsonl`: one line per command invocation.

use super::{append_jsonl, read_jsonl, redact_args, redact_flags};
use crate::config::analytics_enabled;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

pub const USAGE_FILE: &str = "command_usage.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandUsageEvent {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub flags: BTreeMap<String, String>,
    #[serde(default)]
    pub session_id: String,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandUsageEvent {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            timestamp: crate::timestamp::now(),
            command: command.into(),
            args: Vec::new(),
            flags: BTreeMap::new(),
            session_id: String::new(),
            duration_ms: 0,
            success: true,
            error: None,
        }
    }
}

/// Record one invocation, redacted. Does nothing when analytics are
/// disabled or the project has no `.todos/`; write failures are dropped.
pub fn log_command_usage(base_dir: &Path, event: &CommandUsageEvent) {
    if !analytics_enabled(base_dir) {
        return;
    }
    let mut event = event.clone();
    event.args = redact_args(&event.args);
    event.flags = redact_flags(&event.flags);
    if let Err(err) = append_jsonl(base_dir, USAGE_FILE, &event) {
        debug!(error = %err, "dropping command usage event");
    }
}

/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_command_usage(base_dir: &Path) -> Result<Vec<CommandUsageEvent>> {
    read_jsonl(base_dir, USAGE_FILE)
}
