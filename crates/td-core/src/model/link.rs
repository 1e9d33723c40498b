use super::text_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

text_enum! {
    FileRole {
        Implementation => "implementation",
        Test => "test",
        Reference => "reference",
        Config => "config",
    }
}

impl Default for FileRole {
    fn default() -> Self {
        Self::Implementation
    }
}

/// A repository file linked to an issue. `file_path` is repo-relative with
/// forward slashes; `id` is [`crate::ids::issue_file_id`] of the pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueFile {
    pub id: String,
    pub issue_id: String,
    pub file_path: String,
    pub role: FileRole,
    pub linked_sha: String,
    pub linked_at: DateTime<Utc>,
}

/// `issue_id` depends on `depends_on_id`. `id` is
/// [`crate::ids::dependency_id`] of the triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: String,
    pub issue_id: String,
    pub depends_on_id: String,
    pub relation_type: String,
}
