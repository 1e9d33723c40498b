use super::text_enum;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

text_enum! {
    /// Lifecycle status of an issue.
    Status {
        Open => "open",
        InProgress => "in_progress",
        Blocked => "blocked",
        InReview => "in_review",
        Closed => "closed",
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::Open
    }
}

impl Status {
    /// Whether an issue at `self` counts as having reached `target` for
    /// parent cascades. Review is satisfied by review or closed; closed only
    /// by closed.
    #[must_use]
    pub fn satisfies(self, target: Self) -> bool {
        match target {
            Self::InReview => matches!(self, Self::InReview | Self::Closed),
            other => self == other,
        }
    }
}

text_enum! {
    IssueType {
        Task => "task",
        Bug => "bug",
        Feature => "feature",
        Epic => "epic",
        Chore => "chore",
    }
}

impl Default for IssueType {
    fn default() -> Self {
        Self::Task
    }
}

text_enum! {
    /// Priority tag. Text order equals urgency order: `P0 < P1 < ... < P4`.
    Priority {
        P0 => "P0",
        P1 => "P1",
        P2 => "P2",
        P3 => "P3",
        P4 => "P4",
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::P2
    }
}

/// The canonical issue view. This is also the JSON payload stored in the
/// action log for issue rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: Status,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub priority: Priority,
    pub points: i64,
    pub labels: Vec<String>,
    pub parent_id: Option<String>,
    pub acceptance: String,
    pub sprint: String,
    pub implementer_session: Option<String>,
    pub creator_session: Option<String>,
    pub reviewer_session: Option<String>,
    pub created_branch: String,
    pub minor: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub defer_until: Option<String>,
    pub due_date: Option<String>,
    pub defer_count: i64,
}

impl Issue {
    /// A new, unsaved issue with default status, type, and priority.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Join labels for storage, dropping blanks.
#[must_use]
pub fn join_labels(labels: &[String]) -> String {
    labels
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Split a stored label column.
#[must_use]
pub fn split_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_text_order_matches_enum_order() {
        let mut texts: Vec<&str> = Priority::ALL.iter().map(|p| p.as_str()).collect();
        let original = texts.clone();
        texts.sort_unstable();
        assert_eq!(texts, original);
        assert!(Priority::P0 < Priority::P3);
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("IN_REVIEW".parse::<Status>().unwrap(), Status::InReview);
        assert_eq!("p1".parse::<Priority>().unwrap(), Priority::P1);
        assert_eq!("Epic".parse::<IssueType>().unwrap(), IssueType::Epic);
        assert!("someday".parse::<Status>().is_err());
    }

    #[test]
    fn review_target_accepts_closed_children() {
        assert!(Status::Closed.satisfies(Status::InReview));
        assert!(Status::InReview.satisfies(Status::InReview));
        assert!(!Status::InProgress.satisfies(Status::InReview));
        assert!(!Status::InReview.satisfies(Status::Closed));
        assert!(Status::Closed.satisfies(Status::Closed));
    }

    #[test]
    fn labels_round_trip_through_storage_text() {
        let labels = vec!["api".to_string(), " ".to_string(), " ui ".to_string()];
        let stored = join_labels(&labels);
        assert_eq!(stored, "api,ui");
        assert_eq!(split_labels(&stored), vec!["api", "ui"]);
        assert!(split_labels("").is_empty());
    }

    #[test]
    fn issue_json_uses_type_key_and_null_options() {
        let issue = Issue::new("A");
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["type"], "task");
        assert_eq!(json["priority"], "P2");
        assert_eq!(json["status"], "open");
        assert!(json["parent_id"].is_null());
        assert!(json["deleted_at"].is_null());
    }
}
