//! Filtered issue listing and ranked search.
//!
//! [`ListIssuesOptions`] composes into one `WHERE` clause. Within a
//! multi-value filter the choices are OR-ed; separate filters are AND-ed.

use super::Database;
use super::issues::{ISSUE_COLUMNS, descendant_ids, issue_from_row};
use crate::error::{Error, Result};
use crate::ids::normalize_issue_id;
use crate::model::{Issue, IssueType, Priority, Status};
use crate::timestamp::{self, format_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{Connection, params_from_iter};
use std::fmt::Write as _;

/// Sort keys accepted by [`ListIssuesOptions::sort_by`], mapped to columns.
const SORT_COLUMNS: &[(&str, &str)] = &[
    ("id", "id"),
    ("title", "title"),
    ("status", "status"),
    ("type", "type"),
    ("priority", "priority"),
    ("points", "points"),
    ("created", "created_at"),
    ("created_at", "created_at"),
    ("updated", "updated_at"),
    ("updated_at", "updated_at"),
    ("closed", "closed_at"),
    ("closed_at", "closed_at"),
    ("deleted_at", "deleted_at"),
    ("due", "due_date"),
    ("due_date", "due_date"),
    ("defer_until", "defer_until"),
    ("sprint", "sprint"),
];

/// Priority filter: `"P1"`, `"<=P2"`, `">=P1"` (also `<` and `>`).
/// Lexicographic, so `P0 < P1 < ... < P4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityFilter {
    pub op: &'static str,
    pub priority: Priority,
}

impl std::str::FromStr for PriorityFilter {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        for op in ["<=", ">=", "<", ">", "="] {
            if let Some(rest) = raw.strip_prefix(op) {
                return Ok(Self {
                    op,
                    priority: rest.parse()?,
                });
            }
        }
        Ok(Self {
            op: "=",
            priority: raw.parse()?,
        })
    }
}

/// Filters for [`Database::list_issues`]. The default lists every live issue.
#[derive(Debug, Clone, Default)]
pub struct ListIssuesOptions {
    pub status: Vec<Status>,
    pub types: Vec<IssueType>,
    pub ids: Vec<String>,
    pub labels: Vec<String>,
    pub priority: Option<PriorityFilter>,
    /// Substring of id, title, or description.
    pub search: Option<String>,
    pub implementer: Option<String>,
    pub reviewer: Option<String>,
    /// Issues this session may review (see [`reviewable_clause`]).
    pub reviewable_by: Option<String>,
    pub parent_id: Option<String>,
    /// All descendants of this epic. An epic without descendants matches
    /// nothing.
    pub epic_id: Option<String>,
    pub sprint: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub updated_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
    pub closed_after: Option<DateTime<Utc>>,
    pub closed_before: Option<DateTime<Utc>>,
    pub include_deleted: bool,
    pub only_deleted: bool,
    /// Hide issues deferred to a future date.
    pub exclude_deferred: bool,
    pub deferred_only: bool,
    /// Open issues whose due date has passed.
    pub overdue_only: bool,
    /// Issues whose deferral has expired after being deferred at least once.
    pub surfacing_only: bool,
    pub due_soon_days: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_desc: bool,
    pub limit: Option<usize>,
}

/// An issue with its [`score_issue`] relevance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedIssue {
    pub issue: Issue,
    pub score: u32,
}

/// Accumulates `WHERE` fragments and their positional parameters.
#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    values: Vec<Box<dyn ToSql>>,
}

impl Conditions {
    /// Bind `value` and return its placeholder.
    fn bind(&mut self, value: impl ToSql + 'static) -> String {
        self.values.push(Box::new(value));
        format!("?{}", self.values.len())
    }

    fn push(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    fn any_of<T: ToSql + Clone + 'static>(&mut self, column: &str, values: &[T]) {
        if values.is_empty() {
            return;
        }
        let placeholders: Vec<String> = values.iter().map(|v| self.bind(v.clone())).collect();
        self.push(format!("{column} IN ({})", placeholders.join(", ")));
    }

    fn date_bound(&mut self, column: &str, op: &str, ts: Option<&DateTime<Utc>>) {
        if let Some(ts) = ts {
            let p = self.bind(format_timestamp(ts));
            // Rows from older schemas hold `YYYY-MM-DD HH:MM:SS`.
            self.push(format!("replace({column}, ' ', 'T') {op} {p}"));
        }
    }

    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// SQL column for a user-facing sort key.
///
/// # Errors
///
/// [`Error::InvalidInput`] for keys outside the allow-list.
pub fn sort_column(key: &str) -> Result<&'static str> {
    let key = key.trim().to_ascii_lowercase();
    SORT_COLUMNS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, column)| *column)
        .ok_or_else(|| Error::invalid(format!("invalid sort column '{key}'")))
}

/// `status = in_review`, an implementer is recorded, and either the issue is
/// minor or the session is neither implementer nor creator and never touched
/// the issue.
fn reviewable_clause(cond: &mut Conditions, session: &str) {
    let s = cond.bind(session.to_string());
    cond.push(format!(
        "(status = 'in_review' AND COALESCE(implementer_session, '') != '' AND \
         (minor = 1 OR (implementer_session != {s} AND COALESCE(creator_session, '') != {s} \
         AND NOT EXISTS (SELECT 1 FROM issue_session_history h \
         WHERE h.issue_id = issues.id AND h.session_id = {s}))))"
    ));
}

/// Escape `%`, `_`, and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn like_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn label_clause(cond: &mut Conditions, labels: &[String]) {
    let mut any = Vec::new();
    for label in labels.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        let label = like_escape(label);
        let patterns = [
            format!("{label},%"),
            format!("%,{label},%"),
            format!("%,{label}"),
            label,
        ];
        for pattern in patterns {
            let p = cond.bind(pattern);
            any.push(format!("labels LIKE {p} ESCAPE '\\'"));
        }
    }
    if !any.is_empty() {
        cond.push(format!("({})", any.join(" OR ")));
    }
}

fn defer_clauses(cond: &mut Conditions, opts: &ListIssuesOptions) {
    if !(opts.exclude_deferred
        || opts.deferred_only
        || opts.overdue_only
        || opts.surfacing_only
        || opts.due_soon_days.is_some())
    {
        return;
    }
    let today = cond.bind(timestamp::today());

    if opts.exclude_deferred {
        cond.push(format!(
            "(defer_until IS NULL OR defer_until = '' OR defer_until <= {today})"
        ));
    }
    if opts.deferred_only {
        cond.push(format!("(defer_until IS NOT NULL AND defer_until > {today})"));
    }
    if opts.overdue_only {
        cond.push(format!(
            "(COALESCE(due_date, '') != '' AND due_date < {today} AND status != 'closed')"
        ));
    }
    if opts.surfacing_only {
        cond.push(format!(
            "(COALESCE(defer_until, '') != '' AND defer_until <= {today} AND defer_count >= 1)"
        ));
    }
    if let Some(days) = opts.due_soon_days {
        let horizon = cond.bind(timestamp::today_plus_days(days));
        cond.push(format!(
            "(COALESCE(due_date, '') != '' AND due_date >= {today} AND due_date <= {horizon} \
             AND status != 'closed')"
        ));
    }
}

fn build_conditions(
    conn: &Connection,
    opts: &ListIssuesOptions,
    search_labels: bool,
) -> Result<Conditions> {
    let mut cond = Conditions::default();

    if opts.only_deleted {
        cond.push("deleted_at IS NOT NULL");
    } else if !opts.include_deleted {
        cond.push("deleted_at IS NULL");
    }

    cond.any_of("status", &opts.status);
    cond.any_of("type", &opts.types);
    let ids: Vec<String> = opts.ids.iter().map(|id| normalize_issue_id(id)).collect();
    cond.any_of("id", &ids);
    label_clause(&mut cond, &opts.labels);

    if let Some(filter) = opts.priority {
        let p = cond.bind(filter.priority);
        cond.push(format!("priority {} {p}", filter.op));
    }

    if let Some(query) = opts.search.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let p = cond.bind(format!("%{}%", like_escape(query)));
        let mut clause = format!(
            "(id LIKE {p} ESCAPE '\\' OR title LIKE {p} ESCAPE '\\' \
             OR description LIKE {p} ESCAPE '\\'"
        );
        if search_labels {
            let _ = write!(clause, " OR labels LIKE {p} ESCAPE '\\'");
        }
        clause.push(')');
        cond.push(clause);
    }

    if let Some(implementer) = &opts.implementer {
        let p = cond.bind(implementer.clone());
        cond.push(format!("implementer_session = {p}"));
    }
    if let Some(reviewer) = &opts.reviewer {
        let p = cond.bind(reviewer.clone());
        cond.push(format!("reviewer_session = {p}"));
    }
    if let Some(session) = &opts.reviewable_by {
        reviewable_clause(&mut cond, session);
    }
    if let Some(parent) = &opts.parent_id {
        let p = cond.bind(normalize_issue_id(parent));
        cond.push(format!("parent_id = {p}"));
    }
    if let Some(epic) = &opts.epic_id {
        let descendants = descendant_ids(conn, &normalize_issue_id(epic))?;
        if descendants.is_empty() {
            cond.push("1=0");
        } else {
            cond.any_of("id", &descendants);
        }
    }
    if let Some(sprint) = &opts.sprint {
        let p = cond.bind(sprint.clone());
        cond.push(format!("sprint = {p}"));
    }

    cond.date_bound("created_at", ">=", opts.created_after.as_ref());
    cond.date_bound("created_at", "<=", opts.created_before.as_ref());
    cond.date_bound("updated_at", ">=", opts.updated_after.as_ref());
    cond.date_bound("updated_at", "<=", opts.updated_before.as_ref());
    cond.date_bound("closed_at", ">=", opts.closed_after.as_ref());
    cond.date_bound("closed_at", "<=", opts.closed_before.as_ref());

    defer_clauses(&mut cond, opts);
    Ok(cond)
}

fn order_clause(opts: &ListIssuesOptions) -> Result<String> {
    let direction = if opts.sort_desc { "DESC" } else { "ASC" };
    match &opts.sort_by {
        Some(key) => {
            let column = sort_column(key)?;
            Ok(format!(" ORDER BY {column} {direction}, id ASC"))
        }
        None => Ok(format!(" ORDER BY priority {direction}, created_at ASC, id ASC")),
    }
}

fn list_issues_in(
    conn: &Connection,
    opts: &ListIssuesOptions,
    search_labels: bool,
) -> Result<Vec<Issue>> {
    let cond = build_conditions(conn, opts, search_labels)?;
    let mut sql = format!(
        "SELECT {ISSUE_COLUMNS} FROM issues{}{}",
        cond.where_clause(),
        order_clause(opts)?
    );
    if let Some(limit) = opts.limit {
        let _ = write!(sql, " LIMIT {limit}");
    }

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn ToSql> = cond.values.iter().map(AsRef::as_ref).collect();
    let rows = stmt.query_map(params_from_iter(params), issue_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Relevance of `issue` for `query`, first matching tier wins:
/// exact id 100, id contains 90, exact title 80, title prefix 70,
/// title contains 60, description 40, label 20, otherwise 0.
#[must_use]
pub fn score_issue(issue: &Issue, query: &str) -> u32 {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return 0;
    }
    let id = issue.id.to_lowercase();
    let title = issue.title.to_lowercase();

    if id == q {
        100
    } else if id.contains(&q) {
        90
    } else if title == q {
        80
    } else if title.starts_with(&q) {
        70
    } else if title.contains(&q) {
        60
    } else if issue.description.to_lowercase().contains(&q) {
        40
    } else if issue.labels.iter().any(|l| l.to_lowercase().contains(&q)) {
        20
    } else {
        0
    }
}

impl Database {
    /// Issues matching `opts`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for an unknown sort key; otherwise query
    /// failures.
    pub fn list_issues(&self, opts: &ListIssuesOptions) -> Result<Vec<Issue>> {
        list_issues_in(self.conn(), opts, false)
    }

    /// Issues matching `query` (plus the other filters in `opts`), best
    /// score first, ties by priority.
    ///
    /// # Errors
    ///
    /// See [`Database::list_issues`].
    pub fn search_issues_ranked(
        &self,
        query: &str,
        opts: &ListIssuesOptions,
    ) -> Result<Vec<RankedIssue>> {
        let mut opts = opts.clone();
        opts.search = Some(query.to_string());
        let limit = opts.limit.take();

        let mut ranked: Vec<RankedIssue> = list_issues_in(self.conn(), &opts, true)?
            .into_iter()
            .map(|issue| RankedIssue {
                score: score_issue(&issue, query),
                issue,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.issue.priority.cmp(&b.issue.priority))
        });
        if let Some(limit) = limit {
            ranked.truncate(limit);
        }
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::{ListIssuesOptions, PriorityFilter, score_issue, sort_column};
    use crate::db::test_support::temp_db;
    use crate::model::{Issue, IssueType, Priority, Status};

    fn titles(issues: &[Issue]) -> Vec<&str> {
        let mut out: Vec<&str> = issues.iter().map(|i| i.title.as_str()).collect();
        out.sort_unstable();
        out
    }

    fn seed(db: &crate::Database, title: &str, priority: Priority, labels: &[&str]) -> Issue {
        let mut issue = Issue::new(title);
        issue.priority = priority;
        issue.labels = labels.iter().map(ToString::to_string).collect();
        db.create_issue(issue).unwrap()
    }

    #[test]
    fn priority_filter_parses() {
        let f: PriorityFilter = "<=P2".parse().unwrap();
        assert_eq!((f.op, f.priority), ("<=", Priority::P2));
        let f: PriorityFilter = "p1".parse().unwrap();
        assert_eq!((f.op, f.priority), ("=", Priority::P1));
        assert!("<=P9".parse::<PriorityFilter>().is_err());
    }

    #[test]
    fn sort_allow_list() {
        assert_eq!(sort_column("Created").unwrap(), "created_at");
        let err = sort_column("title; DROP TABLE issues").unwrap_err();
        assert!(err.to_string().contains("invalid sort column"));
    }

    #[test]
    fn priority_and_status_filters() {
        let (_dir, db) = temp_db();
        seed(&db, "p0", Priority::P0, &[]);
        seed(&db, "p2", Priority::P2, &[]);
        let mut done = seed(&db, "p3", Priority::P3, &[]);
        done.status = Status::Closed;
        db.update_issue(&done).unwrap();

        let opts = ListIssuesOptions {
            priority: Some("<=P2".parse().unwrap()),
            ..ListIssuesOptions::default()
        };
        assert_eq!(titles(&db.list_issues(&opts).unwrap()), vec!["p0", "p2"]);

        let opts = ListIssuesOptions {
            status: vec![Status::Open, Status::Closed],
            priority: Some(">=P2".parse().unwrap()),
            ..ListIssuesOptions::default()
        };
        assert_eq!(titles(&db.list_issues(&opts).unwrap()), vec!["p2", "p3"]);
    }

    #[test]
    fn label_matches_any_position() {
        let (_dir, db) = temp_db();
        seed(&db, "first", Priority::P2, &["api", "db"]);
        seed(&db, "middle", Priority::P2, &["x", "api", "y"]);
        seed(&db, "last", Priority::P2, &["db", "api"]);
        seed(&db, "only", Priority::P2, &["api"]);
        seed(&db, "prefix", Priority::P2, &["apix"]);

        let opts = ListIssuesOptions {
            labels: vec!["api".into()],
            ..ListIssuesOptions::default()
        };
        assert_eq!(
            titles(&db.list_issues(&opts).unwrap()),
            vec!["first", "last", "middle", "only"]
        );
    }

    #[test]
    fn date_bounds_match_legacy_datetime_text() {
        let (_dir, db) = temp_db();
        let legacy = seed(&db, "legacy", Priority::P2, &[]);
        let old = seed(&db, "old", Priority::P2, &[]);
        db.conn()
            .execute(
                "UPDATE issues SET created_at = '2024-03-05 10:11:12' WHERE id = ?1",
                [&legacy.id],
            )
            .unwrap();
        db.conn()
            .execute(
                "UPDATE issues SET created_at = '2024-03-04T23:59:59.000000000Z' WHERE id = ?1",
                [&old.id],
            )
            .unwrap();

        let bound = |raw: &str| Some(crate::timestamp::parse_timestamp(raw).unwrap());
        let opts = ListIssuesOptions {
            created_after: bound("2024-03-05T00:00:00Z"),
            created_before: bound("2024-03-06T00:00:00Z"),
            ..ListIssuesOptions::default()
        };
        assert_eq!(titles(&db.list_issues(&opts).unwrap()), vec!["legacy"]);

        let opts = ListIssuesOptions {
            created_before: bound("2024-03-05T12:00:00Z"),
            ..ListIssuesOptions::default()
        };
        assert_eq!(titles(&db.list_issues(&opts).unwrap()), vec!["legacy", "old"]);
    }

    #[test]
    fn like_wildcards_in_input_are_literal() {
        let (_dir, db) = temp_db();
        seed(&db, "100% done", Priority::P2, &["a_b"]);
        seed(&db, "1000 done", Priority::P2, &["axb"]);

        let opts = ListIssuesOptions {
            search: Some("100%".into()),
            ..ListIssuesOptions::default()
        };
        assert_eq!(titles(&db.list_issues(&opts).unwrap()), vec!["100% done"]);

        let opts = ListIssuesOptions {
            labels: vec!["a_b".into()],
            ..ListIssuesOptions::default()
        };
        assert_eq!(titles(&db.list_issues(&opts).unwrap()), vec!["100% done"]);
    }

    #[test]
    fn epic_without_descendants_matches_nothing() {
        let (_dir, db) = temp_db();
        let mut epic = Issue::new("epic");
        epic.issue_type = IssueType::Epic;
        let epic = db.create_issue(epic).unwrap();
        seed(&db, "loose", Priority::P2, &[]);

        let opts = ListIssuesOptions {
            epic_id: Some(epic.id.clone()),
            ..ListIssuesOptions::default()
        };
        assert!(db.list_issues(&opts).unwrap().is_empty());

        let mut child = Issue::new("child");
        child.parent_id = Some(epic.id.clone());
        db.create_issue(child).unwrap();
        assert_eq!(titles(&db.list_issues(&opts).unwrap()), vec!["child"]);
    }

    #[test]
    fn deleted_visibility() {
        let (_dir, db) = temp_db();
        let gone = seed(&db, "gone", Priority::P2, &[]);
        seed(&db, "kept", Priority::P2, &[]);
        db.delete_issue(&gone.id).unwrap();

        let live = db.list_issues(&ListIssuesOptions::default()).unwrap();
        assert_eq!(titles(&live), vec!["kept"]);

        let all = ListIssuesOptions {
            include_deleted: true,
            ..ListIssuesOptions::default()
        };
        assert_eq!(db.list_issues(&all).unwrap().len(), 2);

        let only = ListIssuesOptions {
            only_deleted: true,
            ..ListIssuesOptions::default()
        };
        assert_eq!(titles(&db.list_issues(&only).unwrap()), vec!["gone"]);
    }

    #[test]
    fn reviewable_by_rules() {
        let (_dir, db) = temp_db();
        let mut own = Issue::new("own work");
        own.status = Status::InReview;
        own.implementer_session = Some("alice".into());
        db.create_issue(own).unwrap();

        let mut other = Issue::new("other work");
        other.status = Status::InReview;
        other.implementer_session = Some("bob".into());
        let other = db.create_issue(other).unwrap();

        let mut minor = Issue::new("minor own");
        minor.status = Status::InReview;
        minor.implementer_session = Some("alice".into());
        minor.minor = true;
        db.create_issue(minor).unwrap();

        let mut no_impl = Issue::new("nobody");
        no_impl.status = Status::InReview;
        db.create_issue(no_impl).unwrap();

        let opts = ListIssuesOptions {
            reviewable_by: Some("alice".into()),
            ..ListIssuesOptions::default()
        };
        assert_eq!(
            titles(&db.list_issues(&opts).unwrap()),
            vec!["minor own", "other work"]
        );

        db.record_session_action(&other.id, "alice", "started").unwrap();
        assert_eq!(titles(&db.list_issues(&opts).unwrap()), vec!["minor own"]);
    }

    #[test]
    fn score_ladder() {
        let mut issue = Issue::new("Login timeout");
        issue.id = "td-abc12345".into();
        issue.description = "session expires".into();
        issue.labels = vec!["auth".into()];

        assert_eq!(score_issue(&issue, "td-abc12345"), 100);
        assert_eq!(score_issue(&issue, "abc1"), 90);
        assert_eq!(score_issue(&issue, "login timeout"), 80);
        assert_eq!(score_issue(&issue, "Login"), 70);
        assert_eq!(score_issue(&issue, "timeout"), 60);
        assert_eq!(score_issue(&issue, "expires"), 40);
        assert_eq!(score_issue(&issue, "auth"), 20);
        assert_eq!(score_issue(&issue, "nothing"), 0);
    }

    #[test]
    fn ranked_search_orders_by_score_then_priority() {
        let (_dir, db) = temp_db();
        seed(&db, "cache", Priority::P3, &[]);
        seed(&db, "cache warmup", Priority::P1, &[]);
        seed(&db, "warm the cache", Priority::P0, &[]);
        seed(&db, "unrelated", Priority::P0, &["cache"]);

        let ranked = db
            .search_issues_ranked("cache", &ListIssuesOptions::default())
            .unwrap();
        let got: Vec<(&str, u32)> = ranked
            .iter()
            .map(|r| (r.issue.title.as_str(), r.score))
            .collect();
        assert_eq!(
            got,
            vec![
                ("cache", 80),
                ("cache warmup", 70),
                ("warm the cache", 60),
                ("unrelated", 20),
            ]
        );
    }
}
