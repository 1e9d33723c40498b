//! End-to-end behaviour of the store through its public API.

use chrono::DateTime;
use td_core::Database;
use td_core::db::query::ListIssuesOptions;
use td_core::model::{ActionType, EntityType, FileRole, Issue, IssueType, LogType, Priority, Status};
use tempfile::TempDir;

fn fresh() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::initialize(dir.path()).unwrap();
    (dir, db)
}

fn journal_rows(db: &Database, entity_id: &str) -> i64 {
    db.conn()
        .query_row(
            "SELECT COUNT(*) FROM action_log WHERE entity_id = ?1",
            [entity_id],
            |row| row.get(0),
        )
        .unwrap()
}

fn is_issue_id(id: &str) -> bool {
    id.len() == 11
        && id.starts_with("td-")
        && id[3..].chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

#[test]
fn logged_create_update_delete() {
    let (_dir, db) = fresh();
    let mut draft = Issue::new("A");
    draft.issue_type = IssueType::Task;
    draft.priority = Priority::P2;
    let created = db.create_issue_logged(draft, "s1").unwrap();
    assert!(is_issue_id(&created.id), "{}", created.id);

    let actions = db.get_actions_for_entity(&created.id).unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action_type, ActionType::Create);
    assert_eq!(actions[0].entity_type, EntityType::Issue);
    assert_eq!(actions[0].previous_data, "");
    let new: Issue = actions[0].new_image().unwrap().unwrap();
    assert_eq!(new.title, "A");

    let mut edited = created.clone();
    edited.title = "B".into();
    edited.priority = Priority::P0;
    db.update_issue_logged(&edited, "s1", ActionType::Update).unwrap();

    let actions = db.get_actions_for_entity(&created.id).unwrap();
    assert_eq!(actions.len(), 2);
    let before: Issue = actions[1].previous().unwrap().unwrap();
    let after: Issue = actions[1].new_image().unwrap().unwrap();
    assert_eq!((before.title.as_str(), before.priority), ("A", Priority::P2));
    assert_eq!((after.title.as_str(), after.priority), ("B", Priority::P0));
    assert_eq!(before, created);

    db.delete_issue_logged(&created.id, "s1").unwrap();
    let actions = db.get_actions_for_entity(&created.id).unwrap();
    assert_eq!(actions.len(), 3);
    assert_eq!(actions[2].action_type, ActionType::Delete);
    let before: Issue = actions[2].previous().unwrap().unwrap();
    assert_eq!(before.title, "B");
    assert_eq!(actions[2].new_data, "");
    assert!(
        db.get_issue_including_deleted(&created.id)
            .unwrap()
            .deleted_at
            .is_some()
    );
    assert!(db.get_issue(&created.id).unwrap_err().is_not_found());
}

#[test]
fn journal_timestamps_are_canonical_utc() {
    let (_dir, db) = fresh();
    let issue = db.create_issue_logged(Issue::new("ts"), "s1").unwrap();
    db.add_dependency_logged(&issue.id, "td-other", "", "s1").unwrap();
    db.link_file_logged(&issue.id, "src/lib.rs", FileRole::Implementation, "", "s1")
        .unwrap();

    for action in db.get_recent_actions(None, 10).unwrap() {
        let ts = &action.timestamp;
        assert!(ts.contains('T') && ts.ends_with('Z'), "{ts}");
        let parsed = DateTime::parse_from_rfc3339(ts).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
        let fraction = ts.rsplit('.').next().unwrap();
        assert_eq!(fraction.len(), "123456789Z".len(), "{ts}");
    }
}

#[test]
fn unlogged_writes_are_silent() {
    let (_dir, db) = fresh();
    let mut issue = db.create_issue(Issue::new("quiet")).unwrap();
    issue.title = "still quiet".into();
    db.update_issue(&issue).unwrap();
    db.add_dependency(&issue.id, "td-aaaa0000", "").unwrap();
    db.remove_dependency(&issue.id, "td-aaaa0000", "").unwrap();
    let link = db
        .link_file(&issue.id, "README.md", FileRole::Reference, "")
        .unwrap();
    db.unlink_file(&issue.id, "README.md").unwrap();
    db.delete_issue(&issue.id).unwrap();

    assert_eq!(journal_rows(&db, &issue.id), 0);
    assert_eq!(journal_rows(&db, &link.id), 0);
    let total: i64 = db
        .conn()
        .query_row("SELECT COUNT(*) FROM action_log", [], |row| row.get(0))
        .unwrap();
    assert_eq!(total, 0);
}

#[test]
fn epic_cascade_to_review() {
    let (_dir, db) = fresh();
    let mut epic = Issue::new("E");
    epic.issue_type = IssueType::Epic;
    let epic = db.create_issue(epic).unwrap();

    let mut children = Vec::new();
    for title in ["C1", "C2"] {
        let mut child = Issue::new(title);
        child.parent_id = Some(epic.id.clone());
        let mut child = db.create_issue(child).unwrap();
        child.status = Status::InReview;
        children.push(db.update_issue_logged(&child, "s1", ActionType::Review).unwrap());
    }

    let (count, ids) = db
        .cascade_up_parent_status(&children[1].id, Status::InReview, "s1")
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(ids, [epic.id.clone()]);
    assert_eq!(db.get_issue(&epic.id).unwrap().status, Status::InReview);

    let actions = db.get_actions_for_entity(&epic.id).unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].action_type, ActionType::Review);

    let logs = db.get_logs(&epic.id, None).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].log_type, LogType::Progress);
    assert!(logs[0].message.contains("Auto-cascaded"));
}

#[test]
fn migrations_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::initialize(dir.path()).unwrap();
    let issue = db.create_issue(Issue::new("survives")).unwrap();
    let version = db.schema_version().unwrap();
    drop(db);

    let db = Database::open(dir.path()).unwrap();
    assert_eq!(db.run_migrations().unwrap(), 0);
    assert_eq!(db.schema_version().unwrap(), version);
    drop(db);

    {
        let conn = rusqlite::Connection::open(td_core::db::db_path(dir.path())).unwrap();
        conn.execute_batch("DROP TABLE schema_info").unwrap();
    }

    // the whole chain re-runs; every probe finds its column already present
    let db = Database::open(dir.path()).unwrap();
    assert_eq!(db.schema_version().unwrap(), version);
    assert_eq!(db.get_issue(&issue.id).unwrap().title, "survives");
    assert_eq!(db.run_migrations().unwrap(), 0);
    let builtin: i64 = db
        .conn()
        .query_row("SELECT COUNT(*) FROM boards WHERE is_builtin = 1", [], |row| row.get(0))
        .unwrap();
    assert_eq!(builtin, 1);
}

#[test]
fn legacy_minor_column_is_probed() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join(".todos")).unwrap();
    {
        let conn = rusqlite::Connection::open(td_core::db::db_path(dir.path())).unwrap();
        conn.execute_batch(td_core::db::schema::BASE_SCHEMA_SQL).unwrap();
        conn.execute_batch("ALTER TABLE issues ADD COLUMN minor INTEGER NOT NULL DEFAULT 0")
            .unwrap();
    }

    let db = Database::open(dir.path()).unwrap();
    assert_eq!(db.schema_version().unwrap(), td_core::db::schema::SCHEMA_VERSION);
    let mut issue = Issue::new("minor");
    issue.minor = true;
    assert!(db.create_issue(issue).unwrap().minor);
}

#[test]
fn deferral_filters() {
    let (_dir, db) = fresh();
    let today_plus = td_core::timestamp::today_plus_days;
    let past = "2000-01-01".to_string();

    let plain = db.create_issue(Issue::new("plain")).unwrap();
    let mut future = Issue::new("future");
    future.defer_until = Some(today_plus(30));
    let future = db.create_issue(future).unwrap();
    let mut expired = Issue::new("expired");
    expired.defer_until = Some(past.clone());
    let expired = db.create_issue(expired).unwrap();
    let mut surfacing = Issue::new("surfacing");
    surfacing.defer_until = Some(past);
    surfacing.defer_count = 2;
    let surfacing = db.create_issue(surfacing).unwrap();

    let ids = |opts: ListIssuesOptions| -> Vec<String> {
        let mut ids: Vec<String> = db.list_issues(&opts).unwrap().into_iter().map(|i| i.id).collect();
        ids.sort();
        ids
    };
    let sorted = |mut v: Vec<String>| {
        v.sort();
        v
    };

    assert_eq!(
        ids(ListIssuesOptions {
            exclude_deferred: true,
            ..ListIssuesOptions::default()
        }),
        sorted(vec![plain.id.clone(), expired.id.clone(), surfacing.id.clone()])
    );
    assert_eq!(
        ids(ListIssuesOptions {
            surfacing_only: true,
            ..ListIssuesOptions::default()
        }),
        vec![surfacing.id.clone()]
    );
    assert_eq!(
        ids(ListIssuesOptions {
            deferred_only: true,
            ..ListIssuesOptions::default()
        }),
        vec![future.id]
    );
}
