//! Replaying one node's journal on another reproduces its state.

use td_core::Database;
use td_core::db::query::ListIssuesOptions;
use td_core::model::{ActionType, FileRole, Issue, Note, Status, ViewMode};
use tempfile::TempDir;

fn fresh() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::initialize(dir.path()).unwrap();
    (dir, db)
}

/// Every issue, with the delete stamp reduced to a flag: a replayed delete
/// carries no image, so the target stamps its own time.
fn all_issues(db: &Database) -> Vec<(bool, Issue)> {
    db.list_issues(&ListIssuesOptions {
        include_deleted: true,
        sort_by: Some("id".into()),
        ..ListIssuesOptions::default()
    })
    .unwrap()
    .into_iter()
    .map(|mut issue| {
        let deleted = issue.deleted_at.take().is_some();
        if deleted {
            issue.updated_at = chrono::DateTime::default();
        }
        (deleted, issue)
    })
    .collect()
}

#[test]
fn replayed_journal_matches_source() {
    let (_src_dir, source) = fresh();
    let session = "s1";

    let parent = source.create_issue_logged(Issue::new("parent"), session).unwrap();
    let mut child = Issue::new("child");
    child.parent_id = Some(parent.id.clone());
    let mut child = source.create_issue_logged(child, session).unwrap();
    child.status = Status::InProgress;
    let child = source
        .update_issue_logged(&child, session, ActionType::Start)
        .unwrap();
    let doomed = source.create_issue_logged(Issue::new("doomed"), session).unwrap();
    source.delete_issue_logged(&doomed.id, session).unwrap();

    source
        .add_dependency_logged(&child.id, &parent.id, "", session)
        .unwrap();
    source
        .add_dependency_logged(&parent.id, &doomed.id, "", session)
        .unwrap();
    source
        .remove_dependency_logged(&parent.id, &doomed.id, "", session)
        .unwrap();
    source
        .link_file_logged(&child.id, "src/a.rs", FileRole::Implementation, "abc", session)
        .unwrap();
    source
        .link_file_logged(&child.id, "tests/a.rs", FileRole::Test, "", session)
        .unwrap();
    source
        .unlink_file_logged(&child.id, "tests/a.rs", session)
        .unwrap();

    let mut note = source
        .create_note_logged(Note::new("plan", "draft"), session)
        .unwrap();
    note.pinned = true;
    source.update_note_logged(&note, session).unwrap();

    let board = source
        .create_board_logged("work", "status = open", ViewMode::Backlog, session)
        .unwrap();
    for (issue, position) in [(&parent.id, 0), (&child.id, 0), (&doomed.id, 1)] {
        source
            .set_issue_position_logged(&board.id, issue, position, session)
            .unwrap();
    }
    source
        .remove_issue_position_logged(&board.id, &doomed.id, session)
        .unwrap();

    // replay everything pending, in journal order
    let (_dst_dir, target) = fresh();
    let actions = source.get_actions_after(0, 1000).unwrap();
    assert!(actions.windows(2).all(|pair| pair[0].seq < pair[1].seq));
    for action in &actions {
        assert!(target.apply_action(action).unwrap(), "{action:?}");
    }

    let issues = all_issues(&source);
    assert_eq!(issues.iter().filter(|(deleted, _)| *deleted).count(), 1);
    assert_eq!(all_issues(&target), issues);
    assert_eq!(
        target.get_dependencies(&child.id).unwrap(),
        source.get_dependencies(&child.id).unwrap()
    );
    assert!(target.get_dependencies(&parent.id).unwrap().is_empty());
    assert_eq!(
        target.get_linked_files(&child.id).unwrap(),
        source.get_linked_files(&child.id).unwrap()
    );
    assert_eq!(target.list_notes().unwrap(), source.list_notes().unwrap());
    assert_eq!(target.get_board(&board.id).unwrap(), source.get_board(&board.id).unwrap());

    let slots = |db: &Database| -> Vec<(String, String, i64)> {
        db.get_board_issue_positions(&board.id)
            .unwrap()
            .into_iter()
            .map(|p| (p.id, p.issue_id, p.position))
            .collect()
    };
    assert_eq!(slots(&target), slots(&source));

    // the target journal stays empty, so nothing would be pushed back
    assert_eq!(target.count_pending_events().unwrap(), 0);
}
