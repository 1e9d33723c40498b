//! Bottom-up status propagation from children to their epic.

use super::issues::{children_of, load_issue, update_issue_in};
use super::{Database, Journal};
use crate::error::{Error, Result};
use crate::ids::normalize_issue_id;
use crate::model::{ActionType, Issue, IssueType, Log, LogType, Status};
use rusqlite::Connection;
use tracing::{debug, info};

/// Move the parent of `issue_id` to `target` when it is an epic whose every
/// child has reached it. Returns the updated parent, if any.
fn cascade_step(
    conn: &Connection,
    issue_id: &str,
    target: Status,
    journal: Journal<'_>,
) -> Result<Option<Issue>> {
    let Some(issue) = load_issue(conn, issue_id, false)? else {
        return Ok(None);
    };
    let Some(parent_id) = issue.parent_id else {
        return Ok(None);
    };
    let Some(mut parent) = load_issue(conn, &parent_id, false)? else {
        return Ok(None);
    };
    if parent.issue_type != IssueType::Epic
        || parent.status == target
        || parent.status == Status::Closed
    {
        return Ok(None);
    }

    let children = children_of(conn, &parent.id)?;
    if children.is_empty() {
        return Ok(None);
    }
    if let Some(lagging) = children.iter().find(|child| !child.status.satisfies(target)) {
        debug!(parent = %parent.id, child = %lagging.id, status = %lagging.status, "cascade blocked");
        return Ok(None);
    }

    parent.status = target;
    update_issue_in(conn, &parent, Some(journal)).map(Some)
}

impl Database {
    /// Propagate `target` (`in_review` or `closed`) up the epic chain above
    /// `issue_id`. Each parent is updated and journaled in one write; its
    /// "Auto-cascaded" progress log follows in a separate write.
    ///
    /// Returns how many parents moved and their ids, nearest first.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for any other target status.
    pub fn cascade_up_parent_status(
        &self,
        issue_id: &str,
        target: Status,
        session_id: &str,
    ) -> Result<(usize, Vec<String>)> {
        let action_type = match target {
            Status::InReview => ActionType::Review,
            Status::Closed => ActionType::Close,
            other => {
                return Err(Error::invalid(format!("cannot cascade status {other}")));
            }
        };

        let mut cascaded: Vec<String> = Vec::new();
        let mut current = normalize_issue_id(issue_id);
        loop {
            let journal = Journal::new(session_id, action_type);
            let Some(parent) = self.mutate(|conn| cascade_step(conn, &current, target, journal))?
            else {
                break;
            };
            let message = format!("Auto-cascaded to {target}: all children reached {target}");
            self.add_log(Log::new(&parent.id, session_id, &message, LogType::Progress))?;
            info!(parent = %parent.id, child = %current, %target, "cascaded parent status");
            cascaded.push(parent.id.clone());
            current = parent.id;
        }
        Ok((cascaded.len(), cascaded))
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::temp_db;
    use crate::model::{Issue, IssueType, Status};

    fn child_of(db: &crate::Database, parent: &str, title: &str) -> Issue {
        let mut issue = Issue::new(title);
        issue.parent_id = Some(parent.to_string());
        db.create_issue(issue).unwrap()
    }

    fn epic(db: &crate::Database, title: &str, parent: Option<&str>) -> Issue {
        let mut issue = Issue::new(title);
        issue.issue_type = IssueType::Epic;
        issue.parent_id = parent.map(str::to_string);
        db.create_issue(issue).unwrap()
    }

    #[test]
    fn waits_for_every_child() {
        let (_dir, db) = temp_db();
        let parent = epic(&db, "epic", None);
        let mut first = child_of(&db, &parent.id, "one");
        child_of(&db, &parent.id, "two");

        first.status = Status::InReview;
        db.update_issue(&first).unwrap();
        let (count, ids) = db
            .cascade_up_parent_status(&first.id, Status::InReview, "s1")
            .unwrap();
        assert_eq!(count, 0);
        assert!(ids.is_empty());
        assert_eq!(db.get_issue(&parent.id).unwrap().status, Status::Open);
    }

    #[test]
    fn closing_climbs_nested_epics() {
        let (_dir, db) = temp_db();
        let top = epic(&db, "top", None);
        let middle = epic(&db, "middle", Some(&top.id));
        let mut leaf = child_of(&db, &middle.id, "leaf");
        leaf.status = Status::Closed;
        db.update_issue(&leaf).unwrap();

        let (count, ids) = db
            .cascade_up_parent_status(&leaf.id, Status::Closed, "s1")
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(ids, [middle.id.clone(), top.id.clone()]);
        let top = db.get_issue(&top.id).unwrap();
        assert_eq!(top.status, Status::Closed);
        assert!(top.closed_at.is_some());
        assert_eq!(db.get_logs(&middle.id, None).unwrap().len(), 1);
    }

    #[test]
    fn non_epic_parents_are_left_alone() {
        let (_dir, db) = temp_db();
        let parent = db.create_issue(Issue::new("plain task")).unwrap();
        let mut child = child_of(&db, &parent.id, "child");
        child.status = Status::Closed;
        db.update_issue(&child).unwrap();
        let (count, _) = db
            .cascade_up_parent_status(&child.id, Status::Closed, "s1")
            .unwrap();
        assert_eq!(count, 0);
        assert!(
            db.cascade_up_parent_status(&child.id, Status::Open, "s1")
                .is_err()
        );
    }
}
