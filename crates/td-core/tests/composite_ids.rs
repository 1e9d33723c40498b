//! Deterministic join-row ids and path normalization.

use proptest::prelude::*;
use td_core::ids::{
    board_issue_pos_id, dependency_id, issue_file_id, normalize_file_path_for_id, to_repo_relative,
};

#[test]
fn equivalent_paths_share_an_id() {
    let plain = issue_file_id("td-a", "a/b");
    assert_eq!(plain, issue_file_id("td-a", "a/./b"));
    assert_eq!(plain, issue_file_id("td-a", "a/x/../b"));
    assert_eq!(
        issue_file_id("td-a", "src/main.go"),
        issue_file_id("td-a", "src\\main.go")
    );
    assert_eq!(normalize_file_path_for_id("src\\main.go"), "src/main.go");
}

#[test]
fn dependency_ids_are_stable() {
    let id = dependency_id("td-a", "td-b", "depends_on");
    assert!(id.starts_with("dep_"));
    assert_eq!(id, dependency_id("td-a", "td-b", "depends_on"));
    assert_ne!(id, dependency_id("td-b", "td-a", "depends_on"));
    assert_ne!(board_issue_pos_id("bd-1", "td-a"), board_issue_pos_id("bd-2", "td-a"));
}

#[test]
fn repo_relative_paths() {
    let root = tempfile::tempdir().unwrap();
    let nested = root.path().join("src").join("lib.rs");
    assert_eq!(to_repo_relative(&nested, root.path()).unwrap(), "src/lib.rs");

    let outside = tempfile::tempdir().unwrap();
    assert!(to_repo_relative(&outside.path().join("x.rs"), root.path()).is_err());
}

fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9_]{1,6}"
}

proptest! {
    #[test]
    fn dot_segments_do_not_change_ids(parts in prop::collection::vec(segment(), 1..5)) {
        let clean = parts.join("/");
        let dotted = parts.join("/./");
        let detoured = format!("{}/zz/../{}", parts[0], parts[1..].join("/"));
        let detoured = detoured.trim_end_matches('/').to_string();

        prop_assert_eq!(issue_file_id("td-x", &clean), issue_file_id("td-x", &dotted));
        prop_assert_eq!(issue_file_id("td-x", &clean), issue_file_id("td-x", &detoured));
        prop_assert_eq!(normalize_file_path_for_id(&clean.replace('/', "\\")), clean);
    }

    #[test]
    fn ids_are_fixed_width_hex(a in "[a-f0-9]{8}", b in "[a-f0-9]{8}") {
        let id = dependency_id(&format!("td-{a}"), &format!("td-{b}"), "depends_on");
        let hex = id.trim_start_matches("dep_");
        prop_assert_eq!(hex.len(), 16);
        prop_assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
