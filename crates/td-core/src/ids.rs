//! Identifier factory.
//!
//! Primary entities get random prefixed ids (`td-1a2b3c4d`, `ws-9f0e`, ...)
//! drawn from the OS CSPRNG. Callers retry on collision.
//!
//! Join rows (dependencies, file links, board positions) get deterministic
//! composite ids: BLAKE3 over the normalized natural key, truncated to 16 hex
//! chars. The same key yields the same id on every platform, so a replicated
//! `remove` can address a row that no longer exists locally.

use crate::error::{Error, Result};
use rand::RngCore;
use rand::rngs::OsRng;
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

pub const ISSUE_PREFIX: &str = "td-";
pub const WORK_SESSION_PREFIX: &str = "ws-";
pub const BOARD_PREFIX: &str = "bd-";
pub const NOTE_PREFIX: &str = "nt-";
pub const LOG_PREFIX: &str = "lg-";
pub const ACTION_PREFIX: &str = "al-";

const DEPENDENCY_PREFIX: &str = "dep_";
const BOARD_POSITION_PREFIX: &str = "bip_";
const ISSUE_FILE_PREFIX: &str = "ifl_";
const COMPOSITE_HEX_LEN: usize = 16;

/// Relation used when a dependency does not name one.
pub const DEFAULT_RELATION: &str = "depends_on";

fn random_hex(chars: usize) -> String {
    let mut bytes = vec![0_u8; chars.div_ceil(2)];
    OsRng.fill_bytes(&mut bytes);
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out.truncate(chars);
    out
}

/// New issue id: `td-` + 8 hex chars.
#[must_use]
pub fn generate_id() -> String {
    format!("{ISSUE_PREFIX}{}", random_hex(8))
}

/// New work-session id: `ws-` + 4 hex chars.
#[must_use]
pub fn generate_ws_id() -> String {
    format!("{WORK_SESSION_PREFIX}{}", random_hex(4))
}

/// New board id: `bd-` + 8 hex chars.
#[must_use]
pub fn generate_board_id() -> String {
    format!("{BOARD_PREFIX}{}", random_hex(8))
}

/// New note id: `nt-` + 8 hex chars.
#[must_use]
pub fn generate_note_id() -> String {
    format!("{NOTE_PREFIX}{}", random_hex(8))
}

/// New log-entry id: `lg-` + 8 hex chars.
#[must_use]
pub fn generate_log_id() -> String {
    format!("{LOG_PREFIX}{}", random_hex(8))
}

/// New action-log id: `al-` + 8 hex chars.
#[must_use]
pub fn generate_action_id() -> String {
    format!("{ACTION_PREFIX}{}", random_hex(8))
}

fn composite_id(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (idx, part) in parts.iter().enumerate() {
        if idx > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_bytes());
    }
    let hex = hasher.finalize().to_hex();
    format!("{prefix}{}", &hex[..COMPOSITE_HEX_LEN])
}

/// Deterministic id of the dependency `issue -> depends_on` with `relation`.
///
/// An empty relation is treated as [`DEFAULT_RELATION`].
#[must_use]
pub fn dependency_id(issue_id: &str, depends_on_id: &str, relation: &str) -> String {
    let relation = if relation.trim().is_empty() {
        DEFAULT_RELATION
    } else {
        relation.trim()
    };
    composite_id(
        DEPENDENCY_PREFIX,
        &[
            &normalize_issue_id(issue_id),
            &normalize_issue_id(depends_on_id),
            relation,
        ],
    )
}

/// Deterministic id of an issue's slot on a board.
#[must_use]
pub fn board_issue_pos_id(board_id: &str, issue_id: &str) -> String {
    composite_id(
        BOARD_POSITION_PREFIX,
        &[board_id.trim(), &normalize_issue_id(issue_id)],
    )
}

/// Deterministic id of a file linked to an issue.
///
/// The path goes through [`normalize_file_path_for_id`], so `a/./b`,
/// `a/x/../b` and `a\b` all address the same row.
#[must_use]
pub fn issue_file_id(issue_id: &str, path: &str) -> String {
    composite_id(
        ISSUE_FILE_PREFIX,
        &[&normalize_issue_id(issue_id), &normalize_file_path_for_id(path)],
    )
}

/// Prepend `td-` to a bare issue id. Empty input stays empty.
#[must_use]
pub fn normalize_issue_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with(ISSUE_PREFIX) {
        trimmed.to_string()
    } else {
        format!("{ISSUE_PREFIX}{trimmed}")
    }
}

/// Lexically clean a path and render it with `/` separators.
///
/// `.` segments vanish, `..` pops the previous segment when there is one,
/// backslashes are separators. An empty result is `.`.
#[must_use]
pub fn normalize_file_path_for_id(raw: &str) -> String {
    let slashed = raw.replace('\\', "/");
    let rooted = slashed.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for segment in slashed.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Express `path` relative to `root` with forward slashes.
///
/// Relative inputs are resolved against `root`. The comparison is lexical.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] when the cleaned path escapes `root`.
pub fn to_repo_relative(path: &Path, root: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let cleaned = clean_path(&absolute);
    let root = clean_path(root);

    let relative = cleaned.strip_prefix(&root).map_err(|_| {
        Error::invalid(format!(
            "path {} is outside repository root {}",
            path.display(),
            root.display()
        ))
    })?;

    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        Ok(".".to_string())
    } else {
        Ok(parts.join("/"))
    }
}
