//! Append-only JSONL side logs under `.todos/`.
//!
//! These files sit beside the database but never touch it or the write lock.
//! A project without a `.todos/` directory gets no side logs at all: appends
//! are dropped rather than creating the directory.

pub mod agent_errors;
pub mod usage;

use crate::TODOS_DIR;
use crate::error::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::warn;

/// Replacement text for sensitive values.
pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_MARKERS: &[&str] = &[
    "password", "token", "secret", "key", "cred", "auth", "api-key", "private",
];

/// Append `record` as one line to `.todos/<file_name>`. Returns `false`
/// without writing when `.todos/` does not exist.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or written.
pub fn append_jsonl<T: Serialize>(base_dir: &Path, file_name: &str, record: &T) -> Result<bool> {
    let dir = base_dir.join(TODOS_DIR);
    if !dir.is_dir() {
        return Ok(false);
    }

    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(file_name))?;
    file.write_all(&line)?;
    file.flush()?;
    Ok(true)
}

/// Read every decodable line of `.todos/<file_name>`. A missing file is
/// empty; blank lines are ignored and malformed ones skipped with a warning.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_jsonl<T: DeserializeOwned>(base_dir: &Path, file_name: &str) -> Result<Vec<T>> {
    let path = base_dir.join(TODOS_DIR).join(file_name);
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(fs::File::open(&path)?);
    let mut records = Vec::new();
    for (index, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        if line.trim_ascii().is_empty() {
            continue;
        }
        match serde_json::from_slice::<T>(&line) {
            Ok(record) => records.push(record),
            Err(err) => {
                warn!(file = file_name, line = index + 1, error = %err, "skipping malformed line");
            }
        }
    }
    Ok(records)
}

/// Whether a flag or field name looks like it carries a credential.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.trim_start_matches('-').to_ascii_lowercase();
    SENSITIVE_MARKERS.iter().any(|marker| key.contains(marker))
}

/// Copy of `flags` with sensitive values replaced by [`REDACTED`].
#[must_use]
pub fn redact_flags(flags: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    flags
        .iter()
        .map(|(key, value)| {
            let value = if is_sensitive_key(key) {
                REDACTED.to_string()
            } else {
                value.clone()
            };
            (key.clone(), value)
        })
        .collect()
}

/// Redact raw command-line arguments. Handles `--flag=value` and
/// `--flag value`; a following argument that is itself a flag is kept.
#[must_use]
pub fn redact_args(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut redact_next = false;
    for arg in args {
        if redact_next && !arg.starts_with('-') {
            out.push(REDACTED.to_string());
            redact_next = false;
            continue;
        }
        redact_next = false;

        if !arg.starts_with('-') {
            out.push(arg.clone());
            continue;
        }
        match arg.split_once('=') {
            Some((flag, _)) if is_sensitive_key(flag) => out.push(format!("{flag}={REDACTED}")),
            Some(_) => out.push(arg.clone()),
            None => {
                redact_next = is_sensitive_key(arg);
                out.push(arg.clone());
            }
        }
    }
    out
}
