//! Subcommand handlers. Each opens the database at the base directory,
//! does one thing, and renders the result.

use crate::output::{kv, render, rule, section};
use anyhow::Context;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use td_core::Database;
use td_core::model::ActionLog;
use tracing::info;

fn open(base_dir: &Path) -> anyhow::Result<Database> {
    Database::open(base_dir)
        .with_context(|| format!("opening td database in {}", base_dir.display()))
}

#[derive(Debug, Serialize)]
struct SchemaReport {
    path: String,
    schema_version: u32,
    migrations_applied: usize,
}

fn schema_human(report: &SchemaReport, w: &mut dyn Write) -> std::io::Result<()> {
    kv(w, "database", &report.path)?;
    kv(w, "schema", report.schema_version.to_string())?;
    kv(w, "migrations", report.migrations_applied.to_string())
}

pub fn run_init(base_dir: &Path, json: bool) -> anyhow::Result<()> {
    let db = Database::initialize(base_dir)
        .with_context(|| format!("initializing td database in {}", base_dir.display()))?;
    let report = SchemaReport {
        path: td_core::db::db_path(base_dir).display().to_string(),
        schema_version: db.schema_version()?,
        migrations_applied: 0,
    };
    info!(path = %report.path, version = report.schema_version, "initialized");
    render(json, &report, schema_human)
}

pub fn run_migrate(base_dir: &Path, json: bool) -> anyhow::Result<()> {
    let db = open(base_dir)?;
    let report = SchemaReport {
        path: td_core::db::db_path(base_dir).display().to_string(),
        schema_version: db.schema_version()?,
        migrations_applied: db.run_migrations()?,
    };
    render(json, &report, schema_human)
}

pub fn run_stats(base_dir: &Path, json: bool) -> anyhow::Result<()> {
    let db = open(base_dir)?;
    let stats = db.get_extended_stats()?;
    render(json, &stats, |stats, w| {
        section(w, "Issues")?;
        kv(w, "total", stats.total.to_string())?;
        kv(w, "deleted", stats.deleted.to_string())?;
        for (status, count) in &stats.by_status {
            kv(w, status, count.to_string())?;
        }
        kv(
            w,
            "points",
            format!(
                "{}/{} ({:.0}%)",
                stats.completed_points,
                stats.total_points,
                stats.completion_rate()
            ),
        )?;
        kv(w, "created today", stats.created_today.to_string())?;
        kv(w, "closed today", stats.closed_today.to_string())?;
        rule(w)?;
        kv(w, "logs", stats.total_logs.to_string())?;
        kv(w, "handoffs", stats.total_handoffs.to_string())?;
        kv(w, "comments", stats.total_comments.to_string())?;
        kv(w, "pending sync", stats.pending_actions.to_string())
    })
}

fn action_line(action: &ActionLog, w: &mut dyn Write) -> std::io::Result<()> {
    let undone = if action.undone { " (undone)" } else { "" };
    writeln!(
        w,
        "{:>5}  {}  {:<8} {:<14} {}{}",
        action.seq,
        action.timestamp,
        action.action_type.as_str(),
        action.entity_type.as_str(),
        action.entity_id,
        undone
    )
}

#[allow(clippy::ptr_arg)]
fn action_lines(actions: &Vec<ActionLog>, w: &mut dyn Write) -> std::io::Result<()> {
    if actions.is_empty() {
        return writeln!(w, "no actions");
    }
    for action in actions {
        action_line(action, w)?;
    }
    Ok(())
}

pub fn run_actions(
    base_dir: &Path,
    session: Option<&str>,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let db = open(base_dir)?;
    let actions = db.get_recent_actions(session, limit)?;
    render(json, &actions, action_lines)
}

#[derive(Debug, Serialize)]
struct PendingReport {
    pending: i64,
    actions: Vec<ActionLog>,
}

pub fn run_pending(base_dir: &Path, limit: usize, json: bool) -> anyhow::Result<()> {
    let db = open(base_dir)?;
    let report = PendingReport {
        pending: db.count_pending_events()?,
        actions: db.get_actions_after(0, limit)?,
    };
    render(json, &report, |report, w| {
        kv(w, "pending", report.pending.to_string())?;
        if !report.actions.is_empty() {
            rule(w)?;
            action_lines(&report.actions, w)?;
        }
        Ok(())
    })
}

#[derive(Debug, Serialize)]
struct UndoReport<'a> {
    id: &'a str,
    undone: bool,
}

pub fn run_undo_mark(base_dir: &Path, action_id: &str, json: bool) -> anyhow::Result<()> {
    let db = open(base_dir)?;
    db.mark_action_undone(action_id)?;
    info!(action = action_id, "marked undone");
    let report = UndoReport {
        id: action_id,
        undone: true,
    };
    render(json, &report, |report, w| writeln!(w, "marked {} undone", report.id))
}
