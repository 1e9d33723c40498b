//! Canonical `SQLite` schema for the issue store.
//!
//! [`BASE_SCHEMA_SQL`] is the version-1 layout and is applied on every open
//! with `IF NOT EXISTS`. Everything added after version 1 lives in
//! [`super::migrations::MIGRATIONS`]; a fresh database is base schema plus
//! the full migration chain.

/// Schema version reached after all migrations have run. Equal to the last
/// entry in the migration list.
pub const SCHEMA_VERSION: u32 = 14;

/// Version-1 tables.
pub const BASE_SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS issues (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT DEFAULT '',
    status TEXT NOT NULL DEFAULT 'open',
    type TEXT NOT NULL DEFAULT 'task',
    priority TEXT NOT NULL DEFAULT 'P2',
    points INTEGER DEFAULT 0,
    labels TEXT DEFAULT '',
    parent_id TEXT,
    acceptance TEXT DEFAULT '',
    implementer_session TEXT,
    reviewer_session TEXT,
    created_at DATETIME NOT NULL,
    updated_at DATETIME NOT NULL,
    closed_at DATETIME,
    deleted_at DATETIME
);

CREATE TABLE IF NOT EXISTS logs (
    id TEXT PRIMARY KEY,
    issue_id TEXT DEFAULT '',
    session_id TEXT NOT NULL DEFAULT '',
    work_session_id TEXT,
    message TEXT NOT NULL,
    type TEXT NOT NULL DEFAULT 'progress',
    timestamp DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS handoffs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id TEXT NOT NULL,
    session_id TEXT NOT NULL DEFAULT '',
    done TEXT DEFAULT '[]',
    remaining TEXT DEFAULT '[]',
    decisions TEXT DEFAULT '[]',
    uncertain TEXT DEFAULT '[]',
    timestamp DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS git_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id TEXT NOT NULL,
    event TEXT NOT NULL,
    commit_sha TEXT NOT NULL DEFAULT '',
    branch TEXT NOT NULL DEFAULT '',
    dirty_files INTEGER DEFAULT 0,
    timestamp DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS issue_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id TEXT NOT NULL,
    file_path TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'implementation',
    linked_sha TEXT DEFAULT '',
    linked_at DATETIME NOT NULL,
    UNIQUE(issue_id, file_path)
);

CREATE TABLE IF NOT EXISTS issue_dependencies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id TEXT NOT NULL,
    depends_on_id TEXT NOT NULL,
    relation_type TEXT NOT NULL DEFAULT 'depends_on',
    UNIQUE(issue_id, depends_on_id, relation_type)
);

CREATE TABLE IF NOT EXISTS work_sessions (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    session_id TEXT NOT NULL DEFAULT '',
    started_at DATETIME NOT NULL,
    ended_at DATETIME,
    start_sha TEXT DEFAULT '',
    end_sha TEXT DEFAULT ''
);

CREATE TABLE IF NOT EXISTS work_session_issues (
    work_session_id TEXT NOT NULL,
    issue_id TEXT NOT NULL,
    tagged_at DATETIME NOT NULL,
    PRIMARY KEY (work_session_id, issue_id)
);

CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id TEXT NOT NULL,
    session_id TEXT NOT NULL DEFAULT '',
    text TEXT NOT NULL,
    created_at DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

pub const MIGRATION_V2_ACTION_LOG_SQL: &str = r"
CREATE TABLE IF NOT EXISTS action_log (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL DEFAULT '',
    action_type TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    previous_data TEXT NOT NULL DEFAULT '',
    new_data TEXT NOT NULL DEFAULT '',
    timestamp TEXT NOT NULL,
    undone INTEGER NOT NULL DEFAULT 0
);
";

pub const MIGRATION_V3_SESSION_HISTORY_SQL: &str = r"
CREATE TABLE IF NOT EXISTS issue_session_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    action TEXT NOT NULL,
    created_at DATETIME NOT NULL
);
";

/// Boards and explicit positions. Positions get composite ids in version 12.
pub const MIGRATION_V7_BOARDS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS boards (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL COLLATE NOCASE UNIQUE,
    query TEXT NOT NULL DEFAULT '',
    is_builtin INTEGER NOT NULL DEFAULT 0,
    view_mode TEXT NOT NULL DEFAULT 'swimlanes',
    last_viewed_at DATETIME,
    created_at DATETIME NOT NULL,
    updated_at DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS board_issue_positions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    board_id TEXT NOT NULL,
    issue_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    added_at DATETIME NOT NULL,
    UNIQUE(board_id, issue_id),
    UNIQUE(board_id, position)
);

INSERT OR IGNORE INTO boards (id, name, query, is_builtin, view_mode, created_at, updated_at)
VALUES (
    'bd-all-issues',
    'All Issues',
    '',
    1,
    'swimlanes',
    strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
    strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
);
";

pub const MIGRATION_V8_SESSIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    branch TEXT NOT NULL DEFAULT '',
    agent_type TEXT NOT NULL DEFAULT '',
    agent_pid INTEGER,
    context_id TEXT NOT NULL DEFAULT '',
    previous_session_id TEXT,
    started_at DATETIME NOT NULL,
    ended_at DATETIME,
    last_activity DATETIME
);
";

pub const MIGRATION_V10_SYNC_SQL: &str = r"
CREATE TABLE IF NOT EXISTS sync_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    project_id TEXT NOT NULL,
    last_pushed_action_id INTEGER NOT NULL DEFAULT 0,
    last_pulled_server_seq INTEGER NOT NULL DEFAULT 0,
    last_sync_at DATETIME,
    sync_disabled INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS sync_conflicts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    server_seq INTEGER NOT NULL,
    local_data TEXT NOT NULL DEFAULT '',
    remote_data TEXT NOT NULL DEFAULT '',
    overwritten_at TEXT NOT NULL
);
";

pub const MIGRATION_V11_INDEXES_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
CREATE INDEX IF NOT EXISTS idx_issues_priority ON issues(priority);
CREATE INDEX IF NOT EXISTS idx_issues_parent ON issues(parent_id);
CREATE INDEX IF NOT EXISTS idx_issues_deleted ON issues(deleted_at);
CREATE INDEX IF NOT EXISTS idx_logs_issue ON logs(issue_id);
CREATE INDEX IF NOT EXISTS idx_logs_work_session ON logs(work_session_id);
CREATE INDEX IF NOT EXISTS idx_handoffs_issue ON handoffs(issue_id);
CREATE INDEX IF NOT EXISTS idx_comments_issue ON comments(issue_id);
CREATE INDEX IF NOT EXISTS idx_deps_depends_on ON issue_dependencies(depends_on_id);
CREATE INDEX IF NOT EXISTS idx_action_log_session ON action_log(session_id, undone);
CREATE INDEX IF NOT EXISTS idx_action_log_pending ON action_log(synced_at, undone);
CREATE INDEX IF NOT EXISTS idx_session_history_issue ON issue_session_history(issue_id, session_id);
CREATE INDEX IF NOT EXISTS idx_board_positions_board ON board_issue_positions(board_id, position);
";

/// Composite-id tables. Version 12 copies rows from the autoincrement
/// layout into these and swaps the tables.
pub const COMPOSITE_DEPENDENCIES_SQL: &str = r"
CREATE TABLE issue_dependencies_next (
    id TEXT PRIMARY KEY,
    issue_id TEXT NOT NULL,
    depends_on_id TEXT NOT NULL,
    relation_type TEXT NOT NULL DEFAULT 'depends_on',
    UNIQUE(issue_id, depends_on_id, relation_type)
);
";

pub const COMPOSITE_FILES_SQL: &str = r"
CREATE TABLE issue_files_next (
    id TEXT PRIMARY KEY,
    issue_id TEXT NOT NULL,
    file_path TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'implementation',
    linked_sha TEXT DEFAULT '',
    linked_at DATETIME NOT NULL,
    UNIQUE(issue_id, file_path)
);
";

pub const COMPOSITE_POSITIONS_SQL: &str = r"
CREATE TABLE board_issue_positions_next (
    id TEXT PRIMARY KEY,
    board_id TEXT NOT NULL,
    issue_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    added_at DATETIME NOT NULL,
    UNIQUE(board_id, issue_id),
    UNIQUE(board_id, position)
);
";

pub const MIGRATION_V13_NOTES_SQL: &str = r"
CREATE TABLE IF NOT EXISTS notes (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    pinned INTEGER NOT NULL DEFAULT 0,
    created_at DATETIME NOT NULL,
    updated_at DATETIME NOT NULL,
    deleted_at DATETIME
);
CREATE INDEX IF NOT EXISTS idx_notes_deleted ON notes(deleted_at);
";

/// Indexes expected on a fully migrated database.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_issues_status",
    "idx_issues_priority",
    "idx_issues_parent",
    "idx_issues_deleted",
    "idx_logs_issue",
    "idx_action_log_session",
    "idx_action_log_pending",
    "idx_session_history_issue",
    "idx_board_positions_board",
    "idx_notes_deleted",
];
