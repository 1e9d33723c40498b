use std::fmt;
use std::path::PathBuf;

use crate::lock::LockError;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    NotFound,
    Conflict,
    Immutable,
    InvalidInput,
    Serialization,
    Storage,
    IoFailed,
    LockTimeout,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::NotFound => "E2001",
            Self::Conflict => "E2002",
            Self::Immutable => "E2003",
            Self::InvalidInput => "E2004",
            Self::Serialization => "E3001",
            Self::Storage => "E3002",
            Self::IoFailed => "E5001",
            Self::LockTimeout => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::NotFound => "Row not found",
            Self::Conflict => "Unique ID conflict",
            Self::Immutable => "Entity is immutable",
            Self::InvalidInput => "Invalid input",
            Self::Serialization => "Stored JSON could not be decoded",
            Self::Storage => "Database error",
            Self::IoFailed => "Filesystem write failed",
            Self::LockTimeout => "Write lock timeout",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `td init` to create .todos/issues.db."),
            Self::ConfigParseError => Some("Fix syntax in .todos/config.toml and retry."),
            Self::NotFound | Self::InvalidInput => None,
            Self::Conflict => Some("Retry the command; a fresh ID will be drawn."),
            Self::Immutable => Some("Builtin boards cannot be edited or deleted."),
            Self::Serialization => Some("The stored row is damaged; inspect it with sqlite3."),
            Self::Storage => Some("Retry once. If persistent, check .todos/issues.db integrity."),
            Self::IoFailed => Some("Check disk space and write permissions."),
            Self::LockTimeout => Some("Retry after the other `td` process releases its lock."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `.todos/issues.db` is missing and the caller asked to open, not create.
    #[error("database not found: {}", path.display())]
    NotInitialized { path: PathBuf },

    /// The cross-process write lock could not be acquired.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Row lookup by id returned nothing.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Every generated id collided with an existing row.
    #[error("failed to generate unique {entity} ID")]
    IdExhausted { entity: &'static str },

    /// Builtin rows refuse mutation.
    #[error("cannot modify builtin {entity}: {id}")]
    Immutable { entity: &'static str, id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A JSON column could not be decoded.
    #[error("failed to unmarshal {field}: {source}")]
    Unmarshal {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::Lock(err) => err.code(),
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::IdExhausted { .. } => ErrorCode::Conflict,
            Self::Immutable { .. } => ErrorCode::Immutable,
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::Unmarshal { .. } | Self::Json(_) => ErrorCode::Serialization,
            Self::Config { .. } => ErrorCode::ConfigParseError,
            Self::Sqlite(_) => ErrorCode::Storage,
            Self::Io(_) => ErrorCode::IoFailed,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// `true` when this error is a lookup miss.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result alias used across td-core.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// `true` when a SQLite error is a UNIQUE / PRIMARY KEY violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
