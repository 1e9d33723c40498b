//! Row types for every table the store owns.
//!
//! Closed vocabularies (status, type, priority, roles, action tags) are Rust
//! enums that round-trip through their lowercase text form in SQLite and JSON.

/// Declare a text-backed enum with `as_str`, `Display`, `FromStr`, serde, and
/// rusqlite conversions. Parsing is case-insensitive.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            /// Every variant in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::Error;

            fn from_str(s: &str) -> crate::error::Result<Self> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($text) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(crate::error::Error::InvalidInput(format!(
                    "unknown {} '{s}'",
                    stringify!($name)
                )))
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|err| rusqlite::types::FromSqlError::Other(Box::new(err)))
            }
        }
    };
}

pub(crate) use text_enum;

pub mod action;
pub mod activity;
pub mod board;
pub mod issue;
pub mod link;
pub mod note;
pub mod session;

pub use action::{ActionLog, ActionType, EntityType, SyncConflict, SyncState};
pub use activity::{Comment, GitSnapshot, Handoff, Log, LogType, SnapshotEvent};
pub use board::{Board, BoardIssuePosition, ViewMode};
pub use issue::{Issue, IssueType, Priority, Status};
pub use link::{Dependency, FileRole, IssueFile};
pub use note::Note;
pub use session::{IssueSessionHistory, Session, WorkSession};
