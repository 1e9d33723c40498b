//! td-core library.
//!
//! Local issue storage on SQLite with a cross-process write lock and an
//! append-only action log.
//!
//! # Conventions
//!
//! - **Errors**: [`Error`] and [`Result`] for every fallible operation.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`).
//! - **Writes**: every mutation goes through [`db::Database`] and holds the
//!   write lock for its whole duration. Reads never take the lock.

pub mod config;
pub mod db;
pub mod error;
pub mod ids;
pub mod lock;
pub mod model;
pub mod process;
pub mod sideband;
pub mod timestamp;

pub use db::Database;
pub use error::{Error, ErrorCode, Result};

/// Project data directory, relative to the base directory.
pub const TODOS_DIR: &str = ".todos";

/// Database file name inside [`TODOS_DIR`].
pub const DB_FILE: &str = "issues.db";
