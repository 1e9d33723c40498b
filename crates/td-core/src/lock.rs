//! Cross-process write lock for the `.todos` data directory.
//!
//! Every mutation holds `<baseDir>/.todos/lock` exclusively for the duration
//! of its entity write and journal append. The lock file carries a single
//! holder line, `pid:<n> since:<RFC-3339>`, so a waiter that times out can
//! say who is in the way.
//!
//! Exclusion comes from the OS primitive (`flock` on unix, `LockFileEx` on
//! Windows, both through `fs2`). Unlinking a lock file whose recorded holder
//! is dead only helps a waiter get past a wedged file; it is not what makes
//! the lock safe.

use crate::error::ErrorCode;
use crate::process::pid_alive;
use crate::timestamp;
use fs2::FileExt;
use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io::{self, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// Lock timeout used when the project config does not override it.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

const RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// File name of the lock token inside `.todos/`.
pub const LOCK_FILE: &str = "lock";

/// Diagnostic metadata written by the current lock holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    pub pid: u32,
    pub since: String,
}

impl LockHolder {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            since: timestamp::action_log_timestamp_now(),
        }
    }

    /// Parse a `pid:<n> since:<ts>` holder line.
    ///
    /// The `since` part is optional so that truncated writes still yield a pid.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut pid = None;
        let mut since = String::new();
        for part in line.split_whitespace() {
            if let Some(raw) = part.strip_prefix("pid:") {
                pid = raw.parse().ok();
            } else if let Some(raw) = part.strip_prefix("since:") {
                raw.clone_into(&mut since);
            }
        }
        Some(Self { pid: pid?, since })
    }
}

impl fmt::Display for LockHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid:{} since:{}", self.pid, self.since)
    }
}

/// Write-lock errors.
#[derive(Debug)]
pub enum LockError {
    Timeout {
        path: PathBuf,
        waited: Duration,
        holder: Option<LockHolder>,
    },
    IoError(io::Error),
}

impl From<io::Error> for LockError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockTimeout,
            Self::IoError(_) => ErrorCode::IoFailed,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout {
                path,
                waited,
                holder,
            } => {
                write!(
                    f,
                    "{}: write lock timeout after {:?} at {} (held by ",
                    self.code().code(),
                    waited,
                    path.display()
                )?;
                match holder {
                    Some(holder) => write!(f, "{holder})"),
                    None => f.write_str("pid:unknown)"),
                }
            }
            Self::IoError(err) => write!(f, "{}: {}", self.code().code(), err),
        }
    }
}

impl std::error::Error for LockError {}

/// Path of the lock token for a project rooted at `base_dir`.
#[must_use]
pub fn lock_path(base_dir: &Path) -> PathBuf {
    base_dir.join(crate::TODOS_DIR).join(LOCK_FILE)
}

/// Read the holder line from a lock file, if it names one.
#[must_use]
pub fn read_holder(path: &Path) -> Option<LockHolder> {
    let content = fs::read_to_string(path).ok()?;
    content.lines().next().and_then(LockHolder::parse)
}

/// RAII guard for the project-wide exclusive write lock.
#[derive(Debug)]
pub struct WriteLock {
    file: Option<File>,
    path: PathBuf,
    holder: LockHolder,
    acquired: Instant,
}

impl WriteLock {
    /// Acquire the write lock for the project rooted at `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] when `timeout` elapses first, or
    /// [`LockError::IoError`] when the lock file cannot be opened.
    pub fn acquire(base_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        Self::acquire_path(&lock_path(base_dir), timeout)
    }

    /// Acquire an exclusive lock on an explicit lock-file path.
    ///
    /// # Errors
    ///
    /// Same as [`WriteLock::acquire`].
    pub fn acquire_path(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "lock path has no parent")
        })?;
        fs::create_dir_all(parent)?;

        let start = Instant::now();
        let mut last_holder = None;
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)?;

            if FileExt::try_lock_exclusive(&file).is_ok() {
                let holder = LockHolder::current();
                let mut file = file;
                if let Err(err) = write_holder(&mut file, &holder) {
                    tracing::warn!(path = %path.display(), error = %err, "failed to record lock holder");
                }
                tracing::debug!(path = %path.display(), waited = ?start.elapsed(), "write lock acquired");
                return Ok(Self {
                    file: Some(file),
                    path: path.to_path_buf(),
                    holder,
                    acquired: Instant::now(),
                });
            }
            drop(file);

            let holder = read_holder(path);
            let stale = holder.as_ref().filter(|h| !pid_alive(h.pid));
            if let Some(stale) = stale {
                if start.elapsed() < timeout && steal_stale(path, stale) {
                    continue;
                }
            }
            if holder.is_some() {
                last_holder = holder;
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                    holder: last_holder,
                });
            }

            thread::sleep(RETRY_INTERVAL);
        }
    }

    /// Explicitly release the lock. Release also happens automatically on drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    /// Holder metadata this guard wrote into the lock file.
    #[must_use]
    pub const fn holder(&self) -> &LockHolder {
        &self.holder
    }

    /// Return the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Time since the lock was acquired.
    #[must_use]
    pub fn held_for(&self) -> Duration {
        self.acquired.elapsed()
    }

    fn release_inner(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        if let Err(err) = file.set_len(0) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to clear lock holder");
        }
        if let Err(err) = FileExt::unlock(&file) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release write lock");
        }
        tracing::debug!(path = %self.path.display(), held = ?self.acquired.elapsed(), "write lock released");
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

fn write_holder(file: &mut File, holder: &LockHolder) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{holder}")?;
    file.flush()
}

fn steal_stale(path: &Path, stale: &LockHolder) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), holder = %stale, "removed lock file of dead holder");
            true
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove stale lock file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LockError, LockHolder, WriteLock, read_holder};
    use crate::error::ErrorCode;
    use std::{
        fs,
        sync::{Arc, Barrier},
        thread,
        time::{Duration, Instant},
    };

    #[test]
    fn acquire_writes_holder_metadata() -> Result<(), LockError> {
        let dir = tempfile::tempdir()?;
        let lock = WriteLock::acquire(dir.path(), Duration::from_millis(50))?;

        let holder = read_holder(lock.path()).expect("holder line");
        assert_eq!(holder.pid, std::process::id());
        assert_eq!(&holder, lock.holder());
        assert!(holder.since.contains('T') && holder.since.ends_with('Z'));
        lock.release();
        Ok(())
    }

    #[test]
    fn release_clears_holder_line() -> Result<(), LockError> {
        let dir = tempfile::tempdir()?;
        let lock = WriteLock::acquire(dir.path(), Duration::from_millis(50))?;
        let path = lock.path().to_path_buf();
        lock.release();

        assert_eq!(fs::read_to_string(path)?, "");
        Ok(())
    }

    #[test]
    fn timeout_names_holder_pid() {
        let dir = tempfile::tempdir().unwrap();
        let _held = WriteLock::acquire(dir.path(), Duration::from_millis(50)).unwrap();

        let started = Instant::now();
        let err = WriteLock::acquire(dir.path(), Duration::from_millis(40)).unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(40));

        let text = err.to_string();
        assert!(text.contains("timeout"), "{text}");
        assert!(text.contains(&format!("pid:{}", std::process::id())), "{text}");
        assert_eq!(err.code(), ErrorCode::LockTimeout);
        assert!(err.hint().is_some());
    }

    #[test]
    fn timeout_without_holder_still_mentions_pid() {
        let err = LockError::Timeout {
            path: "/tmp/x/.todos/lock".into(),
            waited: Duration::from_millis(5),
            holder: None,
        };
        assert!(err.to_string().contains("pid:unknown"));
    }

    #[test]
    fn stale_metadata_without_os_lock_is_overwritten() -> Result<(), LockError> {
        let dir = tempfile::tempdir()?;
        let path = super::lock_path(dir.path());
        fs::create_dir_all(path.parent().unwrap())?;
        fs::write(&path, "pid:2147483646 since:2020-01-01T00:00:00Z\n")?;

        let lock = WriteLock::acquire(dir.path(), Duration::from_millis(50))?;
        assert_eq!(read_holder(&path).unwrap().pid, std::process::id());
        lock.release();
        Ok(())
    }

    #[test]
    fn holder_line_parses_partial_writes() {
        assert_eq!(
            LockHolder::parse("pid:42 since:2026-01-01T00:00:00Z"),
            Some(LockHolder {
                pid: 42,
                since: "2026-01-01T00:00:00Z".into()
            })
        );
        assert_eq!(LockHolder::parse("pid:42").map(|h| h.pid), Some(42));
        assert_eq!(LockHolder::parse("garbage"), None);
        assert_eq!(LockHolder::parse(""), None);
    }

    #[test]
    fn contention_is_resolved_after_writer_releases() -> Result<(), LockError> {
        let dir = tempfile::tempdir()?;
        let base = dir.path().to_path_buf();

        let blocker = Arc::new(Barrier::new(2));
        let waiter = Arc::new(Barrier::new(2));

        let blocker_thread = Arc::clone(&blocker);
        let waiter_thread = Arc::clone(&waiter);
        let base_in_thread = base.clone();
        let handle = thread::spawn(move || {
            let _writer = WriteLock::acquire(&base_in_thread, Duration::from_millis(200)).unwrap();
            blocker_thread.wait();
            waiter_thread.wait();
        });

        blocker.wait();
        assert!(matches!(
            WriteLock::acquire(&base, Duration::from_millis(20)),
            Err(LockError::Timeout { .. })
        ));
        waiter.wait();
        handle.join().unwrap();

        let follow_up = WriteLock::acquire(&base, Duration::from_millis(50))?;
        follow_up.release();
        Ok(())
    }
}
