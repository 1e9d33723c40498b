use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Environment switch for the command-usage sideband log.
pub const ANALYTICS_ENV: &str = "TD_ANALYTICS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long a mutation waits for the write lock. Also used as the SQLite
    /// busy timeout.
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl LockConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

/// Load `.todos/config.toml` under `base_dir`; a missing file yields defaults.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read or parsed.
pub fn load_project_config(base_dir: &Path) -> Result<ProjectConfig> {
    let path = base_dir.join(crate::TODOS_DIR).join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    toml::from_str::<ProjectConfig>(&content).map_err(|err| Error::Config {
        path,
        message: err.to_string(),
    })
}

/// Interpret a `TD_ANALYTICS` value. `None` means "not set".
#[must_use]
pub fn analytics_flag_from(value: Option<&str>) -> Option<bool> {
    let value = value?;
    match value.trim().to_ascii_lowercase().as_str() {
        "false" | "0" | "off" | "no" => Some(false),
        _ => Some(true),
    }
}

/// Whether command-usage logging is enabled for the project at `base_dir`.
///
/// `TD_ANALYTICS` wins when set; otherwise the project config decides. An
/// unreadable config falls back to enabled.
#[must_use]
pub fn analytics_enabled(base_dir: &Path) -> bool {
    let from_env = env::var(ANALYTICS_ENV).ok();
    if let Some(flag) = analytics_flag_from(from_env.as_deref()) {
        return flag;
    }
    load_project_config(base_dir).map_or(true, |config| config.analytics.enabled)
}

/// Write-lock timeout for the project at `base_dir`, falling back to the
/// default when the config cannot be read.
#[must_use]
pub fn lock_timeout(base_dir: &Path) -> Duration {
    load_project_config(base_dir).map_or(crate::lock::DEFAULT_LOCK_TIMEOUT, |config| {
        config.lock.timeout()
    })
}

const fn default_lock_timeout_ms() -> u64 {
    500
}

const fn default_true() -> bool {
    true
}
