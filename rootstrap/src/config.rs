//! Bootstrap settings and JSON persistence.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default bundle repository.
pub const DEFAULT_SOURCE: &str = "https://github.com/foxytouxxx/freeroot.git";

/// Longest accepted stage timeout: one day.
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Settings for one bootstrap run.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct Config {
    /// Repository the bundle is cloned from.
    pub source: String,
    /// Local bundle directory (relative paths resolve against the CWD).
    pub bundle_dir: PathBuf,
    /// Installer script name inside the bundle.
    pub installer: String,
    /// Program used for the fetch (invoked as `<program> clone <src> <dir>`).
    pub fetch_program: PathBuf,
    /// Seconds to wait for the install confirmation prompt.
    pub confirm_timeout_secs: u64,
    /// Seconds to wait for the completion banner after confirming.
    pub install_timeout_secs: u64,
    /// Sandbox binary path relative to the bundle root.
    pub sandbox_binary: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_owned(),
            bundle_dir: PathBuf::from("freeroot"),
            installer: "root.sh".to_owned(),
            fetch_program: PathBuf::from("git"),
            confirm_timeout_secs: 60,
            install_timeout_secs: 600,
            sandbox_binary: PathBuf::from("usr/local/bin/proot"),
        }
    }
}

impl Config {
    /// Loads settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects values that would make the pipeline meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.source.is_empty() {
            return Err(Error::Config("source must not be empty".into()));
        }
        if self.bundle_dir.as_os_str().is_empty() {
            return Err(Error::Config("bundle_dir must not be empty".into()));
        }
        if self.installer.is_empty() || self.installer.contains('/') {
            return Err(Error::Config(format!(
                "installer must be a bare file name, got {:?}",
                self.installer
            )));
        }
        if self.sandbox_binary.is_absolute() {
            return Err(Error::Config(
                "sandbox_binary must be relative to the bundle root".into(),
            ));
        }
        if self.confirm_timeout_secs == 0 || self.install_timeout_secs == 0 {
            return Err(Error::Config("timeouts must be at least one second".into()));
        }
        if self.confirm_timeout_secs.max(self.install_timeout_secs) > MAX_TIMEOUT_SECS {
            return Err(Error::Config(format!(
                "timeouts must not exceed {MAX_TIMEOUT_SECS} seconds"
            )));
        }
        Ok(())
    }

    /// Deadline for the confirmation prompt.
    pub const fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    /// Deadline for the completion banner.
    pub const fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }
}
