//! Bundle retrieval: clean slate, clone, installer permissions.
//!
//! A bundle directory is never reused: whatever is at the destination is
//! removed first, and a directory that survives removal is fatal.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::bundle::SandboxBundle;
use crate::error::{ChildExit, Error, FetchCause, Result};

/// Retrieves a bundle into a local directory.
pub trait Fetch {
    /// Populates `dest` (which does not exist) from `source`.
    fn fetch(&self, source: &str, dest: &Path) -> Result<()>;
}

/// Fetches by running `<program> clone <source> <dest>`.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    /// The clone program (`git` unless overridden).
    program: PathBuf,
}

impl GitFetcher {
    /// Uses `program` for cloning.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new("git")
    }
}

impl Fetch for GitFetcher {
    fn fetch(&self, source: &str, dest: &Path) -> Result<()> {
        tracing::info!(%source, dest = %dest.display(), "cloning bundle");
        let status = Command::new(&self.program)
            .arg("clone")
            .arg(source)
            .arg(dest)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| Error::FetchFailure {
                url: source.to_owned(),
                cause: FetchCause::Spawn(e),
            })?;
        if !status.success() {
            return Err(Error::FetchFailure {
                url: source.to_owned(),
                cause: FetchCause::Exit(ChildExit::from(status)),
            });
        }
        Ok(())
    }
}

/// Removes `dir` recursively if present and verifies it is gone.
pub fn remove_stale(dir: &Path) -> Result<()> {
    if dir.symlink_metadata().is_err() {
        return Ok(());
    }
    tracing::info!(path = %dir.display(), "removing existing bundle directory");
    let removed = if dir.is_dir() && !dir.is_symlink() {
        fs::remove_dir_all(dir)
    } else {
        fs::remove_file(dir)
    };
    if let Err(e) = removed {
        tracing::warn!(path = %dir.display(), "removal failed: {e}");
    }
    if dir.symlink_metadata().is_ok() {
        return Err(Error::StaleBundle {
            path: dir.to_path_buf(),
        });
    }
    Ok(())
}

/// Sets the installer's mode to `0o755`.
pub fn make_executable(path: &Path) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|source| {
        Error::PermissionSetup {
            path: path.to_path_buf(),
            source,
        }
    })?;
    tracing::debug!(path = %path.display(), "installer marked executable");
    Ok(())
}

/// Produces a fresh bundle: remove, fetch, then mark the installer executable.
pub fn prepare(fetcher: &impl Fetch, source: &str, bundle: &SandboxBundle) -> Result<()> {
    remove_stale(bundle.root())?;
    fetcher.fetch(source, bundle.root())?;
    if !bundle.root().is_dir() {
        return Err(Error::FetchFailure {
            url: source.to_owned(),
            cause: FetchCause::Spawn(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} was not created", bundle.root().display()),
            )),
        });
    }
    make_executable(&bundle.installer_path())
}
