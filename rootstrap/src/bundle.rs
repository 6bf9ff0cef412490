//! On-disk bundle layout and post-install validation.

use std::io;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Error, Result};

/// Guest shell that must exist once the installer has unpacked the rootfs.
const GUEST_SHELL: &str = "bin/sh";

/// A bundle directory: installer, runtime files and, after installation,
/// the guest filesystem tree plus the sandbox binary.
///
/// All paths are absolute and derived from [`root`](Self::root); nothing in
/// the pipeline changes the process working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxBundle {
    /// Absolute bundle root.
    root: PathBuf,
    /// Installer script file name.
    installer: String,
    /// Sandbox binary, relative to `root`.
    sandbox_binary: PathBuf,
}

impl SandboxBundle {
    /// Describes the bundle at `root` (which need not exist yet).
    pub fn new(
        root: impl AsRef<Path>,
        installer: impl Into<String>,
        sandbox_binary: impl Into<PathBuf>,
    ) -> io::Result<Self> {
        Ok(Self {
            root: std::path::absolute(root)?,
            installer: installer.into(),
            sandbox_binary: sandbox_binary.into(),
        })
    }

    /// Describes the bundle named by `config`.
    pub fn from_config(config: &Config) -> io::Result<Self> {
        Self::new(&config.bundle_dir, &config.installer, &config.sandbox_binary)
    }

    /// Bundle root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Installer file name, as passed to `bash`.
    pub fn installer_name(&self) -> &str {
        &self.installer
    }

    /// Absolute installer path.
    pub fn installer_path(&self) -> PathBuf {
        self.root.join(&self.installer)
    }

    /// Absolute path of the guest shell.
    pub fn shell_path(&self) -> PathBuf {
        self.root.join(GUEST_SHELL)
    }

    /// Absolute path of the sandbox binary.
    pub fn sandbox_binary(&self) -> PathBuf {
        self.root.join(&self.sandbox_binary)
    }

    /// Checks that installation produced the guest shell and the sandbox
    /// binary.
    ///
    /// The shell may be a symlink into the guest tree, so only its presence
    /// is checked (dangling links included). The sandbox binary must be a
    /// regular file.
    pub fn validate(&self) -> Result<()> {
        let shell = self.shell_path();
        if shell.symlink_metadata().is_err() {
            return Err(Error::MissingArtifact { path: shell });
        }
        tracing::info!(path = %shell.display(), "guest shell present");

        let proot = self.sandbox_binary();
        if !proot.is_file() {
            return Err(Error::MissingArtifact { path: proot });
        }
        tracing::info!(path = %proot.display(), "sandbox binary present");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    fn layout(dir: &Path) -> SandboxBundle {
        SandboxBundle::new(dir, "root.sh", "usr/local/bin/proot").unwrap()
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn paths_are_rooted() {
        let b = SandboxBundle::new("freeroot", "root.sh", "usr/local/bin/proot").unwrap();
        assert!(b.root().is_absolute());
        assert!(b.root().ends_with("freeroot"));
        assert_eq!(b.installer_path(), b.root().join("root.sh"));
        assert_eq!(b.shell_path(), b.root().join("bin/sh"));
        assert_eq!(b.sandbox_binary(), b.root().join("usr/local/bin/proot"));
    }

    #[test]
    fn complete_bundle_validates() {
        let dir = tempfile::tempdir().unwrap();
        let b = layout(dir.path());
        touch(&b.shell_path());
        touch(&b.sandbox_binary());
        b.validate().unwrap();
    }

    #[test]
    fn missing_shell_is_reported_first() {
        let dir = tempfile::tempdir().unwrap();
        let b = layout(dir.path());
        touch(&b.sandbox_binary());
        match b.validate() {
            Err(Error::MissingArtifact { path }) => assert_eq!(path, b.shell_path()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn sandbox_binary_must_be_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let b = layout(dir.path());
        touch(&b.shell_path());
        fs::create_dir_all(b.sandbox_binary()).unwrap();
        match b.validate() {
            Err(Error::MissingArtifact { path }) => assert_eq!(path, b.sandbox_binary()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn shell_symlink_into_guest_counts() {
        let dir = tempfile::tempdir().unwrap();
        let b = layout(dir.path());
        touch(&b.sandbox_binary());
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        std::os::unix::fs::symlink("dash", b.shell_path()).unwrap();
        b.validate().unwrap();
    }
}
