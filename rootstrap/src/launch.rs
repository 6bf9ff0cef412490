//! Interactive sandbox session via proot.
//!
//! The guest is entered as root (`-0`) with `/root` as the working
//! directory. Host `/dev`, `/sys`, `/proc` and the resolver config are
//! bind-mounted, sandboxed processes are killed when proot exits, and the
//! locale is forced to `C` so guest tools never see a host locale they lack.

#![cfg(unix)]

use std::path::Path;
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::bundle::SandboxBundle;
use crate::error::{ChildExit, Error, Result};

/// Host paths exposed inside the guest at the same location.
const BIND_MOUNTS: &[&str] = &["/dev", "/sys", "/proc", "/etc/resolv.conf"];

/// Locale variables forced for the guest.
const LOCALE_ENV: &[(&str, &str)] = &[("LC_ALL", "C"), ("LANG", "C"), ("LANGUAGE", "C")];

/// Guest home directory.
const GUEST_WORKDIR: &str = "/root";

/// First command inside the guest: list available shells, then hand over.
const GUEST_COMMAND: &[&str] = &["bash", "-c", "cat /etc/shells && bash"];

/// Fixed proot invocation for entering a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLaunchSpec {
    /// Host paths bind-mounted into the guest.
    binds: Vec<String>,
    /// Working directory inside the guest.
    workdir: String,
    /// Present as uid 0 inside the guest.
    root_id: bool,
    /// Kill every sandboxed process when proot exits.
    kill_on_exit: bool,
    /// Environment overrides on top of the inherited environment.
    env: Vec<(String, String)>,
    /// Guest command and arguments.
    command: Vec<String>,
}

impl Default for SandboxLaunchSpec {
    fn default() -> Self {
        Self {
            binds: BIND_MOUNTS.iter().map(|s| (*s).to_owned()).collect(),
            workdir: GUEST_WORKDIR.to_owned(),
            root_id: true,
            kill_on_exit: true,
            env: LOCALE_ENV
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            command: GUEST_COMMAND.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

/// How the interactive session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionExit(pub ChildExit);

impl SessionExit {
    /// Returns `true` if the guest shell exited with status 0.
    pub const fn success(self) -> bool {
        self.0.success()
    }
}

impl SandboxLaunchSpec {
    /// Host paths bind-mounted into the guest.
    pub fn binds(&self) -> &[String] {
        &self.binds
    }

    /// Environment overrides.
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Builds the proot command line for `bundle`.
    pub fn command(&self, bundle: &SandboxBundle) -> Command {
        self.command_for(&bundle.sandbox_binary(), bundle.root())
    }

    /// Builds the command line for an explicit sandbox binary and rootfs.
    pub fn command_for(&self, program: &Path, rootfs: &Path) -> Command {
        let mut cmd = Command::new(program);

        let mut rootfs_arg = std::ffi::OsString::from("--rootfs=");
        rootfs_arg.push(rootfs);
        cmd.arg(rootfs_arg);

        if self.root_id {
            cmd.arg("-0");
        }
        cmd.args(["-w", self.workdir.as_str()]);
        for bind in &self.binds {
            cmd.args(["-b", bind.as_str()]);
        }
        if self.kill_on_exit {
            cmd.arg("--kill-on-exit");
        }
        cmd.args(&self.command);

        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd
    }

    /// Runs the sandbox in the foreground, sharing this terminal.
    ///
    /// Blocks until the guest shell exits. `SIGINT` and `SIGQUIT` are caught
    /// for the duration so that Ctrl-C only reaches the guest.
    pub fn launch(&self, bundle: &SandboxBundle) -> Result<SessionExit> {
        let program = bundle.sandbox_binary();
        let mut cmd = self.command(bundle);
        tracing::info!(program = %program.display(), rootfs = %bundle.root().display(), "entering sandbox");

        let status = {
            let _guard = InterruptGuard::install()?;
            cmd.status().map_err(|source| Error::Launch {
                program: program.clone(),
                source,
            })?
        };
        Ok(report(status))
    }
}

/// Logs and wraps the session's exit status.
fn report(status: ExitStatus) -> SessionExit {
    let exit = SessionExit(ChildExit::from(status));
    if exit.success() {
        tracing::info!("sandbox session ended");
    } else {
        tracing::warn!(exit = %exit.0, "sandbox session ended with non-zero status");
    }
    exit
}

/// Keeps terminal interrupts from terminating this process while a
/// foreground child owns the terminal.
struct InterruptGuard {
    /// Registered handler ids.
    ids: Vec<signal_hook::SigId>,
}

impl InterruptGuard {
    fn install() -> Result<Self> {
        let flag = Arc::new(AtomicBool::new(false));
        let mut ids = Vec::with_capacity(2);
        for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGQUIT] {
            ids.push(signal_hook::flag::register(sig, Arc::clone(&flag))?);
        }
        Ok(Self { ids })
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}
