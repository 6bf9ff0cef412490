//! PTY-based installer spawning and teardown.

#![allow(unsafe_code)]

use std::ffi::OsStr;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::pty::{OpenptyResult, Winsize, openpty};
use nix::sys::signal::{Signal, killpg};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::ChildExit;

/// Terminal size presented to the installer.
const WINSIZE: Winsize = Winsize {
    ws_row: 24,
    ws_col: 80,
    ws_xpixel: 0,
    ws_ypixel: 0,
};

/// A child process whose stdio is the slave side of a fresh PTY.
#[derive(Debug)]
pub struct PtyChild {
    /// Process state of the child.
    process: Process,
    /// Reader for the PTY master (stdout and stderr merged).
    master_read: tokio::fs::File,
    /// Writer for the PTY master (child's stdin).
    master_write: tokio::fs::File,
}

/// Spawns `program args..` in `cwd` with a PTY as its controlling terminal.
///
/// The child gets a new session (`setsid`), so the whole installer process
/// group can be signalled at once, and it dies with SIGKILL if this process
/// exits first.
pub fn spawn<S: AsRef<OsStr>>(program: &Path, args: &[S], cwd: &Path) -> io::Result<PtyChild> {
    let OpenptyResult { master, slave } =
        openpty(Some(&WINSIZE), None).map_err(|e| io::Error::other(format!("openpty: {e}")))?;

    // Neither end may leak into the child beyond its stdio.
    set_cloexec(&master)?;
    set_cloexec(&slave)?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::from(dup_fd(&slave, "stdin")?))
        .stdout(Stdio::from(dup_fd(&slave, "stdout")?))
        .stderr(Stdio::from(dup_fd(&slave, "stderr")?));

    // SAFETY: setsid, ioctl and prctl are async-signal-safe.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(io::Error::other)?;
            if libc::ioctl(0, libc::TIOCSCTTY, 0) == -1 {
                return Err(io::Error::last_os_error());
            }
            #[cfg(target_os = "linux")]
            libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL);
            Ok(())
        });
    }

    let child = cmd.spawn()?;
    #[allow(clippy::cast_possible_wrap)]
    let pid = Pid::from_raw(child.id() as i32);

    // Close slave in parent so EOF (EIO) arrives when the child side closes.
    drop(cmd);
    drop(slave);

    let read_fd = dup_fd(&master, "master_read")?;
    Ok(PtyChild {
        process: Process { pid, exit: None },
        master_read: tokio::fs::File::from_std(std::fs::File::from(read_fd)),
        master_write: tokio::fs::File::from_std(std::fs::File::from(master)),
    })
}

impl PtyChild {
    /// Child PID.
    pub const fn pid(&self) -> i32 {
        self.process.pid.as_raw()
    }

    /// Reads the next chunk of terminal output. `Ok(0)` means closed.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.master_read.read(buf).await {
            // Linux reports a hung-up PTY master as EIO.
            Err(e) if e.raw_os_error() == Some(libc::EIO) => Ok(0),
            other => other,
        }
    }

    /// Types `line` followed by a newline.
    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.master_write.write_all(line.as_bytes()).await?;
        self.master_write.write_all(b"\n").await?;
        self.master_write.flush().await
    }

    /// Reaps the child if it has exited, without blocking.
    pub fn try_wait(&mut self) -> io::Result<Option<ChildExit>> {
        self.process.try_wait()
    }

    /// Kills the installer's process group and reaps the child.
    pub async fn kill(&mut self) -> io::Result<ChildExit> {
        self.process.kill().await
    }

    /// Waits for the child to exit on its own.
    pub async fn wait(&mut self) -> io::Result<ChildExit> {
        self.process.wait().await
    }

    /// Hangs up the terminal and gives the installer `grace` to exit before
    /// killing it.
    pub async fn close(self, grace: Duration) -> io::Result<ChildExit> {
        let Self {
            mut process,
            master_read,
            mut master_write,
        } = self;
        let _ = master_write.flush().await;
        drop(master_read);
        drop(master_write);

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if let Some(exit) = process.try_wait()? {
                return Ok(exit);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tracing::debug!(pid = process.pid.as_raw(), "installer ignored hangup, killing");
        process.kill().await
    }
}

/// Liveness and exit bookkeeping for a spawned child.
#[derive(Debug)]
struct Process {
    /// Child PID (also its session and process-group id).
    pid: Pid,
    /// Exit status, once reaped.
    exit: Option<ChildExit>,
}

impl Process {
    fn try_wait(&mut self) -> io::Result<Option<ChildExit>> {
        if self.exit.is_some() {
            return Ok(self.exit);
        }
        let status = waitpid(self.pid, Some(WaitPidFlag::WNOHANG)).map_err(io::Error::from)?;
        self.exit = exit_of(status);
        Ok(self.exit)
    }

    async fn kill(&mut self) -> io::Result<ChildExit> {
        if let Some(exit) = self.try_wait()? {
            return Ok(exit);
        }
        match killpg(self.pid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => return Err(e.into()),
        }
        self.wait().await
    }

    async fn wait(&mut self) -> io::Result<ChildExit> {
        if let Some(exit) = self.try_wait()? {
            return Ok(exit);
        }
        let pid = self.pid;
        let exit = tokio::task::spawn_blocking(move || {
            loop {
                match waitpid(pid, None) {
                    Ok(status) => {
                        if let Some(exit) = exit_of(status) {
                            return Ok(exit);
                        }
                    }
                    Err(Errno::EINTR) => {}
                    Err(e) => return Err(io::Error::from(e)),
                }
            }
        })
        .await
        .map_err(io::Error::other)??;
        self.exit = Some(exit);
        Ok(exit)
    }
}

/// Maps a terminal wait status to a [`ChildExit`].
fn exit_of(status: WaitStatus) -> Option<ChildExit> {
    match status {
        WaitStatus::Exited(_, code) => Some(ChildExit::Code(code)),
        WaitStatus::Signaled(_, sig, _) => Some(ChildExit::Signal(sig as i32)),
        _ => None,
    }
}

/// Duplicates an `OwnedFd` (close-on-exec) with a descriptive error context.
fn dup_fd(fd: &OwnedFd, label: &str) -> io::Result<OwnedFd> {
    fd.try_clone()
        .map_err(|e| io::Error::new(e.kind(), format!("dup {label}: {e}")))
}

/// Sets `FD_CLOEXEC` on a file descriptor.
fn set_cloexec(fd: &OwnedFd) -> io::Result<()> {
    // SAFETY: fcntl(F_SETFD) on a valid, owned descriptor.
    let ret = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) };
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}
