//! Prompt-driven installer orchestration.
//!
//! The installer expects a human at a real terminal, so it runs under a PTY.
//! Its output is mirrored to the operator while an ordered list of
//! [`PromptRule`]s is matched against it, one stage at a time:
//!
//! ```text
//! Started ─spawn─▶ Awaiting(0) ─match─▶ Awaiting(1) ─match─▶ … ─▶ Completed
//!                       │                    │
//!                       └─deadline / EOF─────┴──▶ TimedOut
//! spawn failure / abnormal exit ─▶ Crashed
//! ```
//!
//! Every stage has its own deadline. When a deadline elapses the installer's
//! process group is killed and reaped before the error is returned.

#![cfg(unix)]

mod pty;
mod rule;

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;

pub use self::pty::PtyChild;
pub use self::rule::{COMPLETION_PATTERN, CONFIRM_PATTERN, PromptRule, default_rules};
use crate::bundle::SandboxBundle;
use crate::error::{ChildExit, Error, Result};

/// Cap on the unmatched-output buffer kept for matching and diagnostics.
const PENDING_CAP: usize = 8 * 1024;

/// Time an installer gets to exit after its terminal is hung up.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Installer session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Phase {
    /// Nothing spawned yet.
    Started,
    /// Waiting for the rule at this index to match.
    Awaiting(usize),
    /// Every rule matched.
    Completed,
    /// A deadline elapsed or the output closed before a match.
    TimedOut,
    /// The installer could not be spawned, died abnormally, or was interrupted.
    Crashed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => f.write_str("started"),
            Self::Awaiting(i) => write!(f, "awaiting[{i}]"),
            Self::Completed => f.write_str("completed"),
            Self::TimedOut => f.write_str("timed-out"),
            Self::Crashed => f.write_str("crashed"),
        }
    }
}

/// Result of a successful installer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Every state the session passed through, in order.
    pub transitions: Vec<Phase>,
    /// Number of scripted responses written to the installer.
    pub responses_sent: usize,
    /// Exit status if the installer had already exited cleanly when the
    /// final rule matched; `None` if it was still running and got closed.
    pub exited: Option<ChildExit>,
}

/// Drives an installer through its prompt rules.
///
/// Holding the orchestrator mutably for the duration of [`run`](Self::run)
/// guarantees a single active session.
#[derive(Debug)]
pub struct Orchestrator<W> {
    /// Ordered dialogue.
    rules: Vec<PromptRule>,
    /// Operator-visible copy of the installer output.
    mirror: W,
    /// States of the most recent session, failed or not.
    history: Vec<Phase>,
}

impl<W: Write> Orchestrator<W> {
    /// Creates an orchestrator for `rules`, mirroring output to `mirror`.
    pub const fn new(rules: Vec<PromptRule>, mirror: W) -> Self {
        Self {
            rules,
            mirror,
            history: Vec::new(),
        }
    }

    /// States visited by the most recent session.
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    /// Gives back the mirror sink.
    pub fn into_mirror(self) -> W {
        self.mirror
    }

    /// Runs `bash <installer>` inside the bundle directory.
    pub async fn run(&mut self, bundle: &SandboxBundle) -> Result<InstallReport> {
        self.run_command(Path::new("bash"), &[bundle.installer_name()], bundle.root())
            .await
    }

    /// Runs an arbitrary installer command under a PTY.
    pub async fn run_command(
        &mut self,
        program: &Path,
        args: &[&str],
        cwd: &Path,
    ) -> Result<InstallReport> {
        self.history = vec![Phase::Started];

        let child = match pty::spawn(program, args, cwd) {
            Ok(c) => c,
            Err(e) => {
                self.history.push(Phase::Crashed);
                return Err(Error::ProcessCrash(e));
            }
        };
        tracing::info!(pid = child.pid(), program = %program.display(), "installer started");

        let mut session = InstallSession {
            child,
            pending: Vec::new(),
            responses_sent: 0,
        };
        let outcome = self.drive(&mut session).await;
        match outcome {
            Ok(()) => self.finish(session).await,
            Err(e) => {
                if let Err(kill_err) = session.child.kill().await {
                    tracing::warn!("failed to reap installer: {kill_err}");
                }
                self.history.push(match e {
                    Error::PromptTimeout { .. } | Error::StreamClosed { .. } => Phase::TimedOut,
                    _ => Phase::Crashed,
                });
                Err(e)
            }
        }
    }

    /// Walks the rules in order until all match or one fails.
    async fn drive(&mut self, session: &mut InstallSession) -> Result<()> {
        let interrupt = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        tokio::pin!(interrupt);

        let mut buf = [0u8; 4096];
        for idx in 0..self.rules.len() {
            self.history.push(Phase::Awaiting(idx));
            let rule = &self.rules[idx];
            let Some(deadline) = Instant::now().checked_add(rule.timeout()) else {
                return Err(Error::Config(format!(
                    "timeout for stage {} is out of range: {:?}",
                    rule.stage(),
                    rule.timeout()
                )));
            };
            tracing::info!(stage = rule.stage(), timeout = ?rule.timeout(), "waiting for prompt");

            loop {
                if let Some(end) = rule.pattern().find(&session.pending).map(|m| m.end()) {
                    session.pending.drain(..end);
                    break;
                }

                let event = tokio::select! {
                    biased;
                    () = &mut interrupt => Event::Interrupted,
                    r = tokio::time::timeout_at(deadline, session.child.read(&mut buf)) => match r {
                        Err(_) => Event::Deadline,
                        Ok(Ok(0)) => Event::Closed,
                        Ok(Ok(n)) => Event::Output(n),
                        Ok(Err(e)) => {
                            tracing::debug!("installer read failed: {e}");
                            Event::Closed
                        }
                    },
                };

                match event {
                    Event::Output(n) => {
                        let _ = self.mirror.write_all(&buf[..n]);
                        let _ = self.mirror.flush();
                        session.push(&buf[..n]);
                    }
                    Event::Deadline => {
                        let exit = session.child.kill().await?;
                        tracing::warn!(stage = rule.stage(), %exit, "prompt deadline elapsed, installer killed");
                        return Err(Error::PromptTimeout {
                            stage: rule.stage().to_owned(),
                            output: session.tail(),
                        });
                    }
                    Event::Closed => {
                        let exit = session.child.kill().await?;
                        tracing::warn!(stage = rule.stage(), %exit, "installer output closed early");
                        return Err(Error::StreamClosed {
                            stage: rule.stage().to_owned(),
                            output: session.tail(),
                        });
                    }
                    Event::Interrupted => {
                        session.child.kill().await?;
                        return Err(Error::Interrupted {
                            stage: rule.stage().to_owned(),
                        });
                    }
                }
            }

            tracing::info!(stage = rule.stage(), "prompt matched");
            if let Some(line) = rule.response() {
                session.child.send_line(line).await?;
                session.responses_sent += 1;
                tracing::info!(stage = rule.stage(), response = line, "response sent");
            }
        }
        Ok(())
    }

    /// Confirms the installer is either still alive or exited cleanly, then
    /// releases it.
    async fn finish(&mut self, mut session: InstallSession) -> Result<InstallReport> {
        let exited = match settle(session.child.try_wait()?) {
            Settled::Running => {
                let pid = session.child.pid();
                let exit = session.child.close(CLOSE_GRACE).await?;
                tracing::info!(pid, %exit, "installer closed");
                None
            }
            Settled::Clean(exit) => {
                tracing::info!(%exit, "installer already exited");
                Some(exit)
            }
            Settled::Died(exit) => {
                tracing::error!(%exit, "installer died after the completion banner");
                self.history.push(Phase::Crashed);
                return Err(Error::InstallerExited {
                    exit,
                    output: session.tail(),
                });
            }
        };
        self.history.push(Phase::Completed);
        Ok(InstallReport {
            transitions: self.history.clone(),
            responses_sent: session.responses_sent,
            exited,
        })
    }
}

/// Installer state once the final rule has matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    /// Still running; it gets hung up on.
    Running,
    /// Already exited with status 0.
    Clean(ChildExit),
    /// Exited non-zero or by signal.
    Died(ChildExit),
}

/// Classifies the installer's status after the completion banner.
const fn settle(status: Option<ChildExit>) -> Settled {
    match status {
        None => Settled::Running,
        Some(exit) if exit.success() => Settled::Clean(exit),
        Some(exit) => Settled::Died(exit),
    }
}

/// One installer run, owned by the orchestrator.
struct InstallSession {
    /// The installer and its PTY.
    child: PtyChild,
    /// Output received since the last match, capped at [`PENDING_CAP`].
    pending: Vec<u8>,
    /// Responses written so far.
    responses_sent: usize,
}

impl InstallSession {
    /// Appends output, dropping the oldest bytes beyond the cap.
    fn push(&mut self, data: &[u8]) {
        append_bounded(&mut self.pending, data, PENDING_CAP);
    }

    /// Unmatched output as text, for diagnostics.
    fn tail(&self) -> String {
        String::from_utf8_lossy(&self.pending).into_owned()
    }
}

/// Appends `data` to `buf`, keeping only the last `cap` bytes.
fn append_bounded(buf: &mut Vec<u8>, data: &[u8], cap: usize) {
    buf.extend_from_slice(data);
    if buf.len() > cap {
        let excess = buf.len() - cap;
        buf.drain(..excess);
    }
}

/// What woke the match loop.
enum Event {
    Output(usize),
    Deadline,
    Closed,
    Interrupted,
}
