//! Bootstrap an unprivileged proot userspace on a running Linux host.
//!
//! `rootstrap` fetches a sandbox bundle, answers its first-run installer
//! over a pseudo-terminal, checks that the guest tree and the sandbox binary
//! landed where expected, then drops the operator into an interactive shell
//! inside the guest.
//!
//! # Quick start
//!
//! ```no_run
//! use rootstrap::{Config, Pipeline};
//!
//! # async fn demo() -> rootstrap::Result<()> {
//! let mut config = Config::default();
//! config.bundle_dir = "/srv/freeroot".into();
//!
//! // Blocks until the guest shell exits.
//! Pipeline::new(config).run(std::io::stdout()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Platform
//!
//! The installer and sandbox only exist for Linux on `x86_64` and
//! `aarch64`; everything except [`probe`], [`Config`] and [`SandboxBundle`]
//! is Unix-only.

mod bundle;
mod config;
mod error;
#[cfg(unix)]
pub mod fetch;
#[cfg(unix)]
pub mod install;
#[cfg(unix)]
mod launch;
#[cfg(unix)]
mod pipeline;
pub mod probe;

pub use bundle::SandboxBundle;
pub use config::{Config, DEFAULT_SOURCE, MAX_TIMEOUT_SECS};
pub use error::{ChildExit, Error, FetchCause, Result};
#[cfg(unix)]
pub use install::{InstallReport, Orchestrator, Phase, PromptRule};
#[cfg(unix)]
pub use launch::{SandboxLaunchSpec, SessionExit};
#[cfg(unix)]
pub use pipeline::{Pipeline, Probe};
pub use probe::Arch;
