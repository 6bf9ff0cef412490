//! Error types for rootstrap operations.

use std::fmt;
use std::path::PathBuf;

/// Alias for `Result<T, rootstrap::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// How a child process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChildExit {
    /// Exited normally with this status code.
    Code(i32),
    /// Killed by this signal number.
    Signal(i32),
}

impl ChildExit {
    /// Returns `true` for a zero exit code.
    pub const fn success(self) -> bool {
        matches!(self, Self::Code(0))
    }
}

impl fmt::Display for ChildExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(c) => write!(f, "exit code {c}"),
            Self::Signal(s) => write!(f, "signal {s}"),
        }
    }
}

impl From<std::process::ExitStatus> for ChildExit {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return Self::Signal(sig);
            }
        }
        Self::Code(status.code().unwrap_or(-1))
    }
}

/// Why the bundle fetch failed.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FetchCause {
    /// The fetch program ran and reported failure.
    #[error("fetch program failed with {0}")]
    Exit(ChildExit),
    /// The fetch program could not be started.
    #[error("fetch program could not be started: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Errors returned by the bootstrap pipeline.
///
/// Every variant is terminal: the pipeline never recovers from or retries a
/// failed stage.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Host architecture is not supported, or could not be read.
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    /// A previous bundle directory survived removal.
    #[error("stale bundle directory {} could not be removed", path.display())]
    StaleBundle {
        /// The bundle directory.
        path: PathBuf,
    },

    /// Fetching the bundle failed.
    #[error("failed to fetch {url}: {cause}")]
    FetchFailure {
        /// Bundle source.
        url: String,
        /// Underlying failure.
        cause: FetchCause,
    },

    /// The installer could not be made executable.
    #[error("cannot make {} executable: {source}", path.display())]
    PermissionSetup {
        /// The installer script.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A prompt stage deadline elapsed without a match.
    #[error("timed out waiting for the {stage} prompt")]
    PromptTimeout {
        /// Name of the stage that timed out.
        stage: String,
        /// Tail of the output received since the last match.
        output: String,
    },

    /// The installer closed its output before the expected prompt appeared.
    #[error("installer output closed before the {stage} prompt")]
    StreamClosed {
        /// Name of the stage being waited on.
        stage: String,
        /// Tail of the output received since the last match.
        output: String,
    },

    /// The installer could not be spawned.
    #[error("failed to spawn installer: {0}")]
    ProcessCrash(#[source] std::io::Error),

    /// The installer printed its completion banner but died abnormally.
    #[error("installer terminated abnormally ({exit}) after completion")]
    InstallerExited {
        /// How the installer terminated.
        exit: ChildExit,
        /// Tail of the output received since the last match.
        output: String,
    },

    /// The operator interrupted the installation.
    #[error("interrupted during the {stage} stage")]
    Interrupted {
        /// Name of the stage that was active.
        stage: String,
    },

    /// An expected artifact is absent from the bundle.
    #[error("missing artifact: {}", path.display())]
    MissingArtifact {
        /// Absolute path of the missing file.
        path: PathBuf,
    },

    /// The sandbox binary could not be started.
    #[error("failed to launch {}: {source}", program.display())]
    Launch {
        /// The sandbox binary.
        program: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Any other I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Output captured from the installer when the error occurred, if any.
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            Self::PromptTimeout { output, .. }
            | Self::StreamClosed { output, .. }
            | Self::InstallerExited { output, .. } => Some(output),
            _ => None,
        }
    }
}
