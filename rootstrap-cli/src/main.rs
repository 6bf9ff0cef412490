//! CLI for rootstrap.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod settings;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use rootstrap::{Pipeline, SessionExit};
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

/// Exit status after an operator interrupt (128 + SIGINT).
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "rootstrap",
    version,
    about = "Bootstrap an unprivileged proot Ubuntu userspace and enter it"
)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, install, validate, then open a shell in the sandbox (default).
    Up,

    /// Open a shell in an already installed bundle.
    Enter,

    /// Verify that an installed bundle is complete.
    Check,

    /// Print the host architecture if it is supported.
    Arch,

    /// Print the effective configuration as JSON.
    Config,

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.settings.log_level());

    if let Err(e) = cli.dispatch().await {
        let code = report(&e);
        std::process::exit(code);
    }
}

impl Cli {
    async fn dispatch(self) -> Result<()> {
        match self.command.unwrap_or(Command::Up) {
            Command::Up => {
                let pipeline = Pipeline::new(self.settings.resolve()?);
                session_ended(pipeline.run(std::io::stdout()).await?);
            }
            Command::Enter => session_ended(Pipeline::new(self.settings.resolve()?).enter()?),
            Command::Check => {
                let bundle = Pipeline::new(self.settings.resolve()?).check()?;
                println!("{}: ok", bundle.root().display());
            }
            Command::Arch => println!("{}", rootstrap::probe::host_arch()?),
            Command::Config => {
                println!("{}", serde_json::to_string_pretty(&self.settings.resolve()?)?);
            }
            Command::Completion { shell } => {
                let mut cmd = Self::command();
                clap_complete::generate(shell, &mut cmd, "rootstrap", &mut std::io::stdout());
            }
        }
        Ok(())
    }
}

/// A finished guest session is success regardless of the shell's status.
fn session_ended(exit: SessionExit) {
    if !exit.success() {
        eprintln!("rootstrap: guest shell exited with {}", exit.0);
    }
}

/// Prints a fatal error with any captured installer output and picks the
/// process exit status.
fn report(e: &anyhow::Error) -> i32 {
    eprintln!("rootstrap: {e:#}");
    let Some(err) = e.downcast_ref::<rootstrap::Error>() else {
        return 1;
    };
    if let Some(output) = err.captured_output().filter(|o| !o.trim().is_empty()) {
        eprintln!("rootstrap: last installer output:");
        eprintln!("{}", output.trim_end());
    }
    match err {
        rootstrap::Error::Interrupted { .. } => EXIT_INTERRUPTED,
        _ => 1,
    }
}

/// Logs to stderr; `RUST_LOG` overrides the verbosity flags.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,rootstrap={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
