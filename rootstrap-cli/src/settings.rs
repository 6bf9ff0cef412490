//! Global flags and configuration resolution.
//!
//! Precedence: built-in defaults < `--config` file < command-line flags.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rootstrap::Config;

/// Flags shared by every subcommand.
#[derive(clap::Args, Debug, Default)]
pub struct Settings {
    /// JSON configuration file.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bundle directory.
    #[arg(long, global = true, value_name = "PATH")]
    dir: Option<PathBuf>,

    /// Repository the bundle is cloned from.
    #[arg(long, global = true, value_name = "URL")]
    source: Option<String>,

    /// Program used to clone the bundle.
    #[arg(long, global = true, value_name = "PROGRAM")]
    fetch_program: Option<PathBuf>,

    /// Seconds to wait for the install confirmation prompt.
    #[arg(long, global = true, value_name = "SECS")]
    confirm_timeout: Option<u64>,

    /// Seconds to wait for the installer to finish.
    #[arg(long, global = true, value_name = "SECS")]
    install_timeout: Option<u64>,

    /// Verbose logging (repeat for trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Settings {
    /// Merges the config file (if any) with command-line overrides.
    pub fn resolve(&self) -> Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(dir) = &self.dir {
            cfg.bundle_dir.clone_from(dir);
        }
        if let Some(source) = &self.source {
            cfg.source.clone_from(source);
        }
        if let Some(program) = &self.fetch_program {
            cfg.fetch_program.clone_from(program);
        }
        if let Some(secs) = self.confirm_timeout {
            cfg.confirm_timeout_secs = secs;
        }
        if let Some(secs) = self.install_timeout {
            cfg.install_timeout_secs = secs;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Default log filter for the chosen verbosity.
    pub const fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
