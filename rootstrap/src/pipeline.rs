//! The bootstrap pipeline.
//!
//! Probe → fetch → chmod installer → orchestrate → validate → launch.
//! Each stage is a hard gate: the first error ends the run.

#![cfg(unix)]

use std::io::Write;

use crate::bundle::SandboxBundle;
use crate::config::Config;
use crate::error::Result;
use crate::fetch::{self, Fetch, GitFetcher};
use crate::install::{InstallReport, Orchestrator, default_rules};
use crate::launch::{SandboxLaunchSpec, SessionExit};
use crate::probe::{self, Arch};

/// Architecture probe used as the first gate.
pub type Probe = fn() -> Result<Arch>;

/// One configured bootstrap run.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> rootstrap::Result<()> {
/// use rootstrap::{Config, Pipeline};
///
/// let exit = Pipeline::new(Config::default())
///     .run(std::io::stdout())
///     .await?;
/// println!("guest shell finished: {}", exit.0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
#[must_use = "a Pipeline does nothing until .run() or .install() is called"]
pub struct Pipeline<F = GitFetcher> {
    /// Run settings.
    config: Config,
    /// Bundle retrieval.
    fetcher: F,
    /// Host architecture gate.
    probe: Probe,
    /// Sandbox invocation.
    launch: SandboxLaunchSpec,
}

impl Pipeline<GitFetcher> {
    /// Pipeline that clones with `config.fetch_program` and probes the host.
    pub fn new(config: Config) -> Self {
        let fetcher = GitFetcher::new(config.fetch_program.clone());
        Self {
            config,
            fetcher,
            probe: probe::host_arch,
            launch: SandboxLaunchSpec::default(),
        }
    }
}

impl<F: Fetch> Pipeline<F> {
    /// Replaces the bundle fetcher.
    pub fn with_fetcher<G: Fetch>(self, fetcher: G) -> Pipeline<G> {
        Pipeline {
            config: self.config,
            fetcher,
            probe: self.probe,
            launch: self.launch,
        }
    }

    /// Replaces the architecture probe.
    pub fn with_probe(mut self, probe: Probe) -> Self {
        self.probe = probe;
        self
    }

    /// Run settings.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The bundle this pipeline operates on.
    pub fn bundle(&self) -> Result<SandboxBundle> {
        Ok(SandboxBundle::from_config(&self.config)?)
    }

    /// Runs every stage up to and including validation.
    ///
    /// Installer output is mirrored to `mirror` as it arrives.
    pub async fn install<W: Write>(&self, mirror: W) -> Result<(SandboxBundle, InstallReport)> {
        self.config.validate()?;

        let arch = (self.probe)()?;
        tracing::info!(%arch, "architecture supported");

        let bundle = self.bundle()?;
        fetch::prepare(&self.fetcher, &self.config.source, &bundle)?;

        let rules = default_rules(self.config.confirm_timeout(), self.config.install_timeout())?;
        let mut orchestrator = Orchestrator::new(rules, mirror);
        let report = orchestrator.run(&bundle).await?;
        tracing::info!(responses = report.responses_sent, "installer completed");

        bundle.validate()?;
        Ok((bundle, report))
    }

    /// Runs the whole pipeline, ending in an interactive sandbox session.
    pub async fn run<W: Write>(&self, mirror: W) -> Result<SessionExit> {
        let (bundle, _) = self.install(mirror).await?;
        self.launch.launch(&bundle)
    }

    /// Enters an already installed bundle: validate, then launch.
    pub fn enter(&self) -> Result<SessionExit> {
        let bundle = self.bundle()?;
        bundle.validate()?;
        self.launch.launch(&bundle)
    }

    /// Validates an already installed bundle.
    pub fn check(&self) -> Result<SandboxBundle> {
        let bundle = self.bundle()?;
        bundle.validate()?;
        Ok(bundle)
    }
}
