//! End-to-end pipeline runs against fake bundles.

#![cfg(unix)]
#![allow(clippy::unwrap_used, missing_docs)]

use std::cell::Cell;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use rootstrap::fetch::Fetch;
use rootstrap::{Arch, ChildExit, Config, Error, Phase, Pipeline, Result};

/// Installer that asks for confirmation, unpacks a tiny guest, and reports
/// completion.
const GOOD_INSTALLER: &str = r########"#!/bin/bash
echo "#######  freeroot installer  #######"
printf 'Do you want to install Ubuntu? (YES/no): '
read answer
[ "$answer" = "YES" ] || exit 1
mkdir -p bin usr/local/bin
printf '#!/bin/sh\n' > bin/sh
cp ./proot.src usr/local/bin/proot
chmod +x usr/local/bin/proot
echo "Mission Completed ! <----"
sleep 30
"########;

/// Installer that completes without ever producing a guest shell.
const HOLLOW_INSTALLER: &str = r#"#!/bin/bash
printf 'Do you want to install Ubuntu? (YES/no): '
read answer
mkdir -p usr/local/bin
cp ./proot.src usr/local/bin/proot
chmod +x usr/local/bin/proot
echo "Mission Completed ! <----"
sleep 30
"#;

/// Stand-in for the bundle clone: writes an installer and a fake proot
/// that records it was launched.
struct FakeFetch {
    installer: &'static str,
    calls: Cell<usize>,
    launched_marker: PathBuf,
}

impl FakeFetch {
    fn new(installer: &'static str, scratch: &Path) -> Self {
        Self {
            installer,
            calls: Cell::new(0),
            launched_marker: scratch.join("launched"),
        }
    }
}

impl Fetch for FakeFetch {
    fn fetch(&self, _source: &str, dest: &Path) -> Result<()> {
        self.calls.set(self.calls.get() + 1);
        fs::create_dir_all(dest)?;
        fs::write(dest.join("root.sh"), self.installer)?;
        fs::write(
            dest.join("proot.src"),
            format!("#!/bin/sh\ntouch {}\nexit 0\n", self.launched_marker.display()),
        )?;
        fs::write(dest.join("README.md"), "fresh clone\n")?;
        Ok(())
    }
}

fn config_in(dir: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.bundle_dir = dir.join("freeroot");
    cfg.confirm_timeout_secs = 10;
    cfg.install_timeout_secs = 10;
    cfg
}

fn host_ok() -> Result<Arch> {
    Ok(Arch::X86_64)
}

fn host_unsupported() -> Result<Arch> {
    "armv7l".parse()
}

#[tokio::test]
async fn full_bootstrap_launches_sandbox() {
    let tmp = tempfile::tempdir().unwrap();
    let fetch = FakeFetch::new(GOOD_INSTALLER, tmp.path());
    let marker = fetch.launched_marker.clone();
    let pipeline = Pipeline::new(config_in(tmp.path()))
        .with_probe(host_ok)
        .with_fetcher(fetch);

    let exit = pipeline.run(std::io::sink()).await.unwrap();

    assert_eq!(exit.0, ChildExit::Code(0));
    assert!(marker.exists(), "sandbox binary was not launched");
}

#[tokio::test]
async fn install_reports_transitions() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config_in(tmp.path()))
        .with_probe(host_ok)
        .with_fetcher(FakeFetch::new(GOOD_INSTALLER, tmp.path()));

    let mut mirrored = Vec::new();
    let (bundle, report) = pipeline.install(&mut mirrored).await.unwrap();

    assert_eq!(
        report.transitions,
        [
            Phase::Started,
            Phase::Awaiting(0),
            Phase::Awaiting(1),
            Phase::Completed
        ]
    );
    assert_eq!(report.responses_sent, 1);
    assert!(bundle.shell_path().exists());
    let text = String::from_utf8_lossy(&mirrored);
    assert!(text.contains("freeroot installer"), "{text}");
}

#[tokio::test]
async fn unsupported_arch_stops_before_fetch() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config_in(tmp.path());
    let bundle_dir = cfg.bundle_dir.clone();
    let fetch = FakeFetch::new(GOOD_INSTALLER, tmp.path());
    let pipeline = Pipeline::new(cfg).with_probe(host_unsupported).with_fetcher(fetch);

    let err = pipeline.install(std::io::sink()).await.unwrap_err();

    assert!(matches!(err, Error::UnsupportedEnvironment(_)), "{err:?}");
    assert!(!bundle_dir.exists());
}

#[tokio::test]
async fn unsupported_arch_never_calls_fetcher() {
    struct Panicking;
    impl Fetch for Panicking {
        fn fetch(&self, _: &str, _: &Path) -> Result<()> {
            panic!("fetch must not run on an unsupported host");
        }
    }

    let tmp = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config_in(tmp.path()))
        .with_probe(host_unsupported)
        .with_fetcher(Panicking);
    assert!(pipeline.run(std::io::sink()).await.is_err());
}

#[tokio::test]
async fn missing_shell_blocks_launch() {
    let tmp = tempfile::tempdir().unwrap();
    let fetch = FakeFetch::new(HOLLOW_INSTALLER, tmp.path());
    let marker = fetch.launched_marker.clone();
    let pipeline = Pipeline::new(config_in(tmp.path()))
        .with_probe(host_ok)
        .with_fetcher(fetch);

    let err = pipeline.run(std::io::sink()).await.unwrap_err();

    match err {
        Error::MissingArtifact { path } => assert!(path.ends_with("bin/sh"), "{}", path.display()),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(!marker.exists(), "sandbox launched despite failed validation");
}

#[tokio::test]
async fn rerun_starts_from_a_fresh_bundle() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config_in(tmp.path());
    let leftover = cfg.bundle_dir.join("leftover-from-last-run");
    fs::create_dir_all(&cfg.bundle_dir).unwrap();
    fs::write(&leftover, "stale").unwrap();

    let pipeline = Pipeline::new(cfg)
        .with_probe(host_ok)
        .with_fetcher(FakeFetch::new(GOOD_INSTALLER, tmp.path()));
    pipeline.install(std::io::sink()).await.unwrap();

    assert!(!leftover.exists());
    let mode = fs::metadata(tmp.path().join("freeroot/root.sh"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o111, 0o111);
}

#[tokio::test]
async fn silent_installer_times_out() {
    const SILENT: &str = "#!/bin/bash\necho 'warming up'\nsleep 60\n";

    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config_in(tmp.path());
    cfg.confirm_timeout_secs = 1;
    let pipeline = Pipeline::new(cfg)
        .with_probe(host_ok)
        .with_fetcher(FakeFetch::new(SILENT, tmp.path()));

    match pipeline.install(std::io::sink()).await.unwrap_err() {
        Error::PromptTimeout { stage, output } => {
            assert_eq!(stage, "confirm");
            assert!(output.contains("warming up"), "{output}");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn check_and_enter_require_an_installed_bundle() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(config_in(tmp.path()));
    assert!(matches!(pipeline.check(), Err(Error::MissingArtifact { .. })));
    assert!(matches!(pipeline.enter(), Err(Error::MissingArtifact { .. })));
}
