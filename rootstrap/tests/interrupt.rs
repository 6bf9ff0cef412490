//! Operator interrupts during installation.
//!
//! Kept in its own test binary: SIGINT is process-wide and would reach every
//! installer session running concurrently in the same process.

#![cfg(unix)]
#![allow(clippy::unwrap_used, missing_docs)]

use std::path::Path;
use std::time::Duration;

use nix::sys::signal::{Signal, kill};
use nix::unistd::{Pid, getpid};
use rootstrap::install::default_rules;
use rootstrap::{Error, Orchestrator, Phase};
use tokio::signal::unix::{SignalKind, signal};

fn pid_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None::<Signal>).is_ok()
}

#[tokio::test]
async fn ctrl_c_kills_installer_and_names_the_stage() {
    // Keeps a process-level SIGINT handler installed for the whole test.
    let _sigint = signal(SignalKind::interrupt()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");
    let script = format!("echo $$ > {}; sleep 60", pid_file.display());
    let rules = default_rules(Duration::from_secs(30), Duration::from_secs(30)).unwrap();
    let mut orch = Orchestrator::new(rules, std::io::sink());

    let operator = async {
        loop {
            if std::fs::read_to_string(&pid_file).is_ok_and(|pid| pid.ends_with('\n')) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        kill(getpid(), Signal::SIGINT).unwrap();
    };
    let args = ["-c", script.as_str()];
    let (res, ()) = tokio::join!(
        orch.run_command(Path::new("bash"), &args, dir.path()),
        operator
    );

    match res.unwrap_err() {
        Error::Interrupted { stage } => assert_eq!(stage, "confirm"),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(
        orch.history(),
        [Phase::Started, Phase::Awaiting(0), Phase::Crashed]
    );
    let pid: i32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
    assert!(!pid_alive(pid), "installer {pid} still running");
}
