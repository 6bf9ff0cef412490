//! Prompt rules: what to wait for, what to answer, how long to wait.

use std::time::Duration;

use regex::bytes::Regex;

use crate::error::{Error, Result};

/// Confirmation prompt printed by the bundle installer.
pub const CONFIRM_PATTERN: &str = r"Do you want to install Ubuntu\? \(YES/no\): ";

/// Banner printed once the guest tree and sandbox binary are in place.
pub const COMPLETION_PATTERN: &str = r"Mission Completed ! <----";

/// One step of the installer dialogue.
///
/// Patterns are searched (not anchored) in the raw output received since
/// the previous rule matched.
#[derive(Debug, Clone)]
pub struct PromptRule {
    /// Stage name used in logs and errors.
    stage: String,
    /// Pattern that completes this stage.
    pattern: Regex,
    /// Line sent to the installer on match, without the trailing newline.
    response: Option<String>,
    /// Maximum wait for the match, counted from the end of the previous stage.
    timeout: Duration,
}

impl PromptRule {
    /// Creates a rule that waits for `pattern` and sends nothing.
    pub fn new(stage: impl Into<String>, pattern: &str, timeout: Duration) -> Result<Self> {
        let stage = stage.into();
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::Config(format!("bad pattern for stage {stage}: {e}")))?;
        Ok(Self {
            stage,
            pattern,
            response: None,
            timeout,
        })
    }

    /// Answers the prompt with `line` once it matches.
    #[must_use]
    pub fn respond(mut self, line: impl Into<String>) -> Self {
        self.response = Some(line.into());
        self
    }

    /// Stage name.
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Pattern that completes the stage.
    pub const fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Scripted answer, if any.
    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    /// Stage deadline.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// The bundle installer dialogue: confirm the install, then wait for the
/// completion banner.
pub fn default_rules(confirm: Duration, install: Duration) -> Result<Vec<PromptRule>> {
    Ok(vec![
        PromptRule::new("confirm", CONFIRM_PATTERN, confirm)?.respond("YES"),
        PromptRule::new("install", COMPLETION_PATTERN, install)?,
    ])
}
