//! Semantic-version parsing for collaborator binaries (`rl version`).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("no version number found in {0:?}")]
    NotFound(String),
    #[error("invalid version component {0:?}")]
    Component(String),
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `M.m.p`, tolerating a leading `v`, a missing patch component and
    /// pre-release / build suffixes (`1.2.3-rc1+abc`).
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);
        let core = s
            .split(|c: char| c == '-' || c == '+' || c.is_whitespace())
            .next()
            .unwrap_or_default();
        let mut parts = core.split('.');
        let mut next = |required: bool| -> Result<u32, VersionError> {
            match parts.next() {
                Some(p) => p
                    .parse::<u32>()
                    .map_err(|_| VersionError::Component(p.to_string())),
                None if required => Err(VersionError::NotFound(s.to_string())),
                None => Ok(0),
            }
        };
        let major = next(true)?;
        let minor = next(true)?;
        let patch = next(false)?;
        Ok(Self::new(major, minor, patch))
    }

    /// Find the first version-looking token in free-form output such as
    /// `rl version 0.47.1 (abc123)`.
    pub fn find_in(output: &str) -> Result<Self, VersionError> {
        output
            .split_whitespace()
            .filter(|tok| tok.trim_start_matches('v').starts_with(|c: char| c.is_ascii_digit()))
            .find_map(|tok| Self::parse(tok.trim_matches(|c: char| c == '(' || c == ')' || c == ',')).ok())
            .ok_or_else(|| VersionError::NotFound(output.trim().to_string()))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Run `<binary> version` with a hard timeout and parse the result.
///
/// This is the one subprocess call with an explicit timeout; everything else
/// relies on the OS.
pub async fn detect(binary: &str, timeout: Duration) -> Result<Version, String> {
    let fut = tokio::process::Command::new(binary)
        .arg("version")
        .kill_on_drop(true)
        .output();
    let output = tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| format!("{binary} version timed out after {}s", timeout.as_secs()))?
        .map_err(|e| format!("failed to run {binary}: {e}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("{binary} version failed: {}", stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Version::find_in(&stdout).map_err(|e| e.to_string())
}
