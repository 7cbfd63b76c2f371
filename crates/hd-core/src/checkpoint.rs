//! Per-worktree snapshot of work in flight (`.raider-checkpoint.json`).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::workspace::write_atomic;

pub const CHECKPOINT_FILE: &str = ".raider-checkpoint.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub molecule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooked_bead: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
    #[serde(default)]
    pub modified_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            molecule_id: None,
            current_step: None,
            step_title: None,
            hooked_bead: None,
            branch: None,
            last_commit: None,
            modified_files: Vec::new(),
            notes: None,
            session_id: None,
        }
    }

    pub fn path(worktree: &Path) -> PathBuf {
        worktree.join(CHECKPOINT_FILE)
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.timestamp
    }

    pub fn is_stale(&self, max_age_hours: u64) -> bool {
        let max = Duration::hours(i64::try_from(max_age_hours).unwrap_or(i64::MAX / 3_600_000));
        self.age() > max
    }

    /// Write atomically (temp file + rename).
    pub fn write(&self, worktree: &Path) -> std::io::Result<PathBuf> {
        let path = Self::path(worktree);
        let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        write_atomic(&path, &json)?;
        Ok(path)
    }

    /// `Ok(None)` when no checkpoint exists.
    pub fn read(worktree: &Path) -> std::io::Result<Option<Self>> {
        let path = Self::path(worktree);
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Returns whether a checkpoint was removed.
    pub fn clear(worktree: &Path) -> std::io::Result<bool> {
        match std::fs::remove_file(Self::path(worktree)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// One-paragraph summary for the resuming agent.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(step) = &self.current_step {
            match &self.step_title {
                Some(title) => parts.push(format!("step {step} ({title})")),
                None => parts.push(format!("step {step}")),
            }
        }
        if let Some(bead) = &self.hooked_bead {
            parts.push(format!("hooked {bead}"));
        }
        if let Some(branch) = &self.branch {
            parts.push(format!("branch {branch}"));
        }
        if !self.modified_files.is_empty() {
            parts.push(format!("{} modified file(s)", self.modified_files.len()));
        }
        let age = self.age();
        let when = if age.num_hours() > 0 {
            format!("{}h ago", age.num_hours())
        } else {
            format!("{}m ago", age.num_minutes())
        };
        if parts.is_empty() {
            format!("checkpoint from {when}")
        } else {
            format!("checkpoint from {when}: {}", parts.join(", "))
        }
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_clear() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(Checkpoint::read(tmp.path()).unwrap(), None);

        let mut cp = Checkpoint::new();
        cp.hooked_bead = Some("gt-abc".into());
        cp.branch = Some("raider/nux-1".into());
        cp.modified_files = vec!["src/lib.rs".into()];
        cp.write(tmp.path()).unwrap();

        let back = Checkpoint::read(tmp.path()).unwrap().unwrap();
        assert_eq!(back, cp);
        assert!(Checkpoint::clear(tmp.path()).unwrap());
        assert!(!Checkpoint::clear(tmp.path()).unwrap());
    }

    #[test]
    fn optional_fields_are_omitted() {
        let json = serde_json::to_value(Checkpoint::new()).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("timestamp"));
        assert!(obj.contains_key("modified_files"));
        assert!(!obj.contains_key("molecule_id"));
    }

    #[test]
    fn staleness_uses_max_age() {
        let mut cp = Checkpoint::new();
        assert!(!cp.is_stale(24));
        cp.timestamp = Utc::now() - Duration::hours(25);
        assert!(cp.is_stale(24));
        assert!(!cp.is_stale(48));
    }

    #[test]
    fn summary_mentions_step_and_bead() {
        let mut cp = Checkpoint::new();
        cp.current_step = Some("gt-mol.2".into());
        cp.step_title = Some("write tests".into());
        cp.hooked_bead = Some("gt-abc".into());
        let s = cp.summary();
        assert!(s.contains("step gt-mol.2 (write tests)"));
        assert!(s.contains("hooked gt-abc"));
    }

    #[test]
    fn corrupt_file_is_invalid_data() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(Checkpoint::path(tmp.path()), "{").unwrap();
        let err = Checkpoint::read(tmp.path()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
