use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::git::{Git, GitError};
use crate::ids::base36;
use crate::workspace::{Workspace, WorkspaceError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur when managing agent worktrees.
#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    /// A git worktree command returned a non-zero exit code.
    #[error(transparent)]
    Git(#[from] GitError),

    /// Attempted to create a worktree that already exists.
    #[error("worktree already exists: {0}")]
    AlreadyExists(String),

    /// The specified worktree path does not exist.
    #[error("worktree not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorktreeError>;

// ---------------------------------------------------------------------------
// AgentWorktree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentWorktree {
    pub path: PathBuf,
    pub branch: String,
    pub base_branch: String,
    pub created_at: DateTime<Utc>,
}

/// `raider/<name>-<base36 millis>`: a fresh branch per spawn, so a reused
/// name never inherits an old branch.
pub fn raider_branch(name: &str, at: DateTime<Utc>) -> String {
    let millis = u64::try_from(at.timestamp_millis()).unwrap_or_default();
    format!("raider/{name}-{}", base36(millis))
}

pub fn crew_branch(name: &str) -> String {
    format!("clan/{name}")
}

/// Raider name encoded in a `raider/<name>-<ts>` branch.
pub fn raider_of_branch(branch: &str) -> Option<&str> {
    let rest = branch.strip_prefix("raider/")?;
    let (name, ts) = rest.rsplit_once('-')?;
    if name.is_empty() || ts.is_empty() {
        return None;
    }
    Some(name)
}

/// Work-item id carried in a branch of the form `<kind>/<...>/<prefix>-<id>`
/// or `<prefix>-<id>`. Raider spawn branches carry none.
pub fn issue_of_branch(branch: &str) -> Option<&str> {
    if branch.starts_with("raider/") && branch.matches('/').count() == 1 {
        return None;
    }
    let last = branch.rsplit('/').next()?;
    let prefix = crate::ids::id_prefix(last)?;
    (last.len() > prefix.len()).then_some(last)
}

// ---------------------------------------------------------------------------
// WorktreeManager
// ---------------------------------------------------------------------------

/// Creates and destroys the isolated worktrees raiders and crew work in.
///
/// Worktrees branch from the warband's canonical clone at
/// `<rig>/warchief/warband`.
pub struct WorktreeManager {
    git: Git,
}

impl WorktreeManager {
    pub fn new(git: Git) -> Self {
        Self { git }
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    /// Create `<rig>/raiders/<name>/warband` on a fresh timestamped branch.
    pub fn create_raider(&self, ws: &Workspace, rig: &str, name: &str) -> Result<AgentWorktree> {
        let warband = ws.warband(rig)?;
        let path = ws.raiders_dir(rig).join(name).join(crate::workspace::WORKTREE_DIR);
        let now = Utc::now();
        let branch = raider_branch(name, now);
        self.create(ws, rig, &path, &branch, &warband.default_branch, false)?;
        Ok(AgentWorktree {
            path,
            branch,
            base_branch: warband.default_branch.clone(),
            created_at: now,
        })
    }

    /// Create `<rig>/clan/<name>/warband` on `clan/<name>`, reusing the
    /// branch when it already exists.
    pub fn create_crew(&self, ws: &Workspace, rig: &str, name: &str) -> Result<AgentWorktree> {
        let warband = ws.warband(rig)?;
        let path = ws.clan_dir(rig).join(name).join(crate::workspace::WORKTREE_DIR);
        let branch = crew_branch(name);
        let canonical = ws.canonical_clone(rig);
        let reuse = self
            .git
            .local_branches(&canonical, &branch)
            .map(|b| b.iter().any(|x| x == &branch))
            .unwrap_or(false);
        self.create(ws, rig, &path, &branch, &warband.default_branch, reuse)?;
        Ok(AgentWorktree {
            path,
            branch,
            base_branch: warband.default_branch.clone(),
            created_at: Utc::now(),
        })
    }

    fn create(
        &self,
        ws: &Workspace,
        rig: &str,
        path: &Path,
        branch: &str,
        default_branch: &str,
        existing_branch: bool,
    ) -> Result<()> {
        if path.exists() {
            return Err(WorktreeError::AlreadyExists(path.display().to_string()));
        }
        let canonical = ws.canonical_clone(rig);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Err(e) = self.git.fetch(&canonical, "origin") {
            tracing::warn!(rig, error = %e, "fetch failed; branching from local origin ref");
        }
        let result = if existing_branch {
            self.git.worktree_add_existing(&canonical, path, branch)
        } else {
            let base = format!("origin/{default_branch}");
            self.git.worktree_add(&canonical, path, branch, &base)
        };
        if let Err(e) = result {
            // Leave no half-made agent directory behind.
            if let Some(parent) = path.parent() {
                let _ = std::fs::remove_dir_all(parent);
            }
            return Err(e.into());
        }
        tracing::info!(rig, branch, path = %path.display(), "worktree created");
        Ok(())
    }

    /// Remove an agent worktree and its agent directory.
    ///
    /// Without `force`, git refuses to remove a dirty worktree.
    pub fn remove(&self, ws: &Workspace, rig: &str, agent_dir: &Path, force: bool) -> Result<()> {
        let path = agent_dir.join(crate::workspace::WORKTREE_DIR);
        if !agent_dir.exists() {
            return Err(WorktreeError::NotFound(agent_dir.display().to_string()));
        }
        let canonical = ws.canonical_clone(rig);
        if path.exists() {
            self.git.worktree_remove(&canonical, &path, force)?;
        }
        if agent_dir.exists() {
            std::fs::remove_dir_all(agent_dir)?;
        }
        if let Err(e) = self.git.worktree_prune(&canonical) {
            tracing::debug!(rig, error = %e, "worktree prune failed");
        }
        tracing::info!(rig, path = %agent_dir.display(), "worktree removed");
        Ok(())
    }

    /// Move a crew worktree to a new agent directory.
    pub fn relocate(&self, ws: &Workspace, rig: &str, from: &Path, to: &Path) -> Result<()> {
        if to.exists() {
            return Err(WorktreeError::AlreadyExists(to.display().to_string()));
        }
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.git
            .worktree_move(&ws.canonical_clone(rig), from, to)?;
        Ok(())
    }
}

/// Names of the agent directories under `dir` (raiders or clan), sorted.
pub fn agent_names(dir: &Path) -> Vec<String> {
    let mut names = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|n| !n.starts_with('.'))
            .collect::<Vec<_>>(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

/// Modification time of a worktree directory, as a staleness proxy.
pub fn worktree_age(path: &Path) -> Option<chrono::Duration> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let modified: DateTime<Utc> = modified.into();
    Some(Utc::now() - modified)
}
