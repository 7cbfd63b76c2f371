//! Git porcelain used by worktree management and `done`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::runner::CommandRunner;
use crate::types::CleanupStatus;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// A git command returned a non-zero exit code (stderr is captured).
    #[error("git {command} failed: {stderr}")]
    Command { command: String, stderr: String },

    /// The git binary could not be started.
    #[error("{0}")]
    Spawn(String),

    #[error("unexpected git output for {command}: {output:?}")]
    Parse { command: String, output: String },
}

pub type Result<T> = std::result::Result<T, GitError>;

/// One entry of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub branch: Option<String>,
}

/// Thin wrapper around the `git` CLI.
#[derive(Clone)]
pub struct Git {
    runner: Arc<dyn CommandRunner>,
}

impl Git {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let out = self
            .runner
            .run("git", dir, args)
            .map_err(GitError::Spawn)?;
        if !out.success {
            return Err(GitError::Command {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: out.diagnostic(),
            });
        }
        Ok(out.stdout.trim_end().to_string())
    }

    fn lines(&self, dir: &Path, args: &[&str]) -> Result<Vec<String>> {
        Ok(self
            .run(dir, args)?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(ToOwned::to_owned)
            .collect())
    }

    pub fn is_repo(&self, dir: &Path) -> bool {
        self.run(dir, &["rev-parse", "--git-dir"]).is_ok()
    }

    pub fn current_branch(&self, dir: &Path) -> Result<String> {
        let branch = self.run(dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok(branch.trim().to_string())
    }

    pub fn status_porcelain(&self, dir: &Path) -> Result<Vec<String>> {
        self.lines(dir, &["status", "--porcelain"])
    }

    /// Paths from `status --porcelain`, without the two-column status code.
    pub fn modified_files(&self, dir: &Path) -> Result<Vec<String>> {
        Ok(self
            .status_porcelain(dir)?
            .iter()
            .filter_map(|l| l.get(3..))
            .map(|p| p.rsplit(" -> ").next().unwrap_or(p).to_string())
            .collect())
    }

    pub fn has_uncommitted(&self, dir: &Path) -> Result<bool> {
        Ok(!self.status_porcelain(dir)?.is_empty())
    }

    /// Commits on HEAD that `base` does not have.
    pub fn commits_ahead(&self, dir: &Path, base: &str) -> Result<u32> {
        self.count(dir, &format!("{base}..HEAD"))
    }

    /// Commits on `base` that HEAD does not have.
    pub fn commits_behind(&self, dir: &Path, base: &str) -> Result<u32> {
        self.count(dir, &format!("HEAD..{base}"))
    }

    fn count(&self, dir: &Path, range: &str) -> Result<u32> {
        let out = self.run(dir, &["rev-list", "--count", range])?;
        out.trim().parse().map_err(|_| GitError::Parse {
            command: "rev-list".into(),
            output: out,
        })
    }

    pub fn fetch(&self, dir: &Path, remote: &str) -> Result<()> {
        self.run(dir, &["fetch", remote]).map(drop)
    }

    pub fn push(&self, dir: &Path, remote: &str, branch: &str) -> Result<()> {
        self.run(dir, &["push", "-u", remote, branch]).map(drop)
    }

    pub fn remote_branch_exists(&self, dir: &Path, remote: &str, branch: &str) -> Result<bool> {
        let out = self.run(dir, &["ls-remote", "--heads", remote, branch])?;
        Ok(!out.trim().is_empty())
    }

    pub fn stash_count(&self, dir: &Path) -> Result<usize> {
        Ok(self.lines(dir, &["stash", "list"])?.len())
    }

    /// `<short-sha> <subject>` of HEAD.
    pub fn last_commit(&self, dir: &Path) -> Result<String> {
        self.run(dir, &["log", "-1", "--format=%h %s"])
    }

    pub fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        let dest = dest.to_string_lossy();
        self.run(parent, &["clone", url, &dest]).map(drop)
    }

    /// The remote's default branch (`origin/HEAD`), if known.
    pub fn remote_default_branch(&self, dir: &Path) -> Option<String> {
        self.run(dir, &["symbolic-ref", "--short", "refs/remotes/origin/HEAD"])
            .ok()
            .and_then(|r| r.trim().strip_prefix("origin/").map(str::to_string))
    }

    pub fn worktree_add(&self, repo: &Path, path: &Path, branch: &str, base: &str) -> Result<()> {
        let path = path.to_string_lossy();
        self.run(repo, &["worktree", "add", "-b", branch, &path, base])
            .map(drop)
    }

    /// Attach an existing branch to a new worktree.
    pub fn worktree_add_existing(&self, repo: &Path, path: &Path, branch: &str) -> Result<()> {
        let path = path.to_string_lossy();
        self.run(repo, &["worktree", "add", &path, branch]).map(drop)
    }

    pub fn worktree_remove(&self, repo: &Path, path: &Path, force: bool) -> Result<()> {
        let path = path.to_string_lossy();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path);
        self.run(repo, &args).map(drop)
    }

    pub fn worktree_move(&self, repo: &Path, from: &Path, to: &Path) -> Result<()> {
        let from = from.to_string_lossy();
        let to = to.to_string_lossy();
        self.run(repo, &["worktree", "move", &from, &to]).map(drop)
    }

    pub fn worktree_prune(&self, repo: &Path) -> Result<()> {
        self.run(repo, &["worktree", "prune"]).map(drop)
    }

    pub fn worktree_list(&self, repo: &Path) -> Result<Vec<WorktreeEntry>> {
        let out = self.run(repo, &["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&out))
    }

    pub fn branch_delete(&self, repo: &Path, branch: &str, force: bool) -> Result<()> {
        let flag = if force { "-D" } else { "-d" };
        self.run(repo, &["branch", flag, branch]).map(drop)
    }

    pub fn branch_rename(&self, repo: &Path, from: &str, to: &str) -> Result<()> {
        self.run(repo, &["branch", "-m", from, to]).map(drop)
    }

    /// Local branch names under `refs/heads/<prefix>`.
    pub fn local_branches(&self, repo: &Path, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("refs/heads/{prefix}");
        self.lines(repo, &["for-each-ref", "--format=%(refname:short)", &pattern])
    }

    pub fn pull_ff_only(&self, dir: &Path, remote: &str, branch: &str) -> Result<()> {
        self.run(dir, &["pull", "--ff-only", remote, branch]).map(drop)
    }

    /// Classify a worktree for safe teardown.
    ///
    /// Uncommitted changes win over stashes, which win over unpushed
    /// commits. Any git failure yields [`CleanupStatus::Unknown`].
    pub fn cleanup_status(&self, dir: &Path, default_branch: &str) -> CleanupStatus {
        let dirty = match self.has_uncommitted(dir) {
            Ok(d) => d,
            Err(_) => return CleanupStatus::Unknown,
        };
        if dirty {
            return CleanupStatus::Uncommitted;
        }
        match self.stash_count(dir) {
            Ok(n) if n > 0 => return CleanupStatus::Stash,
            Ok(_) => {}
            Err(_) => return CleanupStatus::Unknown,
        }
        let ahead = self
            .count(dir, "@{u}..HEAD")
            .or_else(|_| self.commits_ahead(dir, &format!("origin/{default_branch}")));
        match ahead {
            Ok(0) => CleanupStatus::Clean,
            Ok(_) => CleanupStatus::Unpushed,
            Err(_) => CleanupStatus::Unknown,
        }
    }
}

fn parse_worktree_list(out: &str) -> Vec<WorktreeEntry> {
    let mut results = Vec::new();
    let mut current: Option<WorktreeEntry> = None;
    for line in out.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(entry) = current.take() {
                results.push(entry);
            }
            current = Some(WorktreeEntry {
                path: PathBuf::from(path),
                branch: None,
            });
        } else if let Some(branch) = line.strip_prefix("branch refs/heads/") {
            if let Some(entry) = current.as_mut() {
                entry.branch = Some(branch.to_string());
            }
        }
    }
    results.extend(current);
    results
}
