use std::fmt;

use hd_core::config::ConfigError;
use hd_core::drums::DrumsError;
use hd_core::git::GitError;
use hd_core::ledger::LedgerError;
use hd_core::routes::RouteError;
use hd_core::workspace::WorkspaceError;
use hd_core::worktree::WorktreeError;
use hd_session::mux::SessionError;

use crate::resolver::ResolveError;

/// Taxonomy tag carried by every [`HordeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The verb was invoked in an invalid state.
    Preflight,
    /// Proceeding would lose work; needs `--force` or another exit path.
    Precondition,
    /// `rl`, `git` or `tmux` failed.
    Collaborator,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Preflight => "preflight",
            ErrorKind::Precondition => "precondition",
            ErrorKind::Collaborator => "collaborator",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HordeError {
    #[error("{message}\n  hint: {remedy}")]
    Preflight { message: String, remedy: String },

    #[error("{message}\n  hint: {remedy}")]
    Precondition { message: String, remedy: String },

    #[error("{tool} failed: {stderr}")]
    Collaborator { tool: String, stderr: String },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Drums(#[from] DrumsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HordeError>;

impl HordeError {
    pub fn preflight(message: impl Into<String>, remedy: impl Into<String>) -> Self {
        HordeError::Preflight {
            message: message.into(),
            remedy: remedy.into(),
        }
    }

    pub fn precondition(message: impl Into<String>, remedy: impl Into<String>) -> Self {
        HordeError::Precondition {
            message: message.into(),
            remedy: remedy.into(),
        }
    }

    pub fn collaborator(tool: impl Into<String>, stderr: impl Into<String>) -> Self {
        HordeError::Collaborator {
            tool: tool.into(),
            stderr: stderr.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HordeError::Preflight { .. } | HordeError::Resolve(_) => ErrorKind::Preflight,
            HordeError::Workspace(WorkspaceError::Io(_)) => ErrorKind::Internal,
            HordeError::Workspace(_) => ErrorKind::Preflight,
            HordeError::Config(_) => ErrorKind::Preflight,
            HordeError::Precondition { .. } => ErrorKind::Precondition,
            HordeError::Collaborator { .. } => ErrorKind::Collaborator,
            HordeError::Drums(_) | HordeError::Io(_) => ErrorKind::Internal,
        }
    }
}

impl From<LedgerError> for HordeError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(id) => HordeError::preflight(
                format!("work item not found: {id}"),
                "check the id with `rl show <id>`",
            ),
            LedgerError::Command { command, stderr } => {
                HordeError::collaborator(format!("rl {command}"), stderr)
            }
            LedgerError::Parse { command, message } => {
                HordeError::collaborator(format!("rl {command}"), message)
            }
            LedgerError::UnsupportedVersion { found, required } => HordeError::preflight(
                format!("rl {found} is too old"),
                format!("upgrade rl to {required} or newer"),
            ),
            LedgerError::Route(e) => e.into(),
        }
    }
}

impl From<RouteError> for HordeError {
    fn from(e: RouteError) -> Self {
        match e {
            RouteError::Io(io) => HordeError::Io(io),
            RouteError::UnknownPrefix(id) => HordeError::preflight(
                format!("no ledger route for {id:?}"),
                "register the warband with `hd rig add` or check the id",
            ),
            other => HordeError::preflight(other.to_string(), "inspect .relics/routes"),
        }
    }
}

impl From<GitError> for HordeError {
    fn from(e: GitError) -> Self {
        match e {
            GitError::Command { command, stderr } => {
                HordeError::collaborator(format!("git {command}"), stderr)
            }
            other => HordeError::collaborator("git", other.to_string()),
        }
    }
}

impl From<SessionError> for HordeError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(name) => HordeError::preflight(
                format!("no session {name}"),
                "start it first (e.g. `hd crew start`)",
            ),
            SessionError::AlreadyExists(name) => HordeError::preflight(
                format!("session {name} already exists"),
                "attach to it or stop it first",
            ),
            SessionError::Command { op, stderr } => {
                HordeError::collaborator(format!("tmux {op}"), stderr)
            }
            other => HordeError::collaborator("tmux", other.to_string()),
        }
    }
}

impl From<WorktreeError> for HordeError {
    fn from(e: WorktreeError) -> Self {
        match e {
            WorktreeError::Git(g) => g.into(),
            WorktreeError::Workspace(w) => w.into(),
            WorktreeError::Io(io) => HordeError::Io(io),
            WorktreeError::AlreadyExists(path) => HordeError::preflight(
                format!("worktree already exists: {path}"),
                "pick another name or remove the old worktree",
            ),
            WorktreeError::NotFound(path) => HordeError::preflight(
                format!("worktree not found: {path}"),
                "check the name with `hd raider list` or `hd crew list`",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_errors_keep_stderr() {
        let e: HordeError = LedgerError::Command {
            command: "update".into(),
            stderr: "database is locked".into(),
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::Collaborator);
        assert!(e.to_string().contains("database is locked"));
    }

    #[test]
    fn missing_items_are_preflight() {
        let e: HordeError = LedgerError::NotFound("gt-zzz".into()).into();
        assert_eq!(e.kind(), ErrorKind::Preflight);
        assert!(e.to_string().contains("gt-zzz"));
        assert!(e.to_string().contains("hint:"));
    }

    #[test]
    fn preconditions_carry_remedy() {
        let e = HordeError::precondition("uncommitted changes", "commit or stash first");
        assert_eq!(e.kind(), ErrorKind::Precondition);
        assert_eq!(e.to_string(), "uncommitted changes\n  hint: commit or stash first");
    }
}
