//! Raider management: ephemeral workers living in
//! `<rig>/raiders/<name>/warband` on a `raider/<name>-<ts>` branch.

use std::path::PathBuf;

use chrono::Duration;
use hd_core::events::EventKind;
use hd_core::ledger::LedgerError;
use hd_core::types::{CleanupStatus, Role};
use hd_core::worktree::{agent_names, worktree_age, AgentWorktree};
use hd_session::naming::validate_agent_name;

use crate::context::HordeContext;
use crate::error::{HordeError, Result};
use crate::hook;
use crate::namepool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaiderInfo {
    pub role: Role,
    pub path: PathBuf,
    pub branch: Option<String>,
    pub running: bool,
    pub hook: Option<String>,
}

fn raider(rig: &str, name: &str) -> Role {
    Role::Raider {
        rig: rig.to_string(),
        name: name.to_string(),
    }
}

fn rigs_of(ctx: &HordeContext, rig: Option<&str>) -> Result<Vec<String>> {
    match rig {
        Some(rig) => {
            ctx.ws.warband(rig)?;
            Ok(vec![rig.to_string()])
        }
        None => Ok(ctx.ws.warband_names()),
    }
}

fn existing(ctx: &HordeContext, rig: &str, name: &str) -> Result<(Role, PathBuf)> {
    ctx.ws.warband(rig)?;
    let role = raider(rig, name);
    let dir = ctx.ws.raiders_dir(rig).join(name);
    if !dir.is_dir() {
        return Err(HordeError::preflight(
            format!("no raider {role}"),
            "list raiders with `hd raider list`",
        ));
    }
    Ok((role, dir))
}

/// Raiders of one warband, or of every warband.
pub fn list(ctx: &HordeContext, rig: Option<&str>) -> Result<Vec<RaiderInfo>> {
    let records = ctx.records();
    let git = ctx.git();
    let mut out = Vec::new();
    for rig in rigs_of(ctx, rig)? {
        for name in agent_names(&ctx.ws.raiders_dir(&rig)) {
            let role = raider(&rig, &name);
            let path = ctx.ws.role_home(&role);
            let branch = git.current_branch(&path).ok();
            let running = ctx.is_running(&role)?;
            let hook = records.get(&role)?.and_then(|r| r.hook);
            out.push(RaiderInfo {
                role,
                path,
                branch,
                running,
                hook,
            });
        }
    }
    Ok(out)
}

/// Create a raider worktree and its agent record. Without a name, the
/// next free name of the configured theme is used.
pub fn add(ctx: &HordeContext, rig: &str, name: Option<&str>) -> Result<(Role, AgentWorktree)> {
    ctx.ws.warband(rig)?;
    let name = match name {
        Some(name) => name.to_string(),
        None => {
            let taken = agent_names(&ctx.ws.raiders_dir(rig));
            namepool::allocate(&ctx.config.raider.name_theme, &taken)
                .map_err(|e| HordeError::preflight(e, "pass an explicit name"))?
        }
    };
    validate_agent_name(&name)
        .map_err(|e| HordeError::preflight(format!("invalid raider name {name:?}: {e}"), "use [a-z0-9_-]"))?;
    let role = raider(rig, &name);
    let worktree = ctx.worktrees().create_raider(&ctx.ws, rig, &name)?;
    ctx.records().ensure(&role)?;
    tracing::info!(raider = %role, branch = %worktree.branch, "raider added");
    Ok((role, worktree))
}

/// Remove a raider's worktree. The agent record is kept.
pub fn remove(ctx: &HordeContext, rig: &str, name: &str, force: bool) -> Result<()> {
    let (role, dir) = existing(ctx, rig, name)?;
    let path = ctx.ws.role_home(&role);
    if !force {
        if ctx.is_running(&role)? {
            return Err(HordeError::precondition(
                format!("{role} has a running session"),
                "stop it first or pass --force",
            ));
        }
        if path.exists() && ctx.git().has_uncommitted(&path)? {
            return Err(HordeError::precondition(
                format!("{role} has uncommitted changes"),
                "commit or discard them, or pass --force",
            ));
        }
    }
    ctx.worktrees().remove(&ctx.ws, rig, &dir, force)?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovery {
    pub role: Role,
    pub cleanup: CleanupStatus,
    pub hook: Option<String>,
    /// Open merge request still waiting for the forge.
    pub pending_mr: Option<String>,
}

impl Recovery {
    pub fn is_safe(&self) -> bool {
        self.cleanup.is_safe_to_nuke() && self.hook.is_none() && self.pending_mr.is_none()
    }

    pub fn reasons(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.cleanup.is_safe_to_nuke() {
            out.push(format!("worktree is {}", self.cleanup));
        }
        if let Some(hook) = &self.hook {
            out.push(format!("{hook} is on its hook"));
        }
        if let Some(mr) = &self.pending_mr {
            out.push(format!("merge request {mr} is still open"));
        }
        out
    }
}

/// Whether a raider can be nuked without losing work.
pub fn check_recovery(ctx: &HordeContext, rig: &str, name: &str) -> Result<Recovery> {
    let (role, _) = existing(ctx, rig, name)?;
    let path = ctx.ws.role_home(&role);
    let cleanup = if path.exists() {
        let default_branch = &ctx.ws.warband(rig)?.default_branch;
        ctx.git().cleanup_status(&path, default_branch)
    } else {
        CleanupStatus::Clean
    };
    let records = ctx.records();
    let hook = records.hook_of(&role)?;
    let pending_mr = match records.get(&role)?.and_then(|r| r.active_mr) {
        Some(mr) => match ctx.ledgers.get(&mr) {
            Ok(item) if !item.status.is_terminal() => Some(mr),
            Ok(_) | Err(LedgerError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };
    Ok(Recovery {
        role,
        cleanup,
        hook,
        pending_mr,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NukeOutcome {
    pub session_killed: bool,
    pub branch_deleted: Option<String>,
    pub record_deleted: bool,
    pub released: Option<String>,
}

/// Destroy a raider: session, worktree, local branch and agent record.
/// Refused unless [`check_recovery`] says it is safe or `force` is set.
pub fn nuke(ctx: &HordeContext, rig: &str, name: &str, force: bool) -> Result<NukeOutcome> {
    let recovery = check_recovery(ctx, rig, name)?;
    if !recovery.is_safe() && !force {
        return Err(HordeError::precondition(
            format!("{} is not safe to nuke: {}", recovery.role, recovery.reasons().join(", ")),
            "resolve the above or pass --force",
        ));
    }
    let role = recovery.role.clone();
    let mut out = NukeOutcome::default();

    if let Some(hooked) = &recovery.hook {
        match hook::unsling(ctx, Some(hooked), Some(role.clone()), true) {
            Ok(_) => out.released = Some(hooked.clone()),
            Err(e) => tracing::warn!(raider = %role, item = %hooked, error = %e, "failed to release hook"),
        }
    }

    let session = ctx.session_name(&role)?;
    out.session_killed = ctx.sessions.kill(&session)?;

    let path = ctx.ws.role_home(&role);
    let branch = ctx
        .git()
        .current_branch(&path)
        .ok()
        .filter(|b| b.starts_with("raider/"));
    let dir = ctx.ws.raiders_dir(rig).join(name);
    ctx.worktrees().remove(&ctx.ws, rig, &dir, true)?;

    if let Some(branch) = branch {
        match ctx.git().branch_delete(&ctx.ws.canonical_clone(rig), &branch, true) {
            Ok(()) => out.branch_deleted = Some(branch),
            Err(e) => tracing::warn!(%branch, error = %e, "failed to delete raider branch"),
        }
    }
    out.record_deleted = ctx.records().nuke(&role)?;
    ctx.emit(EventKind::Kill, &ctx.actor(), &role.identity());
    tracing::info!(raider = %role, "raider nuked");
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitState {
    pub branch: String,
    pub base: String,
    pub ahead: u32,
    pub behind: u32,
    pub modified: Vec<String>,
    pub stashes: usize,
    pub last_commit: Option<String>,
    pub cleanup: CleanupStatus,
}

pub fn git_state(ctx: &HordeContext, rig: &str, name: &str) -> Result<GitState> {
    let (role, _) = existing(ctx, rig, name)?;
    let path = ctx.ws.role_home(&role);
    let default_branch = ctx.ws.warband(rig)?.default_branch.clone();
    let base = format!("origin/{default_branch}");
    let git = ctx.git();
    Ok(GitState {
        branch: git.current_branch(&path)?,
        ahead: git.commits_ahead(&path, &base)?,
        behind: git.commits_behind(&path, &base)?,
        modified: git.modified_files(&path)?,
        stashes: git.stash_count(&path)?,
        last_commit: git.last_commit(&path).ok(),
        cleanup: git.cleanup_status(&path, &default_branch),
        base,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleRaider {
    pub role: Role,
    pub age: Duration,
}

/// Raiders with no live session and nothing hooked whose worktree is older
/// than `raider.stale_hours`.
pub fn stale(ctx: &HordeContext, rig: Option<&str>) -> Result<Vec<StaleRaider>> {
    let limit = Duration::hours(i64::try_from(ctx.config.raider.stale_hours).unwrap_or(i64::MAX / 3600));
    let mut out = Vec::new();
    for info in list(ctx, rig)? {
        if info.running || info.hook.is_some() {
            continue;
        }
        let Some(age) = worktree_age(&info.path) else {
            continue;
        };
        if age > limit {
            out.push(StaleRaider { role: info.role, age });
        }
    }
    Ok(out)
}

/// Delete local `raider/*` branches that no worktree has checked out.
pub fn gc(ctx: &HordeContext, rig: &str, dry_run: bool) -> Result<Vec<String>> {
    ctx.ws.warband(rig)?;
    let canonical = ctx.ws.canonical_clone(rig);
    let git = ctx.git();
    let used = git
        .worktree_list(&canonical)?
        .into_iter()
        .filter_map(|w| w.branch)
        .collect::<Vec<_>>();
    let mut deleted = Vec::new();
    for branch in git.local_branches(&canonical, "raider/")? {
        if used.contains(&branch) {
            continue;
        }
        if !dry_run {
            git.branch_delete(&canonical, &branch, true)?;
        }
        deleted.push(branch);
    }
    tracing::info!(rig, count = deleted.len(), dry_run, "raider branches collected");
    Ok(deleted)
}
