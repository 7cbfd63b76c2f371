//! Crew management: long-lived, human-directed workers in
//! `<rig>/clan/<name>/warband` on branch `clan/<name>`.

use std::path::PathBuf;

use hd_core::events::EventKind;
use hd_core::types::{CleanupStatus, Role};
use hd_core::worktree::{agent_names, crew_branch, AgentWorktree};
use hd_session::beacon::{Beacon, TOPIC_REFRESH, TOPIC_START};
use hd_session::bridge::StartOutcome;
use hd_session::naming::validate_agent_name;

use crate::context::HordeContext;
use crate::error::{HordeError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrewInfo {
    pub role: Role,
    pub path: PathBuf,
    pub branch: Option<String>,
    pub running: bool,
    pub hook: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrewStatus {
    pub info: CrewInfo,
    pub session: String,
    pub cleanup: CleanupStatus,
    pub last_commit: Option<String>,
    pub unread: usize,
}

fn crew(rig: &str, name: &str) -> Role {
    Role::Crew {
        rig: rig.to_string(),
        name: name.to_string(),
    }
}

fn existing(ctx: &HordeContext, rig: &str, name: &str) -> Result<(Role, PathBuf)> {
    ctx.ws.warband(rig)?;
    let role = crew(rig, name);
    let dir = ctx.ws.clan_dir(rig).join(name);
    if !dir.is_dir() {
        return Err(HordeError::preflight(
            format!("no crew member {role}"),
            "list the clan with `hd crew list`",
        ));
    }
    Ok((role, dir))
}

fn describe(ctx: &HordeContext, role: Role) -> Result<CrewInfo> {
    let path = ctx.ws.role_home(&role);
    Ok(CrewInfo {
        branch: ctx.git().current_branch(&path).ok(),
        running: ctx.is_running(&role)?,
        hook: ctx.records().get(&role)?.and_then(|r| r.hook),
        path,
        role,
    })
}

pub fn add(ctx: &HordeContext, rig: &str, name: &str) -> Result<(Role, AgentWorktree)> {
    validate_agent_name(name).map_err(|e| {
        HordeError::preflight(format!("invalid crew name {name:?}: {e}"), "use [a-z0-9_-]")
    })?;
    ctx.ws.warband(rig)?;
    let role = crew(rig, name);
    let worktree = ctx.worktrees().create_crew(&ctx.ws, rig, name)?;
    ctx.records().ensure(&role)?;
    tracing::info!(crew = %role, branch = %worktree.branch, "crew member added");
    Ok((role, worktree))
}

pub fn list(ctx: &HordeContext, rig: Option<&str>) -> Result<Vec<CrewInfo>> {
    let rigs = match rig {
        Some(rig) => {
            ctx.ws.warband(rig)?;
            vec![rig.to_string()]
        }
        None => ctx.ws.warband_names(),
    };
    let mut out = Vec::new();
    for rig in rigs {
        for name in agent_names(&ctx.ws.clan_dir(&rig)) {
            out.push(describe(ctx, crew(&rig, &name))?);
        }
    }
    Ok(out)
}

pub fn status(ctx: &HordeContext, rig: &str, name: &str) -> Result<CrewStatus> {
    let (role, _) = existing(ctx, rig, name)?;
    let info = describe(ctx, role)?;
    let default_branch = &ctx.ws.warband(rig)?.default_branch;
    let git = ctx.git();
    let (cleanup, last_commit) = if info.path.exists() {
        (
            git.cleanup_status(&info.path, default_branch),
            git.last_commit(&info.path).ok(),
        )
    } else {
        (CleanupStatus::Unknown, None)
    };
    Ok(CrewStatus {
        session: ctx.session_name(&info.role)?,
        unread: ctx.drums.unread_count(&info.role.identity())?,
        info,
        cleanup,
        last_commit,
    })
}

pub async fn start(ctx: &HordeContext, rig: &str, name: &str) -> Result<(String, StartOutcome)> {
    let (role, _) = existing(ctx, rig, name)?;
    let hook = ctx.records().hook_of(&role)?;
    let (session, outcome) = ctx.start_agent(&role, TOPIC_START, hook.as_deref()).await?;
    match outcome {
        StartOutcome::Created => ctx.emit(EventKind::Spawn, &role.identity(), &session),
        StartOutcome::Restarted => ctx.emit(EventKind::Wake, &role.identity(), &session),
        _ => {}
    }
    Ok((session, outcome))
}

/// Kill the session. Returns whether one was running.
pub fn stop(ctx: &HordeContext, rig: &str, name: &str) -> Result<bool> {
    let (role, _) = existing(ctx, rig, name)?;
    let session = ctx.session_name(&role)?;
    let killed = ctx.sessions.kill(&session)?;
    if killed {
        ctx.emit(EventKind::Kill, &ctx.actor(), &role.identity());
    }
    Ok(killed)
}

/// Start the session if needed, then attach the terminal to it.
pub async fn at(ctx: &HordeContext, rig: &str, name: &str) -> Result<String> {
    let (session, outcome) = start(ctx, rig, name).await?;
    let target = match outcome {
        StartOutcome::Reused(other) => other,
        _ => session,
    };
    ctx.sessions.attach(&target)?;
    Ok(target)
}

pub async fn restart(ctx: &HordeContext, rig: &str, name: &str) -> Result<(String, StartOutcome)> {
    stop(ctx, rig, name)?;
    start(ctx, rig, name).await
}

/// Hand the crew member off to a fresh runtime: leave a handoff drum in
/// its own inbox and respawn the pane with topic `refresh`.
pub fn refresh(ctx: &HordeContext, rig: &str, name: &str, note: Option<&str>) -> Result<()> {
    let (role, _) = existing(ctx, rig, name)?;
    let session = ctx.session_name(&role)?;
    if !ctx.sessions.has_session(&session)? {
        return Err(HordeError::preflight(
            format!("{role} has no session"),
            "start it with `hd crew start`",
        ));
    }
    let identity = role.identity();
    let hook = ctx.records().hook_of(&role)?;
    let mut body = String::from("Context refresh. Pick up where you left off.");
    if let Some(hook) = &hook {
        body.push_str(&format!("\nHooked: {hook}"));
    }
    if let Some(note) = note {
        body.push_str(&format!("\n\n{note}"));
    }
    ctx.notify(&identity, &identity, "HANDOFF", &body);

    let mut beacon = Beacon::new(identity.clone(), TOPIC_REFRESH);
    if let Some(hook) = hook {
        beacon = beacon.with_hook(hook);
    }
    ctx.sessions.respawn(&session, &beacon)?;
    ctx.emit(EventKind::Handoff, &identity, &session);
    tracing::info!(crew = %role, "crew refreshed");
    Ok(())
}

pub fn remove(ctx: &HordeContext, rig: &str, name: &str, force: bool) -> Result<()> {
    let (role, dir) = existing(ctx, rig, name)?;
    let path = ctx.ws.role_home(&role);
    if !force && path.exists() && ctx.git().has_uncommitted(&path)? {
        return Err(HordeError::precondition(
            format!("{role} has uncommitted changes"),
            "commit or discard them, or pass --force",
        ));
    }
    let session = ctx.session_name(&role)?;
    if ctx.sessions.kill(&session)? {
        ctx.emit(EventKind::Kill, &ctx.actor(), &role.identity());
    }
    ctx.worktrees().remove(&ctx.ws, rig, &dir, force)?;
    ctx.records().nuke(&role)?;
    tracing::info!(crew = %role, "crew member removed");
    Ok(())
}

/// Rename a stopped crew member: worktree, branch and agent record.
pub fn rename(ctx: &HordeContext, rig: &str, from: &str, to: &str) -> Result<Role> {
    let (old, old_dir) = existing(ctx, rig, from)?;
    validate_agent_name(to).map_err(|e| {
        HordeError::preflight(format!("invalid crew name {to:?}: {e}"), "use [a-z0-9_-]")
    })?;
    if ctx.is_running(&old)? {
        return Err(HordeError::precondition(
            format!("{old} has a running session"),
            "stop it first with `hd crew stop`",
        ));
    }
    let new = crew(rig, to);
    let new_home = ctx.ws.role_home(&new);
    ctx.worktrees()
        .relocate(&ctx.ws, rig, &ctx.ws.role_home(&old), &new_home)?;
    if old_dir.exists() {
        std::fs::remove_dir_all(&old_dir)?;
    }
    ctx.git().branch_rename(
        &ctx.ws.canonical_clone(rig),
        &crew_branch(from),
        &crew_branch(to),
    )?;
    ctx.records().rename(&old, &new)?;
    tracing::info!(from = %old, to = %new, "crew member renamed");
    Ok(new)
}

/// Fast-forward a clean crew worktree from `origin/<default>`.
pub fn pristine(ctx: &HordeContext, rig: &str, name: &str) -> Result<()> {
    let (role, _) = existing(ctx, rig, name)?;
    let path = ctx.ws.role_home(&role);
    let git = ctx.git();
    if git.has_uncommitted(&path)? {
        return Err(HordeError::precondition(
            format!("{role} has uncommitted changes"),
            "commit or stash them first",
        ));
    }
    let default_branch = ctx.ws.warband(rig)?.default_branch.clone();
    git.fetch(&path, "origin")?;
    git.pull_ff_only(&path, "origin", &default_branch)?;
    tracing::info!(crew = %role, branch = %default_branch, "crew worktree fast-forwarded");
    Ok(())
}
