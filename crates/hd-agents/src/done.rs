//! `hd done`: the completion protocol for raiders and crew.
//!
//! Ordering is fixed: guards, push, merge request, then the tail (item,
//! hook, state, cleanup status, event, drums, self-nuke). Nothing in the
//! tail can fail the command; problems become warnings for the Witness
//! to reconcile.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use hd_core::events::EventKind;
use hd_core::ledger::{ListFilter, NewWorkItem, WorkItemUpdate};
use hd_core::types::{AgentState, CleanupStatus, ItemType, Role, WorkItem, WorkStatus};
use hd_core::worktree::issue_of_branch;

use crate::context::HordeContext;
use crate::error::{HordeError, Result};
use crate::hook::{release, DISPATCHED_BY};
use crate::resolver::Overrides;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitKind {
    Completed,
    Escalated,
    Deferred,
    PhaseComplete { gate: String },
}

impl ExitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitKind::Completed => "COMPLETED",
            ExitKind::Escalated => "ESCALATED",
            ExitKind::Deferred => "DEFERRED",
            ExitKind::PhaseComplete { .. } => "PHASE_COMPLETE",
        }
    }

    /// Combine `--status` and `--phase-complete --gate`.
    pub fn from_flags(status: Option<&str>, phase_complete: bool, gate: Option<&str>) -> Result<Self> {
        if phase_complete {
            if status.is_some() {
                return Err(HordeError::preflight(
                    "--phase-complete cannot be combined with --status",
                    "pick one exit kind",
                ));
            }
            let gate = gate.filter(|g| !g.trim().is_empty()).ok_or_else(|| {
                HordeError::preflight("--phase-complete needs a gate", "pass --gate <id>")
            })?;
            return Ok(ExitKind::PhaseComplete { gate: gate.to_string() });
        }
        match status {
            None => Ok(ExitKind::Completed),
            Some(s) => s.parse(),
        }
    }
}

impl FromStr for ExitKind {
    type Err = HordeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "COMPLETED" => Ok(ExitKind::Completed),
            "ESCALATED" => Ok(ExitKind::Escalated),
            "DEFERRED" => Ok(ExitKind::Deferred),
            "PHASE_COMPLETE" => Err(HordeError::preflight(
                "PHASE_COMPLETE needs a gate",
                "use --phase-complete --gate <id>",
            )),
            other => Err(HordeError::preflight(
                format!("unknown exit status {other:?}"),
                "use COMPLETED, ESCALATED or DEFERRED",
            )),
        }
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoneOptions {
    pub exit: ExitKind,
    /// Source item; defaults to the branch name, then the hook.
    pub issue: Option<String>,
    /// Operator-supplied cleanup status; detected from git otherwise.
    pub cleanup_status: Option<CleanupStatus>,
}

impl DoneOptions {
    pub fn new(exit: ExitKind) -> Self {
        Self {
            exit,
            issue: None,
            cleanup_status: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoneOutcome {
    pub issue: Option<String>,
    pub branch: String,
    pub mr_id: Option<String>,
    pub mr_reused: bool,
    pub cleanup_status: Option<CleanupStatus>,
    pub warnings: Vec<String>,
    /// The worktree was removed and the session killed.
    pub nuked: bool,
}

impl DoneOutcome {
    fn soft<T>(&mut self, what: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(step = what, error = %e, "done: step failed, continuing");
                self.warnings.push(format!("{what}: {e}"));
                None
            }
        }
    }
}

fn mr_description(
    branch: &str,
    target: &str,
    issue: Option<&str>,
    rig: &str,
    worker: &str,
    record_id: &str,
) -> String {
    [
        format!("branch: {branch}"),
        format!("target: {target}"),
        format!("source_issue: {}", issue.unwrap_or("null")),
        format!("rig: {rig}"),
        format!("worker: {worker}"),
        format!("agent_bead: {record_id}"),
        "retry_count: 0".to_string(),
    ]
    .join("\n")
}

fn close_item(ctx: &HordeContext, item: &WorkItem, reason: &str) -> Result<()> {
    if !item.status.can_transition_to(&WorkStatus::Closed) {
        return Err(HordeError::precondition(
            format!("{} is {} and cannot be closed", item.id, item.status),
            "the Witness will reconcile it",
        ));
    }
    if item.status != WorkStatus::Closed {
        ctx.ledgers.for_id(&item.id)?.close(&item.id, Some(reason))?;
    }
    Ok(())
}

/// Run the completion protocol for the calling raider or crew member.
pub fn done(ctx: &HordeContext, opts: &DoneOptions) -> Result<DoneOutcome> {
    let role = ctx.whoami(&Overrides::default())?.role;
    let (rig, name) = match &role {
        Role::Raider { rig, name } | Role::Crew { rig, name } => (rig.clone(), name.clone()),
        other => {
            return Err(HordeError::preflight(
                format!("done applies to raiders and crew, not {}", other.kind()),
                "run it from a raider or crew worktree",
            ))
        }
    };
    let identity = role.identity();
    let session = ctx.session_name(&role)?;
    let records = ctx.records();
    let git = ctx.git();
    let default_branch = ctx.ws.warband(&rig)?.default_branch.clone();

    // The working directory may already be gone.
    let workdir = ctx
        .env
        .get("HD_RAIDER_PATH")
        .map(PathBuf::from)
        .filter(|p| p.exists())
        .unwrap_or_else(|| ctx.ws.role_home(&role));

    let branch = match git.current_branch(&workdir) {
        Ok(b) if !b.is_empty() && b != "HEAD" => b,
        detected => ctx.env.get("HD_BRANCH").map(str::to_string).ok_or_else(|| {
            let why = detected.err().map(|e| e.to_string()).unwrap_or_else(|| "detached HEAD".into());
            HordeError::preflight(format!("cannot determine the branch: {why}"), "set HD_BRANCH")
        })?,
    };

    let hook = records.get(&role)?.and_then(|r| r.hook);
    let issue_id = opts
        .issue
        .clone()
        .or_else(|| issue_of_branch(&branch).map(str::to_string))
        .or_else(|| hook.clone());
    let issue: Option<WorkItem> = match &issue_id {
        Some(id) => Some(ctx.ledgers.get(id)?),
        None => None,
    };

    let gate = match &opts.exit {
        ExitKind::PhaseComplete { gate } => Some(ctx.ledgers.get(gate)?),
        _ => None,
    };

    let mut out = DoneOutcome {
        issue: issue_id.clone(),
        branch: branch.clone(),
        ..Default::default()
    };

    if opts.exit == ExitKind::Completed {
        if branch == default_branch {
            return Err(HordeError::preflight(
                format!("on the default branch {default_branch}"),
                "done must run on the worker's own branch",
            ));
        }
        if git.has_uncommitted(&workdir)? {
            return Err(HordeError::precondition(
                "uncommitted changes in the worktree",
                "commit or stash them, or exit with --status ESCALATED",
            ));
        }
        let base = format!("origin/{default_branch}");
        if git.commits_ahead(&workdir, &base)? == 0 {
            return Err(HordeError::precondition(
                format!("zero commits ahead of {base}"),
                "commit your work first, or exit with --status DEFERRED",
            ));
        }
        git.push(&workdir, "origin", &branch).map_err(|e| {
            HordeError::precondition(
                format!("push of {branch} failed: {e}"),
                "fix the remote and rerun `hd done`; nothing was recorded",
            )
        })?;
        tracing::info!(%branch, "branch pushed");

        let rig_ledger = records.rig_ledger(&rig)?;
        let existing = rig_ledger
            .list(&ListFilter::of_type(ItemType::MergeRequest))?
            .into_iter()
            .find(|mr| {
                !mr.status.is_terminal() && mr.description_field("branch").as_deref() == Some(branch.as_str())
            });
        let mr_id = match existing {
            Some(mr) => {
                tracing::info!(mr = %mr.id, %branch, "reusing merge request");
                out.mr_reused = true;
                mr.id
            }
            None => {
                let record_id = records.record_id(&role)?;
                let new = NewWorkItem::new(ItemType::MergeRequest, format!("Merge {branch}"))
                    .with_description(mr_description(
                        &branch,
                        &default_branch,
                        issue_id.as_deref(),
                        &rig,
                        &name,
                        &record_id,
                    ))
                    .ephemeral();
                let mr = rig_ledger.create(&new)?;
                tracing::info!(mr = %mr.id, %branch, "merge request created");
                mr.id
            }
        };
        out.mr_id = Some(mr_id.clone());
        out.soft("record active MR", records.set_active_mr(&role, Some(&mr_id)));
    }

    if let Some(gate) = &gate {
        let update = WorkItemUpdate {
            add_labels: vec![format!("waiter:{identity}")],
            ..Default::default()
        };
        let result = ctx
            .ledgers
            .for_id(&gate.id)
            .and_then(|l| l.update(&gate.id, &update))
            .map_err(HordeError::from);
        out.soft("register gate waiter", result);
    }

    // The hooked item is closed whatever the exit kind. A different source
    // item is closed on completion and released otherwise.
    let reason = format!("{} by {identity}", opts.exit);
    if let Some(item) = &issue {
        let result = if hook.as_deref() == Some(item.id.as_str()) || opts.exit == ExitKind::Completed {
            close_item(ctx, item, &reason)
        } else {
            let parked = match opts.exit {
                ExitKind::Deferred => WorkStatus::Deferred,
                _ => WorkStatus::Open,
            };
            release(ctx, item, parked)
        };
        out.soft("update source item", result);
    }
    if let Some(hooked) = hook.as_deref().filter(|h| Some(*h) != issue_id.as_deref()) {
        let result = ctx
            .ledgers
            .get(hooked)
            .map_err(HordeError::from)
            .and_then(|item| close_item(ctx, &item, &reason));
        out.soft("close hooked item", result);
    }

    out.soft("clear hook", records.set_hook(&role, None));
    let state = match &opts.exit {
        ExitKind::Escalated => records.set_state(&role, AgentState::Stuck),
        ExitKind::PhaseComplete { .. } => records.set_state(&role, AgentState::AwaitingGate),
        _ => records.reset_state(&role),
    };
    out.soft("set agent state", state);

    let cleanup = opts
        .cleanup_status
        .unwrap_or_else(|| git.cleanup_status(&workdir, &default_branch));
    out.cleanup_status = Some(cleanup);
    out.soft("record cleanup status", records.set_cleanup_status(&role, cleanup));

    let detail = format!(
        "{} {} mr={}",
        opts.exit,
        issue_id.as_deref().unwrap_or("-"),
        out.mr_id.as_deref().unwrap_or("-")
    );
    ctx.emit(EventKind::Done, &identity, &detail);

    let body = format!(
        "exit: {}\nissue: {}\nbranch: {branch}\nmr: {}\ncleanup_status: {cleanup}",
        opts.exit,
        issue_id.as_deref().unwrap_or("null"),
        out.mr_id.as_deref().unwrap_or("null"),
    );
    let witness = Role::Witness { rig: rig.clone() }.identity();
    if !ctx.notify(&witness, &identity, &format!("RAIDER_DONE {name}"), &body) {
        out.warnings.push(format!("could not notify {witness}"));
    }
    if let Some(dispatcher) = issue.as_ref().and_then(|i| i.label_value(DISPATCHED_BY)) {
        if dispatcher != witness && dispatcher != identity {
            ctx.notify(dispatcher, &identity, &format!("DONE {}", opts.exit), &body);
        }
    }

    if opts.exit == ExitKind::Completed && matches!(role, Role::Raider { .. }) {
        if let Some(agent_dir) = ctx.ws.agent_dir(&role) {
            let removed = ctx
                .worktrees()
                .remove(&ctx.ws, &rig, &agent_dir, true)
                .map_err(HordeError::from);
            out.nuked = out.soft("remove worktree", removed).is_some();
        }
        let deleted = git
            .branch_delete(&ctx.ws.canonical_clone(&rig), &branch, true)
            .map_err(HordeError::from);
        out.soft("delete local branch", deleted);
        tracing::info!(%session, "self-nuke: killing session");
        let killed = ctx.sessions.kill(&session).map_err(HordeError::from);
        out.soft("kill session", killed);
    }

    Ok(out)
}
