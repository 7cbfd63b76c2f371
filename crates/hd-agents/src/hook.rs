//! The work-claim protocol: charge and unsling.
//!
//! Charge writes the agent record's hook slot before it touches the work
//! item, so a reader that sees the item hooked always finds the record
//! pointing back. Readers reconcile towards the record
//! (see [`RecordStore::hook_of`](crate::records::RecordStore::hook_of)).

use hd_core::events::EventKind;
use hd_core::ledger::{LedgerError, WorkItemUpdate};
use hd_core::types::{Role, WorkItem, WorkStatus};
use hd_core::workspace::Workspace;
use hd_core::worktree::agent_names;
use hd_session::beacon::TOPIC_ASSIGNED;
use hd_session::bridge::StartOutcome;

use crate::context::HordeContext;
use crate::error::{HordeError, Result};
use crate::namepool;
use crate::resolver::Overrides;

/// Label recording who dispatched an item.
pub const DISPATCHED_BY: &str = "dispatched_by";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeTarget {
    /// The caller's own role.
    SelfAgent,
    /// A raider spawned for this item.
    FreshRaider { rig: String },
    Agent(Role),
}

/// Parse the target argument of `hd charge`.
///
/// Empty means self, a bare warband name spawns a fresh raider, anything
/// else must be an identity.
pub fn parse_target(ws: &Workspace, raw: Option<&str>) -> Result<ChargeTarget> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Ok(ChargeTarget::SelfAgent);
    }
    let bare = raw.trim_end_matches('/');
    if ws.is_warband(bare) {
        return Ok(ChargeTarget::FreshRaider { rig: bare.to_string() });
    }
    let role = Role::from_identity(raw).map_err(|e| {
        HordeError::preflight(
            format!("invalid charge target {raw:?}: {e}"),
            "use a warband name or an identity such as horde/raiders/nux",
        )
    })?;
    if let Some(rig) = role.rig() {
        ws.warband(rig)?;
    }
    Ok(ChargeTarget::Agent(role))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChargeOptions {
    /// Take the item from another agent and overwrite a live hook.
    pub force: bool,
    /// Spawn the named raider when it does not exist yet.
    pub create: bool,
    /// Hook only; leave existing sessions alone.
    pub no_start: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeOutcome {
    pub item_id: String,
    pub role: Role,
    pub session: String,
    pub spawned: bool,
    pub started: Option<StartOutcome>,
    pub nudged: bool,
    /// The target already held this item; nothing changed.
    pub unchanged: bool,
}

fn dispatch_labels(item: &WorkItem) -> Vec<String> {
    item.labels
        .iter()
        .filter(|l| l.starts_with(&format!("{DISPATCHED_BY}:")))
        .cloned()
        .collect()
}

/// Apply `update` to `item`, refusing status edges the hook state machine
/// does not have.
pub(crate) fn transition(ctx: &HordeContext, item: &WorkItem, update: &WorkItemUpdate) -> Result<()> {
    if let Some(target) = &update.status {
        if !item.status.can_transition_to(target) {
            return Err(HordeError::precondition(
                format!("{} cannot go from {} to {target}", item.id, item.status),
                "check the item in the ledger",
            ));
        }
    }
    ctx.ledgers.for_id(&item.id)?.update(&item.id, update)?;
    Ok(())
}

/// Move `item` to `status`, dropping its assignee and dispatcher.
pub(crate) fn release(ctx: &HordeContext, item: &WorkItem, status: WorkStatus) -> Result<()> {
    let mut update = WorkItemUpdate::status(status).with_assignee(None);
    update.remove_labels = dispatch_labels(item);
    transition(ctx, item, &update)
}

fn start_prompt(item: &WorkItem) -> String {
    format!(
        "New work on your hook: {} ({}). Check your drums, then begin.",
        item.id, item.title
    )
}

/// Assign `item_id` to `target`, spawning a raider when asked to.
pub async fn charge(
    ctx: &HordeContext,
    item_id: &str,
    target: ChargeTarget,
    opts: &ChargeOptions,
) -> Result<ChargeOutcome> {
    let item = ctx.ledgers.get(item_id)?;
    if !item.status.can_transition_to(&WorkStatus::Hooked) {
        let (what, hint) = match item.status {
            WorkStatus::Pinned => (
                format!("{item_id} is already pinned"),
                "pinned items cannot be charged; unpin it in the ledger first",
            ),
            status => (format!("{item_id} is {status}"), "reopen it first or pick another item"),
        };
        return Err(HordeError::preflight(what, hint));
    }

    let records = ctx.records();
    let (role, spawn) = match target {
        ChargeTarget::SelfAgent => (ctx.whoami(&Overrides::default())?.role, false),
        ChargeTarget::FreshRaider { rig } => {
            ctx.ws.warband(&rig)?;
            let taken = agent_names(&ctx.ws.raiders_dir(&rig));
            let name = namepool::allocate(&ctx.config.raider.name_theme, &taken)
                .map_err(|e| HordeError::preflight(e, "free a raider name with `hd raider nuke`"))?;
            (Role::Raider { rig, name }, true)
        }
        ChargeTarget::Agent(role) => {
            let exists = match ctx.ws.agent_dir(&role) {
                Some(dir) => dir.exists(),
                None => true,
            };
            let spawn = !exists && opts.create && matches!(role, Role::Raider { .. });
            if !exists && !spawn {
                return Err(HordeError::preflight(
                    format!("{role} does not exist"),
                    "pass --create to spawn it, or charge a warband for a fresh raider",
                ));
            }
            (role, spawn)
        }
    };
    let identity = role.identity();
    let session = ctx.session_name(&role)?;

    // Another agent holds the item.
    let held_by = item
        .assignee
        .clone()
        .filter(|_| matches!(item.status, WorkStatus::Hooked | WorkStatus::InProgress));
    if let Some(owner) = held_by.as_deref().filter(|o| *o != identity) {
        if !opts.force {
            return Err(HordeError::preflight(
                format!("{item_id} is already hooked to {owner}"),
                "unsling it first or pass --force",
            ));
        }
        tracing::warn!(item = item_id, previous = owner, "taking hooked item from another agent");
        if let Ok(prev) = Role::from_identity(owner) {
            match records.get(&prev) {
                Ok(Some(rec)) if rec.hook.as_deref() == Some(item_id) => {
                    records.set_hook(&prev, None)?;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(previous = owner, error = %e, "could not clear previous hook"),
            }
        }
    }

    // The target already carries live work.
    if !spawn {
        if let Some(current) = records.get(&role)?.and_then(|r| r.hook) {
            if current == item_id && held_by.as_deref() == Some(identity.as_str()) {
                tracing::info!(item = item_id, target = %identity, "already hooked");
                return Ok(ChargeOutcome {
                    item_id: item_id.to_string(),
                    role,
                    session,
                    spawned: false,
                    started: None,
                    nudged: false,
                    unchanged: true,
                });
            }
            let live = if current == item_id {
                None
            } else {
                match ctx.ledgers.get(&current) {
                    Ok(other) if !other.status.is_terminal() => Some(other),
                    Ok(_) | Err(LedgerError::NotFound(_)) => None,
                    Err(e) => return Err(e.into()),
                }
            };
            if let Some(other) = live {
                if !opts.force {
                    return Err(HordeError::preflight(
                        format!("{identity} already has {current} on its hook"),
                        "unsling it first or pass --force",
                    ));
                }
                // One hooked item per agent: the displaced item goes back to open.
                let ours = other.assignee.as_deref() == Some(identity.as_str())
                    && matches!(other.status, WorkStatus::Hooked | WorkStatus::InProgress);
                if ours {
                    release(ctx, &other, WorkStatus::Open)?;
                }
                tracing::warn!(target = %identity, previous = %current, released = ours, "overwriting live hook");
            }
        }
    }

    let actor = ctx.actor();
    if let (true, Role::Raider { rig, name }) = (spawn, &role) {
        let worktree = ctx.worktrees().create_raider(&ctx.ws, rig, name)?;
        tracing::info!(raider = %identity, branch = %worktree.branch, "raider spawned");
    }

    // Record first, then the item.
    records.ensure(&role)?;
    records.set_hook(&role, Some(item_id))?;
    let mut update = WorkItemUpdate::status(WorkStatus::Hooked).with_assignee(Some(identity.clone()));
    update.remove_labels = dispatch_labels(&item);
    update.add_labels = vec![format!("{DISPATCHED_BY}:{actor}")];
    transition(ctx, &item, &update)?;
    tracing::info!(item = item_id, target = %identity, "hooked");

    let mut started = None;
    let mut nudged = false;
    if spawn || (!opts.no_start && !ctx.sessions.is_agent_running(&session)?) {
        let (_, outcome) = ctx.start_agent(&role, TOPIC_ASSIGNED, Some(item_id)).await?;
        match outcome {
            StartOutcome::Created => ctx.emit(EventKind::Spawn, &identity, &format!("hooked {item_id}")),
            StartOutcome::Restarted => ctx.emit(EventKind::Wake, &identity, &format!("hooked {item_id}")),
            StartOutcome::AlreadyRunning | StartOutcome::Reused(_) => {}
        }
        started = Some(outcome);
    } else if !opts.no_start {
        ctx.sessions.inject_prompt(&session, &start_prompt(&item))?;
        ctx.emit(EventKind::Nudge, &identity, &format!("hooked {item_id}"));
        nudged = true;
    }

    ctx.notify(
        &identity,
        &actor,
        &format!("HOOKED {item_id}"),
        &format!("{}\n\n{}", item.title, item.description),
    );

    Ok(ChargeOutcome {
        item_id: item_id.to_string(),
        role,
        session,
        spawned: spawn,
        started,
        nudged,
        unchanged: false,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnslingOutcome {
    pub role: Role,
    pub item_id: String,
    /// The item was put back to `open`.
    pub reverted: bool,
}

/// Release `role`'s hook.
///
/// Refused unless the hooked item is closed or `force` is set. A hooked
/// item is reverted to `open` and loses its assignee.
pub fn unsling(
    ctx: &HordeContext,
    item_id: Option<&str>,
    role: Option<Role>,
    force: bool,
) -> Result<UnslingOutcome> {
    let role = match role {
        Some(role) => role,
        None => ctx.whoami(&Overrides::default())?.role,
    };
    let records = ctx.records();
    let hook = records.get(&role)?.and_then(|r| r.hook);
    let item_id = match (item_id, hook.as_deref()) {
        (Some(given), Some(current)) if given != current && !force => {
            return Err(HordeError::preflight(
                format!("{role} has {current} on its hook, not {given}"),
                "pass the hooked item or --force",
            ));
        }
        (Some(given), _) => given.to_string(),
        (None, Some(current)) => current.to_string(),
        (None, None) => {
            return Err(HordeError::preflight(
                format!("{role} has nothing on its hook"),
                "nothing to unsling",
            ))
        }
    };

    let item = match ctx.ledgers.get(&item_id) {
        Ok(item) => Some(item),
        Err(LedgerError::NotFound(_)) if force => None,
        Err(e) => return Err(e.into()),
    };
    if let Some(item) = &item {
        if item.status != WorkStatus::Closed && !force {
            return Err(HordeError::precondition(
                format!("{item_id} is {} and not closed", item.status),
                "finish it with `hd done`, or pass --force to release it anyway",
            ));
        }
    }

    if hook.as_deref() == Some(item_id.as_str()) {
        records.set_hook(&role, None)?;
    }

    let mut reverted = false;
    if let Some(item) = item.filter(|i| i.status == WorkStatus::Hooked) {
        release(ctx, &item, WorkStatus::Open)?;
        reverted = true;
    }
    tracing::info!(item = %item_id, target = %role, reverted, "unslung");
    Ok(UnslingOutcome {
        role,
        item_id,
        reverted,
    })
}
