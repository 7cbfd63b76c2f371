//! Raids: persistent trackers in the HQ ledger that follow work items
//! across warbands through non-blocking `tracks` edges.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{Duration, Utc};
use hd_core::ids::{short_token, Ref};
use hd_core::ledger::{ListFilter, NewWorkItem, WorkItemUpdate};
use hd_core::types::{DependencyKind, ItemType, Role, WorkItem, WorkStatus};

use crate::context::HordeContext;
use crate::error::{HordeError, Result};

pub const RAID_ID_PREFIX: &str = "hq-cv-";
pub const LANDED_REASON: &str = "All tracked issues completed";
const HQ_HOME: &str = "hq-";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewRaid {
    pub name: Option<String>,
    pub items: Vec<String>,
    pub owner: Option<String>,
    pub notify: Option<String>,
    pub totem: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedItem {
    pub id: String,
    pub title: String,
    /// `None` when the item could not be found.
    pub status: Option<WorkStatus>,
    pub worker: Option<String>,
    /// Time since the worker's session last saw activity.
    pub idle: Option<Duration>,
}

impl TrackedItem {
    pub fn symbol(&self) -> &'static str {
        self.status.as_ref().map_or("?", WorkStatus::symbol)
    }

    pub fn is_done(&self) -> bool {
        self.status.is_some_and(|s| s.is_terminal())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RaidStatus {
    pub raid: WorkItem,
    pub items: Vec<TrackedItem>,
}

impl RaidStatus {
    pub fn closed(&self) -> usize {
        self.items.iter().filter(|i| i.is_done()).count()
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// `closed/total`
    pub fn progress(&self) -> String {
        format!("{}/{}", self.closed(), self.total())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landed {
    pub raid_id: String,
    pub notified: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stranded {
    pub raid: WorkItem,
    pub ready: Vec<WorkItem>,
}

/// Addresses recorded in a raid's `Owner:` and `Notify:` lines, deduplicated.
pub fn subscribers(raid: &WorkItem) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    let fields = ["owner", "notify"]
        .into_iter()
        .filter_map(|k| raid.description_field(k));
    for field in fields {
        for addr in field.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            if seen.insert(addr.to_string()) {
                out.push(addr.to_string());
            }
        }
    }
    out
}

fn load_raid(ctx: &HordeContext, raid_id: &str) -> Result<WorkItem> {
    let raid = ctx.ledgers.get(raid_id)?;
    if raid.item_type != ItemType::Raid {
        return Err(HordeError::preflight(
            format!("{raid_id} is a {}, not a raid", raid.item_type),
            "list raids with `hd raid list`",
        ));
    }
    Ok(raid)
}

fn open_raids(ctx: &HordeContext, include_closed: bool) -> Result<Vec<WorkItem>> {
    let hq = ctx.ledgers.hq();
    let raids = hq.list(&ListFilter::of_type(ItemType::Raid))?;
    let mut raids = raids
        .into_iter()
        .filter(|r| include_closed || !r.status.is_terminal())
        .collect::<Vec<_>>();
    raids.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(raids)
}

async fn tracked_items(ctx: &HordeContext, raids: &[WorkItem]) -> Result<HashMap<String, WorkItem>> {
    let refs = raids.iter().flat_map(WorkItem::tracked).collect::<Vec<_>>();
    if refs.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(ctx.ledgers.show_refs(&refs).await?)
}

/// Create a raid tracking `items`. Without a name, the first item's title
/// is used.
pub async fn create(ctx: &HordeContext, spec: &NewRaid) -> Result<WorkItem> {
    if spec.items.is_empty() && spec.name.is_none() {
        return Err(HordeError::preflight(
            "a raid needs a name or at least one item",
            "pass --name or some item ids",
        ));
    }
    let refs = spec.items.iter().map(|i| Ref::Local(i.clone())).collect::<Vec<_>>();
    let found = if refs.is_empty() {
        HashMap::new()
    } else {
        ctx.ledgers.show_refs(&refs).await?
    };
    let missing = spec
        .items
        .iter()
        .filter(|i| !found.contains_key(*i))
        .cloned()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(HordeError::preflight(
            format!("work items not found: {}", missing.join(", ")),
            "check the ids with `rl show`",
        ));
    }
    let name = match &spec.name {
        Some(n) => n.clone(),
        None => spec
            .items
            .first()
            .and_then(|id| found.get(id))
            .map(|i| i.title.clone())
            .unwrap_or_default(),
    };

    let id = format!("{RAID_ID_PREFIX}{}", short_token(5));
    let mut lines = Vec::new();
    if let Some(owner) = &spec.owner {
        lines.push(format!("Owner: {owner}"));
    }
    if let Some(notify) = &spec.notify {
        lines.push(format!("Notify: {notify}"));
    }
    if let Some(totem) = &spec.totem {
        lines.push(format!("Totem: {totem}"));
    }

    let hq = ctx.ledgers.hq();
    hq.create(
        &NewWorkItem::new(ItemType::Raid, &name)
            .with_id(&id)
            .with_description(lines.join("\n")),
    )?;
    for item in &spec.items {
        let target = Ref::for_target(item, HQ_HOME).to_string();
        hq.add_dependency(&id, &target, DependencyKind::Tracks)?;
    }
    tracing::info!(raid = %id, %name, items = spec.items.len(), "raid created");
    Ok(hq.get(&id)?)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOutcome {
    pub reopened: bool,
    pub added: Vec<String>,
}

/// Track more items. A closed raid is reopened first; edges that already
/// exist are skipped.
pub fn add(ctx: &HordeContext, raid_id: &str, items: &[String]) -> Result<AddOutcome> {
    let raid = load_raid(ctx, raid_id)?;
    for item in items {
        ctx.ledgers.get(item)?;
    }
    let hq = ctx.ledgers.for_id(raid_id)?;
    let mut out = AddOutcome::default();
    if raid.status == WorkStatus::Closed {
        hq.update(raid_id, &WorkItemUpdate::status(WorkStatus::Open))?;
        out.reopened = true;
        tracing::info!(raid = raid_id, "raid reopened");
    }
    for item in items {
        if raid.tracks(item) || out.added.contains(item) {
            continue;
        }
        hq.add_dependency(raid_id, &Ref::for_target(item, HQ_HOME).to_string(), DependencyKind::Tracks)?;
        out.added.push(item.clone());
    }
    Ok(out)
}

/// Close a raid by hand. Returns `false` when it was already closed.
pub fn close(ctx: &HordeContext, raid_id: &str, reason: Option<&str>, notify: Option<&str>) -> Result<bool> {
    let raid = load_raid(ctx, raid_id)?;
    if raid.status.is_terminal() {
        return Ok(false);
    }
    let reason = reason.unwrap_or("Closed manually");
    ctx.ledgers.for_id(raid_id)?.close(raid_id, Some(reason))?;
    let to = match notify {
        Some(addr) => vec![addr.to_string()],
        None => subscribers(&raid),
    };
    let from = ctx.actor();
    for addr in to {
        ctx.notify(&addr, &from, &format!("RAID_CLOSED {raid_id}"), &format!("{}\n\n{reason}", raid.title));
    }
    tracing::info!(raid = raid_id, reason, "raid closed");
    Ok(true)
}

/// Close every open raid whose tracked items are all terminal and notify
/// its subscribers once per close.
pub async fn check(ctx: &HordeContext) -> Result<Vec<Landed>> {
    let raids = open_raids(ctx, false)?;
    let items = tracked_items(ctx, &raids).await?;
    let from = ctx.actor();
    let mut landed = Vec::new();
    for raid in raids {
        let tracked = raid.tracked();
        let complete = !tracked.is_empty()
            && tracked
                .iter()
                .all(|r| items.get(r.id()).is_some_and(|i| i.status.is_terminal()));
        if !complete {
            continue;
        }
        ctx.ledgers.for_id(&raid.id)?.close(&raid.id, Some(LANDED_REASON))?;
        let mut notified = Vec::new();
        for addr in subscribers(&raid) {
            if ctx.notify(
                &addr,
                &from,
                &format!("RAID_LANDED {}", raid.id),
                &format!("{}\n\n{LANDED_REASON}", raid.title),
            ) {
                notified.push(addr);
            }
        }
        tracing::info!(raid = %raid.id, notified = notified.len(), "raid landed");
        landed.push(Landed {
            raid_id: raid.id,
            notified,
        });
    }
    Ok(landed)
}

fn worker_session(ctx: &HordeContext, assignee: &str) -> Option<String> {
    let role = Role::from_identity(assignee).ok()?;
    ctx.session_name(&role).ok()
}

/// Open raids with ready work that nobody is driving: open, unblocked,
/// and either unassigned or assigned to an agent whose session is gone.
pub async fn stranded(ctx: &HordeContext) -> Result<Vec<Stranded>> {
    let raids = open_raids(ctx, false)?;
    let items = tracked_items(ctx, &raids).await?;
    let ready = ctx
        .ledgers
        .ready_all()
        .await?
        .into_iter()
        .map(|i| i.id)
        .collect::<HashSet<_>>();

    let mut out = Vec::new();
    for raid in raids {
        let mut stuck = Vec::new();
        for r in raid.tracked() {
            let Some(item) = items.get(r.id()) else {
                continue;
            };
            if item.status != WorkStatus::Open || !ready.contains(&item.id) {
                continue;
            }
            let driven = match item.assignee.as_deref() {
                None => false,
                Some(assignee) => match worker_session(ctx, assignee) {
                    Some(session) => ctx.sessions.is_agent_running(&session)?,
                    // Not an agent identity; someone else owns it.
                    None => true,
                },
            };
            if !driven {
                stuck.push(item.clone());
            }
        }
        if !stuck.is_empty() {
            out.push(Stranded { raid, ready: stuck });
        }
    }
    Ok(out)
}

fn describe(ctx: &HordeContext, raid: &WorkItem, items: &HashMap<String, WorkItem>) -> RaidStatus {
    let now = Utc::now();
    let tracked = raid
        .tracked()
        .into_iter()
        .map(|r| match items.get(r.id()) {
            Some(item) => {
                let worker = item.assignee.clone().filter(|_| !item.status.is_terminal());
                let idle = worker
                    .as_deref()
                    .and_then(|w| worker_session(ctx, w))
                    .and_then(|s| ctx.sessions.session_activity(&s).ok())
                    .map(|at| now - at);
                TrackedItem {
                    id: item.id.clone(),
                    title: item.title.clone(),
                    status: Some(item.status),
                    worker,
                    idle,
                }
            }
            None => TrackedItem {
                id: r.id().to_string(),
                title: String::new(),
                status: None,
                worker: None,
                idle: None,
            },
        })
        .collect();
    RaidStatus {
        raid: raid.clone(),
        items: tracked,
    }
}

/// Progress of one raid with a single batched lookup per ledger.
pub async fn status(ctx: &HordeContext, raid_id: &str) -> Result<RaidStatus> {
    let raid = load_raid(ctx, raid_id)?;
    let items = tracked_items(ctx, std::slice::from_ref(&raid)).await?;
    Ok(describe(ctx, &raid, &items))
}

/// Open raids (all raids with `include_closed`) and their progress.
pub async fn list(ctx: &HordeContext, include_closed: bool) -> Result<Vec<RaidStatus>> {
    let raids = open_raids(ctx, include_closed)?;
    let items = tracked_items(ctx, &raids).await?;
    Ok(raids.iter().map(|r| describe(ctx, r, &items)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_are_deduplicated() {
        let mut raid = WorkItem::new("hq-cv-1", "r", ItemType::Raid);
        raid.description = "Owner: warchief/\nNotify: horde/witness, warchief/\nTotem: hq-t".into();
        assert_eq!(subscribers(&raid), vec!["warchief/".to_string(), "horde/witness".to_string()]);
    }

    #[test]
    fn progress_counts_terminal_items() {
        let raid = WorkItem::new("hq-cv-1", "r", ItemType::Raid);
        let item = |id: &str, status| TrackedItem {
            id: id.into(),
            title: String::new(),
            status,
            worker: None,
            idle: None,
        };
        let st = RaidStatus {
            raid,
            items: vec![
                item("gt-a", Some(WorkStatus::Closed)),
                item("gt-b", Some(WorkStatus::Tombstone)),
                item("gt-c", Some(WorkStatus::Open)),
                item("gt-d", None),
            ],
        };
        assert_eq!(st.progress(), "2/4");
        assert_eq!(st.items[3].symbol(), "?");
    }
}
