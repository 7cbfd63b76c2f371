//! Typed facade over agent records.
//!
//! An agent record is a ledger item of type `agent` whose title is the
//! agent's identity. Scalar fields live in the description as
//! `key: value` lines; the hook lives in the ledger slot [`HOOK_SLOT`].

use std::sync::Arc;

use hd_core::ids::agent_record_id;
use hd_core::ledger::{LedgerError, LedgerStore, Ledgers, ListFilter, NewWorkItem, WorkItemUpdate};
use hd_core::types::{
    description_field, AgentState, CleanupStatus, ItemType, NotificationLevel, Role, RoleKind,
    WorkItem, WorkStatus,
};
use hd_core::workspace::{Workspace, HQ_PREFIX};

use crate::error::{HordeError, Result};

pub const HOOK_SLOT: &str = "hook";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRecord {
    pub id: String,
    pub role: Role,
    /// Stored state; only `stuck` and `awaiting-gate` are ever persisted.
    pub state: Option<AgentState>,
    pub hook: Option<String>,
    pub cleanup_status: Option<CleanupStatus>,
    pub active_mr: Option<String>,
    pub notification_level: NotificationLevel,
}

impl AgentRecord {
    fn fresh(id: String, role: Role) -> Self {
        Self {
            id,
            role,
            state: None,
            hook: None,
            cleanup_status: None,
            active_mr: None,
            notification_level: NotificationLevel::default(),
        }
    }

    pub fn identity(&self) -> String {
        self.role.identity()
    }

    /// Encode the scalar fields as description lines.
    pub fn description(&self) -> String {
        fn or_null(v: Option<&str>) -> &str {
            v.unwrap_or("null")
        }
        [
            format!("role_type: {}", self.role.kind()),
            format!("rig: {}", or_null(self.role.rig())),
            format!("agent_state: {}", or_null(self.state.as_ref().map(AgentState::as_str))),
            format!(
                "cleanup_status: {}",
                or_null(self.cleanup_status.as_ref().map(CleanupStatus::as_str))
            ),
            format!("active_mr: {}", or_null(self.active_mr.as_deref())),
            format!("notification_level: {}", self.notification_level.as_str()),
        ]
        .join("\n")
    }

    /// Decode a ledger item. Returns `None` for items that are not agent
    /// records or whose title is not an identity.
    pub fn from_item(item: &WorkItem, hook: Option<String>) -> Option<Self> {
        if item.item_type != ItemType::Agent {
            return None;
        }
        let role = Role::from_identity(&item.title).ok()?;
        let field = |key: &str| description_field(&item.description, key);
        Some(Self {
            id: item.id.clone(),
            role,
            state: field("agent_state")
                .and_then(|s| s.parse().ok())
                .filter(|s: &AgentState| !s.is_observable()),
            hook,
            cleanup_status: field("cleanup_status").and_then(|s| s.parse().ok()),
            active_mr: field("active_mr"),
            notification_level: field("notification_level")
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        })
    }
}

/// Agent records across every ledger of the encampment.
pub struct RecordStore<'a> {
    ws: &'a Workspace,
    ledgers: &'a Ledgers,
}

impl<'a> RecordStore<'a> {
    pub fn new(ws: &'a Workspace, ledgers: &'a Ledgers) -> Self {
        Self { ws, ledgers }
    }

    pub fn record_id(&self, role: &Role) -> Result<String> {
        Ok(agent_record_id(role, HQ_PREFIX, self.ws.prefix_for(role)?))
    }

    /// The ledger that holds the warband's items.
    pub fn rig_ledger(&self, rig: &str) -> Result<Arc<dyn LedgerStore>> {
        let prefix = self.ws.rig_prefix(rig)?;
        Ok(self.ledgers.for_id(&format!("{prefix}-"))?)
    }

    fn locate(&self, role: &Role) -> Result<(String, Arc<dyn LedgerStore>)> {
        let id = self.record_id(role)?;
        let ledger = self.ledgers.for_id(&id)?;
        Ok((id, ledger))
    }

    fn load(&self, ledger: &dyn LedgerStore, id: &str) -> Result<Option<AgentRecord>> {
        let item = match ledger.get(id) {
            Ok(item) => item,
            Err(LedgerError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let hook = ledger.slot(id, HOOK_SLOT)?;
        AgentRecord::from_item(&item, hook).map(Some).ok_or_else(|| {
            HordeError::preflight(
                format!("{id} exists but is not an agent record"),
                "inspect it with `rl show` and remove the conflicting item",
            )
        })
    }

    pub fn get(&self, role: &Role) -> Result<Option<AgentRecord>> {
        let (id, ledger) = self.locate(role)?;
        self.load(ledger.as_ref(), &id)
    }

    /// Return the record, creating it when absent.
    pub fn ensure(&self, role: &Role) -> Result<AgentRecord> {
        let (id, ledger) = self.locate(role)?;
        if let Some(record) = self.load(ledger.as_ref(), &id)? {
            return Ok(record);
        }
        let record = AgentRecord::fresh(id.clone(), role.clone());
        let new = NewWorkItem::new(ItemType::Agent, role.identity())
            .with_id(&id)
            .with_description(record.description());
        ledger.create(&new)?;
        tracing::info!(record = %id, identity = %role.identity(), "agent record created");
        Ok(record)
    }

    fn modify(&self, role: &Role, f: impl FnOnce(&mut AgentRecord)) -> Result<AgentRecord> {
        let (id, ledger) = self.locate(role)?;
        let mut record = match self.load(ledger.as_ref(), &id)? {
            Some(r) => r,
            None => self.ensure(role)?,
        };
        f(&mut record);
        let update = WorkItemUpdate {
            description: Some(record.description()),
            ..Default::default()
        };
        ledger.update(&id, &update)?;
        Ok(record)
    }

    /// Point the hook at `item`, or clear it.
    pub fn set_hook(&self, role: &Role, item: Option<&str>) -> Result<()> {
        let (id, ledger) = self.locate(role)?;
        if item.is_some() {
            self.ensure(role)?;
        } else if !ledger.exists(&id)? {
            return Ok(());
        }
        ledger.set_slot(&id, HOOK_SLOT, item)?;
        tracing::debug!(record = %id, hook = ?item, "hook slot updated");
        Ok(())
    }

    /// The hooked item, reconciling the item side when it disagrees.
    ///
    /// The record is authoritative. A non-terminal item that is not hooked
    /// to this agent is rewritten as `hooked` with this agent as assignee.
    /// A stale pointer to a missing or terminal item is returned as is.
    pub fn hook_of(&self, role: &Role) -> Result<Option<String>> {
        let (id, ledger) = self.locate(role)?;
        if !ledger.exists(&id)? {
            return Ok(None);
        }
        let Some(hook) = ledger.slot(&id, HOOK_SLOT)? else {
            return Ok(None);
        };
        let identity = role.identity();
        let item = match self.ledgers.get(&hook) {
            Ok(item) => item,
            Err(LedgerError::NotFound(_)) => {
                tracing::debug!(record = %id, %hook, "hook points at a missing item");
                return Ok(Some(hook));
            }
            Err(e) => return Err(e.into()),
        };
        let consistent = item.assignee.as_deref() == Some(identity.as_str())
            && matches!(item.status, WorkStatus::Hooked | WorkStatus::InProgress);
        if consistent {
            return Ok(Some(hook));
        }
        if !item.status.can_transition_to(&WorkStatus::Hooked) {
            tracing::debug!(record = %id, %hook, status = %item.status, "hook drift left as is");
            return Ok(Some(hook));
        }
        tracing::debug!(
            record = %id,
            %hook,
            status = %item.status,
            assignee = ?item.assignee,
            "hook drift: correcting item from record"
        );
        let fix = WorkItemUpdate::status(WorkStatus::Hooked).with_assignee(Some(identity));
        self.ledgers.for_id(&hook)?.update(&hook, &fix)?;
        Ok(Some(hook))
    }

    /// Store a non-observable state.
    pub fn set_state(&self, role: &Role, state: AgentState) -> Result<()> {
        if state.is_observable() {
            return Err(HordeError::preflight(
                format!("agent state {state} is inferred from the session and cannot be stored"),
                "only stuck and awaiting-gate may be set",
            ));
        }
        self.modify(role, |r| r.state = Some(state))?;
        Ok(())
    }

    /// Drop any stored state so the session decides again.
    pub fn reset_state(&self, role: &Role) -> Result<()> {
        self.modify(role, |r| r.state = None)?;
        Ok(())
    }

    pub fn set_cleanup_status(&self, role: &Role, status: CleanupStatus) -> Result<()> {
        self.modify(role, |r| r.cleanup_status = Some(status))?;
        Ok(())
    }

    pub fn set_active_mr(&self, role: &Role, mr: Option<&str>) -> Result<()> {
        self.modify(role, |r| r.active_mr = mr.map(str::to_string))?;
        Ok(())
    }

    /// Rewrite the record under a new role (crew rename).
    pub fn rename(&self, from: &Role, to: &Role) -> Result<AgentRecord> {
        let (old_id, old_ledger) = self.locate(from)?;
        let old = self.load(old_ledger.as_ref(), &old_id)?;
        let mut record = self.ensure(to)?;
        if let Some(old) = old {
            record.state = old.state;
            record.cleanup_status = old.cleanup_status;
            record.active_mr = old.active_mr.clone();
            record.notification_level = old.notification_level;
            let (new_id, new_ledger) = self.locate(to)?;
            let update = WorkItemUpdate {
                description: Some(record.description()),
                ..Default::default()
            };
            new_ledger.update(&new_id, &update)?;
            if let Some(hook) = &old.hook {
                new_ledger.set_slot(&new_id, HOOK_SLOT, Some(hook))?;
                record.hook = Some(hook.clone());
            }
            old_ledger.delete(&old_id)?;
        }
        Ok(record)
    }

    /// Delete the record. Missing records are not an error.
    pub fn nuke(&self, role: &Role) -> Result<bool> {
        let (id, ledger) = self.locate(role)?;
        match ledger.delete(&id) {
            Ok(()) => {
                tracing::info!(record = %id, "agent record deleted");
                Ok(true)
            }
            Err(LedgerError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn decode_all(&self, items: Vec<WorkItem>) -> Result<Vec<AgentRecord>> {
        let mut out = Vec::new();
        for item in items {
            let hook = self.ledgers.for_id(&item.id)?.slot(&item.id, HOOK_SLOT)?;
            if let Some(record) = AgentRecord::from_item(&item, hook) {
                out.push(record);
            }
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    /// Records of one role kind, optionally limited to a warband.
    pub async fn list_by_role(&self, kind: RoleKind, rig: Option<&str>) -> Result<Vec<AgentRecord>> {
        let items = match rig {
            Some(rig) => self.rig_ledger(rig)?.list(&ListFilter::of_type(ItemType::Agent))?,
            None => {
                self.ledgers
                    .list_all(&ListFilter::of_type(ItemType::Agent))
                    .await?
            }
        };
        Ok(self
            .decode_all(items)?
            .into_iter()
            .filter(|r| r.role.kind() == kind)
            .filter(|r| rig.is_none() || r.role.rig() == rig)
            .collect())
    }

    /// Every record belonging to a warband.
    pub fn list_by_warband(&self, rig: &str) -> Result<Vec<AgentRecord>> {
        let items = self
            .rig_ledger(rig)?
            .list(&ListFilter::of_type(ItemType::Agent))?;
        Ok(self
            .decode_all(items)?
            .into_iter()
            .filter(|r| r.role.rig() == Some(rig))
            .collect())
    }
}
