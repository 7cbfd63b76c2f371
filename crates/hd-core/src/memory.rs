//! In-memory [`LedgerStore`] for tests (enabled by the `testing` feature).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::ledger::{LedgerError, LedgerFactory, LedgerStore, ListFilter, NewWorkItem, Result, WorkItemUpdate};
use crate::types::{Dependency, DependencyKind, ItemType, WorkItem, WorkStatus};

#[derive(Default)]
struct State {
    prefix: Option<String>,
    items: Vec<WorkItem>,
    slots: HashMap<(String, String), String>,
    next_id: u64,
    failing: HashSet<String>,
    calls: Vec<String>,
}

/// A single ledger held in memory. Behaves like `rl` closely enough for the
/// hook, raid and record paths.
pub struct MemoryLedger {
    root: PathBuf,
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Seed an item verbatim.
    pub fn insert(&self, item: WorkItem) {
        let mut st = self.state();
        st.items.retain(|i| i.id != item.id);
        st.items.push(item);
    }

    pub fn item(&self, id: &str) -> Option<WorkItem> {
        self.state().items.iter().find(|i| i.id == id).cloned()
    }

    pub fn items(&self) -> Vec<WorkItem> {
        self.state().items.clone()
    }

    /// Make every subsequent call of `op` (`create`, `close`, ...) fail.
    pub fn fail_on(&self, op: &str) {
        self.state().failing.insert(op.to_string());
    }

    pub fn clear_failures(&self) {
        self.state().failing.clear();
    }

    /// Operation log, e.g. `show gt-a,gt-b`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    fn begin(&self, op: &str, detail: &str) -> Result<MutexGuard<'_, State>> {
        let mut st = self.state();
        st.calls.push(if detail.is_empty() {
            op.to_string()
        } else {
            format!("{op} {detail}")
        });
        if st.failing.contains(op) {
            return Err(LedgerError::Command {
                command: op.to_string(),
                stderr: format!("injected failure: {op}"),
            });
        }
        Ok(st)
    }
}

fn find_mut<'a>(st: &'a mut State, id: &str) -> Result<&'a mut WorkItem> {
    st.items
        .iter_mut()
        .find(|i| i.id == id)
        .ok_or_else(|| LedgerError::NotFound(id.to_string()))
}

impl LedgerStore for MemoryLedger {
    fn location(&self) -> &Path {
        &self.root
    }

    fn init(&self, prefix: &str) -> Result<()> {
        let mut st = self.begin("init", prefix)?;
        st.prefix = Some(prefix.trim_end_matches('-').to_string());
        Ok(())
    }

    fn create(&self, new: &NewWorkItem) -> Result<WorkItem> {
        let mut st = self.begin("create", &new.title)?;
        let id = match &new.id {
            Some(id) => {
                if st.items.iter().any(|i| &i.id == id) {
                    return Err(LedgerError::Command {
                        command: "create".into(),
                        stderr: format!("issue {id} already exists"),
                    });
                }
                id.clone()
            }
            None => {
                st.next_id += 1;
                let prefix = st.prefix.clone().unwrap_or_else(|| "mem".to_string());
                format!("{prefix}-{}", st.next_id)
            }
        };
        let mut item = WorkItem::new(id, new.title.clone(), new.item_type.clone());
        item.description = new.description.clone();
        item.ephemeral = new.ephemeral;
        item.assignee = new.assignee.clone();
        item.parent = new.parent.clone();
        item.labels = new.labels.clone();
        if let Some(p) = new.priority {
            item.priority = p;
        }
        st.items.push(item.clone());
        Ok(item)
    }

    fn show(&self, ids: &[String]) -> Result<Vec<WorkItem>> {
        let st = self.begin("show", &ids.join(","))?;
        Ok(ids
            .iter()
            .filter_map(|id| st.items.iter().find(|i| &i.id == id).cloned())
            .collect())
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<WorkItem>> {
        let st = self.begin("list", "")?;
        Ok(st
            .items
            .iter()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect())
    }

    fn update(&self, id: &str, update: &WorkItemUpdate) -> Result<()> {
        let mut st = self.begin("update", id)?;
        let item = find_mut(&mut st, id)?;
        if let Some(s) = update.status {
            item.status = s;
            if s != WorkStatus::Closed {
                item.closed_at = None;
                item.close_reason = None;
            }
        }
        if let Some(a) = &update.assignee {
            item.assignee = a.clone().filter(|a| !a.is_empty());
        }
        if let Some(t) = &update.title {
            item.title = t.clone();
        }
        if let Some(d) = &update.description {
            item.description = d.clone();
        }
        item.labels.retain(|l| !update.remove_labels.contains(l));
        for l in &update.add_labels {
            if !item.labels.contains(l) {
                item.labels.push(l.clone());
            }
        }
        item.updated_at = Some(Utc::now());
        Ok(())
    }

    fn close(&self, id: &str, reason: Option<&str>) -> Result<()> {
        let mut st = self.begin("close", id)?;
        let item = find_mut(&mut st, id)?;
        let now = Utc::now();
        item.status = WorkStatus::Closed;
        item.closed_at = Some(now);
        item.updated_at = Some(now);
        item.close_reason = reason.map(str::to_string);
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut st = self.begin("delete", id)?;
        let before = st.items.len();
        st.items.retain(|i| i.id != id);
        if st.items.len() == before {
            return Err(LedgerError::NotFound(id.to_string()));
        }
        st.slots.retain(|(item, _), _| item != id);
        Ok(())
    }

    fn add_dependency(&self, from: &str, to: &str, kind: DependencyKind) -> Result<()> {
        let mut st = self.begin("dep", &format!("{from} {to}"))?;
        let item = find_mut(&mut st, from)?;
        let dep = Dependency {
            depends_on_id: to.to_string(),
            kind,
        };
        if !item.dependencies.contains(&dep) {
            item.dependencies.push(dep);
        }
        Ok(())
    }

    fn set_slot(&self, id: &str, slot: &str, value: Option<&str>) -> Result<()> {
        let mut st = self.begin("slot", id)?;
        find_mut(&mut st, id)?;
        let key = (id.to_string(), slot.to_string());
        match value {
            Some(v) => st.slots.insert(key, v.to_string()),
            None => st.slots.remove(&key),
        };
        Ok(())
    }

    fn slot(&self, id: &str, slot: &str) -> Result<Option<String>> {
        let mut st = self.begin("slot-show", id)?;
        find_mut(&mut st, id)?;
        Ok(st.slots.get(&(id.to_string(), slot.to_string())).cloned())
    }

    fn ready(&self) -> Result<Vec<WorkItem>> {
        let st = self.begin("ready", "")?;
        let terminal = |id: &str| {
            st.items
                .iter()
                .find(|i| i.id == id)
                .is_none_or(|i| i.status.is_terminal())
        };
        Ok(st
            .items
            .iter()
            .filter(|i| i.status == WorkStatus::Open && !i.ephemeral)
            .filter(|i| {
                !matches!(
                    i.item_type,
                    ItemType::Agent | ItemType::Raid | ItemType::MergeRequest | ItemType::Message
                )
            })
            .filter(|i| {
                i.dependencies
                    .iter()
                    .filter(|d| d.kind.is_blocking())
                    .all(|d| terminal(d.target().id()))
            })
            .cloned()
            .collect())
    }
}

/// A family of memory ledgers keyed by location, shared with a
/// [`crate::ledger::Ledgers`] through [`MemoryLedgers::factory`].
#[derive(Default)]
pub struct MemoryLedgers {
    ledgers: Mutex<HashMap<PathBuf, Arc<MemoryLedger>>>,
}

impl MemoryLedgers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ledger(&self, dir: &Path) -> Arc<MemoryLedger> {
        let mut map = self.ledgers.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(
            map.entry(dir.to_path_buf())
                .or_insert_with(|| Arc::new(MemoryLedger::new(dir))),
        )
    }

    pub fn factory(self: &Arc<Self>) -> LedgerFactory {
        let this = Arc::clone(self);
        Arc::new(move |dir: &Path| -> Arc<dyn LedgerStore> { this.ledger(dir) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_prefixed_ids() {
        let l = MemoryLedger::new("/ws");
        l.init("gt").unwrap();
        let a = l.create(&NewWorkItem::new(ItemType::Task, "a")).unwrap();
        assert_eq!(a.id, "gt-1");
        let b = l
            .create(&NewWorkItem::new(ItemType::Raid, "b").with_id("hq-cv-abc"))
            .unwrap();
        assert_eq!(b.id, "hq-cv-abc");
        assert!(l
            .create(&NewWorkItem::new(ItemType::Raid, "dup").with_id("hq-cv-abc"))
            .is_err());
    }

    #[test]
    fn ready_skips_blocked_and_infrastructure_items() {
        let l = MemoryLedger::new("/ws");
        l.insert(WorkItem::new("gt-a", "a", ItemType::Task));
        let mut blocked = WorkItem::new("gt-b", "b", ItemType::Task);
        blocked.dependencies.push(Dependency {
            depends_on_id: "gt-a".into(),
            kind: DependencyKind::Blocks,
        });
        l.insert(blocked);
        l.insert(WorkItem::new("gt-horde-witness", "w", ItemType::Agent));
        let ready: Vec<_> = l.ready().unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ready, vec!["gt-a"]);

        l.close("gt-a", None).unwrap();
        let ready: Vec<_> = l.ready().unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ready, vec!["gt-b"]);
    }

    #[test]
    fn injected_failures_surface_as_command_errors() {
        let l = MemoryLedger::new("/ws");
        l.insert(WorkItem::new("gt-a", "a", ItemType::Task));
        l.fail_on("close");
        assert!(matches!(l.close("gt-a", None), Err(LedgerError::Command { .. })));
        l.clear_failures();
        l.close("gt-a", Some("done")).unwrap();
        assert_eq!(l.item("gt-a").unwrap().close_reason.as_deref(), Some("done"));
    }

    #[test]
    fn slots_require_existing_items() {
        let l = MemoryLedger::new("/ws");
        assert!(l.set_slot("gt-x", "hook", Some("gt-a")).is_err());
        l.insert(WorkItem::new("gt-x", "x", ItemType::Agent));
        l.set_slot("gt-x", "hook", Some("gt-a")).unwrap();
        assert_eq!(l.slot("gt-x", "hook").unwrap().as_deref(), Some("gt-a"));
        l.set_slot("gt-x", "hook", None).unwrap();
        assert_eq!(l.slot("gt-x", "hook").unwrap(), None);
    }
}
