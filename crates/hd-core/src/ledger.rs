//! Work-item ledger facade.
//!
//! The storage engine is the external `rl` binary. [`LedgerStore`] is the
//! seam: [`RlLedger`] shells out through a [`CommandRunner`], tests use the
//! in-memory ledger from [`crate::memory`]. [`Ledgers`] routes ids to the
//! right physical ledger and fans queries out across ledgers.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::ids::Ref;
use crate::routes::{Route, RouteError, RouteTable};
use crate::runner::CommandRunner;
use crate::types::{DependencyKind, ItemType, WorkItem, WorkStatus};
use crate::workspace::LEDGER_DIR;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("work item not found: {0}")]
    NotFound(String),

    #[error("rl {command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("could not parse rl output for {command}: {message}")]
    Parse { command: String, message: String },

    #[error("rl {found} is too old; {required} or newer is required (custom types)")]
    UnsupportedVersion { found: String, required: String },

    #[error(transparent)]
    Route(#[from] RouteError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewWorkItem {
    pub item_type: ItemType,
    pub title: String,
    pub description: String,
    /// Pre-assigned id; the ledger picks one when absent.
    pub id: Option<String>,
    pub ephemeral: bool,
    pub priority: Option<u8>,
    pub assignee: Option<String>,
    pub parent: Option<String>,
    pub labels: Vec<String>,
}

impl NewWorkItem {
    pub fn new(item_type: ItemType, title: impl Into<String>) -> Self {
        Self {
            item_type,
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    pub item_type: Option<ItemType>,
    pub status: Option<WorkStatus>,
    pub parent: Option<String>,
    pub assignee: Option<String>,
    pub priority: Option<u8>,
}

impl ListFilter {
    pub fn of_type(item_type: ItemType) -> Self {
        Self {
            item_type: Some(item_type),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: WorkStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, item: &WorkItem) -> bool {
        self.item_type.as_ref().is_none_or(|t| &item.item_type == t)
            && self.status.is_none_or(|s| item.status == s)
            && self
                .parent
                .as_ref()
                .is_none_or(|p| item.parent.as_ref() == Some(p))
            && self
                .assignee
                .as_ref()
                .is_none_or(|a| item.assignee.as_ref() == Some(a))
            && self.priority.is_none_or(|p| item.priority == p)
    }
}

/// Partial update. `assignee: Some(None)` clears the assignee.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkItemUpdate {
    pub status: Option<WorkStatus>,
    pub assignee: Option<Option<String>>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub add_labels: Vec<String>,
    pub remove_labels: Vec<String>,
}

impl WorkItemUpdate {
    pub fn status(status: WorkStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_assignee(mut self, assignee: Option<String>) -> Self {
        self.assignee = Some(assignee);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

/// One physical ledger.
pub trait LedgerStore: Send + Sync {
    /// Directory containing this ledger's `.relics/`.
    fn location(&self) -> &Path;

    fn init(&self, prefix: &str) -> Result<()>;

    fn create(&self, item: &NewWorkItem) -> Result<WorkItem>;

    /// Batched lookup. Ids that do not exist are omitted from the result.
    fn show(&self, ids: &[String]) -> Result<Vec<WorkItem>>;

    fn list(&self, filter: &ListFilter) -> Result<Vec<WorkItem>>;

    fn update(&self, id: &str, update: &WorkItemUpdate) -> Result<()>;

    fn close(&self, id: &str, reason: Option<&str>) -> Result<()>;

    fn delete(&self, id: &str) -> Result<()>;

    /// Add an edge `from → to`. `to` may be an `external:` reference.
    fn add_dependency(&self, from: &str, to: &str, kind: DependencyKind) -> Result<()>;

    /// Set (`Some`) or clear (`None`) a named slot on an item.
    fn set_slot(&self, id: &str, slot: &str, value: Option<&str>) -> Result<()>;

    fn slot(&self, id: &str, slot: &str) -> Result<Option<String>>;

    /// Open items with no unresolved blocking dependency.
    fn ready(&self) -> Result<Vec<WorkItem>>;

    fn get(&self, id: &str) -> Result<WorkItem> {
        self.show(&[id.to_string()])?
            .into_iter()
            .find(|item| item.id == id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))
    }

    fn exists(&self, id: &str) -> Result<bool> {
        match self.get(id) {
            Ok(_) => Ok(true),
            Err(LedgerError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// RlLedger
// ---------------------------------------------------------------------------

/// [`LedgerStore`] backed by the `rl` binary.
pub struct RlLedger {
    root: PathBuf,
    binary: String,
    runner: Arc<dyn CommandRunner>,
}

impl RlLedger {
    pub fn new(root: impl Into<PathBuf>, binary: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            root: root.into(),
            binary: binary.into(),
            runner,
        }
    }

    fn exec(&self, args: &[&str]) -> Result<String> {
        let command = args.iter().take(2).copied().collect::<Vec<_>>().join(" ");
        let out = self
            .runner
            .run(&self.binary, &self.root, args)
            .map_err(|stderr| LedgerError::Command {
                command: command.clone(),
                stderr,
            })?;
        if out.success {
            return Ok(out.stdout);
        }
        let stderr = out.diagnostic();
        if stderr.to_ascii_lowercase().contains("not found") {
            return Err(LedgerError::NotFound(missing_id(&stderr, args)));
        }
        Err(LedgerError::Command { command, stderr })
    }

    fn exec_json<T: serde::de::DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let stdout = self.exec(args)?;
        serde_json::from_str(stdout.trim()).map_err(|e| LedgerError::Parse {
            command: args.first().copied().unwrap_or_default().to_string(),
            message: e.to_string(),
        })
    }
}

/// The argument `rl` named in a "not found" diagnostic.
///
/// Falls back to the first id-shaped argument when the message names none.
fn missing_id(stderr: &str, args: &[&str]) -> String {
    let operands = || args.iter().skip(1).filter(|a| !a.starts_with("--"));
    stderr
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| matches!(c, ':' | ',' | '.' | '\'' | '"' | '`')))
        .find(|word| operands().any(|a| a == word))
        .or_else(|| operands().find(|a| a.contains('-')).copied())
        .unwrap_or_default()
        .to_string()
}

/// `rl show` prints an object for one id and an array for several.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<WorkItem>),
    One(Box<WorkItem>),
}

impl LedgerStore for RlLedger {
    fn location(&self) -> &Path {
        &self.root
    }

    fn init(&self, prefix: &str) -> Result<()> {
        let prefix = prefix.trim_end_matches('-');
        self.exec(&["init", "--prefix", prefix, "--quiet"])?;
        Ok(())
    }

    fn create(&self, item: &NewWorkItem) -> Result<WorkItem> {
        let item_type = item.item_type.to_string();
        let priority = item.priority.map(|p| p.to_string());
        let labels = item.labels.join(",");
        let mut args = vec![
            "create",
            "--type",
            &item_type,
            "--title",
            &item.title,
            "--description",
            &item.description,
        ];
        if let Some(id) = &item.id {
            args.extend(["--id", id]);
        }
        if item.ephemeral {
            args.push("--ephemeral");
        }
        if let Some(p) = &priority {
            args.extend(["--priority", p]);
        }
        if let Some(a) = &item.assignee {
            args.extend(["--assignee", a]);
        }
        if let Some(p) = &item.parent {
            args.extend(["--parent", p]);
        }
        if !labels.is_empty() {
            args.extend(["--labels", &labels]);
        }
        args.push("--json");
        self.exec_json(&args)
    }

    fn show(&self, ids: &[String]) -> Result<Vec<WorkItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = vec!["show"];
        args.extend(ids.iter().map(String::as_str));
        args.push("--json");
        match self.exec_json::<OneOrMany>(&args) {
            Ok(OneOrMany::Many(items)) => Ok(items),
            Ok(OneOrMany::One(item)) => Ok(vec![*item]),
            Err(LedgerError::NotFound(_)) if ids.len() == 1 => Ok(Vec::new()),
            // rl aborts the whole batch on one missing id.
            Err(LedgerError::NotFound(missing)) => {
                tracing::debug!(%missing, batch = ids.len(), "show: retrying ids one at a time");
                let mut items = Vec::with_capacity(ids.len());
                for id in ids {
                    items.extend(self.show(std::slice::from_ref(id))?);
                }
                Ok(items)
            }
            Err(e) => Err(e),
        }
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<WorkItem>> {
        let item_type = filter.item_type.as_ref().map(ToString::to_string);
        let priority = filter.priority.map(|p| p.to_string());
        let mut args = vec!["list", "--json"];
        if let Some(t) = &item_type {
            args.extend(["--type", t]);
        }
        if let Some(s) = filter.status {
            args.extend(["--status", s.as_str()]);
        }
        if let Some(p) = &filter.parent {
            args.extend(["--parent", p]);
        }
        if let Some(a) = &filter.assignee {
            args.extend(["--assignee", a]);
        }
        if let Some(p) = &priority {
            args.extend(["--priority", p]);
        }
        self.exec_json(&args)
    }

    fn update(&self, id: &str, update: &WorkItemUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        let mut args = vec!["update", id];
        if let Some(s) = update.status {
            args.extend(["--status", s.as_str()]);
        }
        if let Some(assignee) = &update.assignee {
            args.extend(["--assignee", assignee.as_deref().unwrap_or("")]);
        }
        if let Some(t) = &update.title {
            args.extend(["--title", t]);
        }
        if let Some(d) = &update.description {
            args.extend(["--description", d]);
        }
        for l in &update.add_labels {
            args.extend(["--add-label", l]);
        }
        for l in &update.remove_labels {
            args.extend(["--remove-label", l]);
        }
        self.exec(&args)?;
        Ok(())
    }

    fn close(&self, id: &str, reason: Option<&str>) -> Result<()> {
        let mut args = vec!["close", id];
        if let Some(r) = reason {
            args.extend(["--reason", r]);
        }
        self.exec(&args)?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.exec(&["delete", id, "--force"])?;
        Ok(())
    }

    fn add_dependency(&self, from: &str, to: &str, kind: DependencyKind) -> Result<()> {
        self.exec(&["dep", "add", from, to, "--type", kind.as_str()])?;
        Ok(())
    }

    fn set_slot(&self, id: &str, slot: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(v) => self.exec(&["slot", "set", id, slot, v])?,
            None => self.exec(&["slot", "clear", id, slot])?,
        };
        Ok(())
    }

    fn slot(&self, id: &str, slot: &str) -> Result<Option<String>> {
        let slots: BTreeMap<String, Option<String>> =
            self.exec_json(&["slot", "show", id, "--json"])?;
        Ok(slots
            .get(slot)
            .cloned()
            .flatten()
            .filter(|v| !v.is_empty()))
    }

    fn ready(&self) -> Result<Vec<WorkItem>> {
        self.exec_json(&["ready", "--json"])
    }
}

// ---------------------------------------------------------------------------
// Ledgers (router + handle cache)
// ---------------------------------------------------------------------------

/// Builds a ledger handle for a directory that contains `.relics/`.
pub type LedgerFactory = Arc<dyn Fn(&Path) -> Arc<dyn LedgerStore> + Send + Sync>;

/// Factory producing [`RlLedger`] handles.
pub fn rl_factory(binary: &str, runner: Arc<dyn CommandRunner>) -> LedgerFactory {
    let binary = binary.to_string();
    Arc::new(move |dir: &Path| -> Arc<dyn LedgerStore> {
        Arc::new(RlLedger::new(dir, binary.clone(), Arc::clone(&runner)))
    })
}

/// Routes ids to ledgers, caching one handle per physical location.
pub struct Ledgers {
    root: PathBuf,
    routes: Mutex<RouteTable>,
    factory: LedgerFactory,
    cache: Mutex<HashMap<PathBuf, Arc<dyn LedgerStore>>>,
    gate: Arc<Semaphore>,
}

impl Ledgers {
    pub fn new(root: impl Into<PathBuf>, routes: RouteTable, factory: LedgerFactory, parallelism: usize) -> Self {
        Self {
            root: root.into(),
            routes: Mutex::new(routes),
            factory,
            cache: Mutex::new(HashMap::new()),
            gate: Arc::new(Semaphore::new(parallelism.max(1))),
        }
    }

    /// Ledgers backed by `rl` for the encampment at `root`.
    pub fn rl(root: &Path, binary: &str, runner: Arc<dyn CommandRunner>, parallelism: usize) -> Result<Self> {
        let routes = RouteTable::load(&root.join(LEDGER_DIR).join("routes"))?;
        Ok(Self::new(root, routes, rl_factory(binary, runner), parallelism))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn routes(&self) -> Vec<Route> {
        self.table().routes().to_vec()
    }

    fn table(&self) -> MutexGuard<'_, RouteTable> {
        self.routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn append_route(&self, route: Route) -> Result<()> {
        self.table().append(route)?;
        Ok(())
    }

    /// Handle for the ledger rooted at `dir` (the directory holding `.relics/`).
    pub fn at(&self, dir: &Path) -> Arc<dyn LedgerStore> {
        let key = dir.to_path_buf();
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            cache
                .entry(key)
                .or_insert_with(|| (self.factory)(dir)),
        )
    }

    /// The workspace (HQ) ledger.
    pub fn hq(&self) -> Arc<dyn LedgerStore> {
        self.at(&self.root)
    }

    pub fn route_for(&self, id: &str) -> Result<Route> {
        Ok(self.table().resolve(id)?.clone())
    }

    pub fn for_id(&self, id: &str) -> Result<Arc<dyn LedgerStore>> {
        let route = self.route_for(id)?;
        Ok(self.at(&route.ledger_root(&self.root)))
    }

    pub fn for_ref(&self, r: &Ref) -> Result<Arc<dyn LedgerStore>> {
        let route = self.table().resolve_ref(r)?.clone();
        Ok(self.at(&route.ledger_root(&self.root)))
    }

    /// Look up a single item wherever it lives.
    pub fn get(&self, id: &str) -> Result<WorkItem> {
        self.for_id(id)?.get(id)
    }

    /// Every distinct physical ledger named by the route table.
    pub fn all(&self) -> Vec<Arc<dyn LedgerStore>> {
        let mut seen = Vec::<PathBuf>::new();
        let mut out = Vec::new();
        for route in self.routes() {
            let dir = route.ledger_root(&self.root);
            if seen.contains(&dir) {
                continue;
            }
            seen.push(dir.clone());
            out.push(self.at(&dir));
        }
        if out.is_empty() {
            out.push(self.hq());
        }
        out
    }

    /// Resolve many references with one batched `show` per ledger, running
    /// the per-ledger calls concurrently. Unknown ids are simply absent.
    pub async fn show_refs(&self, refs: &[Ref]) -> Result<HashMap<String, WorkItem>> {
        let mut groups: HashMap<PathBuf, (Arc<dyn LedgerStore>, Vec<String>)> = HashMap::new();
        for r in refs {
            let ledger = self.for_ref(r)?;
            let entry = groups
                .entry(ledger.location().to_path_buf())
                .or_insert_with(|| (ledger, Vec::new()));
            if !entry.1.iter().any(|id| id == r.id()) {
                entry.1.push(r.id().to_string());
            }
        }
        let batches = groups.into_values().collect::<Vec<_>>();
        let results = self
            .fan_out(batches, |ledger, ids| ledger.show(&ids))
            .await?;
        Ok(results
            .into_iter()
            .flatten()
            .map(|item| (item.id.clone(), item))
            .collect())
    }

    /// Run `list` against every ledger concurrently.
    pub async fn list_all(&self, filter: &ListFilter) -> Result<Vec<WorkItem>> {
        let batches = self
            .all()
            .into_iter()
            .map(|l| (l, filter.clone()))
            .collect::<Vec<_>>();
        let results = self
            .fan_out(batches, |ledger, filter| ledger.list(&filter))
            .await?;
        Ok(results.into_iter().flatten().collect())
    }

    /// Run `ready` against every ledger concurrently.
    pub async fn ready_all(&self) -> Result<Vec<WorkItem>> {
        let batches = self.all().into_iter().map(|l| (l, ())).collect::<Vec<_>>();
        let results = self.fan_out(batches, |ledger, ()| ledger.ready()).await?;
        Ok(results.into_iter().flatten().collect())
    }

    async fn fan_out<A, T, F>(&self, work: Vec<(Arc<dyn LedgerStore>, A)>, op: F) -> Result<Vec<T>>
    where
        A: Send + 'static,
        T: Send + 'static,
        F: Fn(&dyn LedgerStore, A) -> Result<T> + Send + Sync + Copy + 'static,
    {
        let mut set = JoinSet::new();
        for (idx, (ledger, arg)) in work.into_iter().enumerate() {
            let gate = Arc::clone(&self.gate);
            set.spawn(async move {
                let _permit = gate.acquire_owned().await;
                let res = tokio::task::spawn_blocking(move || op(ledger.as_ref(), arg)).await;
                (idx, res)
            });
        }
        let mut out = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (idx, res) = joined.map_err(|e| LedgerError::Command {
                command: "fan-out".into(),
                stderr: e.to_string(),
            })?;
            let value = res.map_err(|e| LedgerError::Command {
                command: "fan-out".into(),
                stderr: e.to_string(),
            })??;
            out.push((idx, value));
        }
        out.sort_by_key(|(idx, _)| *idx);
        Ok(out.into_iter().map(|(_, v)| v).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandOutput;

    /// Scripted runner: records invocations, replies from a queue.
    struct ScriptedRunner {
        calls: Mutex<Vec<Vec<String>>>,
        replies: Mutex<Vec<CommandOutput>>,
    }

    impl ScriptedRunner {
        fn new(replies: Vec<CommandOutput>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                replies: Mutex::new(replies),
            })
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, _program: &str, _dir: &Path, args: &[&str]) -> std::result::Result<CommandOutput, String> {
            self.calls
                .lock()
                .unwrap()
                .push(args.iter().map(|s| s.to_string()).collect());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok(CommandOutput::ok(""))
            } else {
                Ok(replies.remove(0))
            }
        }
    }

    #[test]
    fn create_passes_flags() {
        let runner = ScriptedRunner::new(vec![CommandOutput::ok(
            r#"{"id":"gt-mr1","title":"Merge","status":"open","issue_type":"merge-request","ephemeral":true}"#,
        )]);
        let ledger = RlLedger::new("/ws/horde", "rl", runner.clone());
        let item = ledger
            .create(
                &NewWorkItem::new(ItemType::MergeRequest, "Merge")
                    .with_description("branch: raider/nux-1")
                    .ephemeral(),
            )
            .unwrap();
        assert_eq!(item.id, "gt-mr1");
        let call = &runner.calls()[0];
        assert_eq!(call[0], "create");
        assert!(call.contains(&"merge-request".to_string()));
        assert!(call.contains(&"--ephemeral".to_string()));
        assert_eq!(call.last().unwrap(), "--json");
    }

    #[test]
    fn show_accepts_object_or_array() {
        let runner = ScriptedRunner::new(vec![
            CommandOutput::ok(r#"{"id":"gt-a","title":"A","status":"open"}"#),
            CommandOutput::ok(
                r#"[{"id":"gt-a","title":"A","status":"open"},{"id":"gt-b","title":"B","status":"closed"}]"#,
            ),
        ]);
        let ledger = RlLedger::new("/ws", "rl", runner.clone());
        assert_eq!(ledger.show(&["gt-a".into()]).unwrap().len(), 1);
        let items = ledger.show(&["gt-a".into(), "gt-b".into()]).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(runner.calls()[1], vec!["show", "gt-a", "gt-b", "--json"]);
    }

    #[test]
    fn missing_item_maps_to_not_found() {
        let runner = ScriptedRunner::new(vec![CommandOutput::fail("Error: issue gt-zz not found")]);
        let ledger = RlLedger::new("/ws", "rl", runner);
        assert!(matches!(ledger.get("gt-zz"), Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn batch_show_skips_a_deleted_item() {
        let runner = ScriptedRunner::new(vec![
            CommandOutput::fail("Error: issue gt-zz not found"),
            CommandOutput::ok(r#"{"id":"gt-a","title":"A","status":"open"}"#),
            CommandOutput::fail("Error: issue gt-zz not found"),
            CommandOutput::ok(r#"{"id":"gt-b","title":"B","status":"closed"}"#),
        ]);
        let ledger = RlLedger::new("/ws", "rl", runner.clone());
        let items = ledger
            .show(&["gt-a".into(), "gt-zz".into(), "gt-b".into()])
            .unwrap();
        let ids = items.iter().map(|i| i.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["gt-a", "gt-b"]);
        let calls = runner.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[2], vec!["show", "gt-zz", "--json"]);
    }

    #[tokio::test]
    async fn show_refs_survives_a_stale_edge() {
        let runner = ScriptedRunner::new(vec![
            CommandOutput::fail("issue gt-zz not found"),
            CommandOutput::ok(r#"{"id":"gt-a","title":"A","status":"closed"}"#),
            CommandOutput::fail("issue gt-zz not found"),
        ]);
        let ledgers = Ledgers::new(
            "/ws",
            RouteTable::from_routes(vec![Route::new("gt-", "horde")]),
            Arc::new(move |dir: &Path| -> Arc<dyn LedgerStore> {
                Arc::new(RlLedger::new(dir, "rl", runner.clone()))
            }),
            2,
        );
        let found = ledgers
            .show_refs(&[Ref::parse("gt-a"), Ref::parse("gt-zz")])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key("gt-a"));
    }

    #[test]
    fn not_found_names_the_missing_id() {
        let runner = ScriptedRunner::new(vec![CommandOutput::fail("Error: issue 'gt-zz' not found")]);
        let ledger = RlLedger::new("/ws", "rl", runner);
        match ledger.update("gt-zz", &WorkItemUpdate::status(WorkStatus::Open)) {
            Err(LedgerError::NotFound(id)) => assert_eq!(id, "gt-zz"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(missing_id("issue gt-zz not found", &["show", "gt-a", "gt-zz", "--json"]), "gt-zz");
        assert_eq!(missing_id("not found", &["show", "gt-a", "--json"]), "gt-a");
    }

    #[test]
    fn collaborator_stderr_is_preserved() {
        let runner = ScriptedRunner::new(vec![CommandOutput::fail("database is locked")]);
        let ledger = RlLedger::new("/ws", "rl", runner);
        match ledger.close("gt-a", None) {
            Err(LedgerError::Command { stderr, .. }) => assert_eq!(stderr, "database is locked"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn update_clears_assignee_with_empty_value() {
        let runner = ScriptedRunner::new(vec![]);
        let ledger = RlLedger::new("/ws", "rl", runner.clone());
        ledger
            .update("gt-a", &WorkItemUpdate::status(WorkStatus::Open).with_assignee(None))
            .unwrap();
        assert_eq!(
            runner.calls()[0],
            vec!["update", "gt-a", "--status", "open", "--assignee", ""]
        );
        // Empty updates never reach the binary.
        ledger.update("gt-a", &WorkItemUpdate::default()).unwrap();
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn slot_show_reads_named_slot() {
        let runner = ScriptedRunner::new(vec![CommandOutput::ok(r#"{"hook":"gt-abc","role":null}"#)]);
        let ledger = RlLedger::new("/ws", "rl", runner);
        assert_eq!(ledger.slot("gt-horde-raider-nux", "hook").unwrap().as_deref(), Some("gt-abc"));
    }

    #[test]
    fn ledgers_cache_one_handle_per_path() {
        let runner = ScriptedRunner::new(vec![]);
        let routes = RouteTable::from_routes(vec![
            Route::new("hq-", "."),
            Route::new("hq-cv-", "."),
            Route::new("gt-", "horde"),
        ]);
        let ledgers = Ledgers::new(
            "/ws",
            routes,
            Arc::new(move |dir: &Path| -> Arc<dyn LedgerStore> {
                Arc::new(RlLedger::new(dir, "rl", runner.clone()))
            }),
            4,
        );
        let a = ledgers.for_id("hq-cv-1").unwrap();
        let b = ledgers.for_id("hq-2").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(ledgers.for_id("gt-x").unwrap().location(), Path::new("/ws/horde"));
        assert_eq!(ledgers.all().len(), 2);
        assert!(ledgers.for_id("zz-1").is_err());
    }
}
