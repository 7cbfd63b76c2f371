//! An in-memory encampment for tests: a temp directory laid out on disk,
//! memory ledgers, a scripted `git` and a fake multiplexer.
//!
//! Warbands: `horde` (prefix `gt`) and `relics` (prefix `bd`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hd_core::config::HordeConfig;
use hd_core::ledger::{LedgerStore, Ledgers};
use hd_core::memory::{MemoryLedger, MemoryLedgers};
use hd_core::routes::{Route, RouteTable};
use hd_core::runner::{CommandOutput, CommandRunner, ScriptedRunner};
use hd_core::types::{ItemType, Role, WorkItem, WorkStatus};
use hd_core::workspace::{WarbandEntry, Workspace, WORKTREE_DIR};
use hd_session::fake::FakeMultiplexer;
use hd_session::mux::Multiplexer;

use crate::context::{Env, HordeContext};

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub memory: Arc<MemoryLedgers>,
    pub runner: Arc<ScriptedRunner>,
    pub mux: Arc<FakeMultiplexer>,
    ctx: HordeContext,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();
        let mut ws = Workspace::init_layout(&root, "camp", Some("tester".into())).expect("layout");

        let mut routes = RouteTable::load(&ws.routes_path()).expect("routes");
        routes.append(Route::new("hq-", ".")).expect("hq route");
        for (rig, prefix) in [("horde", "gt"), ("relics", "bd")] {
            ws.register_warband(
                rig,
                WarbandEntry {
                    path: PathBuf::from(rig),
                    prefix: prefix.into(),
                    default_branch: "main".into(),
                    git_url: Some(format!("https://example.com/{rig}.git")),
                    added_at: None,
                },
            )
            .expect("register warband");
            routes
                .append(Route::new(format!("{prefix}-"), rig))
                .expect("warband route");
            std::fs::create_dir_all(ws.canonical_clone(rig)).expect("canonical clone");
        }

        let memory = MemoryLedgers::new();
        memory.ledger(&root).init("hq").expect("init hq");
        memory.ledger(&root.join("horde")).init("gt").expect("init gt");
        memory.ledger(&root.join("relics")).init("bd").expect("init bd");
        let ledgers = Ledgers::new(&root, routes, memory.factory(), 4);

        let mut config = HordeConfig::default();
        config.session.shell_ready_timeout_ms = 50;
        config.session.poll_interval_ms = 10;

        let runner = Arc::new(ScriptedRunner::new());
        let mux = Arc::new(FakeMultiplexer::new());
        let ctx = HordeContext::from_parts(
            ws,
            config,
            Arc::new(ledgers),
            Arc::clone(&runner) as Arc<dyn CommandRunner>,
            Arc::clone(&mux) as Arc<dyn Multiplexer>,
            Env::default(),
            root,
        );
        Self {
            dir,
            memory,
            runner,
            mux,
            ctx,
        }
    }

    pub fn ctx(&self) -> &HordeContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut HordeContext {
        &mut self.ctx
    }

    pub fn root(&self) -> &Path {
        &self.ctx.ws.root
    }

    /// Run subsequent commands as `role`: exported env plus its home as cwd.
    pub fn act_as(&mut self, role: &Role) {
        let mut env = Env::default();
        env.set("HD_ROLE", role.kind().as_str());
        if let Some(rig) = role.rig() {
            env.set("HD_WARBAND", rig);
        }
        match role {
            Role::Raider { name, .. } => env.set("HD_RAIDER", name.as_str()),
            Role::Crew { name, .. } => env.set("HD_CLAN", name.as_str()),
            _ => {}
        }
        self.ctx.env = env;
        self.ctx.cwd = self.ctx.ws.role_home(role);
    }

    pub fn hq(&self) -> Arc<MemoryLedger> {
        self.memory.ledger(self.root())
    }

    pub fn ledger(&self, rig: &str) -> Arc<MemoryLedger> {
        self.memory.ledger(&self.root().join(rig))
    }

    fn ledger_for(&self, id: &str) -> Arc<MemoryLedger> {
        match id.split('-').next() {
            Some("gt") => self.ledger("horde"),
            Some("bd") => self.ledger("relics"),
            _ => self.hq(),
        }
    }

    /// Seed a task with the given status.
    pub fn seed(&self, id: &str, title: &str, status: WorkStatus) -> WorkItem {
        let mut item = WorkItem::new(id, title, ItemType::Task);
        item.status = status;
        self.ledger_for(id).insert(item.clone());
        item
    }

    /// Seed an item assigned to `assignee`.
    pub fn seed_assigned(&self, id: &str, status: WorkStatus, assignee: &str) -> WorkItem {
        let mut item = WorkItem::new(id, format!("task {id}"), ItemType::Task);
        item.status = status;
        item.assignee = Some(assignee.to_string());
        self.ledger_for(id).insert(item.clone());
        item
    }

    pub fn item(&self, id: &str) -> Option<WorkItem> {
        self.ledger_for(id).item(id)
    }

    /// Create an agent's directory and worktree on disk.
    pub fn make_agent_dir(&self, role: &Role) -> PathBuf {
        let home = self.ctx.ws.role_home(role);
        std::fs::create_dir_all(&home).expect("agent home");
        home
    }

    /// Script the git answers a clean raider worktree gives, one commit
    /// ahead of `origin/main`.
    pub fn script_clean_branch(&self, branch: &str) {
        self.runner
            .on("git", &["rev-parse", "--abbrev-ref", "HEAD"], CommandOutput::ok(branch))
            .on("git", &["status", "--porcelain"], CommandOutput::ok(""))
            .on("git", &["rev-list", "--count"], CommandOutput::ok("1"))
            .on("git", &["rev-list", "--count", "@{u}..HEAD"], CommandOutput::ok("0"))
            .on("git", &["stash", "list"], CommandOutput::ok(""));
    }

    pub fn worktree_dir(&self, rig: &str, name: &str) -> PathBuf {
        self.ctx.ws.raiders_dir(rig).join(name).join(WORKTREE_DIR)
    }
}
