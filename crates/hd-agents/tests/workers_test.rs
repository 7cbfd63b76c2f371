use std::sync::Arc;

use hd_agents::context::{Env, HordeContext};
use hd_agents::install::{install, rig_add, RigOptions};
use hd_agents::testkit::Fixture;
use hd_agents::{crew, raiders, ErrorKind};
use hd_core::config::HordeConfig;
use hd_core::events::EventKind;
use hd_core::ledger::LedgerStore;
use hd_core::memory::MemoryLedgers;
use hd_core::runner::{CommandOutput, CommandRunner, ScriptedRunner};
use hd_core::types::{CleanupStatus, Role, WorkStatus};
use hd_session::fake::FakeMultiplexer;
use hd_session::mux::Multiplexer;

fn raider(name: &str) -> Role {
    Role::Raider {
        rig: "horde".into(),
        name: name.into(),
    }
}

fn max() -> Role {
    Role::Crew {
        rig: "horde".into(),
        name: "max".into(),
    }
}

#[test]
fn raider_add_picks_a_themed_name() {
    let fx = Fixture::new();
    let (first, wt) = raiders::add(fx.ctx(), "horde", None).expect("add");
    assert_eq!(first, raider("nux"));
    assert!(wt.branch.starts_with("raider/nux-"));
    assert!(fx.runner.called("git", &["worktree", "add", "-b", wt.branch.as_str()]));

    let (second, _) = raiders::add(fx.ctx(), "horde", None).expect("add");
    assert_eq!(second, raider("slit"));
    assert!(fx.ctx().records().get(&second).expect("get").is_some());

    let names = raiders::list(fx.ctx(), Some("horde"))
        .expect("list")
        .into_iter()
        .map(|r| r.role)
        .collect::<Vec<_>>();
    assert_eq!(names, vec![raider("nux"), raider("slit")]);
}

#[test]
fn clean_idle_raiders_can_be_nuked() {
    let fx = Fixture::new();
    let nux = raider("nux");
    let home = fx.make_agent_dir(&nux);
    fx.ctx().records().ensure(&nux).expect("record");
    fx.script_clean_branch("raider/nux-k3x9a");

    let recovery = raiders::check_recovery(fx.ctx(), "horde", "nux").expect("check");
    assert!(recovery.is_safe(), "{:?}", recovery.reasons());

    let out = raiders::nuke(fx.ctx(), "horde", "nux", false).expect("nuke");
    assert!(out.record_deleted);
    assert_eq!(out.branch_deleted.as_deref(), Some("raider/nux-k3x9a"));
    assert!(!home.exists());
    assert!(fx.ctx().records().get(&nux).expect("get").is_none());
    assert!(fx.runner.called("git", &["branch", "-D", "raider/nux-k3x9a"]));
    let events = fx.ctx().events.read_all().expect("events");
    assert!(events
        .iter()
        .any(|e| e.kind == EventKind::Kill && e.detail == "horde/raiders/nux"));
}

#[test]
fn raiders_with_work_are_not_nuked_without_force() {
    let fx = Fixture::new();
    let nux = raider("nux");
    fx.make_agent_dir(&nux);
    fx.seed_assigned("gt-abc", WorkStatus::Hooked, "horde/raiders/nux");
    fx.ctx().records().set_hook(&nux, Some("gt-abc")).expect("hook");
    fx.script_clean_branch("raider/nux-k3x9a");
    fx.runner
        .on("git", &["rev-list", "--count", "@{u}..HEAD"], CommandOutput::ok("2"));

    let recovery = raiders::check_recovery(fx.ctx(), "horde", "nux").expect("check");
    assert_eq!(recovery.cleanup, CleanupStatus::Unpushed);
    assert_eq!(recovery.hook.as_deref(), Some("gt-abc"));

    let err = raiders::nuke(fx.ctx(), "horde", "nux", false).expect_err("unsafe");
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(fx.ctx().ws.role_home(&nux).exists());

    let out = raiders::nuke(fx.ctx(), "horde", "nux", true).expect("forced");
    assert_eq!(out.released.as_deref(), Some("gt-abc"));
    let item = fx.item("gt-abc").expect("item");
    assert_eq!(item.status, WorkStatus::Open);
    assert_eq!(item.assignee, None);
}

#[test]
fn open_merge_requests_block_recovery() {
    let fx = Fixture::new();
    let nux = raider("nux");
    fx.make_agent_dir(&nux);
    fx.seed("gt-mr1", "Merge raider/nux-k3x9a", WorkStatus::Open);
    fx.ctx().records().set_active_mr(&nux, Some("gt-mr1")).expect("mr");
    fx.script_clean_branch("raider/nux-k3x9a");

    let recovery = raiders::check_recovery(fx.ctx(), "horde", "nux").expect("check");
    assert_eq!(recovery.pending_mr.as_deref(), Some("gt-mr1"));

    fx.ctx()
        .ledgers
        .for_id("gt-mr1")
        .expect("route")
        .close("gt-mr1", Some("merged"))
        .expect("close");
    let recovery = raiders::check_recovery(fx.ctx(), "horde", "nux").expect("check");
    assert!(recovery.is_safe());
}

#[test]
fn dirty_raiders_are_kept_on_remove() {
    let fx = Fixture::new();
    let nux = raider("nux");
    let home = fx.make_agent_dir(&nux);
    fx.runner
        .on("git", &["status", "--porcelain"], CommandOutput::ok("?? notes.md\n"));

    let err = raiders::remove(fx.ctx(), "horde", "nux", false).expect_err("dirty");
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(home.exists());

    raiders::remove(fx.ctx(), "horde", "nux", true).expect("forced");
    assert!(!home.exists());
}

#[test]
fn git_state_summarises_the_worktree() {
    let fx = Fixture::new();
    fx.make_agent_dir(&raider("nux"));
    fx.script_clean_branch("raider/nux-k3x9a");
    fx.runner
        .on("git", &["rev-list", "--count", "HEAD..origin/main"], CommandOutput::ok("4"))
        .on("git", &["log", "-1"], CommandOutput::ok("abc1234 Fix the gate"));

    let st = raiders::git_state(fx.ctx(), "horde", "nux").expect("state");
    assert_eq!(st.branch, "raider/nux-k3x9a");
    assert_eq!(st.base, "origin/main");
    assert_eq!(st.ahead, 1);
    assert_eq!(st.behind, 4);
    assert_eq!(st.cleanup, CleanupStatus::Clean);
    assert_eq!(st.last_commit.as_deref(), Some("abc1234 Fix the gate"));
}

#[test]
fn gc_deletes_orphaned_raider_branches() {
    let fx = Fixture::new();
    fx.runner
        .on(
            "git",
            &["for-each-ref"],
            CommandOutput::ok("raider/nux-k3x9a\nraider/old-1a2b3\n"),
        )
        .on(
            "git",
            &["worktree", "list", "--porcelain"],
            CommandOutput::ok(
                "worktree /camp/horde/warchief/warband\nbranch refs/heads/main\n\n\
                 worktree /camp/horde/raiders/nux/warband\nbranch refs/heads/raider/nux-k3x9a\n",
            ),
        );

    let dry = raiders::gc(fx.ctx(), "horde", true).expect("dry run");
    assert_eq!(dry, vec!["raider/old-1a2b3".to_string()]);
    assert!(!fx.runner.called("git", &["branch", "-D"]));

    raiders::gc(fx.ctx(), "horde", false).expect("gc");
    assert!(fx.runner.called("git", &["branch", "-D", "raider/old-1a2b3"]));
    assert!(!fx.runner.called("git", &["branch", "-D", "raider/nux-k3x9a"]));
}

#[test]
fn stale_skips_busy_raiders() {
    let mut fx = Fixture::new();
    fx.ctx_mut().config.raider.stale_hours = 0;
    let (nux, slit) = (raider("nux"), raider("slit"));
    fx.make_agent_dir(&nux);
    let slit_home = fx.make_agent_dir(&slit);
    fx.mux.insert("gt-horde-slit", &slit_home, "claude");
    std::thread::sleep(std::time::Duration::from_millis(20));

    let stale = raiders::stale(fx.ctx(), Some("horde")).expect("stale");
    let roles = stale.into_iter().map(|s| s.role).collect::<Vec<_>>();
    assert_eq!(roles, vec![nux]);
}

#[tokio::test]
async fn crew_sessions_start_refresh_and_stop() {
    let fx = Fixture::new();
    let max = max();
    fx.make_agent_dir(&max);

    let (session, outcome) = crew::start(fx.ctx(), "horde", "max").await.expect("start");
    assert_eq!(session, "gt-horde-clan-max");
    assert_eq!(outcome, hd_session::bridge::StartOutcome::Created);

    crew::refresh(fx.ctx(), "horde", "max", Some("halfway through the gate")).expect("refresh");
    let pane = fx.mux.session(&session).expect("session");
    assert_eq!(pane.respawned.len(), 2);
    assert!(pane.respawned[1].contains("topic=refresh"));
    let inbox = fx.ctx().drums.inbox("horde/clan/max", true).expect("inbox");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].subject, "HANDOFF");
    assert!(inbox[0].body.contains("halfway"));

    let st = crew::status(fx.ctx(), "horde", "max").expect("status");
    assert!(st.info.running);
    assert_eq!(st.unread, 1);

    assert!(crew::stop(fx.ctx(), "horde", "max").expect("stop"));
    assert!(!crew::stop(fx.ctx(), "horde", "max").expect("stop again"));
}

#[tokio::test]
async fn crew_at_attaches() {
    let fx = Fixture::new();
    fx.make_agent_dir(&max());
    let target = crew::at(fx.ctx(), "horde", "max").await.expect("at");
    assert_eq!(fx.mux.attached(), vec![target]);
}

#[test]
fn crew_add_and_rename() {
    let fx = Fixture::new();
    let (role, wt) = crew::add(fx.ctx(), "horde", "max").expect("add");
    assert_eq!(role, max());
    assert_eq!(wt.branch, "clan/max");
    // Worktree contents are git's job; give it a directory to move.
    std::fs::create_dir_all(&wt.path).expect("worktree dir");
    fx.ctx().records().set_hook(&role, Some("gt-abc")).expect("hook");

    let renamed = crew::rename(fx.ctx(), "horde", "max", "furiosa").expect("rename");
    assert_eq!(
        renamed,
        Role::Crew {
            rig: "horde".into(),
            name: "furiosa".into()
        }
    );
    assert!(fx.runner.called("git", &["branch", "-m", "clan/max", "clan/furiosa"]));
    assert!(!fx.ctx().ws.clan_dir("horde").join("max").exists());
    let records = fx.ctx().records();
    assert!(records.get(&role).expect("get").is_none());
    assert_eq!(
        records.get(&renamed).expect("get").expect("record").hook.as_deref(),
        Some("gt-abc")
    );
}

#[test]
fn running_crew_cannot_be_renamed() {
    let fx = Fixture::new();
    let home = fx.make_agent_dir(&max());
    fx.mux.insert("gt-horde-clan-max", &home, "claude");
    let err = crew::rename(fx.ctx(), "horde", "max", "furiosa").expect_err("running");
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[test]
fn pristine_refuses_dirty_worktrees() {
    let fx = Fixture::new();
    fx.make_agent_dir(&max());
    fx.runner
        .on("git", &["status", "--porcelain"], CommandOutput::ok(" M README.md\n"));
    let err = crew::pristine(fx.ctx(), "horde", "max").expect_err("dirty");
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(!fx.runner.called("git", &["pull"]));
}

#[test]
fn pristine_fast_forwards() {
    let fx = Fixture::new();
    fx.make_agent_dir(&max());
    crew::pristine(fx.ctx(), "horde", "max").expect("pristine");
    assert!(fx.runner.called("git", &["fetch", "origin"]));
    assert!(fx.runner.called("git", &["pull", "--ff-only", "origin", "main"]));
}

#[test]
fn crew_remove_kills_and_forgets() {
    let fx = Fixture::new();
    let home = fx.make_agent_dir(&max());
    fx.ctx().records().ensure(&max()).expect("record");
    fx.mux.insert("gt-horde-clan-max", &home, "claude");

    crew::remove(fx.ctx(), "horde", "max", false).expect("remove");
    assert_eq!(fx.mux.killed(), vec!["gt-horde-clan-max".to_string()]);
    assert!(!home.exists());
    assert!(fx.ctx().records().get(&max()).expect("get").is_none());
}

#[test]
fn install_and_add_a_warband() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("camp");
    let memory = MemoryLedgers::new();
    let installed = install(&root, "camp", Some("tester".into()), memory.factory(), 2).expect("install");

    let hq = memory.ledger(&root);
    assert!(hq.item("hq-warchief").is_some());
    assert!(hq.item("hq-shaman").is_some());
    assert!(root.join("warchief/encampment.json").exists());
    assert!(root.join("warchief/CLAUDE.md").exists());
    let routes = installed.ledgers.routes();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].prefix, "hq-");

    let runner = Arc::new(ScriptedRunner::new());
    runner.on(
        "git",
        &["symbolic-ref"],
        CommandOutput::ok("origin/trunk"),
    );
    let mut ctx = HordeContext::from_parts(
        installed.ws,
        HordeConfig::default(),
        Arc::new(installed.ledgers),
        Arc::clone(&runner) as Arc<dyn CommandRunner>,
        Arc::new(FakeMultiplexer::new()) as Arc<dyn Multiplexer>,
        Env::default(),
        root.clone(),
    );

    let entry = rig_add(
        &mut ctx,
        "gas_town",
        "https://example.com/gas_town.git",
        &RigOptions::default(),
    )
    .expect("rig add");
    assert_eq!(entry.prefix, "gt");
    assert_eq!(entry.default_branch, "trunk");
    assert!(runner.called("git", &["clone", "https://example.com/gas_town.git"]));
    assert!(ctx.ws.is_warband("gas_town"));
    assert!(root.join("gas_town/raiders").is_dir());
    assert!(ctx.ledgers.routes().iter().any(|r| r.prefix == "gt-"));

    let rig_ledger = memory.ledger(&root.join("gas_town"));
    assert!(rig_ledger.item("gt-gas_town-witness").is_some());
    assert!(rig_ledger.item("gt-gas_town-forge").is_some());
    assert!(rig_ledger.exists("gt-gas_town-witness").expect("exists"));

    let err = rig_add(
        &mut ctx,
        "gas_town",
        "https://example.com/gas_town.git",
        &RigOptions::default(),
    )
    .expect_err("duplicate");
    assert_eq!(err.kind(), ErrorKind::Preflight);

    let err = rig_add(
        &mut ctx,
        "gate",
        "https://example.com/gate.git",
        &RigOptions {
            prefix: Some("gt".into()),
            branch: None,
        },
    )
    .expect_err("prefix taken");
    assert!(err.to_string().contains("already taken"));
}
