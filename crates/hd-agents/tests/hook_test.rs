use hd_agents::hook::{charge, parse_target, unsling, ChargeOptions, ChargeTarget};
use hd_agents::testkit::Fixture;
use hd_agents::ErrorKind;
use hd_core::types::{Role, WorkStatus};

fn raider(name: &str) -> Role {
    Role::Raider {
        rig: "horde".into(),
        name: name.into(),
    }
}

fn quiet() -> ChargeOptions {
    ChargeOptions {
        no_start: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn pinned_items_are_refused() {
    let fx = Fixture::new();
    fx.seed("gt-abc", "Keep me", WorkStatus::Pinned);

    let target = parse_target(&fx.ctx().ws, Some("horde/raiders/nux")).expect("target");
    let opts = ChargeOptions {
        create: true,
        ..Default::default()
    };
    let err = charge(fx.ctx(), "gt-abc", target, &opts)
        .await
        .expect_err("pinned");

    assert_eq!(err.kind(), ErrorKind::Preflight);
    assert!(err.to_string().contains("already pinned"));
    let item = fx.item("gt-abc").expect("item");
    assert_eq!(item.status, WorkStatus::Pinned);
    assert_eq!(item.assignee, None);
    assert!(!fx.ctx().ws.raiders_dir("horde").join("nux").exists());
    assert!(fx.mux.names().is_empty());
    assert!(fx.ctx().records().get(&raider("nux")).expect("get").is_none());
}

#[tokio::test]
async fn charge_then_unsling_restores_state() {
    let fx = Fixture::new();
    let nux = raider("nux");
    fx.make_agent_dir(&nux);
    fx.ctx().records().ensure(&nux).expect("record");
    let before_item = fx.seed("gt-abc", "Fix the gate", WorkStatus::Open);
    let before_record = fx.ctx().records().get(&nux).expect("get");

    charge(fx.ctx(), "gt-abc", ChargeTarget::Agent(nux.clone()), &quiet())
        .await
        .expect("charge");
    let hooked = fx.item("gt-abc").expect("item");
    assert_eq!(hooked.status, WorkStatus::Hooked);
    assert!(hooked.labels.iter().any(|l| l == "dispatched_by:human"));

    let out = unsling(fx.ctx(), Some("gt-abc"), Some(nux.clone()), true).expect("unsling");
    assert!(out.reverted);

    let after_item = fx.item("gt-abc").expect("item");
    assert_eq!(after_item.status, before_item.status);
    assert_eq!(after_item.assignee, before_item.assignee);
    assert_eq!(after_item.labels, before_item.labels);
    assert_eq!(fx.ctx().records().get(&nux).expect("get"), before_record);
}

#[tokio::test]
async fn hooked_items_need_force_to_move() {
    let fx = Fixture::new();
    let (nux, slit) = (raider("nux"), raider("slit"));
    fx.make_agent_dir(&nux);
    fx.make_agent_dir(&slit);
    fx.seed_assigned("gt-abc", WorkStatus::Hooked, "horde/raiders/slit");
    fx.ctx().records().set_hook(&slit, Some("gt-abc")).expect("hook slit");

    let err = charge(fx.ctx(), "gt-abc", ChargeTarget::Agent(nux.clone()), &quiet())
        .await
        .expect_err("held elsewhere");
    assert_eq!(err.kind(), ErrorKind::Preflight);
    assert!(err.to_string().contains("horde/raiders/slit"));

    let opts = ChargeOptions {
        force: true,
        ..quiet()
    };
    charge(fx.ctx(), "gt-abc", ChargeTarget::Agent(nux.clone()), &opts)
        .await
        .expect("forced");

    let records = fx.ctx().records();
    assert_eq!(records.get(&slit).expect("get").expect("slit").hook, None);
    assert_eq!(
        records.get(&nux).expect("get").expect("nux").hook.as_deref(),
        Some("gt-abc")
    );
    assert_eq!(
        fx.item("gt-abc").expect("item").assignee.as_deref(),
        Some("horde/raiders/nux")
    );
}

#[tokio::test]
async fn a_live_hook_blocks_new_work() {
    let fx = Fixture::new();
    let nux = raider("nux");
    fx.make_agent_dir(&nux);
    fx.seed_assigned("gt-old", WorkStatus::Hooked, "horde/raiders/nux");
    fx.ctx().records().set_hook(&nux, Some("gt-old")).expect("hook");
    fx.seed("gt-new", "Next", WorkStatus::Open);

    let err = charge(fx.ctx(), "gt-new", ChargeTarget::Agent(nux.clone()), &quiet())
        .await
        .expect_err("busy");
    assert!(err.to_string().contains("gt-old"));
    assert_eq!(fx.item("gt-new").expect("item").status, WorkStatus::Open);
}

#[tokio::test]
async fn forcing_new_work_releases_the_old_hook() {
    let fx = Fixture::new();
    let nux = raider("nux");
    fx.make_agent_dir(&nux);
    fx.seed("gt-a", "First", WorkStatus::Open);
    fx.seed("gt-b", "Second", WorkStatus::Open);

    charge(fx.ctx(), "gt-a", ChargeTarget::Agent(nux.clone()), &quiet())
        .await
        .expect("first");
    let opts = ChargeOptions {
        force: true,
        ..quiet()
    };
    charge(fx.ctx(), "gt-b", ChargeTarget::Agent(nux.clone()), &opts)
        .await
        .expect("forced");

    let old = fx.item("gt-a").expect("gt-a");
    assert_eq!(old.status, WorkStatus::Open);
    assert_eq!(old.assignee, None);
    assert!(!old.labels.iter().any(|l| l.starts_with("dispatched_by:")));

    let hooked_to_nux = ["gt-a", "gt-b"]
        .into_iter()
        .filter_map(|id| fx.item(id))
        .filter(|i| i.status == WorkStatus::Hooked && i.assignee.as_deref() == Some("horde/raiders/nux"))
        .count();
    assert_eq!(hooked_to_nux, 1);
    assert_eq!(
        fx.ctx().records().hook_of(&nux).expect("hook").as_deref(),
        Some("gt-b")
    );
}

#[tokio::test]
async fn closed_items_cannot_be_charged() {
    let fx = Fixture::new();
    let nux = raider("nux");
    fx.make_agent_dir(&nux);
    fx.seed("gt-abc", "Done already", WorkStatus::Closed);

    let err = charge(fx.ctx(), "gt-abc", ChargeTarget::Agent(nux.clone()), &quiet())
        .await
        .expect_err("closed");
    assert_eq!(err.kind(), ErrorKind::Preflight);
    assert!(err.to_string().contains("gt-abc is closed"));
    assert_eq!(fx.ctx().records().hook_of(&nux).expect("hook"), None);
}

#[tokio::test]
async fn recharging_the_same_item_is_a_no_op() {
    let fx = Fixture::new();
    let nux = raider("nux");
    fx.make_agent_dir(&nux);
    fx.seed("gt-abc", "Fix", WorkStatus::Open);

    charge(fx.ctx(), "gt-abc", ChargeTarget::Agent(nux.clone()), &quiet())
        .await
        .expect("first");
    let again = charge(fx.ctx(), "gt-abc", ChargeTarget::Agent(nux), &quiet())
        .await
        .expect("second");
    assert!(again.unchanged);
}

#[tokio::test]
async fn running_agents_are_nudged() {
    let fx = Fixture::new();
    let nux = raider("nux");
    let home = fx.make_agent_dir(&nux);
    fx.mux.insert("gt-horde-nux", &home, "claude");
    fx.seed("gt-abc", "Fix", WorkStatus::Open);

    let out = charge(
        fx.ctx(),
        "gt-abc",
        ChargeTarget::Agent(nux),
        &ChargeOptions::default(),
    )
    .await
    .expect("charge");

    assert!(out.nudged);
    assert_eq!(out.started, None);
    let keys = fx.mux.session("gt-horde-nux").expect("session").keys;
    assert!(keys.iter().any(|k| k.contains("gt-abc")));
    let inbox = fx.ctx().drums.inbox("horde/raiders/nux", true).expect("inbox");
    assert_eq!(inbox[0].subject, "HOOKED gt-abc");
}

#[tokio::test]
async fn missing_agents_need_create() {
    let fx = Fixture::new();
    fx.seed("gt-abc", "Fix", WorkStatus::Open);

    let err = charge(fx.ctx(), "gt-abc", ChargeTarget::Agent(raider("ace")), &quiet())
        .await
        .expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::Preflight);
    assert!(err.to_string().contains("--create"));
}

#[tokio::test]
async fn self_charge_uses_the_callers_role() {
    let mut fx = Fixture::new();
    let max = Role::Crew {
        rig: "horde".into(),
        name: "max".into(),
    };
    fx.make_agent_dir(&max);
    fx.act_as(&max);
    fx.seed("gt-abc", "Fix", WorkStatus::Open);

    let out = charge(fx.ctx(), "gt-abc", ChargeTarget::SelfAgent, &quiet())
        .await
        .expect("charge");
    assert_eq!(out.role, max);
    assert_eq!(
        fx.item("gt-abc").expect("item").assignee.as_deref(),
        Some("horde/clan/max")
    );
}

#[test]
fn unsling_refuses_open_work_without_force() {
    let fx = Fixture::new();
    let nux = raider("nux");
    fx.seed_assigned("gt-abc", WorkStatus::Hooked, "horde/raiders/nux");
    fx.ctx().records().set_hook(&nux, Some("gt-abc")).expect("hook");

    let err = unsling(fx.ctx(), None, Some(nux.clone()), false).expect_err("open work");
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(fx.item("gt-abc").expect("item").status, WorkStatus::Hooked);
    assert_eq!(
        fx.ctx().records().hook_of(&nux).expect("hook").as_deref(),
        Some("gt-abc")
    );
}

#[test]
fn unsling_releases_closed_work() {
    let fx = Fixture::new();
    let nux = raider("nux");
    fx.seed_assigned("gt-abc", WorkStatus::Closed, "horde/raiders/nux");
    fx.ctx().records().set_hook(&nux, Some("gt-abc")).expect("hook");

    let out = unsling(fx.ctx(), None, Some(nux.clone()), false).expect("unsling");
    assert!(!out.reverted);
    assert_eq!(fx.ctx().records().get(&nux).expect("get").expect("record").hook, None);
    assert_eq!(fx.item("gt-abc").expect("item").status, WorkStatus::Closed);
}
