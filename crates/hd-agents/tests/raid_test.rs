use hd_agents::raid::{self, NewRaid, LANDED_REASON};
use hd_agents::testkit::Fixture;
use hd_agents::ErrorKind;
use hd_core::ledger::LedgerStore;
use hd_core::types::{Dependency, DependencyKind, ItemType, WorkItem, WorkStatus};

fn close(fx: &Fixture, id: &str) {
    fx.ctx()
        .ledgers
        .for_id(id)
        .expect("route")
        .close(id, None)
        .expect("close");
}

fn inbox_len(fx: &Fixture, address: &str) -> usize {
    fx.ctx().drums.inbox(address, false).expect("inbox").len()
}

async fn two_ledger_raid(fx: &Fixture) -> WorkItem {
    fx.seed("gt-a", "Gate", WorkStatus::Open);
    fx.seed("bd-b", "Relic", WorkStatus::Open);
    let spec = NewRaid {
        name: Some("Spring cleaning".into()),
        items: vec!["gt-a".into(), "bd-b".into()],
        owner: Some("warchief/".into()),
        notify: Some("horde/witness, warchief/".into()),
        totem: None,
    };
    raid::create(fx.ctx(), &spec).await.expect("create")
}

#[tokio::test]
async fn raids_track_items_across_ledgers() {
    let fx = Fixture::new();
    let r = two_ledger_raid(&fx).await;

    assert!(r.id.starts_with("hq-cv-"));
    assert_eq!(r.item_type, ItemType::Raid);
    assert_eq!(r.description_field("owner").as_deref(), Some("warchief/"));
    let targets = r
        .dependencies
        .iter()
        .map(|d| d.depends_on_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(targets, vec!["external:gt-:gt-a", "external:bd-:bd-b"]);
    assert!(fx.hq().item(&r.id).is_some());
}

#[tokio::test]
async fn raid_lands_once_when_everything_closes() {
    let fx = Fixture::new();
    let r = two_ledger_raid(&fx).await;

    close(&fx, "gt-a");
    assert!(raid::check(fx.ctx()).await.expect("check").is_empty());
    assert_eq!(fx.hq().item(&r.id).expect("raid").status, WorkStatus::Open);

    close(&fx, "bd-b");
    let landed = raid::check(fx.ctx()).await.expect("check");
    assert_eq!(landed.len(), 1);
    assert_eq!(landed[0].raid_id, r.id);
    assert_eq!(landed[0].notified, vec!["warchief/", "horde/witness"]);

    let closed = fx.hq().item(&r.id).expect("raid");
    assert_eq!(closed.status, WorkStatus::Closed);
    assert_eq!(closed.close_reason.as_deref(), Some(LANDED_REASON));
    assert_eq!(inbox_len(&fx, "warchief/"), 1);
    assert_eq!(inbox_len(&fx, "horde/witness"), 1);

    assert!(raid::check(fx.ctx()).await.expect("second check").is_empty());
    assert_eq!(inbox_len(&fx, "warchief/"), 1);
    assert_eq!(inbox_len(&fx, "horde/witness"), 1);
}

#[tokio::test]
async fn tombstoned_items_count_as_done() {
    let fx = Fixture::new();
    let r = two_ledger_raid(&fx).await;
    close(&fx, "gt-a");
    fx.ctx()
        .ledgers
        .for_id("bd-b")
        .expect("route")
        .update(
            "bd-b",
            &hd_core::ledger::WorkItemUpdate::status(WorkStatus::Tombstone),
        )
        .expect("tombstone");

    let landed = raid::check(fx.ctx()).await.expect("check");
    assert_eq!(landed.len(), 1);
    assert_eq!(landed[0].raid_id, r.id);
}

#[tokio::test]
async fn adding_a_tracked_item_is_a_no_op() {
    let fx = Fixture::new();
    let r = two_ledger_raid(&fx).await;

    let out = raid::add(fx.ctx(), &r.id, &["gt-a".to_string()]).expect("add");
    assert!(out.added.is_empty());
    assert!(!out.reopened);
    assert_eq!(fx.hq().item(&r.id).expect("raid").dependencies.len(), 2);
}

#[tokio::test]
async fn adding_to_a_closed_raid_reopens_it() {
    let fx = Fixture::new();
    let r = two_ledger_raid(&fx).await;
    fx.seed("gt-c", "Late", WorkStatus::Open);
    assert!(raid::close(fx.ctx(), &r.id, Some("paused"), None).expect("close"));

    let out = raid::add(fx.ctx(), &r.id, &["gt-c".to_string()]).expect("add");
    assert!(out.reopened);
    assert_eq!(out.added, vec!["gt-c".to_string()]);
    let reopened = fx.hq().item(&r.id).expect("raid");
    assert_eq!(reopened.status, WorkStatus::Open);
    assert!(reopened.tracks("gt-c"));
}

#[tokio::test]
async fn manual_close_is_idempotent() {
    let fx = Fixture::new();
    let r = two_ledger_raid(&fx).await;

    assert!(raid::close(fx.ctx(), &r.id, None, Some("shaman/")).expect("close"));
    assert!(!raid::close(fx.ctx(), &r.id, None, Some("shaman/")).expect("again"));
    assert_eq!(inbox_len(&fx, "shaman/"), 1);
    assert_eq!(inbox_len(&fx, "warchief/"), 0);
}

#[tokio::test]
async fn unknown_items_are_refused() {
    let fx = Fixture::new();
    let spec = NewRaid {
        items: vec!["gt-nope".into()],
        ..Default::default()
    };
    let err = raid::create(fx.ctx(), &spec).await.expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::Preflight);
    assert!(err.to_string().contains("gt-nope"));
}

#[tokio::test]
async fn unnamed_raids_take_the_first_title() {
    let fx = Fixture::new();
    fx.seed("gt-a", "Rebuild the gate", WorkStatus::Open);
    let spec = NewRaid {
        items: vec!["gt-a".into()],
        ..Default::default()
    };
    let r = raid::create(fx.ctx(), &spec).await.expect("create");
    assert_eq!(r.title, "Rebuild the gate");
}

#[tokio::test]
async fn stranded_raids_list_undriven_ready_work() {
    let fx = Fixture::new();
    fx.seed_assigned("gt-q", WorkStatus::Open, "horde/raiders/ghost");
    let mut r = WorkItem::new("hq-cv-P", "Ghost work", ItemType::Raid);
    r.dependencies.push(Dependency {
        depends_on_id: "external:gt-:gt-q".into(),
        kind: DependencyKind::Tracks,
    });
    fx.hq().insert(r);

    let stranded = raid::stranded(fx.ctx()).await.expect("stranded");
    assert_eq!(stranded.len(), 1);
    assert_eq!(stranded[0].raid.id, "hq-cv-P");
    let ids = stranded[0].ready.iter().map(|i| i.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["gt-q"]);

    // Once the ghost's session is alive the work is driven again.
    let home = fx.root().join("horde/raiders/ghost/warband");
    fx.mux.insert("gt-horde-ghost", &home, "claude");
    assert!(raid::stranded(fx.ctx()).await.expect("stranded").is_empty());
}

#[tokio::test]
async fn blocked_items_are_not_stranded() {
    let fx = Fixture::new();
    fx.seed("gt-blocker", "First", WorkStatus::Open);
    let mut q = WorkItem::new("gt-q", "Second", ItemType::Task);
    q.dependencies.push(Dependency {
        depends_on_id: "gt-blocker".into(),
        kind: DependencyKind::Blocks,
    });
    fx.ledger("horde").insert(q);
    let spec = NewRaid {
        name: Some("chain".into()),
        items: vec!["gt-q".into()],
        ..Default::default()
    };
    raid::create(fx.ctx(), &spec).await.expect("create");

    assert!(raid::stranded(fx.ctx()).await.expect("stranded").is_empty());
}

#[tokio::test]
async fn status_reports_progress() {
    let fx = Fixture::new();
    let r = two_ledger_raid(&fx).await;
    close(&fx, "gt-a");
    fx.ctx()
        .ledgers
        .for_id("bd-b")
        .expect("route")
        .update(
            "bd-b",
            &hd_core::ledger::WorkItemUpdate::status(WorkStatus::Hooked)
                .with_assignee(Some("relics/raiders/ace".into())),
        )
        .expect("hook");

    let st = raid::status(fx.ctx(), &r.id).await.expect("status");
    assert_eq!(st.progress(), "1/2");
    assert_eq!(st.items[0].symbol(), "✓");
    assert_eq!(st.items[1].worker.as_deref(), Some("relics/raiders/ace"));
    assert_eq!(st.items[1].idle, None);

    let listed = raid::list(fx.ctx(), false).await.expect("list");
    assert_eq!(listed.len(), 1);
    raid::close(fx.ctx(), &r.id, None, None).expect("close");
    assert!(raid::list(fx.ctx(), false).await.expect("list").is_empty());
    assert_eq!(raid::list(fx.ctx(), true).await.expect("list").len(), 1);
}
