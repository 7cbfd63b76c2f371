use std::path::PathBuf;
use std::time::Duration;

use hd_core::checkpoint::Checkpoint;
use hd_core::drums::{Drums, Message};
use hd_core::events::{Event, EventKind, EventLog, EventQuery};
use hd_core::routes::{Route, RouteTable};
use hd_core::types::Role;
use hd_core::watch::LogWatcher;
use hd_core::workspace::{WarbandEntry, Workspace};

fn encampment() -> (tempfile::TempDir, Workspace) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut ws = Workspace::init_layout(tmp.path(), "camp", Some("max".into())).expect("layout");
    ws.register_warband(
        "horde",
        WarbandEntry {
            path: PathBuf::from("horde"),
            prefix: "gt".into(),
            default_branch: "main".into(),
            git_url: Some("https://example.invalid/horde.git".into()),
            added_at: None,
        },
    )
    .expect("register");
    (tmp, ws)
}

#[test]
fn registry_survives_a_reload() {
    let (_tmp, ws) = encampment();
    let again = Workspace::load(&ws.root).expect("reload");
    assert_eq!(again.name(), "camp");
    assert_eq!(again.rig_prefix("horde").expect("prefix"), "gt");
    assert_eq!(again.warband_names(), vec!["horde".to_string()]);

    let nux = Role::Raider {
        rig: "horde".into(),
        name: "nux".into(),
    };
    assert_eq!(again.role_home(&nux), ws.root.join("horde/raiders/nux/warband"));
}

#[test]
fn routes_are_appended_and_reloaded() {
    let (_tmp, ws) = encampment();
    let mut table = RouteTable::load(&ws.routes_path()).expect("load");
    assert!(table.is_empty());
    table.append(Route::new("hq-", ".")).expect("hq");
    table.append(Route::new("gt-", "horde")).expect("gt");
    assert!(table.append(Route::new("gt-", "elsewhere")).is_err());

    let reloaded = RouteTable::load(&ws.routes_path()).expect("reload");
    assert_eq!(reloaded.routes().len(), 2);
    assert_eq!(reloaded.resolve("gt-abc").expect("route").path, "horde");
    assert!(reloaded.resolve("zz-1").is_err());
}

#[test]
fn drums_deliver_in_order_and_mark_read_once() {
    let (_tmp, ws) = encampment();
    let drums = Drums::new(ws.drums_dir());
    let first = drums
        .send(&Message::new("horde/witness", "warchief/", "one", ""))
        .expect("send");
    drums
        .send(&Message::new("horde/witness/", "warchief/", "two", "body"))
        .expect("send");

    let inbox = drums.inbox("horde/witness", false).expect("inbox");
    let subjects = inbox.iter().map(|m| m.subject.as_str()).collect::<Vec<_>>();
    assert_eq!(subjects, vec!["one", "two"]);
    assert_eq!(drums.unread_count("horde/witness").expect("count"), 2);

    drums.read("horde/witness", &first).expect("read");
    drums.mark_read("horde/witness", &first).expect("again");
    assert_eq!(drums.unread_count("horde/witness").expect("count"), 1);
}

#[test]
fn the_lifecycle_log_can_be_followed() {
    let (_tmp, ws) = encampment();
    let log = EventLog::new(ws.event_log_path());
    log.emit(EventKind::Spawn, "horde/raiders/nux", "gt-horde-nux");

    let mut follower = log.follower();
    assert!(follower.poll().expect("poll").is_empty());
    log.append(&Event::new(EventKind::Crash, "horde/raiders/nux", "gt-horde-nux exit=1"))
        .expect("append");
    log.emit(EventKind::PatrolStarted, "horde/witness", "sweep");

    let fresh = follower.poll().expect("poll");
    assert_eq!(fresh.len(), 2);
    assert_eq!(fresh[0].kind, EventKind::Crash);

    let raiders = log
        .query(&EventQuery {
            actor_prefix: Some("horde/raiders/".into()),
            ..Default::default()
        })
        .expect("query");
    assert_eq!(raiders.len(), 2);
}

#[tokio::test]
async fn the_watcher_wakes_a_follower_on_append() {
    let (_tmp, ws) = encampment();
    let log = EventLog::new(ws.event_log_path());
    let mut follower = log.follower();
    let mut watcher = LogWatcher::new(log.path()).expect("watch");

    log.emit(EventKind::Spawn, "horde/raiders/nux", "gt-horde-nux");
    let woke = tokio::time::timeout(Duration::from_secs(10), watcher.changed())
        .await
        .expect("no change notification");
    assert!(woke.is_some());
    let fresh = follower.poll().expect("poll");
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].kind, EventKind::Spawn);
}

#[test]
fn checkpoints_live_in_the_worktree() {
    let (_tmp, ws) = encampment();
    let nux = Role::Raider {
        rig: "horde".into(),
        name: "nux".into(),
    };
    let home = ws.role_home(&nux);
    std::fs::create_dir_all(&home).expect("home");

    let cp = Checkpoint {
        hooked_bead: Some("gt-abc".into()),
        branch: Some("raider/nux-k3x".into()),
        ..Checkpoint::new()
    };
    cp.write(&home).expect("write");
    let back = Checkpoint::read(&home).expect("read").expect("present");
    assert_eq!(back.hooked_bead.as_deref(), Some("gt-abc"));
    assert!(!back.is_stale(24));
    assert!(back.summary().contains("hooked gt-abc"));

    assert!(Checkpoint::clear(&home).expect("clear"));
    assert!(Checkpoint::read(&home).expect("read").is_none());
}
