use std::path::PathBuf;
use std::sync::Arc;

use hd_core::config::{RuntimeConfig, SessionConfig};
use hd_core::types::Role;
use hd_core::workspace::{WarbandEntry, Workspace};
use hd_session::beacon::{Beacon, TOPIC_START};
use hd_session::bridge::{SessionBridge, StartOutcome, StartRequest};
use hd_session::fake::FakeMultiplexer;
use hd_session::naming::{parse_in_workspace, session_name};

fn workspace() -> (tempfile::TempDir, Workspace) {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = Workspace::init_layout(dir.path(), "camp", None).unwrap();
    ws.register_warband(
        "horde",
        WarbandEntry {
            path: PathBuf::from("horde"),
            prefix: "gt".into(),
            default_branch: "main".into(),
            git_url: None,
            added_at: None,
        },
    )
    .unwrap();
    (dir, ws)
}

#[test]
fn names_round_trip_through_the_registry() {
    let (_dir, ws) = workspace();
    for role in [
        Role::Warchief,
        Role::Shaman,
        Role::Witness { rig: "horde".into() },
        Role::Raider { rig: "horde".into(), name: "nux".into() },
        Role::Crew { rig: "horde".into(), name: "max".into() },
    ] {
        let name = session_name(&ws, &role).unwrap();
        assert_eq!(parse_in_workspace(&ws, &name), Some(role));
    }
    assert!(session_name(&ws, &Role::Forge { rig: "nope".into() }).is_err());
}

#[tokio::test]
async fn warchief_session_starts_in_its_home() {
    let (_dir, ws) = workspace();
    let mux = Arc::new(FakeMultiplexer::new());
    let bridge = SessionBridge::new(mux.clone(), RuntimeConfig::default(), SessionConfig::default());

    let role = Role::Warchief;
    let name = session_name(&ws, &role).unwrap();
    let req = StartRequest {
        session: name.clone(),
        workdir: ws.role_home(&role),
        workspace_root: ws.root.clone(),
        beacon: Beacon::new(role.identity(), TOPIC_START),
        role,
        extra_env: Vec::new(),
    };
    assert_eq!(bridge.start(&req).await.unwrap(), StartOutcome::Created);

    let session = mux.session(&name).unwrap();
    assert_eq!(session.cwd, ws.root.join("warchief"));
    assert_eq!(session.env["HD_ROLE"], "warchief");
    assert!(!session.env.contains_key("HD_WARBAND"));
    assert_eq!(session.options["status-left"], "[warchief/] ");

    bridge.inject_prompt(&name, "Check your drums").unwrap();
    assert_eq!(
        mux.session(&name).unwrap().keys,
        vec!["Check your drums".to_string(), "<Enter>".to_string()]
    );

    assert!(bridge.kill(&name).unwrap());
    assert!(!bridge.is_agent_running(&name).unwrap());
}
