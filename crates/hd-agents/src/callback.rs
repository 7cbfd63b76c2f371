//! Targets of tmux hooks installed by the session bridge.

use hd_core::events::EventKind;
use hd_core::types::Role;
use hd_session::beacon::{Beacon, TOPIC_START};
use hd_session::bridge::event_for_exit;
use hd_session::naming::parse_in_workspace;

use crate::context::HordeContext;
use crate::error::{HordeError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneDied {
    pub role: Role,
    pub event: EventKind,
    /// The runtime was respawned with topic `restart`.
    pub restarted: bool,
}

/// Record a pane exit and bring a crashed runtime back.
///
/// Exit 0 is a clean finish and 130 an operator interrupt; both are left
/// alone. Anything else counts as a crash and the pane is respawned with
/// the agent's hook in the beacon.
pub fn pane_died(ctx: &HordeContext, session: &str, code: i32) -> Result<PaneDied> {
    let role = parse_in_workspace(&ctx.ws, session).ok_or_else(|| {
        HordeError::preflight(
            format!("{session} is not a horde session"),
            "session names look like gt-horde-nux or hq-warchief",
        )
    })?;
    let identity = role.identity();
    let event = event_for_exit(code);
    ctx.emit(event, &identity, &format!("{session} exit={code}"));

    let mut restarted = false;
    if event == EventKind::Crash && ctx.sessions.has_session(session)? {
        let mut beacon = Beacon::new(identity.clone(), TOPIC_START);
        if let Some(hook) = ctx.records().hook_of(&role)? {
            beacon = beacon.with_hook(hook);
        }
        ctx.sessions.restart(session, &beacon)?;
        tracing::warn!(%session, code, agent = %identity, "runtime crashed; respawned");
        restarted = true;
    } else {
        tracing::info!(%session, code, agent = %identity, event = %event, "pane exited");
    }
    Ok(PaneDied {
        role,
        event,
        restarted,
    })
}
