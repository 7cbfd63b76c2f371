//! Terminal-multiplexer sessions for horde agents.
//!
//! Key components:
//! - Deterministic session naming (identity ↔ session name)
//! - The [`mux::Multiplexer`] seam with a tmux implementation
//! - The session bridge: startup contract, restart-on-exit, liveness, crash mapping
//! - Startup beacons and status-bar themes

pub mod beacon;
pub mod bridge;
pub mod mux;
pub mod naming;
pub mod theme;

#[cfg(any(test, feature = "testing"))]
pub mod fake;
