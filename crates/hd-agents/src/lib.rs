//! Agent lifecycle for horde: who am I, what am I working on, and how
//! work moves between agents.
//!
//! - [`resolver`]: role resolution from environment, path and flags
//! - [`records`]: the typed agent-record facade over the ledger
//! - [`hook`]: charge and unsling
//! - [`done`]: the completion protocol
//! - [`raid`]: cross-ledger raid tracking
//! - [`raiders`] / [`crew`]: worker management
//! - [`install`]: encampment and warband setup
//! - [`callback`]: tmux hook targets

pub mod callback;
pub mod context;
pub mod crew;
pub mod done;
pub mod error;
pub mod hook;
pub mod install;
pub mod namepool;
pub mod raid;
pub mod raiders;
pub mod records;
pub mod resolver;

#[cfg(any(test, feature = "testing"))]
pub mod testkit;

pub use context::HordeContext;
pub use error::{ErrorKind, HordeError, Result};
