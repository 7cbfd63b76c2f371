pub mod checkpoint;
pub mod config;
pub mod drums;
pub mod events;
pub mod git;
pub mod ids;
pub mod ledger;
pub mod routes;
pub mod runner;
pub mod types;
pub mod version;
pub mod watch;
pub mod workspace;
pub mod worktree;

#[cfg(any(test, feature = "testing"))]
pub mod memory;
