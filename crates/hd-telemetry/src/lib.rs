//! Logging and operation spans for the `hd` CLI.
//!
//! - **Logging**: human-readable or JSON output on stderr via `tracing-subscriber`
//! - **Tracing**: trace/span id generation and per-verb operation spans

pub mod logging;
pub mod tracing_setup;
