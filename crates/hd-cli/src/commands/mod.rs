pub mod callback;
pub mod checkpoint;
pub mod crew;
pub mod drums;
pub mod install;
pub mod log;
pub mod raid;
pub mod raider;
pub mod role;
pub mod work;

use std::path::PathBuf;

use hd_agents::context::Env;
use hd_agents::HordeContext;
use hd_core::config::HordeConfig;
use hd_session::bridge::StartOutcome;

/// What every verb starts from: where it was run and with which environment.
pub struct Invocation {
    pub cwd: PathBuf,
    pub env: Env,
    pub config: HordeConfig,
}

impl Invocation {
    /// Open the encampment around the working directory.
    pub fn context(&self) -> anyhow::Result<HordeContext> {
        Ok(HordeContext::open(&self.cwd, self.env.clone())?)
    }

    /// Like [`Invocation::context`], for verbs that write to the ledger.
    pub async fn ledger_context(&self) -> anyhow::Result<HordeContext> {
        let ctx = self.context()?;
        ctx.check_ledger_version().await?;
        Ok(ctx)
    }
}

/// Render a duration as its largest whole unit: `45s`, `12m`, `3h`, `2d`.
pub fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}

pub fn describe_start(outcome: &StartOutcome) -> String {
    match outcome {
        StartOutcome::Created => "session started".to_string(),
        StartOutcome::Restarted => "runtime respawned".to_string(),
        StartOutcome::AlreadyRunning => "already running".to_string(),
        StartOutcome::Reused(name) => format!("reusing session {name}"),
    }
}

pub fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
