//! Everything a verb needs, resolved once at process start.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hd_core::config::HordeConfig;
use hd_core::drums::{Drums, Message};
use hd_core::events::{EventKind, EventLog};
use hd_core::git::Git;
use hd_core::ledger::{LedgerError, Ledgers};
use hd_core::runner::{CommandRunner, SystemRunner};
use hd_core::types::Role;
use hd_core::version;
use hd_core::workspace::Workspace;
use hd_core::worktree::WorktreeManager;
use hd_session::beacon::Beacon;
use hd_session::bridge::{SessionBridge, StartOutcome, StartRequest};
use hd_session::mux::{Multiplexer, Tmux};
use hd_session::naming;

use crate::error::{HordeError, Result};
use crate::records::RecordStore;
use crate::resolver::{self, Overrides, RoleInfo};

/// A snapshot of the process environment. Empty values count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    vars: BTreeMap<String, String>,
}

impl Env {
    pub fn from_process() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }
}

pub struct HordeContext {
    pub ws: Workspace,
    pub config: HordeConfig,
    pub ledgers: Arc<Ledgers>,
    pub runner: Arc<dyn CommandRunner>,
    pub sessions: SessionBridge,
    pub events: EventLog,
    pub drums: Drums,
    pub env: Env,
    pub cwd: PathBuf,
}

impl HordeContext {
    /// Production context: discover the encampment from `cwd` (or
    /// `HD_WORKSPACE_ROOT`) and wire real collaborators.
    pub fn open(cwd: &Path, env: Env) -> Result<Self> {
        let root = resolver::locate_root(cwd, &env)?;
        let ws = Workspace::load(&root)?;
        let config = HordeConfig::load(Some(&root))?;
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        let ledgers = Ledgers::rl(
            &root,
            &config.ledger.binary,
            Arc::clone(&runner),
            config.ledger.parallelism,
        )?;
        let mux: Arc<dyn Multiplexer> = Arc::new(Tmux::new(Arc::clone(&runner)));
        Ok(Self::from_parts(
            ws,
            config,
            Arc::new(ledgers),
            runner,
            mux,
            env,
            cwd.to_path_buf(),
        ))
    }

    /// Assemble a context from explicit collaborators.
    pub fn from_parts(
        ws: Workspace,
        config: HordeConfig,
        ledgers: Arc<Ledgers>,
        runner: Arc<dyn CommandRunner>,
        mux: Arc<dyn Multiplexer>,
        env: Env,
        cwd: PathBuf,
    ) -> Self {
        let sessions = SessionBridge::new(mux, config.runtime.clone(), config.session.clone());
        let events = EventLog::new(ws.event_log_path());
        let drums = Drums::new(ws.drums_dir());
        Self {
            ws,
            config,
            ledgers,
            runner,
            sessions,
            events,
            drums,
            env,
            cwd,
        }
    }

    pub fn root(&self) -> &Path {
        &self.ws.root
    }

    pub fn git(&self) -> Git {
        Git::new(Arc::clone(&self.runner))
    }

    pub fn worktrees(&self) -> WorktreeManager {
        WorktreeManager::new(self.git())
    }

    pub fn records(&self) -> RecordStore<'_> {
        RecordStore::new(&self.ws, &self.ledgers)
    }

    /// Who is running this command.
    pub fn whoami(&self, overrides: &Overrides) -> Result<RoleInfo> {
        Ok(resolver::resolve(&self.ws, &self.cwd, &self.env, overrides)?)
    }

    /// Identity to stamp on events and messages: the resolved role when
    /// there is one, otherwise `HD_ACTOR`, otherwise `human`.
    pub fn actor(&self) -> String {
        match self.whoami(&Overrides::default()) {
            Ok(info) => info.role.identity(),
            Err(_) => self.env.get("HD_ACTOR").unwrap_or("human").to_string(),
        }
    }

    pub fn session_name(&self, role: &Role) -> Result<String> {
        Ok(naming::session_name(&self.ws, role)?)
    }

    /// Whether the role's session exists with the runtime in its pane.
    pub fn is_running(&self, role: &Role) -> Result<bool> {
        let name = self.session_name(role)?;
        Ok(self.sessions.is_agent_running(&name)?)
    }

    /// Bring up the role's session in its home directory.
    pub async fn start_agent(
        &self,
        role: &Role,
        topic: &str,
        hook: Option<&str>,
    ) -> Result<(String, StartOutcome)> {
        let session = self.session_name(role)?;
        let mut beacon = Beacon::new(role.identity(), topic);
        if let Some(hook) = hook {
            beacon = beacon.with_hook(hook);
        }
        let req = StartRequest {
            session: session.clone(),
            role: role.clone(),
            workdir: self.ws.role_home(role),
            workspace_root: self.ws.root.clone(),
            beacon,
            extra_env: Vec::new(),
        };
        let outcome = self.sessions.start(&req).await?;
        Ok((session, outcome))
    }

    pub fn emit(&self, kind: EventKind, actor: &str, detail: &str) {
        self.events.emit(kind, actor, detail);
    }

    /// Best-effort drum; failures are logged.
    pub fn notify(&self, to: &str, from: &str, subject: &str, body: &str) -> bool {
        let msg = Message::new(to, from, subject, body);
        match self.drums.send(&msg) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(to, subject, error = %e, "failed to send drum");
                false
            }
        }
    }

    /// Refuse to run against an `rl` without custom-type support.
    pub async fn check_ledger_version(&self) -> Result<()> {
        let cfg = &self.config.ledger;
        let required = cfg.min_version()?;
        let found = version::detect(&cfg.binary, Duration::from_secs(cfg.version_timeout_secs))
            .await
            .map_err(|e| HordeError::collaborator(cfg.binary.clone(), e))?;
        if found < required {
            return Err(LedgerError::UnsupportedVersion {
                found: found.to_string(),
                required: required.to_string(),
            }
            .into());
        }
        tracing::debug!(%found, %required, "ledger version ok");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_env_values_are_unset() {
        let env = Env::from_pairs([("HD_ROLE", " "), ("HD_WARBAND", "horde")]);
        assert_eq!(env.get("HD_ROLE"), None);
        assert_eq!(env.get("HD_WARBAND"), Some("horde"));
        assert_eq!(env.get("HD_RAIDER"), None);
    }
}
