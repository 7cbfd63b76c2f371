use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use hd_core::config::{RuntimeConfig, SessionConfig};
use hd_core::events::EventKind;
use hd_core::types::Role;

use crate::beacon::{Beacon, TOPIC_RESTART};
use crate::mux::{Multiplexer, Result, SessionError};
use crate::theme;

/// Pane commands that mean "a bare shell is waiting for input".
pub const SHELLS: &[&str] = &["bash", "zsh", "sh", "fish", "dash"];

/// Environment variable the runtime reads for its config directory.
pub const RUNTIME_CONFIG_DIR_ENV: &str = "CLAUDE_CONFIG_DIR";

/// Environment exported into every agent session.
pub fn startup_env(role: &Role, workspace_root: &Path, runtime: &RuntimeConfig) -> Vec<(String, String)> {
    let mut env = vec![("HD_ROLE".to_string(), role.kind().as_str().to_string())];
    if let Some(rig) = role.rig() {
        env.push(("HD_WARBAND".into(), rig.to_string()));
    }
    match role {
        Role::Raider { name, .. } => env.push(("HD_RAIDER".into(), name.clone())),
        Role::Crew { name, .. } => {
            env.push(("HD_CLAN".into(), name.clone()));
            env.push(("HD_CREW".into(), name.clone()));
        }
        _ => {}
    }
    env.push(("HD_ACTOR".into(), role.identity()));
    env.push((
        "HD_WORKSPACE_ROOT".into(),
        workspace_root.to_string_lossy().to_string(),
    ));
    if let Some(dir) = &runtime.config_dir {
        env.push((RUNTIME_CONFIG_DIR_ENV.into(), dir.clone()));
    }
    env
}

/// Map a pane exit status to the lifecycle event it represents.
pub fn event_for_exit(code: i32) -> EventKind {
    match code {
        0 => EventKind::Done,
        130 => EventKind::Kill,
        _ => EventKind::Crash,
    }
}

/// POSIX single-quote escaping.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[derive(Debug, Clone)]
pub struct StartRequest {
    pub session: String,
    pub role: Role,
    pub workdir: PathBuf,
    pub workspace_root: PathBuf,
    pub beacon: Beacon,
    /// Extra environment on top of [`startup_env`] (e.g. `HD_BRANCH`).
    pub extra_env: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Created,
    /// The session existed but the runtime had exited; the pane was respawned.
    Restarted,
    AlreadyRunning,
    /// A compatible session already runs in the work directory.
    Reused(String),
}

/// The controller's contract with the multiplexer.
pub struct SessionBridge {
    mux: Arc<dyn Multiplexer>,
    runtime: RuntimeConfig,
    session: SessionConfig,
    callback_binary: String,
}

impl SessionBridge {
    pub fn new(mux: Arc<dyn Multiplexer>, runtime: RuntimeConfig, session: SessionConfig) -> Self {
        Self {
            mux,
            runtime,
            session,
            callback_binary: "hd".into(),
        }
    }

    /// Binary the pane-died hook invokes.
    pub fn with_callback_binary(mut self, binary: impl Into<String>) -> Self {
        self.callback_binary = binary.into();
        self
    }

    pub fn mux(&self) -> &Arc<dyn Multiplexer> {
        &self.mux
    }

    pub fn has_session(&self, name: &str) -> Result<bool> {
        self.mux.has_session(name)
    }

    /// `exec <runtime> <args> '<beacon>'`
    pub fn startup_command(&self, beacon: &Beacon) -> String {
        let mut parts = vec!["exec".to_string(), shell_quote(&self.runtime.command)];
        parts.extend(self.runtime.args.iter().map(|a| shell_quote(a)));
        parts.push(shell_quote(&beacon.to_string()));
        parts.join(" ")
    }

    fn is_runtime_command(&self, command: &str) -> bool {
        let base = command.rsplit('/').next().unwrap_or(command).trim();
        let runtime_base = self.runtime.command.rsplit('/').next().unwrap_or_default();
        base == runtime_base || self.runtime.pane_commands.iter().any(|c| c == base)
    }

    /// True when the session exists and its pane runs the runtime.
    pub fn is_agent_running(&self, name: &str) -> Result<bool> {
        if !self.mux.has_session(name)? {
            return Ok(false);
        }
        match self.mux.pane_command(name) {
            Ok(cmd) => Ok(self.is_runtime_command(&cmd)),
            Err(SessionError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Sessions whose pane sits in `workdir` and runs the runtime.
    pub fn find_by_workdir(&self, workdir: &Path) -> Result<Vec<String>> {
        let mut found = Vec::new();
        for name in self.mux.list_sessions()? {
            let Ok(dir) = self.mux.pane_workdir(&name) else {
                continue;
            };
            if dir == workdir && self.is_agent_running(&name)? {
                found.push(name);
            }
        }
        Ok(found)
    }

    /// Poll until the pane shows a shell prompt.
    pub async fn wait_shell_ready(&self, name: &str) -> Result<()> {
        let timeout = self.session.shell_ready_timeout_ms;
        let interval = Duration::from_millis(self.session.poll_interval_ms.max(1));
        let mut waited = 0;
        loop {
            let cmd = self.mux.pane_command(name)?;
            if SHELLS.contains(&cmd.trim()) {
                return Ok(());
            }
            if waited >= timeout {
                return Err(SessionError::Timeout {
                    name: name.to_string(),
                    waited_ms: waited,
                });
            }
            tokio::time::sleep(interval).await;
            waited += interval.as_millis() as u64;
        }
    }

    /// Bring the agent's session up, reusing or restarting where possible.
    pub async fn start(&self, req: &StartRequest) -> Result<StartOutcome> {
        let name = req.session.as_str();
        if self.mux.has_session(name)? {
            if self.is_agent_running(name)? {
                debug!(session = name, "runtime already running");
                return Ok(StartOutcome::AlreadyRunning);
            }
            self.restart(name, &req.beacon)?;
            return Ok(StartOutcome::Restarted);
        }

        if let Some(other) = self.find_by_workdir(&req.workdir)?.into_iter().next() {
            info!(session = %other, workdir = %req.workdir.display(), "reusing session in workdir");
            return Ok(StartOutcome::Reused(other));
        }

        self.mux.new_session(name, &req.workdir)?;
        if let Err(e) = self.wait_shell_ready(name).await {
            // A pane that never shows a shell is unusable.
            let _ = self.mux.kill_session(name);
            return Err(e);
        }

        let env = startup_env(&req.role, &req.workspace_root, &self.runtime);
        for (key, value) in env.iter().chain(req.extra_env.iter()) {
            self.mux.set_environment(name, key, value)?;
        }

        let theme = theme::for_role(&req.role, &self.session.theme);
        if let Err(e) = self.apply_theme(name, &req.role, &theme) {
            warn!(session = name, error = %e, "failed to apply theme");
        }

        self.install_exit_hook(name)?;
        self.mux
            .respawn_pane(name, &self.startup_command(&req.beacon))?;
        info!(session = name, role = %req.role, topic = %req.beacon.topic, "session started");
        Ok(StartOutcome::Created)
    }

    fn apply_theme(&self, name: &str, role: &Role, theme: &theme::Theme) -> Result<()> {
        self.mux.set_option(name, "status-style", &theme.status_style())?;
        self.mux.set_option(name, "status-left", &theme::status_left(role))?;
        self.mux.set_option(name, "status-left-length", "60")
    }

    /// Keep dead panes around and call back with the exit status.
    fn install_exit_hook(&self, name: &str) -> Result<()> {
        self.mux.set_option(name, "remain-on-exit", "on")?;
        let callback = format!(
            "run-shell \"{} callback pane-died {} #{{pane_dead_status}}\"",
            self.callback_binary, name
        );
        self.mux.set_hook(name, "pane-died", &callback)
    }

    /// Respawn the runtime in an existing session with topic `restart`.
    pub fn restart(&self, name: &str, beacon: &Beacon) -> Result<()> {
        let beacon = beacon.retopic(TOPIC_RESTART);
        self.mux.respawn_pane(name, &self.startup_command(&beacon))?;
        info!(session = name, "runtime respawned");
        Ok(())
    }

    /// Respawn with an arbitrary beacon (e.g. topic `refresh`).
    pub fn respawn(&self, name: &str, beacon: &Beacon) -> Result<()> {
        self.mux.respawn_pane(name, &self.startup_command(beacon))
    }

    /// Kill a session; returns whether it existed.
    pub fn kill(&self, name: &str) -> Result<bool> {
        match self.mux.kill_session(name) {
            Ok(()) => Ok(true),
            Err(SessionError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Type a prompt into the runtime and submit it.
    pub fn inject_prompt(&self, name: &str, text: &str) -> Result<()> {
        let flat = text.lines().collect::<Vec<_>>().join(" ");
        self.mux.send_keys(name, &flat, true)
    }

    pub fn session_activity(&self, name: &str) -> Result<DateTime<Utc>> {
        self.mux.session_activity(name)
    }

    pub fn capture(&self, name: &str, lines: usize) -> Result<String> {
        self.mux.capture_pane(name, lines)
    }

    pub fn attach(&self, name: &str) -> Result<()> {
        if !self.mux.has_session(name)? {
            return Err(SessionError::NotFound(name.to_string()));
        }
        self.mux.attach(name)
    }
}
