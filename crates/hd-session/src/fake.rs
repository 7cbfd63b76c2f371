//! In-memory [`Multiplexer`] for tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::mux::{Multiplexer, Result, SessionError};

#[derive(Debug, Clone)]
pub struct FakeSession {
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    pub pane_command: String,
    /// Every command passed to `respawn_pane`, oldest first.
    pub respawned: Vec<String>,
    /// Every `send_keys` payload; Enter is recorded as `"<Enter>"`.
    pub keys: Vec<String>,
    pub options: BTreeMap<String, String>,
    pub hooks: BTreeMap<String, String>,
    pub activity: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    sessions: BTreeMap<String, FakeSession>,
    killed: Vec<String>,
    attached: Vec<String>,
}

/// Records every call and simulates a pane whose process becomes the
/// runtime after `respawn_pane`.
pub struct FakeMultiplexer {
    state: Mutex<State>,
    runtime: String,
    fail_new_session: Mutex<bool>,
}

impl Default for FakeMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMultiplexer {
    pub fn new() -> Self {
        Self::with_runtime("claude")
    }

    /// Pane command reported after a respawn.
    pub fn with_runtime(runtime: &str) -> Self {
        Self {
            state: Mutex::new(State::default()),
            runtime: runtime.to_string(),
            fail_new_session: Mutex::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn with_session<T>(&self, name: &str, f: impl FnOnce(&mut FakeSession) -> T) -> Result<T> {
        let mut state = self.state();
        let s = state
            .sessions
            .get_mut(name)
            .ok_or_else(|| SessionError::NotFound(name.to_string()))?;
        Ok(f(s))
    }

    /// Add a live session whose pane already runs `command`.
    pub fn insert(&self, name: &str, cwd: &Path, command: &str) {
        self.state().sessions.insert(
            name.to_string(),
            FakeSession {
                cwd: cwd.to_path_buf(),
                env: BTreeMap::new(),
                pane_command: command.to_string(),
                respawned: Vec::new(),
                keys: Vec::new(),
                options: BTreeMap::new(),
                hooks: BTreeMap::new(),
                activity: Utc::now(),
            },
        );
    }

    /// Simulate the runtime exiting back to a shell.
    pub fn set_pane_command(&self, name: &str, command: &str) {
        let _ = self.with_session(name, |s| s.pane_command = command.to_string());
    }

    pub fn set_activity(&self, name: &str, at: DateTime<Utc>) {
        let _ = self.with_session(name, |s| s.activity = at);
    }

    pub fn fail_new_sessions(&self, fail: bool) {
        *self.fail_new_session.lock().unwrap_or_else(|p| p.into_inner()) = fail;
    }

    pub fn session(&self, name: &str) -> Option<FakeSession> {
        self.state().sessions.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.state().sessions.keys().cloned().collect()
    }

    pub fn killed(&self) -> Vec<String> {
        self.state().killed.clone()
    }

    pub fn attached(&self) -> Vec<String> {
        self.state().attached.clone()
    }
}

impl Multiplexer for FakeMultiplexer {
    fn list_sessions(&self) -> Result<Vec<String>> {
        Ok(self.names())
    }

    fn has_session(&self, name: &str) -> Result<bool> {
        Ok(self.state().sessions.contains_key(name))
    }

    fn new_session(&self, name: &str, cwd: &Path) -> Result<()> {
        if *self.fail_new_session.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(SessionError::Command {
                op: "new-session".into(),
                stderr: "server exited unexpectedly".into(),
            });
        }
        if self.state().sessions.contains_key(name) {
            return Err(SessionError::AlreadyExists(name.to_string()));
        }
        self.insert(name, cwd, "bash");
        Ok(())
    }

    fn set_environment(&self, name: &str, key: &str, value: &str) -> Result<()> {
        self.with_session(name, |s| {
            s.env.insert(key.to_string(), value.to_string());
        })
    }

    fn respawn_pane(&self, name: &str, command: &str) -> Result<()> {
        let runtime = self.runtime.clone();
        self.with_session(name, |s| {
            s.respawned.push(command.to_string());
            s.pane_command = runtime;
            s.activity = Utc::now();
        })
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        if state.sessions.remove(name).is_none() {
            return Err(SessionError::NotFound(name.to_string()));
        }
        state.killed.push(name.to_string());
        Ok(())
    }

    fn capture_pane(&self, name: &str, lines: usize) -> Result<String> {
        self.with_session(name, |s| {
            let start = s.keys.len().saturating_sub(lines);
            s.keys[start..].join("\n")
        })
    }

    fn pane_command(&self, name: &str) -> Result<String> {
        self.with_session(name, |s| s.pane_command.clone())
    }

    fn pane_workdir(&self, name: &str) -> Result<PathBuf> {
        self.with_session(name, |s| s.cwd.clone())
    }

    fn send_keys(&self, name: &str, text: &str, enter: bool) -> Result<()> {
        self.with_session(name, |s| {
            s.keys.push(text.to_string());
            if enter {
                s.keys.push("<Enter>".to_string());
            }
            s.activity = Utc::now();
        })
    }

    fn set_option(&self, name: &str, option: &str, value: &str) -> Result<()> {
        self.with_session(name, |s| {
            s.options.insert(option.to_string(), value.to_string());
        })
    }

    fn set_hook(&self, name: &str, hook: &str, command: &str) -> Result<()> {
        self.with_session(name, |s| {
            s.hooks.insert(hook.to_string(), command.to_string());
        })
    }

    fn session_activity(&self, name: &str) -> Result<DateTime<Utc>> {
        self.with_session(name, |s| s.activity)
    }

    fn attach(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        if !state.sessions.contains_key(name) {
            return Err(SessionError::NotFound(name.to_string()));
        }
        state.attached.push(name.to_string());
        Ok(())
    }
}
