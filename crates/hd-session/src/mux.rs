use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use hd_core::runner::CommandRunner;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session already exists: {0}")]
    AlreadyExists(String),

    #[error("tmux {op} failed: {stderr}")]
    Command { op: String, stderr: String },

    #[error("{0}")]
    Spawn(String),

    #[error("session {name} shell not ready after {waited_ms}ms")]
    Timeout { name: String, waited_ms: u64 },

    #[error("unexpected tmux output for {op}: {output:?}")]
    Parse { op: String, output: String },
}

pub type Result<T> = std::result::Result<T, SessionError>;

// ---------------------------------------------------------------------------
// Multiplexer trait
// ---------------------------------------------------------------------------

/// The terminal-multiplexer operations the bridge relies on.
pub trait Multiplexer: Send + Sync {
    fn list_sessions(&self) -> Result<Vec<String>>;
    fn has_session(&self, name: &str) -> Result<bool>;
    /// Create a detached session whose shell starts in `cwd`.
    fn new_session(&self, name: &str, cwd: &Path) -> Result<()>;
    fn set_environment(&self, name: &str, key: &str, value: &str) -> Result<()>;
    /// Replace whatever runs in the session's pane with `command`.
    fn respawn_pane(&self, name: &str, command: &str) -> Result<()>;
    fn kill_session(&self, name: &str) -> Result<()>;
    fn capture_pane(&self, name: &str, lines: usize) -> Result<String>;
    /// Name of the foreground process in the pane.
    fn pane_command(&self, name: &str) -> Result<String>;
    fn pane_workdir(&self, name: &str) -> Result<PathBuf>;
    /// Type `text` into the pane, optionally followed by Enter.
    fn send_keys(&self, name: &str, text: &str, enter: bool) -> Result<()>;
    fn set_option(&self, name: &str, option: &str, value: &str) -> Result<()>;
    fn set_hook(&self, name: &str, hook: &str, command: &str) -> Result<()>;
    fn session_activity(&self, name: &str) -> Result<DateTime<Utc>>;
    /// Attach the operator's terminal (interactive).
    fn attach(&self, name: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Tmux
// ---------------------------------------------------------------------------

/// [`Multiplexer`] backed by the `tmux` binary.
pub struct Tmux {
    runner: Arc<dyn CommandRunner>,
    /// `-L <socket>`; `None` uses the default server.
    socket: Option<String>,
}

impl Tmux {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            socket: None,
        }
    }

    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    fn args<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut all = Vec::with_capacity(args.len() + 2);
        if let Some(s) = &self.socket {
            all.extend(["-L", s.as_str()]);
        }
        all.extend_from_slice(args);
        all
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let full = self.args(args);
        let out = self
            .runner
            .run("tmux", Path::new("/"), &full)
            .map_err(SessionError::Spawn)?;
        if out.success {
            return Ok(out.stdout);
        }
        let stderr = out.diagnostic();
        let op = args.first().copied().unwrap_or_default().to_string();
        if is_missing_session(&stderr) {
            let target = args
                .windows(2)
                .find(|w| w[0] == "-t")
                .map(|w| w[1].trim_start_matches('='))
                .unwrap_or_default();
            return Err(SessionError::NotFound(target.to_string()));
        }
        Err(SessionError::Command { op, stderr })
    }

    fn display(&self, name: &str, format: &str) -> Result<String> {
        let target = exact(name);
        Ok(self
            .run(&["display-message", "-p", "-t", &target, format])?
            .trim()
            .to_string())
    }
}

/// `=name` makes tmux match the session name exactly instead of by prefix.
fn exact(name: &str) -> String {
    format!("={name}")
}

fn is_missing_session(stderr: &str) -> bool {
    let s = stderr.to_ascii_lowercase();
    s.contains("can't find session")
        || s.contains("session not found")
        || s.contains("no server running")
        || s.contains("error connecting to")
}

impl Multiplexer for Tmux {
    fn list_sessions(&self) -> Result<Vec<String>> {
        match self.run(&["list-sessions", "-F", "#{session_name}"]) {
            Ok(out) => Ok(out
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()),
            // No server means no sessions.
            Err(SessionError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn has_session(&self, name: &str) -> Result<bool> {
        let target = exact(name);
        match self.run(&["has-session", "-t", &target]) {
            Ok(_) => Ok(true),
            Err(SessionError::NotFound(_)) => Ok(false),
            Err(SessionError::Command { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn new_session(&self, name: &str, cwd: &Path) -> Result<()> {
        let cwd = cwd.to_string_lossy();
        match self.run(&["new-session", "-d", "-s", name, "-c", &cwd]) {
            Ok(_) => Ok(()),
            Err(SessionError::Command { stderr, .. }) if stderr.contains("duplicate session") => {
                Err(SessionError::AlreadyExists(name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    fn set_environment(&self, name: &str, key: &str, value: &str) -> Result<()> {
        let target = exact(name);
        self.run(&["set-environment", "-t", &target, key, value])
            .map(drop)
    }

    fn respawn_pane(&self, name: &str, command: &str) -> Result<()> {
        let target = exact(name);
        self.run(&["respawn-pane", "-k", "-t", &target, command])
            .map(drop)
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        let target = exact(name);
        self.run(&["kill-session", "-t", &target]).map(drop)
    }

    fn capture_pane(&self, name: &str, lines: usize) -> Result<String> {
        let target = exact(name);
        let start = format!("-{lines}");
        self.run(&["capture-pane", "-p", "-t", &target, "-S", &start])
    }

    fn pane_command(&self, name: &str) -> Result<String> {
        self.display(name, "#{pane_current_command}")
    }

    fn pane_workdir(&self, name: &str) -> Result<PathBuf> {
        self.display(name, "#{pane_current_path}").map(PathBuf::from)
    }

    fn send_keys(&self, name: &str, text: &str, enter: bool) -> Result<()> {
        let target = exact(name);
        // -l sends the text literally; Enter is sent separately so it is
        // interpreted as a key.
        self.run(&["send-keys", "-t", &target, "-l", text])?;
        if enter {
            self.run(&["send-keys", "-t", &target, "Enter"])?;
        }
        Ok(())
    }

    fn set_option(&self, name: &str, option: &str, value: &str) -> Result<()> {
        let target = exact(name);
        self.run(&["set-option", "-t", &target, option, value])
            .map(drop)
    }

    fn set_hook(&self, name: &str, hook: &str, command: &str) -> Result<()> {
        let target = exact(name);
        self.run(&["set-hook", "-t", &target, hook, command])
            .map(drop)
    }

    fn session_activity(&self, name: &str) -> Result<DateTime<Utc>> {
        let raw = self.display(name, "#{session_activity}")?;
        raw.parse::<i64>()
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .ok_or(SessionError::Parse {
                op: "session_activity".into(),
                output: raw,
            })
    }

    fn attach(&self, name: &str) -> Result<()> {
        let target = exact(name);
        // Inside tmux, switch the current client instead of nesting.
        let verb = if std::env::var_os("TMUX").is_some() {
            "switch-client"
        } else {
            "attach-session"
        };
        let status = std::process::Command::new("tmux")
            .args(self.args(&[verb, "-t", &target]))
            .status()
            .map_err(|e| SessionError::Spawn(format!("failed to run tmux: {e}")))?;
        if !status.success() {
            return Err(SessionError::Command {
                op: verb.into(),
                stderr: format!("exit status {status}"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hd_core::runner::{CommandOutput, ScriptedRunner};

    #[test]
    fn missing_server_means_no_sessions() {
        let r = Arc::new(ScriptedRunner::new());
        r.on("tmux", &["list-sessions"], CommandOutput::fail("no server running on /tmp/tmux-0/default"));
        let tmux = Tmux::new(r);
        assert!(tmux.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn has_session_uses_exact_match() {
        let r = Arc::new(ScriptedRunner::new());
        r.on("tmux", &["has-session"], CommandOutput::fail("can't find session: gt-horde-nux"));
        let tmux = Tmux::new(r.clone());
        assert!(!tmux.has_session("gt-horde-nux").unwrap());
        assert!(r.called("tmux", &["has-session", "-t", "=gt-horde-nux"]));
    }

    #[test]
    fn socket_flag_is_prepended() {
        let r = Arc::new(ScriptedRunner::new());
        let tmux = Tmux::new(r.clone()).with_socket("hd-test");
        tmux.kill_session("hq-warchief").unwrap();
        assert!(r.called("tmux", &["-L", "hd-test", "kill-session", "-t", "=hq-warchief"]));
    }

    #[test]
    fn duplicate_session_maps_to_already_exists() {
        let r = Arc::new(ScriptedRunner::new());
        r.on("tmux", &["new-session"], CommandOutput::fail("duplicate session: hq-shaman"));
        let tmux = Tmux::new(r);
        assert!(matches!(
            tmux.new_session("hq-shaman", Path::new("/ws/shaman")),
            Err(SessionError::AlreadyExists(_))
        ));
    }

    #[test]
    fn send_keys_is_literal_then_enter() {
        let r = Arc::new(ScriptedRunner::new());
        let tmux = Tmux::new(r.clone());
        tmux.send_keys("gt-horde-nux", "Work on gt-abc", true).unwrap();
        let calls = r.calls();
        assert_eq!(calls[0].args, vec!["send-keys", "-t", "=gt-horde-nux", "-l", "Work on gt-abc"]);
        assert_eq!(calls[1].args, vec!["send-keys", "-t", "=gt-horde-nux", "Enter"]);
    }

    #[test]
    fn activity_parses_epoch_seconds() {
        let r = Arc::new(ScriptedRunner::new());
        r.on("tmux", &["display-message"], CommandOutput::ok("1767225600\n"));
        let tmux = Tmux::new(r.clone());
        let at = tmux.session_activity("hq-warchief").unwrap();
        assert_eq!(at.timestamp(), 1_767_225_600);

        r.on("tmux", &["display-message"], CommandOutput::ok("soon"));
        assert!(matches!(
            tmux.session_activity("hq-warchief"),
            Err(SessionError::Parse { .. })
        ));
    }

    #[test]
    fn missing_target_reports_not_found() {
        let r = Arc::new(ScriptedRunner::new());
        r.on("tmux", &["display-message"], CommandOutput::fail("can't find session: =gt-horde-zz"));
        let tmux = Tmux::new(r);
        match tmux.pane_command("gt-horde-zz") {
            Err(SessionError::NotFound(name)) => assert_eq!(name, "gt-horde-zz"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
