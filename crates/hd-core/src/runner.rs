use std::path::Path;

// ---------------------------------------------------------------------------
// CommandRunner trait (for testability)
// ---------------------------------------------------------------------------

/// Abstraction over collaborator subprocesses (`git`, `tmux`, `rl`) so they
/// can be scripted in tests.
pub trait CommandRunner: Send + Sync {
    /// Run `program args...` in `dir` and capture its output.
    ///
    /// `Err` means the process could not be started at all; a non-zero exit
    /// is reported through [`CommandOutput::success`].
    fn run(&self, program: &str, dir: &Path, args: &[&str]) -> Result<CommandOutput, String>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn fail(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Stderr if present, otherwise stdout; trimmed. Used in error messages.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Real runner that shells out.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, dir: &Path, args: &[&str]) -> Result<CommandOutput, String> {
        tracing::trace!(program, dir = %dir.display(), ?args, "exec");
        let mut cmd = std::process::Command::new(program);
        cmd.args(args);
        // A deleted working directory must not prevent e.g. `tmux kill-session`.
        if dir.is_dir() {
            cmd.current_dir(dir);
        }
        let output = cmd
            .output()
            .map_err(|e| format!("failed to run {program}: {e}"))?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Scripted runner (tests)
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "testing"))]
pub use scripted::{Invocation, ScriptedRunner};

#[cfg(any(test, feature = "testing"))]
mod scripted {
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use super::{CommandOutput, CommandRunner};

    struct Rule {
        program: String,
        args: Vec<String>,
        output: CommandOutput,
        once: bool,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Invocation {
        pub program: String,
        pub dir: PathBuf,
        pub args: Vec<String>,
    }

    impl Invocation {
        pub fn starts_with(&self, program: &str, args: &[&str]) -> bool {
            self.program == program
                && self.args.len() >= args.len()
                && self.args.iter().zip(args).all(|(a, b)| a == b)
        }
    }

    /// Answers by argument prefix. Later rules shadow earlier ones; anything
    /// unmatched succeeds with empty output. Every call is recorded.
    #[derive(Default)]
    pub struct ScriptedRunner {
        rules: Mutex<Vec<Rule>>,
        calls: Mutex<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(&self, program: &str, args: &[&str], output: CommandOutput) -> &Self {
            self.push(program, args, output, false)
        }

        /// Like [`ScriptedRunner::on`] but consumed by the first match.
        pub fn once(&self, program: &str, args: &[&str], output: CommandOutput) -> &Self {
            self.push(program, args, output, true)
        }

        fn push(&self, program: &str, args: &[&str], output: CommandOutput, once: bool) -> &Self {
            self.rules.lock().unwrap_or_else(|p| p.into_inner()).push(Rule {
                program: program.to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
                output,
                once,
            });
            self
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
        }

        pub fn called(&self, program: &str, args: &[&str]) -> bool {
            self.calls().iter().any(|c| c.starts_with(program, args))
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, program: &str, dir: &Path, args: &[&str]) -> Result<CommandOutput, String> {
            let call = Invocation {
                program: program.to_string(),
                dir: dir.to_path_buf(),
                args: args.iter().map(|a| a.to_string()).collect(),
            };
            let mut rules = self.rules.lock().unwrap_or_else(|p| p.into_inner());
            let hit = rules.iter().rposition(|r| {
                call.starts_with(&r.program, &r.args.iter().map(String::as_str).collect::<Vec<_>>())
            });
            let output = match hit {
                Some(idx) if rules[idx].once => rules.remove(idx).output,
                Some(idx) => rules[idx].output.clone(),
                None => CommandOutput::ok(""),
            };
            drop(rules);
            self.calls.lock().unwrap_or_else(|p| p.into_inner()).push(call);
            Ok(output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_runner_captures_output() {
        let out = SystemRunner
            .run("sh", Path::new("/"), &["-c", "echo hi; echo oops >&2; exit 3"])
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "hi");
        assert_eq!(out.diagnostic(), "oops");
    }

    #[test]
    fn missing_directory_does_not_block_execution() {
        let out = SystemRunner
            .run("sh", Path::new("/definitely/not/here"), &["-c", "true"])
            .unwrap();
        assert!(out.success);
    }

    #[test]
    fn scripted_runner_matches_latest_rule() {
        let r = ScriptedRunner::new();
        r.on("git", &["status"], CommandOutput::ok("old"));
        r.on("git", &["status", "--porcelain"], CommandOutput::ok(" M a.rs"));
        r.once("git", &["push"], CommandOutput::fail("rejected"));
        let dir = Path::new("/");
        assert_eq!(r.run("git", dir, &["status", "--porcelain"]).unwrap().stdout, " M a.rs");
        assert_eq!(r.run("git", dir, &["status", "-s"]).unwrap().stdout, "old");
        assert!(!r.run("git", dir, &["push", "origin"]).unwrap().success);
        assert!(r.run("git", dir, &["push", "origin"]).unwrap().success);
        assert!(r.called("git", &["push"]));
        assert_eq!(r.calls().len(), 4);
    }

    #[test]
    fn missing_binary_is_an_error() {
        assert!(SystemRunner
            .run("no-such-binary-hd", Path::new("/"), &[])
            .is_err());
    }
}
