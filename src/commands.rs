//! Shell-out probe capability, per §9: `which`, `systemctl`, `pgrep`,
//! `spctl`, `csrutil`, `fdesetup`, `defaults read` and similar external
//! commands are invoked only through this trait, never via string-built
//! shell commands, so argv is always passed as a slice.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn command_exists(&self, name: &str) -> bool;
    async fn command_output(&self, argv: &[&str]) -> CommandOutput;
}

/// Runs real subprocesses via `tokio::process`. `command_exists` shells
/// out to `which` (or `where` on Windows) rather than touching `PATH`
/// directly, matching how the reference agent resolves binaries.
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn command_exists(&self, name: &str) -> bool {
        let finder = if cfg!(target_os = "windows") { "where" } else { "which" };
        self.command_output(&[finder, name]).await.exit_code == 0
    }

    async fn command_output(&self, argv: &[&str]) -> CommandOutput {
        if argv.is_empty() {
            return CommandOutput { exit_code: -1, stdout: String::new() };
        }
        let output = Command::new(argv[0])
            .args(&argv[1..])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await;

        match output {
            Ok(out) => CommandOutput {
                exit_code: out.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            },
            Err(_) => CommandOutput { exit_code: -1, stdout: String::new() },
        }
    }
}

/// Scripted test double: responses keyed by the exact argv joined with a
/// single space. Unscripted commands report "not found" / empty output
/// rather than panicking, so tests can probe only what they care about.
#[cfg(any(test, feature = "test-support"))]
pub struct ScriptedCommandRunner {
    responses: std::collections::HashMap<String, CommandOutput>,
    existing: std::collections::HashSet<String>,
}

#[cfg(any(test, feature = "test-support"))]
impl ScriptedCommandRunner {
    pub fn new() -> Self {
        Self {
            responses: std::collections::HashMap::new(),
            existing: std::collections::HashSet::new(),
        }
    }

    pub fn with_command(mut self, argv: &[&str], exit_code: i32, stdout: &str) -> Self {
        self.responses.insert(argv.join(" "), CommandOutput { exit_code, stdout: stdout.to_string() });
        self
    }

    pub fn with_existing(mut self, name: &str) -> Self {
        self.existing.insert(name.to_string());
        self
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn command_exists(&self, name: &str) -> bool {
        self.existing.contains(name)
    }

    async fn command_output(&self, argv: &[&str]) -> CommandOutput {
        self.responses
            .get(&argv.join(" "))
            .cloned()
            .unwrap_or(CommandOutput { exit_code: 1, stdout: String::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_runner_replays_exact_argv() {
        let runner = ScriptedCommandRunner::new()
            .with_command(&["systemctl", "is-active", "clamav"], 0, "active\n")
            .with_existing("systemctl");

        assert!(runner.command_exists("systemctl").await);
        let out = runner.command_output(&["systemctl", "is-active", "clamav"]).await;
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, "active\n");
    }

    #[tokio::test]
    async fn unscripted_command_is_reported_not_found() {
        let runner = ScriptedCommandRunner::new();
        let out = runner.command_output(&["nonexistent"]).await;
        assert_ne!(out.exit_code, 0);
    }
}
