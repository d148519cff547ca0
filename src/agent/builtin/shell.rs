//! Local shell tool, guarded by the command denylist.
//!
//! Disabled unless `agent.shell_enabled` is set. Commands go through
//! [`safety::denied_pattern`] before they reach a [`CommandRunner`]; a match
//! is refused with [`SHELL_REFUSAL`] without running anything.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::agent::safety::{self, SHELL_REFUSAL};
use crate::agent::tools::{Tool, ToolKind};
use crate::error::{LanternError, Result};

const MAX_STDOUT_BYTES: usize = 10_000;
const MAX_STDERR_BYTES: usize = 5_000;

/// Environment variables never passed to spawned commands.
const SECRET_ENV_VARS: &[&str] = &[
    "GITHUB_TOKEN",
    "GH_TOKEN",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "HF_TOKEN",
];

const SECRET_KEY_PATTERNS: &[&str] = &[
    "api_key",
    "apikey",
    "api-key",
    "secret",
    "password",
    "passwd",
    "token",
    "access_key",
    "private_key",
    "bearer",
    "credential",
];

const TOKEN_PREFIXES: &[&str] = &[
    "ghp_", "gho_", "ghs_", "sk-", "xoxb-", "xoxp-", "sk_live_", "pk_live_",
];

/// Raw result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Something that can execute a shell command line.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<CommandOutput>;
}

/// Runs commands with `sh -c` in the user's home directory.
pub struct SystemShell {
    timeout: Duration,
}

impl SystemShell {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemShell {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command).kill_on_drop(true);
        if let Some(home) = dirs::home_dir() {
            cmd.current_dir(home);
        }
        for var in SECRET_ENV_VARS {
            cmd.env_remove(var);
        }

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                LanternError::Tool(format!(
                    "Command timed out after {} seconds: {}",
                    self.timeout.as_secs(),
                    preview(command, 100)
                ))
            })?
            .map_err(|e| LanternError::Tool(format!("Failed to execute command: {}", e)))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

pub struct ShellTool {
    runner: Arc<dyn CommandRunner>,
    budget: usize,
}

impl ShellTool {
    pub fn new(runner: Arc<dyn CommandRunner>, budget: usize) -> Self {
        Self { runner, budget }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a read-only shell command on the local machine and return its output. \
         Input must be a single command line. Destructive commands are refused."
    }

    fn budget(&self) -> usize {
        self.budget
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Shell
    }

    async fn invoke(&self, input: &str) -> Result<String> {
        let command = input.trim().trim_matches('`').trim();
        if command.is_empty() {
            return Err(LanternError::Tool("Empty command".into()));
        }
        if command.contains('\0') {
            return Err(LanternError::Tool("Command contains invalid null bytes".into()));
        }
        if let Some(pattern) = safety::denied_pattern(command) {
            tracing::warn!("Refused shell command (matched {:?}): {}", pattern, preview(command, 100));
            return Err(LanternError::Refused(SHELL_REFUSAL.to_string()));
        }

        let output = self.runner.run(command).await?;
        Ok(format_output(&output))
    }
}

fn format_output(output: &CommandOutput) -> String {
    let mut result = String::new();
    if !output.stdout.is_empty() {
        result.push_str("stdout:\n");
        result.push_str(&redact_secrets(&truncate_bytes(&output.stdout, MAX_STDOUT_BYTES)));
    }
    if !output.stderr.is_empty() {
        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str("stderr:\n");
        result.push_str(&redact_secrets(&truncate_bytes(&output.stderr, MAX_STDERR_BYTES)));
    }
    if result.is_empty() {
        result = format!("Command completed with exit code: {:?}", output.exit_code);
    }
    result
}

fn truncate_bytes(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let safe_end = (0..=max)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0);
    format!("{}...\n[Truncated: {} bytes total]", &text[..safe_end], text.len())
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Redact likely secrets from command output before the model sees it.
///
/// Handles `KEY=value` pairs whose key names a secret and bare tokens with
/// well-known provider prefixes.
pub fn redact_secrets(text: &str) -> String {
    text.split_inclusive(char::is_whitespace)
        .map(|piece| {
            let word = piece.trim_end();
            let trailing = &piece[word.len()..];
            format!("{}{}", redact_word(word), trailing)
        })
        .collect()
}

fn redact_word(word: &str) -> String {
    if let Some((key, _)) = word.split_once('=') {
        let key_lower = key.to_lowercase();
        if SECRET_KEY_PATTERNS.iter().any(|p| key_lower.contains(p)) {
            return format!("{}=[REDACTED]", key);
        }
    }
    for prefix in TOKEN_PREFIXES {
        if let Some(pos) = word.find(prefix) {
            let end = word[pos..]
                .find(|c: char| c == '"' || c == '\'')
                .map(|e| pos + e)
                .unwrap_or(word.len());
            if end > pos + prefix.len() {
                return format!("{}[REDACTED]{}", &word[..pos], &word[end..]);
            }
        }
    }
    word.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records commands instead of running them.
    #[derive(Default)]
    struct RecordingRunner {
        commands: Mutex<Vec<String>>,
        output: CommandOutput,
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, command: &str) -> Result<CommandOutput> {
            self.commands.lock().unwrap().push(command.to_string());
            Ok(self.output.clone())
        }
    }

    fn tool_with(output: CommandOutput) -> (ShellTool, Arc<RecordingRunner>) {
        let runner = Arc::new(RecordingRunner {
            commands: Mutex::new(Vec::new()),
            output,
        });
        (ShellTool::new(runner.clone(), 2), runner)
    }

    #[tokio::test]
    async fn test_denied_command_never_reaches_runner() {
        let (tool, runner) = tool_with(CommandOutput::default());
        for cmd in ["rm -rf /", "sudo reboot", "echo x > /etc/passwd", ":(){ :|:& };:"] {
            match tool.invoke(cmd).await {
                Err(LanternError::Refused(msg)) => assert_eq!(msg, SHELL_REFUSAL),
                other => panic!("expected refusal for {:?}, got {:?}", cmd, other),
            }
        }
        assert!(runner.commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_allowed_command_runs() {
        let (tool, runner) = tool_with(CommandOutput {
            stdout: "Cargo.toml\nsrc\n".into(),
            stderr: String::new(),
            exit_code: Some(0),
        });
        let out = tool.invoke("`ls`").await.unwrap();
        assert_eq!(out, "stdout:\nCargo.toml\nsrc\n");
        assert_eq!(*runner.commands.lock().unwrap(), vec!["ls".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_output_reports_exit_code() {
        let (tool, _) = tool_with(CommandOutput {
            exit_code: Some(1),
            ..Default::default()
        });
        assert_eq!(
            tool.invoke("false").await.unwrap(),
            "Command completed with exit code: Some(1)"
        );
    }

    #[tokio::test]
    async fn test_rejects_empty_and_null_bytes() {
        let (tool, runner) = tool_with(CommandOutput::default());
        assert!(tool.invoke("  ").await.is_err());
        assert!(tool.invoke("ls\0").await.is_err());
        assert!(runner.commands.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_shell_runs_echo() {
        let shell = SystemShell::new(Duration::from_secs(10));
        let out = shell.run("echo hello").await.unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.exit_code, Some(0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_shell_timeout() {
        let shell = SystemShell::new(Duration::from_millis(100));
        let err = shell.run("sleep 5").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_truncate_bytes() {
        let long = "a".repeat(MAX_STDOUT_BYTES + 10);
        let out = truncate_bytes(&long, MAX_STDOUT_BYTES);
        assert!(out.contains("[Truncated: 10010 bytes total]"));
    }

    #[test]
    fn test_redact_secrets_env_vars() {
        let output = redact_secrets("API_KEY=sk-abc123xyz SECRET=mysecret other=safe");
        assert_eq!(output, "API_KEY=[REDACTED] SECRET=[REDACTED] other=safe");
    }

    #[test]
    fn test_redact_secrets_token_prefixes() {
        let output = redact_secrets("token is ghp_abc123XYZ456 and \"sk-proj-abcdef\"");
        assert!(!output.contains("ghp_abc123"));
        assert!(!output.contains("sk-proj-abcdef"));
        assert_eq!(output.matches("[REDACTED]").count(), 2);
    }

    #[test]
    fn test_redact_secrets_no_false_positives() {
        let input = "Hello world\nThis is a normal output\nFiles: api_docs.txt token_counter.py";
        assert_eq!(redact_secrets(input), input);
    }
}
