// crates/core/src/llm/claude_cli.rs
//! Claude CLI classifier — spawns `claude -p` and parses its output.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use super::provider::IntentClassifier;
use super::types::{ClassifiedIntent, LlmError};
use crate::types::{Actor, Intent};

/// Env vars stripped before spawning, to prevent nested-session detection
/// when taskdeck itself runs under a coding agent.
const STRIPPED_VARS: &[&str] = &["CLAUDECODE", "CLAUDE_CODE_SSE_PORT", "CLAUDE_CODE_ENTRYPOINT"];

/// Classifier backed by the `claude` CLI binary.
pub struct ClaudeCliClassifier {
    model: String,
    timeout_secs: u64,
}

impl ClaudeCliClassifier {
    /// Model names: "haiku", "sonnet".
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            timeout_secs: 15,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Run a one-shot prompt through the CLI with the configured timeout.
    async fn run_prompt(&self, prompt: &str) -> Result<String, LlmError> {
        let mut cmd = Command::new("claude");
        cmd.args(["-p", "--output-format", "text", "--model", &self.model, prompt])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        for var in STRIPPED_VARS {
            cmd.env_remove(var);
        }

        let fut = async {
            let output = cmd
                .output()
                .await
                .map_err(|e| LlmError::SpawnFailed(e.to_string()))?;
            if !output.status.success() {
                return Err(LlmError::NonZeroExit(output.status.code().unwrap_or(-1)));
            }
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        };

        tokio::time::timeout(std::time::Duration::from_secs(self.timeout_secs), fut)
            .await
            .map_err(|_| LlmError::Timeout(self.timeout_secs))?
    }
}

#[async_trait]
impl IntentClassifier for ClaudeCliClassifier {
    async fn classify(&self, actor: Actor, text: &str) -> Result<ClassifiedIntent, LlmError> {
        let prompt = format!(
            "Classify the conversational intent of this {} message from a coding \
             session. Reply with exactly one word from: command, answer, question, \
             completion, progress, end_of_task.\n\nMessage:\n{}",
            actor, text
        );
        let raw = self.run_prompt(&prompt).await?;
        let word = raw.split_whitespace().next().unwrap_or("").to_lowercase();
        let intent = Intent::parse(&word).ok_or_else(|| LlmError::BadOutput(raw.clone()))?;
        tracing::debug!(model = %self.model, %intent, "cli classifier result");
        Ok(ClassifiedIntent {
            intent,
            confidence: 0.8,
        })
    }

    async fn summarize(&self, instruction: &str, outcome: &str) -> Result<String, LlmError> {
        let prompt = format!(
            "Summarize this coding task in one sentence (what was asked, what was \
             delivered).\n\nInstruction:\n{}\n\nOutcome:\n{}",
            instruction, outcome
        );
        self.run_prompt(&prompt).await
    }

    fn name(&self) -> &str {
        "claude-cli"
    }
}
