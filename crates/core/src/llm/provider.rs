// crates/core/src/llm/provider.rs
//! IntentClassifier trait defining the interface for LLM integrations.

use async_trait::async_trait;

use super::types::{ClassifiedIntent, LlmError};
use crate::types::Actor;

/// Trait for LLM providers that can classify ambiguous turns and summarize
/// completed tasks.
///
/// Implementations include:
/// - `ClaudeCliClassifier` — spawns the `claude` CLI
/// - Test stubs in the server crate
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify an ambiguous turn's conversational intent. Advisory only.
    async fn classify(&self, actor: Actor, text: &str) -> Result<ClassifiedIntent, LlmError>;

    /// Produce a one-paragraph instruction/outcome summary for a completed
    /// task. Scheduled asynchronously on the terminal transition.
    async fn summarize(&self, instruction: &str, outcome: &str) -> Result<String, LlmError>;

    /// Provider name for logging (e.g. "claude-cli").
    fn name(&self) -> &str;
}
