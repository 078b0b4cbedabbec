// crates/core/src/llm/mod.rs
//! Advisory LLM classification and summarization.
//!
//! Everything here is strictly advisory: the deterministic intent pipeline
//! decides what the state machine sees, and an LLM result only annotates a
//! turn after the fact. Providers are behind the [`IntentClassifier`] trait
//! so the server can stub the whole layer in tests.

mod cache;
mod claude_cli;
mod provider;
mod types;

pub use cache::ClassifierCache;
pub use claude_cli::ClaudeCliClassifier;
pub use provider::IntentClassifier;
pub use types::{ClassifiedIntent, LlmError};
