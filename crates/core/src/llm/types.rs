// crates/core/src/llm/types.rs
//! Request/response/error types for the classifier layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Intent;

/// An advisory classification produced by an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedIntent {
    pub intent: Intent,
    pub confidence: f64,
}

/// Errors from LLM providers. All of them degrade to the deterministic
/// stage-3 result at the call site; none ever fails a hook request.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("failed to spawn classifier process: {0}")]
    SpawnFailed(String),

    #[error("classifier timed out after {0}s")]
    Timeout(u64),

    #[error("classifier returned unparseable output: {0}")]
    BadOutput(String),

    #[error("classifier exited with status {0}")]
    NonZeroExit(i32),
}
