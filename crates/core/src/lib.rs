// crates/core/src/lib.rs
//! Domain logic for taskdeck: the task lifecycle state machine, intent
//! detection, transcript parsing, and the LLM classifier abstraction.
//!
//! This crate is deliberately free of HTTP and database concerns — everything
//! here is either a pure function or an async-capable building block the
//! server crate orchestrates.

pub mod error;
pub mod intent;
pub mod llm;
pub mod state_machine;
pub mod tail;
pub mod transcript;
pub mod types;

pub use error::ParseError;
pub use intent::{Detection, DetectionSource, IntentDetector};
pub use state_machine::next_state;
pub use transcript::{parse_transcript_line, TranscriptEntry};
pub use types::{Actor, Intent, TaskState};
