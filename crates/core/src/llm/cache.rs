// crates/core/src/llm/cache.rs
//! Content-hash cache for classifier results.
//!
//! Identical text produces identical advisory classifications, so results
//! are keyed by SHA-256 of (actor, text). The cache is in-memory only —
//! classifications are advisory and cheap to lose on restart.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

use super::types::ClassifiedIntent;
use crate::types::Actor;

pub struct ClassifierCache {
    entries: Mutex<HashMap<String, ClassifiedIntent>>,
}

impl ClassifierCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Stable key for an (actor, text) pair.
    pub fn key(actor: Actor, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(actor.as_str().as_bytes());
        hasher.update(b"\x00");
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<ClassifiedIntent> {
        self.entries
            .lock()
            .ok()
            .and_then(|map| map.get(key).cloned())
    }

    pub fn insert(&self, key: String, value: ClassifiedIntent) {
        if let Ok(mut map) = self.entries.lock() {
            map.insert(key, value);
        }
    }
}

impl Default for ClassifierCache {
    fn default() -> Self {
        Self::new()
    }
}
