// crates/core/src/transcript.rs
//! Tolerant parser for append-only JSONL transcript logs.
//!
//! Each transcript line is a JSON object with a `type` (`user`,
//! `assistant`, plus noise types we skip), an ISO-8601 `timestamp`, and a
//! `message` whose `content` is either a string or an array of content
//! blocks. Only real conversational exchanges become entries: meta lines,
//! tool-result continuations, and system-injected prefixes are filtered
//! out, and malformed lines are skipped with a debug log rather than
//! failing the batch — the log is being written concurrently and the
//! reconciler re-reads from a stable offset anyway.

use chrono::DateTime;
use serde_json::Value;

use crate::types::Actor;

/// System-injected prefixes on user-type lines that are not real user turns.
const SYSTEM_PREFIXES: &[&str] = &[
    "<local-command",
    "<command-name>",
    "<task-notification>",
    "<system-reminder>",
    "[Request interrupted",
];

/// One conversational exchange extracted from the transcript log, carrying
/// the authoritative timestamp the reconciler trusts.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    /// Authoritative unix-millis timestamp from the log line.
    pub timestamp: i64,
    pub actor: Actor,
    pub text: String,
}

/// Parse a single transcript line into an entry, or `None` when the line is
/// noise (unparseable, non-conversational, meta, or empty).
pub fn parse_transcript_line(line: &str) -> Option<TranscriptEntry> {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed transcript line");
            return None;
        }
    };

    let actor = match value.get("type").and_then(Value::as_str) {
        Some("user") => Actor::User,
        Some("assistant") => Actor::Agent,
        // summary / progress / system / result lines carry no exchange
        _ => return None,
    };

    if value.get("isMeta").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }

    let timestamp = value
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp_millis())?;

    let message = value.get("message")?;
    let text = extract_text(message.get("content")?)?;

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if actor == Actor::User && SYSTEM_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        return None;
    }

    Some(TranscriptEntry {
        timestamp,
        actor,
        text: trimmed.to_string(),
    })
}

/// Pull the human-readable text out of a `content` field.
///
/// Content is either a plain string or an array of blocks. A user line whose
/// array contains a `tool_result` block is a continuation after tool
/// execution, not a new turn, and yields nothing. Text blocks are joined
/// with newlines; `tool_use` and `thinking` blocks contribute no text.
fn extract_text(content: &Value) -> Option<String> {
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(blocks) => {
            let has_tool_result = blocks
                .iter()
                .any(|b| b.get("type").and_then(Value::as_str) == Some("tool_result"));
            if has_tool_result {
                return None;
            }
            let parts: Vec<&str> = blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        }
        _ => None,
    }
}

/// Parse a batch of lines, keeping only real exchanges in log order.
pub fn parse_transcript_lines(lines: &[String]) -> Vec<TranscriptEntry> {
    lines
        .iter()
        .filter_map(|l| parse_transcript_line(l))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn user_line(text: &str, ts: &str) -> String {
        serde_json::json!({
            "type": "user",
            "timestamp": ts,
            "message": { "role": "user", "content": text }
        })
        .to_string()
    }

    fn assistant_line(text: &str, ts: &str) -> String {
        serde_json::json!({
            "type": "assistant",
            "timestamp": ts,
            "message": {
                "role": "assistant",
                "content": [{ "type": "text", "text": text }]
            }
        })
        .to_string()
    }

    #[test]
    fn test_parse_user_string_content() {
        let entry = parse_transcript_line(&user_line("implement X", "2026-08-25T10:00:00Z"))
            .expect("parses");
        assert_eq!(entry.actor, Actor::User);
        assert_eq!(entry.text, "implement X");
        assert_eq!(
            entry.timestamp,
            DateTime::parse_from_rfc3339("2026-08-25T10:00:00Z")
                .unwrap()
                .timestamp_millis()
        );
    }

    #[test]
    fn test_parse_assistant_block_content() {
        let entry =
            parse_transcript_line(&assistant_line("Done, implemented A.", "2026-08-25T10:05:00Z"))
                .expect("parses");
        assert_eq!(entry.actor, Actor::Agent);
        assert_eq!(entry.text, "Done, implemented A.");
    }

    #[test]
    fn test_multiple_text_blocks_joined() {
        let line = serde_json::json!({
            "type": "assistant",
            "timestamp": "2026-08-25T10:00:00Z",
            "message": { "content": [
                { "type": "thinking", "thinking": "hmm" },
                { "type": "text", "text": "first" },
                { "type": "text", "text": "second" }
            ]}
        })
        .to_string();
        let entry = parse_transcript_line(&line).expect("parses");
        assert_eq!(entry.text, "first\nsecond");
    }

    #[test]
    fn test_tool_result_continuation_skipped() {
        let line = serde_json::json!({
            "type": "user",
            "timestamp": "2026-08-25T10:00:00Z",
            "message": { "content": [
                { "type": "tool_result", "tool_use_id": "t1", "content": "ok" }
            ]}
        })
        .to_string();
        assert_eq!(parse_transcript_line(&line), None);
    }

    #[test]
    fn test_tool_use_only_assistant_line_skipped() {
        let line = serde_json::json!({
            "type": "assistant",
            "timestamp": "2026-08-25T10:00:00Z",
            "message": { "content": [
                { "type": "tool_use", "name": "Bash", "input": {} }
            ]}
        })
        .to_string();
        assert_eq!(parse_transcript_line(&line), None);
    }

    #[test]
    fn test_meta_line_skipped() {
        let line = serde_json::json!({
            "type": "user",
            "isMeta": true,
            "timestamp": "2026-08-25T10:00:00Z",
            "message": { "content": "Caveat: injected context" }
        })
        .to_string();
        assert_eq!(parse_transcript_line(&line), None);
    }

    #[test]
    fn test_system_prefix_skipped() {
        let line = user_line(
            "<local-command-caveat>ran /clear</local-command-caveat>",
            "2026-08-25T10:00:00Z",
        );
        assert_eq!(parse_transcript_line(&line), None);
    }

    #[test]
    fn test_noise_types_skipped() {
        for ty in ["summary", "progress", "system", "result"] {
            let line = serde_json::json!({
                "type": ty,
                "timestamp": "2026-08-25T10:00:00Z",
                "message": { "content": "x" }
            })
            .to_string();
            assert_eq!(parse_transcript_line(&line), None, "type {ty}");
        }
    }

    #[test]
    fn test_malformed_json_skipped() {
        assert_eq!(parse_transcript_line("{not json"), None);
        assert_eq!(parse_transcript_line(""), None);
    }

    #[test]
    fn test_missing_timestamp_skipped() {
        let line = serde_json::json!({
            "type": "user",
            "message": { "content": "no timestamp" }
        })
        .to_string();
        assert_eq!(parse_transcript_line(&line), None);
    }

    #[test]
    fn test_batch_keeps_order() {
        let lines = vec![
            user_line("implement X", "2026-08-25T10:00:00Z"),
            "{broken".to_string(),
            assistant_line("Working on it.", "2026-08-25T10:00:05Z"),
        ];
        let entries = parse_transcript_lines(&lines);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].actor, Actor::User);
        assert_eq!(entries[1].actor, Actor::Agent);
        assert!(entries[0].timestamp < entries[1].timestamp);
    }
}
