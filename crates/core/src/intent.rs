// crates/core/src/intent.rs
//! Staged intent detection for turn text.
//!
//! Tiered, deterministic pipeline:
//! - Stage 1: completion patterns → `Completion` / `EndOfTask`
//! - Stage 2: question patterns (agent text only) → `Question`
//! - Stage 3: default-by-actor fallback
//!
//! Stages 1–2 are fixed pattern sets compiled once. Stage 3 never fails, so
//! detection is total. Text that reached stage 3 is tagged
//! `DefaultedByActor`; callers may escalate those to the LLM classifier
//! asynchronously, but the deterministic result is always applied first and
//! the hook response never waits on the escalation.

use regex_lite::Regex;

use crate::types::{Actor, Intent};

/// Phrases that explicitly mark the end of the whole task, not just a step.
const END_OF_TASK_PATTERNS: &[&str] = &[
    r"(?i)\bend of task\b",
    r"(?i)\btask (is )?(now )?complete\b",
    r"(?i)\bnothing (further|else) (to do|remains|left)\b",
    r"(?i)\ball (requested )?work is (done|complete)\b",
    r"(?i)\bwrapping up\b.*\bnothing left\b",
];

/// Phrases that signal the agent considers the current work finished.
const COMPLETION_PATTERNS: &[&str] = &[
    r"(?i)^done\b",
    r"(?i)^all done\b",
    r"(?i)\ball set\b",
    r"(?i)\bi('ve| have) (now )?(finished|completed|implemented|fixed)\b",
    r"(?i)^(finished|completed|implemented|fixed)\b",
    r"(?i)\bthe (change|fix|feature|implementation|refactor)s? (is|are) (in place|complete|done)\b",
    r"(?i)\ball tests? (now )?pass\b",
    r"(?i)\btests? (are )?(now )?(green|passing)\b",
    r"(?i)\bsuccessfully (implemented|fixed|completed|migrated|refactored)\b",
    r"(?i)\bcommitted (and pushed|the changes)\b",
    r"(?i)\beverything (is )?(now )?work(s|ing)( as expected)?\b",
    r"(?i)\bready for (review|you to review)\b",
    r"(?i)\blet me know if (you need|there's) anything else\b",
    r"(?i)\bno (further|more) changes (are )?(needed|required)\b",
    r"(?i)\bsummary of (the )?changes\b",
];

/// Patterns that signal the agent is asking the user for a decision or
/// input. Large fixed set; matched only against AGENT text.
const QUESTION_PATTERNS: &[&str] = &[
    // Direct requests for a decision
    r"(?i)\bshould i\b",
    r"(?i)\bshall i\b",
    r"(?i)\bwould you like\b",
    r"(?i)\bwould you prefer\b",
    r"(?i)\bdo you want\b",
    r"(?i)\bdo you prefer\b",
    r"(?i)\bdo you need\b",
    r"(?i)\bdid you want\b",
    r"(?i)\bdid you mean\b",
    r"(?i)\bwhich (one|of these|approach|option|version|file|branch)\b",
    r"(?i)\bwhich do you\b",
    r"(?i)\bwhat would you\b",
    r"(?i)\bwhat do you (want|prefer|think)\b",
    r"(?i)\bhow would you like\b",
    r"(?i)\bhow do you want\b",
    r"(?i)\bhow should i\b",
    r"(?i)\bwhere should i\b",
    r"(?i)\bwhen should i\b",
    r"(?i)\bwho should\b",
    r"(?i)\bwhy do you\b",
    // Permission / confirmation
    r"(?i)\bcan i\b.*\?",
    r"(?i)\bmay i\b",
    r"(?i)\bis it ok(ay)? (to|if)\b",
    r"(?i)\bis that ok(ay)?\b",
    r"(?i)\bare you ok(ay)? with\b",
    r"(?i)\bok(ay)? to proceed\b",
    r"(?i)\bproceed with\b.*\?",
    r"(?i)\bbefore i (proceed|continue|go ahead)\b",
    r"(?i)\bwant me to (proceed|continue|go ahead)\b",
    r"(?i)\bconfirm (that|whether|before)\b",
    r"(?i)\bcan you confirm\b",
    r"(?i)\bcould you confirm\b",
    r"(?i)\bplease confirm\b",
    r"(?i)\bneed (your|you to) (confirmation|confirm|approval|approve)\b",
    r"(?i)\bawaiting (your )?(approval|confirmation|input|decision)\b",
    r"(?i)\bwaiting (for|on) (your|you)\b",
    // Clarification
    r"(?i)\bcould you clarify\b",
    r"(?i)\bcan you clarify\b",
    r"(?i)\bplease clarify\b",
    r"(?i)\bneed (some )?clarification\b",
    r"(?i)\bto clarify\b.*\?",
    r"(?i)\bi'?m not sure (what|which|whether|if) you\b",
    r"(?i)\bit'?s (unclear|ambiguous) (what|which|whether)\b",
    r"(?i)\bunclear (to me )?(what|which|whether)\b",
    r"(?i)\bcould you (specify|elaborate|explain)\b",
    r"(?i)\bcan you (specify|elaborate|explain|provide|share|tell me)\b",
    r"(?i)\bcould you (provide|share|tell me)\b",
    r"(?i)\bwhat exactly\b",
    r"(?i)\bmore (details|context|information) (about|on)\b.*\?",
    // Option framing
    r"(?i)\boption (a|b|1|2)\b.*\bor\b",
    r"(?i)\bapproach (a|b|1|2)\b.*\bor\b",
    r"(?i)\b(a|1)\) .*\b(b|2)\) ",
    r"(?i)\beither\b.*\bor\b.*\?",
    r"(?i)\balternatively\b.*\?",
    r"(?i)\btwo (options|approaches|ways)\b",
    r"(?i)\ba few (options|approaches|ways)\b.*\?",
    r"(?i)\btrade-?offs?\b.*\?",
    r"(?i)\bpros and cons\b.*\?",
    r"(?i)\bup to you\b",
    r"(?i)\byour call\b",
    r"(?i)\bpreference\b.*\?",
    // Missing inputs
    r"(?i)\bwhat('s| is) the (path|url|name|value|format|expected)\b",
    r"(?i)\bwhere (is|are|does|do|can i find)\b.*\?",
    r"(?i)\bdo you have\b.*\?",
    r"(?i)\bis there (a|an|any)\b.*\?",
    r"(?i)\bare there (any|other)\b.*\?",
    r"(?i)\bwhich (credentials|account|environment|config)\b",
    r"(?i)\bi need (the|a|an|your)\b.*\b(to continue|before i can)\b",
    r"(?i)\bmissing\b.*\bplease (provide|supply)\b",
    r"(?i)\bcould not find\b.*\bwhich\b",
    // Generic interrogatives (kept last; broadest)
    r"(?i)\bany preference\b",
    r"(?i)\bthoughts\?",
    r"(?i)\bwhat do you think\b",
    r"(?i)\bdoes (that|this) (work|sound good|look right)( for you)?\b",
    r"(?i)\bsound good\b",
    r"(?i)\blook (good|right|correct) to you\b",
    r"(?i)\?\s*$",
];

/// How a detection was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    /// A fixed pattern matched — deterministic, high confidence.
    Matched,
    /// No pattern matched; the actor default was applied. Candidates for
    /// advisory LLM escalation.
    DefaultedByActor,
}

/// Result of intent detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub intent: Intent,
    pub source: DetectionSource,
}

impl Detection {
    fn matched(intent: Intent) -> Self {
        Self {
            intent,
            source: DetectionSource::Matched,
        }
    }

    fn defaulted(intent: Intent) -> Self {
        Self {
            intent,
            source: DetectionSource::DefaultedByActor,
        }
    }

    /// Whether this result is a stage-3 default the caller may escalate.
    pub fn is_ambiguous(&self) -> bool {
        self.source == DetectionSource::DefaultedByActor
    }
}

/// Staged intent detector. Compiles its pattern sets once at construction;
/// detection itself is synchronous and side-effect-free.
pub struct IntentDetector {
    end_of_task: Vec<Regex>,
    completion: Vec<Regex>,
    question: Vec<Regex>,
}

impl IntentDetector {
    pub fn new() -> Self {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("fixed intent pattern compiles"))
                .collect()
        };
        Self {
            end_of_task: compile(END_OF_TASK_PATTERNS),
            completion: compile(COMPLETION_PATTERNS),
            question: compile(QUESTION_PATTERNS),
        }
    }

    /// Classify `text` for `actor`. `has_open_task` drives the stage-3
    /// user default: `Command` when no task is open, `Answer` otherwise.
    pub fn detect(&self, actor: Actor, text: &str, has_open_task: bool) -> Detection {
        let trimmed = text.trim();

        // Stage 1: completion markers (agent only — a user saying "done"
        // is an answer, not a completion signal).
        if actor == Actor::Agent {
            if self.end_of_task.iter().any(|re| re.is_match(trimmed)) {
                return Detection::matched(Intent::EndOfTask);
            }
            if self.completion.iter().any(|re| re.is_match(trimmed)) {
                return Detection::matched(Intent::Completion);
            }
            // Stage 2: question patterns.
            if self.question.iter().any(|re| re.is_match(trimmed)) {
                return Detection::matched(Intent::Question);
            }
        }

        // Stage 3: default by actor.
        match actor {
            Actor::User if !has_open_task => Detection::defaulted(Intent::Command),
            Actor::User => Detection::defaulted(Intent::Answer),
            Actor::Agent => Detection::defaulted(Intent::Progress),
        }
    }
}

impl Default for IntentDetector {
    fn default() -> Self {
        Self::new()
    }
}
