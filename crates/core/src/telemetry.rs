//! Audit records written once per exchange (and per feedback submission) to the
//! blob store. Records are write-only from the pipeline's point of view.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::conversation::Turn;
use crate::normalize::{InputShape, NormalizedInput};
use crate::redaction::redact_pii;

pub const QUESTION_PREVIEW_CHARS: usize = 500;
pub const ANSWER_PREVIEW_CHARS: usize = 1200;
pub const VERBOSE_TURN_CHARS: usize = 2000;

pub const FEEDBACK_TEXT_CHARS: usize = 500;
pub const FEEDBACK_ANSWER_CHARS: usize = 1000;

const KEY_SUFFIX_LEN: usize = 8;

const UNREDACTED_FIELDS: [&str; 1] = ["correlation_id"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Content toggles applied when a record is built and serialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordPolicy {
    pub verbose: bool,
    pub redact_pii: bool,
}

impl Default for RecordPolicy {
    fn default() -> Self {
        Self { verbose: false, redact_pii: true }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogRecord {
    Coach(CoachExchange),
    Feedback(FeedbackEntry),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CoachExchange {
    pub ts: String,
    pub correlation_id: String,
    pub question: String,
    pub answer: String,
    pub user_agent: String,
    pub model: String,
    pub shape: InputShape,
    pub turn_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub review: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full: Option<FullTranscript>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FullTranscript {
    pub conversation: Vec<Turn>,
    pub answer: String,
}

/// Facts about a finished exchange, borrowed from the request that produced them.
#[derive(Clone, Copy, Debug)]
pub struct ExchangeFacts<'a> {
    pub correlation_id: &'a str,
    pub input: &'a NormalizedInput,
    pub answer: &'a str,
    pub user_agent: &'a str,
    pub model: &'a str,
    pub mode: Option<&'a str>,
    pub review: &'a str,
    pub usage: Option<UsageMetadata>,
}

impl CoachExchange {
    pub fn build(facts: ExchangeFacts<'_>, policy: RecordPolicy, now: DateTime<Utc>) -> Self {
        let full = policy.verbose.then(|| FullTranscript {
            conversation: facts
                .input
                .conversation
                .turns()
                .iter()
                .map(|turn| Turn {
                    role: turn.role,
                    content: preview(&turn.content, VERBOSE_TURN_CHARS),
                })
                .collect(),
            answer: facts.answer.to_string(),
        });

        Self {
            ts: iso_timestamp(now),
            correlation_id: facts.correlation_id.to_string(),
            question: preview(&facts.input.last_user_text, QUESTION_PREVIEW_CHARS),
            answer: preview(facts.answer, ANSWER_PREVIEW_CHARS),
            user_agent: facts.user_agent.to_string(),
            model: facts.model.to_string(),
            shape: facts.input.shape,
            turn_count: facts.input.entry_count,
            mode: facts.mode.map(str::to_string),
            review: facts.review.to_string(),
            usage: facts.usage,
            full,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeedbackEntry {
    pub ts: String,
    pub good: bool,
    pub why: String,
    pub question: String,
    pub answer: String,
    pub user_agent: String,
}

impl FeedbackEntry {
    /// Decodes a feedback body leniently: absent fields become empty, `good` follows
    /// JSON truthiness. Only unparseable JSON is an error.
    pub fn from_slice(
        body: &[u8],
        user_agent: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let value = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_slice::<Value>(body)?
        };

        let field = |name: &str| value.get(name).map(text_of).unwrap_or_default();
        let ts = field("ts");

        Ok(Self {
            ts: if ts.is_empty() { iso_timestamp(now) } else { ts },
            good: value.get("good").is_some_and(truthy),
            why: preview(&field("why"), FEEDBACK_TEXT_CHARS),
            question: preview(&field("question"), FEEDBACK_TEXT_CHARS),
            answer: preview(&field("answer"), FEEDBACK_ANSWER_CHARS),
            user_agent: user_agent.to_string(),
        })
    }
}

impl LogRecord {
    /// Serialized form written to the store. With redaction on, every string in the
    /// record except identifiers is scrubbed before JSON escaping.
    pub fn to_stored_json(&self, policy: RecordPolicy) -> Result<String, serde_json::Error> {
        if !policy.redact_pii {
            return serde_json::to_string(self);
        }
        let mut value = serde_json::to_value(self)?;
        redact_strings(&mut value);
        serde_json::to_string(&value)
    }

    /// `<environment>/[feedback/]<date>/<millis>-<random>`; random suffix keeps concurrent
    /// writers from colliding.
    pub fn storage_key(&self, environment: &str, now: DateTime<Utc>) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(KEY_SUFFIX_LEN)
            .map(|byte| char::from(byte).to_ascii_lowercase())
            .collect();
        let date = now.format("%Y-%m-%d");
        let millis = now.timestamp_millis();

        match self {
            Self::Coach(_) => format!("{environment}/{date}/{millis}-{suffix}"),
            Self::Feedback(_) => format!("{environment}/feedback/{date}/{millis}-{suffix}"),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Coach(_) => "coach",
            Self::Feedback(_) => "feedback",
        }
    }
}

/// First `max_chars` characters of `text`.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}

pub fn iso_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn redact_strings(value: &mut Value) {
    match value {
        Value::String(text) => *text = redact_pii(text),
        Value::Array(items) => items.iter_mut().for_each(redact_strings),
        Value::Object(fields) => {
            for (name, field) in fields.iter_mut() {
                if !UNREDACTED_FIELDS.contains(&name.as_str()) {
                    redact_strings(field);
                }
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
