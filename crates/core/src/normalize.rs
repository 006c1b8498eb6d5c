//! Decoding of coach request bodies into a single canonical conversation.
//!
//! A body carries history under exactly one of three shapes:
//! - `input`: pass-through turn array, used verbatim
//! - `messages`: `{role, content}` pairs, entries without text content are dropped
//! - `question`: a single string, kept for older clients
//!
//! Ambiguous bodies are rejected before any backend work happens.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::conversation::{Conversation, Role, Turn};
use crate::errors::InputError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputShape {
    PassThrough,
    Messages,
    Question,
}

impl InputShape {
    /// Request body field that carries this shape.
    pub fn field(&self) -> &'static str {
        match self {
            Self::PassThrough => "input",
            Self::Messages => "messages",
            Self::Question => "question",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConversationInput {
    PassThrough(Vec<Turn>),
    Messages(Vec<Turn>),
    Question(String),
}

impl ConversationInput {
    pub fn shape(&self) -> InputShape {
        match self {
            Self::PassThrough(_) => InputShape::PassThrough,
            Self::Messages(_) => InputShape::Messages,
            Self::Question(_) => InputShape::Question,
        }
    }
}

/// A decoded `/api/coach` request body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoachRequest {
    pub input: ConversationInput,
    pub mode: Option<String>,
}

impl CoachRequest {
    pub fn from_slice(body: &[u8]) -> Result<Self, InputError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(InputError::Empty);
        }

        let value: Value = serde_json::from_slice(body)
            .map_err(|error| InputError::Malformed(format!("invalid JSON body: {error}")))?;
        let Value::Object(fields) = value else {
            return Err(InputError::Malformed("request body must be a JSON object".to_string()));
        };

        Self::from_fields(fields)
    }

    fn from_fields(mut fields: Map<String, Value>) -> Result<Self, InputError> {
        let mode = match fields.remove("mode") {
            Some(Value::String(mode)) => Some(mode),
            _ => None,
        };

        let mut present = Vec::new();
        for shape in [InputShape::PassThrough, InputShape::Messages, InputShape::Question] {
            if let Some(value) = fields.remove(shape.field()).filter(|value| !value.is_null()) {
                present.push((shape, value));
            }
        }

        if present.len() > 1 {
            return Err(InputError::Conflicting {
                shapes: present.iter().map(|(shape, _)| shape.field()).collect(),
            });
        }

        let Some((shape, value)) = present.pop() else {
            return Err(InputError::Empty);
        };

        let input = match shape {
            InputShape::PassThrough => ConversationInput::PassThrough(decode_pass_through(value)?),
            InputShape::Messages => ConversationInput::Messages(decode_messages(value)?),
            InputShape::Question => match value {
                Value::String(question) => ConversationInput::Question(question),
                _ => return Err(InputError::Malformed("`question` must be a string".to_string())),
            },
        };

        Ok(Self { input, mode })
    }
}

fn decode_pass_through(value: Value) -> Result<Vec<Turn>, InputError> {
    let Value::Array(entries) = value else {
        return Err(InputError::Malformed("`input` must be an array of turns".to_string()));
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value::<Turn>(entry)
                .map_err(|error| InputError::Malformed(format!("`input[{index}]`: {error}")))
        })
        .collect()
}

fn decode_messages(value: Value) -> Result<Vec<Turn>, InputError> {
    let Value::Array(entries) = value else {
        return Err(InputError::Malformed("`messages` must be an array".to_string()));
    };

    Ok(entries.into_iter().filter_map(message_turn).collect())
}

fn message_turn(entry: Value) -> Option<Turn> {
    let role = entry.get("role").and_then(Value::as_str).and_then(Role::parse)?;
    let content = entry.get("content").and_then(Value::as_str)?;
    Turn::new(role, content).ok()
}

/// Canonical conversation plus the facts later stages need about it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedInput {
    pub conversation: Conversation,
    pub shape: InputShape,
    pub entry_count: usize,
    pub last_user_text: String,
}

pub fn normalize(input: ConversationInput) -> Result<NormalizedInput, InputError> {
    let shape = input.shape();
    let conversation = match input {
        ConversationInput::PassThrough(turns) | ConversationInput::Messages(turns) => {
            Conversation::new(turns)?
        }
        ConversationInput::Question(question) => {
            let question = question.trim();
            if question.is_empty() {
                return Err(InputError::Empty);
            }
            Conversation::new(vec![Turn::user(question)?])?
        }
    };

    let last_user_text = conversation.last_user_text().unwrap_or_default().to_string();
    Ok(NormalizedInput { entry_count: conversation.len(), shape, last_user_text, conversation })
}
