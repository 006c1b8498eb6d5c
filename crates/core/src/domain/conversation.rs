use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::InputError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged unit of conversational text. `content` is never blank.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTurn")]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

#[derive(Deserialize)]
struct RawTurn {
    role: Role,
    content: String,
}

impl TryFrom<RawTurn> for Turn {
    type Error = InputError;

    fn try_from(raw: RawTurn) -> Result<Self, Self::Error> {
        Turn::new(raw.role, raw.content)
    }
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Result<Self, InputError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(InputError::Malformed(format!("{role} turn content must not be empty")));
        }
        Ok(Self { role, content })
    }

    pub fn user(content: impl Into<String>) -> Result<Self, InputError> {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Result<Self, InputError> {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Result<Self, InputError> {
        Self::new(Role::System, content)
    }
}

/// Dialogue history supplied by the caller for a single request, oldest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(turns: Vec<Turn>) -> Result<Self, InputError> {
        if turns.is_empty() {
            return Err(InputError::Empty);
        }
        Ok(Self { turns })
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_user_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::User)
            .map(|turn| turn.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{Conversation, Role, Turn};
    use crate::errors::InputError;

    #[test]
    fn blank_content_is_rejected() {
        assert!(matches!(Turn::user("   "), Err(InputError::Malformed(_))));
    }

    #[test]
    fn deserialize_enforces_turn_invariant() {
        let parsed: Result<Turn, _> = serde_json::from_str(r#"{"role":"user","content":""}"#);
        assert!(parsed.is_err());

        let parsed: Turn = serde_json::from_str(r#"{"role":"assistant","content":"hi"}"#)
            .expect("valid turn should parse");
        assert_eq!(parsed.role, Role::Assistant);
    }

    #[test]
    fn last_user_text_picks_most_recent_user_turn() {
        let conversation = Conversation::new(vec![
            Turn::user("first").expect("turn"),
            Turn::assistant("reply").expect("turn"),
            Turn::user("second").expect("turn"),
            Turn::assistant("another reply").expect("turn"),
        ])
        .expect("conversation");

        assert_eq!(conversation.last_user_text(), Some("second"));
    }

    #[test]
    fn empty_conversation_is_rejected() {
        assert!(matches!(Conversation::new(Vec::new()), Err(InputError::Empty)));
    }
}
