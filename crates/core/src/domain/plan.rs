use serde::Serialize;

use crate::domain::conversation::Turn;

/// The exact ordered input handed to the coaching backend: fixed profile turns
/// followed by the live conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PromptPlan {
    turns: Vec<Turn>,
    #[serde(skip)]
    fixed_len: usize,
}

impl PromptPlan {
    pub fn new(fixed: &[Turn], live: &[Turn]) -> Self {
        let mut turns = Vec::with_capacity(fixed.len() + live.len());
        turns.extend_from_slice(fixed);
        turns.extend_from_slice(live);
        Self { turns, fixed_len: fixed.len() }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn fixed_turns(&self) -> &[Turn] {
        &self.turns[..self.fixed_len]
    }

    pub fn live_turns(&self) -> &[Turn] {
        &self.turns[self.fixed_len..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
