pub mod profile;

use std::sync::Arc;

use crate::domain::conversation::Conversation;
use crate::domain::plan::PromptPlan;

pub use profile::{CoachingProfile, ProfileError, ReviewInstructions};

/// Builds the backend input: profile instructions, profile exemplars, live conversation.
#[derive(Clone, Debug)]
pub struct PromptAssembler {
    profile: Arc<CoachingProfile>,
}

impl PromptAssembler {
    pub fn new(profile: Arc<CoachingProfile>) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &CoachingProfile {
        &self.profile
    }

    /// Number of turns every plan starts with.
    pub fn fixed_len(&self) -> usize {
        self.profile.fixed_turns().len()
    }

    pub fn assemble(&self, conversation: &Conversation) -> PromptPlan {
        PromptPlan::new(self.profile.fixed_turns(), conversation.turns())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{CoachingProfile, PromptAssembler};
    use crate::domain::conversation::{Conversation, Role, Turn};

    fn assembler() -> PromptAssembler {
        PromptAssembler::new(Arc::new(CoachingProfile::builtin()))
    }

    #[test]
    fn plan_is_system_then_exemplars_then_conversation() {
        let assembler = assembler();
        let conversation = Conversation::new(vec![
            Turn::user("Revenue is down.").expect("turn"),
            Turn::assistant("Q: Which product line, and since when?").expect("turn"),
            Turn::user("Services, since March.").expect("turn"),
        ])
        .expect("conversation");

        let plan = assembler.assemble(&conversation);

        assert_eq!(plan.len(), assembler.fixed_len() + 3);
        assert_eq!(plan.turns()[0].role, Role::System);
        assert_eq!(plan.fixed_turns(), assembler.profile().fixed_turns());
        assert_eq!(plan.live_turns(), conversation.turns());
    }

    #[test]
    fn fixed_turns_are_identical_across_requests() {
        let assembler = assembler();
        let first = Conversation::new(vec![Turn::user("Employee is difficult.").expect("turn")])
            .expect("conversation");
        let second = Conversation::new(vec![
            Turn::user("How should I run one-on-ones?").expect("turn"),
            Turn::assistant("Q: How many direct reports?").expect("turn"),
            Turn::user("Seven.").expect("turn"),
        ])
        .expect("conversation");

        let first_plan = assembler.assemble(&first);
        let second_plan = assembler.assemble(&second);

        let encode = |turns: &[Turn]| serde_json::to_vec(turns).expect("turns serialize");
        assert_eq!(encode(first_plan.fixed_turns()), encode(second_plan.fixed_turns()));
        assert_ne!(first_plan.live_turns(), second_plan.live_turns());
    }
}
