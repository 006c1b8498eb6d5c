use std::sync::Arc;

use coachline_core::config::ReviewDiscipline;
use coachline_core::errors::ApplicationError;
use coachline_core::normalize::NormalizedInput;
use coachline_core::prompt::PromptAssembler;
use coachline_core::style::{self, LineBudget};
use coachline_core::telemetry::UsageMetadata;
use tracing::{info, warn};

use crate::llm::{CoachingBackend, CompletionParams};
use crate::review::{ReviewOutcome, Reviewer};

/// Returned instead of an empty reply when the backend produced nothing usable.
pub const EMPTY_ANSWER_PLACEHOLDER: &str = "Sorry, no answer generated.";

#[derive(Clone, Debug, PartialEq)]
pub struct CoachReply {
    pub answer: String,
    pub completion_id: Option<String>,
    pub usage: Option<UsageMetadata>,
    pub review: ReviewOutcome,
    pub budget: LineBudget,
}

/// Assemble, complete, clean, review, enforce. One backend call per request plus at
/// most one review call, strictly in sequence.
pub struct CoachingRuntime {
    assembler: PromptAssembler,
    backend: Arc<dyn CoachingBackend>,
    reviewer: Reviewer,
    params: CompletionParams,
}

impl CoachingRuntime {
    pub fn new(
        assembler: PromptAssembler,
        backend: Arc<dyn CoachingBackend>,
        discipline: ReviewDiscipline,
        params: CompletionParams,
    ) -> Self {
        let reviewer =
            Reviewer::new(discipline, backend.clone(), assembler.profile().review().clone());
        Self { assembler, backend, reviewer, params }
    }

    pub fn params(&self) -> &CompletionParams {
        &self.params
    }

    pub fn assembler(&self) -> &PromptAssembler {
        &self.assembler
    }

    pub fn review_discipline(&self) -> ReviewDiscipline {
        self.reviewer.discipline()
    }

    pub async fn coach(
        &self,
        input: &NormalizedInput,
        correlation_id: &str,
    ) -> Result<CoachReply, ApplicationError> {
        let plan = self.assembler.assemble(&input.conversation);
        let budget = LineBudget::for_user_text(&input.last_user_text);

        let completion = self.backend.complete(&plan, &self.params).await.map_err(|error| {
            warn!(
                event_name = "coach.backend.failed",
                correlation_id = %correlation_id,
                error = %error,
                "coaching backend call failed"
            );
            ApplicationError::Backend(error.to_string())
        })?;

        let cleaned = style::strip_formatting(&completion.text);
        let review =
            self.reviewer.review(&input.last_user_text, &cleaned, budget, &self.params).await;
        let formatted = style::enforce(review.resolve(&cleaned), budget);

        let answer = if formatted.is_empty() {
            warn!(
                event_name = "coach.answer.empty",
                correlation_id = %correlation_id,
                "backend produced no usable text; returning placeholder"
            );
            EMPTY_ANSWER_PLACEHOLDER.to_string()
        } else {
            formatted
        };

        info!(
            event_name = "coach.request.completed",
            correlation_id = %correlation_id,
            shape = input.shape.field(),
            turn_count = input.entry_count,
            plan_len = plan.len(),
            line_budget = budget.lines(),
            review = review.label(),
            "coaching reply formatted"
        );

        Ok(CoachReply {
            answer,
            completion_id: completion.id,
            usage: completion.usage,
            review,
            budget,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use coachline_core::config::ReviewDiscipline;
    use coachline_core::domain::conversation::{Role, Turn};
    use coachline_core::errors::ApplicationError;
    use coachline_core::normalize::{normalize, ConversationInput, NormalizedInput};
    use coachline_core::prompt::{CoachingProfile, PromptAssembler};
    use coachline_core::style::DETAILED_LINE_BUDGET;

    use super::{CoachingRuntime, EMPTY_ANSWER_PLACEHOLDER};
    use coachline_core::telemetry::UsageMetadata;

    use crate::llm::{BackendError, Completion, CompletionParams, ScriptedBackend};
    use crate::review::ReviewOutcome;

    fn runtime(backend: Arc<ScriptedBackend>, discipline: ReviewDiscipline) -> CoachingRuntime {
        CoachingRuntime::new(
            PromptAssembler::new(Arc::new(CoachingProfile::builtin())),
            backend,
            discipline,
            CompletionParams { model: "gpt-4o-mini".to_string(), temperature: 0.4 },
        )
    }

    fn question(text: &str) -> NormalizedInput {
        normalize(ConversationInput::Question(text.to_string())).expect("question normalizes")
    }

    #[tokio::test]
    async fn vague_question_yields_single_clarifying_question() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .push_reply("Q: What does difficult look like day to day?\nHere is a long plan.\n- step one")
            .await;
        let runtime = runtime(backend, ReviewDiscipline::Off);

        let reply = runtime
            .coach(&question("Employee is being difficult."), "corr-a")
            .await
            .expect("reply");

        assert_eq!(reply.answer, "Q: What does difficult look like day to day?");
        assert_eq!(reply.review, ReviewOutcome::Disabled);
    }

    #[tokio::test]
    async fn multi_turn_conversation_is_appended_after_fixed_turns() {
        let backend = Arc::new(ScriptedBackend::replying("Set a weekly check-in."));
        let runtime = runtime(backend.clone(), ReviewDiscipline::Off);
        let input = normalize(ConversationInput::Messages(vec![
            Turn::user("My team misses deadlines.").expect("turn"),
            Turn::assistant("Q: Which deadlines?").expect("turn"),
            Turn::user("new question").expect("turn"),
        ]))
        .expect("messages normalize");

        runtime.coach(&input, "corr-b").await.expect("reply");

        let calls = backend.calls().await;
        let plan = &calls[0].0;
        assert_eq!(plan.len(), runtime.assembler().fixed_len() + 3);
        assert_eq!(plan.live_turns()[2].role, Role::User);
        assert_eq!(plan.live_turns()[2].content, "new question");
    }

    #[tokio::test]
    async fn detail_marker_raises_line_budget() {
        let long = (1..=20).map(|n| format!("point {n}")).collect::<Vec<_>>().join("\n");
        let backend = Arc::new(ScriptedBackend::replying(long));
        let runtime = runtime(backend, ReviewDiscipline::Off);

        let short = runtime.coach(&question("How do I delegate?"), "c1").await.expect("reply");
        let detailed = runtime
            .coach(&question("How do I delegate? [DETAIL:HIGH]"), "c2")
            .await
            .expect("reply");

        assert_eq!(short.answer.lines().count(), 5);
        assert_eq!(detailed.answer.lines().count(), DETAILED_LINE_BUDGET);
    }

    #[tokio::test]
    async fn completion_id_and_usage_are_carried_on_the_reply() {
        let usage = UsageMetadata {
            prompt_tokens: Some(210),
            completion_tokens: Some(18),
            total_tokens: Some(228),
        };
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .push_completion(Completion {
                text: "Name one owner per deadline.".to_string(),
                id: Some("chatcmpl-42".to_string()),
                usage: Some(usage),
            })
            .await;
        let runtime = runtime(backend, ReviewDiscipline::Off);

        let reply = runtime.coach(&question("Deadlines slip"), "corr").await.expect("reply");

        assert_eq!(reply.answer, "Name one owner per deadline.");
        assert_eq!(reply.completion_id.as_deref(), Some("chatcmpl-42"));
        assert_eq!(reply.usage, Some(usage));
    }

    #[tokio::test]
    async fn empty_completion_becomes_placeholder() {
        let backend = Arc::new(ScriptedBackend::replying("  \n- \n**"));
        let runtime = runtime(backend, ReviewDiscipline::Off);

        let reply = runtime.coach(&question("Hello?"), "corr").await.expect("reply");

        assert_eq!(reply.answer, EMPTY_ANSWER_PLACEHOLDER);
    }

    #[tokio::test]
    async fn backend_failure_is_an_application_error() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_error(BackendError::Status { status: 500, body: "boom".to_string() }).await;
        let runtime = runtime(backend, ReviewDiscipline::Off);

        let result = runtime.coach(&question("Hello?"), "corr").await;

        assert!(matches!(result, Err(ApplicationError::Backend(_))));
    }

    #[tokio::test]
    async fn malformed_review_falls_back_to_formatted_draft() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_reply("- **Name the gap.**\nQ: What outcome do you want?\nextra").await;
        backend.push_reply("one\ntwo\nthree\nfour\nfive\nsix\nseven").await;
        let runtime = runtime(backend.clone(), ReviewDiscipline::MicroTurn);

        let reply = runtime.coach(&question("Peer ignores me"), "corr").await.expect("reply");

        assert_eq!(reply.answer, "Name the gap.\nQ: What outcome do you want?");
        assert_eq!(reply.review, ReviewOutcome::Fallback { reason_code: "review_over_budget" });
        assert_eq!(backend.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn accepted_review_replaces_draft() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_reply("Long rambling draft.\nQ: Who decides?").await;
        backend.push_reply("Decide the owner.\nQ: Who decides?").await;
        let runtime = runtime(backend, ReviewDiscipline::MicroTurn);

        let reply = runtime.coach(&question("Roles unclear"), "corr").await.expect("reply");

        assert_eq!(reply.answer, "Decide the owner.\nQ: Who decides?");
        assert_eq!(reply.review.label(), "revised");
    }
}
