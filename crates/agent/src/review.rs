//! Optional second pass that asks the backend to tighten a draft. Its output is
//! advisory: any failure, or any result that breaks the structural contract, keeps
//! the unreviewed draft.

use std::sync::Arc;

use coachline_core::config::ReviewDiscipline;
use coachline_core::domain::conversation::Turn;
use coachline_core::domain::plan::PromptPlan;
use coachline_core::prompt::ReviewInstructions;
use coachline_core::style::{self, LineBudget};
use tera::{Context, Tera};
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::{BackendError, CoachingBackend, CompletionParams};

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("review request could not be rendered: {0}")]
    Template(String),
    #[error("review instructions are empty")]
    EmptyInstructions,
    #[error("reviewed text was rejected: {reason_code}")]
    Rejected { reason_code: &'static str },
}

impl ReviewError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "review_backend_failed",
            Self::Template(_) | Self::EmptyInstructions => "review_request_invalid",
            Self::Rejected { reason_code } => *reason_code,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReviewOutcome {
    Disabled,
    /// The draft did not have the shape this discipline reviews.
    NotApplicable,
    Revised(String),
    Fallback { reason_code: &'static str },
}

impl ReviewOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disabled => "off",
            Self::NotApplicable => "not_applicable",
            Self::Revised(_) => "revised",
            Self::Fallback { reason_code } => *reason_code,
        }
    }

    /// Text the formatter should finish: the revision when accepted, the draft otherwise.
    pub fn resolve<'a>(&'a self, draft: &'a str) -> &'a str {
        match self {
            Self::Revised(text) => text,
            _ => draft,
        }
    }
}

pub struct Reviewer {
    discipline: ReviewDiscipline,
    backend: Arc<dyn CoachingBackend>,
    instructions: ReviewInstructions,
}

impl Reviewer {
    pub fn new(
        discipline: ReviewDiscipline,
        backend: Arc<dyn CoachingBackend>,
        instructions: ReviewInstructions,
    ) -> Self {
        Self { discipline, backend, instructions }
    }

    pub fn discipline(&self) -> ReviewDiscipline {
        self.discipline
    }

    /// `draft` is expected to have had bullets and inline formatting stripped already.
    pub async fn review(
        &self,
        question: &str,
        draft: &str,
        budget: LineBudget,
        params: &CompletionParams,
    ) -> ReviewOutcome {
        let instructions = match self.discipline {
            ReviewDiscipline::Off => return ReviewOutcome::Disabled,
            ReviewDiscipline::MicroTurn if draft.trim().is_empty() => {
                return ReviewOutcome::NotApplicable
            }
            ReviewDiscipline::FixedSection if !style::has_fixed_sections(draft) => {
                return ReviewOutcome::NotApplicable
            }
            ReviewDiscipline::MicroTurn => &self.instructions.micro_turn,
            ReviewDiscipline::FixedSection => &self.instructions.fixed_section,
        };

        match self.try_review(instructions, question, draft, budget, params).await {
            Ok(revised) => {
                debug!(event_name = "review.accepted", discipline = ?self.discipline);
                ReviewOutcome::Revised(revised)
            }
            Err(error) => {
                warn!(
                    event_name = "review.fallback",
                    discipline = ?self.discipline,
                    reason_code = error.reason_code(),
                    error = %error,
                    "review discarded; keeping unreviewed draft"
                );
                ReviewOutcome::Fallback { reason_code: error.reason_code() }
            }
        }
    }

    async fn try_review(
        &self,
        instructions: &str,
        question: &str,
        draft: &str,
        budget: LineBudget,
        params: &CompletionParams,
    ) -> Result<String, ReviewError> {
        let system = Turn::system(instructions).map_err(|_| ReviewError::EmptyInstructions)?;
        let request = self.render_request(question, draft)?;
        let user = Turn::user(request).map_err(|error| ReviewError::Template(error.to_string()))?;
        let plan = PromptPlan::new(&[system], &[user]);

        let completion = self.backend.complete(&plan, params).await?;
        let revised = style::strip_formatting(&completion.text);
        self.check(draft, &revised, budget)?;
        Ok(revised)
    }

    fn render_request(&self, question: &str, draft: &str) -> Result<String, ReviewError> {
        let mut context = Context::new();
        context.insert("question", question);
        context.insert("draft", draft);
        Tera::one_off(&self.instructions.request_template, &context, false)
            .map_err(|error| ReviewError::Template(error.to_string()))
    }

    fn check(&self, draft: &str, revised: &str, budget: LineBudget) -> Result<(), ReviewError> {
        if revised.trim().is_empty() {
            return Err(ReviewError::Rejected { reason_code: "review_empty" });
        }

        match self.discipline {
            ReviewDiscipline::MicroTurn => {
                if !style::fits_budget(revised, budget) {
                    return Err(ReviewError::Rejected { reason_code: "review_over_budget" });
                }
                if style::has_question_line(draft) && !style::has_question_line(revised) {
                    return Err(ReviewError::Rejected { reason_code: "review_lost_question" });
                }
            }
            ReviewDiscipline::FixedSection => {
                if !style::has_fixed_sections(revised) {
                    return Err(ReviewError::Rejected { reason_code: "review_lost_sections" });
                }
            }
            ReviewDiscipline::Off => {}
        }

        Ok(())
    }
}
