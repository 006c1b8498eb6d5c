//! Coaching engine side of the pipeline: the backend seam, the optional review pass,
//! and the runtime that strings assembly, completion and formatting together.

pub mod llm;
pub mod review;
pub mod runtime;

pub use llm::{
    BackendError, CoachingBackend, Completion, CompletionParams, OpenAiCompatibleBackend,
    ScriptedBackend,
};
pub use review::{ReviewError, ReviewOutcome, Reviewer};
pub use runtime::{CoachReply, CoachingRuntime, EMPTY_ANSWER_PLACEHOLDER};
