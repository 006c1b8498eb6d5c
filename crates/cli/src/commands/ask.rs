use std::sync::Arc;

use coachline_agent::{CoachingBackend, CoachingRuntime, CompletionParams, OpenAiCompatibleBackend};
use coachline_core::config::{AppConfig, LoadOptions};
use coachline_core::normalize::{normalize, ConversationInput};
use coachline_core::prompt::{CoachingProfile, PromptAssembler};
use serde_json::json;

use crate::commands::{block_on_runtime, CommandResult};

pub fn run(question: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let backend = match OpenAiCompatibleBackend::from_config(&config.llm) {
        Ok(backend) => backend,
        Err(error) => return CommandResult::failure("ask", "backend_init", error.to_string(), 5),
    };

    run_with_backend(&config, Arc::new(backend), question)
}

/// Runs the pipeline once without recording telemetry.
pub fn run_with_backend(
    config: &AppConfig,
    backend: Arc<dyn CoachingBackend>,
    question: &str,
) -> CommandResult {
    let profile = match &config.profile.path {
        Some(path) => match CoachingProfile::load(path) {
            Ok(profile) => profile,
            Err(error) => {
                return CommandResult::failure("ask", "profile_load", error.to_string(), 4)
            }
        },
        None => CoachingProfile::builtin(),
    };

    let input = match normalize(ConversationInput::Question(question.to_string())) {
        Ok(input) => input,
        Err(error) => return CommandResult::failure("ask", "invalid_input", error.to_string(), 6),
    };

    let runtime = match block_on_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let coaching = CoachingRuntime::new(
        PromptAssembler::new(Arc::new(profile)),
        backend,
        config.review.discipline,
        CompletionParams::from_config(&config.llm),
    );

    match runtime.block_on(coaching.coach(&input, "cli")) {
        Ok(reply) => CommandResult::success_with(
            "ask",
            reply.answer,
            Some(json!({
                "model": &config.llm.model,
                "line_budget": reply.budget.lines(),
                "review": reply.review.label(),
                "usage": reply.usage,
            })),
        ),
        Err(error) => CommandResult::failure("ask", "backend", error.to_string(), 5),
    }
}
