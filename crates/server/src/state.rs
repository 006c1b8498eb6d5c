use std::sync::Arc;

use coachline_agent::{CoachingBackend, CoachingRuntime, CompletionParams};
use coachline_core::config::AppConfig;
use coachline_core::prompt::{CoachingProfile, PromptAssembler};
use coachline_db::{BlobStore, TelemetryRecorder};

/// Shared, read-only request context. Nothing in here is mutated per request.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<CoachingRuntime>,
    pub recorder: TelemetryRecorder,
}

impl AppState {
    pub fn new(runtime: Arc<CoachingRuntime>, recorder: TelemetryRecorder) -> Self {
        Self { runtime, recorder }
    }

    pub fn from_parts(
        config: &AppConfig,
        profile: CoachingProfile,
        backend: Arc<dyn CoachingBackend>,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        let runtime = CoachingRuntime::new(
            PromptAssembler::new(Arc::new(profile)),
            backend,
            config.review.discipline,
            CompletionParams::from_config(&config.llm),
        );
        let recorder = TelemetryRecorder::from_config(store, &config.telemetry);
        Self::new(Arc::new(runtime), recorder)
    }
}
