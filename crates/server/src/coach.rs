use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header::USER_AGENT, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use coachline_core::errors::ApplicationError;
use coachline_core::normalize::{normalize, CoachRequest};
use coachline_core::telemetry::{CoachExchange, ExchangeFacts, LogRecord};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{plain_text, use_post};
use crate::state::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CoachResponse {
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/coach", post(coach).fallback(use_post))
}

pub async fn coach(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    match handle(&state, &headers, &body, &correlation_id).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(error) => plain_text(&error.into_interface(correlation_id)),
    }
}

async fn handle(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    correlation_id: &str,
) -> Result<CoachResponse, ApplicationError> {
    let request = CoachRequest::from_slice(body)?;
    let input = normalize(request.input)?;
    let reply = state.runtime.coach(&input, correlation_id).await?;

    let record = CoachExchange::build(
        ExchangeFacts {
            correlation_id,
            input: &input,
            answer: &reply.answer,
            user_agent: user_agent(headers),
            model: &state.runtime.params().model,
            mode: request.mode.as_deref(),
            review: reply.review.label(),
            usage: reply.usage,
        },
        state.recorder.policy(),
        Utc::now(),
    );
    state.recorder.spawn(LogRecord::Coach(record), correlation_id.to_string());

    Ok(CoachResponse { answer: reply.answer, id: reply.completion_id })
}

pub fn user_agent(headers: &HeaderMap) -> &str {
    headers.get(USER_AGENT).and_then(|value| value.to_str().ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use coachline_agent::{BackendError, Completion, ScriptedBackend};
    use coachline_core::config::AppConfig;
    use coachline_core::domain::conversation::Role;
    use coachline_core::prompt::CoachingProfile;
    use coachline_core::telemetry::UsageMetadata;
    use coachline_db::{BlobStore, InMemoryBlobStore};
    use tower::ServiceExt;

    use crate::routes::router;
    use crate::state::AppState;

    fn app(backend: Arc<ScriptedBackend>, store: Arc<InMemoryBlobStore>) -> axum::Router {
        let state =
            AppState::from_parts(&AppConfig::default(), CoachingProfile::builtin(), backend, store);
        router(state)
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/api/coach")
            .header("content-type", "application/json")
            .header("user-agent", "coach-test/1.0")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    async fn wait_for_records(store: &InMemoryBlobStore, expected: u64) -> u64 {
        for _ in 0..50 {
            let count = store.count(None).await.expect("count");
            if count >= expected {
                return count;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        store.count(None).await.expect("count")
    }

    #[tokio::test]
    async fn vague_question_gets_single_clarifying_question() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .push_reply("Q: What does difficult look like in practice?\nThen we can plan.")
            .await;
        let store = Arc::new(InMemoryBlobStore::new());

        let response = app(backend, store.clone())
            .oneshot(post_json(r#"{"question":"Employee is being difficult."}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let payload: serde_json::Value =
            serde_json::from_str(&body_text(response).await).expect("json body");
        assert_eq!(payload["answer"], "Q: What does difficult look like in practice?");

        assert_eq!(wait_for_records(&store, 1).await, 1);
        let stored = store.snapshot().await;
        assert!(stored[0].key.starts_with("development/"));
        assert!(stored[0].body.contains("coach-test/1.0"));
    }

    #[tokio::test]
    async fn completion_id_is_returned_and_usage_is_recorded() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .push_completion(Completion {
                text: "Agree one weekly number.".to_string(),
                id: Some("chatcmpl-7".to_string()),
                usage: Some(UsageMetadata {
                    prompt_tokens: Some(300),
                    completion_tokens: Some(12),
                    total_tokens: Some(312),
                }),
            })
            .await;
        let store = Arc::new(InMemoryBlobStore::new());

        let response = app(backend, store.clone())
            .oneshot(post_json(r#"{"question":"Sales are flat","mode":"brief"}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let payload: serde_json::Value =
            serde_json::from_str(&body_text(response).await).expect("json body");
        assert_eq!(payload["answer"], "Agree one weekly number.");
        assert_eq!(payload["id"], "chatcmpl-7");

        assert_eq!(wait_for_records(&store, 1).await, 1);
        let stored = store.snapshot().await;
        let record: serde_json::Value =
            serde_json::from_str(&stored[0].body).expect("stored record is json");
        assert_eq!(record["usage"]["total_tokens"], 312);
        assert_eq!(record["mode"], "brief");
        assert_eq!(record["review"], "off");
    }

    #[tokio::test]
    async fn messages_are_forwarded_after_fixed_turns() {
        let backend = Arc::new(ScriptedBackend::replying("Book the conversation this week."));
        let store = Arc::new(InMemoryBlobStore::new());
        let body = r#"{"messages":[
            {"role":"user","content":"My report is late again."},
            {"role":"assistant","content":"Q: How often?"},
            {"role":"user","content":"new question"}
        ]}"#;

        let response =
            app(backend.clone(), store).oneshot(post_json(body)).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let calls = backend.calls().await;
        let plan = &calls[0].0;
        let fixed = CoachingProfile::builtin().fixed_turns().len();
        assert_eq!(plan.len(), fixed + 3);
        let live: Vec<(Role, &str)> =
            plan.live_turns().iter().map(|turn| (turn.role, turn.content.as_str())).collect();
        assert_eq!(
            live,
            vec![
                (Role::User, "My report is late again."),
                (Role::Assistant, "Q: How often?"),
                (Role::User, "new question"),
            ]
        );
    }

    #[tokio::test]
    async fn non_post_methods_get_use_post() {
        let backend = Arc::new(ScriptedBackend::new());
        let store = Arc::new(InMemoryBlobStore::new());

        let response = app(backend.clone(), store)
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/api/coach")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_text(response).await, "Use POST");
        assert!(backend.calls().await.is_empty());
    }

    #[tokio::test]
    async fn backend_failure_is_internal_error_without_record() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_error(BackendError::Transport("connection refused".to_string())).await;
        let store = Arc::new(InMemoryBlobStore::new());

        let response = app(backend, store.clone())
            .oneshot(post_json(r#"{"question":"Help"}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_text(response).await;
        assert_eq!(body, "Internal error");
        assert!(!body.contains("connection refused"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.count(None).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn conflicting_and_empty_inputs_are_bad_requests() {
        for body in [
            r#"{"question":"a","messages":[{"role":"user","content":"b"}]}"#,
            r#"{"question":"   "}"#,
            r#"{}"#,
            "not json",
        ] {
            let backend = Arc::new(ScriptedBackend::new());
            let store = Arc::new(InMemoryBlobStore::new());

            let response =
                app(backend.clone(), store).oneshot(post_json(body)).await.expect("response");

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
            assert!(!body_text(response).await.is_empty());
            assert!(backend.calls().await.is_empty());
        }
    }
}
