use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use coachline_db::BlobStore;
use serde::Serialize;

use crate::state::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub blob_store: HealthCheck,
    pub checked_at: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let blob_store = blob_store_check(state.recorder.store().as_ref()).await;
    let ready = blob_store.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: format!(
                "coachline-server runtime initialized (review: {:?})",
                state.runtime.review_discipline()
            ),
        },
        blob_store,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn blob_store_check(store: &dyn BlobStore) -> HealthCheck {
    match store.ping().await {
        Ok(()) => HealthCheck { status: "ready", detail: "blob store reachable".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("blob store check failed: {error}") }
        }
    }
}
