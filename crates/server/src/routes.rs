use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{coach, feedback, health};

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(coach::router())
        .merge(feedback::router())
        .merge(health::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
