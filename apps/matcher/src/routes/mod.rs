pub mod health;
pub mod matches;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/matches/batch", post(matches::handle_match_batch))
        .route("/api/v1/matches/user", post(matches::handle_match_user))
        .with_state(state)
}
