use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::matching::{classify, AiMatchError, BatchOutcome, Strategy, UserMatchOutcome};
use crate::models::{Job, MatchResult, UserPreferences};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BatchMatchRequest {
    pub users: Vec<UserPreferences>,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Deserialize)]
pub struct UserMatchRequest {
    pub user: UserPreferences,
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub strategy: Strategy,
}

#[derive(Debug, Serialize)]
pub struct UserMatchResponse {
    #[serde(flatten)]
    pub outcome: UserMatchOutcome,
    /// Job hashes at or above the confident threshold.
    pub confident: Vec<String>,
    pub promising: Vec<String>,
}

/// POST /api/v1/matches/batch
pub async fn handle_match_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchMatchRequest>,
) -> Result<Json<BatchOutcome>, AppError> {
    if req.users.is_empty() {
        return Err(AppError::Validation(
            "At least one user is required".to_string(),
        ));
    }
    let outcome = state.orchestrator.match_users(&req.users, &req.jobs).await;
    Ok(Json(outcome))
}

/// POST /api/v1/matches/user
pub async fn handle_match_user(
    State(state): State<AppState>,
    Json(req): Json<UserMatchRequest>,
) -> Result<Json<UserMatchResponse>, AppError> {
    req.user.validate()?;

    let outcome = state
        .orchestrator
        .match_with_strategy(&req.user, &req.jobs, req.strategy)
        .await
        .map_err(|e| match e {
            AiMatchError::InvalidUser(v) => AppError::from(v),
            other => AppError::Llm(other.to_string()),
        })?;

    let threshold = state.orchestrator.config().confident_threshold;
    let classified = classify(&outcome.matches, threshold);
    let confident = job_hashes(&classified.confident);
    let promising = job_hashes(&classified.promising);

    Ok(Json(UserMatchResponse {
        outcome,
        confident,
        promising,
    }))
}

fn job_hashes(matches: &[&MatchResult]) -> Vec<String> {
    matches.iter().map(|m| m.job.job_hash.clone()).collect()
}
