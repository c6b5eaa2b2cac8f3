//! AI Matching: ranks a user's candidate jobs through an external language model.
//!
//! Flow: rule-based prefilter → fingerprint → cache lookup → (miss) one bounded
//! backend call → validate + coerce → cache insert → results tagged `ai`.
//!
//! This tier fails fast. Any timeout, malformed response or transport error is
//! returned as an `AiMatchError` and the orchestrator moves to the fallback tiers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::ValidationError;
use crate::llm_client::prompts::REFERENCE_INSTRUCTION;
use crate::llm_client::{LlmClient, LlmError};
use crate::matching::cache::{fingerprint, CachedRanking, ResultCache};
use crate::matching::prompts::{RANKING_PROMPT_TEMPLATE, RANKING_SYSTEM};
use crate::matching::scoring::ScoringService;
use crate::models::{Job, MatchResult, Provenance, UserPreferences};

#[derive(Debug, Error)]
pub enum AiMatchError {
    #[error("AI ranking timed out after {0}s")]
    Timeout(u64),

    #[error("malformed AI response: {0}")]
    Malformed(String),

    #[error("AI provider quota exceeded")]
    QuotaExceeded,

    #[error("AI call budget of {0} calls exhausted for this run")]
    BudgetExhausted(u32),

    #[error("no eligible jobs to send for AI ranking")]
    NoCandidates,

    #[error("AI backend error: {0}")]
    Backend(LlmError),

    #[error(transparent)]
    InvalidUser(#[from] ValidationError),
}

impl From<LlmError> for AiMatchError {
    fn from(err: LlmError) -> Self {
        match err {
            e if e.is_rate_limited() => AiMatchError::QuotaExceeded,
            LlmError::Parse(e) => AiMatchError::Malformed(e.to_string()),
            LlmError::EmptyContent => AiMatchError::Malformed("empty content".to_string()),
            other => AiMatchError::Backend(other),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Backend seam
// ────────────────────────────────────────────────────────────────────────────

/// One entry of the backend's ranked list, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedJobRef {
    pub job_hash: String,
    pub score: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingResponse {
    pub matches: Vec<RankedJobRef>,
}

/// The external ranking call. Implement this to swap providers.
#[async_trait]
pub trait RankingBackend: Send + Sync {
    async fn rank(
        &self,
        jobs: &[&Job],
        user: &UserPreferences,
        max_matches: usize,
    ) -> Result<RankingResponse, AiMatchError>;
}

/// Ranking through Claude via `LlmClient`.
pub struct LlmRankingBackend {
    llm: LlmClient,
}

impl LlmRankingBackend {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl RankingBackend for LlmRankingBackend {
    async fn rank(
        &self,
        jobs: &[&Job],
        user: &UserPreferences,
        max_matches: usize,
    ) -> Result<RankingResponse, AiMatchError> {
        let prompt = build_ranking_prompt(jobs, user, max_matches)?;
        Ok(self
            .llm
            .call_json::<RankingResponse>(&prompt, RANKING_SYSTEM)
            .await?)
    }
}

fn build_ranking_prompt(
    jobs: &[&Job],
    user: &UserPreferences,
    max_matches: usize,
) -> Result<String, AiMatchError> {
    let user_json = serde_json::to_string_pretty(&json!({
        "target_cities": user.target_cities,
        "career_path": user.career_path,
        "roles_selected": user.roles_selected,
        "languages_spoken": user.languages_spoken,
        "company_types": user.company_types,
        "experience_tier": user.experience_tier,
    }))
    .map_err(|e| AiMatchError::Malformed(format!("failed to serialize user: {e}")))?;

    let jobs_json = serde_json::to_string_pretty(
        &jobs
            .iter()
            .map(|job| {
                json!({
                    "job_hash": job.job_hash,
                    "title": job.title,
                    "company": job.company,
                    "location": job.location,
                    "tags": job.tags,
                })
            })
            .collect::<Vec<_>>(),
    )
    .map_err(|e| AiMatchError::Malformed(format!("failed to serialize jobs: {e}")))?;

    Ok(RANKING_PROMPT_TEMPLATE
        .replace("{reference_instruction}", REFERENCE_INSTRUCTION)
        .replace("{max_matches}", &max_matches.to_string())
        .replace("{user_json}", &user_json)
        .replace("{jobs_json}", &jobs_json))
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator seam
// ────────────────────────────────────────────────────────────────────────────

/// AI tier output. `cache_hit` is true when no external call was made.
#[derive(Debug, Clone)]
pub struct AiRanking {
    pub matches: Vec<MatchResult>,
    pub cache_hit: bool,
}

/// What the orchestrator needs from the AI tier.
#[async_trait]
pub trait AiMatcher: Send + Sync {
    async fn rank(
        &self,
        jobs: &[Job],
        user: &UserPreferences,
        session_id: Uuid,
    ) -> Result<AiRanking, AiMatchError>;

    /// Called once at the start of every batch run.
    fn begin_run(&self, _session_id: Uuid) {}

    /// Releases whatever `begin_run` or `rank` tracked for the session.
    fn end_run(&self, _session_id: Uuid) {}
}

/// Per-session bookkeeping. Overlapping runs never share a budget.
#[derive(Debug, Default)]
struct RunState {
    calls: u32,
    cache_run: Option<u64>,
}

pub struct AiMatchingService {
    backend: Arc<dyn RankingBackend>,
    cache: Arc<ResultCache>,
    scoring: ScoringService,
    runs: Mutex<HashMap<Uuid, RunState>>,
}

impl AiMatchingService {
    pub fn new(
        backend: Arc<dyn RankingBackend>,
        cache: Arc<ResultCache>,
        scoring: ScoringService,
    ) -> Self {
        Self {
            backend,
            cache,
            scoring,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Claims one external call against the session's budget. A session
    /// without `begin_run` is tracked from its first call.
    fn claim_call(&self, session_id: Uuid) -> Result<(), AiMatchError> {
        let mut runs = self.runs.lock();
        let run = runs.entry(session_id).or_default();
        match self.scoring.config().ai_call_budget {
            Some(budget) if run.calls >= budget => Err(AiMatchError::BudgetExhausted(budget)),
            _ => {
                run.calls += 1;
                Ok(())
            }
        }
    }

    fn to_results(
        &self,
        rankings: &[CachedRanking],
        candidates: &[&Job],
        user: &UserPreferences,
        session_id: Uuid,
    ) -> Vec<MatchResult> {
        let by_hash: HashMap<&str, &Job> = candidates
            .iter()
            .map(|job| (job.job_hash.as_str(), *job))
            .collect();

        rankings
            .iter()
            .filter_map(|ranking| {
                let job = by_hash.get(ranking.job_hash.as_str())?;
                let mut score = self.scoring.score(job, user);
                score.overall = ranking.score;
                let mut result =
                    self.scoring
                        .build_result(job, score, user, Provenance::Ai, session_id);
                if !ranking.reason.trim().is_empty() {
                    result.reason = ranking.reason.clone();
                }
                Some(result)
            })
            .collect()
    }
}

#[async_trait]
impl AiMatcher for AiMatchingService {
    async fn rank(
        &self,
        jobs: &[Job],
        user: &UserPreferences,
        session_id: Uuid,
    ) -> Result<AiRanking, AiMatchError> {
        let config = self.scoring.config();

        let candidates: Vec<&Job> = self
            .scoring
            .rank_for_user(jobs, user)
            .into_iter()
            .take(config.ai_max_candidates)
            .map(|scored| scored.job)
            .collect();
        if candidates.is_empty() {
            return Err(AiMatchError::NoCandidates);
        }

        let key = fingerprint(
            candidates.iter().map(|j| j.job_hash.as_str()),
            &user.cluster_key(),
        );

        if let Some(cached) = self.cache.get(&key) {
            debug!(user = %user.email, "AI ranking cache hit");
            return Ok(AiRanking {
                matches: self.to_results(&cached, &candidates, user, session_id),
                cache_hit: true,
            });
        }
        debug!(user = %user.email, "AI ranking cache miss");

        self.claim_call(session_id)?;

        let response = tokio::time::timeout(
            config.ai_timeout(),
            self.backend.rank(&candidates, user, config.max_matches),
        )
        .await
        .map_err(|_| AiMatchError::Timeout(config.ai_timeout_secs))??;

        let rankings = validate_response(
            response,
            &candidates,
            config.minimum_acceptable_score,
            config.max_matches,
        )?;

        info!(
            user = %user.email,
            ranked = rankings.len(),
            candidates = candidates.len(),
            "AI ranking succeeded"
        );

        let matches = self.to_results(&rankings, &candidates, user, session_id);
        self.cache.insert(key, rankings);

        Ok(AiRanking {
            matches,
            cache_hit: false,
        })
    }

    fn begin_run(&self, session_id: Uuid) {
        let cache_run = self.cache.begin_run();
        self.runs.lock().insert(
            session_id,
            RunState {
                calls: 0,
                cache_run: Some(cache_run),
            },
        );
    }

    fn end_run(&self, session_id: Uuid) {
        let run = self.runs.lock().remove(&session_id);
        if let Some(cache_run) = run.and_then(|r| r.cache_run) {
            self.cache.end_run(cache_run);
        }
    }
}

/// Checks every reference against the supplied jobs and coerces scores into
/// `[minimum_acceptable, 100]`. Order is the backend's ranking order.
fn validate_response(
    response: RankingResponse,
    candidates: &[&Job],
    minimum_acceptable: u8,
    max_matches: usize,
) -> Result<Vec<CachedRanking>, AiMatchError> {
    if response.matches.is_empty() {
        return Err(AiMatchError::Malformed("empty ranking".to_string()));
    }

    let known: HashSet<&str> = candidates.iter().map(|j| j.job_hash.as_str()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut rankings = Vec::with_capacity(response.matches.len());

    for entry in response.matches {
        let job_hash = entry.job_hash.trim().to_string();
        if !known.contains(job_hash.as_str()) {
            return Err(AiMatchError::Malformed(format!(
                "unknown job reference '{job_hash}'"
            )));
        }
        if !seen.insert(job_hash.clone()) {
            return Err(AiMatchError::Malformed(format!(
                "duplicate job reference '{job_hash}'"
            )));
        }
        if !entry.score.is_finite() {
            return Err(AiMatchError::Malformed(format!(
                "non-numeric score for '{job_hash}'"
            )));
        }

        let score = entry
            .score
            .round()
            .clamp(f64::from(minimum_acceptable), 100.0) as u8;
        rankings.push(CachedRanking {
            job_hash,
            score,
            reason: entry.reason.unwrap_or_default().trim().to_string(),
        });
    }

    rankings.truncate(max_matches);
    Ok(rankings)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
