//! Rule-based fallback tiers. Deterministic and I/O-free.
//!
//! - robust: scored, cut off, sorted, truncated to `max_matches`
//! - emergency: most recently posted jobs with a fixed low confidence
//!
//! Neither tier invents matches when its input gives it nothing to return;
//! escalation between tiers is the orchestrator's job.

use thiserror::Error;
use uuid::Uuid;

use crate::matching::scoring::ScoringService;
use crate::models::{Job, MatchResult, Provenance, UserPreferences};

pub const EMERGENCY_REASON: &str = "Recent opportunity";
pub const SYNTHETIC_REASON: &str = "Fallback match";

#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("malformed job data: {0}")]
    MalformedJob(String),
}

#[derive(Debug, Clone)]
pub struct FallbackMatchingService {
    scoring: ScoringService,
}

impl FallbackMatchingService {
    pub fn new(scoring: ScoringService) -> Self {
        Self { scoring }
    }

    /// Scores every gate-passing job, keeps those at or above the cutoff, and
    /// returns at most `max_matches`, best first. Ties keep input order.
    ///
    /// Returns an empty list when nothing passes; a job whose result fails
    /// validation aborts the tier with `FallbackError`.
    pub fn robust(
        &self,
        jobs: &[Job],
        user: &UserPreferences,
        session_id: Uuid,
    ) -> Result<Vec<MatchResult>, FallbackError> {
        let config = self.scoring.config();
        let floor = config.effective_confidence_floor();

        self.scoring
            .rank_for_user(jobs, user)
            .into_iter()
            .filter(|scored| scored.score.overall >= config.robust_min_score)
            .take(config.max_matches)
            .map(|scored| {
                let result = self.scoring.build_result(
                    scored.job,
                    scored.score,
                    user,
                    Provenance::Fallback,
                    session_id,
                );
                result
                    .validate(floor)
                    .map_err(|e| FallbackError::MalformedJob(e.to_string()))?;
                Ok(result)
            })
            .collect()
    }

    /// Most recently posted gate-passing jobs, at most `max_emergency_matches`.
    /// When no job passes the gate, the single most recent job overall.
    /// Empty only when `jobs` is empty.
    pub fn emergency(
        &self,
        jobs: &[Job],
        user: &UserPreferences,
        session_id: Uuid,
    ) -> Vec<MatchResult> {
        let config = self.scoring.config();

        let mut eligible: Vec<&Job> = jobs.iter().filter(|j| j.passes_gate()).collect();
        eligible.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));

        let picked: Vec<&Job> = if eligible.is_empty() {
            most_recent(jobs).into_iter().collect()
        } else {
            eligible
                .into_iter()
                .take(config.max_emergency_matches)
                .collect()
        };

        let confidence = config
            .emergency_confidence
            .max(config.effective_confidence_floor());

        picked
            .into_iter()
            .map(|job| {
                self.fixed_confidence_result(
                    job,
                    user,
                    session_id,
                    Provenance::Emergency,
                    confidence,
                    EMERGENCY_REASON,
                    "recent",
                )
            })
            .collect()
    }

    /// Terminal safety net: one minimal match at the lowest acceptable
    /// confidence. Provenance stays `emergency`.
    pub fn synthetic_single_match(
        &self,
        job: &Job,
        user: &UserPreferences,
        session_id: Uuid,
    ) -> MatchResult {
        let floor = self.scoring.config().effective_confidence_floor();
        self.fixed_confidence_result(
            job,
            user,
            session_id,
            Provenance::Emergency,
            floor,
            SYNTHETIC_REASON,
            "fallback-match",
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn fixed_confidence_result(
        &self,
        job: &Job,
        user: &UserPreferences,
        session_id: Uuid,
        provenance: Provenance,
        confidence: f64,
        reason: &str,
        tag: &str,
    ) -> MatchResult {
        let score = self.scoring.score(job, user);
        MatchResult {
            job: job.clone(),
            quality: self.scoring.config().quality.classify(score.overall),
            score,
            confidence,
            reason: reason.to_string(),
            reason_tags: vec![tag.to_string()],
            provenance,
            session_id,
        }
    }
}

/// Latest `posted_at`; the earliest position wins a tie.
fn most_recent(jobs: &[Job]) -> Option<&Job> {
    jobs.iter()
        .reduce(|best, job| if job.posted_at > best.posted_at { job } else { best })
}
