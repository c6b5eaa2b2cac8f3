//! Matcher Orchestrator: per-user tier state machine and batch fan-out.
//!
//! Per user: AI → robust fallback → emergency fallback → synthetic single match.
//! Every tier error is recorded on the outcome and turned into a transition;
//! nothing below `match_with_strategy(AiOnly)` surfaces an error to the caller.
//!
//! Batches run users on a bounded pool. A user whose task dies gets an empty
//! match list and the rest of the batch carries on.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditMatchRow, MatchAuditSink, UserAuditRecord};
use crate::matching::ai::{AiMatchError, AiMatcher, AiRanking};
use crate::matching::config::MatchingConfig;
use crate::matching::fallback::FallbackMatchingService;
use crate::matching::scoring::ScoringService;
use crate::matching::summary::SessionSummary;
use crate::models::{InvalidMatch, Job, MatchResult, Provenance, UserPreferences};

pub const NO_JOBS_ERROR: &str = "No jobs available for matching";
pub const DUPLICATE_USER_ERROR: &str = "duplicate email in batch";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// AI tier only; its failure is returned to the caller.
    AiOnly,
    /// Skip AI entirely.
    FallbackOnly,
    #[default]
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserMatchOutcome {
    /// The user's email.
    pub user: String,
    pub matches: Vec<MatchResult>,
    pub ai_success: bool,
    pub fallback_used: bool,
    /// Tier that produced `matches`; `None` when there are none.
    pub provenance: Option<Provenance>,
    pub cache_hit: bool,
    pub errors: Vec<String>,
    pub latency_ms: u64,
}

impl UserMatchOutcome {
    fn empty(user: &str) -> Self {
        Self {
            user: user.to_string(),
            matches: Vec::new(),
            ai_success: false,
            fallback_used: false,
            provenance: None,
            cache_hit: false,
            errors: Vec::new(),
            latency_ms: 0,
        }
    }

    fn accept(&mut self, matches: Vec<MatchResult>, provenance: Provenance) {
        self.matches = matches;
        self.provenance = Some(provenance);
    }

    fn accept_ai(&mut self, ranking: AiRanking) {
        self.ai_success = true;
        self.cache_hit = ranking.cache_hit;
        self.accept(ranking.matches, Provenance::Ai);
    }
}

/// A user turned away by input validation before the pipeline ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedUser {
    /// Position in the submitted user list.
    pub index: usize,
    pub email: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub session_id: Uuid,
    /// Email → matches, one key per accepted user.
    pub matches: BTreeMap<String, Vec<MatchResult>>,
    pub summary: SessionSummary,
    pub rejected: Vec<RejectedUser>,
}

#[derive(Clone)]
pub struct MatcherOrchestrator {
    ai: Arc<dyn AiMatcher>,
    scoring: ScoringService,
    fallback: FallbackMatchingService,
    audit: Arc<dyn MatchAuditSink>,
}

impl MatcherOrchestrator {
    pub fn new(
        ai: Arc<dyn AiMatcher>,
        scoring: ScoringService,
        audit: Arc<dyn MatchAuditSink>,
    ) -> Self {
        Self {
            ai,
            fallback: FallbackMatchingService::new(scoring.clone()),
            scoring,
            audit,
        }
    }

    pub fn config(&self) -> &MatchingConfig {
        self.scoring.config()
    }

    // ─── Single user ─────────────────────────────────────────────────────────

    /// Runs the full tier chain for one user. Never fails: errors end up in
    /// `outcome.errors`. Zero matches only when `jobs` is empty or the user
    /// fails validation.
    pub async fn match_one_user(&self, user: &UserPreferences, jobs: &[Job]) -> UserMatchOutcome {
        let session_id = Uuid::new_v4();
        let outcome = self.match_in_session(user, jobs, session_id, true).await;
        self.ai.end_run(session_id);
        outcome
    }

    /// A user that fails validation is an error here for every strategy; the
    /// pipeline never runs for them.
    pub async fn match_with_strategy(
        &self,
        user: &UserPreferences,
        jobs: &[Job],
        strategy: Strategy,
    ) -> Result<UserMatchOutcome, AiMatchError> {
        user.validate()?;

        let session_id = Uuid::new_v4();
        let result = match strategy {
            Strategy::Hybrid => Ok(self.match_in_session(user, jobs, session_id, true).await),
            Strategy::FallbackOnly => {
                Ok(self.match_in_session(user, jobs, session_id, false).await)
            }
            Strategy::AiOnly => self.match_ai_only(user, jobs, session_id).await,
        };
        self.ai.end_run(session_id);
        result
    }

    async fn match_ai_only(
        &self,
        user: &UserPreferences,
        jobs: &[Job],
        session_id: Uuid,
    ) -> Result<UserMatchOutcome, AiMatchError> {
        let started = Instant::now();
        let ranking = self.try_ai(user, jobs, session_id).await?;
        let mut outcome = UserMatchOutcome::empty(&user.email);
        outcome.accept_ai(ranking);
        Ok(self.finish(outcome, session_id, started).await)
    }

    async fn match_in_session(
        &self,
        user: &UserPreferences,
        jobs: &[Job],
        session_id: Uuid,
        try_ai: bool,
    ) -> UserMatchOutcome {
        let started = Instant::now();
        let mut outcome = UserMatchOutcome::empty(&user.email);

        if let Err(e) = user.validate() {
            outcome.errors.push(e.to_string());
            return outcome;
        }

        self.run_tiers(&mut outcome, user, jobs, session_id, try_ai)
            .await;
        self.finish(outcome, session_id, started).await
    }

    async fn run_tiers(
        &self,
        outcome: &mut UserMatchOutcome,
        user: &UserPreferences,
        jobs: &[Job],
        session_id: Uuid,
        try_ai: bool,
    ) {
        if jobs.is_empty() {
            warn!(user = %user.email, "no jobs available for matching");
            outcome.errors.push(NO_JOBS_ERROR.to_string());
            return;
        }

        if try_ai {
            match self.try_ai(user, jobs, session_id).await {
                Ok(ranking) => {
                    outcome.accept_ai(ranking);
                    return;
                }
                Err(e) => {
                    warn!(user = %user.email, error = %e, "AI tier failed, trying robust fallback");
                    outcome.errors.push(format!("ai: {e}"));
                }
            }
        }

        outcome.fallback_used = true;

        match self.fallback.robust(jobs, user, session_id) {
            Ok(matches) if !matches.is_empty() => {
                outcome.accept(matches, Provenance::Fallback);
                return;
            }
            Ok(_) => {
                warn!(user = %user.email, "robust fallback found nothing above cutoff, trying emergency");
            }
            Err(e) => {
                warn!(user = %user.email, error = %e, "robust fallback failed, trying emergency");
                outcome.errors.push(format!("robust: {e}"));
            }
        }

        match self.checked(self.fallback.emergency(jobs, user, session_id)) {
            Ok(matches) if !matches.is_empty() => {
                outcome.accept(matches, Provenance::Emergency);
                return;
            }
            Ok(_) => {
                warn!(user = %user.email, "emergency fallback returned nothing");
            }
            Err(e) => {
                warn!(user = %user.email, error = %e, "emergency fallback produced an invalid match");
                outcome.errors.push(format!("emergency: {e}"));
            }
        }

        let job = jobs
            .iter()
            .find(|j| !j.job_hash.trim().is_empty())
            .or_else(|| jobs.first());
        if let Some(job) = job {
            warn!(user = %user.email, job_hash = %job.job_hash, "using synthetic single match");
            let synthetic = self.fallback.synthetic_single_match(job, user, session_id);
            outcome.accept(vec![synthetic], Provenance::Emergency);
        }
    }

    async fn try_ai(
        &self,
        user: &UserPreferences,
        jobs: &[Job],
        session_id: Uuid,
    ) -> Result<AiRanking, AiMatchError> {
        let ranking = self.ai.rank(jobs, user, session_id).await?;
        let matches = self
            .checked(ranking.matches)
            .map_err(|e| AiMatchError::Malformed(e.to_string()))?;
        if matches.is_empty() {
            return Err(AiMatchError::Malformed("no usable matches".to_string()));
        }
        Ok(AiRanking {
            matches,
            cache_hit: ranking.cache_hit,
        })
    }

    /// Tier boundary check: every match must hold the result invariants.
    fn checked(&self, matches: Vec<MatchResult>) -> Result<Vec<MatchResult>, InvalidMatch> {
        let floor = self.config().effective_confidence_floor();
        for m in &matches {
            m.validate(floor)?;
        }
        Ok(matches)
    }

    async fn finish(
        &self,
        mut outcome: UserMatchOutcome,
        session_id: Uuid,
        started: Instant,
    ) -> UserMatchOutcome {
        outcome.latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            %session_id,
            user = %outcome.user,
            provenance = outcome.provenance.map(|p| p.as_str()).unwrap_or("none"),
            matches = outcome.matches.len(),
            ai_success = outcome.ai_success,
            cache_hit = outcome.cache_hit,
            latency_ms = outcome.latency_ms,
            "user matched"
        );

        let record = UserAuditRecord {
            session_id,
            user_email: outcome.user.clone(),
            provenance: outcome.provenance,
            ai_success: outcome.ai_success,
            fallback_used: outcome.fallback_used,
            cache_hit: outcome.cache_hit,
            latency_ms: outcome.latency_ms,
            match_count: outcome.matches.len(),
            matches: outcome.matches.iter().map(AuditMatchRow::from).collect(),
        };
        if let Err(e) = self.audit.record(&record).await {
            warn!(user = %outcome.user, error = %e, "audit sink failed");
        }

        outcome
    }

    // ─── Batch ───────────────────────────────────────────────────────────────

    pub async fn match_users(&self, users: &[UserPreferences], jobs: &[Job]) -> BatchOutcome {
        self.match_users_until_cancelled(users, jobs, CancellationToken::new())
            .await
    }

    /// Like `match_users`, but stops starting new users once `cancel` fires.
    /// Users already running finish; the rest are listed in `summary.skipped`.
    pub async fn match_users_until_cancelled(
        &self,
        users: &[UserPreferences],
        jobs: &[Job],
        cancel: CancellationToken,
    ) -> BatchOutcome {
        let started = Instant::now();
        let session_id = Uuid::new_v4();
        self.ai.begin_run(session_id);

        let mut summary = SessionSummary::new(session_id, users.len());
        let mut rejected = Vec::new();
        let mut accepted = Vec::with_capacity(users.len());
        let mut seen: HashSet<&str> = HashSet::with_capacity(users.len());
        for (index, user) in users.iter().enumerate() {
            let verdict = match user.validate() {
                Err(e) => Err(e.to_string()),
                Ok(()) if !seen.insert(user.email.as_str()) => {
                    Err(DUPLICATE_USER_ERROR.to_string())
                }
                Ok(()) => Ok(()),
            };
            match verdict {
                Ok(()) => accepted.push(user.clone()),
                Err(error) => {
                    warn!(index, error = %error, "rejecting user");
                    rejected.push(RejectedUser {
                        index,
                        email: user.email.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            %session_id,
            users = accepted.len(),
            rejected = rejected.len(),
            jobs = jobs.len(),
            "match session started"
        );

        let jobs: Arc<[Job]> = Arc::from(jobs);
        let semaphore = Arc::new(Semaphore::new(self.config().batch_concurrency));
        let mut handles: Vec<(String, JoinHandle<UserMatchOutcome>)> =
            Vec::with_capacity(accepted.len());
        let mut pending = accepted.into_iter();

        for user in pending.by_ref() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                summary.skipped.push(user.email);
                break;
            };

            let this = self.clone();
            let jobs = Arc::clone(&jobs);
            let email = user.email.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                this.match_in_session(&user, &jobs, session_id, true).await
            });
            handles.push((email, handle));
        }
        summary.skipped.extend(pending.map(|u| u.email));
        if !summary.skipped.is_empty() {
            warn!(%session_id, skipped = summary.skipped.len(), "match session cancelled");
        }

        let mut matches = BTreeMap::new();
        for (email, handle) in handles {
            match handle.await {
                Ok(outcome) => {
                    summary.record(&outcome);
                    matches.insert(email, outcome.matches);
                }
                Err(e) => {
                    error!(%session_id, user = %email, error = %e, "user task failed");
                    summary.record_failure();
                    matches.insert(email, Vec::new());
                }
            }
        }

        self.ai.end_run(session_id);
        summary.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            %session_id,
            users = summary.users_total,
            ai_successes = summary.ai_successes,
            fallback_used = summary.fallback_used,
            emergency_used = summary.emergency_used,
            cache_hits = summary.cache_hits,
            failed = summary.failed_users,
            skipped = summary.skipped.len(),
            elapsed_ms = summary.elapsed_ms,
            "match session finished"
        );

        BatchOutcome {
            session_id,
            matches,
            summary,
            rejected,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
