use serde::Serialize;
use uuid::Uuid;

use crate::matching::orchestrator::UserMatchOutcome;
use crate::models::Provenance;

/// Per-session counters for operational dashboards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub users_total: usize,
    pub ai_successes: usize,
    pub fallback_used: usize,
    pub emergency_used: usize,
    pub cache_hits: usize,
    /// Users whose task died; they are reported with an empty match list.
    pub failed_users: usize,
    /// Emails never started because the run was cancelled.
    pub skipped: Vec<String>,
    pub total_matches: usize,
    pub elapsed_ms: u64,
}

impl SessionSummary {
    pub fn new(session_id: Uuid, users_total: usize) -> Self {
        Self {
            session_id,
            users_total,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: &UserMatchOutcome) {
        if outcome.ai_success {
            self.ai_successes += 1;
        }
        if outcome.fallback_used {
            self.fallback_used += 1;
        }
        if outcome.provenance == Some(Provenance::Emergency) {
            self.emergency_used += 1;
        }
        if outcome.cache_hit {
            self.cache_hits += 1;
        }
        self.total_matches += outcome.matches.len();
    }

    pub fn record_failure(&mut self) {
        self.failed_users += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(ai: bool, provenance: Option<Provenance>, cache_hit: bool) -> UserMatchOutcome {
        UserMatchOutcome {
            user: "a@example.com".to_string(),
            matches: vec![],
            ai_success: ai,
            fallback_used: !ai,
            provenance,
            cache_hit,
            errors: vec![],
            latency_ms: 1,
        }
    }

    #[test]
    fn test_record_counts_each_tier() {
        let mut summary = SessionSummary::new(Uuid::nil(), 4);
        summary.record(&outcome(true, Some(Provenance::Ai), true));
        summary.record(&outcome(true, Some(Provenance::Ai), false));
        summary.record(&outcome(false, Some(Provenance::Fallback), false));
        summary.record(&outcome(false, Some(Provenance::Emergency), false));
        summary.record_failure();

        assert_eq!(summary.users_total, 4);
        assert_eq!(summary.ai_successes, 2);
        assert_eq!(summary.fallback_used, 2);
        assert_eq!(summary.emergency_used, 1);
        assert_eq!(summary.cache_hits, 1);
        assert_eq!(summary.failed_users, 1);
    }
}
