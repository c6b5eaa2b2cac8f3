//! Scoring Service: pure, deterministic scoring of one job against one user.
//!
//! No I/O and no retries. Malformed jobs (missing title, tags or location)
//! score low instead of failing. Every other tier builds on this module.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ValidationError;
use crate::matching::config::{FreshnessPolicy, MatchingConfig};
use crate::models::{FreshnessTier, Job, MatchResult, MatchScore, Provenance, UserPreferences};

// ────────────────────────────────────────────────────────────────────────────
// Output data models
// ────────────────────────────────────────────────────────────────────────────

/// Human-readable explanation of a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub reason: String,
    pub tags: Vec<String>,
}

/// Outcome of gate + scoring for one job. Ineligible jobs carry no score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub eligible: bool,
    pub score: Option<MatchScore>,
    pub confidence: Option<f64>,
    pub explanation: Option<Explanation>,
}

/// A job paired with its score, borrowed from the caller's job list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredJob<'a> {
    pub job: &'a Job,
    pub score: MatchScore,
}

// ────────────────────────────────────────────────────────────────────────────
// Service
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ScoringService {
    config: Arc<MatchingConfig>,
    /// "Now" for freshness decay. Fixed at construction so scores are reproducible.
    reference_time: DateTime<Utc>,
}

impl ScoringService {
    pub fn new(config: Arc<MatchingConfig>) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            config,
            reference_time: Utc::now(),
        })
    }

    pub fn with_reference_time(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = reference_time;
        self
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Component scores and weighted overall.
    ///
    /// - eligibility: 100 with the early-career tag, else 0 (hard gate, not graded)
    /// - career path: 100 on exact domain match, else the partial-credit value
    /// - location: 100 on exact target-city match, else the partial-credit value
    /// - freshness: per `FreshnessPolicy`, reported but not weighted
    pub fn score(&self, job: &Job, user: &UserPreferences) -> MatchScore {
        let c = &self.config;

        let eligibility = if job.is_early_career() { 100 } else { 0 };
        let career_path = if career_matches(job, user) {
            100
        } else {
            c.career_path_partial
        };
        let location = if location_matches(job, user) {
            100
        } else {
            c.location_partial
        };
        let freshness = self.freshness_score(job);

        let w = &c.weights;
        let weighted = u32::from(eligibility) * w.eligibility
            + u32::from(career_path) * w.career_path
            + u32::from(location) * w.location;
        let overall = (f64::from(weighted) / 100.0).round().clamp(0.0, 100.0) as u8;

        MatchScore {
            eligibility,
            career_path,
            location,
            freshness,
            overall,
        }
    }

    /// Confidence in [floor, 1.0]. Starts at 1.0, loses a penalty for an
    /// uncertain eligibility tag and a larger one per unknown career/location tag.
    pub fn confidence(&self, job: &Job, _user: &UserPreferences) -> f64 {
        let c = &self.config;
        let mut confidence = 1.0_f64;

        if job.is_eligibility_uncertain() {
            confidence -= c.uncertain_eligibility_penalty;
        }
        if job.has_unknown_career() {
            confidence -= c.unknown_tag_penalty;
        }
        if job.has_unknown_location() {
            confidence -= c.unknown_tag_penalty;
        }

        confidence.clamp(c.effective_confidence_floor(), 1.0)
    }

    pub fn explain(&self, job: &Job, score: &MatchScore, user: &UserPreferences) -> Explanation {
        let mut parts = Vec::new();
        let mut tags = Vec::new();

        if score.eligibility == 100 {
            parts.push("Early-career role".to_string());
            tags.push("early-career".to_string());
        } else {
            parts.push("Not tagged as early-career".to_string());
        }

        if score.career_path == 100 {
            let path = user.career_path_normalized().unwrap_or_default();
            parts.push(format!("matches your {path} career path"));
            tags.push("career-match".to_string());
        } else if let Some(domain) = job.career_domain() {
            parts.push(format!("in {domain}"));
        }

        if score.location == 100 {
            parts.push(format!("based in {}", display_location(job)));
            tags.push("location-match".to_string());
        } else {
            parts.push("outside your target cities".to_string());
        }

        if job.freshness_tier == FreshnessTier::UltraFresh {
            tags.push("ultra-fresh".to_string());
        }

        Explanation {
            reason: parts.join(", "),
            tags,
        }
    }

    /// Gate first: a job without a title or without tags is ineligible
    /// regardless of score.
    pub fn evaluate(&self, job: &Job, user: &UserPreferences) -> Evaluation {
        if !job.passes_gate() {
            return Evaluation {
                eligible: false,
                score: None,
                confidence: None,
                explanation: None,
            };
        }

        let score = self.score(job, user);
        let confidence = self.confidence(job, user);
        let explanation = self.explain(job, &score, user);

        Evaluation {
            eligible: true,
            score: Some(score),
            confidence: Some(confidence),
            explanation: Some(explanation),
        }
    }

    /// Gate-passing jobs sorted by overall score, descending.
    ///
    /// The sort is stable: equal scores keep their input order.
    pub fn rank_for_user<'a>(&self, jobs: &'a [Job], user: &UserPreferences) -> Vec<ScoredJob<'a>> {
        let mut ranked: Vec<ScoredJob<'a>> = jobs
            .iter()
            .filter(|job| job.passes_gate())
            .map(|job| ScoredJob {
                job,
                score: self.score(job, user),
            })
            .collect();

        ranked.sort_by(|a, b| b.score.overall.cmp(&a.score.overall));
        ranked
    }

    /// Assembles a full `MatchResult` from rule-based scoring.
    pub fn build_result(
        &self,
        job: &Job,
        score: MatchScore,
        user: &UserPreferences,
        provenance: Provenance,
        session_id: Uuid,
    ) -> MatchResult {
        let explanation = self.explain(job, &score, user);
        MatchResult {
            job: job.clone(),
            quality: self.config.quality.classify(score.overall),
            confidence: self.confidence(job, user),
            reason: explanation.reason,
            reason_tags: explanation.tags,
            score,
            provenance,
            session_id,
        }
    }

    fn freshness_score(&self, job: &Job) -> u8 {
        match self.config.freshness {
            FreshnessPolicy::Constant { baseline } => baseline,
            FreshnessPolicy::Tiered {
                ultra_fresh,
                fresh,
                stale,
            } => match job.freshness_tier {
                FreshnessTier::UltraFresh => ultra_fresh,
                FreshnessTier::Fresh => fresh,
                FreshnessTier::Stale => stale,
            },
            FreshnessPolicy::Decay { half_life_hours } => {
                decayed_freshness(job.posted_at, self.reference_time, half_life_hours)
            }
        }
    }
}

/// 100 × 0.5^(age / half-life). Postings dated in the future score 100.
fn decayed_freshness(posted_at: DateTime<Utc>, now: DateTime<Utc>, half_life_hours: f64) -> u8 {
    let age_hours = (now - posted_at).num_seconds() as f64 / 3600.0;
    if age_hours <= 0.0 {
        return 100;
    }
    (100.0 * 0.5_f64.powf(age_hours / half_life_hours))
        .round()
        .clamp(0.0, 100.0) as u8
}

fn career_matches(job: &Job, user: &UserPreferences) -> bool {
    match (job.career_domain(), user.career_path_normalized()) {
        (Some(domain), Some(path)) => domain == path,
        _ => false,
    }
}

fn location_matches(job: &Job, user: &UserPreferences) -> bool {
    job.location_tag()
        .is_some_and(|city| user.targets_city(&city))
        || user.targets_city(&job.location)
}

fn display_location(job: &Job) -> String {
    if job.location.trim().is_empty() {
        job.location_tag().unwrap_or_default()
    } else {
        job.location.trim().to_string()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::config::ScoringWeights;
    use chrono::{Duration, TimeZone};

    fn make_job(hash: &str, tags: &[&str], location: &str) -> Job {
        Job {
            job_hash: hash.to_string(),
            title: "Graduate Software Engineer".to_string(),
            company: "Acme".to_string(),
            location: location.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            freshness_tier: FreshnessTier::Fresh,
            posted_at: Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap(),
        }
    }

    fn make_user() -> UserPreferences {
        UserPreferences {
            email: "grad@example.com".to_string(),
            target_cities: vec!["London".to_string()],
            career_path: Some("tech".to_string()),
            ..Default::default()
        }
    }

    fn service(config: MatchingConfig) -> ScoringService {
        ScoringService::new(Arc::new(config)).unwrap()
    }

    #[test]
    fn test_perfect_match_scores_100() {
        let job = make_job("j1", &["early-career", "career:tech", "loc:london"], "London");
        let score = service(MatchingConfig::default()).score(&job, &make_user());
        assert_eq!(score.eligibility, 100);
        assert_eq!(score.career_path, 100);
        assert_eq!(score.location, 100);
        assert_eq!(score.overall, 100);
    }

    #[test]
    fn test_partial_credit_is_weighted() {
        // 0*35 + 40*40 + 50*25 = 1600 + 1250 = 2850 → 28.5 → 29
        let job = make_job("j1", &["career:finance"], "Paris");
        let score = service(MatchingConfig::default()).score(&job, &make_user());
        assert_eq!(score.eligibility, 0);
        assert_eq!(score.career_path, 40);
        assert_eq!(score.location, 50);
        assert_eq!(score.overall, 29);
    }

    #[test]
    fn test_custom_weights_change_overall() {
        let config = MatchingConfig {
            weights: ScoringWeights {
                eligibility: 100,
                career_path: 0,
                location: 0,
            },
            ..Default::default()
        };
        let job = make_job("j1", &["early-career"], "Paris");
        assert_eq!(service(config).score(&job, &make_user()).overall, 100);
    }

    #[test]
    fn test_invalid_weights_rejected_at_construction() {
        let config = MatchingConfig {
            weights: ScoringWeights {
                eligibility: 10,
                career_path: 10,
                location: 10,
            },
            ..Default::default()
        };
        assert!(ScoringService::new(Arc::new(config)).is_err());
    }

    #[test]
    fn test_location_matches_on_job_location_without_tag() {
        let job = make_job("j1", &["early-career"], "london");
        let score = service(MatchingConfig::default()).score(&job, &make_user());
        assert_eq!(score.location, 100);
    }

    #[test]
    fn test_score_is_deterministic() {
        let svc = service(MatchingConfig::default());
        let job = make_job("j1", &["early-career", "career:tech"], "Berlin");
        let user = make_user();
        assert_eq!(svc.score(&job, &user), svc.score(&job, &user));
    }

    #[test]
    fn test_confidence_penalties_accumulate() {
        let svc = service(MatchingConfig {
            confidence_floor: 0.0,
            minimum_acceptable_score: 0,
            ..Default::default()
        });
        let user = make_user();

        let clean = make_job("j1", &["early-career"], "London");
        assert!((svc.confidence(&clean, &user) - 1.0).abs() < 1e-9);

        let uncertain = make_job("j2", &["eligibility-uncertain"], "London");
        assert!((svc.confidence(&uncertain, &user) - 0.9).abs() < 1e-9);

        let unknowns = make_job(
            "j3",
            &["eligibility-uncertain", "career:unknown", "loc:unknown"],
            "London",
        );
        // 1.0 - 0.10 - 0.15 - 0.15
        assert!((svc.confidence(&unknowns, &user) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_clamped_to_effective_floor() {
        let svc = service(MatchingConfig {
            unknown_tag_penalty: 0.5,
            confidence_floor: 0.3,
            minimum_acceptable_score: 40,
            ..Default::default()
        });
        let job = make_job("j1", &["career:unknown", "loc:unknown"], "London");
        // raw 0.0, floors 0.3 vs 0.4 → 0.4
        assert!((svc.confidence(&job, &make_user()) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_evaluate_gates_untitled_and_untagged_jobs() {
        let svc = service(MatchingConfig::default());
        let user = make_user();

        let mut untitled = make_job("j1", &["early-career"], "London");
        untitled.title = String::new();
        let eval = svc.evaluate(&untitled, &user);
        assert!(!eval.eligible);
        assert!(eval.score.is_none());

        let untagged = make_job("j2", &[], "London");
        assert!(!svc.evaluate(&untagged, &user).eligible);

        let good = make_job("j3", &["early-career"], "London");
        let eval = svc.evaluate(&good, &user);
        assert!(eval.eligible);
        assert!(eval.score.is_some());
        assert!(eval.confidence.is_some());
        assert!(eval.explanation.is_some());
    }

    #[test]
    fn test_rank_for_user_sorts_descending_and_filters() {
        let svc = service(MatchingConfig::default());
        let jobs = vec![
            make_job("low", &["career:finance"], "Paris"),
            make_job("none", &[], "London"),
            make_job("high", &["early-career", "career:tech"], "London"),
        ];
        let ranked = svc.rank_for_user(&jobs, &make_user());
        let hashes: Vec<&str> = ranked.iter().map(|r| r.job.job_hash.as_str()).collect();
        assert_eq!(hashes, vec!["high", "low"]);
    }

    #[test]
    fn test_rank_for_user_ties_keep_input_order() {
        let svc = service(MatchingConfig::default());
        let jobs = vec![
            make_job("a", &["early-career"], "Paris"),
            make_job("b", &["early-career"], "Paris"),
            make_job("c", &["early-career"], "Paris"),
        ];
        let ranked = svc.rank_for_user(&jobs, &make_user());
        let hashes: Vec<&str> = ranked.iter().map(|r| r.job.job_hash.as_str()).collect();
        assert_eq!(hashes, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_explain_mentions_matches() {
        let svc = service(MatchingConfig::default());
        let user = make_user();
        let job = make_job("j1", &["early-career", "career:tech"], "London");
        let score = svc.score(&job, &user);
        let explanation = svc.explain(&job, &score, &user);
        assert!(explanation.reason.contains("tech career path"));
        assert!(explanation.reason.contains("London"));
        assert_eq!(
            explanation.tags,
            vec!["early-career", "career-match", "location-match"]
        );
    }

    #[test]
    fn test_tiered_freshness_policy() {
        let svc = service(MatchingConfig {
            freshness: FreshnessPolicy::Tiered {
                ultra_fresh: 100,
                fresh: 70,
                stale: 20,
            },
            ..Default::default()
        });
        let mut job = make_job("j1", &["early-career"], "London");
        job.freshness_tier = FreshnessTier::Stale;
        let score = svc.score(&job, &make_user());
        assert_eq!(score.freshness, 20);
        // 100*35 + 40*40 + 100*25 = 7600; freshness does not move the overall
        assert_eq!(score.overall, 76);
    }

    #[test]
    fn test_decay_freshness_halves_per_half_life() {
        let job = make_job("j1", &["early-career"], "London");
        let svc = service(MatchingConfig {
            freshness: FreshnessPolicy::Decay {
                half_life_hours: 24.0,
            },
            ..Default::default()
        })
        .with_reference_time(job.posted_at + Duration::hours(24));
        assert_eq!(svc.score(&job, &make_user()).freshness, 50);

        let svc = svc.with_reference_time(job.posted_at - Duration::hours(1));
        assert_eq!(svc.score(&job, &make_user()).freshness, 100);
    }

    #[test]
    fn test_build_result_carries_quality_and_provenance() {
        let svc = service(MatchingConfig::default());
        let user = make_user();
        let job = make_job("j1", &["early-career", "career:tech", "loc:london"], "London");
        let score = svc.score(&job, &user);
        let session = Uuid::new_v4();
        let result = svc.build_result(&job, score, &user, Provenance::Fallback, session);
        assert_eq!(result.quality, crate::models::QualityTier::Excellent);
        assert_eq!(result.provenance, Provenance::Fallback);
        assert_eq!(result.session_id, session);
        assert!(result.validate(0.5).is_ok());
    }
}
