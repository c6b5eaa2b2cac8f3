use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::Job;

/// Which tier produced a match. Recorded for audit and cost accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Ai,
    Fallback,
    Emergency,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Ai => "ai",
            Provenance::Fallback => "fallback",
            Provenance::Emergency => "emergency",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Excellent => "excellent",
            QualityTier::Good => "good",
            QualityTier::Fair => "fair",
            QualityTier::Poor => "poor",
        }
    }
}

/// Component scores for one (job, user) pair, each 0–100.
///
/// `overall` is the weighted sum of eligibility, career path and location.
/// Freshness is reported alongside but is not part of the sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchScore {
    pub eligibility: u8,
    pub career_path: u8,
    pub location: u8,
    pub freshness: u8,
    pub overall: u8,
}

/// A match between one job and one user, produced by exactly one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub job: Job,
    pub score: MatchScore,
    pub confidence: f64,
    pub reason: String,
    pub reason_tags: Vec<String>,
    pub quality: QualityTier,
    pub provenance: Provenance,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidMatch {
    #[error("job {0} has no job hash")]
    MissingJobHash(String),
    #[error("score component out of range for job {0}")]
    ScoreOutOfRange(String),
    #[error("confidence {confidence} below floor {floor} for job {job_hash}")]
    ConfidenceBelowFloor {
        job_hash: String,
        confidence: f64,
        floor: f64,
    },
    #[error("empty reason for job {0}")]
    EmptyReason(String),
}

impl MatchResult {
    /// Checks the invariants every tier must uphold before a match leaves it.
    pub fn validate(&self, confidence_floor: f64) -> Result<(), InvalidMatch> {
        let hash = &self.job.job_hash;
        if hash.trim().is_empty() {
            return Err(InvalidMatch::MissingJobHash(self.job.title.clone()));
        }
        let s = &self.score;
        if [s.eligibility, s.career_path, s.location, s.freshness, s.overall]
            .iter()
            .any(|v| *v > 100)
        {
            return Err(InvalidMatch::ScoreOutOfRange(hash.clone()));
        }
        if !self.confidence.is_finite()
            || self.confidence > 1.0
            || self.confidence + f64::EPSILON < confidence_floor
        {
            return Err(InvalidMatch::ConfidenceBelowFloor {
                job_hash: hash.clone(),
                confidence: self.confidence,
                floor: confidence_floor,
            });
        }
        if self.reason.trim().is_empty() {
            return Err(InvalidMatch::EmptyReason(hash.clone()));
        }
        Ok(())
    }
}
