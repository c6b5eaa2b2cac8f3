use serde::Serialize;

use crate::models::MatchResult;

/// Presentation split of a result set. Records are borrowed, never modified.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassifiedMatches<'a> {
    pub confident: Vec<&'a MatchResult>,
    pub promising: Vec<&'a MatchResult>,
}

/// `confident` holds matches with confidence >= `threshold`, `promising` the
/// rest. Input order is kept within each side.
pub fn classify(matches: &[MatchResult], threshold: f64) -> ClassifiedMatches<'_> {
    let (confident, promising): (Vec<_>, Vec<_>) =
        matches.iter().partition(|m| m.confidence >= threshold);
    ClassifiedMatches {
        confident,
        promising,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::models::{FreshnessTier, Job, MatchScore, Provenance, QualityTier};

    fn make_match(hash: &str, confidence: f64) -> MatchResult {
        MatchResult {
            job: Job {
                job_hash: hash.to_string(),
                title: "Graduate Analyst".to_string(),
                company: "Acme".to_string(),
                location: "London".to_string(),
                tags: vec!["early-career".to_string()],
                freshness_tier: FreshnessTier::Fresh,
                posted_at: Utc::now(),
            },
            score: MatchScore {
                eligibility: 100,
                career_path: 100,
                location: 100,
                freshness: 80,
                overall: 100,
            },
            confidence,
            reason: "Early-career role".to_string(),
            reason_tags: vec![],
            quality: QualityTier::Excellent,
            provenance: Provenance::Fallback,
            session_id: Uuid::nil(),
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let matches = vec![make_match("a", 0.8), make_match("b", 0.79), make_match("c", 1.0)];
        let classified = classify(&matches, 0.8);

        let confident: Vec<&str> = classified.confident.iter().map(|m| m.job.job_hash.as_str()).collect();
        let promising: Vec<&str> = classified.promising.iter().map(|m| m.job.job_hash.as_str()).collect();
        assert_eq!(confident, vec!["a", "c"]);
        assert_eq!(promising, vec!["b"]);
    }

    #[test]
    fn test_empty_input_yields_empty_partitions() {
        let classified = classify(&[], 0.8);
        assert!(classified.confident.is_empty());
        assert!(classified.promising.is_empty());
    }

    #[test]
    fn test_classification_does_not_touch_records() {
        let matches = vec![make_match("a", 0.55)];
        let before = matches.clone();
        let _ = classify(&matches, 0.5);
        assert_eq!(matches, before);
    }
}
