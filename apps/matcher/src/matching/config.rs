use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::models::QualityTier;

/// Percent weights of the scored components. Must sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub eligibility: u32,
    pub career_path: u32,
    pub location: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            eligibility: 35,
            career_path: 40,
            location: 25,
        }
    }
}

impl ScoringWeights {
    /// Saturates instead of wrapping, so oversized weights never pass validation.
    pub fn total(&self) -> u32 {
        self.eligibility
            .saturating_add(self.career_path)
            .saturating_add(self.location)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.total() {
            100 => Ok(()),
            other => Err(ValidationError::WeightSum(other)),
        }
    }
}

/// How the freshness component is computed. Freshness is reported but never
/// weighted into the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FreshnessPolicy {
    /// Same value for every job.
    Constant { baseline: u8 },
    /// Value per collection tier.
    Tiered {
        ultra_fresh: u8,
        fresh: u8,
        stale: u8,
    },
    /// Exponential decay on posting age against the scorer's reference time.
    Decay { half_life_hours: f64 },
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        FreshnessPolicy::Constant { baseline: 80 }
    }
}

/// Lower bounds (inclusive) on the overall score for each quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub excellent: u8,
    pub good: u8,
    pub fair: u8,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            excellent: 85,
            good: 70,
            fair: 50,
        }
    }
}

impl QualityThresholds {
    pub fn classify(&self, overall: u8) -> QualityTier {
        if overall >= self.excellent {
            QualityTier::Excellent
        } else if overall >= self.good {
            QualityTier::Good
        } else if overall >= self.fair {
            QualityTier::Fair
        } else {
            QualityTier::Poor
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
    /// Most-recently-used entries of the current run protected from eviction.
    pub warm_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 60,
            max_entries: 10_000,
            warm_entries: 1_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Every tunable of the matching pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub weights: ScoringWeights,
    pub career_path_partial: u8,
    pub location_partial: u8,
    pub freshness: FreshnessPolicy,

    pub uncertain_eligibility_penalty: f64,
    pub unknown_tag_penalty: f64,
    pub confidence_floor: f64,
    /// Minimum acceptable overall score, 0–100. Doubles as a confidence floor
    /// when expressed as a fraction.
    pub minimum_acceptable_score: u8,

    pub robust_min_score: u8,
    pub max_matches: usize,
    pub max_emergency_matches: usize,
    pub emergency_confidence: f64,

    pub confident_threshold: f64,
    pub quality: QualityThresholds,

    pub ai_timeout_secs: u64,
    pub ai_max_candidates: usize,
    pub ai_call_budget: Option<u32>,
    pub cache: CacheConfig,

    pub batch_concurrency: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            career_path_partial: 40,
            location_partial: 50,
            freshness: FreshnessPolicy::default(),
            uncertain_eligibility_penalty: 0.10,
            unknown_tag_penalty: 0.15,
            confidence_floor: 0.50,
            minimum_acceptable_score: 50,
            robust_min_score: 50,
            max_matches: 5,
            max_emergency_matches: 3,
            emergency_confidence: 0.50,
            confident_threshold: 0.80,
            quality: QualityThresholds::default(),
            ai_timeout_secs: 20,
            ai_max_candidates: 50,
            ai_call_budget: None,
            cache: CacheConfig::default(),
            batch_concurrency: 8,
        }
    }
}

impl MatchingConfig {
    /// The floor every returned confidence respects: the higher of the
    /// configured floor and the minimum acceptable score as a fraction.
    pub fn effective_confidence_floor(&self) -> f64 {
        self.confidence_floor
            .max(f64::from(self.minimum_acceptable_score) / 100.0)
            .clamp(0.0, 1.0)
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_secs)
    }

    /// Defaults overridden by `MATCH_*` environment variables, then validated.
    pub fn from_env_overrides() -> Result<Self, ValidationError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `MATCH_*` overrides read through `lookup`. A value that does not
    /// parse is an error, not a silent default.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        override_var(&get, "MATCH_WEIGHT_ELIGIBILITY", &mut self.weights.eligibility)?;
        override_var(&get, "MATCH_WEIGHT_CAREER_PATH", &mut self.weights.career_path)?;
        override_var(&get, "MATCH_WEIGHT_LOCATION", &mut self.weights.location)?;
        override_var(&get, "MATCH_CONFIDENCE_FLOOR", &mut self.confidence_floor)?;
        override_var(&get, "MATCH_MIN_ACCEPTABLE_SCORE", &mut self.minimum_acceptable_score)?;
        override_var(&get, "MATCH_ROBUST_MIN_SCORE", &mut self.robust_min_score)?;
        override_var(&get, "MATCH_MAX_MATCHES", &mut self.max_matches)?;
        override_var(&get, "MATCH_MAX_EMERGENCY_MATCHES", &mut self.max_emergency_matches)?;
        override_var(&get, "MATCH_CONFIDENT_THRESHOLD", &mut self.confident_threshold)?;
        override_var(&get, "MATCH_AI_TIMEOUT_SECS", &mut self.ai_timeout_secs)?;
        override_var(&get, "MATCH_AI_MAX_CANDIDATES", &mut self.ai_max_candidates)?;
        override_var(&get, "MATCH_CACHE_TTL_SECS", &mut self.cache.ttl_secs)?;
        override_var(&get, "MATCH_CACHE_MAX_ENTRIES", &mut self.cache.max_entries)?;
        override_var(&get, "MATCH_CACHE_WARM_ENTRIES", &mut self.cache.warm_entries)?;
        override_var(&get, "MATCH_BATCH_CONCURRENCY", &mut self.batch_concurrency)?;

        if let Some(budget) = parse_var::<u32>(&get, "MATCH_AI_CALL_BUDGET")? {
            self.ai_call_budget = Some(budget);
        }
        if let Some(raw) = get("MATCH_FRESHNESS_POLICY") {
            self.freshness = serde_json::from_str(&raw).map_err(|e| {
                ValidationError::Config(format!("MATCH_FRESHNESS_POLICY is not valid JSON: {e}"))
            })?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.weights.validate()?;

        let percent_fields = [
            ("career_path_partial", self.career_path_partial),
            ("location_partial", self.location_partial),
            ("minimum_acceptable_score", self.minimum_acceptable_score),
            ("robust_min_score", self.robust_min_score),
            ("quality.excellent", self.quality.excellent),
        ];
        for (name, value) in percent_fields {
            if value > 100 {
                return Err(ValidationError::Config(format!("{name} must be <= 100")));
            }
        }

        let fractions = [
            ("uncertain_eligibility_penalty", self.uncertain_eligibility_penalty),
            ("unknown_tag_penalty", self.unknown_tag_penalty),
            ("confidence_floor", self.confidence_floor),
            ("emergency_confidence", self.emergency_confidence),
            ("confident_threshold", self.confident_threshold),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::Config(format!(
                    "{name} must be within [0, 1]"
                )));
            }
        }

        let q = &self.quality;
        if !(q.excellent >= q.good && q.good >= q.fair) {
            return Err(ValidationError::Config(
                "quality thresholds must be descending".to_string(),
            ));
        }

        match self.freshness {
            FreshnessPolicy::Constant { baseline } if baseline > 100 => {
                return Err(ValidationError::Config(
                    "freshness baseline must be <= 100".to_string(),
                ));
            }
            FreshnessPolicy::Tiered {
                ultra_fresh,
                fresh,
                stale,
            } if ultra_fresh.max(fresh).max(stale) > 100 => {
                return Err(ValidationError::Config(
                    "freshness tier scores must be <= 100".to_string(),
                ));
            }
            FreshnessPolicy::Decay { half_life_hours }
                if !(half_life_hours.is_finite() && half_life_hours > 0.0) =>
            {
                return Err(ValidationError::Config(
                    "freshness half-life must be positive".to_string(),
                ));
            }
            _ => {}
        }

        if self.max_matches == 0 || self.max_emergency_matches == 0 {
            return Err(ValidationError::Config(
                "match limits must be at least 1".to_string(),
            ));
        }
        if self.ai_max_candidates == 0 || self.batch_concurrency == 0 {
            return Err(ValidationError::Config(
                "ai_max_candidates and batch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.cache.max_entries == 0 || self.cache.ttl_secs == 0 {
            return Err(ValidationError::Config(
                "cache.max_entries and cache.ttl_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ValidationError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ValidationError::Config(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}

fn override_var<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<(), ValidationError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = parse_var(get, key)? {
        *target = value;
    }
    Ok(())
}
