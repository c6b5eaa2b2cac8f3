use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag carried by jobs that pass the early-career gate.
pub const EARLY_CAREER_TAG: &str = "early-career";
/// Tag set by the classifier when it could not decide eligibility.
pub const ELIGIBILITY_UNCERTAIN_TAG: &str = "eligibility-uncertain";
pub const CAREER_TAG_PREFIX: &str = "career:";
pub const LOCATION_TAG_PREFIX: &str = "loc:";
pub const UNKNOWN_TAG_VALUE: &str = "unknown";

/// How recently a job was collected, as assigned by the collection subsystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessTier {
    UltraFresh,
    #[default]
    Fresh,
    Stale,
}

/// A job listing as produced by the collection subsystem. Read-only here.
///
/// Every field except `job_hash` defaults when absent so that malformed rows
/// degrade to low scores instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_hash: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub freshness_tier: FreshnessTier,
    #[serde(default = "epoch")]
    pub posted_at: DateTime<Utc>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl Job {
    /// True when the job carries `tag` (case-insensitive).
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.trim().eq_ignore_ascii_case(tag))
    }

    pub fn is_early_career(&self) -> bool {
        self.has_tag(EARLY_CAREER_TAG)
    }

    pub fn is_eligibility_uncertain(&self) -> bool {
        self.has_tag(ELIGIBILITY_UNCERTAIN_TAG)
    }

    /// Career domain from the first `career:<domain>` tag, lowercased.
    pub fn career_domain(&self) -> Option<String> {
        self.prefixed_tag(CAREER_TAG_PREFIX)
    }

    /// Location from the first `loc:<city>` tag, lowercased.
    pub fn location_tag(&self) -> Option<String> {
        self.prefixed_tag(LOCATION_TAG_PREFIX)
    }

    pub fn has_unknown_career(&self) -> bool {
        self.career_domain().as_deref() == Some(UNKNOWN_TAG_VALUE)
    }

    pub fn has_unknown_location(&self) -> bool {
        self.location_tag().as_deref() == Some(UNKNOWN_TAG_VALUE)
    }

    /// The hard gate: a job without a title or without any tags is never eligible.
    pub fn passes_gate(&self) -> bool {
        !self.title.trim().is_empty() && !self.tags.is_empty()
    }

    fn prefixed_tag(&self, prefix: &str) -> Option<String> {
        self.tags.iter().find_map(|t| {
            let lower = t.trim().to_lowercase();
            lower
                .strip_prefix(prefix)
                .map(|rest| rest.trim().to_string())
                .filter(|rest| !rest.is_empty())
        })
    }
}
