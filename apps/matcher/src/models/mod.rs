pub mod job;
pub mod match_result;
pub mod user;

pub use job::{FreshnessTier, Job};
pub use match_result::{InvalidMatch, MatchResult, MatchScore, Provenance, QualityTier};
pub use user::{ExperienceTier, SubscriptionTier, UserPreferences};
