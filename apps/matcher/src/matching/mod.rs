// Matching pipeline: scoring, AI ranking with a result cache, two rule-based
// fallback tiers, and the orchestrator that chains them per user and per batch.
// All LLM calls go through llm_client; nothing here talks to Anthropic directly.

pub mod ai;
pub mod cache;
pub mod classify;
pub mod config;
pub mod fallback;
pub mod orchestrator;
pub mod prompts;
pub mod scoring;
pub mod summary;

pub use ai::{AiMatchError, AiMatcher, AiMatchingService, LlmRankingBackend, RankingBackend};
pub use cache::ResultCache;
pub use classify::{classify, ClassifiedMatches};
pub use config::MatchingConfig;
pub use fallback::FallbackMatchingService;
pub use orchestrator::{BatchOutcome, MatcherOrchestrator, Strategy, UserMatchOutcome};
pub use scoring::ScoringService;
pub use summary::SessionSummary;
