use crate::config::Config;
use crate::matching::MatcherOrchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: MatcherOrchestrator,
    pub config: Config,
}
