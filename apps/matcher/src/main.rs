use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use matcher::audit::{MatchAuditSink, PgAuditSink, TracingAuditSink};
use matcher::config::Config;
use matcher::db::create_pool;
use matcher::llm_client::{self, LlmClient};
use matcher::matching::{
    AiMatchingService, LlmRankingBackend, MatcherOrchestrator, ResultCache, ScoringService,
};
use matcher::routes::build_router;
use matcher::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting matcher v{}", env!("CARGO_PKG_VERSION"));

    // Audit sink: Postgres when DATABASE_URL is set, structured logs otherwise
    let audit: Arc<dyn MatchAuditSink> = match &config.database_url {
        Some(url) => Arc::new(PgAuditSink::new(create_pool(url).await?)),
        None => {
            info!("DATABASE_URL not set; match audit goes to logs only");
            Arc::new(TracingAuditSink)
        }
    };

    // Initialize LLM client
    let llm = LlmClient::new(
        config.anthropic_api_key.clone(),
        config.matching.ai_timeout(),
    )?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let matching = Arc::new(config.matching.clone());
    let scoring = ScoringService::new(Arc::clone(&matching))?;
    let cache = Arc::new(ResultCache::new(matching.cache));
    spawn_cache_purge(Arc::clone(&cache));
    let ai = AiMatchingService::new(
        Arc::new(LlmRankingBackend::new(llm)),
        cache,
        scoring.clone(),
    );
    let orchestrator = MatcherOrchestrator::new(Arc::new(ai), scoring, audit);
    info!(
        max_matches = matching.max_matches,
        batch_concurrency = matching.batch_concurrency,
        cache_ttl_secs = matching.cache.ttl_secs,
        "Matching pipeline ready"
    );

    let state = AppState {
        orchestrator,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Drops expired AI rankings once per TTL.
fn spawn_cache_purge(cache: Arc<ResultCache>) {
    let period = cache.ttl();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                debug!(purged, "expired result cache entries dropped");
            }
        }
    });
}
