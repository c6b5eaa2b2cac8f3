//! Per-user match audit. The orchestrator hands every finished outcome to a
//! `MatchAuditSink`; sink failures are logged and never change the outcome.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::{MatchResult, Provenance, QualityTier};

/// One persisted match row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditMatchRow {
    pub job_hash: String,
    pub overall_score: u8,
    pub confidence: f64,
    pub reason: String,
    pub quality: QualityTier,
    pub provenance: Provenance,
    pub session_id: Uuid,
}

impl From<&MatchResult> for AuditMatchRow {
    fn from(m: &MatchResult) -> Self {
        Self {
            job_hash: m.job.job_hash.clone(),
            overall_score: m.score.overall,
            confidence: m.confidence,
            reason: m.reason.clone(),
            quality: m.quality,
            provenance: m.provenance,
            session_id: m.session_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAuditRecord {
    pub session_id: Uuid,
    pub user_email: String,
    /// Tier that produced the final matches; `None` when there were none.
    pub provenance: Option<Provenance>,
    pub ai_success: bool,
    pub fallback_used: bool,
    pub cache_hit: bool,
    pub latency_ms: u64,
    pub match_count: usize,
    pub matches: Vec<AuditMatchRow>,
}

#[async_trait]
pub trait MatchAuditSink: Send + Sync {
    async fn record(&self, record: &UserAuditRecord) -> anyhow::Result<()>;
}

/// Default sink: one structured log line per user.
pub struct TracingAuditSink;

#[async_trait]
impl MatchAuditSink for TracingAuditSink {
    async fn record(&self, record: &UserAuditRecord) -> anyhow::Result<()> {
        info!(
            session_id = %record.session_id,
            user = %record.user_email,
            provenance = record.provenance.map(|p| p.as_str()).unwrap_or("none"),
            ai_success = record.ai_success,
            fallback_used = record.fallback_used,
            cache_hit = record.cache_hit,
            latency_ms = record.latency_ms,
            matches = record.match_count,
            "match audit"
        );
        Ok(())
    }
}

/// Writes to `match_audit_log` and `match_results` (see `migrations/`).
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatchAuditSink for PgAuditSink {
    async fn record(&self, record: &UserAuditRecord) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO match_audit_log
                (session_id, user_email, provenance, ai_success, fallback_used,
                 cache_hit, latency_ms, match_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.session_id)
        .bind(&record.user_email)
        .bind(record.provenance.map(|p| p.as_str()))
        .bind(record.ai_success)
        .bind(record.fallback_used)
        .bind(record.cache_hit)
        .bind(i64::try_from(record.latency_ms).unwrap_or(i64::MAX))
        .bind(record.match_count as i32)
        .execute(&mut *tx)
        .await?;

        for row in &record.matches {
            sqlx::query(
                r#"
                INSERT INTO match_results
                    (session_id, user_email, job_hash, overall_score, confidence,
                     reason, quality, provenance)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(row.session_id)
            .bind(&record.user_email)
            .bind(&row.job_hash)
            .bind(i16::from(row.overall_score))
            .bind(row.confidence)
            .bind(&row.reason)
            .bind(row.quality.as_str())
            .bind(row.provenance.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
