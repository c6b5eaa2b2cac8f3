//! Result cache for AI rankings.
//!
//! Keyed by a BLAKE3 fingerprint of (candidate job set, user cluster). Bounded,
//! time-boxed and safe to share between concurrent per-user attempts; identical
//! fingerprints are last-writer-wins.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::matching::config::CacheConfig;

/// One AI-ranked job as stored in the cache. Session-independent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRanking {
    pub job_hash: String,
    pub score: u8,
    pub reason: String,
}

pub type CachedRankings = Arc<Vec<CachedRanking>>;

/// Hex BLAKE3 digest of the job set (order-insensitive) plus the cluster key.
pub fn fingerprint<'a, I>(job_hashes: I, cluster_key: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hashes: Vec<&str> = job_hashes.into_iter().collect();
    hashes.sort_unstable();
    hashes.dedup();

    let mut hasher = blake3::Hasher::new();
    for hash in hashes {
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(b"|");
    hasher.update(cluster_key.as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[derive(Debug)]
struct Entry {
    value: CachedRankings,
    inserted_at: Instant,
    /// Logical clock at insertion; key into `by_insertion`.
    inserted_seq: u64,
    /// Logical clock of the last read or write; key into `by_recency`.
    last_used: u64,
    /// Run generation that last touched this entry.
    run: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Oldest insertion first.
    by_insertion: BTreeMap<u64, String>,
    /// Least recently used first.
    by_recency: BTreeMap<u64, String>,
    run: u64,
    /// Generations begun and not yet ended.
    active_runs: BTreeSet<u64>,
    clock: u64,
}

impl Inner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.by_insertion.remove(&entry.inserted_seq);
        self.by_recency.remove(&entry.last_used);
        Some(entry)
    }

    fn remove_expired(&mut self, ttl: Duration) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.inserted_at.elapsed() >= ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    /// Entries touched at or after this generation are warm. With overlapping
    /// runs, that is the oldest one still active.
    fn warm_threshold(&self) -> u64 {
        self.active_runs.first().copied().unwrap_or(self.run)
    }
}

#[derive(Debug)]
pub struct ResultCache {
    config: CacheConfig,
    inner: Mutex<Inner>,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl()
    }

    /// Starts a new run and returns its generation. Entries touched from now
    /// on count as warm until every run begun no later than this one ends.
    pub fn begin_run(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.run += 1;
        let run = inner.run;
        inner.active_runs.insert(run);
        run
    }

    pub fn end_run(&self, run: u64) {
        self.inner.lock().active_runs.remove(&run);
    }

    /// Returns the cached rankings if present and within TTL. Expired entries
    /// are dropped on read.
    pub fn get(&self, key: &str) -> Option<CachedRankings> {
        let ttl = self.config.ttl();
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            None => return None,
            Some(entry) => entry.inserted_at.elapsed() >= ttl,
        };
        if expired {
            inner.remove(key);
            debug!(key, "result cache entry expired");
            return None;
        }

        let clock = inner.tick();
        let run = inner.run;
        let entry = inner.entries.get_mut(key)?;
        let previous = std::mem::replace(&mut entry.last_used, clock);
        entry.run = run;
        let value = Arc::clone(&entry.value);
        inner.by_recency.remove(&previous);
        inner.by_recency.insert(clock, key.to_string());
        Some(value)
    }

    pub fn insert(&self, key: String, value: Vec<CachedRanking>) {
        let mut inner = self.inner.lock();
        inner.remove(&key);

        let clock = inner.tick();
        let run = inner.run;
        inner.by_insertion.insert(clock, key.clone());
        inner.by_recency.insert(clock, key.clone());
        inner.entries.insert(
            key,
            Entry {
                value: Arc::new(value),
                inserted_at: Instant::now(),
                inserted_seq: clock,
                last_used: clock,
                run,
            },
        );

        if inner.entries.len() > self.config.max_entries {
            self.evict(&mut inner);
        }
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.inner.lock().remove_expired(self.config.ttl())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expired entries go first, then the oldest-inserted entries outside the
    /// warm set. Warm entries are evicted, least recently used first, only
    /// when nothing else is left.
    fn evict(&self, inner: &mut Inner) {
        inner.remove_expired(self.config.ttl());

        let max = self.config.max_entries;
        if inner.entries.len() <= max {
            return;
        }
        let excess = inner.entries.len() - max;

        let warm = self.warm_set(inner);
        let mut victims: Vec<String> = inner
            .by_insertion
            .values()
            .filter(|key| !warm.contains(key.as_str()))
            .take(excess)
            .cloned()
            .collect();
        if victims.len() < excess {
            let missing = excess - victims.len();
            victims.extend(
                inner
                    .by_recency
                    .values()
                    .filter(|key| warm.contains(key.as_str()))
                    .take(missing)
                    .cloned(),
            );
        }

        for key in &victims {
            inner.remove(key);
        }
        debug!(evicted = victims.len(), "result cache eviction");
    }

    /// Keys of the `warm_entries` most-recently-used entries of the active runs.
    fn warm_set(&self, inner: &Inner) -> HashSet<String> {
        let threshold = inner.warm_threshold();
        inner
            .by_recency
            .values()
            .rev()
            .filter(|key| inner.entries.get(*key).is_some_and(|e| e.run >= threshold))
            .take(self.config.warm_entries)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking(hash: &str) -> Vec<CachedRanking> {
        vec![CachedRanking {
            job_hash: hash.to_string(),
            score: 90,
            reason: "fit".to_string(),
        }]
    }

    fn cache(ttl_secs: u64, max_entries: usize, warm_entries: usize) -> ResultCache {
        ResultCache::new(CacheConfig {
            ttl_secs,
            max_entries,
            warm_entries,
        })
    }

    #[test]
    fn test_fingerprint_is_order_insensitive() {
        let a = fingerprint(["j1", "j2", "j3"], "london|tech");
        let b = fingerprint(["j3", "j1", "j2"], "london|tech");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_depends_on_cluster_and_jobs() {
        let base = fingerprint(["j1", "j2"], "london|tech");
        assert_ne!(base, fingerprint(["j1", "j2"], "berlin|tech"));
        assert_ne!(base, fingerprint(["j1"], "london|tech"));
    }

    #[tokio::test]
    async fn test_get_returns_inserted_value() {
        let cache = cache(60, 10, 2);
        cache.insert("k".to_string(), ranking("j1"));
        let hit = cache.get("k").unwrap();
        assert_eq!(hit[0].job_hash, "j1");
        assert!(cache.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let cache = cache(60, 10, 2);
        cache.insert("k".to_string(), ranking("j1"));
        cache.insert("k".to_string(), ranking("j2"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k").unwrap()[0].job_hash, "j2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = cache(60, 10, 2);
        cache.insert("k".to_string(), ranking("j1"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("k").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_counts_removed() {
        let cache = cache(10, 10, 2);
        cache.insert("old".to_string(), ranking("j1"));
        tokio::time::advance(Duration::from_secs(11)).await;
        cache.insert("new".to_string(), ranking("j2"));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_eviction_removes_oldest_cold_entry() {
        let cache = cache(60, 2, 0);
        cache.insert("a".to_string(), ranking("j1"));
        cache.insert("b".to_string(), ranking("j2"));
        cache.get("a");
        cache.insert("c".to_string(), ranking("j3"));

        // no warm slots: "a" is the oldest insertion even though it was just read
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[tokio::test]
    async fn test_warm_entry_survives_newer_cold_entry() {
        let cache = cache(60, 2, 2);
        cache.insert("a".to_string(), ranking("j1"));
        cache.begin_run();
        cache.insert("b".to_string(), ranking("j2"));
        cache.get("a");
        cache.insert("c".to_string(), ranking("j3"));

        // warm = {c, a}; "b" is cold and goes despite being newer than "a"
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[tokio::test]
    async fn test_previous_run_usage_is_not_warm() {
        let cache = cache(60, 2, 2);
        cache.insert("a".to_string(), ranking("j1"));
        cache.insert("b".to_string(), ranking("j2"));
        cache.get("a");
        cache.begin_run();
        cache.insert("c".to_string(), ranking("j3"));

        // warm = {c}; "a" and "b" are cold, "a" was inserted first
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }

    #[tokio::test]
    async fn test_overlapping_run_keeps_earlier_run_warm() {
        let cache = cache(60, 2, 5);
        let first = cache.begin_run();
        cache.insert("a".to_string(), ranking("j1"));
        cache.insert("b".to_string(), ranking("j2"));
        cache.get("a");
        let second = cache.begin_run();
        cache.insert("c".to_string(), ranking("j3"));

        // both runs active: a, b and c are warm, so "b" goes as least recently used
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());

        cache.end_run(first);
        cache.end_run(second);
    }

    #[tokio::test]
    async fn test_ended_run_is_no_longer_warm() {
        let cache = cache(60, 2, 5);
        let first = cache.begin_run();
        cache.insert("a".to_string(), ranking("j1"));
        cache.insert("b".to_string(), ranking("j2"));
        cache.get("a");
        cache.end_run(first);
        cache.begin_run();
        cache.insert("c".to_string(), ranking("j3"));

        // only "c" is warm; "a" is the oldest cold insertion
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }

    #[tokio::test]
    async fn test_indexes_track_entries_through_eviction() {
        let cache = cache(60, 3, 1);
        for i in 0..50 {
            let key = format!("k{i}");
            cache.insert(key.clone(), ranking("j"));
            cache.get(&key);
            cache.insert(key, ranking("j"));
        }
        assert_eq!(cache.len(), 3);
        let inner = cache.inner.lock();
        assert_eq!(inner.by_insertion.len(), 3);
        assert_eq!(inner.by_recency.len(), 3);
    }

    #[tokio::test]
    async fn test_all_warm_evicts_least_recently_used() {
        let cache = cache(60, 1, 5);
        cache.insert("a".to_string(), ranking("j1"));
        cache.insert("b".to_string(), ranking("j2"));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("b").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_prefers_expired_entries() {
        let cache = cache(10, 2, 0);
        cache.insert("stale".to_string(), ranking("j1"));
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.insert("fresh".to_string(), ranking("j2"));
        cache.get("stale");
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.insert("newest".to_string(), ranking("j3"));

        assert!(cache.get("fresh").is_some());
        assert!(cache.get("newest").is_some());
        assert!(cache.get("stale").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_inserts_are_safe() {
        let cache = Arc::new(cache(60, 1_000, 10));
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for j in 0..20 {
                    cache.insert(format!("k{i}-{j}"), ranking("j"));
                    cache.get(&format!("k{i}-{j}"));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.len(), 320);
    }
}
