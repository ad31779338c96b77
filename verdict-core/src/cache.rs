//! Session result cache.
//!
//! The key is the raw input text verbatim. Entries are usable only while
//! `now < created_at + ttl`. The [`SessionCache`] wrapper swallows every
//! store error: a failed read is a miss, a failed write is a no-op.

use crate::error::CacheError;
use crate::types::AnalysisResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: serde_json::Value, ttl_secs: u64) -> Self {
        Self {
            key: key.into(),
            value,
            created_at: Utc::now(),
            ttl_secs,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        self.created_at
            .checked_add_signed(Duration::seconds(ttl.min(i64::MAX / 1000)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// The stored entry for `key`, fresh or not.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Store `value` under `key`, replacing any previous entry.
    async fn put(&self, key: &str, value: serde_json::Value, ttl_secs: u64) -> Result<(), CacheError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry that is stale at `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh_at(now));
        before - self.entries.len()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(key).map(|e| e.clone()))
    }

    async fn put(&self, key: &str, value: serde_json::Value, ttl_secs: u64) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), CacheEntry::new(key, value, ttl_secs));
        Ok(())
    }
}

/// Best-effort typed cache of finished analyses.
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn CacheStore>,
    ttl_secs: u64,
}

impl SessionCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl_secs: u64) -> Self {
        Self { store, ttl_secs }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// A fresh cached result for `fingerprint`, or `None` on miss, expiry,
    /// or any store/decode failure.
    pub async fn get(&self, fingerprint: &str) -> Option<AnalysisResult> {
        let entry = match self.store.get(fingerprint).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Cache read failed; treating as miss");
                return None;
            }
        };
        if !entry.is_fresh_at(Utc::now()) {
            debug!("Cache entry expired");
            return None;
        }
        match decode(entry.value) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(error = %e, "Cached result could not be decoded; treating as miss");
                None
            }
        }
    }

    /// Overwrite the entry for `fingerprint`. Failures are logged and ignored.
    pub async fn put(&self, fingerprint: &str, result: &AnalysisResult) {
        let value = match serde_json::to_value(result) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Result could not be encoded for cache");
                return;
            }
        };
        if let Err(e) = self.store.put(fingerprint, value, self.ttl_secs).await {
            warn!(error = %e, "Cache write failed");
        }
    }
}

fn decode(value: serde_json::Value) -> Result<AnalysisResult, CacheError> {
    Ok(serde_json::from_value(value)?)
}
