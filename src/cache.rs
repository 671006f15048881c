//! TTL cache for raw sheet datasets.
//!
//! One entry per configured sheet, replaced wholesale on refresh — never
//! mutated in place. Reads of a fresh entry take only a read lock; a miss
//! or an expired entry funnels through a per-sheet flight lock so
//! concurrent requests trigger at most one underlying fetch.
//!
//! When a refresh fails and an expired entry is still around, the stale
//! entry is served rather than failing the request. Only a fetch failure
//! with no prior entry propagates.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::models::{Record, SheetData};
use crate::timestamp::Interpreter;

/// A snapshot of one sheet's rows, immutable once fetched.
pub struct CacheEntry {
    pub source_id: String,
    pub records: Vec<Record>,
    pub columns: Vec<String>,
    /// Computed once per fetch with the sampled heuristic, reused by every
    /// request against this entry.
    pub detected_timestamp_columns: Vec<String>,
    pub fetched_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(source_id: &str, data: SheetData, ttl: Duration, interp: &Interpreter) -> Self {
        let detected = interp.detect_timestamp_columns(&data.records, &data.columns);
        Self {
            source_id: source_id.to_string(),
            records: data.records,
            columns: data.columns,
            detected_timestamp_columns: detected,
            fetched_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() > self.ttl
    }
}

/// A cache lookup result. `stale` is true when the refresh failed and an
/// expired entry was served instead.
pub struct Fetched {
    pub entry: Arc<CacheEntry>,
    pub stale: bool,
}

pub struct SheetCache {
    ttl: Duration,
    interpreter: Arc<Interpreter>,
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
    flights: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SheetCache {
    pub fn new(ttl: Duration, interpreter: Arc<Interpreter>) -> Self {
        Self {
            ttl,
            interpreter,
            entries: RwLock::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached entry for `source_id`, fetching through `fetch`
    /// when the entry is missing or expired. Concurrent callers for the
    /// same sheet coalesce onto a single in-flight fetch.
    pub async fn get_or_fetch<F, Fut>(&self, source_id: &str, fetch: F) -> Result<Fetched>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SheetData>>,
    {
        if let Some(entry) = self.fresh_entry(source_id).await {
            return Ok(Fetched {
                entry,
                stale: false,
            });
        }

        let flight = self.flight_lock(source_id).await;
        let _guard = flight.lock().await;

        // Waiters that queued behind an in-flight fetch find the entry it
        // just installed and return without fetching again.
        if let Some(entry) = self.fresh_entry(source_id).await {
            return Ok(Fetched {
                entry,
                stale: false,
            });
        }

        match fetch().await {
            Ok(data) => {
                let entry = Arc::new(CacheEntry::new(
                    source_id,
                    data,
                    self.ttl,
                    &self.interpreter,
                ));
                info!(source_id, rows = entry.records.len(), "sheet cache refreshed");
                self.entries
                    .write()
                    .await
                    .insert(source_id.to_string(), entry.clone());
                Ok(Fetched {
                    entry,
                    stale: false,
                })
            }
            Err(err) => {
                let existing = self.entries.read().await.get(source_id).cloned();
                match existing {
                    Some(entry) => {
                        warn!(source_id, error = %err, "sheet fetch failed; serving stale entry");
                        Ok(Fetched { entry, stale: true })
                    }
                    None => Err(err),
                }
            }
        }
    }

    async fn fresh_entry(&self, source_id: &str) -> Option<Arc<CacheEntry>> {
        let entries = self.entries.read().await;
        entries.get(source_id).filter(|e| !e.is_stale()).cloned()
    }

    async fn flight_lock(&self, source_id: &str) -> Arc<Mutex<()>> {
        let mut flights = self.flights.lock().await;
        flights
            .entry(source_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
