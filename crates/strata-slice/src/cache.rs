use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use strata_config::CacheConfig;
use strata_core::DetailLevel;

use crate::request::{SliceBudget, SliceRequest};
use crate::wire::GraphSlice;

/// Canonical fingerprint of a slice request. Arrays are sorted, blank
/// optionals collapse to absent, and the etag map contributes only its hash
/// so differently-freshened clients never share an entry.
pub fn request_fingerprint(
    request: &SliceRequest,
    budget: SliceBudget,
    card_detail: DetailLevel,
    min_confidence: f64,
) -> String {
    #[derive(Serialize)]
    struct Material<'a> {
        repo_id: &'a str,
        version_id: &'a str,
        entry_symbols: Vec<&'a str>,
        task_text: Option<&'a str>,
        stack_trace: Option<&'a str>,
        failing_test_path: Option<&'a str>,
        edited_files: Vec<&'a str>,
        budget: SliceBudget,
        card_detail: DetailLevel,
        min_confidence: f64,
        known_etags_hash: Option<String>,
    }

    let mut entry_symbols: Vec<&str> =
        request.entry_symbols.iter().map(String::as_str).collect();
    entry_symbols.sort_unstable();
    entry_symbols.dedup();

    let mut edited_files: Vec<&str> =
        request.edited_files.iter().map(String::as_str).collect();
    edited_files.sort_unstable();
    edited_files.dedup();

    let material = Material {
        repo_id: &request.repo_id,
        version_id: &request.version_id,
        entry_symbols,
        task_text: normalize_optional(request.task_text.as_deref()),
        stack_trace: normalize_optional(request.stack_trace.as_deref()),
        failing_test_path: normalize_optional(request.failing_test_path.as_deref()),
        edited_files,
        budget,
        card_detail,
        min_confidence,
        known_etags_hash: request.known_card_etags.as_ref().map(known_etags_hash),
    };

    let canonical = serde_json::to_string(&material).unwrap_or_default();
    strata_core::blake3_hex(canonical.as_bytes())
}

fn normalize_optional(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn known_etags_hash(map: &BTreeMap<String, String>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (symbol_id, etag) in map {
        hasher.update(symbol_id.as_bytes());
        hasher.update(b"=");
        hasher.update(etag.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub current_size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// In-process memoization of complete slices. Entries are immutable once
/// inserted; hits hand out shared references. LRU beyond `max_entries`,
/// expiry after `ttl_ms`.
pub struct SliceCache {
    enabled: bool,
    max_entries: usize,
    ttl: Duration,
    inner: Mutex<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

struct CacheEntry {
    slice: Arc<GraphSlice>,
    inserted_at: Instant,
    last_used: u64,
}

impl SliceCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_entries: config.max_entries.max(1) as usize,
            ttl: Duration::from_millis(config.ttl_ms),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<GraphSlice>> {
        if !self.enabled {
            return None;
        }
        let mut inner = self.lock_inner();
        inner.tick += 1;
        let tick = inner.tick;

        enum Lookup {
            Missing,
            Expired,
            Fresh(Arc<GraphSlice>),
        }

        let lookup = match inner.entries.get(key) {
            None => Lookup::Missing,
            Some(entry) if entry.inserted_at.elapsed() > self.ttl => Lookup::Expired,
            Some(entry) => Lookup::Fresh(Arc::clone(&entry.slice)),
        };

        match lookup {
            Lookup::Missing => {
                inner.misses += 1;
                None
            }
            Lookup::Expired => {
                inner.entries.remove(key);
                inner.misses += 1;
                None
            }
            Lookup::Fresh(slice) => {
                if let Some(entry) = inner.entries.get_mut(key) {
                    entry.last_used = tick;
                }
                inner.hits += 1;
                Some(slice)
            }
        }
    }

    pub fn insert(&self, key: String, slice: Arc<GraphSlice>) {
        if !self.enabled {
            return;
        }
        let mut inner = self.lock_inner();
        inner.tick += 1;
        let tick = inner.tick;

        while inner.entries.len() >= self.max_entries && !inner.entries.contains_key(&key) {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| k.clone());
            let Some(oldest) = oldest else {
                break;
            };
            inner.entries.remove(&oldest);
            inner.evictions += 1;
        }

        inner.entries.insert(
            key,
            CacheEntry {
                slice,
                inserted_at: Instant::now(),
                last_used: tick,
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock_inner();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            current_size: inner.entries.len(),
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
