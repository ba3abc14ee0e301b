//! Request timing and counters.
//!
//! Three layers of measurement:
//!
//! - [`RequestMetrics`]: internal and external milliseconds for one request.
//! - [`AggregateMetrics`]: process-wide running averages over requests and
//!   a popularity count of search queries.
//! - [`SourceMetrics`]: cache hit/miss and API success/failure counters for
//!   the TheMealDB adapter, split by operation.
//!
//! All of them are thread-safe and cheap to update from request handlers.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

/// Observer invoked with the elapsed milliseconds of an external operation.
pub type TimingCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Invoke an optional timing callback. A panicking callback is logged and
/// swallowed.
pub fn notify_timing(callback: Option<&TimingCallback>, elapsed_ms: f64) {
    let Some(callback) = callback else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| callback(elapsed_ms))).is_err() {
        debug!(elapsed_ms, "Timing callback panicked");
    }
}

/// Await `fut` and return its output with the elapsed wall time in ms.
pub async fn timed<F: Future>(fut: F) -> (F::Output, f64) {
    let start = Instant::now();
    let out = fut.await;
    (out, elapsed_ms(start))
}

/// Milliseconds elapsed since `start`.
pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn round2(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

// ============ Per request ============

/// Timing breakdown of a single API request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RequestMetrics {
    pub internal_ms: f64,
    pub external_ms: f64,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_internal(&mut self, ms: f64) {
        self.internal_ms += ms;
    }

    pub fn record_external(&mut self, ms: f64) {
        self.external_ms += ms;
    }

    /// JSON body fragment, rounded to two decimals.
    pub fn to_json(&self) -> Value {
        json!({
            "internal_ms": round2(self.internal_ms),
            "external_ms": round2(self.external_ms),
        })
    }
}

// ============ Aggregate ============

/// Longest query prefix kept as a search popularity key.
const SEARCH_KEY_CHARS: usize = 100;
/// Distinct queries tracked; later new queries are not counted.
const MAX_TRACKED_SEARCHES: usize = 1000;
/// Entries reported in the `top_searches` snapshot.
const TOP_SEARCHES: usize = 10;

/// Popularity key for a search query: trimmed, lower-cased, truncated.
fn search_popularity_key(query: &str) -> String {
    let key: String = query
        .trim()
        .to_lowercase()
        .chars()
        .take(SEARCH_KEY_CHARS)
        .collect();
    if key.is_empty() {
        "empty".to_string()
    } else {
        key
    }
}

#[derive(Debug, Default)]
struct Totals {
    requests: u64,
    internal_ms: f64,
    internal_count: u64,
    external_ms: f64,
    external_count: u64,
}

/// Running totals over every request served by this process.
///
/// Averages count only requests where the respective side took a positive
/// amount of time, so requests that never touched TheMealDB do not drag the
/// external average towards zero.
#[derive(Debug, Default)]
pub struct AggregateMetrics {
    totals: Mutex<Totals>,
    searches: Mutex<HashMap<String, u64>>,
}

impl AggregateMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, request: &RequestMetrics) {
        let mut totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        totals.requests += 1;
        if request.internal_ms > 0.0 {
            totals.internal_ms += request.internal_ms;
            totals.internal_count += 1;
        }
        if request.external_ms > 0.0 {
            totals.external_ms += request.external_ms;
            totals.external_count += 1;
        }
    }

    /// Count one search for `query`.
    pub fn record_search(&self, query: &str) {
        let key = search_popularity_key(query);
        let mut searches = self.searches.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = searches.get_mut(&key) {
            *count += 1;
        } else if searches.len() < MAX_TRACKED_SEARCHES {
            searches.insert(key, 1);
        }
    }

    /// Most frequent queries, highest count first, ties by query.
    pub fn top_searches(&self, limit: usize) -> Vec<(String, u64)> {
        let searches = self.searches.lock().unwrap_or_else(PoisonError::into_inner);
        let mut top: Vec<(String, u64)> = searches.iter().map(|(q, n)| (q.clone(), *n)).collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(limit);
        top
    }

    pub fn snapshot(&self) -> Value {
        let top_searches: Vec<Value> = self
            .top_searches(TOP_SEARCHES)
            .into_iter()
            .map(|(query, count)| json!({ "query": query, "count": count }))
            .collect();
        let totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        let avg = |sum: f64, n: u64| if n == 0 { 0.0 } else { round2(sum / n as f64) };
        json!({
            "requests": totals.requests,
            "internal": {
                "count": totals.internal_count,
                "total_ms": round2(totals.internal_ms),
                "avg_ms": avg(totals.internal_ms, totals.internal_count),
            },
            "external": {
                "count": totals.external_count,
                "total_ms": round2(totals.external_ms),
                "avg_ms": avg(totals.external_ms, totals.external_count),
            },
            "top_searches": top_searches,
        })
    }
}

// ============ Source counters ============

/// Adapter operation a counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Search,
    Meal,
}

#[derive(Debug, Default)]
struct OperationCounters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    api_success: AtomicU64,
    api_failure: AtomicU64,
}

impl OperationCounters {
    fn snapshot(&self) -> Value {
        json!({
            "cache_hits": self.cache_hits.load(Ordering::Relaxed),
            "cache_misses": self.cache_misses.load(Ordering::Relaxed),
            "api_success": self.api_success.load(Ordering::Relaxed),
            "api_failure": self.api_failure.load(Ordering::Relaxed),
        })
    }
}

/// Cache and upstream counters for the TheMealDB adapter.
#[derive(Debug, Default)]
pub struct SourceMetrics {
    search: OperationCounters,
    meal: OperationCounters,
    /// (round trips, total ms) of network calls reported by the timing callback.
    upstream: Mutex<(u64, f64)>,
}

impl SourceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, op: Operation) -> &OperationCounters {
        match op {
            Operation::Search => &self.search,
            Operation::Meal => &self.meal,
        }
    }

    pub fn record_cache_hit(&self, op: Operation) {
        self.counters(op).cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self, op: Operation) {
        self.counters(op)
            .cache_misses
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_api_call(&self, op: Operation, success: bool) {
        let counters = self.counters(op);
        let counter = if success {
            &counters.api_success
        } else {
            &counters.api_failure
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the duration of one upstream round trip. Zero durations come
    /// from cache hits and are ignored.
    pub fn record_upstream_ms(&self, ms: f64) {
        if ms <= 0.0 {
            return;
        }
        let mut upstream = self.upstream.lock().unwrap_or_else(PoisonError::into_inner);
        upstream.0 += 1;
        upstream.1 += ms;
    }

    pub fn cache_hits(&self, op: Operation) -> u64 {
        self.counters(op).cache_hits.load(Ordering::Relaxed)
    }

    pub fn api_calls(&self, op: Operation) -> u64 {
        let counters = self.counters(op);
        counters.api_success.load(Ordering::Relaxed) + counters.api_failure.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Value {
        let (calls, total_ms) = *self.upstream.lock().unwrap_or_else(PoisonError::into_inner);
        let avg_ms = if calls == 0 { 0.0 } else { round2(total_ms / calls as f64) };
        json!({
            "search": self.search.snapshot(),
            "meal": self.meal.snapshot(),
            "upstream": {
                "calls": calls,
                "total_ms": round2(total_ms),
                "avg_ms": avg_ms,
            },
        })
    }
}
