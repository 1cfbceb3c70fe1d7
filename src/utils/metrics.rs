use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Latency samples kept per series; older samples are dropped
const MAX_LATENCY_SAMPLES: usize = 1024;

/// Process-wide metrics collector.
///
/// Tracks inpainting runs, OCR selections, translation backend calls and
/// per-endpoint request counts. Cheap to clone; clones share counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Inpainting
    inpaint_runs: AtomicUsize,
    inpaint_failures: AtomicUsize,
    inpaint_latency_ms: RwLock<VecDeque<u64>>,

    // OCR
    ocr_requests: AtomicUsize,
    ocr_selections: AtomicUsize,
    ocr_item_errors: AtomicUsize,
    ocr_empty_results: AtomicUsize,
    ocr_latency_ms: RwLock<VecDeque<u64>>,

    // Translation backend
    api_calls_total: AtomicUsize,
    api_calls_success: AtomicUsize,
    api_calls_failed: AtomicUsize,
    api_latency_ms: RwLock<VecDeque<u64>>,
    texts_translated: AtomicU64,

    endpoint_counters: DashMap<String, AtomicUsize>,

    circuit_breaker_trips: AtomicUsize,

    start_time: Instant,
}

fn push_sample(series: &RwLock<VecDeque<u64>>, duration: Duration) {
    let mut samples = series.write();
    if samples.len() >= MAX_LATENCY_SAMPLES {
        samples.pop_front();
    }
    samples.push_back(duration.as_millis() as u64);
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                inpaint_runs: AtomicUsize::new(0),
                inpaint_failures: AtomicUsize::new(0),
                inpaint_latency_ms: RwLock::new(VecDeque::new()),
                ocr_requests: AtomicUsize::new(0),
                ocr_selections: AtomicUsize::new(0),
                ocr_item_errors: AtomicUsize::new(0),
                ocr_empty_results: AtomicUsize::new(0),
                ocr_latency_ms: RwLock::new(VecDeque::new()),
                api_calls_total: AtomicUsize::new(0),
                api_calls_success: AtomicUsize::new(0),
                api_calls_failed: AtomicUsize::new(0),
                api_latency_ms: RwLock::new(VecDeque::new()),
                texts_translated: AtomicU64::new(0),
                endpoint_counters: DashMap::new(),
                circuit_breaker_trips: AtomicUsize::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    // Inpainting
    pub fn record_inpaint(&self, success: bool, duration: Duration) {
        self.inner.inpaint_runs.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.inpaint_failures.fetch_add(1, Ordering::Relaxed);
        }
        push_sample(&self.inner.inpaint_latency_ms, duration);
    }

    // OCR
    pub fn record_ocr_request(&self, selections: usize, item_errors: usize, empty: usize, duration: Duration) {
        self.inner.ocr_requests.fetch_add(1, Ordering::Relaxed);
        self.inner.ocr_selections.fetch_add(selections, Ordering::Relaxed);
        self.inner.ocr_item_errors.fetch_add(item_errors, Ordering::Relaxed);
        self.inner.ocr_empty_results.fetch_add(empty, Ordering::Relaxed);
        push_sample(&self.inner.ocr_latency_ms, duration);
    }

    // Translation backend
    pub fn record_api_call(&self, success: bool, duration: Duration, texts: usize) {
        self.inner.api_calls_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.inner.api_calls_success.fetch_add(1, Ordering::Relaxed);
            self.inner.texts_translated.fetch_add(texts as u64, Ordering::Relaxed);
        } else {
            self.inner.api_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        push_sample(&self.inner.api_latency_ms, duration);
    }

    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner
            .endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_breaker_trip(&self) {
        self.inner.circuit_breaker_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inpaint_latency = self.inner.inpaint_latency_ms.read();
        let inpaint_latency_avg_ms = avg(&inpaint_latency);
        let inpaint_latency_p95_ms = percentile(&inpaint_latency, 0.95);
        drop(inpaint_latency);

        let ocr_latency_avg_ms = avg(&self.inner.ocr_latency_ms.read());

        let api_latency = self.inner.api_latency_ms.read();
        let api_latency_avg_ms = avg(&api_latency);
        let api_latency_p50_ms = percentile(&api_latency, 0.5);
        let api_latency_p95_ms = percentile(&api_latency, 0.95);
        drop(api_latency);

        let endpoint_requests = self
            .inner
            .endpoint_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            inpaint_runs: self.inner.inpaint_runs.load(Ordering::Relaxed),
            inpaint_failures: self.inner.inpaint_failures.load(Ordering::Relaxed),
            inpaint_latency_avg_ms,
            inpaint_latency_p95_ms,
            ocr_requests: self.inner.ocr_requests.load(Ordering::Relaxed),
            ocr_selections: self.inner.ocr_selections.load(Ordering::Relaxed),
            ocr_item_errors: self.inner.ocr_item_errors.load(Ordering::Relaxed),
            ocr_empty_results: self.inner.ocr_empty_results.load(Ordering::Relaxed),
            ocr_latency_avg_ms,
            api_calls_total: self.inner.api_calls_total.load(Ordering::Relaxed),
            api_calls_success: self.inner.api_calls_success.load(Ordering::Relaxed),
            api_calls_failed: self.inner.api_calls_failed.load(Ordering::Relaxed),
            api_latency_avg_ms,
            api_latency_p50_ms,
            api_latency_p95_ms,
            texts_translated: self.inner.texts_translated.load(Ordering::Relaxed),
            endpoint_requests,
            circuit_breaker_trips: self.inner.circuit_breaker_trips.load(Ordering::Relaxed),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = format!(
            r#"# HELP inpaint_runs_total Inpainting runs attempted
# TYPE inpaint_runs_total counter
inpaint_runs_total {}

# HELP inpaint_failures_total Inpainting runs that failed
# TYPE inpaint_failures_total counter
inpaint_failures_total {}

# HELP inpaint_latency_avg_ms Average inpainting latency in milliseconds
# TYPE inpaint_latency_avg_ms gauge
inpaint_latency_avg_ms {}

# HELP ocr_requests_total OCR batch requests
# TYPE ocr_requests_total counter
ocr_requests_total {}

# HELP ocr_selections_total Selections processed by OCR
# TYPE ocr_selections_total counter
ocr_selections_total {}

# HELP ocr_item_errors_total Selections that produced an inline error
# TYPE ocr_item_errors_total counter
ocr_item_errors_total {}

# HELP ocr_empty_results_total Selections where no text was found
# TYPE ocr_empty_results_total counter
ocr_empty_results_total {}

# HELP api_calls_total Translation backend calls
# TYPE api_calls_total counter
api_calls_total {}

# HELP api_calls_failed Failed translation backend calls
# TYPE api_calls_failed counter
api_calls_failed {}

# HELP api_latency_avg_ms Average translation backend latency in milliseconds
# TYPE api_latency_avg_ms gauge
api_latency_avg_ms {}

# HELP texts_translated_total Texts returned by the translation backend
# TYPE texts_translated_total counter
texts_translated_total {}

# HELP circuit_breaker_trips_total Total circuit breaker trips
# TYPE circuit_breaker_trips_total counter
circuit_breaker_trips_total {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {}

# HELP endpoint_requests_total Requests per endpoint
# TYPE endpoint_requests_total counter
"#,
            snapshot.inpaint_runs,
            snapshot.inpaint_failures,
            snapshot.inpaint_latency_avg_ms,
            snapshot.ocr_requests,
            snapshot.ocr_selections,
            snapshot.ocr_item_errors,
            snapshot.ocr_empty_results,
            snapshot.api_calls_total,
            snapshot.api_calls_failed,
            snapshot.api_latency_avg_ms,
            snapshot.texts_translated,
            snapshot.circuit_breaker_trips,
            snapshot.uptime_seconds,
        );

        for (endpoint, count) in &snapshot.endpoint_requests {
            out.push_str(&format!(
                "endpoint_requests_total{{endpoint=\"{}\"}} {}\n",
                endpoint, count
            ));
        }
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub inpaint_runs: usize,
    pub inpaint_failures: usize,
    pub inpaint_latency_avg_ms: u64,
    pub inpaint_latency_p95_ms: u64,
    pub ocr_requests: usize,
    pub ocr_selections: usize,
    pub ocr_item_errors: usize,
    pub ocr_empty_results: usize,
    pub ocr_latency_avg_ms: u64,
    pub api_calls_total: usize,
    pub api_calls_success: usize,
    pub api_calls_failed: usize,
    pub api_latency_avg_ms: u64,
    pub api_latency_p50_ms: u64,
    pub api_latency_p95_ms: u64,
    pub texts_translated: u64,
    pub endpoint_requests: BTreeMap<String, usize>,
    pub circuit_breaker_trips: usize,
    pub uptime_seconds: u64,
}

fn percentile(values: &VecDeque<u64>, p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted: Vec<u64> = values.iter().copied().collect();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &VecDeque<u64>) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_inpaint(true, Duration::from_millis(300));
        metrics.record_inpaint(false, Duration::from_millis(100));
        metrics.record_ocr_request(3, 1, 1, Duration::from_millis(40));
        metrics.record_api_call(true, Duration::from_millis(100), 4);
        metrics.record_api_call(false, Duration::from_millis(50), 4);
        metrics.record_endpoint_request("/ocr");
        metrics.record_endpoint_request("/ocr");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.inpaint_runs, 2);
        assert_eq!(snapshot.inpaint_failures, 1);
        assert_eq!(snapshot.inpaint_latency_avg_ms, 200);
        assert_eq!(snapshot.ocr_selections, 3);
        assert_eq!(snapshot.ocr_item_errors, 1);
        assert_eq!(snapshot.api_calls_total, 2);
        assert_eq!(snapshot.api_calls_failed, 1);
        assert_eq!(snapshot.texts_translated, 4);
        assert_eq!(snapshot.endpoint_requests.get("/ocr"), Some(&2));
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let metrics = Metrics::new();
        metrics.record_inpaint(true, Duration::from_millis(999));
        for _ in 0..MAX_LATENCY_SAMPLES {
            metrics.record_inpaint(true, Duration::from_millis(1));
        }

        let window = metrics.inner.inpaint_latency_ms.read();
        assert_eq!(window.len(), MAX_LATENCY_SAMPLES);
        // Oldest sample is evicted first
        assert!(window.iter().all(|&ms| ms == 1));
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_api_call(true, Duration::from_millis(100), 2);
        metrics.record_endpoint_request("/translate");

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("api_calls_total 1"));
        assert!(prometheus.contains("texts_translated_total 2"));
        assert!(prometheus.contains("endpoint_requests_total{endpoint=\"/translate\"} 1"));
    }
}
