//! Prometheus metrics export.

use prometheus::Registry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Histogram bucket boundaries in milliseconds for publish duration.
/// Converts to seconds: [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0]
const PUBLISH_DURATION_BUCKETS_MS: [u64; 7] = [5, 10, 25, 50, 100, 250, 1000];

/// Pipeline metrics with counters, gauges, and a publish-duration histogram.
pub struct PipelineMetrics {
    // === COUNTERS ===
    /// Total records fetched from the source log
    records_total: AtomicU64,

    /// Total records published to a destination log
    published_total: AtomicU64,

    /// Records skipped because the payload failed structural validation
    decode_errors_total: AtomicU64,

    /// Records skipped because enrichment failed
    enrich_errors_total: AtomicU64,

    /// Records dropped after publish retries were exhausted
    publish_errors_total: AtomicU64,

    /// Transient fetch failures (the loop backs off and continues)
    fetch_errors_total: AtomicU64,

    /// Fetches that returned zero records
    empty_fetches_total: AtomicU64,

    /// Successful cursor resumes after expiry
    cursor_resumes_total: AtomicU64,

    /// Records routed to the USA destination
    routed_usa_total: AtomicU64,

    /// Records routed to the International destination
    routed_international_total: AtomicU64,

    // === GAUGES ===
    /// Partition loops currently running
    partitions_active: AtomicU64,

    // === HISTOGRAM: publish_duration_seconds ===
    publish_duration_sum_ms: AtomicU64,
    publish_duration_count: AtomicU64,
    /// Bucket counts; the last slot is +Inf
    publish_duration_buckets: [AtomicU64; 8],

    /// Prometheus registry (optional)
    #[allow(dead_code)]
    registry: Option<Registry>,
}

impl PipelineMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            records_total: AtomicU64::new(0),
            published_total: AtomicU64::new(0),
            decode_errors_total: AtomicU64::new(0),
            enrich_errors_total: AtomicU64::new(0),
            publish_errors_total: AtomicU64::new(0),
            fetch_errors_total: AtomicU64::new(0),
            empty_fetches_total: AtomicU64::new(0),
            cursor_resumes_total: AtomicU64::new(0),
            routed_usa_total: AtomicU64::new(0),
            routed_international_total: AtomicU64::new(0),
            partitions_active: AtomicU64::new(0),
            publish_duration_sum_ms: AtomicU64::new(0),
            publish_duration_count: AtomicU64::new(0),
            publish_duration_buckets: Default::default(),
            registry: None,
        }
    }

    /// Record one fetched record.
    pub fn record_fetched(&self) {
        self.records_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful publish and its duration.
    pub fn record_published(&self, usa: bool, duration: Duration) {
        self.published_total.fetch_add(1, Ordering::Relaxed);
        if usa {
            self.routed_usa_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.routed_international_total.fetch_add(1, Ordering::Relaxed);
        }

        let ms = duration.as_millis() as u64;
        self.publish_duration_sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.publish_duration_count.fetch_add(1, Ordering::Relaxed);
        for (i, bound) in PUBLISH_DURATION_BUCKETS_MS.iter().enumerate() {
            if ms <= *bound {
                self.publish_duration_buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        self.publish_duration_buckets[7].fetch_add(1, Ordering::Relaxed);
    }

    /// Record a skipped record by error kind.
    pub fn record_decode_error(&self) {
        self.decode_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enrich_error(&self) {
        self.enrich_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_error(&self) {
        self.publish_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_error(&self) {
        self.fetch_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_fetch(&self) {
        self.empty_fetches_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cursor_resume(&self) {
        self.cursor_resumes_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Track partition loop lifecycle.
    pub fn partition_started(&self) {
        self.partitions_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn partition_stopped(&self) {
        self.partitions_active.fetch_sub(1, Ordering::Relaxed);
    }

    // === ACCESSORS ===

    pub fn records_total(&self) -> u64 {
        self.records_total.load(Ordering::Relaxed)
    }

    pub fn published_total(&self) -> u64 {
        self.published_total.load(Ordering::Relaxed)
    }

    pub fn decode_errors_total(&self) -> u64 {
        self.decode_errors_total.load(Ordering::Relaxed)
    }

    pub fn enrich_errors_total(&self) -> u64 {
        self.enrich_errors_total.load(Ordering::Relaxed)
    }

    pub fn publish_errors_total(&self) -> u64 {
        self.publish_errors_total.load(Ordering::Relaxed)
    }

    pub fn fetch_errors_total(&self) -> u64 {
        self.fetch_errors_total.load(Ordering::Relaxed)
    }

    pub fn empty_fetches_total(&self) -> u64 {
        self.empty_fetches_total.load(Ordering::Relaxed)
    }

    pub fn cursor_resumes_total(&self) -> u64 {
        self.cursor_resumes_total.load(Ordering::Relaxed)
    }

    pub fn routed_usa_total(&self) -> u64 {
        self.routed_usa_total.load(Ordering::Relaxed)
    }

    pub fn routed_international_total(&self) -> u64 {
        self.routed_international_total.load(Ordering::Relaxed)
    }

    pub fn partitions_active(&self) -> u64 {
        self.partitions_active.load(Ordering::Relaxed)
    }

    /// Skipped records across all per-record error kinds.
    pub fn skipped_total(&self) -> u64 {
        self.decode_errors_total() + self.enrich_errors_total() + self.publish_errors_total()
    }

    /// Get publish duration histogram data for Prometheus export.
    pub fn publish_duration_histogram(&self) -> HistogramSnapshot {
        let buckets = PUBLISH_DURATION_BUCKETS_MS
            .iter()
            .enumerate()
            .map(|(i, bound)| {
                (
                    *bound as f64 / 1000.0,
                    self.publish_duration_buckets[i].load(Ordering::Relaxed),
                )
            })
            .collect();

        HistogramSnapshot {
            buckets,
            inf_bucket: self.publish_duration_buckets[7].load(Ordering::Relaxed),
            sum_seconds: self.publish_duration_sum_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            count: self.publish_duration_count.load(Ordering::Relaxed),
        }
    }

    /// Export all metrics in Prometheus text exposition format.
    pub fn export_prometheus_text(&self) -> String {
        let mut output = String::with_capacity(4096);
        let histogram = self.publish_duration_histogram();

        let counter = |out: &mut String, name: &str, help: &str, value: u64| {
            out.push_str(&format!("# HELP sessionroute_{name} {help}\n"));
            out.push_str(&format!("# TYPE sessionroute_{name} counter\n"));
            out.push_str(&format!("sessionroute_{name} {value}\n\n"));
        };

        counter(
            &mut output,
            "records_total",
            "Total records fetched from the source log",
            self.records_total(),
        );
        counter(
            &mut output,
            "published_total",
            "Total records published to destination logs",
            self.published_total(),
        );
        counter(
            &mut output,
            "decode_errors_total",
            "Records skipped due to decode failures",
            self.decode_errors_total(),
        );
        counter(
            &mut output,
            "enrich_errors_total",
            "Records skipped due to enrichment failures",
            self.enrich_errors_total(),
        );
        counter(
            &mut output,
            "publish_errors_total",
            "Records dropped after publish retries were exhausted",
            self.publish_errors_total(),
        );
        counter(
            &mut output,
            "fetch_errors_total",
            "Transient fetch failures",
            self.fetch_errors_total(),
        );
        counter(
            &mut output,
            "empty_fetches_total",
            "Fetches that returned zero records",
            self.empty_fetches_total(),
        );
        counter(
            &mut output,
            "cursor_resumes_total",
            "Successful cursor resumes after expiry",
            self.cursor_resumes_total(),
        );
        counter(
            &mut output,
            "routed_usa_total",
            "Records routed to the USA destination",
            self.routed_usa_total(),
        );
        counter(
            &mut output,
            "routed_international_total",
            "Records routed to the International destination",
            self.routed_international_total(),
        );

        output.push_str(
            "# HELP sessionroute_partitions_active Partition loops currently running\n",
        );
        output.push_str("# TYPE sessionroute_partitions_active gauge\n");
        output.push_str(&format!(
            "sessionroute_partitions_active {}\n\n",
            self.partitions_active()
        ));

        output.push_str(
            "# HELP sessionroute_publish_duration_seconds Time to publish one record\n",
        );
        output.push_str("# TYPE sessionroute_publish_duration_seconds histogram\n");
        for (le, count) in &histogram.buckets {
            output.push_str(&format!(
                "sessionroute_publish_duration_seconds_bucket{{le=\"{le}\"}} {count}\n"
            ));
        }
        output.push_str(&format!(
            "sessionroute_publish_duration_seconds_bucket{{le=\"+Inf\"}} {}\n",
            histogram.inf_bucket
        ));
        output.push_str(&format!(
            "sessionroute_publish_duration_seconds_sum {}\n",
            histogram.sum_seconds
        ));
        output.push_str(&format!(
            "sessionroute_publish_duration_seconds_count {}\n",
            histogram.count
        ));

        output
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Histogram data for Prometheus export.
pub struct HistogramSnapshot {
    /// Cumulative bucket counts as (upper bound in seconds, count)
    pub buckets: Vec<(f64, u64)>,
    /// Count for the +Inf bucket (all observations)
    pub inf_bucket: u64,
    /// Sum of observed durations in seconds
    pub sum_seconds: f64,
    /// Number of observations
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = PipelineMetrics::new();

        for _ in 0..5 {
            metrics.record_fetched();
        }
        metrics.record_decode_error();
        metrics.record_publish_error();

        assert_eq!(metrics.records_total(), 5);
        assert_eq!(metrics.decode_errors_total(), 1);
        assert_eq!(metrics.publish_errors_total(), 1);
        assert_eq!(metrics.skipped_total(), 2);
    }

    #[test]
    fn test_routing_split() {
        let metrics = PipelineMetrics::new();

        metrics.record_published(true, Duration::from_millis(3));
        metrics.record_published(false, Duration::from_millis(3));
        metrics.record_published(false, Duration::from_millis(3));

        assert_eq!(metrics.published_total(), 3);
        assert_eq!(metrics.routed_usa_total(), 1);
        assert_eq!(metrics.routed_international_total(), 2);
    }

    #[test]
    fn test_partition_gauge() {
        let metrics = PipelineMetrics::new();

        metrics.partition_started();
        metrics.partition_started();
        assert_eq!(metrics.partitions_active(), 2);

        metrics.partition_stopped();
        assert_eq!(metrics.partitions_active(), 1);
    }

    #[test]
    fn test_histogram_buckets_are_cumulative() {
        let metrics = PipelineMetrics::new();

        for ms in [3, 8, 40, 200, 2000] {
            metrics.record_published(true, Duration::from_millis(ms));
        }

        let histogram = metrics.publish_duration_histogram();
        assert_eq!(histogram.count, 5);
        assert_eq!(histogram.buckets[0].1, 1); // <= 5ms
        assert_eq!(histogram.buckets[1].1, 2); // <= 10ms
        assert_eq!(histogram.buckets[3].1, 3); // <= 50ms
        assert_eq!(histogram.buckets[5].1, 4); // <= 250ms
        assert_eq!(histogram.inf_bucket, 5);
    }

    #[test]
    fn test_prometheus_export_contains_series() {
        let metrics = PipelineMetrics::new();
        metrics.record_fetched();
        metrics.record_published(true, Duration::from_millis(7));

        let text = metrics.export_prometheus_text();
        assert!(text.contains("sessionroute_records_total 1"));
        assert!(text.contains("sessionroute_published_total 1"));
        assert!(text.contains("sessionroute_publish_duration_seconds_bucket{le=\"+Inf\"} 1"));
        assert!(text.contains("# TYPE sessionroute_partitions_active gauge"));
    }
}
