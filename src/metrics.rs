// Performance metrics module
//
// Provides lightweight counters for one orchestrator lifetime

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Pipeline metrics.
///
/// Uses atomic operations so plugins and the coordinator can record through a
/// shared reference. Logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Files handed to the parser that produced output
    pub files_parsed: AtomicUsize,

    /// Files for which the parser reported nothing to document
    pub files_empty: AtomicUsize,

    /// Files dropped by include / exclude filtering
    pub files_filtered: AtomicUsize,

    /// Files or fragments that failed to parse
    pub parse_failures: AtomicUsize,

    /// Records appended to the Doc Database
    pub records_added: AtomicUsize,

    /// Records produced from virtual code
    pub virtual_records: AtomicUsize,

    /// Completed generation passes (first pass plus regenerations)
    pub passes: AtomicUsize,

    /// Individual plugin hook invocations
    pub hook_invocations: AtomicU64,

    /// Total time spent parsing in milliseconds
    pub total_parse_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            files_parsed: AtomicUsize::new(0),
            files_empty: AtomicUsize::new(0),
            files_filtered: AtomicUsize::new(0),
            parse_failures: AtomicUsize::new(0),
            records_added: AtomicUsize::new(0),
            virtual_records: AtomicUsize::new(0),
            passes: AtomicUsize::new(0),
            hook_invocations: AtomicU64::new(0),
            total_parse_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_file_parsed(&self, records: usize) {
        self.files_parsed.fetch_add(1, Ordering::Relaxed);
        self.records_added.fetch_add(records, Ordering::Relaxed);
    }

    pub fn record_file_empty(&self) {
        self.files_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_files_filtered(&self, count: usize) {
        self.files_filtered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_virtual(&self, records: usize) {
        self.virtual_records.fetch_add(records, Ordering::Relaxed);
        self.records_added.fetch_add(records, Ordering::Relaxed);
    }

    pub fn record_pass(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hook_invocation(&self) {
        self.hook_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_time(&self, duration: Duration) {
        self.total_parse_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average parse time per parsed file in milliseconds.
    pub fn avg_parse_time_ms(&self) -> f64 {
        let total = self.total_parse_time_ms.load(Ordering::Relaxed);
        let count = self.files_parsed.load(Ordering::Relaxed) + self.files_empty.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Generation Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s, passes: {}", self.uptime().as_secs_f64(), self.passes.load(Ordering::Relaxed));
        tracing::info!(
            "Files: {} parsed, {} empty, {} filtered out, {} failed",
            self.files_parsed.load(Ordering::Relaxed),
            self.files_empty.load(Ordering::Relaxed),
            self.files_filtered.load(Ordering::Relaxed),
            self.parse_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Records: {} added ({} virtual), avg parse {:.2}ms",
            self.records_added.load(Ordering::Relaxed),
            self.virtual_records.load(Ordering::Relaxed),
            self.avg_parse_time_ms()
        );
        tracing::info!("Hook invocations: {}", self.hook_invocations.load(Ordering::Relaxed));
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.files_parsed.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.parse_failures.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_file_operations() {
        let metrics = Metrics::new();

        metrics.record_file_parsed(3);
        metrics.record_file_parsed(2);
        metrics.record_file_empty();
        metrics.record_parse_failure();
        metrics.record_virtual(4);

        assert_eq!(metrics.files_parsed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.files_empty.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.parse_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.records_added.load(Ordering::Relaxed), 9);
        assert_eq!(metrics.virtual_records.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn test_avg_parse_time() {
        let metrics = Metrics::new();

        metrics.record_file_parsed(1);
        metrics.record_parse_time(Duration::from_millis(100));
        metrics.record_file_empty();
        metrics.record_parse_time(Duration::from_millis(200));

        assert_eq!(metrics.total_parse_time_ms.load(Ordering::Relaxed), 300);
        assert_eq!(metrics.avg_parse_time_ms(), 150.0);
    }

    #[test]
    fn test_avg_parse_time_no_files() {
        let metrics = Metrics::new();
        assert_eq!(metrics.avg_parse_time_ms(), 0.0);
    }
}
