//! Operation metrics
//!
//! A size-bounded log of store, notification, validation and consistency
//! operations with derived views for operators:
//! - aggregate summary by operation and error
//! - cache hit rate and error rate
//! - rolling throughput
//! - most frequent error messages
//!
//! Purely observational: nothing reads these numbers to make decisions.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::config::MetricsConfig;

/// Metadata key set on reads to record whether the cache served them
pub const CACHE_HIT_KEY: &str = "cacheHit";

/// Kind of operation being measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Get,
    Refresh,
    Create,
    Update,
    Broadcast,
    Validate,
    ConsistencyCheck,
    Remediate,
}

impl Operation {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Refresh => "refresh",
            Self::Create => "create",
            Self::Update => "update",
            Self::Broadcast => "broadcast",
            Self::Validate => "validate",
            Self::ConsistencyCheck => "consistency_check",
            Self::Remediate => "remediate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMetric {
    pub operation: Operation,
    pub project_id: Option<String>,
    pub duration_ms: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl OperationMetric {
    /// Whether a read was served from cache, if recorded
    pub fn cache_hit(&self) -> Option<bool> {
        self.metadata.get(CACHE_HIT_KEY).and_then(Value::as_bool)
    }
}

/// Measures one in-flight operation
#[derive(Debug)]
pub struct OperationTimer {
    operation: Operation,
    project_id: Option<String>,
    started: Instant,
    metadata: Map<String, Value>,
}

impl OperationTimer {
    pub fn new(operation: Operation, project_id: Option<&str>) -> Self {
        Self {
            operation,
            project_id: project_id.map(str::to_string),
            started: Instant::now(),
            metadata: Map::new(),
        }
    }

    /// Attach a metadata value
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn finish(self, error: Option<String>) -> OperationMetric {
        OperationMetric {
            operation: self.operation,
            project_id: self.project_id,
            duration_ms: self.started.elapsed().as_secs_f64() * 1000.0,
            success: error.is_none(),
            error,
            metadata: self.metadata,
            timestamp: Utc::now(),
        }
    }
}

/// Per-operation aggregate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStats {
    pub count: usize,
    pub failures: usize,
    pub average_duration_ms: f64,
}

/// Aggregate view over the retained records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    pub average_duration_ms: f64,
    pub cache_hit_rate: f64,
    pub error_rate: f64,
    /// Operations inside the throughput window
    pub recent_throughput: usize,
    pub by_operation: BTreeMap<String, OperationStats>,
    pub by_error: BTreeMap<String, usize>,
}

/// Bounded, most-recent-N operation log
#[derive(Debug)]
pub struct MetricsCollector {
    max_records: usize,
    throughput_window: Duration,
    top_errors: usize,
    records: RwLock<VecDeque<OperationMetric>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::from_config(&MetricsConfig::default())
    }
}

impl MetricsCollector {
    /// Create a collector keeping at most `max_records` entries
    pub fn new(max_records: usize, throughput_window: Duration) -> Self {
        Self {
            max_records: max_records.max(1),
            throughput_window,
            top_errors: MetricsConfig::default().top_errors,
            records: RwLock::new(VecDeque::new()),
        }
    }

    /// Create a collector from config
    pub fn from_config(config: &MetricsConfig) -> Self {
        let mut collector = Self::new(
            config.max_records,
            Duration::from_secs(config.throughput_window_secs),
        );
        collector.top_errors = config.top_errors;
        collector
    }

    /// Start timing an operation
    pub fn start(&self, operation: Operation, project_id: &str) -> OperationTimer {
        OperationTimer::new(operation, Some(project_id))
    }

    /// Record a successful operation
    pub fn succeed(&self, timer: OperationTimer) -> OperationMetric {
        let metric = timer.finish(None);
        self.record(metric.clone());
        metric
    }

    /// Record a failed operation
    pub fn fail(&self, timer: OperationTimer, error: impl fmt::Display) -> OperationMetric {
        let metric = timer.finish(Some(error.to_string()));
        self.record(metric.clone());
        metric
    }

    /// Append a record, dropping the oldest past capacity
    pub fn record(&self, metric: OperationMetric) {
        tracing::trace!(
            operation = %metric.operation,
            project_id = metric.project_id.as_deref().unwrap_or("-"),
            duration_ms = metric.duration_ms,
            success = metric.success,
            "Recorded operation"
        );

        if let Ok(mut records) = self.records.write() {
            records.push_back(metric);
            while records.len() > self.max_records {
                records.pop_front();
            }
        }
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all records
    pub fn clear(&self) {
        if let Ok(mut records) = self.records.write() {
            records.clear();
        }
    }

    /// Most recent records, newest first
    pub fn recent(&self, limit: usize) -> Vec<OperationMetric> {
        self.records
            .read()
            .map(|r| r.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Records for one project, oldest first
    pub fn for_project(&self, project_id: &str) -> Vec<OperationMetric> {
        self.records
            .read()
            .map(|r| {
                r.iter()
                    .filter(|m| m.project_id.as_deref() == Some(project_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Share of reads that carried a cache-hit flag and were hits
    pub fn cache_hit_rate(&self) -> f64 {
        let Ok(records) = self.records.read() else {
            return 0.0;
        };
        let flags: Vec<bool> = records.iter().filter_map(OperationMetric::cache_hit).collect();
        if flags.is_empty() {
            return 0.0;
        }
        flags.iter().filter(|hit| **hit).count() as f64 / flags.len() as f64
    }

    /// Share of failed operations
    pub fn error_rate(&self) -> f64 {
        let Ok(records) = self.records.read() else {
            return 0.0;
        };
        if records.is_empty() {
            return 0.0;
        }
        records.iter().filter(|m| !m.success).count() as f64 / records.len() as f64
    }

    /// Operations recorded inside the throughput window
    pub fn throughput(&self) -> usize {
        let window = ChronoDuration::from_std(self.throughput_window)
            .unwrap_or_else(|_| ChronoDuration::seconds(60));
        let cutoff = Utc::now() - window;
        self.records
            .read()
            .map(|r| r.iter().filter(|m| m.timestamp >= cutoff).count())
            .unwrap_or(0)
    }

    /// Most frequent error messages, highest count first
    pub fn top_errors(&self, limit: usize) -> Vec<(String, usize)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        if let Ok(records) = self.records.read() {
            for error in records.iter().filter_map(|m| m.error.as_ref()) {
                *counts.entry(error.clone()).or_insert(0) += 1;
            }
        }
        let mut sorted: Vec<(String, usize)> = counts.into_iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        sorted.truncate(limit);
        sorted
    }

    /// Aggregate summary over the retained records
    pub fn summary(&self) -> MetricsSummary {
        let mut summary = MetricsSummary {
            cache_hit_rate: self.cache_hit_rate(),
            error_rate: self.error_rate(),
            recent_throughput: self.throughput(),
            ..Default::default()
        };

        let Ok(records) = self.records.read() else {
            return summary;
        };

        let mut total_duration = 0.0;
        let mut durations: BTreeMap<String, f64> = BTreeMap::new();
        for metric in records.iter() {
            summary.total_operations += 1;
            total_duration += metric.duration_ms;
            if metric.success {
                summary.successful_operations += 1;
            } else {
                summary.failed_operations += 1;
            }

            let key = metric.operation.as_str().to_string();
            let stats = summary.by_operation.entry(key.clone()).or_default();
            stats.count += 1;
            if !metric.success {
                stats.failures += 1;
            }
            *durations.entry(key).or_insert(0.0) += metric.duration_ms;

            if let Some(error) = &metric.error {
                *summary.by_error.entry(error.clone()).or_insert(0) += 1;
            }
        }

        if summary.total_operations > 0 {
            summary.average_duration_ms = total_duration / summary.total_operations as f64;
        }
        for (key, stats) in summary.by_operation.iter_mut() {
            if let Some(total) = durations.get(key) {
                stats.average_duration_ms = total / stats.count as f64;
            }
        }

        summary
    }

    /// Configured length of the top-errors table
    pub fn top_errors_limit(&self) -> usize {
        self.top_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(operation: Operation, success: bool, error: Option<&str>) -> OperationMetric {
        OperationMetric {
            operation,
            project_id: Some("p1".to_string()),
            duration_ms: 10.0,
            success,
            error: error.map(str::to_string),
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_ring_buffer_keeps_most_recent() {
        let collector = MetricsCollector::new(3, Duration::from_secs(60));
        for i in 0..5 {
            let mut m = metric(Operation::Get, true, None);
            m.duration_ms = i as f64;
            collector.record(m);
        }
        assert_eq!(collector.len(), 3);
        let recent = collector.recent(10);
        assert_eq!(recent[0].duration_ms, 4.0);
        assert_eq!(recent[2].duration_ms, 2.0);
    }

    #[test]
    fn test_timer_records_success_and_failure() {
        let collector = MetricsCollector::default();

        let mut timer = collector.start(Operation::Get, "p1");
        timer.set(CACHE_HIT_KEY, true);
        let ok = collector.succeed(timer);
        assert!(ok.success);
        assert_eq!(ok.cache_hit(), Some(true));

        let timer = collector.start(Operation::Update, "p1");
        let failed = collector.fail(timer, "disk full");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("disk full"));

        assert_eq!(collector.len(), 2);
        assert_eq!(collector.for_project("p1").len(), 2);
        assert!(collector.for_project("p2").is_empty());
    }

    #[test]
    fn test_cache_hit_rate() {
        let collector = MetricsCollector::default();
        assert_eq!(collector.cache_hit_rate(), 0.0);

        for hit in [true, true, false, true] {
            let mut timer = collector.start(Operation::Get, "p1");
            timer.set(CACHE_HIT_KEY, hit);
            collector.succeed(timer);
        }
        // Updates carry no flag and are ignored
        collector.record(metric(Operation::Update, true, None));

        assert!((collector.cache_hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_error_rate_and_top_errors() {
        let collector = MetricsCollector::default();
        collector.record(metric(Operation::Update, false, Some("timeout")));
        collector.record(metric(Operation::Update, false, Some("timeout")));
        collector.record(metric(Operation::Get, false, Some("not found")));
        collector.record(metric(Operation::Get, true, None));

        assert!((collector.error_rate() - 0.75).abs() < f64::EPSILON);
        let top = collector.top_errors(1);
        assert_eq!(top, vec![("timeout".to_string(), 2)]);
        assert_eq!(collector.top_errors(5).len(), 2);
    }

    #[test]
    fn test_throughput_excludes_old_records() {
        let collector = MetricsCollector::new(100, Duration::from_secs(60));
        let mut old = metric(Operation::Get, true, None);
        old.timestamp = Utc::now() - ChronoDuration::seconds(120);
        collector.record(old);
        collector.record(metric(Operation::Get, true, None));
        collector.record(metric(Operation::Update, true, None));

        assert_eq!(collector.throughput(), 2);
    }

    #[test]
    fn test_summary_breakdown() {
        let collector = MetricsCollector::default();
        let mut fast = metric(Operation::Get, true, None);
        fast.duration_ms = 2.0;
        let mut slow = metric(Operation::Get, true, None);
        slow.duration_ms = 4.0;
        collector.record(fast);
        collector.record(slow);
        collector.record(metric(Operation::Update, false, Some("write failed")));

        let summary = collector.summary();
        assert_eq!(summary.total_operations, 3);
        assert_eq!(summary.successful_operations, 2);
        assert_eq!(summary.failed_operations, 1);
        assert_eq!(summary.by_operation["get"].count, 2);
        assert!((summary.by_operation["get"].average_duration_ms - 3.0).abs() < f64::EPSILON);
        assert_eq!(summary.by_operation["update"].failures, 1);
        assert_eq!(summary.by_error["write failed"], 1);
    }

    #[test]
    fn test_clear() {
        let collector = MetricsCollector::default();
        collector.record(metric(Operation::Get, true, None));
        collector.clear();
        assert!(collector.is_empty());
        assert_eq!(collector.summary().total_operations, 0);
    }
}
