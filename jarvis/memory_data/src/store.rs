use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use jarvis_model::{ConfigHandle, SharedClock, SystemClock, TestType};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use shared_logging::{LogLevel, Telemetry};
use thiserror::Error;

use crate::{
    bounded::BoundedLog,
    records::{
        ActiveTest, FailureType, LearningRecord, LearningRecordType, MemoryEntry, MemoryType,
        Pattern, TestFailure, TestResult,
    },
};

/// Errors raised inside the store; public operations log them and degrade
/// to an empty result or a no-op.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Keys identify entries and cannot be blank.
    #[error("memory key must not be empty")]
    EmptyKey,
    /// A payload could not be rendered as JSON.
    #[error("serializing {what}: {source}")]
    Serialization {
        /// What was being serialized.
        what: &'static str,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Counts removed by one retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Typed entries across all buckets.
    pub entries: usize,
    /// Active tests older than the retention window.
    pub active_tests: usize,
    /// Failures.
    pub failures: usize,
    /// Results.
    pub results: usize,
    /// Learning records.
    pub learning_records: usize,
}

impl CleanupReport {
    /// Everything removed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.entries + self.active_tests + self.failures + self.results + self.learning_records
    }
}

/// Point-in-time store statistics.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStatistics {
    /// Entries per typed bucket.
    pub buckets: IndexMap<MemoryType, usize>,
    /// Active tests.
    pub active_tests: usize,
    /// Retained failures.
    pub recent_failures: usize,
    /// Retained results.
    pub test_results: usize,
    /// Share of retained results that passed (0 when none).
    pub test_success_rate: f64,
    /// Retained learning records.
    pub learning_records: usize,
    /// Cached patterns.
    pub patterns: usize,
    /// When computed.
    pub generated_at: DateTime<Utc>,
}

/// Thread-shared memory store.
///
/// Each collection sits behind its own lock; caps and retention come from
/// the live configuration on every call.
#[derive(Debug)]
pub struct MemoryStore {
    config: ConfigHandle,
    clock: SharedClock,
    buckets: IndexMap<MemoryType, BoundedLog<MemoryEntry>>,
    active_tests: RwLock<IndexMap<String, ActiveTest>>,
    failures: BoundedLog<TestFailure>,
    results: BoundedLog<TestResult>,
    learning: BoundedLog<LearningRecord>,
    patterns: RwLock<IndexMap<String, Pattern>>,
    telemetry: Option<Telemetry>,
}

impl MemoryStore {
    /// Creates an empty store reading caps from `config`.
    #[must_use]
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            buckets: MemoryType::ALL
                .iter()
                .map(|memory_type| (*memory_type, BoundedLog::new()))
                .collect(),
            active_tests: RwLock::new(IndexMap::new()),
            failures: BoundedLog::new(),
            results: BoundedLog::new(),
            learning: BoundedLog::new(),
            patterns: RwLock::new(IndexMap::new()),
            telemetry: None,
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Current instant according to the store's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The store's clock, for callers that must agree with its windows.
    #[must_use]
    pub fn clock(&self) -> SharedClock {
        Arc::clone(&self.clock)
    }

    /// Stores a typed entry; failures are logged and yield `None`.
    pub fn store(
        &self,
        key: impl Into<String>,
        memory_type: MemoryType,
        value: Value,
    ) -> Option<MemoryEntry> {
        match self.try_store(key, memory_type, value) {
            Ok(entry) => Some(entry),
            Err(err) => {
                self.log_failure("memory.store.failed", &err);
                None
            }
        }
    }

    /// Serializes `value` and stores it; failures are logged and yield `None`.
    pub fn store_serialized<T: Serialize>(
        &self,
        key: impl Into<String>,
        memory_type: MemoryType,
        value: &T,
    ) -> Option<MemoryEntry> {
        match serde_json::to_value(value) {
            Ok(value) => self.store(key, memory_type, value),
            Err(source) => {
                self.log_failure(
                    "memory.store.failed",
                    &MemoryError::Serialization {
                        what: "entry value",
                        source,
                    },
                );
                None
            }
        }
    }

    /// Stores a typed entry, surfacing validation errors.
    pub fn try_store(
        &self,
        key: impl Into<String>,
        memory_type: MemoryType,
        value: Value,
    ) -> Result<MemoryEntry, MemoryError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(MemoryError::EmptyKey);
        }
        let entry = MemoryEntry::new(key, memory_type, value, self.now());
        self.insert_entry(entry.clone());
        Ok(entry)
    }

    fn insert_entry(&self, entry: MemoryEntry) {
        let cap = self.config.current().memory.max_entries_per_type;
        let memory_type = entry.memory_type;
        if let Some(bucket) = self.buckets.get(&memory_type) {
            let evicted = bucket.push(entry, cap);
            if evicted > 0 {
                self.log(
                    LogLevel::Debug,
                    "memory.bucket.evicted",
                    json!({ "type": memory_type, "evicted": evicted, "cap": cap }),
                );
            }
        }
    }

    /// Newest entry with exactly this key, across all buckets.
    #[must_use]
    pub fn retrieve_by_key(&self, key: &str) -> Option<MemoryEntry> {
        self.buckets
            .values()
            .filter_map(|bucket| bucket.find_newest(|entry| entry.key == key))
            .max_by_key(|entry| entry.timestamp)
    }

    /// Every entry in one bucket, oldest first.
    #[must_use]
    pub fn retrieve_by_type(&self, memory_type: MemoryType) -> Vec<MemoryEntry> {
        self.buckets
            .get(&memory_type)
            .map(BoundedLog::snapshot)
            .unwrap_or_default()
    }

    /// Entries stamped within `[start, end]`, oldest first.
    #[must_use]
    pub fn retrieve_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<MemoryEntry> {
        if start > end {
            return Vec::new();
        }
        let mut found: Vec<MemoryEntry> = self
            .buckets
            .values()
            .flat_map(|bucket| {
                bucket.filter(|entry| entry.timestamp >= start && entry.timestamp <= end)
            })
            .collect();
        found.sort_by_key(|entry| entry.timestamp);
        found
    }

    /// Case-insensitive substring search over keys and rendered values.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<MemoryEntry> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut found: Vec<MemoryEntry> = self
            .buckets
            .values()
            .flat_map(|bucket| {
                bucket.filter(|entry| {
                    entry.key.to_lowercase().contains(&needle)
                        || entry.value.to_string().to_lowercase().contains(&needle)
                })
            })
            .collect();
        found.sort_by_key(|entry| entry.timestamp);
        found
    }

    /// Registers (or replaces) an active test.
    pub fn add_active_test(&self, test: ActiveTest) {
        let id = test.id.clone();
        let count = {
            let mut active = self.active_tests.write();
            active.insert(id.clone(), test);
            active.len()
        };
        self.log(
            LogLevel::Info,
            "memory.active_test.added",
            json!({ "test_id": id, "active": count }),
        );
    }

    /// Removes an active test by id.
    pub fn remove_active_test(&self, id: &str) -> Option<ActiveTest> {
        let removed = self.active_tests.write().shift_remove(id);
        if removed.is_some() {
            self.log(
                LogLevel::Info,
                "memory.active_test.removed",
                json!({ "test_id": id }),
            );
        }
        removed
    }

    /// Active test by id.
    #[must_use]
    pub fn active_test(&self, id: &str) -> Option<ActiveTest> {
        self.active_tests.read().get(id).cloned()
    }

    /// Every active test in registration order.
    #[must_use]
    pub fn active_tests(&self) -> Vec<ActiveTest> {
        self.active_tests.read().values().cloned().collect()
    }

    /// Number of active tests.
    #[must_use]
    pub fn active_test_count(&self) -> usize {
        self.active_tests.read().len()
    }

    /// True when any active test has one of `types`.
    #[must_use]
    pub fn has_active_test_of(&self, types: &[TestType]) -> bool {
        self.active_tests
            .read()
            .values()
            .any(|test| types.contains(&test.test_type))
    }

    /// Records a failure and mirrors it as a `TEST_FAILURE` entry.
    pub fn add_test_failure(&self, failure: TestFailure) {
        let cap = self.config.current().memory.max_failures;
        let mirror = MemoryEntry::new(
            format!("failure_{}", failure.test_id),
            MemoryType::TestFailure,
            json!({
                "testId": failure.test_id,
                "failureType": failure.failure_type,
                "message": failure.message,
                "serviceName": failure.service_name,
                "severity": failure.severity,
            }),
            failure.timestamp,
        );
        let test_id = failure.test_id.clone();
        self.failures.push(failure, cap);
        self.insert_entry(mirror);
        self.log(
            LogLevel::Info,
            "memory.failure.recorded",
            json!({ "test_id": test_id, "retained": self.failures.len() }),
        );
    }

    /// Every retained failure, oldest first.
    #[must_use]
    pub fn recent_failures(&self) -> Vec<TestFailure> {
        self.failures.snapshot()
    }

    /// Failures observed at or after `since`.
    #[must_use]
    pub fn failures_since(&self, since: DateTime<Utc>) -> Vec<TestFailure> {
        self.failures.since(since)
    }

    /// Failures for one service.
    #[must_use]
    pub fn failures_by_service(&self, service: &str) -> Vec<TestFailure> {
        self.failures.filter(|failure| failure.service_name == service)
    }

    /// Failures of one category.
    #[must_use]
    pub fn failures_by_type(&self, failure_type: FailureType) -> Vec<TestFailure> {
        self.failures
            .filter(|failure| failure.failure_type == failure_type)
    }

    /// Records a result and mirrors it as a `TEST_RESULT` entry.
    pub fn add_test_result(&self, result: TestResult) {
        let cap = self.config.current().memory.max_results;
        let mirror = MemoryEntry::new(
            format!("result_{}", result.test_id),
            MemoryType::TestResult,
            json!({
                "testId": result.test_id,
                "status": result.status,
                "duration": result.duration_secs,
                "serviceName": result.service_name,
                "testType": result.test_type,
            }),
            result.timestamp,
        );
        let test_id = result.test_id.clone();
        self.results.push(result, cap);
        self.insert_entry(mirror);
        self.log(
            LogLevel::Debug,
            "memory.result.recorded",
            json!({ "test_id": test_id, "retained": self.results.len() }),
        );
    }

    /// Every retained result, oldest first.
    #[must_use]
    pub fn test_results(&self) -> Vec<TestResult> {
        self.results.snapshot()
    }

    /// Results finished at or after `since`.
    #[must_use]
    pub fn results_since(&self, since: DateTime<Utc>) -> Vec<TestResult> {
        self.results.since(since)
    }

    /// Results for one service.
    #[must_use]
    pub fn results_by_service(&self, service: &str) -> Vec<TestResult> {
        self.results.filter(|result| result.service_name == service)
    }

    /// Results of one test type.
    #[must_use]
    pub fn results_by_type(&self, test_type: TestType) -> Vec<TestResult> {
        self.results.filter(|result| result.test_type == test_type)
    }

    /// Records a learning observation and mirrors it as `LEARNING_DATA`.
    pub fn add_learning_record(&self, record: LearningRecord) {
        let cap = self.config.current().memory.max_learning_records;
        let key = format!(
            "learning_{}_{}",
            record.record_type.key_label(),
            record.timestamp.timestamp_millis()
        );
        let mirror = match serde_json::to_value(&record.data) {
            Ok(value) => Some(MemoryEntry::new(
                key,
                MemoryType::LearningData,
                value,
                record.timestamp,
            )),
            Err(source) => {
                self.log_failure(
                    "memory.learning.mirror_failed",
                    &MemoryError::Serialization {
                        what: "learning record",
                        source,
                    },
                );
                None
            }
        };
        self.learning.push(record, cap);
        if let Some(mirror) = mirror {
            self.insert_entry(mirror);
        }
    }

    /// Every retained learning record, oldest first.
    #[must_use]
    pub fn learning_records(&self) -> Vec<LearningRecord> {
        self.learning.snapshot()
    }

    /// Learning records of one kind.
    #[must_use]
    pub fn learning_records_by_type(&self, record_type: LearningRecordType) -> Vec<LearningRecord> {
        self.learning
            .filter(|record| record.record_type == record_type)
    }

    /// Upserts a pattern by name (last write wins).
    pub fn store_pattern(&self, pattern: Pattern) {
        self.patterns.write().insert(pattern.name.clone(), pattern);
    }

    /// Pattern by name.
    #[must_use]
    pub fn pattern(&self, name: &str) -> Option<Pattern> {
        self.patterns.read().get(name).cloned()
    }

    /// Every cached pattern in first-insertion order.
    #[must_use]
    pub fn all_patterns(&self) -> Vec<Pattern> {
        self.patterns.read().values().cloned().collect()
    }

    /// Patterns at or above `min`, strongest first.
    #[must_use]
    pub fn patterns_with_min_confidence(&self, min: f64) -> Vec<Pattern> {
        let mut found: Vec<Pattern> = self
            .patterns
            .read()
            .values()
            .filter(|pattern| pattern.confidence >= min)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        found
    }

    /// Drops every pattern.
    pub fn clear_patterns(&self) {
        self.patterns.write().clear();
    }

    /// Removes everything older than the retention window.
    pub fn cleanup_expired(&self) -> CleanupReport {
        let retention_hours = self.config.current().memory.retention_hours;
        let now = self.now();
        let cutoff = retention_cutoff(now, retention_hours);

        let entries = self
            .buckets
            .values()
            .map(|bucket| bucket.retain(|entry| !entry.is_expired(now, retention_hours)))
            .sum();
        let active_tests = {
            let mut active = self.active_tests.write();
            let before = active.len();
            active.retain(|_, test| test.started_at >= cutoff);
            before - active.len()
        };
        let report = CleanupReport {
            entries,
            active_tests,
            failures: self.failures.prune_before(cutoff),
            results: self.results.prune_before(cutoff),
            learning_records: self.learning.prune_before(cutoff),
        };
        self.log(
            LogLevel::Info,
            "memory.cleanup.completed",
            json!({ "removed": report, "retention_hours": retention_hours }),
        );
        if let Some(tel) = &self.telemetry {
            let _ = tel.event("memory.cleanup.completed", json!({ "removed": report.total() }));
        }
        report
    }

    /// Current statistics.
    #[must_use]
    pub fn statistics(&self) -> MemoryStatistics {
        let results = self.results.snapshot();
        let passed = results.iter().filter(|result| result.passed()).count();
        let test_success_rate = if results.is_empty() {
            0.0
        } else {
            ratio(passed, results.len())
        };
        MemoryStatistics {
            buckets: self
                .buckets
                .iter()
                .map(|(memory_type, bucket)| (*memory_type, bucket.len()))
                .collect(),
            active_tests: self.active_test_count(),
            recent_failures: self.failures.len(),
            test_results: results.len(),
            test_success_rate,
            learning_records: self.learning.len(),
            patterns: self.patterns.read().len(),
            generated_at: self.now(),
        }
    }

    /// Empties every collection.
    pub fn clear(&self) {
        for bucket in self.buckets.values() {
            bucket.clear();
        }
        self.active_tests.write().clear();
        self.failures.clear();
        self.results.clear();
        self.learning.clear();
        self.patterns.write().clear();
        self.log(LogLevel::Warn, "memory.cleared", json!({}));
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }

    fn log_failure(&self, message: &str, err: &MemoryError) {
        tracing::warn!(error = %err, "{message}");
        self.log(LogLevel::Warn, message, json!({ "error": err.to_string() }));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(ConfigHandle::default())
    }
}

/// Oldest timestamp kept by a sweep at `now`. A window reaching past the
/// representable range keeps everything.
fn retention_cutoff(now: DateTime<Utc>, retention_hours: i64) -> DateTime<Utc> {
    Duration::try_hours(retention_hours)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// `part / whole` as a float.
#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> f64 {
    part as f64 / whole as f64
}
