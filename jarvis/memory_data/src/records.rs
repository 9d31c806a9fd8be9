use std::fmt;

use chrono::{DateTime, Utc};
use jarvis_model::{Parameters, TestType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bounded::Timestamped;

/// Bucket a typed memory entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryType {
    /// Operator interactions.
    Interaction,
    /// Mirrored test results.
    TestResult,
    /// Mirrored test failures.
    TestFailure,
    /// Mirrored learning records.
    LearningData,
    /// Pattern snapshots.
    Pattern,
    /// Situational context.
    Context,
    /// System observations.
    System,
}

impl MemoryType {
    /// Every bucket.
    pub const ALL: [Self; 7] = [
        Self::Interaction,
        Self::TestResult,
        Self::TestFailure,
        Self::LearningData,
        Self::Pattern,
        Self::Context,
        Self::System,
    ];

    /// Upper-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interaction => "INTERACTION",
            Self::TestResult => "TEST_RESULT",
            Self::TestFailure => "TEST_FAILURE",
            Self::LearningData => "LEARNING_DATA",
            Self::Pattern => "PATTERN",
            Self::Context => "CONTEXT",
            Self::System => "SYSTEM",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed, keyed memory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique identifier.
    pub id: Uuid,
    /// Lookup key.
    pub key: String,
    /// Payload.
    pub value: serde_json::Value,
    /// Bucket.
    pub memory_type: MemoryType,
    /// When stored.
    pub timestamp: DateTime<Utc>,
    /// Optional lifetime shorter than the global retention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_hours: Option<i64>,
}

impl MemoryEntry {
    /// Creates an entry stamped at `timestamp`.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        memory_type: MemoryType,
        value: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            value,
            memory_type,
            timestamp,
            ttl_hours: None,
        }
    }

    /// Sets a per-entry lifetime.
    #[must_use]
    pub fn with_ttl_hours(mut self, hours: i64) -> Self {
        self.ttl_hours = Some(hours);
        self
    }

    /// True when the entry outlived its own TTL or the global retention.
    /// A window too large to represent never expires.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, retention_hours: i64) -> bool {
        let limit = self
            .ttl_hours
            .map_or(retention_hours, |ttl| ttl.min(retention_hours));
        chrono::Duration::try_hours(limit)
            .is_some_and(|window| now.signed_duration_since(self.timestamp) > window)
    }
}

impl Timestamped for MemoryEntry {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Lifecycle status reported by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    /// Queued, not started.
    Pending,
    /// In progress.
    Running,
    /// Finished successfully.
    Passed,
    /// Finished with assertion failures.
    Failed,
    /// Not executed.
    Skipped,
    /// Aborted by infrastructure.
    Error,
}

impl TestStatus {
    /// Upper-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
            Self::Error => "ERROR",
        }
    }
}

/// Test currently held by the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTest {
    /// Executor-assigned id.
    pub id: String,
    /// Display name.
    pub test_name: String,
    /// Target service.
    pub service_name: String,
    /// Category.
    pub test_type: TestType,
    /// Current status.
    pub status: TestStatus,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// Completion fraction in `[0, 1]`.
    pub progress: f64,
}

impl ActiveTest {
    /// A freshly started test.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        test_name: impl Into<String>,
        service_name: impl Into<String>,
        test_type: TestType,
    ) -> Self {
        Self {
            id: id.into(),
            test_name: test_name.into(),
            service_name: service_name.into(),
            test_type,
            status: TestStatus::Running,
            started_at: Utc::now(),
            progress: 0.0,
        }
    }

    /// Overrides the start instant.
    #[must_use]
    pub fn started_at(mut self, instant: DateTime<Utc>) -> Self {
        self.started_at = instant;
        self
    }
}

impl Timestamped for ActiveTest {
    fn timestamp(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Completed test outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    /// Executor-assigned id.
    pub test_id: String,
    /// Target service.
    pub service_name: String,
    /// Category.
    pub test_type: TestType,
    /// Final status.
    pub status: TestStatus,
    /// Wall-clock duration in seconds.
    pub duration_secs: f64,
    /// When the test finished.
    pub timestamp: DateTime<Utc>,
}

impl TestResult {
    /// Result stamped now.
    #[must_use]
    pub fn new(
        test_id: impl Into<String>,
        service_name: impl Into<String>,
        test_type: TestType,
        status: TestStatus,
        duration_secs: f64,
    ) -> Self {
        Self {
            test_id: test_id.into(),
            service_name: service_name.into(),
            test_type,
            status,
            duration_secs,
            timestamp: Utc::now(),
        }
    }

    /// Overrides the finish instant.
    #[must_use]
    pub fn at(mut self, instant: DateTime<Utc>) -> Self {
        self.timestamp = instant;
        self
    }

    /// True for a passing outcome.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

impl Timestamped for TestResult {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Failure category reported by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    /// Assertion did not hold.
    Assertion,
    /// Exceeded its time budget.
    Timeout,
    /// Could not reach a dependency.
    Connection,
    /// Dependency returned an error.
    Dependency,
    /// Ran out of CPU, memory, or quota.
    Resource,
    /// Anything else.
    Unknown,
}

impl FailureType {
    /// Upper-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Assertion => "ASSERTION",
            Self::Timeout => "TIMEOUT",
            Self::Connection => "CONNECTION",
            Self::Dependency => "DEPENDENCY",
            Self::Resource => "RESOURCE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad a failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FailureSeverity {
    /// Cosmetic.
    Low,
    /// Functional but contained.
    Medium,
    /// User-visible.
    High,
    /// Outage.
    Critical,
}

/// Failed test outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestFailure {
    /// Executor-assigned id.
    pub test_id: String,
    /// Target service.
    pub service_name: String,
    /// Category.
    pub failure_type: FailureType,
    /// Failure message.
    pub message: String,
    /// Severity.
    pub severity: FailureSeverity,
    /// When the failure was observed.
    pub timestamp: DateTime<Utc>,
}

impl TestFailure {
    /// Failure stamped now with medium severity.
    #[must_use]
    pub fn new(
        test_id: impl Into<String>,
        service_name: impl Into<String>,
        failure_type: FailureType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            test_id: test_id.into(),
            service_name: service_name.into(),
            failure_type,
            message: message.into(),
            severity: FailureSeverity::Medium,
            timestamp: Utc::now(),
        }
    }

    /// Sets severity.
    #[must_use]
    pub fn with_severity(mut self, severity: FailureSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Overrides the observation instant.
    #[must_use]
    pub fn at(mut self, instant: DateTime<Utc>) -> Self {
        self.timestamp = instant;
        self
    }
}

impl Timestamped for TestFailure {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Kind of learning record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LearningRecordType {
    /// One command → decision interaction.
    Interaction,
    /// Service usage skew snapshot.
    ServiceUsage,
    /// Trend snapshot.
    Trend,
    /// Optimization outcome.
    Optimization,
}

impl LearningRecordType {
    /// Lower-case label used in memory keys.
    #[must_use]
    pub const fn key_label(self) -> &'static str {
        match self {
            Self::Interaction => "interaction",
            Self::ServiceUsage => "service_usage",
            Self::Trend => "trend",
            Self::Optimization => "optimization",
        }
    }
}

/// Observation stored for the learning engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningRecord {
    /// Unique identifier.
    pub id: Uuid,
    /// Kind.
    pub record_type: LearningRecordType,
    /// Structured fields.
    pub data: Parameters,
    /// Optional one-line insight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
    /// When recorded.
    pub timestamp: DateTime<Utc>,
}

impl LearningRecord {
    /// Record stamped at `timestamp`.
    #[must_use]
    pub fn new(record_type: LearningRecordType, data: Parameters, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            record_type,
            data,
            insight: None,
            timestamp,
        }
    }

    /// Attaches an insight line.
    #[must_use]
    pub fn with_insight(mut self, insight: impl Into<String>) -> Self {
        self.insight = Some(insight.into());
        self
    }
}

impl Timestamped for LearningRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Learned association between a key and a confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Derived key (`RUN_TESTS_RUN_TESTS`, `risk_HIGH`, ...).
    pub name: String,
    /// Moving-average confidence in `[0, 1]`.
    pub confidence: f64,
    /// Observations folded into the average.
    pub frequency: u64,
    /// Human-readable description.
    pub description: String,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl Pattern {
    /// Creates a pattern.
    #[must_use]
    pub fn new(name: impl Into<String>, confidence: f64, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            frequency: 1,
            description: description.into(),
            updated_at: Utc::now(),
        }
    }
}
