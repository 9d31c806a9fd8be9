use std::fmt;

use chrono::{DateTime, Utc};
use jarvis_model::{Parameters, Priority, TestType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the executor is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    /// Generic test run.
    RunTests,
    /// Load and latency suites.
    RunPerformanceTests,
    /// Security and penetration suites.
    RunSecurityTests,
    /// Cross-service suites.
    RunIntegrationTests,
    /// High-risk run fenced off from shared environments.
    RunIsolatedTests,
    /// Fault-injection experiments.
    RunChaosTests,
    /// Failure triage.
    AnalyzeFailures,
    /// Test generation.
    GenerateTests,
    /// Suite optimisation.
    OptimizeTests,
    /// Health probe.
    HealthCheck,
    /// Status and resource monitoring.
    MonitorSystem,
    /// Report or help output.
    GenerateReport,
    /// Retry later; resources are exhausted.
    QueueAction,
    /// Ask the operator to rephrase.
    RequestClarification,
    /// Nothing sensible to do.
    Unknown,
}

impl ActionType {
    /// Stable upper-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunTests => "RUN_TESTS",
            Self::RunPerformanceTests => "RUN_PERFORMANCE_TESTS",
            Self::RunSecurityTests => "RUN_SECURITY_TESTS",
            Self::RunIntegrationTests => "RUN_INTEGRATION_TESTS",
            Self::RunIsolatedTests => "RUN_ISOLATED_TESTS",
            Self::RunChaosTests => "RUN_CHAOS_TESTS",
            Self::AnalyzeFailures => "ANALYZE_FAILURES",
            Self::GenerateTests => "GENERATE_TESTS",
            Self::OptimizeTests => "OPTIMIZE_TESTS",
            Self::HealthCheck => "HEALTH_CHECK",
            Self::MonitorSystem => "MONITOR_SYSTEM",
            Self::GenerateReport => "GENERATE_REPORT",
            Self::QueueAction => "QUEUE_ACTION",
            Self::RequestClarification => "REQUEST_CLARIFICATION",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Opening phrase of the action description.
    #[must_use]
    pub const fn phrase(self) -> &'static str {
        match self {
            Self::RunTests => "Executing test suite",
            Self::RunPerformanceTests => "Running performance tests",
            Self::RunSecurityTests => "Executing security tests",
            Self::RunIntegrationTests => "Running integration tests",
            Self::RunIsolatedTests => "Executing tests in isolated environment",
            Self::RunChaosTests => "Running chaos experiments",
            Self::AnalyzeFailures => "Analyzing recent test failures",
            Self::GenerateTests => "Generating new test cases",
            Self::OptimizeTests => "Optimizing test suite",
            Self::HealthCheck => "Performing system health check",
            Self::MonitorSystem => "Monitoring system performance",
            Self::GenerateReport => "Generating comprehensive report",
            Self::QueueAction | Self::RequestClarification | Self::Unknown => "Processing request",
        }
    }

    /// True for the variants that start test executions.
    #[must_use]
    pub const fn is_test_run(self) -> bool {
        matches!(
            self,
            Self::RunTests
                | Self::RunPerformanceTests
                | Self::RunSecurityTests
                | Self::RunIntegrationTests
                | Self::RunIsolatedTests
                | Self::RunChaosTests
        )
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How test units are scheduled relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStrategy {
    /// One at a time.
    Sequential,
    /// Fan out across services.
    Parallel,
    /// In a fenced environment.
    Isolated,
    /// Executor's choice based on live load.
    Adaptive,
}

impl ExecutionStrategy {
    /// Stable upper-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "SEQUENTIAL",
            Self::Parallel => "PARALLEL",
            Self::Isolated => "ISOLATED",
            Self::Adaptive => "ADAPTIVE",
        }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision handed to the external executor. Not mutated after emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionAction {
    /// Correlation id.
    pub id: Uuid,
    /// What to do.
    pub action_type: ActionType,
    /// How urgently.
    pub priority: Priority,
    /// Scheduling strategy; absent for clarification, queue and fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ExecutionStrategy>,
    /// Target services.
    #[serde(default)]
    pub services: Vec<String>,
    /// Requested test types.
    #[serde(default)]
    pub test_types: Vec<TestType>,
    /// Merged command and derived parameters.
    #[serde(default)]
    pub parameters: Parameters,
    /// Human-readable duration estimate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<String>,
    /// Analysis confidence behind the decision.
    pub confidence: f64,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
    /// Operator-facing summary.
    pub description: String,
}

impl DecisionAction {
    /// Bare action with no strategy, targets or parameters.
    #[must_use]
    pub fn new(
        action_type: ActionType,
        priority: Priority,
        confidence: f64,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type,
            priority,
            strategy: None,
            services: Vec::new(),
            test_types: Vec::new(),
            parameters: Parameters::new(),
            estimated_time: None,
            confidence,
            timestamp,
            description: description.into(),
        }
    }

    /// Sets the scheduling strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Sets target services and test types.
    #[must_use]
    pub fn with_targets(mut self, services: Vec<String>, test_types: Vec<TestType>) -> Self {
        self.services = services;
        self.test_types = test_types;
        self
    }

    /// Replaces the parameter map.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the duration estimate.
    #[must_use]
    pub fn with_estimated_time(mut self, estimated_time: impl Into<String>) -> Self {
        self.estimated_time = Some(estimated_time.into());
        self
    }

    /// True when the executor should act now.
    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        !matches!(
            self.action_type,
            ActionType::QueueAction | ActionType::RequestClarification | ActionType::Unknown
        )
    }
}

/// Renders an estimate in minutes as operator text.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_estimated_time(minutes: f64) -> String {
    if minutes < 1.0 {
        return "Less than 1 minute".to_string();
    }
    if minutes < 60.0 {
        return format!("{:.0} minutes", minutes.round());
    }
    let hours = (minutes / 60.0).trunc() as u64;
    let rest = (minutes % 60.0).trunc() as u64;
    if rest == 0 {
        format!("{hours} hours")
    } else {
        format!("{hours} hours {rest} minutes")
    }
}
