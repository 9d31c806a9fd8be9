use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse action category extracted from an operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    /// Execute one or more test suites.
    RunTests,
    /// Investigate recent failures.
    AnalyzeFailures,
    /// Produce new test cases.
    GenerateTests,
    /// Tune an existing suite.
    OptimizeTests,
    /// Probe service health.
    HealthCheck,
    /// Report current state.
    GetStatus,
    /// Explain capabilities.
    Help,
    /// Parsing failed.
    Unknown,
}

impl Intent {
    /// Stable upper-case label used in pattern keys and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunTests => "RUN_TESTS",
            Self::AnalyzeFailures => "ANALYZE_FAILURES",
            Self::GenerateTests => "GENERATE_TESTS",
            Self::OptimizeTests => "OPTIMIZE_TESTS",
            Self::HealthCheck => "HEALTH_CHECK",
            Self::GetStatus => "GET_STATUS",
            Self::Help => "HELP",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of test the executor can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestType {
    /// Isolated component checks.
    UnitTest,
    /// Cross-component checks.
    IntegrationTest,
    /// Consumer/provider agreement checks.
    ContractTest,
    /// Endpoint behaviour checks.
    ApiTest,
    /// Load, stress, and benchmark runs.
    PerformanceTest,
    /// Vulnerability scanning.
    SecurityTest,
    /// Fault injection.
    ChaosTest,
    /// Simulated attacks.
    PenetrationTest,
    /// Full user journeys.
    EndToEndTest,
    /// Quick sanity checks.
    SmokeTest,
    /// Guards against reintroduced defects.
    RegressionTest,
    /// Unscripted investigation.
    ExploratoryTest,
    /// WCAG conformance.
    AccessibilityTest,
    /// Cross-platform and browser coverage.
    CompatibilityTest,
    /// Internationalisation coverage.
    LocalizationTest,
}

impl TestType {
    /// Every test type in declaration order.
    pub const ALL: [Self; 15] = [
        Self::UnitTest,
        Self::IntegrationTest,
        Self::ContractTest,
        Self::ApiTest,
        Self::PerformanceTest,
        Self::SecurityTest,
        Self::ChaosTest,
        Self::PenetrationTest,
        Self::EndToEndTest,
        Self::SmokeTest,
        Self::RegressionTest,
        Self::ExploratoryTest,
        Self::AccessibilityTest,
        Self::CompatibilityTest,
        Self::LocalizationTest,
    ];

    /// Stable upper-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnitTest => "UNIT_TEST",
            Self::IntegrationTest => "INTEGRATION_TEST",
            Self::ContractTest => "CONTRACT_TEST",
            Self::ApiTest => "API_TEST",
            Self::PerformanceTest => "PERFORMANCE_TEST",
            Self::SecurityTest => "SECURITY_TEST",
            Self::ChaosTest => "CHAOS_TEST",
            Self::PenetrationTest => "PENETRATION_TEST",
            Self::EndToEndTest => "END_TO_END_TEST",
            Self::SmokeTest => "SMOKE_TEST",
            Self::RegressionTest => "REGRESSION_TEST",
            Self::ExploratoryTest => "EXPLORATORY_TEST",
            Self::AccessibilityTest => "ACCESSIBILITY_TEST",
            Self::CompatibilityTest => "COMPATIBILITY_TEST",
            Self::LocalizationTest => "LOCALIZATION_TEST",
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::UnitTest => "Unit Test",
            Self::IntegrationTest => "Integration Test",
            Self::ContractTest => "Contract Test",
            Self::ApiTest => "API Test",
            Self::PerformanceTest => "Performance Test",
            Self::SecurityTest => "Security Test",
            Self::ChaosTest => "Chaos Test",
            Self::PenetrationTest => "Penetration Test",
            Self::EndToEndTest => "End-to-End Test",
            Self::SmokeTest => "Smoke Test",
            Self::RegressionTest => "Regression Test",
            Self::ExploratoryTest => "Exploratory Test",
            Self::AccessibilityTest => "Accessibility Test",
            Self::CompatibilityTest => "Compatibility Test",
            Self::LocalizationTest => "Localization Test",
        }
    }

    /// One-line description for help output.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnitTest => "Tests individual components in isolation",
            Self::IntegrationTest => "Tests interactions between components",
            Self::ContractTest => "Verifies API contracts between services",
            Self::ApiTest => "Tests API endpoints and responses",
            Self::PerformanceTest => "Tests system performance under load",
            Self::SecurityTest => "Tests for security vulnerabilities",
            Self::ChaosTest => "Tests system resilience under failure conditions",
            Self::PenetrationTest => "Simulates attacks against the system",
            Self::EndToEndTest => "Tests complete user workflows",
            Self::SmokeTest => "Basic functionality verification",
            Self::RegressionTest => "Ensures fixed defects stay fixed",
            Self::ExploratoryTest => "Unscripted investigative testing",
            Self::AccessibilityTest => "Checks accessibility conformance",
            Self::CompatibilityTest => "Checks behaviour across platforms and browsers",
            Self::LocalizationTest => "Checks internationalisation and translations",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Graded risk of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// Routine.
    Low,
    /// Needs attention.
    Medium,
    /// Needs containment.
    High,
}

impl RiskLevel {
    /// Maps a score in `[0, 1]` onto a level (`>= 0.7` high, `>= 0.4` medium).
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Upper-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling priority of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Normal queueing.
    Medium,
    /// Jump the queue.
    High,
}

impl Priority {
    /// Maps a weighted score onto a priority (`>= 0.7` high, `>= 0.4` medium).
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Upper-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
