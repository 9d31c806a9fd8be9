use std::sync::Arc;

use chrono::{DateTime, Utc};
use jarvis_memory::MemoryStore;
use jarvis_model::{
    ConfigHandle, HealthStatus, PerformanceMetrics, RiskLevel, ServiceCatalogue, SystemHealth,
    SystemMonitor, TestType,
};
use jarvis_nlp::ParsedCommand;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_logging::{LogLevel, Telemetry};

use crate::{
    dependency::{AnalysisError, DependencyAnalyzer, DependencyInfo, SeverityLevel},
    graph::ServiceGraph,
};

/// Recent failures above this count raise the risk score.
const FAILURE_RISK_THRESHOLD: usize = 5;

/// Risk verdict for a command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Level derived from `score`.
    pub level: RiskLevel,
    /// Raw score in `[0, 1]`.
    pub score: f64,
    /// Human-readable contributing factors.
    pub risk_factors: Vec<String>,
    /// Suggested mitigations, one per factor kind.
    pub mitigation: Vec<String>,
}

/// Expected cost and odds of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformancePrediction {
    /// Expected wall time.
    pub estimated_minutes: f64,
    /// Odds the run completes cleanly, in `[0.1, 0.9]`.
    pub success_probability: f64,
    /// Known limiting factors.
    pub bottlenecks: Vec<String>,
}

/// Monitoring snapshots taken once per analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemSignals {
    /// Health snapshot, if the monitor had one.
    pub health: Option<SystemHealth>,
    /// Resource sample, if the monitor had one.
    pub metrics: Option<PerformanceMetrics>,
}

impl SystemSignals {
    /// Reads both snapshots from `monitor`.
    #[must_use]
    pub fn capture(monitor: &dyn SystemMonitor) -> Self {
        Self {
            health: monitor.system_health(),
            metrics: monitor.performance_metrics(),
        }
    }

    /// Health status; a missing snapshot counts as healthy.
    #[must_use]
    pub fn health_status(&self) -> HealthStatus {
        self.health
            .as_ref()
            .map_or(HealthStatus::Healthy, |health| health.status)
    }

    /// True when a health snapshot reports anything but healthy.
    #[must_use]
    pub fn is_impaired(&self) -> bool {
        self.health.as_ref().is_some_and(SystemHealth::is_impaired)
    }

    /// CPU usage percent; 0 without a sample.
    #[must_use]
    pub fn cpu_usage(&self) -> f64 {
        self.metrics.map_or(0.0, |metrics| metrics.cpu_usage)
    }

    /// Memory usage percent; 0 without a sample.
    #[must_use]
    pub fn memory_usage(&self) -> f64 {
        self.metrics.map_or(0.0, |metrics| metrics.memory_usage)
    }
}

/// Everything the decision engine needs to know about a command's context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Risk verdict.
    pub risk: RiskAssessment,
    /// Runtime prediction.
    pub performance: PerformancePrediction,
    /// Dependency closure of the targets.
    pub dependencies: DependencyInfo,
    /// Monitoring snapshots used for this summary.
    pub signals: SystemSignals,
    /// Confidence in the overall reading, in `[0, 1]`.
    pub confidence: f64,
    /// When the summary was built.
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisSummary {
    /// Low-risk, ten-minute summary with the given confidence and no
    /// dependency data.
    #[must_use]
    pub fn baseline(confidence: f64) -> Self {
        Self {
            risk: RiskAssessment {
                level: RiskLevel::Low,
                score: 0.1,
                risk_factors: Vec::new(),
                mitigation: Vec::new(),
            },
            performance: PerformancePrediction {
                estimated_minutes: 10.0,
                success_probability: 0.9,
                bottlenecks: Vec::new(),
            },
            dependencies: DependencyInfo::unknown(),
            signals: SystemSignals::default(),
            confidence: confidence.clamp(0.0, 1.0),
            analyzed_at: Utc::now(),
        }
    }

    /// Summary produced when analysis fails; its zero confidence makes the
    /// decision gate ask for clarification.
    #[must_use]
    pub fn unavailable(reason: &str) -> Self {
        let mut summary = Self::baseline(0.0);
        summary.risk.risk_factors.push(format!("Analysis unavailable: {reason}"));
        summary
    }

    /// Pins the risk level, moving the score to the level's floor.
    #[must_use]
    pub fn with_risk_level(mut self, level: RiskLevel) -> Self {
        self.risk.level = level;
        self.risk.score = match level {
            RiskLevel::High => 0.7,
            RiskLevel::Medium => 0.4,
            RiskLevel::Low => 0.1,
        };
        self
    }

    /// Overrides the runtime estimate.
    #[must_use]
    pub const fn with_estimated_minutes(mut self, minutes: f64) -> Self {
        self.performance.estimated_minutes = minutes;
        self
    }

    /// Replaces the monitoring snapshots.
    #[must_use]
    pub fn with_signals(mut self, signals: SystemSignals) -> Self {
        self.signals = signals;
        self
    }

    /// Replaces the dependency data.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: DependencyInfo) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Builds an [`AnalysisSummary`] per parsed command from the service graph,
/// the monitoring collaborator, and memory.
#[derive(Debug, Clone)]
pub struct ContextAnalyzer {
    dependencies: DependencyAnalyzer,
    config: ConfigHandle,
    monitor: Arc<dyn SystemMonitor>,
    memory: Arc<MemoryStore>,
    telemetry: Option<Telemetry>,
}

impl ContextAnalyzer {
    /// Analyzer over `graph` reading live settings from `config`.
    #[must_use]
    pub fn new(
        graph: ServiceGraph,
        config: ConfigHandle,
        monitor: Arc<dyn SystemMonitor>,
        memory: Arc<MemoryStore>,
    ) -> Self {
        Self {
            dependencies: DependencyAnalyzer::new(graph, config.clone()),
            config,
            monitor,
            memory,
            telemetry: None,
        }
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Dependency closure of `services`.
    #[must_use]
    pub fn analyze(&self, services: &[String]) -> DependencyInfo {
        self.dependencies.analyze(services)
    }

    /// Dependency closure adjusted for `test_types`.
    #[must_use]
    pub fn analyze_for(&self, services: &[String], test_types: &[TestType]) -> DependencyInfo {
        self.dependencies.analyze_for(services, test_types)
    }

    /// Current monitoring snapshots.
    #[must_use]
    pub fn signals(&self) -> SystemSignals {
        SystemSignals::capture(self.monitor.as_ref())
    }

    /// Summarizes `command`; failures yield [`AnalysisSummary::unavailable`].
    #[must_use]
    pub fn summarize(&self, command: &ParsedCommand) -> AnalysisSummary {
        match self.try_summarize(command) {
            Ok(summary) => {
                self.log(
                    LogLevel::Debug,
                    "context.analysis.completed",
                    json!({
                        "risk_level": summary.risk.level,
                        "risk_score": summary.risk.score,
                        "blast_radius": summary.dependencies.blast_radius,
                        "estimated_minutes": summary.performance.estimated_minutes,
                        "confidence": summary.confidence,
                    }),
                );
                summary
            }
            Err(err) => {
                self.log(
                    LogLevel::Warn,
                    "context.analysis.failed",
                    json!({ "error": err.to_string(), "command": command.original_text }),
                );
                AnalysisSummary::unavailable(&err.to_string())
            }
        }
    }

    /// Summarizes `command`, surfacing errors.
    pub fn try_summarize(&self, command: &ParsedCommand) -> Result<AnalysisSummary, AnalysisError> {
        if command.is_failure() {
            let reason = command.error().unwrap_or("unknown parse error").to_string();
            return Err(AnalysisError::UnparsedCommand(reason));
        }
        let dependencies = self
            .dependencies
            .try_analyze(&command.services, &command.test_types)?;
        let signals = self.signals();
        let risk = self.assess_risk(command, &dependencies, &signals);
        let performance = self.predict_performance(command, &dependencies, &risk, &signals);
        let confidence = self.confidence(command, &risk);
        Ok(AnalysisSummary {
            risk,
            performance,
            dependencies,
            signals,
            confidence,
            analyzed_at: self.memory.now(),
        })
    }

    fn assess_risk(
        &self,
        command: &ParsedCommand,
        dependencies: &DependencyInfo,
        signals: &SystemSignals,
    ) -> RiskAssessment {
        let mut score: f64 = command
            .test_types
            .iter()
            .map(|tt| baseline_risk(*tt))
            .fold(0.0, f64::max);
        let mut factors = Vec::new();
        let mut mitigation = Vec::new();

        let risky: Vec<&str> = command
            .test_types
            .iter()
            .filter(|tt| baseline_risk(**tt) >= 0.4)
            .map(|tt| tt.as_str())
            .collect();
        if !risky.is_empty() {
            factors.push(format!("High-risk test types: {}", risky.join(", ")));
            mitigation.push("Run in an isolated environment with monitoring enabled".to_string());
        }

        match dependencies.severity_level {
            SeverityLevel::High => {
                score += 0.2;
                factors.push(format!(
                    "Large blast radius: {} services affected",
                    dependencies.blast_radius
                ));
                mitigation.push("Stage the run to limit the blast radius".to_string());
            }
            SeverityLevel::Medium => {
                score += 0.1;
                factors.push(format!(
                    "Moderate blast radius: {} services affected",
                    dependencies.blast_radius
                ));
                mitigation.push("Stage the run to limit the blast radius".to_string());
            }
            SeverityLevel::Low | SeverityLevel::Unknown => {}
        }

        if signals.is_impaired() {
            score += 0.3;
            factors.push(format!("System health is {}", signals.health_status()));
            mitigation.push("Wait for system health to recover".to_string());
        }

        let failures = self.memory.recent_failures().len();
        if failures > FAILURE_RISK_THRESHOLD {
            score += 0.2;
            factors.push(format!("Recent failures: {failures}"));
            mitigation.push("Investigate recent failures before running".to_string());
        }

        let critical: Vec<&str> = command
            .services
            .iter()
            .map(String::as_str)
            .filter(|svc| ServiceCatalogue::is_critical(svc))
            .collect();
        if !critical.is_empty() {
            factors.push(format!("Targets critical services: {}", critical.join(", ")));
            mitigation.push("Schedule outside peak hours".to_string());
        }

        let score = score.clamp(0.0, 1.0);
        RiskAssessment {
            level: RiskLevel::from_score(score),
            score,
            risk_factors: factors,
            mitigation,
        }
    }

    fn predict_performance(
        &self,
        command: &ParsedCommand,
        dependencies: &DependencyInfo,
        risk: &RiskAssessment,
        signals: &SystemSignals,
    ) -> PerformancePrediction {
        let settings = self.config.current();
        let cpu_limit = settings.decision.cpu_sequential_threshold;
        let memory_limit = settings.decision.memory_queue_threshold;
        let type_count = as_f64(command.test_types.len().max(1));
        let extra_services = as_f64(command.services.len().saturating_sub(1));
        let mut estimated_minutes = 10.0 * type_count * 0.2f64.mul_add(extra_services, 1.0);
        let cpu_loaded = signals.cpu_usage() > cpu_limit;
        if cpu_loaded {
            estimated_minutes *= 1.5;
        }

        let mut success_probability =
            0.1f64.mul_add(-as_f64(risk.risk_factors.len()), 0.9).max(0.1);
        if cpu_loaded {
            success_probability = (success_probability - 0.1).max(0.1);
        }

        let mut bottlenecks = Vec::new();
        if cpu_loaded {
            bottlenecks.push(format!("High CPU usage ({:.0}%)", signals.cpu_usage()));
        }
        if signals.memory_usage() > memory_limit {
            bottlenecks.push(format!("High memory usage ({:.0}%)", signals.memory_usage()));
        }
        if let Some(head) = dependencies.critical_path.first() {
            bottlenecks.push(format!("Critical path through {head}"));
        }

        PerformancePrediction {
            estimated_minutes,
            success_probability,
            bottlenecks,
        }
    }

    fn confidence(&self, command: &ParsedCommand, risk: &RiskAssessment) -> f64 {
        let mut confidence = 0.2f64.mul_add(command.confidence, 0.5);
        let prefixes: Vec<String> = command
            .intents
            .iter()
            .map(|intent| format!("{}_", intent.as_str()))
            .collect();
        let known = self.memory.all_patterns().iter().any(|pattern| {
            prefixes
                .iter()
                .any(|prefix| pattern.name.starts_with(prefix.as_str()))
        });
        if known {
            confidence += 0.2;
        }
        if risk.risk_factors.len() < 3 {
            confidence += 0.1;
        }
        confidence.clamp(0.0, 1.0)
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }
}

const fn baseline_risk(test_type: TestType) -> f64 {
    match test_type {
        TestType::ChaosTest => 0.6,
        TestType::PenetrationTest => 0.5,
        TestType::SecurityTest | TestType::PerformanceTest => 0.4,
        TestType::EndToEndTest => 0.2,
        _ => 0.1,
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(count: usize) -> f64 {
    count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarvis_memory::{FailureType, Pattern, TestFailure};
    use jarvis_model::StaticMonitor;
    use jarvis_nlp::{CommandParser, ParseError};

    struct Fixture {
        analyzer: ContextAnalyzer,
        monitor: Arc<StaticMonitor>,
        memory: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let config = ConfigHandle::default();
        let monitor = Arc::new(StaticMonitor::healthy());
        let memory = Arc::new(MemoryStore::new(config.clone()));
        let analyzer = ContextAnalyzer::new(
            ServiceGraph::standard(),
            config,
            monitor.clone(),
            Arc::clone(&memory),
        );
        Fixture {
            analyzer,
            monitor,
            memory,
        }
    }

    fn parse(text: &str) -> ParsedCommand {
        CommandParser::new().parse(text)
    }

    #[test]
    fn unit_tests_on_user_service_are_low_risk() {
        let fx = fixture();
        let summary = fx.analyzer.summarize(&parse("Run unit tests for user service"));
        assert_eq!(summary.risk.level, RiskLevel::Low);
        assert_eq!(summary.dependencies.blast_radius, 7);
        assert_eq!(summary.risk.risk_factors.len(), 2);
        assert!(summary.confidence >= 0.75);
        assert!((summary.performance.estimated_minutes - 10.0).abs() < 1e-9);
    }

    #[test]
    fn chaos_on_order_service_is_high_risk() {
        let fx = fixture();
        let summary = fx.analyzer.summarize(&parse("Run chaos tests on order service"));
        assert_eq!(summary.risk.level, RiskLevel::High);
        assert!((summary.risk.score - 0.8).abs() < 1e-9);
        assert_eq!(summary.dependencies.severity_level, SeverityLevel::High);
        assert!(summary.risk.risk_factors[0].contains("CHAOS_TEST"));
        assert!(summary.confidence >= 0.6);
        assert!(summary.confidence < 0.75);
    }

    #[test]
    fn penetration_outranks_security_baseline() {
        let fx = fixture();
        let mut command = parse("Run security tests on order service");
        let security = fx.analyzer.summarize(&command);
        assert_eq!(security.risk.level, RiskLevel::Medium);
        command.test_types = vec![TestType::PenetrationTest];
        let penetration = fx.analyzer.summarize(&command);
        assert!((penetration.risk.score - 0.7).abs() < 1e-9);
        assert_eq!(penetration.risk.level, RiskLevel::High);
    }

    #[test]
    fn impaired_health_and_failures_raise_risk() {
        let fx = fixture();
        fx.monitor
            .set_health(SystemHealth::new(HealthStatus::Degraded).with_issue("disk"));
        for idx in 0..6 {
            fx.memory.add_test_failure(TestFailure::new(
                format!("t{idx}"),
                "user-service",
                FailureType::Timeout,
                "slow",
            ));
        }
        let summary = fx.analyzer.summarize(&parse("Run unit tests for user service"));
        assert!((summary.risk.score - 0.8).abs() < 1e-9);
        assert_eq!(summary.risk.level, RiskLevel::High);
        assert!(summary
            .risk
            .risk_factors
            .iter()
            .any(|factor| factor == "System health is DEGRADED"));
        assert!(summary
            .risk
            .risk_factors
            .iter()
            .any(|factor| factor == "Recent failures: 6"));
        assert_eq!(summary.risk.mitigation.len(), summary.risk.risk_factors.len());
    }

    #[test]
    fn cpu_load_stretches_estimate() {
        let fx = fixture();
        fx.monitor.set_metrics(PerformanceMetrics::new(95.0, 90.0));
        let summary = fx
            .analyzer
            .summarize(&parse("run unit and integration tests for user and order"));
        // 10 min x 2 types x (1 + 0.2 x 1 extra service) x 1.5 under load
        assert!((summary.performance.estimated_minutes - 36.0).abs() < 1e-9);
        assert!(summary
            .performance
            .bottlenecks
            .iter()
            .any(|b| b.starts_with("High CPU usage")));
        assert!(summary
            .performance
            .bottlenecks
            .iter()
            .any(|b| b.starts_with("High memory usage")));
        assert!(summary.performance.success_probability <= 0.8);
    }

    #[test]
    fn known_pattern_lifts_confidence() {
        let fx = fixture();
        let command = parse("Run unit tests for user service");
        let before = fx.analyzer.summarize(&command).confidence;
        fx.memory
            .store_pattern(Pattern::new("RUN_TESTS_RUN_TESTS", 0.9, "seen before"));
        let after = fx.analyzer.summarize(&command).confidence;
        assert!(after > before);
        assert!(after <= 1.0);
    }

    #[test]
    fn failed_parse_yields_unavailable_summary() {
        let fx = fixture();
        let err = ParseError::InputTooLong { len: 5000, max: 4096 };
        let command = ParsedCommand::failed("x", &err);
        assert!(matches!(
            fx.analyzer.try_summarize(&command),
            Err(AnalysisError::UnparsedCommand(_))
        ));
        let summary = fx.analyzer.summarize(&command);
        assert!(summary.confidence.abs() < f64::EPSILON);
        assert!(summary.risk.risk_factors[0].starts_with("Analysis unavailable"));
    }

    #[test]
    fn builders_pin_fields() {
        let summary = AnalysisSummary::baseline(0.9)
            .with_risk_level(RiskLevel::High)
            .with_estimated_minutes(45.0);
        assert_eq!(summary.risk.level, RiskLevel::High);
        assert!((summary.performance.estimated_minutes - 45.0).abs() < f64::EPSILON);
        assert_eq!(summary.dependencies.severity_level, SeverityLevel::Unknown);
        assert!(!summary.signals.is_impaired());
        assert!(summary.signals.cpu_usage().abs() < f64::EPSILON);
    }
}
