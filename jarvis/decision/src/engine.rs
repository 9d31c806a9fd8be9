use std::sync::Arc;

use jarvis_context::AnalysisSummary;
use jarvis_memory::MemoryStore;
use jarvis_model::{ConfigHandle, DecisionSettings, Priority, RiskLevel, TestType};
use jarvis_nlp::ParsedCommand;
use serde_json::{json, Value};
use shared_logging::{LogLevel, Telemetry};
use thiserror::Error;

use crate::{
    action::{format_estimated_time, ActionType, DecisionAction},
    rules::{self, PriorityFactors, RuleContext},
};

const CLARIFICATION: &str = "Requesting clarification due to low confidence in understanding";
const QUEUED: &str = "Queuing action due to insufficient resources";
const FALLBACK: &str = "Fallback action due to decision engine error";

/// Errors raised inside the decision sequence.
#[derive(Debug, Error)]
pub enum DecisionError {
    /// The runtime estimate is unusable.
    #[error("estimated minutes must be finite and non-negative, got {0}")]
    InvalidEstimate(f64),
    /// The analysis confidence is unusable.
    #[error("analysis confidence must be finite, got {0}")]
    InvalidConfidence(f64),
    /// A derived parameter failed to serialise.
    #[error("failed to encode parameter {key}")]
    Parameter {
        /// Parameter name.
        key: &'static str,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Turns a parsed command and its analysis into one [`DecisionAction`].
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: ConfigHandle,
    memory: Arc<MemoryStore>,
    telemetry: Option<Telemetry>,
}

impl DecisionEngine {
    /// Engine reading live settings from `config` and resource state from
    /// `memory`.
    #[must_use]
    pub const fn new(config: ConfigHandle, memory: Arc<MemoryStore>) -> Self {
        Self {
            config,
            memory,
            telemetry: None,
        }
    }

    /// Attaches telemetry sinks; decisions are announced as
    /// `decision.emitted` events.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Decides; internal errors yield a low-confidence `UNKNOWN` action.
    #[must_use]
    pub fn decide(&self, command: &ParsedCommand, analysis: &AnalysisSummary) -> DecisionAction {
        let action = match self.try_decide(command, analysis) {
            Ok(action) => {
                self.log(
                    LogLevel::Info,
                    "decision.made",
                    json!({
                        "action_type": action.action_type,
                        "priority": action.priority,
                        "strategy": action.strategy,
                        "confidence": action.confidence,
                    }),
                );
                action
            }
            Err(err) => {
                self.log(
                    LogLevel::Error,
                    "decision.failed",
                    json!({ "error": err.to_string(), "command": command.original_text }),
                );
                DecisionAction::new(
                    ActionType::Unknown,
                    Priority::Low,
                    0.1,
                    FALLBACK,
                    self.memory.now(),
                )
            }
        };
        self.announce(&action);
        action
    }

    /// Runs the decision sequence, surfacing internal errors.
    pub fn try_decide(
        &self,
        command: &ParsedCommand,
        analysis: &AnalysisSummary,
    ) -> Result<DecisionAction, DecisionError> {
        let now = self.memory.now();
        if !analysis.confidence.is_finite() {
            return Err(DecisionError::InvalidConfidence(analysis.confidence));
        }
        let config = self.config.current();
        let settings = &config.decision;
        if analysis.confidence < settings.confidence_threshold {
            return Ok(DecisionAction::new(
                ActionType::RequestClarification,
                Priority::Low,
                analysis.confidence,
                CLARIFICATION,
                now,
            ));
        }

        let ctx = RuleContext {
            command,
            analysis,
            settings,
            recent_failures: self.memory.recent_failures().len(),
        };
        let action_type = rules::select_action(&ctx);
        let priority = PriorityFactors::from_context(&ctx).priority();
        let strategy = rules::select_strategy(&ctx);

        if let Some(reason) = self.resource_block(action_type, command, analysis, settings) {
            self.log(
                LogLevel::Info,
                "decision.queued",
                json!({ "action_type": action_type, "reason": reason }),
            );
            let mut parameters = jarvis_model::Parameters::new();
            parameters.insert("queuedAction".into(), json!(action_type));
            parameters.insert("queueReason".into(), json!(reason));
            return Ok(
                DecisionAction::new(ActionType::QueueAction, priority, analysis.confidence, QUEUED, now)
                    .with_targets(command.services.clone(), command.test_types.clone())
                    .with_parameters(parameters),
            );
        }

        let minutes = analysis.performance.estimated_minutes;
        if !minutes.is_finite() || minutes < 0.0 {
            return Err(DecisionError::InvalidEstimate(minutes));
        }
        let parameters = derive_parameters(command, analysis)?;
        Ok(DecisionAction::new(
            action_type,
            priority,
            analysis.confidence,
            describe(action_type, command, analysis.risk.level),
            now,
        )
        .with_strategy(strategy)
        .with_targets(command.services.clone(), command.test_types.clone())
        .with_parameters(parameters)
        .with_estimated_time(format_estimated_time(minutes)))
    }

    /// Reason the action must wait, if any.
    fn resource_block(
        &self,
        action_type: ActionType,
        command: &ParsedCommand,
        analysis: &AnalysisSummary,
        settings: &DecisionSettings,
    ) -> Option<String> {
        let active = self.memory.active_test_count();
        if active >= settings.max_parallel_actions {
            return Some(format!(
                "{active} active tests at limit {}",
                settings.max_parallel_actions
            ));
        }
        let cpu = analysis.signals.cpu_usage();
        if cpu > settings.cpu_queue_threshold {
            return Some(format!("CPU usage {cpu:.0}% above {:.0}%", settings.cpu_queue_threshold));
        }
        let memory = analysis.signals.memory_usage();
        if memory > settings.memory_queue_threshold {
            return Some(format!(
                "memory usage {memory:.0}% above {:.0}%",
                settings.memory_queue_threshold
            ));
        }
        let chaos = action_type == ActionType::RunChaosTests
            || (action_type.is_test_run() && command.has_any_test_type(&[TestType::ChaosTest]));
        if chaos
            && self
                .memory
                .has_active_test_of(&[TestType::IntegrationTest, TestType::PerformanceTest])
        {
            return Some("chaos run conflicts with active integration or performance tests".into());
        }
        None
    }

    fn announce(&self, action: &DecisionAction) {
        let Some(tel) = &self.telemetry else {
            return;
        };
        match serde_json::to_value(action) {
            Ok(payload) => {
                let _ = tel.event("decision.emitted", payload);
            }
            Err(err) => tracing::warn!(error = %err, "failed to encode decision event"),
        }
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }
}

fn derive_parameters(
    command: &ParsedCommand,
    analysis: &AnalysisSummary,
) -> Result<jarvis_model::Parameters, DecisionError> {
    let high = analysis.risk.level == RiskLevel::High;
    let minutes = analysis.performance.estimated_minutes;
    let parallelism = if high {
        1
    } else if command.services.is_empty() {
        2
    } else {
        command.services.len().min(3)
    };
    let risk = serde_json::to_value(analysis.risk.level).map_err(|source| {
        DecisionError::Parameter {
            key: "riskLevel",
            source,
        }
    })?;

    let mut parameters = command.parameters.clone();
    parameters.insert("riskLevel".into(), risk);
    parameters.insert("estimatedTime".into(), json!(minutes));
    parameters.insert("confidence".into(), json!(analysis.confidence));
    parameters.insert("maxRetries".into(), json!(if high { 1 } else { 3 }));
    parameters.insert("timeout".into(), json!(timeout_seconds(minutes)));
    parameters.insert("parallelism".into(), json!(parallelism));
    parameters.insert("enableMonitoring".into(), Value::Bool(true));
    parameters.insert("alertThreshold".into(), json!(if high { 0.1 } else { 0.2 }));
    Ok(parameters)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn timeout_seconds(minutes: f64) -> u64 {
    (minutes * 1.5 * 60.0).trunc() as u64
}

fn describe(action_type: ActionType, command: &ParsedCommand, risk: RiskLevel) -> String {
    let mut description = action_type.phrase().to_string();
    if !command.services.is_empty() {
        description.push_str(" for ");
        description.push_str(&command.services.join(", "));
    }
    if risk == RiskLevel::High {
        description.push_str(" (high-risk operation)");
    }
    description
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ExecutionStrategy;
    use jarvis_context::SystemSignals;
    use jarvis_memory::ActiveTest;
    use jarvis_model::PerformanceMetrics;
    use jarvis_nlp::CommandParser;
    use shared_event_bus::MemoryEventBus;

    fn engine() -> (DecisionEngine, Arc<MemoryStore>, ConfigHandle) {
        let config = ConfigHandle::default();
        let memory = Arc::new(MemoryStore::new(config.clone()));
        (
            DecisionEngine::new(config.clone(), Arc::clone(&memory)),
            memory,
            config,
        )
    }

    fn parse(text: &str) -> ParsedCommand {
        CommandParser::new().parse(text)
    }

    #[test]
    fn low_confidence_requests_clarification() {
        let (engine, memory, _) = engine();
        for idx in 0..10 {
            memory.add_active_test(ActiveTest::new(
                format!("t{idx}"),
                "suite",
                "user-service",
                TestType::UnitTest,
            ));
        }
        let action = engine.decide(
            &parse("run chaos tests on order service"),
            &AnalysisSummary::baseline(0.59).with_risk_level(RiskLevel::High),
        );
        assert_eq!(action.action_type, ActionType::RequestClarification);
        assert_eq!(action.priority, Priority::Low);
        assert!(action.strategy.is_none());
        assert_eq!(action.description, CLARIFICATION);
    }

    #[test]
    fn high_risk_chaos_run_is_isolated_and_sequential() {
        let (engine, _, _) = engine();
        let action = engine.decide(
            &parse("Run chaos tests on order service"),
            &AnalysisSummary::baseline(0.8).with_risk_level(RiskLevel::High),
        );
        assert_eq!(action.action_type, ActionType::RunIsolatedTests);
        assert_eq!(action.strategy, Some(ExecutionStrategy::Sequential));
        assert_eq!(action.parameters["maxRetries"], 1);
        assert_eq!(action.parameters["parallelism"], 1);
        assert_eq!(action.parameters["alertThreshold"], 0.1);
        assert_eq!(action.parameters["riskLevel"], "HIGH");
        assert_eq!(action.parameters["timeout"], 900);
        assert_eq!(action.parameters["enableMonitoring"], true);
        assert_eq!(action.estimated_time.as_deref(), Some("10 minutes"));
        assert_eq!(
            action.description,
            "Executing tests in isolated environment for order-service (high-risk operation)"
        );
    }

    #[test]
    fn queue_when_active_tests_reach_limit() {
        let (engine, memory, config) = engine();
        config
            .update(|cfg| cfg.decision.max_parallel_actions = 2)
            .unwrap();
        for idx in 0..2 {
            memory.add_active_test(ActiveTest::new(
                format!("t{idx}"),
                "suite",
                "user-service",
                TestType::UnitTest,
            ));
        }
        let action = engine.decide(
            &parse("check system health"),
            &AnalysisSummary::baseline(0.95),
        );
        assert_eq!(action.action_type, ActionType::QueueAction);
        assert_eq!(action.parameters["queuedAction"], "HEALTH_CHECK");
        assert_eq!(action.description, QUEUED);
    }

    #[test]
    fn fifteen_active_tests_queue_a_unit_run_under_default_limit() {
        let (engine, memory, config) = engine();
        assert_eq!(config.current().decision.max_parallel_actions, 5);
        for idx in 0..15 {
            memory.add_active_test(ActiveTest::new(
                format!("t{idx}"),
                "suite",
                "user-service",
                TestType::UnitTest,
            ));
        }
        let action = engine.decide(
            &parse("Run unit tests for user service"),
            &AnalysisSummary::baseline(0.8),
        );
        assert_eq!(action.action_type, ActionType::QueueAction);
        assert_eq!(action.parameters["queuedAction"], "RUN_TESTS");
        assert_eq!(action.description, QUEUED);
    }

    #[test]
    fn queue_on_resource_pressure() {
        let (engine, _, _) = engine();
        let command = parse("run unit tests for user service");
        for (cpu, mem) in [(95.0, 10.0), (10.0, 90.0)] {
            let analysis = AnalysisSummary::baseline(0.9).with_signals(SystemSignals {
                health: None,
                metrics: Some(PerformanceMetrics::new(cpu, mem)),
            });
            assert_eq!(
                engine.decide(&command, &analysis).action_type,
                ActionType::QueueAction
            );
        }
    }

    #[test]
    fn chaos_waits_for_integration_runs() {
        let (engine, memory, _) = engine();
        memory.add_active_test(ActiveTest::new(
            "int-1",
            "checkout flow",
            "order-service",
            TestType::IntegrationTest,
        ));
        let chaos = engine.decide(
            &parse("run chaos tests on product service"),
            &AnalysisSummary::baseline(0.9),
        );
        assert_eq!(chaos.action_type, ActionType::QueueAction);
        let unit = engine.decide(
            &parse("run unit tests on product service"),
            &AnalysisSummary::baseline(0.9),
        );
        assert_eq!(unit.action_type, ActionType::RunTests);
        assert_eq!(unit.parameters["maxRetries"], 3);
        assert_eq!(unit.parameters["parallelism"], 1);
    }

    #[test]
    fn invalid_estimate_falls_back() {
        let (engine, _, _) = engine();
        let command = parse("run unit tests for user service");
        let analysis = AnalysisSummary::baseline(0.9).with_estimated_minutes(f64::NAN);
        assert!(matches!(
            engine.try_decide(&command, &analysis),
            Err(DecisionError::InvalidEstimate(_))
        ));
        let action = engine.decide(&command, &analysis);
        assert_eq!(action.action_type, ActionType::Unknown);
        assert!((action.confidence - 0.1).abs() < f64::EPSILON);
        assert_eq!(action.description, FALLBACK);
    }

    #[test]
    fn live_threshold_changes_apply_to_next_call() {
        let (engine, _, config) = engine();
        let command = parse("run unit tests for user service");
        let analysis = AnalysisSummary::baseline(0.7);
        assert_eq!(engine.decide(&command, &analysis).action_type, ActionType::RunTests);
        config
            .update(|cfg| cfg.decision.confidence_threshold = 0.8)
            .unwrap();
        assert_eq!(
            engine.decide(&command, &analysis).action_type,
            ActionType::RequestClarification
        );
    }

    #[tokio::test]
    async fn decisions_are_announced() {
        let bus = Arc::new(MemoryEventBus::default());
        let telemetry = Telemetry::builder("decision")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let (engine, _, _) = engine();
        let engine = engine.with_telemetry(telemetry);
        let action = engine.decide(
            &parse("run unit tests for user service"),
            &AnalysisSummary::baseline(0.9),
        );
        for _ in 0..50 {
            if !bus.snapshot_for("decision").is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let events = bus.snapshot_for("decision.emitted");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["id"], action.id.to_string());
    }
}
