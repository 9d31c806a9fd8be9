use std::{fs, path::PathBuf, sync::Arc};

use anyhow::Context;
use jarvis_context::{AnalysisSummary, ContextAnalyzer, ServiceGraph};
use jarvis_decision::{DecisionAction, DecisionEngine};
use jarvis_learning::{LearningEngine, LearningInsights};
use jarvis_memory::{
    ActiveTest, CleanupReport, MemoryEntry, MemoryStatistics, MemoryStore, MemoryType,
    TestFailure, TestResult,
};
use jarvis_model::{ConfigHandle, JarvisConfig, SharedClock, StaticMonitor, SystemMonitor};
use jarvis_nlp::{CommandParser, ParsedCommand};
use serde::Serialize;
use serde_json::{json, Value};
use shared_event_bus::MemoryEventBus;
use shared_logging::{LogLevel, Telemetry};

use crate::error::JarvisError;

const DEFAULT_BUS_CAPACITY: usize = 256;

/// Everything one `interpret` pass produced; feed it back through
/// [`JarvisRuntime::learn_from_interaction`].
#[derive(Debug, Clone, Serialize)]
pub struct Interpretation {
    /// Parsed command.
    pub command: ParsedCommand,
    /// Context analysis of the command.
    pub analysis: AnalysisSummary,
    /// Decided action.
    pub action: DecisionAction,
}

/// Feedback from the external executor.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A test finished.
    Result(TestResult),
    /// A test failed.
    Failure(TestFailure),
}

/// Builder for [`JarvisRuntime`].
pub struct RuntimeBuilder {
    config: JarvisConfig,
    monitor: Option<Arc<dyn SystemMonitor>>,
    graph: ServiceGraph,
    clock: Option<SharedClock>,
    log_dir: Option<PathBuf>,
    bus_capacity: usize,
}

impl RuntimeBuilder {
    /// Builder over `config` with the standard service graph.
    #[must_use]
    pub fn new(config: JarvisConfig) -> Self {
        Self {
            config,
            monitor: None,
            graph: ServiceGraph::standard(),
            clock: None,
            log_dir: None,
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }

    /// Monitoring collaborator; defaults to a healthy [`StaticMonitor`].
    #[must_use]
    pub fn monitor(mut self, monitor: Arc<dyn SystemMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Replaces the service dependency graph.
    #[must_use]
    pub fn graph(mut self, graph: ServiceGraph) -> Self {
        self.graph = graph;
        self
    }

    /// Clock shared by the memory store and every engine reading it.
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Directory receiving one JSON-lines log per component.
    #[must_use]
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Backlog kept by the in-memory event bus.
    #[must_use]
    pub const fn bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity;
        self
    }

    /// Validates the configuration and wires every component.
    pub fn build(self) -> Result<JarvisRuntime, JarvisError> {
        self.config
            .validate()
            .context("validating runtime configuration")?;
        if let Some(dir) = &self.log_dir {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
        }
        let events = Arc::new(MemoryEventBus::new(self.bus_capacity));
        let telemetry = |module: &str| -> anyhow::Result<Telemetry> {
            let mut builder = Telemetry::builder(module).event_publisher(events.clone());
            if let Some(dir) = &self.log_dir {
                builder = builder.log_path(dir.join(format!("{module}.log.jsonl")));
            }
            builder
                .build()
                .with_context(|| format!("building telemetry for {module}"))
        };

        let config = ConfigHandle::new(self.config);
        let monitor = self
            .monitor
            .unwrap_or_else(|| Arc::new(StaticMonitor::healthy()));

        let mut memory = MemoryStore::new(config.clone()).with_telemetry(telemetry("memory")?);
        if let Some(clock) = self.clock {
            memory = memory.with_clock(clock);
        }
        let memory = Arc::new(memory);

        let parser = CommandParser::new().with_telemetry(telemetry("nlp")?);
        let analyzer = ContextAnalyzer::new(
            self.graph,
            config.clone(),
            Arc::clone(&monitor),
            Arc::clone(&memory),
        )
        .with_telemetry(telemetry("context")?);
        let decisions = DecisionEngine::new(config.clone(), Arc::clone(&memory))
            .with_telemetry(telemetry("decision")?);
        let learning = LearningEngine::new(config.clone(), Arc::clone(&memory), monitor)
            .with_telemetry(telemetry("learning")?);
        let runtime_telemetry = telemetry("runtime")?;

        let _ = runtime_telemetry.log(
            LogLevel::Info,
            "runtime.bootstrapped",
            json!({
                "log_dir": self.log_dir,
                "bus_capacity": self.bus_capacity,
            }),
        );

        Ok(JarvisRuntime {
            config,
            parser,
            analyzer,
            decisions,
            learning,
            memory,
            events,
            telemetry: runtime_telemetry,
        })
    }
}

/// Wired decision core.
pub struct JarvisRuntime {
    config: ConfigHandle,
    parser: CommandParser,
    analyzer: ContextAnalyzer,
    decisions: DecisionEngine,
    learning: LearningEngine,
    memory: Arc<MemoryStore>,
    events: Arc<MemoryEventBus>,
    telemetry: Telemetry,
}

impl JarvisRuntime {
    /// Starts a builder over `config`.
    #[must_use]
    pub fn builder(config: JarvisConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    /// Runtime over `config` reading system signals from `monitor`.
    pub fn bootstrap(
        config: JarvisConfig,
        monitor: Arc<dyn SystemMonitor>,
    ) -> Result<Self, JarvisError> {
        RuntimeBuilder::new(config).monitor(monitor).build()
    }

    /// Turns free text into one decided action. Never fails: parse or
    /// analysis problems surface as a clarification request, decision
    /// problems as the fallback action.
    #[must_use]
    pub fn interpret(&self, text: &str) -> DecisionAction {
        self.interpret_detailed(text).action
    }

    /// Like [`Self::interpret`] but keeps the intermediate products.
    #[must_use]
    pub fn interpret_detailed(&self, text: &str) -> Interpretation {
        let command = self.parser.parse(text);
        let analysis = self.analyzer.summarize(&command);
        let action = self.decisions.decide(&command, &analysis);
        self.log(
            LogLevel::Info,
            "runtime.interpret.completed",
            json!({
                "intent": command.primary_intent(),
                "action_id": action.id,
                "action_type": action.action_type,
                "priority": action.priority,
                "confidence": action.confidence,
            }),
        );
        Interpretation {
            command,
            analysis,
            action,
        }
    }

    /// Runs the pipeline without degrading, so the first failing stage is
    /// reported.
    pub fn try_interpret_detailed(&self, text: &str) -> Result<Interpretation, JarvisError> {
        let command = self.parser.try_parse(text)?;
        let analysis = self.analyzer.try_summarize(&command)?;
        let action = self.decisions.try_decide(&command, &analysis)?;
        Ok(Interpretation {
            command,
            analysis,
            action,
        })
    }

    /// Feeds one decision into the learning engine.
    pub fn learn_from_interaction(
        &self,
        command: &ParsedCommand,
        analysis: &AnalysisSummary,
        action: &DecisionAction,
    ) {
        self.learning.learn_from_interaction(command, analysis, action);
    }

    /// Feeds one decision into the learning engine, surfacing failures.
    pub fn try_learn(
        &self,
        interpretation: &Interpretation,
    ) -> Result<Arc<LearningInsights>, JarvisError> {
        Ok(self.learning.try_learn_from_interaction(
            &interpretation.command,
            &interpretation.analysis,
            &interpretation.action,
        )?)
    }

    /// Records executor feedback.
    pub fn record_outcome(&self, outcome: Outcome) {
        match outcome {
            Outcome::Result(result) => self.memory.add_test_result(result),
            Outcome::Failure(failure) => self.memory.add_test_failure(failure),
        }
    }

    /// Registers a test the executor started.
    pub fn record_active_test(&self, test: ActiveTest) {
        self.memory.add_active_test(test);
    }

    /// Unregisters a finished or abandoned test.
    pub fn remove_active_test(&self, id: &str) -> Option<ActiveTest> {
        self.memory.remove_active_test(id)
    }

    /// Stores an operator-supplied context entry.
    pub fn remember(&self, key: &str, value: Value) -> Result<MemoryEntry, JarvisError> {
        Ok(self.memory.try_store(key, MemoryType::Context, value)?)
    }

    /// Latest learning snapshot.
    #[must_use]
    pub fn insights(&self) -> Arc<LearningInsights> {
        self.learning.insights()
    }

    /// Memory counters.
    #[must_use]
    pub fn memory_statistics(&self) -> MemoryStatistics {
        self.memory.statistics()
    }

    /// Sweeps expired memory.
    pub fn cleanup_expired(&self) -> CleanupReport {
        self.memory.cleanup_expired()
    }

    /// Scheduled learning pass over current memory.
    pub fn recompute_learning(&self) {
        self.learning.recompute();
    }

    /// Live configuration.
    #[must_use]
    pub const fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Shared memory store.
    #[must_use]
    pub const fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    /// Event bus carrying `decision.emitted` and the other announcements.
    #[must_use]
    pub const fn events(&self) -> &Arc<MemoryEventBus> {
        &self.events
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        let _ = self.telemetry.log(level, message, metadata);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarvis_decision::{ActionType, ExecutionStrategy};
    use jarvis_memory::{FailureType, TestStatus};
    use jarvis_model::{Priority, RiskLevel, TestType};
    use jarvis_nlp::ParseError;

    fn runtime() -> JarvisRuntime {
        JarvisRuntime::bootstrap(JarvisConfig::default(), Arc::new(StaticMonitor::healthy()))
            .unwrap()
    }

    #[test]
    fn low_risk_unit_run() {
        let rt = runtime();
        let out = rt.interpret_detailed("Run unit tests for user service");
        assert_eq!(out.command.services, vec!["user-service".to_string()]);
        assert_eq!(out.analysis.risk.level, RiskLevel::Low);
        assert!((out.analysis.confidence - 0.8).abs() < 1e-9);
        assert_eq!(out.action.action_type, ActionType::RunTests);
        assert_eq!(out.action.services, vec!["user-service".to_string()]);
    }

    #[test]
    fn chaos_on_order_service_is_isolated() {
        let rt = runtime();
        let out = rt.interpret_detailed("Run chaos tests on order service");
        assert_eq!(out.analysis.risk.level, RiskLevel::High);
        assert!((out.analysis.confidence - 0.7).abs() < 1e-9);
        let action = out.action;
        assert_eq!(action.action_type, ActionType::RunIsolatedTests);
        assert_eq!(action.strategy, Some(ExecutionStrategy::Sequential));
        assert_eq!(action.parameters["maxRetries"], 1);
        assert!(action.description.ends_with("(high-risk operation)"));
    }

    #[test]
    fn empty_command_covers_every_service() {
        let rt = runtime();
        let out = rt.interpret_detailed("");
        assert_eq!(out.command.services.len(), 5);
        assert!(out.command.defaulted.services);
        assert_eq!(out.action.action_type, ActionType::RunIntegrationTests);
        assert_eq!(out.action.strategy, Some(ExecutionStrategy::Parallel));
        assert_eq!(out.action.estimated_time.as_deref(), Some("36 minutes"));
    }

    #[test]
    fn saturated_executor_queues() {
        let rt = runtime();
        for idx in 0..15 {
            rt.record_active_test(ActiveTest::new(
                format!("t{idx}"),
                "suite",
                "user-service",
                TestType::UnitTest,
            ));
        }
        let action = rt.interpret("Run unit tests for user service");
        assert_eq!(action.action_type, ActionType::QueueAction);
        assert_eq!(action.parameters["queuedAction"], "RUN_TESTS");
        assert!(rt.remove_active_test("t0").is_some());
        assert!(rt.remove_active_test("t0").is_none());
    }

    #[test]
    fn learned_patterns_raise_confidence() {
        let rt = runtime();
        let first = rt.interpret_detailed("Run unit tests for user service");
        rt.learn_from_interaction(&first.command, &first.analysis, &first.action);
        assert!(rt.memory().pattern("RUN_TESTS_RUN_TESTS").is_some());
        assert_eq!(rt.insights().cycle, 1);

        let second = rt.interpret_detailed("Run unit tests for user service");
        assert!((second.analysis.confidence - 1.0).abs() < 1e-9);
        let insights = rt.try_learn(&second).unwrap();
        assert_eq!(insights.cycle, 2);
    }

    #[test]
    fn oversized_command_is_reported_or_clarified() {
        let rt = runtime();
        let text = "run ".repeat(2000);
        assert!(matches!(
            rt.try_interpret_detailed(&text),
            Err(JarvisError::Parse(ParseError::InputTooLong { .. }))
        ));
        let action = rt.interpret(&text);
        assert_eq!(action.action_type, ActionType::RequestClarification);
        assert_eq!(action.priority, Priority::Low);
    }

    #[test]
    fn outcomes_land_in_memory() {
        let rt = runtime();
        rt.record_outcome(Outcome::Result(TestResult::new(
            "r1",
            "order-service",
            TestType::IntegrationTest,
            TestStatus::Passed,
            12.0,
        )));
        rt.record_outcome(Outcome::Failure(TestFailure::new(
            "r2",
            "order-service",
            FailureType::Timeout,
            "gateway timed out",
        )));
        let stats = rt.memory_statistics();
        assert_eq!(stats.test_results, 1);
        assert_eq!(stats.recent_failures, 1);
        assert!(rt.remember(" ", json!(1)).is_err());
        assert!(rt.remember("operator.note", json!("freeze")).is_ok());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = JarvisConfig::default();
        config.decision.max_parallel_actions = 0;
        assert!(matches!(
            JarvisRuntime::builder(config).build(),
            Err(JarvisError::Setup(_))
        ));
    }

    #[test]
    fn component_logs_land_in_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let rt = JarvisRuntime::builder(JarvisConfig::default())
            .log_dir(dir.path())
            .build()
            .unwrap();
        let _ = rt.interpret("run unit tests for user service");
        let runtime_log = std::fs::read_to_string(dir.path().join("runtime.log.jsonl")).unwrap();
        assert!(runtime_log.contains("runtime.interpret.completed"));
        assert!(dir.path().join("decision.log.jsonl").exists());
    }
}
