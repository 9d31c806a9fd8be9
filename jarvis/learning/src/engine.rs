use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use jarvis_context::AnalysisSummary;
use jarvis_decision::DecisionAction;
use jarvis_memory::{LearningRecord, LearningRecordType, MemoryStore, Pattern};
use jarvis_model::{ConfigHandle, Parameters, SystemMonitor};
use jarvis_nlp::ParsedCommand;
use parking_lot::RwLock;
use serde_json::{json, Value};
use shared_logging::{LogLevel, Telemetry};
use thiserror::Error;

use crate::{
    insights::{InsightsCell, LearningInsights, PatternInsight},
    optimizations::{self, Optimization, OptimizationInputs},
    patterns::{interaction_keys, PatternTracker},
    trends::{self, ServiceUsage, Trend},
};

/// Errors that abort a learning cycle. The previous snapshot stays
/// published.
#[derive(Debug, Error)]
pub enum LearningError {
    /// The observed confidence cannot be averaged.
    #[error("observed confidence must be finite, got {0}")]
    NonFiniteObservation(f64),
    /// A trend came out as NaN or infinite.
    #[error("trend {name} produced a non-finite value")]
    NonFiniteTrend {
        /// Trend name.
        name: String,
    },
}

/// Folds interactions and outcomes into patterns, trends and
/// optimizations.
#[derive(Debug)]
pub struct LearningEngine {
    config: ConfigHandle,
    memory: Arc<MemoryStore>,
    monitor: Arc<dyn SystemMonitor>,
    patterns: PatternTracker,
    trends: RwLock<IndexMap<String, Trend>>,
    optimizations: RwLock<IndexMap<String, Optimization>>,
    insights: InsightsCell,
    cycles: AtomicU64,
    telemetry: Option<Telemetry>,
}

impl LearningEngine {
    /// Engine over `memory`, reading resource samples from `monitor`.
    #[must_use]
    pub fn new(
        config: ConfigHandle,
        memory: Arc<MemoryStore>,
        monitor: Arc<dyn SystemMonitor>,
    ) -> Self {
        Self {
            config,
            memory,
            monitor,
            patterns: PatternTracker::new(),
            trends: RwLock::new(IndexMap::new()),
            optimizations: RwLock::new(IndexMap::new()),
            insights: InsightsCell::new(),
            cycles: AtomicU64::new(0),
            telemetry: None,
        }
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn insights(&self) -> Arc<LearningInsights> {
        self.insights.load()
    }

    /// Running confidence of one pattern key.
    #[must_use]
    pub fn pattern_confidence(&self, key: &str) -> Option<f64> {
        self.patterns.confidence(key)
    }

    /// Cached trends.
    #[must_use]
    pub fn trends(&self) -> Vec<Trend> {
        self.trends.read().values().cloned().collect()
    }

    /// Standing optimizations.
    #[must_use]
    pub fn optimizations(&self) -> Vec<Optimization> {
        self.optimizations.read().values().cloned().collect()
    }

    /// Learns from one decision; a failed cycle is logged and skipped.
    pub fn learn_from_interaction(
        &self,
        command: &ParsedCommand,
        analysis: &AnalysisSummary,
        action: &DecisionAction,
    ) {
        if let Err(err) = self.try_learn_from_interaction(command, analysis, action) {
            self.cycle_failed("interaction", &err);
        }
    }

    /// Runs all four stages for one decision and publishes a new snapshot.
    pub fn try_learn_from_interaction(
        &self,
        command: &ParsedCommand,
        analysis: &AnalysisSummary,
        action: &DecisionAction,
    ) -> Result<Arc<LearningInsights>, LearningError> {
        let observed = analysis.confidence;
        if !observed.is_finite() {
            return Err(LearningError::NonFiniteObservation(observed));
        }
        let now = self.memory.now();
        self.record_interaction(command, analysis, action, now);
        self.update_patterns(&interaction_keys(command, analysis, action), observed, now);
        self.refresh(now)?;
        Ok(self.publish(now, "interaction"))
    }

    /// Scheduled pass over trends and optimizations; a failed cycle is
    /// logged and skipped.
    pub fn recompute(&self) {
        if let Err(err) = self.try_recompute() {
            self.cycle_failed("scheduled", &err);
        }
    }

    /// Recomputes trends and optimizations and publishes a new snapshot.
    pub fn try_recompute(&self) -> Result<Arc<LearningInsights>, LearningError> {
        let now = self.memory.now();
        self.refresh(now)?;
        Ok(self.publish(now, "scheduled"))
    }

    /// Clears pattern, trend and optimization caches and publishes the
    /// resulting empty view. Patterns already stored in memory stay.
    pub fn reset(&self) {
        self.patterns.clear();
        self.trends.write().clear();
        self.optimizations.write().clear();
        self.publish(self.memory.now(), "reset");
    }

    fn record_interaction(
        &self,
        command: &ParsedCommand,
        analysis: &AnalysisSummary,
        action: &DecisionAction,
        now: DateTime<Utc>,
    ) {
        let intent = command.primary_intent();
        let mut data = Parameters::new();
        data.insert("intentType".into(), json!(intent.as_str()));
        data.insert("intentConfidence".into(), json!(command.confidence));
        data.insert("analysisConfidence".into(), json!(analysis.confidence));
        data.insert("actionType".into(), json!(action.action_type.as_str()));
        data.insert("actionPriority".into(), json!(action.priority.as_str()));
        data.insert("riskLevel".into(), json!(analysis.risk.level.as_str()));
        data.insert(
            "estimatedTime".into(),
            json!(analysis.performance.estimated_minutes),
        );
        data.insert("services".into(), json!(command.services));
        self.memory.add_learning_record(
            LearningRecord::new(LearningRecordType::Interaction, data, now)
                .with_insight(format!("Interaction: {intent} -> {}", action.action_type)),
        );
    }

    fn update_patterns(&self, keys: &[String], observed: f64, now: DateTime<Utc>) {
        let settings = self.config.current();
        let alpha = settings.learning.ema_alpha;
        for key in keys {
            self.patterns.observe(key, observed, alpha);
        }
        for (name, confidence, observations) in
            self.patterns.above(settings.learning.confidence_threshold)
        {
            let mut pattern = Pattern::new(name.clone(), confidence, format!("Learned pattern: {name}"));
            pattern.frequency = observations;
            pattern.updated_at = now;
            self.memory.store_pattern(pattern);
        }
    }

    /// Stages 3 and 4. Everything is computed before any cache is touched,
    /// so an error leaves the caches as they were.
    fn refresh(&self, now: DateTime<Utc>) -> Result<(), LearningError> {
        let config = self.config.current();
        let min_points = config.learning.min_data_points;
        let results = self.memory.test_results();
        let failures = self.memory.recent_failures();

        let usage = trends::service_usage_trend(&results, now, min_points);
        let computed: Vec<Trend> = [
            trends::success_rate_trend(&results, now, min_points),
            trends::execution_time_trend(&results, now, min_points),
            trends::failure_rate_trend(&failures, now, min_points),
            usage.as_ref().map(|(trend, _)| trend.clone()),
        ]
        .into_iter()
        .flatten()
        .collect();
        if let Some(bad) = computed
            .iter()
            .find(|t| !t.current_value.is_finite() || !t.previous_value.is_finite())
        {
            return Err(LearningError::NonFiniteTrend {
                name: bad.name.clone(),
            });
        }

        let fired = optimizations::evaluate(&OptimizationInputs {
            results: &results,
            failures: &failures,
            metrics: self.monitor.performance_metrics(),
            min_data_points: min_points,
            settings: &config.decision,
            now,
        });

        self.commit_trends(computed, now);
        if let Some((_, usage)) = usage {
            self.record_usage(&usage, now);
        }
        self.commit_optimizations(fired, now);
        Ok(())
    }

    fn commit_trends(&self, computed: Vec<Trend>, now: DateTime<Utc>) {
        let mut cache = self.trends.write();
        for trend in computed {
            let turned = cache
                .get(&trend.name)
                .map_or(true, |previous| previous.direction != trend.direction);
            if turned {
                let mut data = Parameters::new();
                data.insert("name".into(), json!(trend.name));
                data.insert("direction".into(), json!(trend.direction.label()));
                data.insert("currentValue".into(), json!(trend.current_value));
                data.insert("previousValue".into(), json!(trend.previous_value));
                self.memory.add_learning_record(
                    LearningRecord::new(LearningRecordType::Trend, data, now)
                        .with_insight(format!("Trend: {} is {}", trend.name, trend.direction)),
                );
            }
            cache.insert(trend.name.clone(), trend);
        }
    }

    fn record_usage(&self, usage: &ServiceUsage, now: DateTime<Utc>) {
        let mut data = Parameters::new();
        data.insert("mostUsedService".into(), json!(usage.most_used));
        data.insert("leastUsedService".into(), json!(usage.least_used));
        data.insert("serviceUsage".into(), json!(usage.counts));
        self.memory.add_learning_record(
            LearningRecord::new(LearningRecordType::ServiceUsage, data, now).with_insight(format!(
                "Service usage analysis: {} most used, {} least used",
                usage.most_used, usage.least_used
            )),
        );
    }

    fn commit_optimizations(&self, fired: Vec<Optimization>, now: DateTime<Utc>) {
        let mut cache = self.optimizations.write();
        for optimization in fired {
            if !cache.contains_key(&optimization.name) {
                let mut data = Parameters::new();
                data.insert("name".into(), json!(optimization.name));
                data.insert("impact".into(), json!(optimization.impact));
                data.insert("confidence".into(), json!(optimization.confidence));
                self.memory.add_learning_record(
                    LearningRecord::new(LearningRecordType::Optimization, data, now)
                        .with_insight(optimization.description.clone()),
                );
            }
            cache.insert(optimization.name.clone(), optimization);
        }
    }

    fn publish(&self, now: DateTime<Utc>, trigger: &str) -> Arc<LearningInsights> {
        let threshold = self.config.current().learning.confidence_threshold;
        let patterns = self
            .patterns
            .above(threshold)
            .into_iter()
            .map(|(name, confidence, observations)| PatternInsight {
                name,
                confidence,
                observations,
            })
            .collect();
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = self.insights.publish(LearningInsights::render(
            patterns,
            self.trends(),
            self.optimizations(),
            now,
            cycle,
        ));
        self.log(
            LogLevel::Debug,
            "learning.cycle.completed",
            json!({
                "cycle": cycle,
                "trigger": trigger,
                "patterns": snapshot.patterns.len(),
                "trends": snapshot.trends.len(),
                "optimizations": snapshot.optimizations.len(),
            }),
        );
        snapshot
    }

    fn cycle_failed(&self, trigger: &str, err: &LearningError) {
        tracing::warn!(error = %err, trigger, "learning cycle skipped");
        self.log(
            LogLevel::Warn,
            "learning.cycle.failed",
            json!({ "trigger": trigger, "error": err.to_string() }),
        );
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarvis_decision::{ActionType, DecisionAction};
    use jarvis_memory::{TestResult, TestStatus};
    use jarvis_model::{PerformanceMetrics, Priority, StaticMonitor, TestType};
    use jarvis_nlp::CommandParser;

    struct Fixture {
        engine: LearningEngine,
        memory: Arc<MemoryStore>,
        monitor: Arc<StaticMonitor>,
    }

    fn fixture() -> Fixture {
        let config = ConfigHandle::default();
        let memory = Arc::new(MemoryStore::new(config.clone()));
        let monitor = Arc::new(StaticMonitor::healthy());
        let engine = LearningEngine::new(config, Arc::clone(&memory), monitor.clone());
        Fixture {
            engine,
            memory,
            monitor,
        }
    }

    fn interaction(confidence: f64) -> (ParsedCommand, AnalysisSummary, DecisionAction) {
        let command = CommandParser::new().parse("Run unit tests for user service");
        let analysis = AnalysisSummary::baseline(confidence);
        let action = DecisionAction::new(
            ActionType::RunTests,
            Priority::Low,
            confidence,
            "Executing test suite for user-service",
            Utc::now(),
        );
        (command, analysis, action)
    }

    fn add_results(memory: &MemoryStore, count: usize, secs: f64) {
        for idx in 0..count {
            memory.add_test_result(TestResult::new(
                format!("r{idx}"),
                "user-service",
                TestType::UnitTest,
                TestStatus::Passed,
                secs,
            ));
        }
    }

    #[test]
    fn interaction_records_and_promotes_strong_patterns() {
        let fx = fixture();
        let (command, analysis, action) = interaction(0.8);
        let snapshot = fx
            .engine
            .try_learn_from_interaction(&command, &analysis, &action)
            .unwrap();
        assert_eq!(snapshot.cycle, 1);
        assert!(snapshot
            .insights
            .contains(&"Strong pattern detected: RUN_TESTS_RUN_TESTS (confidence: 0.80)".to_string()));
        let stored = fx.memory.pattern("RUN_TESTS_RUN_TESTS").unwrap();
        assert_eq!(stored.frequency, 1);
        assert!(fx.memory.pattern("risk_LOW").is_some());
        assert!(fx.memory.pattern("service_user-service_RUN_TESTS").is_some());
        let records = fx
            .memory
            .learning_records_by_type(LearningRecordType::Interaction);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].insight.as_deref(),
            Some("Interaction: RUN_TESTS -> RUN_TESTS")
        );
        assert_eq!(records[0].data["actionType"], "RUN_TESTS");
    }

    #[test]
    fn weak_patterns_stay_out_of_memory() {
        let fx = fixture();
        let (command, analysis, action) = interaction(0.5);
        fx.engine.learn_from_interaction(&command, &analysis, &action);
        assert!(fx.memory.all_patterns().is_empty());
        assert!((fx.engine.pattern_confidence("RUN_TESTS_RUN_TESTS").unwrap() - 0.5).abs() < 1e-12);
        let (command, analysis, action) = interaction(1.0);
        fx.engine.learn_from_interaction(&command, &analysis, &action);
        // 0.3 * 1.0 + 0.7 * 0.5
        assert!((fx.engine.pattern_confidence("RUN_TESTS_RUN_TESTS").unwrap() - 0.65).abs() < 1e-12);
        assert!(fx.memory.all_patterns().is_empty());
    }

    #[test]
    fn recompute_builds_trends_and_optimizations() {
        let fx = fixture();
        add_results(&fx.memory, 12, 1.0);
        fx.monitor.set_metrics(PerformanceMetrics::new(95.0, 90.0));
        let snapshot = fx.engine.try_recompute().unwrap();
        let names: Vec<&str> = snapshot.trends.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["success_rate", "execution_time", "service_usage"]);
        let optimizations: Vec<&str> = snapshot
            .optimizations
            .iter()
            .map(|o| o.name.as_str())
            .collect();
        assert_eq!(
            optimizations,
            vec!["parallel_fast_tests", "reduce_parallelism", "memory_optimization"]
        );
        assert!(snapshot
            .insights
            .iter()
            .any(|line| line == "Optimization: High CPU usage detected - consider reducing parallel test execution (impact: HIGH)"));
        let usage = fx
            .memory
            .learning_records_by_type(LearningRecordType::ServiceUsage);
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].data["mostUsedService"], "user-service");
        assert_eq!(
            fx.memory
                .learning_records_by_type(LearningRecordType::Optimization)
                .len(),
            3
        );
        fx.engine.recompute();
        assert_eq!(
            fx.memory
                .learning_records_by_type(LearningRecordType::Optimization)
                .len(),
            3
        );
        assert_eq!(fx.engine.insights().cycle, 2);
    }

    #[test]
    fn failed_cycle_keeps_previous_snapshot() {
        let fx = fixture();
        let (command, analysis, action) = interaction(0.9);
        fx.engine.learn_from_interaction(&command, &analysis, &action);
        let before = fx.engine.insights();

        let mut broken = analysis;
        broken.confidence = f64::NAN;
        assert!(matches!(
            fx.engine.try_learn_from_interaction(&command, &broken, &action),
            Err(LearningError::NonFiniteObservation(_))
        ));

        add_results(&fx.memory, 12, f64::NAN);
        assert!(matches!(
            fx.engine.try_recompute(),
            Err(LearningError::NonFiniteTrend { .. })
        ));
        fx.engine.recompute();
        assert!(Arc::ptr_eq(&before, &fx.engine.insights()));
        assert!(fx.engine.trends().is_empty());
    }

    #[test]
    fn concurrent_cycles_leave_the_latest_snapshot() {
        let fx = fixture();
        add_results(&fx.memory, 12, 1.0);
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        fx.engine.recompute();
                    }
                });
            }
        });
        assert_eq!(fx.engine.insights().cycle, 100);
    }

    #[test]
    fn reset_clears_caches() {
        let fx = fixture();
        add_results(&fx.memory, 12, 1.0);
        let (command, analysis, action) = interaction(0.9);
        fx.engine.learn_from_interaction(&command, &analysis, &action);
        assert!(!fx.engine.trends().is_empty());
        fx.engine.reset();
        let snapshot = fx.engine.insights();
        assert!(snapshot.insights.is_empty());
        assert!(fx.engine.pattern_confidence("RUN_TESTS_RUN_TESTS").is_none());
        assert!(fx.memory.pattern("RUN_TESTS_RUN_TESTS").is_some());
    }
}
