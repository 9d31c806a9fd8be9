use jarvis_context::AnalysisSummary;
use jarvis_model::{DecisionSettings, Intent, Priority, RiskLevel, TestType};
use jarvis_nlp::{ContextScope, ParsedCommand, Urgency};

use crate::action::{ActionType, ExecutionStrategy};

/// Everything a rule predicate may look at.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Command being decided.
    pub command: &'a ParsedCommand,
    /// Its analysis.
    pub analysis: &'a AnalysisSummary,
    /// Live decision settings.
    pub settings: &'a DecisionSettings,
    /// Failures currently held in memory.
    pub recent_failures: usize,
}

impl RuleContext<'_> {
    const fn risk(&self) -> RiskLevel {
        self.analysis.risk.level
    }
}

/// Predicate paired with the result it selects. Tables are evaluated in
/// order; the first match wins.
pub type Rule<T> = (fn(&RuleContext<'_>) -> bool, T);

/// Refinement of a `RUN_TESTS` intent.
pub const RUN_REFINEMENTS: &[Rule<ActionType>] = &[
    (high_risk_heavy_types, ActionType::RunIsolatedTests),
    (wants_performance, ActionType::RunPerformanceTests),
    (wants_security, ActionType::RunSecurityTests),
    (wants_integration, ActionType::RunIntegrationTests),
];

/// Strategy selection. High risk is checked before chaos, so a high-risk
/// chaos run is sequential, not isolated.
pub const STRATEGY_RULES: &[Rule<ExecutionStrategy>] = &[
    (wide_and_long, ExecutionStrategy::Parallel),
    (is_high_risk, ExecutionStrategy::Sequential),
    (wants_chaos, ExecutionStrategy::Isolated),
    (cpu_loaded, ExecutionStrategy::Sequential),
];

/// First result whose predicate holds.
#[must_use]
pub fn first_match<T: Copy>(rules: &[Rule<T>], ctx: &RuleContext<'_>) -> Option<T> {
    rules
        .iter()
        .find(|(predicate, _)| predicate(ctx))
        .map(|(_, result)| *result)
}

/// Action type for the command's top-level intent.
#[must_use]
pub fn select_action(ctx: &RuleContext<'_>) -> ActionType {
    match ctx.command.primary_intent() {
        Intent::RunTests => first_match(RUN_REFINEMENTS, ctx).unwrap_or(ActionType::RunTests),
        Intent::AnalyzeFailures => ActionType::AnalyzeFailures,
        Intent::GenerateTests => ActionType::GenerateTests,
        Intent::OptimizeTests => ActionType::OptimizeTests,
        Intent::HealthCheck => ActionType::HealthCheck,
        Intent::GetStatus => ActionType::MonitorSystem,
        Intent::Help => ActionType::GenerateReport,
        Intent::Unknown => ActionType::Unknown,
    }
}

/// Scheduling strategy; `ADAPTIVE` when no rule fires.
#[must_use]
pub fn select_strategy(ctx: &RuleContext<'_>) -> ExecutionStrategy {
    first_match(STRATEGY_RULES, ctx).unwrap_or(ExecutionStrategy::Adaptive)
}

fn high_risk_heavy_types(ctx: &RuleContext<'_>) -> bool {
    is_high_risk(ctx)
        && ctx
            .command
            .has_any_test_type(&[TestType::ChaosTest, TestType::PerformanceTest])
}

fn wants_performance(ctx: &RuleContext<'_>) -> bool {
    ctx.command.has_any_test_type(&[TestType::PerformanceTest])
}

fn wants_security(ctx: &RuleContext<'_>) -> bool {
    ctx.command
        .has_any_test_type(&[TestType::SecurityTest, TestType::PenetrationTest])
}

fn wants_integration(ctx: &RuleContext<'_>) -> bool {
    ctx.command.has_any_test_type(&[TestType::IntegrationTest])
}

fn wants_chaos(ctx: &RuleContext<'_>) -> bool {
    ctx.command.has_any_test_type(&[TestType::ChaosTest])
}

fn wide_and_long(ctx: &RuleContext<'_>) -> bool {
    ctx.command.services.len() > 2 && ctx.analysis.performance.estimated_minutes > 20.0
}

fn is_high_risk(ctx: &RuleContext<'_>) -> bool {
    ctx.risk() == RiskLevel::High
}

fn cpu_loaded(ctx: &RuleContext<'_>) -> bool {
    ctx.analysis.signals.cpu_usage() > ctx.settings.cpu_sequential_threshold
}

/// Inputs of the weighted priority score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityFactors {
    /// Assessed risk level.
    pub risk: RiskLevel,
    /// Health snapshot reports trouble.
    pub impaired_health: bool,
    /// Failures currently held in memory.
    pub recent_failures: usize,
    /// Operator asked for urgency.
    pub urgent: bool,
    /// Operator asked for full coverage.
    pub comprehensive: bool,
}

impl PriorityFactors {
    /// Reads the factors off a rule context.
    #[must_use]
    pub fn from_context(ctx: &RuleContext<'_>) -> Self {
        let command = ctx.command;
        let urgent = command.context.urgency == Urgency::High
            || command
                .parameter_str("timeConstraint")
                .is_some_and(|value| {
                    value.eq_ignore_ascii_case("urgent") || value.eq_ignore_ascii_case("immediate")
                });
        let comprehensive = command.context.scope == ContextScope::Comprehensive
            || command
                .parameter_str("scope")
                .is_some_and(|value| value.eq_ignore_ascii_case("full"));
        Self {
            risk: ctx.risk(),
            impaired_health: ctx.analysis.signals.is_impaired(),
            recent_failures: ctx.recent_failures,
            urgent,
            comprehensive,
        }
    }

    /// Weighted score clamped to 1.
    #[must_use]
    pub fn score(&self) -> f64 {
        let mut score = match self.risk {
            RiskLevel::High => 0.4,
            RiskLevel::Medium => 0.2,
            RiskLevel::Low => 0.1,
        };
        if self.impaired_health {
            score += 0.3;
        }
        if self.recent_failures > 3 {
            score += 0.2;
        }
        if self.urgent {
            score += 0.3;
        }
        if self.comprehensive {
            score += 0.1;
        }
        f64::min(score, 1.0)
    }

    /// Priority bucket for [`Self::score`].
    #[must_use]
    pub fn priority(&self) -> Priority {
        Priority::from_score(self.score())
    }
}
