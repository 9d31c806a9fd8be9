use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use jarvis_memory::{FailureType, TestFailure, TestResult};
use jarvis_model::{DecisionSettings, PerformanceMetrics};
use serde::{Deserialize, Serialize};

/// Tests faster than this many seconds count as fast.
const FAST_TEST_SECS: f64 = 5.0;
/// Tests slower than this many seconds count as slow.
const SLOW_TEST_SECS: f64 = 30.0;
/// Service average above this many seconds is flagged.
const SLOW_SERVICE_SECS: f64 = 20.0;
/// Failure count above which the dominant failure type is flagged.
const FAILURE_PATTERN_MIN: usize = 5;

/// Expected payoff of an optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Impact {
    /// Marginal.
    Low,
    /// Noticeable.
    Medium,
    /// Significant.
    High,
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        })
    }
}

/// Standing recommendation, upserted by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Optimization {
    /// Stable key.
    pub name: String,
    /// Operator-facing advice.
    pub description: String,
    /// Expected payoff.
    pub impact: Impact,
    /// Rule confidence.
    pub confidence: f64,
    /// Last time the rule fired.
    pub updated_at: DateTime<Utc>,
}

impl Optimization {
    fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        impact: Impact,
        confidence: f64,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            impact,
            confidence,
            updated_at,
        }
    }
}

/// Evidence the rules run over.
#[derive(Debug, Clone, Copy)]
pub struct OptimizationInputs<'a> {
    /// Retained test results.
    pub results: &'a [TestResult],
    /// Retained failures.
    pub failures: &'a [TestFailure],
    /// Latest resource sample.
    pub metrics: Option<PerformanceMetrics>,
    /// Minimum results before duration rules apply.
    pub min_data_points: usize,
    /// Live resource thresholds.
    pub settings: &'a DecisionSettings,
    /// Stamp for fired rules.
    pub now: DateTime<Utc>,
}

/// Every optimization whose rule fires on `inputs`.
#[must_use]
pub fn evaluate(inputs: &OptimizationInputs<'_>) -> Vec<Optimization> {
    let mut fired = Vec::new();
    execution_rules(inputs, &mut fired);
    resource_rules(inputs, &mut fired);
    failure_rules(inputs, &mut fired);
    service_rules(inputs, &mut fired);
    fired
}

#[allow(clippy::cast_precision_loss)]
fn share_exceeds(part: usize, whole: usize, share: f64) -> bool {
    part as f64 > whole as f64 * share
}

fn execution_rules(inputs: &OptimizationInputs<'_>, fired: &mut Vec<Optimization>) {
    let results = inputs.results;
    if results.len() < inputs.min_data_points {
        return;
    }
    let fast = results
        .iter()
        .filter(|r| r.duration_secs < FAST_TEST_SECS)
        .count();
    if share_exceeds(fast, results.len(), 0.3) {
        fired.push(Optimization::new(
            "parallel_fast_tests",
            "Consider parallel execution for fast tests to improve overall execution time",
            Impact::High,
            0.8,
            inputs.now,
        ));
    }
    let slow = results
        .iter()
        .filter(|r| r.duration_secs > SLOW_TEST_SECS)
        .count();
    if share_exceeds(slow, results.len(), 0.2) {
        fired.push(Optimization::new(
            "sequential_slow_tests",
            "Consider sequential execution for slow tests to reduce resource contention",
            Impact::Medium,
            0.7,
            inputs.now,
        ));
    }
}

fn resource_rules(inputs: &OptimizationInputs<'_>, fired: &mut Vec<Optimization>) {
    let Some(metrics) = inputs.metrics else {
        return;
    };
    if metrics.cpu_usage > inputs.settings.cpu_sequential_threshold {
        fired.push(Optimization::new(
            "reduce_parallelism",
            "High CPU usage detected - consider reducing parallel test execution",
            Impact::High,
            0.9,
            inputs.now,
        ));
    }
    if metrics.memory_usage > inputs.settings.memory_queue_threshold {
        fired.push(Optimization::new(
            "memory_optimization",
            "High memory usage detected - consider running fewer concurrent tests",
            Impact::High,
            0.8,
            inputs.now,
        ));
    }
}

fn failure_rules(inputs: &OptimizationInputs<'_>, fired: &mut Vec<Optimization>) {
    if inputs.failures.len() <= FAILURE_PATTERN_MIN {
        return;
    }
    let mut counts: IndexMap<FailureType, usize> = IndexMap::new();
    for failure in inputs.failures {
        *counts.entry(failure.failure_type).or_default() += 1;
    }
    // First-seen type wins ties.
    let dominant = counts
        .iter()
        .fold(None::<(FailureType, usize)>, |best, (kind, count)| match best {
            Some((_, top)) if top >= *count => best,
            _ => Some((*kind, *count)),
        })
        .map_or(FailureType::Unknown, |(kind, _)| kind);
    fired.push(Optimization::new(
        format!("failure_pattern_{}", dominant.as_str()),
        format!(
            "High frequency of {} failures - consider preventive measures",
            dominant.as_str()
        ),
        Impact::High,
        0.8,
        inputs.now,
    ));
}

#[allow(clippy::cast_precision_loss)]
fn service_rules(inputs: &OptimizationInputs<'_>, fired: &mut Vec<Optimization>) {
    if inputs.results.len() < inputs.min_data_points {
        return;
    }
    let mut totals: IndexMap<&str, (f64, usize)> = IndexMap::new();
    for result in inputs.results {
        let entry = totals.entry(result.service_name.as_str()).or_default();
        entry.0 += result.duration_secs;
        entry.1 += 1;
    }
    let slowest = totals
        .iter()
        .map(|(service, (sum, count))| (*service, sum / *count as f64))
        .fold(None::<(&str, f64)>, |best, (service, avg)| match best {
            Some((_, top)) if top >= avg => best,
            _ => Some((service, avg)),
        });
    if let Some((service, avg)) = slowest {
        if avg > SLOW_SERVICE_SECS {
            fired.push(Optimization::new(
                format!("optimize_{service}"),
                format!("{service} has high average execution time - consider optimization"),
                Impact::Medium,
                0.7,
                inputs.now,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarvis_memory::TestStatus;
    use jarvis_model::TestType;

    fn results(service: &str, secs: &[f64]) -> Vec<TestResult> {
        secs.iter()
            .enumerate()
            .map(|(i, s)| {
                TestResult::new(format!("{service}-{i}"), service, TestType::UnitTest, TestStatus::Passed, *s)
            })
            .collect()
    }

    fn names(fired: &[Optimization]) -> Vec<&str> {
        fired.iter().map(|o| o.name.as_str()).collect()
    }

    #[test]
    fn duration_rules() {
        let settings = DecisionSettings::default();
        let mut all = results("user-service", &[1.0, 1.0, 1.0, 1.0]);
        all.extend(results("order-service", &[45.0, 45.0, 45.0, 45.0, 45.0, 45.0]));
        let fired = evaluate(&OptimizationInputs {
            results: &all,
            failures: &[],
            metrics: None,
            min_data_points: 10,
            settings: &settings,
            now: Utc::now(),
        });
        assert_eq!(
            names(&fired),
            vec!["parallel_fast_tests", "sequential_slow_tests", "optimize_order-service"]
        );
        assert_eq!(fired[0].impact, Impact::High);
        assert_eq!(fired[2].impact, Impact::Medium);
    }

    #[test]
    fn duration_rules_need_enough_results() {
        let settings = DecisionSettings::default();
        let few = results("order-service", &[45.0; 9]);
        let fired = evaluate(&OptimizationInputs {
            results: &few,
            failures: &[],
            metrics: None,
            min_data_points: 10,
            settings: &settings,
            now: Utc::now(),
        });
        assert!(fired.is_empty());
    }

    #[test]
    fn resource_and_failure_rules() {
        let settings = DecisionSettings::default();
        let mut failures: Vec<TestFailure> = (0..4)
            .map(|i| TestFailure::new(format!("c{i}"), "order-service", FailureType::Connection, "refused"))
            .collect();
        failures.extend((0..2).map(|i| {
            TestFailure::new(format!("t{i}"), "order-service", FailureType::Timeout, "slow")
        }));
        let fired = evaluate(&OptimizationInputs {
            results: &[],
            failures: &failures,
            metrics: Some(PerformanceMetrics::new(92.0, 90.0)),
            min_data_points: 10,
            settings: &settings,
            now: Utc::now(),
        });
        assert_eq!(
            names(&fired),
            vec![
                "reduce_parallelism",
                "memory_optimization",
                "failure_pattern_CONNECTION"
            ]
        );
        assert!(fired[2].description.contains("CONNECTION"));
    }
}
