use std::fmt;

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use jarvis_memory::{TestFailure, TestResult, TestStatus};
use serde::{Deserialize, Serialize};

/// Direction of a metric between a recent window and its baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendDirection {
    /// Moving the right way, or stable.
    Improving,
    /// Moving the wrong way.
    Degrading,
}

impl TrendDirection {
    /// Lower-case label used in insight lines.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Degrading => "degrading",
        }
    }

    fn between(current: f64, previous: f64, higher_is_better: bool) -> Self {
        let better = if higher_is_better {
            current >= previous
        } else {
            current <= previous
        };
        if better {
            Self::Improving
        } else {
            Self::Degrading
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One tracked metric, overwritten every cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trend {
    /// Metric name.
    pub name: String,
    /// What is measured.
    pub description: String,
    /// Value over the recent window.
    pub current_value: f64,
    /// Value over the baseline window.
    pub previous_value: f64,
    /// Which way it moves.
    pub direction: TrendDirection,
    /// Fixed per metric.
    pub confidence: f64,
    /// When computed.
    pub computed_at: DateTime<Utc>,
}

impl Trend {
    fn new(
        name: &str,
        description: &str,
        (current_value, previous_value): (f64, f64),
        direction: TrendDirection,
        confidence: f64,
        computed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            current_value,
            previous_value,
            direction,
            confidence,
            computed_at,
        }
    }
}

/// Per-service result counts over the baseline window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceUsage {
    /// Results per service, most used first.
    pub counts: IndexMap<String, u64>,
    /// Service with the most results.
    pub most_used: String,
    /// Service with the fewest results.
    pub least_used: String,
}

fn within<'a, T: 'a>(
    items: &'a [T],
    stamp: impl Fn(&T) -> DateTime<Utc> + 'a,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> impl Iterator<Item = &'a T> + 'a {
    items.iter().filter(move |item| {
        let at = stamp(item);
        at >= start && at <= end
    })
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn success_rate(results: &[TestResult], start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let (mut passed, mut total) = (0, 0);
    for result in within(results, |r| r.timestamp, start, end) {
        total += 1;
        if result.status == TestStatus::Passed {
            passed += 1;
        }
    }
    ratio(passed, total)
}

#[allow(clippy::cast_precision_loss)]
fn average_duration(results: &[TestResult], start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let (sum, count) = within(results, |r| r.timestamp, start, end)
        .fold((0.0, 0usize), |(sum, count), result| {
            (sum + result.duration_secs, count + 1)
        });
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[allow(clippy::cast_precision_loss)]
fn failures_per_hour(failures: &[TestFailure], start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let hours = (end - start).num_hours();
    if hours <= 0 {
        return 0.0;
    }
    within(failures, |f| f.timestamp, start, end).count() as f64 / hours as f64
}

/// Results per service inside the window, most used first; ties keep
/// first-seen order.
#[must_use]
pub fn service_usage(
    results: &[TestResult],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<ServiceUsage> {
    let mut counts: IndexMap<String, u64> = IndexMap::new();
    for result in within(results, |r| r.timestamp, start, end) {
        *counts.entry(result.service_name.clone()).or_default() += 1;
    }
    counts.sort_by(|_, a, _, b| b.cmp(a));
    let most_used = counts.first()?.0.clone();
    let least_used = counts.last()?.0.clone();
    Some(ServiceUsage {
        counts,
        most_used,
        least_used,
    })
}

#[allow(clippy::cast_precision_loss)]
fn skew(usage: Option<&ServiceUsage>) -> f64 {
    let Some(usage) = usage else {
        return 0.0;
    };
    let total: u64 = usage.counts.values().sum();
    let top = usage.counts.first().map_or(0, |(_, count)| *count);
    if total == 0 {
        0.0
    } else {
        top as f64 / total as f64
    }
}

/// Share of passed results over the last hour against the last day; a tie
/// is broken by comparing the day against the week.
#[must_use]
pub fn success_rate_trend(
    results: &[TestResult],
    now: DateTime<Utc>,
    min_data_points: usize,
) -> Option<Trend> {
    if results.len() < min_data_points {
        return None;
    }
    let hour = success_rate(results, now - Duration::hours(1), now);
    let day = success_rate(results, now - Duration::days(1), now);
    let week = success_rate(results, now - Duration::days(7), now);
    let direction = if (hour - day).abs() < f64::EPSILON {
        TrendDirection::between(day, week, true)
    } else {
        TrendDirection::between(hour, day, true)
    };
    Some(Trend::new(
        "success_rate",
        "Test success rate trend",
        (hour, day),
        direction,
        0.8,
        now,
    ))
}

/// Mean duration over the last hour against the last day.
#[must_use]
pub fn execution_time_trend(
    results: &[TestResult],
    now: DateTime<Utc>,
    min_data_points: usize,
) -> Option<Trend> {
    if results.len() < min_data_points {
        return None;
    }
    let hour = average_duration(results, now - Duration::hours(1), now);
    let day = average_duration(results, now - Duration::days(1), now);
    Some(Trend::new(
        "execution_time",
        "Test execution time trend",
        (hour, day),
        TrendDirection::between(hour, day, false),
        0.7,
        now,
    ))
}

/// Failures per hour over the last hour against the last day. Needs half
/// the usual data points.
#[must_use]
pub fn failure_rate_trend(
    failures: &[TestFailure],
    now: DateTime<Utc>,
    min_data_points: usize,
) -> Option<Trend> {
    if failures.len() < min_data_points / 2 {
        return None;
    }
    let hour = failures_per_hour(failures, now - Duration::hours(1), now);
    let day = failures_per_hour(failures, now - Duration::days(1), now);
    Some(Trend::new(
        "failure_rate",
        "Test failure rate trend",
        (hour, day),
        TrendDirection::between(hour, day, false),
        0.6,
        now,
    ))
}

/// Share of the most used service over the last day against the last
/// week; a falling share is improving.
#[must_use]
pub fn service_usage_trend(
    results: &[TestResult],
    now: DateTime<Utc>,
    min_data_points: usize,
) -> Option<(Trend, ServiceUsage)> {
    if results.len() < min_data_points {
        return None;
    }
    let week_usage = service_usage(results, now - Duration::days(7), now)?;
    let day_usage = service_usage(results, now - Duration::days(1), now);
    let day = skew(day_usage.as_ref());
    let week = skew(Some(&week_usage));
    let trend = Trend::new(
        "service_usage",
        "Service usage skew trend",
        (day, week),
        TrendDirection::between(day, week, false),
        0.6,
        now,
    );
    Some((trend, week_usage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarvis_memory::FailureType;
    use jarvis_model::TestType;

    fn result(idx: usize, service: &str, status: TestStatus, secs: f64, at: DateTime<Utc>) -> TestResult {
        TestResult::new(format!("r{idx}"), service, TestType::UnitTest, status, secs).at(at)
    }

    #[test]
    fn too_few_points_produce_nothing() {
        let now = Utc::now();
        let results: Vec<_> = (0..9)
            .map(|i| result(i, "user-service", TestStatus::Passed, 1.0, now))
            .collect();
        assert!(success_rate_trend(&results, now, 10).is_none());
        assert!(execution_time_trend(&results, now, 10).is_none());
        assert!(service_usage_trend(&results, now, 10).is_none());
    }

    #[test]
    fn success_rate_rising_is_improving() {
        let now = Utc::now();
        let mut results = Vec::new();
        for i in 0..10 {
            results.push(result(i, "user-service", TestStatus::Failed, 1.0, now - Duration::hours(5)));
        }
        for i in 10..15 {
            results.push(result(i, "user-service", TestStatus::Passed, 1.0, now - Duration::minutes(5)));
        }
        let trend = success_rate_trend(&results, now, 10).unwrap();
        assert!((trend.current_value - 1.0).abs() < 1e-9);
        assert!((trend.previous_value - 5.0 / 15.0).abs() < 1e-9);
        assert_eq!(trend.direction, TrendDirection::Improving);
    }

    #[test]
    fn slower_recent_runs_are_degrading() {
        let now = Utc::now();
        let mut results = Vec::new();
        for i in 0..10 {
            results.push(result(i, "order-service", TestStatus::Passed, 2.0, now - Duration::hours(3)));
        }
        results.push(result(10, "order-service", TestStatus::Passed, 40.0, now));
        let trend = execution_time_trend(&results, now, 10).unwrap();
        assert!((trend.current_value - 40.0).abs() < 1e-9);
        assert_eq!(trend.direction, TrendDirection::Degrading);
    }

    #[test]
    fn failure_rate_needs_half_the_points() {
        let now = Utc::now();
        let failures: Vec<_> = (0..5)
            .map(|i| {
                TestFailure::new(format!("f{i}"), "user-service", FailureType::Timeout, "slow")
                    .at(now - Duration::minutes(10))
            })
            .collect();
        let trend = failure_rate_trend(&failures, now, 10).unwrap();
        assert!((trend.current_value - 5.0).abs() < 1e-9);
        assert!((trend.previous_value - 5.0 / 24.0).abs() < 1e-9);
        assert_eq!(trend.direction, TrendDirection::Degrading);
        assert!(failure_rate_trend(&failures[..4], now, 10).is_none());
    }

    #[test]
    fn usage_names_most_and_least_used() {
        let now = Utc::now();
        let mut results = Vec::new();
        for i in 0..8 {
            results.push(result(i, "order-service", TestStatus::Passed, 1.0, now));
        }
        for i in 8..10 {
            results.push(result(i, "user-service", TestStatus::Passed, 1.0, now - Duration::days(3)));
        }
        let (trend, usage) = service_usage_trend(&results, now, 10).unwrap();
        assert_eq!(usage.most_used, "order-service");
        assert_eq!(usage.least_used, "user-service");
        assert!((trend.current_value - 1.0).abs() < 1e-9);
        assert!((trend.previous_value - 0.8).abs() < 1e-9);
        assert_eq!(trend.direction, TrendDirection::Degrading);
    }
}
