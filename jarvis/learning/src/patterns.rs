use indexmap::IndexMap;
use jarvis_context::AnalysisSummary;
use jarvis_decision::DecisionAction;
use jarvis_nlp::ParsedCommand;
use parking_lot::RwLock;

/// One exponential-moving-average step. The first observation seeds the
/// average directly.
#[must_use]
pub fn ema(alpha: f64, previous: Option<f64>, observed: f64) -> f64 {
    previous.map_or(observed, |previous| {
        alpha.mul_add(observed, (1.0 - alpha) * previous)
    })
}

/// Pattern keys touched by one interaction: intent→action, risk level,
/// per service and per test type.
#[must_use]
pub fn interaction_keys(
    command: &ParsedCommand,
    analysis: &AnalysisSummary,
    action: &DecisionAction,
) -> Vec<String> {
    let action_label = action.action_type.as_str();
    let mut keys = vec![
        format!("{}_{action_label}", command.primary_intent().as_str()),
        format!("risk_{}", analysis.risk.level.as_str()),
    ];
    keys.extend(
        command
            .services
            .iter()
            .map(|service| format!("service_{service}_{action_label}")),
    );
    keys.extend(
        command
            .test_types
            .iter()
            .map(|test_type| format!("testtype_{}_{action_label}", test_type.as_str())),
    );
    keys
}

#[derive(Debug, Clone, Copy)]
struct PatternStat {
    confidence: f64,
    observations: u64,
}

/// Running confidences per pattern key.
#[derive(Debug, Default)]
pub struct PatternTracker {
    stats: RwLock<IndexMap<String, PatternStat>>,
}

impl PatternTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `observed` into `key` and returns the new confidence.
    pub fn observe(&self, key: &str, observed: f64, alpha: f64) -> f64 {
        let mut stats = self.stats.write();
        let stat = stats.entry(key.to_string()).or_insert(PatternStat {
            confidence: observed,
            observations: 0,
        });
        stat.confidence = if stat.observations == 0 {
            observed
        } else {
            ema(alpha, Some(stat.confidence), observed)
        };
        stat.observations += 1;
        stat.confidence
    }

    /// Current confidence for `key`.
    #[must_use]
    pub fn confidence(&self, key: &str) -> Option<f64> {
        self.stats.read().get(key).map(|stat| stat.confidence)
    }

    /// `(key, confidence, observations)` for every key at or above
    /// `threshold`, in first-seen order.
    #[must_use]
    pub fn above(&self, threshold: f64) -> Vec<(String, f64, u64)> {
        self.stats
            .read()
            .iter()
            .filter(|(_, stat)| stat.confidence >= threshold)
            .map(|(key, stat)| (key.clone(), stat.confidence, stat.observations))
            .collect()
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stats.read().len()
    }

    /// True when nothing has been observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stats.read().is_empty()
    }

    /// Forgets every key.
    pub fn clear(&self) {
        self.stats.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarvis_decision::{ActionType, DecisionAction};
    use jarvis_model::{Priority, RiskLevel};
    use jarvis_nlp::CommandParser;
    use proptest::prelude::*;

    #[test]
    fn first_observation_seeds_then_averages() {
        let tracker = PatternTracker::new();
        assert!((tracker.observe("k", 0.5, 0.3) - 0.5).abs() < 1e-12);
        // 0.3 * 1.0 + 0.7 * 0.5
        assert!((tracker.observe("k", 1.0, 0.3) - 0.65).abs() < 1e-12);
        assert_eq!(tracker.above(0.6).len(), 1);
        assert!(tracker.above(0.7).is_empty());
        tracker.clear();
        assert!(tracker.is_empty());
    }

    #[test]
    fn keys_cover_every_dimension() {
        let command = CommandParser::new().parse("Run chaos tests on order service");
        let analysis = AnalysisSummary::baseline(0.8).with_risk_level(RiskLevel::High);
        let action = DecisionAction::new(
            ActionType::RunIsolatedTests,
            Priority::High,
            0.8,
            "x",
            chrono::Utc::now(),
        );
        assert_eq!(
            interaction_keys(&command, &analysis, &action),
            vec![
                "RUN_TESTS_RUN_ISOLATED_TESTS".to_string(),
                "risk_HIGH".to_string(),
                "service_order-service_RUN_ISOLATED_TESTS".to_string(),
                "testtype_CHAOS_TEST_RUN_ISOLATED_TESTS".to_string(),
            ]
        );
    }

    proptest! {
        #[test]
        fn repeated_observations_converge(
            start in 0.0f64..=1.0,
            target in 0.0f64..=1.0,
            alpha in 0.05f64..=1.0,
        ) {
            let tracker = PatternTracker::new();
            tracker.observe("p", start, alpha);
            let mut last = start;
            for _ in 0..400 {
                last = tracker.observe("p", target, alpha);
            }
            prop_assert!((last - target).abs() < 1e-6);
        }

        #[test]
        fn ema_stays_between_inputs(
            previous in 0.0f64..=1.0,
            observed in 0.0f64..=1.0,
            alpha in 0.0f64..=1.0,
        ) {
            let next = ema(alpha, Some(previous), observed);
            prop_assert!(next >= previous.min(observed) - 1e-12);
            prop_assert!(next <= previous.max(observed) + 1e-12);
        }
    }
}
