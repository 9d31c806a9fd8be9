use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{optimizations::Optimization, trends::Trend};

/// Pattern at or above the learning threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternInsight {
    /// Pattern key.
    pub name: String,
    /// Moving-average confidence.
    pub confidence: f64,
    /// Observations folded in.
    pub observations: u64,
}

/// Everything the learning engine currently believes, rendered at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningInsights {
    /// One line per strong pattern, trend and optimization.
    pub insights: Vec<String>,
    /// Strong patterns.
    pub patterns: Vec<PatternInsight>,
    /// Latest trends.
    pub trends: Vec<Trend>,
    /// Standing optimizations.
    pub optimizations: Vec<Optimization>,
    /// When rendered.
    pub generated_at: DateTime<Utc>,
    /// Learning cycle that produced the snapshot; 0 before the first one.
    pub cycle: u64,
}

impl LearningInsights {
    /// Snapshot published before any learning cycle ran.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            insights: Vec::new(),
            patterns: Vec::new(),
            trends: Vec::new(),
            optimizations: Vec::new(),
            generated_at: Utc::now(),
            cycle: 0,
        }
    }

    /// Renders the insight lines from the structured parts.
    #[must_use]
    pub fn render(
        patterns: Vec<PatternInsight>,
        trends: Vec<Trend>,
        optimizations: Vec<Optimization>,
        generated_at: DateTime<Utc>,
        cycle: u64,
    ) -> Self {
        let mut insights = Vec::with_capacity(patterns.len() + trends.len() + optimizations.len());
        insights.extend(patterns.iter().map(|p| {
            format!(
                "Strong pattern detected: {} (confidence: {:.2})",
                p.name, p.confidence
            )
        }));
        insights.extend(trends.iter().map(|t| {
            format!(
                "Trend: {} is {} (current: {:.2}, previous: {:.2})",
                t.name, t.direction, t.current_value, t.previous_value
            )
        }));
        insights.extend(optimizations.iter().map(|o| {
            format!("Optimization: {} (impact: {})", o.description, o.impact)
        }));
        Self {
            insights,
            patterns,
            trends,
            optimizations,
            generated_at,
            cycle,
        }
    }
}

impl Default for LearningInsights {
    fn default() -> Self {
        Self::empty()
    }
}

/// Latest [`LearningInsights`], swapped whole so readers never observe a
/// partial update.
#[derive(Debug)]
pub struct InsightsCell {
    current: RwLock<Arc<LearningInsights>>,
}

impl InsightsCell {
    /// Cell holding [`LearningInsights::empty`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(LearningInsights::empty())),
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<LearningInsights> {
        Arc::clone(&*self.current.read())
    }

    /// Installs `insights` unless a later cycle already landed, and returns
    /// whichever snapshot is current afterwards.
    pub fn publish(&self, insights: LearningInsights) -> Arc<LearningInsights> {
        let mut current = self.current.write();
        if insights.cycle > current.cycle {
            *current = Arc::new(insights);
        }
        Arc::clone(&*current)
    }
}

impl Default for InsightsCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{optimizations::Impact, trends::TrendDirection};

    #[test]
    fn render_formats_each_kind() {
        let now = Utc::now();
        let insights = LearningInsights::render(
            vec![PatternInsight {
                name: "RUN_TESTS_RUN_TESTS".into(),
                confidence: 0.8,
                observations: 3,
            }],
            vec![Trend {
                name: "execution_time".into(),
                description: String::new(),
                current_value: 12.3456,
                previous_value: 10.0,
                direction: TrendDirection::Degrading,
                confidence: 0.7,
                computed_at: now,
            }],
            vec![Optimization {
                name: "reduce_parallelism".into(),
                description: "Reduce parallelism".into(),
                impact: Impact::High,
                confidence: 0.9,
                updated_at: now,
            }],
            now,
            4,
        );
        assert_eq!(
            insights.insights,
            vec![
                "Strong pattern detected: RUN_TESTS_RUN_TESTS (confidence: 0.80)".to_string(),
                "Trend: execution_time is degrading (current: 12.35, previous: 10.00)".to_string(),
                "Optimization: Reduce parallelism (impact: HIGH)".to_string(),
            ]
        );
        assert_eq!(insights.cycle, 4);
    }

    #[test]
    fn readers_keep_their_snapshot_across_publish() {
        let cell = InsightsCell::new();
        let before = cell.load();
        assert_eq!(before.cycle, 0);
        let mut next = LearningInsights::empty();
        next.cycle = 1;
        cell.publish(next);
        assert_eq!(before.cycle, 0);
        assert_eq!(cell.load().cycle, 1);
    }

    #[test]
    fn late_publish_of_older_cycle_is_ignored() {
        let cell = InsightsCell::new();
        let mut newer = LearningInsights::empty();
        newer.cycle = 3;
        newer.insights.push("newer".into());
        cell.publish(newer);

        let mut older = LearningInsights::empty();
        older.cycle = 2;
        let current = cell.publish(older);
        assert_eq!(current.cycle, 3);
        assert_eq!(cell.load().insights, vec!["newer".to_string()]);
    }
}
