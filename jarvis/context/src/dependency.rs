use std::fmt;

use indexmap::IndexMap;
use jarvis_model::{services::GATEWAY_SERVICE, ConfigHandle, ServiceCatalogue, TestType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::ServiceGraph;

/// Errors raised while analysing a command's context.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Nothing to analyse (typically a failed parse).
    #[error("no target services to analyse")]
    EmptyTargets,
    /// The parser reported a failure upstream.
    #[error("command could not be parsed: {0}")]
    UnparsedCommand(String),
}

/// How far the effects of touching the target set spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SeverityLevel {
    /// Fewer than three nodes affected.
    Low,
    /// Three or four nodes affected.
    Medium,
    /// Five or more nodes affected, or fault injection requested.
    High,
    /// Analysis failed.
    Unknown,
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// Dependency closure of a target set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyInfo {
    /// Targets plus every node within the hop limit; services first in
    /// catalogue order, then datastores.
    pub affected_services: Vec<String>,
    /// `affected_services.len()`.
    pub blast_radius: usize,
    /// Severity derived from blast radius and test types.
    pub severity_level: SeverityLevel,
    /// Gateway first, then critical targets, then their direct dependencies.
    pub critical_path: Vec<String>,
    /// Affected services that can be fenced off safely.
    pub isolation_points: Vec<String>,
    /// Infrastructure each requested test type needs.
    #[serde(default)]
    pub test_dependencies: IndexMap<TestType, Vec<String>>,
    /// Expected user-visible downtime.
    pub estimated_downtime_minutes: u32,
    /// Combined impact in `[0, 1]`.
    pub impact_score: f64,
}

impl DependencyInfo {
    /// Result used when analysis fails.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            affected_services: Vec::new(),
            blast_radius: 0,
            severity_level: SeverityLevel::Unknown,
            critical_path: Vec::new(),
            isolation_points: Vec::new(),
            test_dependencies: IndexMap::new(),
            estimated_downtime_minutes: 0,
            impact_score: 0.0,
        }
    }
}

/// Walks the service graph around a target set.
#[derive(Debug, Clone)]
pub struct DependencyAnalyzer {
    graph: ServiceGraph,
    config: ConfigHandle,
}

impl DependencyAnalyzer {
    /// Analyzer over `graph`, reading the hop limit from `config`.
    #[must_use]
    pub const fn new(graph: ServiceGraph, config: ConfigHandle) -> Self {
        Self { graph, config }
    }

    /// The underlying graph.
    #[must_use]
    pub const fn graph(&self) -> &ServiceGraph {
        &self.graph
    }

    /// Dependency closure of `services`, with no test-type adjustments.
    #[must_use]
    pub fn analyze(&self, services: &[String]) -> DependencyInfo {
        self.analyze_for(services, &[])
    }

    /// Dependency closure of `services` adjusted for `test_types`; returns
    /// [`DependencyInfo::unknown`] on error.
    #[must_use]
    pub fn analyze_for(&self, services: &[String], test_types: &[TestType]) -> DependencyInfo {
        self.try_analyze(services, test_types).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "dependency analysis failed");
            DependencyInfo::unknown()
        })
    }

    /// Dependency closure, surfacing errors.
    pub fn try_analyze(
        &self,
        services: &[String],
        test_types: &[TestType],
    ) -> Result<DependencyInfo, AnalysisError> {
        if services.is_empty() {
            return Err(AnalysisError::EmptyTargets);
        }
        let hop_limit = self.config.current().analysis.hop_limit;
        let mut affected: Vec<String> = self.graph.closure(services, hop_limit).into_iter().collect();
        affected.sort_by(|a, b| {
            ServiceCatalogue::rank(a)
                .cmp(&ServiceCatalogue::rank(b))
                .then_with(|| a.cmp(b))
        });
        let blast_radius = affected.len();

        let severity_level = if blast_radius >= 5 || test_types.contains(&TestType::ChaosTest) {
            SeverityLevel::High
        } else if blast_radius >= 3 {
            SeverityLevel::Medium
        } else {
            SeverityLevel::Low
        };

        let critical_path = self.critical_path(services, &affected);
        let isolation_points = affected
            .iter()
            .filter(|svc| ServiceCatalogue::is_isolatable(svc))
            .cloned()
            .collect();
        let test_dependencies = test_types
            .iter()
            .map(|tt| (*tt, infrastructure_for(*tt)))
            .collect();
        let estimated_downtime_minutes = test_types
            .iter()
            .map(|tt| downtime_minutes(*tt))
            .max()
            .unwrap_or(0);
        let critical_targets = services
            .iter()
            .filter(|svc| ServiceCatalogue::is_critical(svc))
            .count();
        let type_weight = test_types
            .iter()
            .map(|tt| impact_weight(*tt))
            .fold(0.0, f64::max);
        let impact_score = 0.2f64
            .mul_add(
                count_as_f64(critical_targets),
                0.1f64.mul_add(count_as_f64(blast_radius), type_weight),
            )
            .min(1.0);

        Ok(DependencyInfo {
            affected_services: affected,
            blast_radius,
            severity_level,
            critical_path,
            isolation_points,
            test_dependencies,
            estimated_downtime_minutes,
            impact_score,
        })
    }

    fn critical_path(&self, targets: &[String], affected: &[String]) -> Vec<String> {
        let mut path: Vec<String> = Vec::new();
        if affected.iter().any(|svc| svc == GATEWAY_SERVICE) {
            path.push(GATEWAY_SERVICE.to_string());
        }
        let mut critical: Vec<&String> = targets
            .iter()
            .filter(|svc| ServiceCatalogue::is_critical(svc) && *svc != GATEWAY_SERVICE)
            .collect();
        critical.sort_by_key(|svc| ServiceCatalogue::rank(svc));
        for svc in critical {
            if !path.contains(svc) {
                path.push(svc.clone());
            }
        }
        for svc in path.clone() {
            for dep in self.graph.dependencies_of(&svc) {
                if !path.contains(dep) {
                    path.push(dep.clone());
                }
            }
        }
        path
    }
}

fn infrastructure_for(test_type: TestType) -> Vec<String> {
    let needs: &[&str] = match test_type {
        TestType::IntegrationTest => &["Database", "External Services"],
        TestType::ChaosTest => &["Chaos Engine", "Monitoring"],
        TestType::PerformanceTest => &["Load Generator", "Metrics Collector"],
        TestType::SecurityTest | TestType::PenetrationTest => &["Security Scanner"],
        TestType::EndToEndTest => &["Browser Automation", "Test Data"],
        TestType::ContractTest => &["Contract Broker"],
        TestType::ApiTest => &["API Client"],
        _ => &[],
    };
    needs.iter().map(|s| (*s).to_string()).collect()
}

const fn downtime_minutes(test_type: TestType) -> u32 {
    match test_type {
        TestType::ChaosTest => 5,
        TestType::PerformanceTest => 10,
        TestType::EndToEndTest => 15,
        _ => 2,
    }
}

const fn impact_weight(test_type: TestType) -> f64 {
    match test_type {
        TestType::ChaosTest => 0.5,
        TestType::PerformanceTest | TestType::SecurityTest | TestType::PenetrationTest => 0.3,
        TestType::EndToEndTest => 0.2,
        _ => 0.1,
    }
}

#[allow(clippy::cast_precision_loss)]
fn count_as_f64(count: usize) -> f64 {
    count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> DependencyAnalyzer {
        DependencyAnalyzer::new(ServiceGraph::standard(), ConfigHandle::default())
    }

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn user_service_closure() {
        let info = analyzer().analyze(&ids(&["user-service"]));
        assert_eq!(
            info.affected_services,
            ids(&[
                "user-service",
                "product-service",
                "order-service",
                "notification-service",
                "gateway-service",
                "orders-db",
                "users-db",
            ])
        );
        assert_eq!(info.blast_radius, 7);
        assert_eq!(info.severity_level, SeverityLevel::High);
        assert_eq!(info.critical_path[0], "gateway-service");
        assert_eq!(info.critical_path[1], "user-service");
        assert!(info.critical_path.contains(&"users-db".to_string()));
        assert_eq!(
            info.isolation_points,
            ids(&["product-service", "notification-service"])
        );
    }

    #[test]
    fn severity_thresholds_on_small_graphs() {
        let graph = ServiceGraph::new()
            .with_edges("a", ["b"])
            .with_edges("b", ["c"]);
        let analyzer = DependencyAnalyzer::new(graph, ConfigHandle::default());
        assert_eq!(analyzer.analyze(&ids(&["c"])).severity_level, SeverityLevel::Medium);
        let config = ConfigHandle::default();
        config.update(|cfg| cfg.analysis.hop_limit = 1).unwrap();
        let narrow = DependencyAnalyzer::new(analyzer.graph().clone(), config);
        let info = narrow.analyze(&ids(&["c"]));
        assert_eq!(info.blast_radius, 2);
        assert_eq!(info.severity_level, SeverityLevel::Low);
        let chaos = narrow.analyze_for(&ids(&["c"]), &[TestType::ChaosTest]);
        assert_eq!(chaos.severity_level, SeverityLevel::High);
        assert_eq!(chaos.estimated_downtime_minutes, 5);
        assert_eq!(chaos.test_dependencies[&TestType::ChaosTest].len(), 2);
    }

    #[test]
    fn empty_targets_yield_unknown() {
        let analyzer = analyzer();
        assert!(matches!(
            analyzer.try_analyze(&[], &[]),
            Err(AnalysisError::EmptyTargets)
        ));
        let info = analyzer.analyze(&[]);
        assert_eq!(info.severity_level, SeverityLevel::Unknown);
        assert_eq!(info.blast_radius, 0);
    }

    #[test]
    fn impact_score_is_clamped() {
        let info = analyzer().analyze_for(
            &ids(&["order-service", "user-service"]),
            &[TestType::ChaosTest],
        );
        assert!((info.impact_score - 1.0).abs() < f64::EPSILON);
        let small = DependencyAnalyzer::new(ServiceGraph::new(), ConfigHandle::default())
            .analyze_for(&ids(&["solo"]), &[TestType::UnitTest]);
        assert!((small.impact_score - 0.2).abs() < 1e-9);
    }
}
