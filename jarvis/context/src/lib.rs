#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Context analysis: dependency closure, blast radius, risk, and expected
//! runtime for a parsed command.

/// Risk, performance, and confidence summary built per command.
pub mod analysis;
/// Blast-radius and impact analysis over the service graph.
pub mod dependency;
/// Static service dependency graph.
pub mod graph;

pub use analysis::{
    AnalysisSummary, ContextAnalyzer, PerformancePrediction, RiskAssessment, SystemSignals,
};
pub use dependency::{AnalysisError, DependencyAnalyzer, DependencyInfo, SeverityLevel};
pub use graph::ServiceGraph;
