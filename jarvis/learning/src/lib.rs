#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Learning engine: folds decisions and test outcomes into pattern
//! confidences, trends and optimization suggestions, and publishes them as
//! one atomically swapped snapshot.

/// Learning cycle driver.
pub mod engine;
/// Published snapshot and its swap cell.
pub mod insights;
/// Rule-derived recommendations.
pub mod optimizations;
/// Exponential-moving-average pattern confidences.
pub mod patterns;
/// Windowed trend computation.
pub mod trends;

pub use engine::{LearningEngine, LearningError};
pub use insights::{InsightsCell, LearningInsights, PatternInsight};
pub use optimizations::{evaluate, Impact, Optimization, OptimizationInputs};
pub use patterns::{ema, interaction_keys, PatternTracker};
pub use trends::{ServiceUsage, Trend, TrendDirection};
