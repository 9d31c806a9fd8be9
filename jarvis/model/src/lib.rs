#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Shared vocabulary for the Jarvis command-interpretation and decision core.
//!
//! Every other crate in the workspace speaks in these types: intents, test
//! types, risk and priority levels, the known service catalogue, snapshots
//! supplied by the monitoring collaborator, and the hot-readable runtime
//! configuration.

/// Time source shared by memory and learning passes.
pub mod clock;
/// Runtime configuration and its hot-swappable handle.
pub mod config;
/// Known services and their roles.
pub mod services;
/// Health and load snapshots supplied by the monitoring collaborator.
pub mod signals;
/// Intents, test types, and graded levels.
pub mod vocabulary;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{
    AnalysisSettings, ConfigHandle, DecisionSettings, JarvisConfig, LearningSettings,
    MemorySettings, MAX_RETENTION_HOURS,
};
pub use services::{ServiceCatalogue, KNOWN_SERVICES};
pub use signals::{HealthStatus, PerformanceMetrics, StaticMonitor, SystemHealth, SystemMonitor};
pub use vocabulary::{Intent, Priority, RiskLevel, TestType};

/// Free-form parameter map carried by parsed commands and decisions.
pub type Parameters = indexmap::IndexMap<String, serde_json::Value>;
