use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Overall health reported by the monitoring collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    /// All checks pass.
    Healthy,
    /// Partial failures.
    Degraded,
    /// Critical failures.
    Unhealthy,
    /// No recent probe.
    Unknown,
}

impl HealthStatus {
    /// Stable upper-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Degraded => "DEGRADED",
            Self::Unhealthy => "UNHEALTHY",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time system health snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    /// Aggregate status.
    pub status: HealthStatus,
    /// Human-readable issues behind a non-healthy status.
    #[serde(default)]
    pub issues: Vec<String>,
    /// When the probe ran.
    pub checked_at: DateTime<Utc>,
}

impl SystemHealth {
    /// Snapshot with the given status and no issues.
    #[must_use]
    pub fn new(status: HealthStatus) -> Self {
        Self {
            status,
            issues: Vec::new(),
            checked_at: Utc::now(),
        }
    }

    /// Adds an issue description.
    #[must_use]
    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self
    }

    /// True unless the status is exactly healthy.
    #[must_use]
    pub fn is_impaired(&self) -> bool {
        self.status != HealthStatus::Healthy
    }
}

/// Point-in-time resource usage, in percent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// CPU utilisation (0-100).
    pub cpu_usage: f64,
    /// Memory utilisation (0-100).
    pub memory_usage: f64,
    /// When the sample was taken.
    pub captured_at: DateTime<Utc>,
}

impl PerformanceMetrics {
    /// Sample with the given utilisation figures.
    #[must_use]
    pub fn new(cpu_usage: f64, memory_usage: f64) -> Self {
        Self {
            cpu_usage,
            memory_usage,
            captured_at: Utc::now(),
        }
    }
}

/// Read-only view of the monitoring collaborator.
///
/// Implementations must answer from a cached snapshot; any network probe and
/// its timeout belong to the implementation, never to the caller.
pub trait SystemMonitor: Send + Sync + fmt::Debug {
    /// Latest health snapshot, if any.
    fn system_health(&self) -> Option<SystemHealth>;
    /// Latest resource sample, if any.
    fn performance_metrics(&self) -> Option<PerformanceMetrics>;
}

/// In-process monitor whose snapshots are pushed by the host.
#[derive(Debug, Default)]
pub struct StaticMonitor {
    health: RwLock<Option<SystemHealth>>,
    metrics: RwLock<Option<PerformanceMetrics>>,
}

impl StaticMonitor {
    /// Monitor reporting a healthy, idle system.
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            health: RwLock::new(Some(SystemHealth::new(HealthStatus::Healthy))),
            metrics: RwLock::new(Some(PerformanceMetrics::new(0.0, 0.0))),
        }
    }

    /// Replaces the health snapshot.
    pub fn set_health(&self, health: SystemHealth) {
        *self.health.write() = Some(health);
    }

    /// Replaces the resource sample.
    pub fn set_metrics(&self, metrics: PerformanceMetrics) {
        *self.metrics.write() = Some(metrics);
    }

    /// Forgets both snapshots.
    pub fn clear(&self) {
        *self.health.write() = None;
        *self.metrics.write() = None;
    }
}

impl SystemMonitor for StaticMonitor {
    fn system_health(&self) -> Option<SystemHealth> {
        self.health.read().clone()
    }

    fn performance_metrics(&self) -> Option<PerformanceMetrics> {
        *self.metrics.read()
    }
}
