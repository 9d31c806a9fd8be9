use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use tokio::runtime::{Builder, Handle, Runtime};

use crate::{JsonLogger, LogLevel, LogRecord};

/// Builder for telemetry sinks.
pub struct TelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl TelemetryBuilder {
    /// Creates the builder for the given module name.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            event_publisher: None,
        }
    }

    /// Sets the JSON-lines log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<Telemetry> {
        let logger = match self.log_path {
            Some(path) => Some(Arc::new(JsonLogger::new(path)?)),
            None => None,
        };
        Ok(Telemetry {
            module: Arc::from(self.module),
            logger,
            event: self.event_publisher.map(|publisher| {
                Arc::new(EventHandle {
                    fallback: OnceCell::new(),
                    publisher,
                })
            }),
        })
    }
}

/// Telemetry handle shared across components.
///
/// Cloning is cheap; clones share the log file and publisher. `scoped`
/// derives a handle for a sub-module writing to the same sinks.
#[derive(Clone)]
pub struct Telemetry {
    module: Arc<str>,
    logger: Option<Arc<JsonLogger>>,
    event: Option<Arc<EventHandle>>,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("module", &self.module)
            .field("logs", &self.logger.is_some())
            .field("events", &self.event.is_some())
            .finish()
    }
}

struct EventHandle {
    fallback: OnceCell<Runtime>,
    publisher: Arc<dyn EventPublisher>,
}

impl EventHandle {
    fn publish(&self, record: EventRecord) -> Result<()> {
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(&self.publisher);
            handle.spawn(async move {
                if let Err(err) = publisher.publish(record).await {
                    tracing::warn!(error = %err, "telemetry event publish failed");
                }
            });
            return Ok(());
        }
        let runtime = self
            .fallback
            .get_or_try_init(|| Builder::new_current_thread().build())?;
        runtime.block_on(self.publisher.publish(record))
    }
}

impl Telemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> TelemetryBuilder {
        TelemetryBuilder::new(module)
    }

    /// Telemetry that only mirrors into `tracing`.
    #[must_use]
    pub fn disabled(module: impl Into<String>) -> Self {
        Self {
            module: Arc::from(module.into()),
            logger: None,
            event: None,
        }
    }

    /// Derives a handle for another module sharing the same sinks.
    #[must_use]
    pub fn scoped(&self, module: impl Into<String>) -> Self {
        Self {
            module: Arc::from(module.into()),
            logger: self.logger.clone(),
            event: self.event.clone(),
        }
    }

    /// Module name attached to every record.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Logs structured metadata and mirrors it into `tracing`.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        let module: &str = &self.module;
        match level {
            LogLevel::Debug => tracing::debug!(module, %metadata, "{message}"),
            LogLevel::Info => tracing::info!(module, %metadata, "{message}"),
            LogLevel::Warn => tracing::warn!(module, %metadata, "{message}"),
            LogLevel::Error => tracing::error!(module, %metadata, "{message}"),
        }
        if let Some(logger) = &self.logger {
            let record = LogRecord::new(module, level, message).with_metadata(metadata);
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Emits an event on the bus.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(handle) = &self.event {
            handle.publish(EventRecord::new(&*self.module, event_type, payload))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::MemoryEventBus;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_and_event_outside_runtime() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("core.log");
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = Telemetry::builder("decision")
            .log_path(&path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "decision.start", json!({ "services": 3 }))
            .unwrap();
        telemetry
            .event("decision.emitted", json!({ "action": "RUN_TESTS" }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("decision.start"));
        assert_eq!(bus.snapshot().len(), 1);
        assert_eq!(bus.snapshot()[0].source, "decision");
    }

    #[tokio::test]
    async fn scoped_handles_share_sinks_inside_runtime() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("core.log");
        let bus = Arc::new(MemoryEventBus::new(16));
        let root = Telemetry::builder("runtime")
            .log_path(&path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let memory = root.scoped("memory");
        memory
            .log(LogLevel::Debug, "memory.store", json!({ "key": "k" }))
            .unwrap();
        memory.event("memory.cleanup.completed", json!({})).unwrap();
        tokio::task::yield_now().await;
        for _ in 0..10 {
            if !bus.snapshot().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"module\":\"memory\""));
        assert_eq!(bus.snapshot_for("memory").len(), 1);
    }

    #[test]
    fn disabled_telemetry_is_a_no_op() {
        let telemetry = Telemetry::disabled("nlp");
        assert!(telemetry.log(LogLevel::Error, "nlp.parse.failed", json!({})).is_ok());
        assert!(telemetry.event("nlp.parse.failed", json!({})).is_ok());
        assert_eq!(telemetry.module(), "nlp");
    }
}
