use jarvis_context::AnalysisError;
use jarvis_decision::DecisionError;
use jarvis_learning::LearningError;
use jarvis_memory::MemoryError;
use jarvis_nlp::ParseError;
use thiserror::Error;

/// Failures surfaced by the `try_*` runtime operations and by bootstrap.
#[derive(Debug, Error)]
pub enum JarvisError {
    /// Configuration or telemetry setup failed.
    #[error(transparent)]
    Setup(#[from] anyhow::Error),
    /// The command text could not be parsed.
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
    /// Context analysis failed.
    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
    /// The decision sequence failed.
    #[error("decision failed: {0}")]
    Decision(#[from] DecisionError),
    /// A learning cycle failed.
    #[error("learning failed: {0}")]
    Learning(#[from] LearningError),
    /// The memory store rejected a write.
    #[error("memory write failed: {0}")]
    Memory(#[from] MemoryError),
}
