use chrono::{DateTime, Utc};
use jarvis_model::{Intent, Parameters, TestType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised inside the parser; `CommandParser::parse` converts them
/// into an `UNKNOWN` command instead of returning them.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Input exceeds the accepted length.
    #[error("command too long: {len} characters (max {max})")]
    InputTooLong {
        /// Observed length in characters.
        len: usize,
        /// Accepted maximum.
        max: usize,
    },
    /// A keyword table failed to compile.
    #[error("lexicon compilation failed: {0}")]
    Lexicon(#[from] regex::Error),
}

/// How soon the operator wants the work done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    /// "when possible", "eventually", "later".
    Low,
    /// No urgency words.
    Normal,
    /// "urgent", "asap", "immediately", "now".
    High,
}

/// Breadth the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextScope {
    /// "all", "everything", "entire", "complete".
    Comprehensive,
    /// "specific", "particular", "targeted".
    Targeted,
    /// No scope words.
    Default,
}

/// Importance the operator attached to the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextPriority {
    /// "low priority", "background", "optional".
    Low,
    /// No priority words.
    Normal,
    /// "high priority", "critical", "important".
    High,
}

/// Whether the work should start now or later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Timing {
    /// Start on receipt.
    Immediate,
    /// "schedule", "later", "tomorrow", "next week".
    Scheduled,
}

/// Operational constraint mentioned in the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Constraint {
    /// "no downtime", "zero downtime".
    NoDowntime,
    /// "minimal impact", "low impact".
    MinimalImpact,
    /// "safe mode", "safety first".
    SafeMode,
}

/// Where and how the work should execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    /// "dry run", "simulation", "test mode".
    DryRun,
    /// "production", "live".
    Production,
    /// No mode words.
    Standard,
}

/// Situational reading of the command beyond what to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SituationalContext {
    /// Urgency.
    pub urgency: Urgency,
    /// Scope.
    pub scope: ContextScope,
    /// Priority.
    pub priority: ContextPriority,
    /// Timing.
    pub timing: Timing,
    /// Constraints in detection order.
    pub constraints: Vec<Constraint>,
    /// Execution mode.
    pub execution_mode: ExecutionMode,
}

impl Default for SituationalContext {
    fn default() -> Self {
        Self {
            urgency: Urgency::Normal,
            scope: ContextScope::Default,
            priority: ContextPriority::Normal,
            timing: Timing::Immediate,
            constraints: Vec::new(),
            execution_mode: ExecutionMode::Standard,
        }
    }
}

/// Which command fields were filled by defaults rather than detected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultedFields {
    /// No intent keyword matched.
    pub intents: bool,
    /// No service keyword matched.
    pub services: bool,
    /// No test-type keyword matched (inference or fallback used).
    pub test_types: bool,
}

impl DefaultedFields {
    /// Number of defaulted fields (0..=3).
    #[must_use]
    pub fn count(self) -> usize {
        usize::from(self.intents) + usize::from(self.services) + usize::from(self.test_types)
    }
}

/// Structured form of an operator command. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedCommand {
    /// Text as received.
    pub original_text: String,
    /// Detected intents in rule order.
    pub intents: Vec<Intent>,
    /// Target services in catalogue order.
    pub services: Vec<String>,
    /// Test types in rule order.
    pub test_types: Vec<TestType>,
    /// Extracted parameters (`timeout`, `retries`, `parallel`, `priority`,
    /// `scope`, `environment`, `chaosLevel`, `loadLevel`, or `error`).
    pub parameters: Parameters,
    /// Situational context.
    pub context: SituationalContext,
    /// Structural confidence in `[0, 1]`.
    pub confidence: f64,
    /// Default-filling record.
    #[serde(default)]
    pub defaulted: DefaultedFields,
    /// When parsing finished.
    pub parsed_at: DateTime<Utc>,
}

impl ParsedCommand {
    /// Low-information command produced when parsing fails.
    #[must_use]
    pub fn failed(original_text: impl Into<String>, error: &ParseError) -> Self {
        let mut parameters = Parameters::new();
        parameters.insert("error".into(), serde_json::Value::String(error.to_string()));
        Self {
            original_text: original_text.into(),
            intents: vec![Intent::Unknown],
            services: Vec::new(),
            test_types: Vec::new(),
            parameters,
            context: SituationalContext::default(),
            confidence: 0.0,
            defaulted: DefaultedFields::default(),
            parsed_at: Utc::now(),
        }
    }

    /// First detected intent, `UNKNOWN` when none.
    #[must_use]
    pub fn primary_intent(&self) -> Intent {
        self.intents.first().copied().unwrap_or(Intent::Unknown)
    }

    /// True when any of `types` was requested.
    #[must_use]
    pub fn has_any_test_type(&self, types: &[TestType]) -> bool {
        self.test_types.iter().any(|tt| types.contains(tt))
    }

    /// String parameter lookup.
    #[must_use]
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(serde_json::Value::as_str)
    }

    /// Error message carried by a failed parse.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.parameter_str("error")
    }

    /// True for the failure shape produced by [`ParsedCommand::failed`].
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.intents == [Intent::Unknown] && self.error().is_some()
    }
}

/// Structural confidence: 0.3 per non-empty intents/services/test types plus
/// 0.1 for non-empty parameters, clamped to 1.
#[must_use]
pub fn structural_confidence(
    intents: &[Intent],
    services: &[String],
    test_types: &[TestType],
    parameters: &Parameters,
) -> f64 {
    let mut confidence = 0.0;
    if !intents.is_empty() {
        confidence += 0.3;
    }
    if !services.is_empty() {
        confidence += 0.3;
    }
    if !test_types.is_empty() {
        confidence += 0.3;
    }
    if !parameters.is_empty() {
        confidence += 0.1;
    }
    f64::min(confidence, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_command_shape() {
        let cmd = ParsedCommand::failed("x", &ParseError::InputTooLong { len: 9, max: 4 });
        assert!(cmd.is_failure());
        assert_eq!(cmd.primary_intent(), Intent::Unknown);
        assert!(cmd.services.is_empty() && cmd.test_types.is_empty());
        assert!(cmd.confidence.abs() < f64::EPSILON);
        assert!(cmd.error().unwrap().contains("too long"));
    }

    #[test]
    fn confidence_weights() {
        let params = Parameters::new();
        let full = structural_confidence(
            &[Intent::RunTests],
            &["user-service".into()],
            &[TestType::UnitTest],
            &params,
        );
        assert!((full - 0.9).abs() < 1e-9);
        assert!(structural_confidence(&[], &[], &[], &params).abs() < f64::EPSILON);
    }
}
