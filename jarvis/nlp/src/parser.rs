use chrono::Utc;
use jarvis_model::{Intent, Parameters, ServiceCatalogue, TestType};
use serde_json::{json, Value};
use shared_logging::{LogLevel, Telemetry};

use crate::{
    command::{
        structural_confidence, ContextPriority, ContextScope, DefaultedFields, ExecutionMode,
        ParseError, ParsedCommand, SituationalContext, Timing, Urgency,
    },
    lexicon::Lexicon,
};

/// Longest command accepted, in characters.
pub const MAX_COMMAND_CHARS: usize = 4096;

/// Turns operator text into a [`ParsedCommand`].
///
/// Parsing never fails from the caller's point of view: any internal error
/// yields an `UNKNOWN` command with confidence 0 and the message under the
/// `error` parameter.
#[derive(Debug, Clone, Default)]
pub struct CommandParser {
    telemetry: Option<Telemetry>,
}

impl CommandParser {
    /// Creates a parser without telemetry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Parses `text`, degrading to an `UNKNOWN` command on error.
    #[must_use]
    pub fn parse(&self, text: &str) -> ParsedCommand {
        match self.try_parse(text) {
            Ok(command) => {
                self.log(
                    LogLevel::Debug,
                    "nlp.parse.completed",
                    json!({
                        "intents": command.intents,
                        "services": command.services,
                        "test_types": command.test_types,
                        "confidence": command.confidence,
                        "defaulted": command.defaulted.count(),
                    }),
                );
                command
            }
            Err(err) => {
                self.log(
                    LogLevel::Warn,
                    "nlp.parse.failed",
                    json!({ "error": err.to_string() }),
                );
                ParsedCommand::failed(text, &err)
            }
        }
    }

    /// Parses `text`, surfacing internal errors.
    pub fn try_parse(&self, text: &str) -> Result<ParsedCommand, ParseError> {
        let len = text.chars().count();
        if len > MAX_COMMAND_CHARS {
            return Err(ParseError::InputTooLong {
                len,
                max: MAX_COMMAND_CHARS,
            });
        }
        let lexicon = Lexicon::shared()?;
        let normalized = text.trim().to_lowercase();

        let (intents, intents_defaulted) = detect_intents(lexicon, &normalized);
        let (services, services_defaulted) = detect_services(lexicon, &normalized);
        let (test_types, test_types_defaulted) = detect_test_types(lexicon, &normalized);
        let parameters = extract_parameters(lexicon, &normalized);
        let context = read_context(lexicon, &normalized);
        let confidence = structural_confidence(&intents, &services, &test_types, &parameters);

        Ok(ParsedCommand {
            original_text: text.to_string(),
            intents,
            services,
            test_types,
            parameters,
            context,
            confidence,
            defaulted: DefaultedFields {
                intents: intents_defaulted,
                services: services_defaulted,
                test_types: test_types_defaulted,
            },
            parsed_at: Utc::now(),
        })
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }
}

fn detect_intents(lexicon: &Lexicon, text: &str) -> (Vec<Intent>, bool) {
    let intents: Vec<Intent> = lexicon.intents.all(text).collect();
    if intents.is_empty() {
        (vec![Intent::RunTests], true)
    } else {
        (intents, false)
    }
}

fn detect_services(lexicon: &Lexicon, text: &str) -> (Vec<String>, bool) {
    let mut found: Vec<&str> = lexicon.services.all(text).collect();
    if lexicon.all_services.is_match(text) {
        found.extend(jarvis_model::KNOWN_SERVICES);
    }
    found.extend(lexicon.service_pairs.all(text).flatten());
    if found.is_empty() {
        return (ServiceCatalogue::all(), true);
    }
    found.sort_by_key(|service| ServiceCatalogue::rank(service));
    found.dedup();
    (found.into_iter().map(str::to_string).collect(), false)
}

fn detect_test_types(lexicon: &Lexicon, text: &str) -> (Vec<TestType>, bool) {
    let mut found = Vec::new();
    let detected = lexicon
        .test_types
        .all(text)
        .chain(lexicon.test_type_pairs.all(text).flatten());
    for test_type in detected {
        push_unique(&mut found, test_type);
    }
    if !found.is_empty() {
        return (found, false);
    }
    for test_type in lexicon.test_type_inference.all(text).flatten() {
        push_unique(&mut found, *test_type);
    }
    if found.is_empty() {
        found = vec![TestType::UnitTest, TestType::IntegrationTest];
    }
    (found, true)
}

fn push_unique(found: &mut Vec<TestType>, test_type: TestType) {
    if !found.contains(&test_type) {
        found.push(test_type);
    }
}

fn extract_parameters(lexicon: &Lexicon, text: &str) -> Parameters {
    let mut parameters = Parameters::new();

    if lexicon.timeout_trigger.is_match(text) {
        if let Some(timeout) = extract_timeout(lexicon, text) {
            parameters.insert("timeout".into(), Value::String(timeout));
        }
    }
    if lexicon.retry_trigger.is_match(text) {
        if let Some(retries) = extract_retries(lexicon, text) {
            parameters.insert("retries".into(), json!(retries));
        }
    }
    if lexicon.parallel.is_match(text) {
        parameters.insert("parallel".into(), Value::Bool(true));
    }

    let priority = lexicon.priority.first(text).unwrap_or("NORMAL");
    let scope = lexicon.scope.first(text).unwrap_or("DEFAULT");
    let environment = lexicon.environment.first(text).unwrap_or("DEFAULT");
    parameters.insert("priority".into(), json!(priority));
    parameters.insert("scope".into(), json!(scope));
    parameters.insert("environment".into(), json!(environment));

    if lexicon.chaos_level_trigger.is_match(text) {
        let level = lexicon.intensity.first(text).unwrap_or("MEDIUM");
        parameters.insert("chaosLevel".into(), json!(level));
    }
    if lexicon.load_level_trigger.is_match(text) {
        let level = lexicon.intensity.first(text).unwrap_or("MEDIUM");
        parameters.insert("loadLevel".into(), json!(level));
    }
    parameters
}

/// Normalises `N hours|minutes|seconds` to `"<minutes>m"` or `"<seconds>s"`.
fn extract_timeout(lexicon: &Lexicon, text: &str) -> Option<String> {
    let captures = lexicon.timeout_value.captures(text)?;
    let value: u64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2)?.as_str().to_ascii_lowercase();
    if unit.starts_with('h') {
        value.checked_mul(60).map(|minutes| format!("{minutes}m"))
    } else if unit.starts_with('m') {
        Some(format!("{value}m"))
    } else {
        Some(format!("{value}s"))
    }
}

fn extract_retries(lexicon: &Lexicon, text: &str) -> Option<u32> {
    let captures = lexicon.retry_value.captures(text)?;
    let raw = captures.get(1).or_else(|| captures.get(2))?;
    raw.as_str().parse::<u32>().ok().filter(|count| *count > 0)
}

fn read_context(lexicon: &Lexicon, text: &str) -> SituationalContext {
    SituationalContext {
        urgency: lexicon.urgency.first(text).unwrap_or(Urgency::Normal),
        scope: lexicon
            .context_scope
            .first(text)
            .unwrap_or(ContextScope::Default),
        priority: lexicon
            .context_priority
            .first(text)
            .unwrap_or(ContextPriority::Normal),
        timing: lexicon.timing.first(text).unwrap_or(Timing::Immediate),
        constraints: lexicon.constraints.all(text).collect(),
        execution_mode: lexicon
            .execution_mode
            .first(text)
            .unwrap_or(ExecutionMode::Standard),
    }
}
